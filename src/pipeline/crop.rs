//! Everything that touches pdfium: open the uploaded bytes, pull the text
//! layer for the scalar stage, and raster-crop the curve panel(s).
//!
//! ## Coordinate conventions
//!
//! PDF native coordinates put the origin at the page's bottom-left with y
//! growing upward; rendered images put it top-left with y growing downward.
//! All rectangles in the layout table ([`CropRect`]) use the **top-left**
//! convention because crops are tuned against page screenshots, which read
//! top-down. Per-char bounds coming out of pdfium are flipped here, once.
//!
//! ## Why render the whole page and crop the image?
//!
//! pdfium can clip at render time, but rendering once and cropping with the
//! `image` crate keeps the geometry in exactly one place and lets a split
//! layout take both panels from a single raster pass.
//!
//! Functions here are blocking — pdfium is not async-safe. The caller wraps
//! the lot in `tokio::task::spawn_blocking`.

use crate::config::{CropRect, LabelAnchor, ReportLayout};
use crate::error::ExtractError;
use crate::fields::ExtractedRecord;
use crate::pipeline::scalars;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Cursor;
use tracing::{debug, warn};

/// Blocking full extraction: text scalars + curve crops from one buffer.
///
/// Errors only when the document itself cannot be opened; everything past
/// that point degrades (missing text layer ⇒ sentinels, failed raster ⇒ no
/// curve images) per the best-effort contract.
pub fn extract_record(
    pdf_bytes: &[u8],
    layout: &ReportLayout,
    upscale: f32,
) -> Result<ExtractedRecord, ExtractError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(|e| ExtractError::UnreadablePdf {
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    if pages.len() == 0 {
        return Err(ExtractError::NoPages);
    }
    debug!("Device PDF opened: {} page(s)", pages.len());

    // Scalars search the concatenated text of every page; reports are
    // one page by design, but verbose multi-page dumps do exist.
    let mut text = String::new();
    for page in pages.iter() {
        match page.text() {
            Ok(t) => {
                text.push_str(&t.all());
                text.push('\n');
            }
            Err(e) => warn!("Page has no readable text layer: {e:?}"),
        }
    }
    let mut record = scalars::extract_scalars(&text);
    debug!("Scalar extraction: {}/6 fields recognised", record.scalar_hits());

    // Only the first page is subject to cropping.
    let first = pages.get(0).map_err(|e| ExtractError::UnreadablePdf {
        detail: format!("{e:?}"),
    })?;
    let page_w = first.width().value;
    let page_h = first.height().value;

    match render_page(&first, page_w, page_h, upscale) {
        Ok(img) => {
            let sx = img.width() as f32 / page_w;
            let sy = img.height() as f32 / page_h;
            for panel in layout.panels {
                let rect = panel
                    .anchor
                    .and_then(|a| anchored_rect(&first, page_h, &a))
                    .unwrap_or(panel.fallback);
                match crop_png(&img, &rect, sx, sy) {
                    Ok(png) => {
                        debug!(
                            "Cropped {:?} panel at ({:.0},{:.0}) {}x{} pt \u{2192} {} bytes",
                            panel.curve, rect.x, rect.y, rect.width, rect.height,
                            png.len()
                        );
                        match panel.curve {
                            crate::config::CurveId::Exhalation => {
                                record.exhalation_curve = Some(png)
                            }
                            crate::config::CurveId::Analysis => record.analysis_curve = Some(png),
                        }
                    }
                    Err(e) => warn!("Crop failed for {:?} panel: {e}", panel.curve),
                }
            }
        }
        Err(e) => warn!("Page raster failed, report will carry no curve images: {e}"),
    }

    Ok(record)
}

/// Bind to a pdfium library: explicit env-var path first, then the system
/// search paths.
fn bind_pdfium() -> Result<Pdfium, ExtractError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        let bindings = Pdfium::bind_to_library(&path)
            .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{path}: {e:?}")))?;
        return Ok(Pdfium::new(bindings));
    }
    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{e:?}")))
}

/// Rasterise the page at `upscale` × its point size.
fn render_page(
    page: &PdfPage<'_>,
    page_w: f32,
    page_h: f32,
    upscale: f32,
) -> Result<DynamicImage, String> {
    let target_w = (page_w * upscale).round().max(1.0) as i32;
    let max_h = (page_h * upscale).ceil().max(1.0) as i32 + 2;
    let config = PdfRenderConfig::new()
        .set_target_width(target_w)
        .set_maximum_height(max_h);
    page.render_with_config(&config)
        .map(|bitmap| bitmap.as_image())
        .map_err(|e| format!("{e:?}"))
}

/// Locate the anchor label on the page and derive the crop rectangle from
/// its bounding box. `None` when the label is not on the page (scanned
/// reports with no text layer end up here).
fn anchored_rect(page: &PdfPage<'_>, page_h: f32, anchor: &LabelAnchor) -> Option<CropRect> {
    let text = page.text().ok()?;
    let page_chars = text.chars();
    let mut chars: Vec<(char, Option<PdfBox>)> = Vec::new();
    for ch in page_chars.iter() {
        let Some(s) = ch.unicode_string() else { continue };
        let Some(c) = s.chars().next() else { continue };
        let bounds = ch.loose_bounds().ok().map(|b| PdfBox {
            left: b.left().value,
            bottom: b.bottom().value,
            right: b.right().value,
            top: b.top().value,
        });
        let c = c.to_lowercase().next().unwrap_or(c);
        chars.push((c, bounds));
    }

    let needle: Vec<char> = anchor.label.to_lowercase().chars().collect();
    let label_box = find_needle_box(&chars, &needle)?;
    debug!(
        "Anchor '{}' found at left={:.1} top={:.1}",
        anchor.label, label_box.left, label_box.top
    );

    Some(CropRect {
        x: label_box.left + anchor.dx,
        y: (page_h - label_box.top) + anchor.dy,
        width: anchor.width,
        height: anchor.height,
    })
}

/// Character bounding box in PDF-native (bottom-left origin) points.
#[derive(Debug, Clone, Copy)]
struct PdfBox {
    left: f32,
    bottom: f32,
    right: f32,
    top: f32,
}

/// Sliding-window search for `needle` in the char stream; returns the
/// union box of the first match.
fn find_needle_box(chars: &[(char, Option<PdfBox>)], needle: &[char]) -> Option<PdfBox> {
    if needle.is_empty() || chars.len() < needle.len() {
        return None;
    }
    'outer: for start in 0..=chars.len() - needle.len() {
        for (offset, want) in needle.iter().enumerate() {
            if chars[start + offset].0 != *want {
                continue 'outer;
            }
        }
        return union_boxes(chars[start..start + needle.len()].iter().filter_map(|(_, b)| *b));
    }
    None
}

fn union_boxes(boxes: impl Iterator<Item = PdfBox>) -> Option<PdfBox> {
    boxes.reduce(|a, b| PdfBox {
        left: a.left.min(b.left),
        bottom: a.bottom.min(b.bottom),
        right: a.right.max(b.right),
        top: a.top.max(b.top),
    })
}

/// Map a point rectangle onto the rendered image and encode the crop as
/// PNG. Fails only on a degenerate (fully clamped away) rectangle or an
/// encoder error.
fn crop_png(page_img: &DynamicImage, rect: &CropRect, sx: f32, sy: f32) -> Result<Vec<u8>, String> {
    let (x, y, w, h) = to_pixel_rect(rect, sx, sy, page_img.width(), page_img.height())
        .ok_or_else(|| format!("rectangle {rect:?} lies outside the page"))?;

    let cropped = page_img.crop_imm(x, y, w, h);
    let mut buf = Cursor::new(Vec::new());
    cropped
        .write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| e.to_string())?;
    Ok(buf.into_inner())
}

/// Convert a top-left-origin point rectangle to clamped pixel coordinates.
/// Returns `None` when nothing of the rectangle lands on the image.
fn to_pixel_rect(
    rect: &CropRect,
    sx: f32,
    sy: f32,
    img_w: u32,
    img_h: u32,
) -> Option<(u32, u32, u32, u32)> {
    let x0 = (rect.x * sx).max(0.0) as u32;
    let y0 = (rect.y * sy).max(0.0) as u32;
    if x0 >= img_w || y0 >= img_h {
        return None;
    }
    let x1 = (((rect.x + rect.width) * sx).ceil() as u32).min(img_w);
    let y1 = (((rect.y + rect.height) * sy).ceil() as u32).min(img_h);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0, y0, x1 - x0, y1 - y0))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Pure geometry tests (no pdfium needed) ──

    #[test]
    fn pixel_rect_scales_and_rounds() {
        let rect = CropRect {
            x: 10.0,
            y: 20.0,
            width: 100.0,
            height: 50.0,
        };
        let (x, y, w, h) = to_pixel_rect(&rect, 3.0, 3.0, 2000, 2000).unwrap();
        assert_eq!((x, y), (30, 60));
        assert_eq!((w, h), (300, 150));
    }

    #[test]
    fn pixel_rect_clamps_to_image() {
        let rect = CropRect {
            x: 500.0,
            y: 700.0,
            width: 400.0,
            height: 400.0,
        };
        // 612x792pt page at 1x → rect spills over both edges.
        let (x, y, w, h) = to_pixel_rect(&rect, 1.0, 1.0, 612, 792).unwrap();
        assert_eq!((x, y), (500, 700));
        assert_eq!((w, h), (112, 92));
    }

    #[test]
    fn pixel_rect_outside_page_is_none() {
        let rect = CropRect {
            x: 700.0,
            y: 100.0,
            width: 50.0,
            height: 50.0,
        };
        assert!(to_pixel_rect(&rect, 1.0, 1.0, 612, 792).is_none());
    }

    #[test]
    fn negative_origin_clamps_to_zero() {
        let rect = CropRect {
            x: -8.0,
            y: -4.0,
            width: 100.0,
            height: 100.0,
        };
        let (x, y, _, _) = to_pixel_rect(&rect, 2.0, 2.0, 1224, 1584).unwrap();
        assert_eq!((x, y), (0, 0));
    }

    // ── Needle search tests ──

    fn stream(s: &str) -> Vec<(char, Option<PdfBox>)> {
        s.chars()
            .enumerate()
            .map(|(i, c)| {
                (
                    c.to_lowercase().next().unwrap_or(c),
                    Some(PdfBox {
                        left: i as f32 * 10.0,
                        bottom: 500.0,
                        right: i as f32 * 10.0 + 8.0,
                        top: 512.0,
                    }),
                )
            })
            .collect()
    }

    #[test]
    fn needle_found_with_union_box() {
        let chars = stream("xx Curva de Exhalacion yy");
        let needle: Vec<char> = "curva de exhalaci".chars().collect();
        let b = find_needle_box(&chars, &needle).unwrap();
        assert_eq!(b.left, 30.0); // 'C' is the 4th char (index 3)
        assert!(b.right > b.left);
        assert_eq!(b.top, 512.0);
        assert_eq!(b.bottom, 500.0);
    }

    #[test]
    fn needle_absent_is_none() {
        let chars = stream("no curve section here");
        let needle: Vec<char> = "curva de exhalaci".chars().collect();
        assert!(find_needle_box(&chars, &needle).is_none());
    }

    #[test]
    fn needle_longer_than_stream_is_none() {
        let chars = stream("ab");
        let needle: Vec<char> = "abc".chars().collect();
        assert!(find_needle_box(&chars, &needle).is_none());
    }

    #[test]
    fn union_of_no_boxes_is_none() {
        assert!(union_boxes(std::iter::empty()).is_none());
    }

    #[test]
    fn crop_png_produces_png_magic() {
        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            200,
            200,
            image::Rgba([240, 240, 240, 255]),
        ));
        let rect = CropRect {
            x: 10.0,
            y: 10.0,
            width: 50.0,
            height: 40.0,
        };
        let png = crop_png(&img, &rect, 1.0, 1.0).unwrap();
        assert_eq!(&png[..4], &[0x89, 0x50, 0x4E, 0x47]);
    }
}
