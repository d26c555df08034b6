//! Configuration for report generation.
//!
//! Two layers live here:
//!
//! * The fixed per-report-type **layout table** ([`ReportLayout`]): template
//!   file name, crop rectangles, label anchor, upsampling factor, casing
//!   flag, marker strings and image display widths. Earlier iterations of
//!   this tool hard-coded these constants inside the extraction code of each
//!   variant; centralising them means tuning a crop for a new device
//!   firmware never touches extraction logic.
//!
//! * The per-call [`GenerationConfig`], built via its
//!   [`GenerationConfigBuilder`]. Keeping every knob in one struct makes it
//!   trivial to share configs across requests and to log why two runs
//!   produced different output.

use crate::error::ReportError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default directory searched for template files.
pub const DEFAULT_TEMPLATES_DIR: &str = "templates";

/// Default cap on the uploaded PDF size. Device reports are well under 1 MB;
/// anything bigger is a mis-upload.
pub const DEFAULT_MAX_PDF_BYTES: usize = 10 * 1024 * 1024;

// ── Report types ─────────────────────────────────────────────────────────

/// Which report variant to produce.
///
/// Selects the template file and the crop/casing configuration. This is a
/// caller choice, never auto-detected from the PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportType {
    /// FeNO50-only report: one combined curve panel.
    #[default]
    ShortRange,
    /// FeNO50 + FeNO200 + CaNO report: separate exhalation and analysis
    /// curve panels.
    ExtendedRange,
}

impl ReportType {
    /// Stable string key used by the CLI and in error messages.
    pub fn key(&self) -> &'static str {
        match self {
            ReportType::ShortRange => "short-range",
            ReportType::ExtendedRange => "extended-range",
        }
    }

    /// Parse a key produced by [`ReportType::key`]. Case-insensitive.
    pub fn from_key(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "short-range" | "short" => Some(ReportType::ShortRange),
            "extended-range" | "extended" => Some(ReportType::ExtendedRange),
            _ => None,
        }
    }

    /// The fixed layout table entry for this report type.
    pub fn layout(&self) -> &'static ReportLayout {
        match self {
            ReportType::ShortRange => &SHORT_RANGE,
            ReportType::ExtendedRange => &EXTENDED_RANGE,
        }
    }
}

impl std::fmt::Display for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

// ── Layout table ─────────────────────────────────────────────────────────

/// Identifies one of the two curve graphics a device report can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveId {
    /// The exhalation flow/NO trace (or the single combined panel).
    Exhalation,
    /// The secondary analysis panel of extended reports.
    Analysis,
}

/// A crop rectangle in page points, origin at the page's **top-left**.
///
/// PDF native coordinates put the origin bottom-left; the top-left
/// convention is used here because crops are tuned against a rendered page
/// image, which reads top-down. `pipeline::crop` does the flip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Preferred crop strategy: anchor on the curve-section label text.
///
/// When the label is found on the page, the crop rectangle starts at
/// `(label.x + dx, label.y + dy)` — tracking small layout shifts between
/// firmware revisions that a fixed rectangle would miss.
#[derive(Debug, Clone, Copy)]
pub struct LabelAnchor {
    /// Text the anchor search looks for, matched case- and
    /// accent-insensitively against the page's text layer.
    pub label: &'static str,
    /// Horizontal offset from the label box's left edge, points.
    pub dx: f32,
    /// Vertical offset from the label box's top edge, points.
    pub dy: f32,
    pub width: f32,
    pub height: f32,
}

/// One curve panel to crop out of page 1.
#[derive(Debug, Clone, Copy)]
pub struct PanelSpec {
    pub curve: CurveId,
    /// Label-anchored strategy, tried first when present.
    pub anchor: Option<LabelAnchor>,
    /// Fixed rectangle tuned to the device's page layout; used when the
    /// anchor is absent or the label is not found (e.g. no text layer).
    pub fallback: CropRect,
}

/// One image-insertion marker in the template.
#[derive(Debug, Clone, Copy)]
pub struct MarkerSpec {
    /// Literal string the template author places where the image goes.
    pub marker: &'static str,
    /// Which cropped curve is inserted there.
    pub curve: CurveId,
    /// Fixed display width in print inches. Presentation constant, not
    /// business logic; height follows the crop's aspect ratio.
    pub width_inches: f32,
}

/// The full fixed configuration of one report type.
#[derive(Debug, Clone, Copy)]
pub struct ReportLayout {
    /// Conventional template file name under the templates directory.
    pub template_file: &'static str,
    /// Curve panels cropped from page 1.
    pub panels: &'static [PanelSpec],
    /// Marker → curve associations consumed by the renderer.
    pub markers: &'static [MarkerSpec],
    /// Raster upsampling factor (2–4×). The source PDFs carry the curve at
    /// screen resolution; without upsampling the inserted image is
    /// illegibly soft in print.
    pub upscale: f32,
    /// Upper-case the patient-identifying values before substitution.
    pub uppercase_patient: bool,
}

/// Marker string for the exhalation (or combined) curve image.
pub const MARKER_CURVA_EXHALACION: &str = "CURVA_EXHALACION";
/// Marker string for the analysis curve image (extended reports).
pub const MARKER_CURVA_ANALISIS: &str = "CURVA_ANALISIS";

// Rectangles below are tuned against the Sunvou CA2122 letter-size report
// (612 × 792 pt). The anchor offsets are measured from the top-left of the
// "Curva de Exhalación" section label.

static SHORT_RANGE: ReportLayout = ReportLayout {
    template_file: "informe_feno.docx",
    panels: &[PanelSpec {
        curve: CurveId::Exhalation,
        anchor: Some(LabelAnchor {
            label: "Curva de Exhalaci",
            dx: -8.0,
            dy: 14.0,
            width: 528.0,
            height: 238.0,
        }),
        // Single combined panel spanning both visual sub-plots.
        fallback: CropRect {
            x: 42.0,
            y: 418.0,
            width: 528.0,
            height: 238.0,
        },
    }],
    markers: &[MarkerSpec {
        marker: MARKER_CURVA_EXHALACION,
        curve: CurveId::Exhalation,
        width_inches: 5.2,
    }],
    upscale: 3.0,
    uppercase_patient: false,
};

static EXTENDED_RANGE: ReportLayout = ReportLayout {
    template_file: "informe_feno_extendido.docx",
    panels: &[
        PanelSpec {
            curve: CurveId::Exhalation,
            anchor: Some(LabelAnchor {
                label: "Curva de Exhalaci",
                dx: -8.0,
                dy: 14.0,
                width: 258.0,
                height: 222.0,
            }),
            fallback: CropRect {
                x: 42.0,
                y: 430.0,
                width: 258.0,
                height: 222.0,
            },
        },
        PanelSpec {
            curve: CurveId::Analysis,
            anchor: Some(LabelAnchor {
                label: "An\u{e1}lisis de Curva",
                dx: -8.0,
                dy: 14.0,
                width: 258.0,
                height: 222.0,
            }),
            fallback: CropRect {
                x: 312.0,
                y: 430.0,
                width: 258.0,
                height: 222.0,
            },
        },
    ],
    markers: &[
        MarkerSpec {
            marker: MARKER_CURVA_EXHALACION,
            curve: CurveId::Exhalation,
            width_inches: 2.3,
        },
        MarkerSpec {
            marker: MARKER_CURVA_ANALISIS,
            curve: CurveId::Analysis,
            width_inches: 2.3,
        },
    ],
    upscale: 3.0,
    uppercase_patient: true,
};

// ── Per-call configuration ───────────────────────────────────────────────

/// Configuration for one report generation.
///
/// Built via [`GenerationConfig::builder()`] or [`GenerationConfig::default()`].
///
/// # Example
/// ```rust
/// use feno2docx::{GenerationConfig, ReportType};
///
/// let config = GenerationConfig::builder()
///     .report_type(ReportType::ExtendedRange)
///     .templates_dir("/srv/feno/templates")
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Selected report variant. Default: [`ReportType::ShortRange`].
    pub report_type: ReportType,

    /// Directory containing the template files. Default: `templates`.
    pub templates_dir: PathBuf,

    /// Override of the layout's raster upsampling factor. Clamped to
    /// 2.0–4.0 — below 2× the inserted curve is illegible, above 4× the
    /// PNGs bloat the docx for no visible gain.
    pub upscale: Option<f32>,

    /// Size guard on the uploaded PDF buffer.
    pub max_pdf_bytes: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            report_type: ReportType::default(),
            templates_dir: PathBuf::from(DEFAULT_TEMPLATES_DIR),
            upscale: None,
            max_pdf_bytes: DEFAULT_MAX_PDF_BYTES,
        }
    }
}

impl GenerationConfig {
    /// Create a new builder for `GenerationConfig`.
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder {
            config: Self::default(),
        }
    }

    /// The template file this configuration resolves to.
    ///
    /// Resolution is a plain name lookup; existence is checked at
    /// generation time so a missing file surfaces as
    /// [`ReportError::TemplateNotFound`] on the call that needs it.
    pub fn template_path(&self) -> PathBuf {
        self.templates_dir.join(self.report_type.layout().template_file)
    }

    /// Effective upsampling factor: the override, or the layout's value.
    pub fn effective_upscale(&self) -> f32 {
        self.upscale
            .unwrap_or_else(|| self.report_type.layout().upscale)
    }
}

/// Builder for [`GenerationConfig`].
#[derive(Debug)]
pub struct GenerationConfigBuilder {
    config: GenerationConfig,
}

impl GenerationConfigBuilder {
    pub fn report_type(mut self, rt: ReportType) -> Self {
        self.config.report_type = rt;
        self
    }

    pub fn templates_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.templates_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn upscale(mut self, factor: f32) -> Self {
        self.config.upscale = Some(factor.clamp(2.0, 4.0));
        self
    }

    pub fn max_pdf_bytes(mut self, n: usize) -> Self {
        self.config.max_pdf_bytes = n.max(1024);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GenerationConfig, ReportError> {
        let c = &self.config;
        if let Some(f) = c.upscale {
            if !(2.0..=4.0).contains(&f) {
                return Err(ReportError::InvalidConfig(format!(
                    "Upscale factor must be 2.0–4.0, got {f}"
                )));
            }
        }
        if c.templates_dir.as_os_str().is_empty() {
            return Err(ReportError::InvalidConfig(
                "Templates directory must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
