//! Template filling: placeholder substitution and curve-image insertion
//! over a parsed `.docx`.
//!
//! ## One traversal, substitution as data
//!
//! Earlier iterations of this tool repeated "for every paragraph, for every
//! table, for every cell, replace token X" once per report variant.
//! [`for_each_paragraph`] walks every text-bearing node exactly once — body
//! paragraphs, table cells, tables nested in cells — and the
//! placeholder→value map and marker→image associations arrive as plain
//! data. Which container holds which placeholder is a template-authoring
//! detail this code never assumes: demographics conventionally sit in a
//! table, technical values and curve markers in body paragraphs, and both
//! are covered by the same walk.
//!
//! ## Run-splitting
//!
//! Word freely splits a paragraph's text across multiple runs (spell-check
//! boundaries, formatting switches), so `{{NOMBRE}}` may arrive as
//! `{{NOM` + `BRE}}`. Substitution therefore works on the paragraph's
//! concatenated text and, when anything changed, writes the result back
//! into the first text run, blanking the rest. The first run's formatting
//! wins — the convention template authors already rely on.
//!
//! ## Guarantees
//!
//! * Placeholders with no mapping entry are left untouched (a template may
//!   carry optional fields a given form does not collect).
//! * Marker strings are always removed; an image run is inserted per
//!   occurrence only when the corresponding curve exists.
//! * The output is a pure function of (template bytes, mapping, images) —
//!   nothing time- or randomness-dependent is written, so identical inputs
//!   produce byte-identical documents.

use crate::config::{MarkerSpec, ReportType};
use crate::error::ReportError;
use crate::fields::ExtractedRecord;
use docx_rs::{
    read_docx, BreakType, Docx, Document, DocumentChild, Paragraph, ParagraphChild, Pic, Run,
    RunChild, Table, TableCell, TableCellContent, TableChild, TableRow, TableRowChild, Text,
};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// English Metric Units per print inch (docx's native length unit).
const EMU_PER_INCH: f32 = 914_400.0;

/// A curve image prepared for insertion: marker string plus the
/// aspect-correct, pre-sized picture (absent when the crop failed).
struct PreparedImage {
    marker: &'static str,
    pic: Option<Pic>,
}

/// Wrap a mapping key in the template's literal token syntax.
pub fn token(key: &str) -> String {
    format!("{{{{{key}}}}}")
}

/// Parse template bytes, attributing failures to `path` for diagnostics.
pub fn parse_template(bytes: &[u8], path: &Path) -> Result<Docx, ReportError> {
    read_docx(bytes).map_err(|e| ReportError::TemplateCorrupt {
        path: path.to_path_buf(),
        detail: format!("{e:?}"),
    })
}

/// Fill a parsed template: substitute every placeholder, handle every
/// marker, and serialise the result to docx bytes.
pub fn fill_template(
    mut docx: Docx,
    mapping: &BTreeMap<String, String>,
    markers: &[MarkerSpec],
    record: &ExtractedRecord,
) -> Result<Vec<u8>, ReportError> {
    // Token strings and image sizing are computed once, before the walk.
    let tokens: Vec<(String, &str)> = mapping
        .iter()
        .map(|(k, v)| (token(k), v.as_str()))
        .collect();

    let mut images = Vec::with_capacity(markers.len());
    for spec in markers {
        let pic = match record.curve(spec.curve) {
            Some(png) => Some(sized_pic(png, spec.width_inches).map_err(|detail| {
                ReportError::BadCurveImage {
                    marker: spec.marker.to_string(),
                    detail,
                }
            })?),
            None => None,
        };
        images.push(PreparedImage {
            marker: spec.marker,
            pic,
        });
    }

    let mut substitutions = 0usize;
    let mut insertions = 0usize;
    let mut para_seq = 0usize;
    for_each_paragraph(&mut docx.document, &mut |p| {
        // Normalise the machine-generated paragraph ids: docx-rs mints them
        // from a process-global counter, which would make identical inputs
        // serialise to different bytes.
        para_seq += 1;
        p.id = format!("{para_seq:08x}");
        substitutions += substitute_paragraph(p, &tokens, &images, &mut insertions);
    });
    debug!("Template filled: {substitutions} substitution(s), {insertions} image insertion(s)");

    pack(docx)
}

/// Serialise a document to docx bytes.
pub fn pack(docx: Docx) -> Result<Vec<u8>, ReportError> {
    let mut buf = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buf)
        .map_err(|e| ReportError::RenderFailed {
            detail: format!("{e:?}"),
        })?;
    Ok(buf.into_inner())
}

// ── Traversal ────────────────────────────────────────────────────────────

/// Visit every text-bearing paragraph of the document body: freestanding
/// paragraphs, table cells, and tables nested inside cells.
pub fn for_each_paragraph<F: FnMut(&mut Paragraph)>(document: &mut Document, f: &mut F) {
    for child in &mut document.children {
        match child {
            DocumentChild::Paragraph(p) => f(p.as_mut()),
            DocumentChild::Table(t) => visit_table(t.as_mut(), f),
            _ => {}
        }
    }
}

fn visit_table<F: FnMut(&mut Paragraph)>(table: &mut Table, f: &mut F) {
    for row in &mut table.rows {
        let TableChild::TableRow(row) = row;
        for cell in &mut row.cells {
            let TableRowChild::TableCell(cell) = cell;
            for content in &mut cell.children {
                match content {
                    TableCellContent::Paragraph(p) => f(p),
                    TableCellContent::Table(t) => visit_table(t, f),
                    _ => {}
                }
            }
        }
    }
}

// ── Substitution ─────────────────────────────────────────────────────────

/// The paragraph's visible text: every text run concatenated in order.
fn paragraph_text(p: &Paragraph) -> String {
    let mut out = String::new();
    for child in &p.children {
        if let ParagraphChild::Run(run) = child {
            for rc in &run.children {
                if let RunChild::Text(t) = rc {
                    out.push_str(&t.text);
                }
            }
        }
    }
    out
}

/// Apply tokens and markers to one paragraph. Returns the number of
/// placeholder substitutions; `pic_seq` numbers inserted pictures so their
/// relationship ids stay unique and deterministic.
fn substitute_paragraph(
    p: &mut Paragraph,
    tokens: &[(String, &str)],
    images: &[PreparedImage],
    pic_seq: &mut usize,
) -> usize {
    let original = paragraph_text(p);
    if original.is_empty() {
        return 0;
    }

    let mut replaced = original.clone();
    let mut substitutions = 0;
    for (tok, value) in tokens {
        // Count-then-replace: a value that happens to contain a token must
        // not be substituted again.
        let n = replaced.matches(tok.as_str()).count();
        if n > 0 {
            replaced = replaced.replace(tok.as_str(), value);
            substitutions += n;
        }
    }

    // Markers are removed per occurrence; one image run per occurrence
    // when the curve is available, graceful removal when it is not.
    let mut pics_to_insert: Vec<Pic> = Vec::new();
    for img in images {
        let n = replaced.matches(img.marker).count();
        if n == 0 {
            continue;
        }
        replaced = replaced.replace(img.marker, "");
        if let Some(ref pic) = img.pic {
            for _ in 0..n {
                let mut pic = pic.clone();
                pic.id = format!("rIdFenoCurve{}", *pic_seq);
                *pic_seq += 1;
                pics_to_insert.push(pic);
            }
        }
    }

    if replaced == original && pics_to_insert.is_empty() {
        return 0;
    }

    write_paragraph_text(p, &replaced);
    for pic in pics_to_insert {
        p.children.push(ParagraphChild::Run(Box::new(
            Run::new().add_image(pic),
        )));
    }
    substitutions
}

/// Write `text` into the paragraph's first text run and blank the rest.
fn write_paragraph_text(p: &mut Paragraph, text: &str) {
    let mut first = true;
    for child in &mut p.children {
        if let ParagraphChild::Run(run) = child {
            for rc in &mut run.children {
                if let RunChild::Text(t) = rc {
                    if first {
                        *t = Text::new(text);
                        first = false;
                    } else {
                        *t = Text::new("");
                    }
                }
            }
        }
    }
    if first && !text.is_empty() {
        p.children.push(ParagraphChild::Run(Box::new(
            Run::new().add_text(text),
        )));
    }
}

/// Build a picture sized to a fixed display width, height following the
/// PNG's aspect ratio.
fn sized_pic(png: &[u8], width_inches: f32) -> Result<Pic, String> {
    let decoded = image::load_from_memory(png).map_err(|e| e.to_string())?;
    let (w, h) = (decoded.width() as f32, decoded.height() as f32);
    if w < 1.0 || h < 1.0 {
        return Err("image has zero dimension".into());
    }
    let w_emu = (width_inches * EMU_PER_INCH) as u32;
    let h_emu = (width_inches * (h / w) * EMU_PER_INCH) as u32;
    Ok(Pic::new(png).size(w_emu, h_emu))
}

// ── Starter template ─────────────────────────────────────────────────────

/// Build a valid starter template for a report type: the conventional
/// demographics table, technical paragraphs, curve markers, and reference
/// footer, with the full placeholder set in place.
///
/// Deployments run `feno2docx --write-template <type>` to bootstrap a
/// template the clinic then restyles in Word; the test-suite uses it as its
/// fixture source.
pub fn starter_template(report_type: ReportType) -> Docx {
    let extended = report_type == ReportType::ExtendedRange;

    let mut docx = Docx::new()
        .add_paragraph(heading("Informe de \u{d3}xido N\u{ed}trico Exhalado"))
        .add_table(patient_table())
        .add_paragraph(heading("Prueba de \u{d3}xido N\u{ed}trico Exhalado"))
        .add_paragraph(body_line(
            "Predictivos: ATS/ERS    Equipo: CA2122 FeNO (Sunvou)",
        ))
        .add_paragraph(labeled_value("Temperatura", "TEMPERATURA", "\u{b0}C"))
        .add_paragraph(labeled_value("Presi\u{f3}n", "PRESION", "cmH2O"))
        .add_paragraph(labeled_value("Tasa de Flujo", "TASA_FLUJO", "ml/s"));

    docx = docx.add_paragraph(heading("Curva de Exhalaci\u{f3}n y An\u{e1}lisis"));
    docx = docx.add_paragraph(body_line(crate::config::MARKER_CURVA_EXHALACION));
    if extended {
        docx = docx.add_paragraph(body_line(crate::config::MARKER_CURVA_ANALISIS));
    }

    docx = docx.add_paragraph(result_line("FeNO50", "FENO50"));
    if extended {
        docx = docx
            .add_paragraph(result_line("FeNO200", "FENO200"))
            .add_paragraph(result_line("CaNO", "CANO"));
    }

    docx.add_paragraph(Paragraph::new().add_run(Run::new().add_break(BreakType::TextWrapping)))
        .add_paragraph(body_line(
            "Referencias: Dweik RA, Boggs PB, Erzurum SC, et al. An official ATS \
             clinical practice guideline: interpretation of exhaled nitric oxide levels \
             (FENO) for clinical applications. Am J Respir Crit Care Med. 2011;184(5):602-615.",
        ))
}

fn heading(text: &str) -> Paragraph {
    Paragraph::new().add_run(Run::new().add_text(text).bold())
}

fn body_line(text: &str) -> Paragraph {
    Paragraph::new().add_run(Run::new().add_text(text))
}

fn labeled_value(label: &str, key: &str, unit: &str) -> Paragraph {
    Paragraph::new().add_run(Run::new().add_text(format!("{label}: {} {unit}", token(key))))
}

fn result_line(label: &str, key: &str) -> Paragraph {
    Paragraph::new().add_run(Run::new().add_text(format!("{label}: {} ppb", token(key))).bold())
}

fn patient_table() -> Table {
    Table::new(vec![
        labeled_row("Nombre", "NOMBRE", "Apellidos", "APELLIDOS"),
        labeled_row("RUT", "RUT", "G\u{e9}nero", "GENERO"),
        labeled_row("Operador", "OPERADOR", "M\u{e9}dico", "MEDICO"),
        labeled_row("F. nacimiento", "FECHA_NACIMIENTO", "Edad", "EDAD"),
        labeled_row("Altura", "ALTURA", "Peso", "PESO"),
        labeled_row("Procedencia", "PROCEDENCIA", "Fecha de Examen", "FECHA_EXAMEN"),
    ])
}

fn labeled_row(l1: &str, k1: &str, l2: &str, k2: &str) -> TableRow {
    TableRow::new(vec![
        text_cell(&format!("{l1}:")),
        text_cell(&token(k1)),
        text_cell(&format!("{l2}:")),
        text_cell(&token(k2)),
    ])
}

fn text_cell(text: &str) -> TableCell {
    TableCell::new().add_paragraph(body_line(text))
}
