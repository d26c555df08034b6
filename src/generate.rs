//! Top-level report generation entry points.
//!
//! One invocation per user action, no state retained between calls: the
//! pipeline is a pure function from (patient fields, uploaded PDF,
//! template) to output bytes, plus a wall-clock-stamped download name.
//!
//! Failure philosophy (see `error`): required-input and template problems
//! abort before/without partial output; device-PDF problems degrade to
//! sentinel values and the generation continues.

use crate::config::GenerationConfig;
use crate::error::ReportError;
use crate::fields::{merge_mapping, ExtractedRecord, PatientFields};
use crate::pipeline::{crop, docx, input};
use chrono::Local;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Timing and diagnostics for one generation.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct GenerationStats {
    /// Scalar fields recognised in the device PDF (of 6).
    pub scalar_hits: usize,
    /// Curve images cropped and inserted-or-ready (of the layout's panels).
    pub curves: usize,
    /// Set when extraction degraded to the all-sentinel record.
    pub extraction_error: Option<String>,
    pub extract_duration_ms: u64,
    pub render_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// The finished report.
#[derive(Debug, Clone)]
pub struct GeneratedReport {
    /// Complete docx bytes, ready to stream as a download.
    pub bytes: Vec<u8>,
    /// Suggested download name: patient id + timestamp, collision-safe
    /// across repeated generations.
    pub file_name: String,
    /// What the extractor recognised (sentinels included), for display
    /// next to the download.
    pub record: ExtractedRecord,
    pub stats: GenerationStats,
}

/// Generate a report from operator fields and an uploaded device PDF.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// Returns `Err(ReportError)` only for fatal conditions: empty required
/// fields, missing/oversized/non-PDF upload, template not found or corrupt,
/// or a docx assembly failure. An unreadable-but-present PDF is *not*
/// fatal — the report is produced with `---` gaps and
/// `stats.extraction_error` set.
pub async fn generate(
    patient: &PatientFields,
    pdf_bytes: &[u8],
    config: &GenerationConfig,
) -> Result<GeneratedReport, ReportError> {
    let total_start = Instant::now();
    let layout = config.report_type.layout();
    info!(
        "Generating '{}' report for patient id '{}'",
        config.report_type, patient.rut
    );

    // ── Step 1: Validate required inputs ─────────────────────────────────
    validate_patient(patient)?;
    input::validate_pdf_bytes(pdf_bytes, Path::new("upload.pdf"), config.max_pdf_bytes)?;

    // ── Step 2: Extract (degrades, never aborts) ─────────────────────────
    let extract_start = Instant::now();
    let upscale = config.effective_upscale();
    let extraction = {
        let bytes = pdf_bytes.to_vec();
        tokio::task::spawn_blocking(move || crop::extract_record(&bytes, layout, upscale))
            .await
            .map_err(|e| ReportError::Internal(format!("Extraction task panicked: {e}")))?
    };
    let (record, extraction_error) = match extraction {
        Ok(record) => (record, None),
        Err(e) => {
            warn!("Extraction degraded to sentinel record: {e}");
            (ExtractedRecord::missing(), Some(e.to_string()))
        }
    };
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    debug!(
        "Extraction done in {}ms: {}/6 scalars, curves: exhalation={} analysis={}",
        extract_duration_ms,
        record.scalar_hits(),
        record.exhalation_curve.is_some(),
        record.analysis_curve.is_some(),
    );

    // ── Step 3: Resolve and parse the template ───────────────────────────
    let template_path = config.template_path();
    if !template_path.exists() {
        return Err(ReportError::TemplateNotFound {
            report_type: config.report_type.key().to_string(),
            path: template_path,
        });
    }
    let template_bytes =
        std::fs::read(&template_path).map_err(|source| ReportError::TemplateUnreadable {
            path: template_path.clone(),
            source,
        })?;
    let template = docx::parse_template(&template_bytes, &template_path)?;

    // ── Step 4: Merge and fill ───────────────────────────────────────────
    let render_start = Instant::now();
    let mapping = merge_mapping(patient, &record, layout.uppercase_patient);
    let bytes = docx::fill_template(template, &mapping, layout.markers, &record)?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    let curves = layout
        .markers
        .iter()
        .filter(|m| record.curve(m.curve).is_some())
        .count();
    let stats = GenerationStats {
        scalar_hits: record.scalar_hits(),
        curves,
        extraction_error,
        extract_duration_ms,
        render_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    let file_name = download_file_name(&patient.rut, Local::now());

    info!(
        "Report ready: {} ({} bytes, {}ms total)",
        file_name,
        bytes.len(),
        stats.total_duration_ms
    );

    Ok(GeneratedReport {
        bytes,
        file_name,
        record,
        stats,
    })
}

/// Generate a report and write it next to `out_dir` under its suggested
/// download name. Returns the written path.
///
/// Uses atomic write (temp name + rename) to prevent partial files.
pub async fn generate_to_file(
    patient: &PatientFields,
    pdf_bytes: &[u8],
    out_dir: impl AsRef<Path>,
    config: &GenerationConfig,
) -> Result<(std::path::PathBuf, GeneratedReport), ReportError> {
    let report = generate(patient, pdf_bytes, config).await?;
    let out_dir = out_dir.as_ref();

    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|source| ReportError::OutputWriteFailed {
            path: out_dir.to_path_buf(),
            source,
        })?;

    let path = out_dir.join(&report.file_name);
    let tmp_path = path.with_extension("docx.tmp");
    tokio::fs::write(&tmp_path, &report.bytes)
        .await
        .map_err(|source| ReportError::OutputWriteFailed {
            path: path.clone(),
            source,
        })?;
    tokio::fs::rename(&tmp_path, &path)
        .await
        .map_err(|source| ReportError::OutputWriteFailed {
            path: path.clone(),
            source,
        })?;

    Ok((path, report))
}

/// Synchronous wrapper around [`generate`].
///
/// Creates a temporary tokio runtime internally; for callers that are not
/// already async (scripts, spawned workers).
pub fn generate_sync(
    patient: &PatientFields,
    pdf_bytes: &[u8],
    config: &GenerationConfig,
) -> Result<GeneratedReport, ReportError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ReportError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(generate(patient, pdf_bytes, config))
}

/// Run the extractor alone: what the `--extract-only` mode and the form's
/// live-preview use. Degrades exactly like [`generate`].
pub async fn extract_record(
    pdf_bytes: &[u8],
    config: &GenerationConfig,
) -> Result<ExtractedRecord, ReportError> {
    input::validate_pdf_bytes(pdf_bytes, Path::new("upload.pdf"), config.max_pdf_bytes)?;
    let layout = config.report_type.layout();
    let upscale = config.effective_upscale();
    let bytes = pdf_bytes.to_vec();
    let result =
        tokio::task::spawn_blocking(move || crop::extract_record(&bytes, layout, upscale))
            .await
            .map_err(|e| ReportError::Internal(format!("Extraction task panicked: {e}")))?;
    Ok(result.unwrap_or_else(|e| {
        warn!("Extraction degraded to sentinel record: {e}");
        ExtractedRecord::missing()
    }))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Only the patient name and id gate generation; every other form field is
/// optional and renders as typed (possibly empty).
fn validate_patient(patient: &PatientFields) -> Result<(), ReportError> {
    if patient.nombre.trim().is_empty() {
        return Err(ReportError::MissingField { field: "nombre" });
    }
    if patient.rut.trim().is_empty() {
        return Err(ReportError::MissingField { field: "rut" });
    }
    Ok(())
}

/// `informe_feno_<id>_<yyyymmdd_HHMMSS>.docx` with the id reduced to
/// filesystem-safe characters.
fn download_file_name(patient_id: &str, now: chrono::DateTime<Local>) -> String {
    let safe_id: String = patient_id
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("informe_feno_{safe_id}_{}.docx", now.format("%Y%m%d_%H%M%S"))
}
