//! Error types for the feno2docx library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ReportError`] — **Fatal**: the report cannot be generated at all
//!   (required input missing, template file absent or corrupt, output not
//!   writable). Returned as `Err(ReportError)` from the top-level
//!   `generate*` functions.
//!
//! * [`ExtractError`] — **Recoverable**: the uploaded device PDF could not
//!   be opened or read. The pipeline logs it, substitutes the all-sentinel
//!   [`crate::fields::ExtractedRecord`], and keeps going — staff reviewing
//!   the finished document will see `---` gaps and correct them by hand.
//!   The error string is still surfaced in
//!   [`crate::generate::GenerationStats`] for diagnostics.
//!
//! The separation matters operationally: a missing template is a deployment
//! problem that must abort loudly, while a glitchy device PDF is a
//! data-quality problem the clinic works around every day.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the feno2docx library.
///
/// Extraction-level failures use [`ExtractError`] and degrade to sentinel
/// values rather than being propagated here.
#[derive(Debug, Error)]
pub enum ReportError {
    // ── Input validation ─────────────────────────────────────────────────
    /// A required operator field is empty. Checked before any processing.
    #[error("Required field '{field}' is empty.\nFill in the patient form before generating.")]
    MissingField { field: &'static str },

    /// No device PDF was supplied (empty upload buffer).
    #[error("No device PDF was uploaded.\nAttach the measurement report before generating.")]
    MissingPdf,

    /// Uploaded buffer exceeds the configured size guard.
    #[error("Uploaded PDF is {got} bytes, above the {limit} byte limit")]
    PdfTooLarge { got: usize, limit: usize },

    /// Input file was not found at the given path (CLI callers).
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Template errors ──────────────────────────────────────────────────
    /// No template file exists for the selected report type.
    ///
    /// This is the single most common deployment breakage: the fixed
    /// report-type → file-name mapping points at a file someone renamed or
    /// forgot to install.
    #[error(
        "Template for report type '{report_type}' not found at '{path}'\n\
         Install the template file or generate a starter with: feno2docx --write-template {report_type}"
    )]
    TemplateNotFound { report_type: String, path: PathBuf },

    /// Template file exists but could not be read.
    #[error("Failed to read template '{path}': {source}")]
    TemplateUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Template file read fine but is not a parseable docx.
    #[error("Template '{path}' is corrupt or not a .docx: {detail}")]
    TemplateCorrupt { path: PathBuf, detail: String },

    // ── Render errors ────────────────────────────────────────────────────
    /// A curve PNG could not be decoded for insertion sizing.
    #[error("Curve image for marker '{marker}' is not a decodable PNG: {detail}")]
    BadCurveImage { marker: String, detail: String },

    /// The filled document could not be serialised back to docx bytes.
    #[error("Failed to assemble the output document: {detail}")]
    RenderFailed { detail: String },

    // ── I/O errors ───────────────────────────────────────────────────────
    /// Could not create or write the output docx file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A recoverable extraction failure for one uploaded device PDF.
///
/// Never aborts report generation: the caller substitutes
/// [`crate::fields::ExtractedRecord::missing`] and continues.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// Could not bind to a pdfium library at all.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
         Set PDFIUM_DYNAMIC_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    /// pdfium rejected the uploaded bytes (corrupt, encrypted, truncated).
    #[error("Device PDF could not be opened: {detail}")]
    UnreadablePdf { detail: String },

    /// The document opened but contains no pages.
    #[error("Device PDF contains no pages")]
    NoPages,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_not_found_names_report_type_and_path() {
        let e = ReportError::TemplateNotFound {
            report_type: "short-range".into(),
            path: PathBuf::from("templates/informe_feno.docx"),
        };
        let msg = e.to_string();
        assert!(msg.contains("short-range"), "got: {msg}");
        assert!(msg.contains("informe_feno.docx"), "got: {msg}");
    }

    #[test]
    fn missing_field_display() {
        let e = ReportError::MissingField { field: "nombre" };
        assert!(e.to_string().contains("nombre"));
    }

    #[test]
    fn pdf_too_large_display() {
        let e = ReportError::PdfTooLarge {
            got: 20_000_000,
            limit: 10_485_760,
        };
        assert!(e.to_string().contains("20000000"));
    }

    #[test]
    fn unreadable_pdf_display() {
        let e = ExtractError::UnreadablePdf {
            detail: "bad xref".into(),
        };
        assert!(e.to_string().contains("bad xref"));
    }
}
