//! # feno2docx
//!
//! Turn a FeNO/spirometry device PDF report plus operator-entered patient
//! fields into a filled-in Word (`.docx`) clinical report.
//!
//! ## Why this crate?
//!
//! The Sunvou CA2122 measuring device emits a fixed-layout PDF that clinic
//! staff used to transcribe by hand into a Word template — retyping the
//! FeNO50 value, the ambient conditions, and screenshotting the exhalation
//! curve for every exam. This crate automates the whole splice: regex the
//! numbers out of the PDF's text layer, raster-crop the curve panel at
//! print resolution, and substitute everything into the template the
//! clinic already owns.
//!
//! ## Pipeline Overview
//!
//! ```text
//! form fields ─────────────────────────┐
//! device PDF                           ▼
//!  │                              merge mapping
//!  ├─ 1. Validate  %PDF magic, size guard
//!  ├─ 2. Scalars   regex the text layer (FeNO50, temperatura, …)
//!  ├─ 3. Crop      rasterise page 1 via pdfium, cut curve panel(s)
//!  ├─ 4. Fill      one traversal of the .docx template
//!  └─ 5. Output    docx bytes + timestamped download name
//! ```
//!
//! Field misses never abort: unmatched labels render as `---` so staff can
//! spot and fix gaps in the finished document. Only missing required
//! inputs and template problems are fatal.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use feno2docx::{generate, GenerationConfig, PatientFields, ReportType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let patient: PatientFields =
//!         serde_json::from_str(r#"{"nombre":"Juan","apellidos":"Pérez","rut":"12345678-9"}"#)?;
//!     let pdf = std::fs::read("ca2122_report.pdf")?;
//!
//!     let config = GenerationConfig::builder()
//!         .report_type(ReportType::ShortRange)
//!         .templates_dir("templates")
//!         .build()?;
//!
//!     let report = generate(&patient, &pdf, &config).await?;
//!     std::fs::write(&report.file_name, &report.bytes)?;
//!     eprintln!("{}/6 fields recognised", report.stats.scalar_hits);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `feno2docx` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! feno2docx = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod fields;
pub mod generate;
pub mod pipeline;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    GenerationConfig, GenerationConfigBuilder, ReportLayout, ReportType,
    MARKER_CURVA_ANALISIS, MARKER_CURVA_EXHALACION,
};
pub use error::{ExtractError, ReportError};
pub use fields::{merge_mapping, ExtractedRecord, PatientFields, SENTINEL};
pub use generate::{
    extract_record, generate, generate_sync, generate_to_file, GeneratedReport, GenerationStats,
};
pub use pipeline::docx::starter_template;
