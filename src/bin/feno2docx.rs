//! CLI binary for feno2docx.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `GenerationConfig`, reads the patient-fields JSON the web form produces,
//! and writes the filled report.

use anyhow::{bail, Context, Result};
use clap::Parser;
use feno2docx::{
    extract_record, generate_to_file, starter_template, GenerationConfig, PatientFields,
    ReportType, SENTINEL,
};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Fill the short-range report
  feno2docx informe_ca2122.pdf --fields paciente.json

  # Extended report into a specific directory
  feno2docx informe_ca2122.pdf --fields paciente.json \
      --report-type extended-range -o /srv/feno/salidas

  # Dump what the extractor sees (JSON, curves base64-encoded)
  feno2docx informe_ca2122.pdf --extract-only

  # Bootstrap a starter template for a fresh deployment
  feno2docx --write-template short-range

PATIENT FIELDS JSON:
  Flat object with the form's field names; all keys optional except
  nombre and rut:
    {"nombre":"Juan","apellidos":"Pérez","rut":"12345678-9",
     "genero":"Masculino","fecha_examen":"09/03/2024"}

ENVIRONMENT VARIABLES:
  FENO2DOCX_TEMPLATES      Templates directory (default: templates)
  FENO2DOCX_OUT            Output directory (default: .)
  PDFIUM_DYNAMIC_LIB_PATH  Path to an existing libpdfium — skips discovery
"#;

/// Fill FeNO clinical report templates from device PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "feno2docx",
    version,
    about = "Fill FeNO clinical report templates from device PDFs",
    long_about = "Extract labeled values and the exhalation-curve image from a \
Sunvou CA2122 FeNO device PDF and splice them, together with operator-entered \
patient fields, into the clinic's Word report template.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Device PDF report to extract from.
    pdf: Option<PathBuf>,

    /// Patient fields JSON produced by the form.
    #[arg(short, long)]
    fields: Option<PathBuf>,

    /// Report variant: selects template and crop configuration.
    #[arg(short = 't', long, value_enum, default_value = "short-range")]
    report_type: ReportTypeArg,

    /// Directory containing the template files.
    #[arg(long, env = "FENO2DOCX_TEMPLATES", default_value = "templates")]
    templates_dir: PathBuf,

    /// Directory the filled report is written to.
    #[arg(short, long, env = "FENO2DOCX_OUT", default_value = ".")]
    out_dir: PathBuf,

    /// Raster upsampling factor for the curve crop (2.0–4.0).
    #[arg(long)]
    upscale: Option<f32>,

    /// Run the extractor only and print the record as JSON.
    #[arg(long)]
    extract_only: bool,

    /// Write a starter template for the given report type and exit.
    #[arg(long, value_name = "REPORT_TYPE")]
    write_template: Option<String>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ReportTypeArg {
    ShortRange,
    ExtendedRange,
}

impl From<ReportTypeArg> for ReportType {
    fn from(v: ReportTypeArg) -> Self {
        match v {
            ReportTypeArg::ShortRange => ReportType::ShortRange,
            ReportTypeArg::ExtendedRange => ReportType::ExtendedRange,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Template bootstrap mode ──────────────────────────────────────────
    if let Some(ref key) = cli.write_template {
        let report_type = ReportType::from_key(key)
            .with_context(|| format!("Unknown report type '{key}' (short-range | extended-range)"))?;
        let path = cli
            .templates_dir
            .join(report_type.layout().template_file);
        std::fs::create_dir_all(&cli.templates_dir)
            .with_context(|| format!("Failed to create {}", cli.templates_dir.display()))?;
        let file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        starter_template(report_type)
            .build()
            .pack(file)
            .with_context(|| format!("Failed to write template to {}", path.display()))?;
        if !cli.quiet {
            eprintln!(
                "{} starter template written to {}",
                green("✔"),
                bold(&path.display().to_string())
            );
        }
        return Ok(());
    }

    let Some(ref pdf_path) = cli.pdf else {
        bail!("A device PDF path is required (or use --write-template)");
    };

    let mut builder = GenerationConfig::builder()
        .report_type(cli.report_type.into())
        .templates_dir(&cli.templates_dir);
    if let Some(f) = cli.upscale {
        builder = builder.upscale(f);
    }
    let config = builder.build().context("Invalid configuration")?;

    let pdf_bytes = feno2docx::pipeline::input::read_pdf(pdf_path, config.max_pdf_bytes)
        .with_context(|| format!("Failed to read device PDF {}", pdf_path.display()))?;

    // ── Extract-only mode ────────────────────────────────────────────────
    if cli.extract_only {
        let record = extract_record(&pdf_bytes, &config)
            .await
            .context("Extraction failed")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&record).context("Failed to serialise record")?
        );
        return Ok(());
    }

    // ── Full generation ──────────────────────────────────────────────────
    let Some(ref fields_path) = cli.fields else {
        bail!("--fields <paciente.json> is required to generate a report");
    };
    let fields_json = std::fs::read_to_string(fields_path)
        .with_context(|| format!("Failed to read fields file {}", fields_path.display()))?;
    let patient: PatientFields = serde_json::from_str(&fields_json)
        .with_context(|| format!("Fields file {} is not valid JSON", fields_path.display()))?;

    let (path, report) = generate_to_file(&patient, &pdf_bytes, &cli.out_dir, &config)
        .await
        .context("Report generation failed")?;

    if !cli.quiet {
        let gaps = report
            .record
            .entries()
            .iter()
            .filter(|(_, v)| *v == SENTINEL)
            .map(|(k, _)| *k)
            .collect::<Vec<_>>();
        eprintln!(
            "{}  {}/6 fields, {} curve(s)  {}ms  →  {}",
            if gaps.is_empty() { green("✔") } else { yellow("⚠") },
            report.stats.scalar_hits,
            report.stats.curves,
            report.stats.total_duration_ms,
            bold(&path.display().to_string()),
        );
        if !gaps.is_empty() {
            eprintln!(
                "   {} {}",
                yellow("not recognised:"),
                dim(&gaps.join(", "))
            );
        }
        if let Some(ref e) = report.stats.extraction_error {
            eprintln!("   {} {}", yellow("extraction degraded:"), dim(e));
        }
    }

    Ok(())
}
