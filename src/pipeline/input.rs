//! Input resolution: validate a caller-supplied path into PDF bytes.
//!
//! The library's real input is the uploaded byte buffer the form hands
//! over; this module is the thin path-based front the CLI uses. It checks
//! existence, readability, and the `%PDF` magic bytes before any pdfium
//! call, so callers get a meaningful error instead of a decoder failure on
//! a mis-picked file.

use crate::error::ReportError;
use std::path::Path;
use tracing::debug;

/// Read and validate a device PDF from disk.
///
/// # Errors
/// [`ReportError::FileNotFound`], [`ReportError::PermissionDenied`],
/// [`ReportError::NotAPdf`], or [`ReportError::PdfTooLarge`].
pub fn read_pdf(path: impl AsRef<Path>, max_bytes: usize) -> Result<Vec<u8>, ReportError> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ReportError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ReportError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(ReportError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    };

    validate_pdf_bytes(&bytes, path, max_bytes)?;
    debug!("Resolved device PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}

/// Validate an already-loaded buffer (the upload path).
pub fn validate_pdf_bytes(
    bytes: &[u8],
    origin: &Path,
    max_bytes: usize,
) -> Result<(), ReportError> {
    if bytes.is_empty() {
        return Err(ReportError::MissingPdf);
    }
    if bytes.len() > max_bytes {
        return Err(ReportError::PdfTooLarge {
            got: bytes.len(),
            limit: max_bytes,
        });
    }
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(ReportError::NotAPdf {
            path: origin.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn origin() -> PathBuf {
        PathBuf::from("upload.pdf")
    }

    #[test]
    fn empty_buffer_is_missing_pdf() {
        let err = validate_pdf_bytes(&[], &origin(), 1024).unwrap_err();
        assert!(matches!(err, ReportError::MissingPdf));
    }

    #[test]
    fn wrong_magic_is_not_a_pdf() {
        let err = validate_pdf_bytes(b"PK\x03\x04rest", &origin(), 1024).unwrap_err();
        assert!(matches!(err, ReportError::NotAPdf { magic: [b'P', b'K', 3, 4], .. }));
    }

    #[test]
    fn oversized_buffer_is_rejected() {
        let buf = vec![b'%'; 2048];
        let err = validate_pdf_bytes(&buf, &origin(), 1024).unwrap_err();
        assert!(matches!(err, ReportError::PdfTooLarge { got: 2048, limit: 1024 }));
    }

    #[test]
    fn pdf_magic_passes() {
        assert!(validate_pdf_bytes(b"%PDF-1.4 rest", &origin(), 1024).is_ok());
    }

    #[test]
    fn missing_file_reported_with_path() {
        let err = read_pdf("/definitely/not/here.pdf", 1024).unwrap_err();
        assert!(matches!(err, ReportError::FileNotFound { .. }));
    }
}
