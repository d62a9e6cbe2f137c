//! Document text extraction.
//!
//! Uses pdf-extract for per-page text of uploaded PDF files.

use std::panic::{self, catch_unwind, UnwindSafe};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Magic bytes every PDF file starts with
const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a PDF document: {0}")]
    NotPdf(String),
    #[error("failed to extract text from {name}: {reason}")]
    Pdf { name: String, reason: String },
    #[error("page {index} out of range, document has {count} pages")]
    PageOutOfRange { index: usize, count: usize },
}

/// A document made of pages with extractable text.
pub trait PagedDocument {
    fn page_count(&self) -> usize;

    /// Text of one page. Image-only pages yield an empty string.
    fn page_text(&self, index: usize) -> Result<String, ExtractError>;
}

/// A PDF whose pages have been extracted to text.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    name: String,
    pages: Vec<String>,
}

impl PdfDocument {
    /// Read and extract a PDF file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ExtractError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let bytes = std::fs::read(path)?;
        Self::from_bytes(name, &bytes)
    }

    /// Extract a PDF held in memory
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self, ExtractError> {
        let name = name.into();
        if !is_pdf(bytes) {
            return Err(ExtractError::NotPdf(name));
        }

        let pdf_error = |reason: String| ExtractError::Pdf {
            name: name.clone(),
            reason,
        };

        // pdf-extract panics on some malformed files
        let pages = quietly(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
            .map_err(pdf_error)?
            .map_err(|e| pdf_error(e.to_string()))?;
        debug!(document = %name, pages = pages.len(), "extracted PDF pages");

        Ok(Self { name, pages })
    }

    /// File name the document was loaded from
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PagedDocument for PdfDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, index: usize) -> Result<String, ExtractError> {
        self.pages
            .get(index)
            .cloned()
            .ok_or(ExtractError::PageOutOfRange {
                index,
                count: self.pages.len(),
            })
    }
}

/// Returns true if the leading bytes are the PDF magic.
pub fn is_pdf(head: &[u8]) -> bool {
    head.starts_with(PDF_MAGIC)
}

/// Run `f`, turning a panic into its message.
///
/// The panic hook is swapped out for the call so nothing is printed over the
/// terminal UI.
fn quietly<T>(f: impl FnOnce() -> T + UnwindSafe) -> Result<T, String> {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(|info| debug!(%info, "recovered from panic")));
    let result = catch_unwind(f);
    panic::set_hook(previous);

    result.map_err(|panic_info| {
        panic_info
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| panic_info.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string())
    })
}

/// Concatenate the text of every page in order, with no separator.
pub fn extract_text<D: PagedDocument + ?Sized>(doc: &D) -> Result<String, ExtractError> {
    let mut text = String::new();
    for index in 0..doc.page_count() {
        text.push_str(&doc.page_text(index)?);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct Pages(Vec<&'static str>);

    impl PagedDocument for Pages {
        fn page_count(&self) -> usize {
            self.0.len()
        }

        fn page_text(&self, index: usize) -> Result<String, ExtractError> {
            Ok(self.0[index].to_string())
        }
    }

    #[test]
    fn test_pages_are_concatenated_without_separator() {
        let doc = Pages(vec!["First page.", "", "Third page."]);
        assert_eq!(extract_text(&doc).unwrap(), "First page.Third page.");
    }

    #[test]
    fn test_empty_document_has_no_text() {
        assert_eq!(extract_text(&Pages(vec![])).unwrap(), "");
    }

    #[test]
    fn test_is_pdf_detection() {
        assert!(is_pdf(b"%PDF-1.7\n..."));
        assert!(!is_pdf(b"hello"));
        assert!(!is_pdf(b"%PD"));
        assert!(!is_pdf(b""));
    }

    #[test]
    fn test_quietly_turns_panic_into_message() {
        let err = quietly(|| -> usize { panic!("bad xref table") }).unwrap_err();
        assert_eq!(err, "bad xref table");

        let err = quietly(|| -> usize { panic!("object {} missing", 7) }).unwrap_err();
        assert_eq!(err, "object 7 missing");

        assert_eq!(quietly(|| 42), Ok(42));
    }

    #[test]
    fn test_non_pdf_bytes_are_rejected() {
        let err = PdfDocument::from_bytes("notes.txt", b"just some text").unwrap_err();
        assert!(matches!(err, ExtractError::NotPdf(name) if name == "notes.txt"));
    }

    #[test]
    fn test_open_non_pdf_file() {
        let mut file = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        file.write_all(b"<html>not a pdf</html>").unwrap();

        let err = PdfDocument::open(file.path()).unwrap_err();
        assert!(matches!(err, ExtractError::NotPdf(_)));
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PdfDocument::open(dir.path().join("missing.pdf")).unwrap_err();
        assert!(matches!(err, ExtractError::Io(_)));
    }

    #[test]
    fn test_page_out_of_range() {
        let doc = PdfDocument {
            name: "doc.pdf".into(),
            pages: vec!["only page".into()],
        };
        assert_eq!(doc.page_text(0).unwrap(), "only page");
        assert!(matches!(
            doc.page_text(3),
            Err(ExtractError::PageOutOfRange { index: 3, count: 1 })
        ));
    }
}
