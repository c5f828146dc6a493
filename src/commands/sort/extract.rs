use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use lopdf::content::Content;
use lopdf::{Document, ObjectId};
use tracing::{debug, warn};

use crate::util::command_available;

/// Content-stream operators that put marks on the page: text showing, path
/// painting, XObjects, inline images and shadings.
const MARKING_OPERATORS: &[&str] = &[
    "Tj", "TJ", "'", "\"", "S", "s", "f", "F", "f*", "B", "B*", "b", "b*", "Do", "BI", "sh",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ExtractedPage {
    pub(crate) text: String,
    pub(crate) has_visual_content: bool,
}

impl ExtractedPage {
    pub(crate) fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

pub(crate) trait PageExtractor {
    fn page_count(&self) -> usize;
    fn extract(&self, page_index: usize) -> Result<ExtractedPage>;
}

pub(crate) trait OcrEngine {
    fn recognize(&self, page_index: usize, dpi: u32, config: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextBackend {
    Pdftotext,
    Lopdf,
}

impl TextBackend {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            TextBackend::Pdftotext => "pdftotext",
            TextBackend::Lopdf => "lopdf",
        }
    }
}

/// Text layer from `pdftotext` when installed, otherwise from lopdf. The
/// visual flag always comes from the decoded content stream.
#[derive(Debug)]
pub(crate) struct PopplerExtractor {
    pages: Vec<ExtractedPage>,
    backend: TextBackend,
}

impl PopplerExtractor {
    pub(crate) fn open(pdf_path: &Path, document: &Document) -> Result<(Self, Vec<String>)> {
        let page_ids = document.get_pages();
        let page_count = page_ids.len();
        let mut warnings = Vec::new();

        let (texts, backend) = match extract_pages_with_pdftotext(pdf_path, page_count) {
            Ok(texts) => (texts, TextBackend::Pdftotext),
            Err(err) => {
                warn!(error = %err, "pdftotext unavailable; using lopdf text extraction");
                warnings.push(format!("pdftotext unavailable: {err}"));
                (
                    extract_pages_with_lopdf(document, &mut warnings),
                    TextBackend::Lopdf,
                )
            }
        };

        let pages = page_ids
            .values()
            .zip(texts)
            .map(|(page_id, text)| ExtractedPage {
                has_visual_content: page_has_marks(document, *page_id),
                text,
            })
            .collect::<Vec<_>>();

        debug!(pages = pages.len(), backend = backend.as_str(), "extracted page text");
        Ok((Self { pages, backend }, warnings))
    }

    pub(crate) fn backend(&self) -> TextBackend {
        self.backend
    }
}

impl PageExtractor for PopplerExtractor {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn extract(&self, page_index: usize) -> Result<ExtractedPage> {
        match self.pages.get(page_index) {
            Some(page) => Ok(page.clone()),
            None => bail!(
                "page index {} out of range for {} pages",
                page_index,
                self.pages.len()
            ),
        }
    }
}

/// Pages split on form feeds, padded or cut to the document's page count.
fn extract_pages_with_pdftotext(pdf_path: &Path, page_count: usize) -> Result<Vec<String>> {
    if page_count == 0 {
        return Ok(Vec::new());
    }

    let output = Command::new("pdftotext")
        .arg("-enc")
        .arg("UTF-8")
        .arg("-f")
        .arg("1")
        .arg("-l")
        .arg(page_count.to_string())
        .arg(pdf_path)
        .arg("-")
        .output()
        .with_context(|| format!("failed to execute pdftotext for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftotext returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    let mut pages = raw
        .split('\u{000C}')
        .map(|chunk| chunk.replace('\u{0000}', ""))
        .collect::<Vec<String>>();
    pages.resize(page_count, String::new());

    Ok(pages)
}

fn extract_pages_with_lopdf(document: &Document, warnings: &mut Vec<String>) -> Vec<String> {
    document
        .get_pages()
        .keys()
        .map(|page_number| match document.extract_text(&[*page_number]) {
            Ok(text) => text,
            Err(err) => {
                warnings.push(format!("page {page_number}: text extraction failed: {err}"));
                String::new()
            }
        })
        .collect()
}

pub(super) fn page_has_marks(document: &Document, page_id: ObjectId) -> bool {
    let Ok(content) = document.get_page_content(page_id) else {
        return false;
    };
    if content.iter().all(u8::is_ascii_whitespace) {
        return false;
    }

    match Content::decode(&content) {
        Ok(content) => content
            .operations
            .iter()
            .any(|operation| MARKING_OPERATORS.contains(&operation.operator.as_str())),
        Err(_) => true,
    }
}

/// Renders one page with `pdftoppm` and reads it back with `tesseract`.
#[derive(Debug, Clone)]
pub(crate) struct TesseractOcr {
    pdf_path: PathBuf,
    lang: String,
}

impl TesseractOcr {
    /// `None` when either tool is missing from `PATH`.
    pub(crate) fn detect(pdf_path: &Path, lang: &str) -> Option<Self> {
        if !command_available("pdftoppm") || !command_available("tesseract") {
            return None;
        }
        Some(Self {
            pdf_path: pdf_path.to_path_buf(),
            lang: lang.to_string(),
        })
    }

    fn scratch_root(&self, page_number: usize) -> PathBuf {
        let stem = self
            .pdf_path
            .file_stem()
            .and_then(|value| value.to_str())
            .unwrap_or("pdf")
            .chars()
            .map(|character| {
                if character.is_ascii_alphanumeric() {
                    character
                } else {
                    '_'
                }
            })
            .collect::<String>();

        let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        std::env::temp_dir().join(format!(
            "labelsort_ocr_{}_{}_{}_{}",
            stem,
            std::process::id(),
            page_number,
            stamp
        ))
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, page_index: usize, dpi: u32, config: &str) -> Result<String> {
        let page_number = page_index + 1;
        let output_root = self.scratch_root(page_number);
        let png_path = PathBuf::from(format!("{}.png", output_root.display()));

        let pdftoppm_output = Command::new("pdftoppm")
            .arg("-f")
            .arg(page_number.to_string())
            .arg("-l")
            .arg(page_number.to_string())
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-singlefile")
            .arg("-png")
            .arg(&self.pdf_path)
            .arg(&output_root)
            .output()
            .with_context(|| {
                format!("failed to execute pdftoppm for {}", self.pdf_path.display())
            })?;

        if !pdftoppm_output.status.success() {
            let stderr = String::from_utf8_lossy(&pdftoppm_output.stderr);
            bail!(
                "pdftoppm returned non-zero exit status for {} page {}: {}",
                self.pdf_path.display(),
                page_number,
                stderr.trim()
            );
        }

        if !png_path.exists() {
            bail!(
                "pdftoppm did not produce expected image for {} page {}",
                self.pdf_path.display(),
                page_number
            );
        }

        let tesseract_output = Command::new("tesseract")
            .arg(&png_path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang)
            .args(config.split_whitespace())
            .output()
            .with_context(|| format!("failed to execute tesseract for {}", png_path.display()));

        let _ = fs::remove_file(&png_path);
        let tesseract_output = tesseract_output?;

        if !tesseract_output.status.success() {
            let stderr = String::from_utf8_lossy(&tesseract_output.stderr);
            bail!(
                "tesseract returned non-zero exit status for {} page {}: {}",
                self.pdf_path.display(),
                page_number,
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&tesseract_output.stdout)
            .replace('\u{0000}', "")
            .trim()
            .to_string())
    }
}
