use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SourceDocument {
    pub path: String,
    pub sha256: String,
    pub page_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolVersions {
    pub pdftotext: Option<String>,
    pub pdftoppm: Option<String>,
    pub tesseract: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SortSettings {
    pub mode: String,
    pub ocr_mode: String,
    pub ocr_lang: String,
    pub ocr_dpi: u32,
    pub ocr_configs: Vec<String>,
    pub ocr_available: bool,
    pub text_backend: String,
    pub summary_detector: String,
    pub fallback_order: Vec<String>,
    pub reference_table: String,
    pub reference_entries: usize,
    pub split_label_buckets: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketCount {
    pub bucket: String,
    pub pages: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputEntry {
    pub bucket: String,
    pub path: String,
    pub written: bool,
    /// 1-based source page numbers in output order.
    pub pages: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageProvenance {
    pub page_pdf: usize,
    pub bucket: String,
    pub backend: String,
    pub reason: String,
    pub text_char_count: usize,
    pub ocr_config: Option<String>,
    pub payload: Option<String>,
    pub resolution: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SortRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub completed_at: String,
    pub command: String,
    pub settings: SortSettings,
    pub tool_versions: ToolVersions,
    pub source: SourceDocument,
    pub bucket_counts: Vec<BucketCount>,
    pub outputs: Vec<OutputEntry>,
    pub pages: Vec<PageProvenance>,
    pub warnings: Vec<String>,
}
