use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "labelsort",
    version,
    about = "Sort scanned shipping-label PDFs into route and customer-label outputs"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Sort(SortArgs),
    Match(MatchArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SortArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, default_value = "out")]
    pub output_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = RunMode::Route)]
    pub mode: RunMode,

    #[arg(long, value_enum, default_value_t = OcrMode::Auto)]
    pub ocr_mode: OcrMode,

    #[arg(long, default_value = "eng")]
    pub ocr_lang: String,

    #[arg(long, default_value_t = 120)]
    pub ocr_dpi: u32,

    /// Tesseract argument sets, tried in order until one yields text.
    #[arg(long = "ocr-config")]
    pub ocr_configs: Vec<String>,

    /// Reference order table (.txt, .csv or .json). Defaults to the built-in table.
    #[arg(long)]
    pub reference_table: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = SummaryDetector::Loose)]
    pub summary_detector: SummaryDetector,

    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_values_t = FallbackCriterion::default_order()
    )]
    pub fallback_order: Vec<FallbackCriterion>,

    #[arg(long, default_value_t = false)]
    pub split_label_buckets: bool,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct MatchArgs {
    #[arg(long)]
    pub candidate: String,

    /// Compare against a single identifier instead of the reference table.
    #[arg(long)]
    pub reference: Option<String>,

    #[arg(long)]
    pub reference_table: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RunMode {
    Route,
    Label,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Route => "route",
            Self::Label => "label",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OcrMode {
    Off,
    Auto,
}

impl OcrMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Auto => "auto",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SummaryDetector {
    /// Any aggregate-count phrase marks a summary page.
    Loose,
    /// Requires family marker, numbered-label marker and aggregator marker with no detailed identifier.
    Strict,
}

impl SummaryDetector {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loose => "loose",
            Self::Strict => "strict",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum FallbackCriterion {
    FamilyPrefix,
    Length,
    Separator,
}

impl FallbackCriterion {
    pub fn default_order() -> Vec<Self> {
        vec![Self::FamilyPrefix, Self::Length, Self::Separator]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FamilyPrefix => "family_prefix",
            Self::Length => "length",
            Self::Separator => "separator",
        }
    }
}
