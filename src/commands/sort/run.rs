use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail, ensure};
use chrono::Utc;
use lopdf::Document;
use tracing::{debug, info, warn};

use crate::cli::{FallbackCriterion, OcrMode, RunMode, SortArgs};
use crate::matcher::IdentifierMatcher;
use crate::model::{
    BucketCount, OutputEntry, PageProvenance, SortRunManifest, SortSettings, SourceDocument,
    ToolVersions,
};
use crate::reference::ReferenceTable;
use crate::util::{
    command_version_optional, ensure_directory, now_utc_string, sha256_file, utc_compact_string,
    write_json_pretty,
};

use super::assemble::{OutputPlan, plan_outputs, write_outputs};
use super::buckets::{Bucket, BucketAccumulator, Classification, ClassifiedRun};
use super::classify::{ClassifierSettings, PageClassifier};
use super::extract::{OcrEngine, PageExtractor, PopplerExtractor, TesseractOcr};
use super::routes::RouteTable;
use super::sort_key::SortKeyEngine;

const PROGRESS_INTERVAL: usize = 5;
const DEFAULT_OCR_CONFIGS: &[&str] = &["--psm 6 --oem 1", "--psm 4 --oem 1"];

pub(crate) fn run(args: SortArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("sort-{}", utc_compact_string(started_ts));

    if !args.input.is_file() {
        bail!("input pdf not found: {}", args.input.display());
    }

    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        args.output_dir.join("manifests").join(format!(
            "sort_run_{}.json",
            utc_compact_string(started_ts)
        ))
    });

    info!(
        input = %args.input.display(),
        output_dir = %args.output_dir.display(),
        mode = args.mode.as_str(),
        run_id = %run_id,
        "starting sort"
    );

    let document = Document::load(&args.input)
        .with_context(|| format!("failed to load pdf {}", args.input.display()))?;
    let source_sha256 = sha256_file(&args.input)?;
    let table = ReferenceTable::resolve(args.reference_table.as_deref())?;
    let matcher = IdentifierMatcher::new()?;

    let (extractor, mut warnings) = PopplerExtractor::open(&args.input, &document)?;
    let tesseract = match args.ocr_mode {
        OcrMode::Off => None,
        OcrMode::Auto => TesseractOcr::detect(&args.input, &args.ocr_lang),
    };
    if args.mode == RunMode::Label && args.ocr_mode == OcrMode::Auto && tesseract.is_none() {
        warn!("pdftoppm or tesseract not found; image-only label pages will not be read");
        warnings.push("OCR tools unavailable".to_string());
    }
    let ocr = tesseract.as_ref().map(|engine| engine as &dyn OcrEngine);

    let settings = ClassifierSettings {
        mode: args.mode,
        summary_detector: args.summary_detector,
        fallback_order: args.fallback_order.clone(),
        ocr_dpi: args.ocr_dpi,
        ocr_configs: if args.ocr_configs.is_empty() {
            DEFAULT_OCR_CONFIGS
                .iter()
                .map(|config| config.to_string())
                .collect()
        } else {
            args.ocr_configs.clone()
        },
    };
    let options = OutputOptions {
        output_dir: args.output_dir.clone(),
        split_label_buckets: args.split_label_buckets,
        dry_run: args.dry_run,
    };

    let outcome = process(
        &document, &extractor, ocr, &table, &matcher, &settings, &options,
    )?;
    warnings.extend(outcome.warnings.iter().cloned());

    let manifest = SortRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        status: if args.dry_run { "dry_run" } else { "completed" }.to_string(),
        started_at,
        completed_at: now_utc_string(),
        command: render_sort_command(&args),
        settings: SortSettings {
            mode: args.mode.as_str().to_string(),
            ocr_mode: args.ocr_mode.as_str().to_string(),
            ocr_lang: args.ocr_lang.clone(),
            ocr_dpi: settings.ocr_dpi,
            ocr_configs: settings.ocr_configs.clone(),
            ocr_available: tesseract.is_some(),
            text_backend: extractor.backend().as_str().to_string(),
            summary_detector: args.summary_detector.as_str().to_string(),
            fallback_order: args
                .fallback_order
                .iter()
                .map(|criterion| criterion.as_str().to_string())
                .collect(),
            reference_table: table.source().to_string(),
            reference_entries: table.len(),
            split_label_buckets: args.split_label_buckets,
            dry_run: args.dry_run,
        },
        tool_versions: collect_tool_versions(),
        source: SourceDocument {
            path: args.input.display().to_string(),
            sha256: source_sha256,
            page_count: outcome.run.page_count(),
        },
        bucket_counts: bucket_counts(&outcome.run),
        outputs: output_entries(&outcome, &options.output_dir),
        pages: page_provenance(&outcome.run),
        warnings,
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        manifest = %manifest_path.display(),
        outputs = outcome.written.len(),
        pages = outcome.run.page_count(),
        "sort complete"
    );
    Ok(())
}

#[derive(Debug, Clone)]
pub(super) struct OutputOptions {
    pub(super) output_dir: PathBuf,
    pub(super) split_label_buckets: bool,
    pub(super) dry_run: bool,
}

#[derive(Debug)]
pub(super) struct SortOutcome {
    pub(super) run: ClassifiedRun,
    pub(super) plans: Vec<OutputPlan>,
    pub(super) written: Vec<PathBuf>,
    pub(super) warnings: Vec<String>,
}

/// Classifies every page, sorts each bucket and writes the output documents.
pub(super) fn process(
    document: &Document,
    extractor: &dyn PageExtractor,
    ocr: Option<&dyn OcrEngine>,
    table: &ReferenceTable,
    matcher: &IdentifierMatcher,
    settings: &ClassifierSettings,
    options: &OutputOptions,
) -> Result<SortOutcome> {
    let page_count = extractor.page_count();
    let document_pages = document.get_pages().len();
    ensure!(
        page_count == document_pages,
        "extractor reports {} pages but document has {}",
        page_count,
        document_pages
    );

    let routes = RouteTable::standard()?;
    let classifier = PageClassifier::new(settings, matcher, table, &routes, ocr)?;
    let mut accumulator = BucketAccumulator::new(page_count);

    info!(pages = page_count, mode = settings.mode.as_str(), "classifying pages");
    for page_index in 0..page_count {
        let page = extractor.extract(page_index)?;
        let outcome = classifier.classify(page_index, &page);
        debug!(
            page = page_index + 1,
            bucket = outcome.classification.bucket().as_str(),
            backend = outcome.trace.backend,
            "classified page"
        );
        accumulator.record(page_index, outcome)?;

        let processed = page_index + 1;
        if processed % PROGRESS_INTERVAL == 0 || processed == page_count {
            info!(processed, total = page_count, "classification progress");
        }
    }

    let run = accumulator.finish()?;
    log_bucket_counts(&run)?;

    let keys = SortKeyEngine::new(matcher, table)?;
    let plan = plan_outputs(
        &run,
        &keys,
        &routes,
        classifier.summary_rules(),
        settings.mode,
        options.split_label_buckets,
    );

    let written = if options.dry_run {
        info!(planned = plan.outputs.len(), "dry run; no pdfs written");
        Vec::new()
    } else {
        ensure_directory(&options.output_dir)?;
        write_outputs(document, &plan.outputs, &options.output_dir)?
    };

    Ok(SortOutcome {
        run,
        plans: plan.outputs,
        written,
        warnings: plan.warnings,
    })
}

fn log_bucket_counts(run: &ClassifiedRun) -> Result<()> {
    let mut total = 0;
    for bucket in Bucket::ALL {
        let count = run.count(bucket);
        total += count;
        info!(bucket = bucket.as_str(), pages = count, "bucket count");
    }
    ensure!(
        total == run.page_count(),
        "bucket counts sum to {} but document has {} pages",
        total,
        run.page_count()
    );
    Ok(())
}

fn bucket_counts(run: &ClassifiedRun) -> Vec<BucketCount> {
    Bucket::ALL
        .iter()
        .map(|bucket| BucketCount {
            bucket: bucket.as_str().to_string(),
            pages: run.count(*bucket),
        })
        .collect()
}

fn output_entries(outcome: &SortOutcome, output_dir: &Path) -> Vec<OutputEntry> {
    outcome
        .plans
        .iter()
        .map(|plan| {
            let path = output_dir.join(&plan.file_name);
            OutputEntry {
                bucket: plan.bucket.to_string(),
                written: outcome.written.contains(&path),
                path: path.display().to_string(),
                pages: plan.pages.iter().map(|index| index + 1).collect(),
            }
        })
        .collect()
}

fn page_provenance(run: &ClassifiedRun) -> Vec<PageProvenance> {
    run.pages()
        .iter()
        .map(|page| PageProvenance {
            page_pdf: page.page_index + 1,
            bucket: page.classification.bucket().as_str().to_string(),
            backend: page.trace.backend.to_string(),
            reason: page.trace.reason.to_string(),
            text_char_count: page.trace.text_char_count,
            ocr_config: page.trace.ocr_config.clone(),
            payload: page.classification.payload(),
            resolution: match &page.classification {
                Classification::Matched { resolution, .. } => Some(resolution.render()),
                _ => None,
            },
        })
        .collect()
}

fn collect_tool_versions() -> ToolVersions {
    ToolVersions {
        pdftotext: command_version_optional("pdftotext", &["-v"]),
        pdftoppm: command_version_optional("pdftoppm", &["-v"]),
        tesseract: command_version_optional("tesseract", &["--version"]),
    }
}

pub(super) fn render_sort_command(args: &SortArgs) -> String {
    let mut command = vec![
        "labelsort".to_string(),
        "sort".to_string(),
        "--input".to_string(),
        args.input.display().to_string(),
        "--output-dir".to_string(),
        args.output_dir.display().to_string(),
        "--mode".to_string(),
        args.mode.as_str().to_string(),
        "--ocr-mode".to_string(),
        args.ocr_mode.as_str().to_string(),
        "--ocr-lang".to_string(),
        args.ocr_lang.clone(),
        "--ocr-dpi".to_string(),
        args.ocr_dpi.to_string(),
        "--summary-detector".to_string(),
        args.summary_detector.as_str().to_string(),
    ];

    for config in &args.ocr_configs {
        command.push("--ocr-config".to_string());
        command.push(format!("\"{config}\""));
    }
    if args.fallback_order != FallbackCriterion::default_order() {
        command.push("--fallback-order".to_string());
        command.push(
            args.fallback_order
                .iter()
                .map(|criterion| criterion.as_str().replace('_', "-"))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    if let Some(path) = &args.reference_table {
        command.push("--reference-table".to_string());
        command.push(path.display().to_string());
    }
    if args.split_label_buckets {
        command.push("--split-label-buckets".to_string());
    }
    if let Some(path) = &args.manifest_path {
        command.push("--manifest-path".to_string());
        command.push(path.display().to_string());
    }
    if args.dry_run {
        command.push("--dry-run".to_string());
    }

    command.join(" ")
}
