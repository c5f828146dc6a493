use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use lopdf::{Document, Object, ObjectId};
use tracing::{info, warn};

use crate::cli::RunMode;

use super::buckets::{Bucket, ClassifiedRun};
use super::routes::{RouteCode, RouteTable};
use super::sort_key::SortKeyEngine;
use super::summary::SummaryRules;

pub(crate) const COMBINED_LABELS_FILE: &str = "labels_sorted.pdf";
pub(crate) const UNCLASSIFIED_FILE: &str = "unclassified.pdf";
pub(crate) const UNCLASSIFIED_LABELS_FILE: &str = "unclassified_label_pages_rerun_in_label_mode.pdf";

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];
const MAX_PAGE_TREE_DEPTH: usize = 64;

/// One output document: source page indices in output order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OutputPlan {
    pub(crate) file_name: String,
    pub(crate) bucket: &'static str,
    pub(crate) pages: Vec<usize>,
}

#[derive(Debug, Default)]
pub(crate) struct AssemblyPlan {
    pub(crate) outputs: Vec<OutputPlan>,
    pub(crate) warnings: Vec<String>,
}

pub(crate) fn plan_outputs(
    run: &ClassifiedRun,
    keys: &SortKeyEngine<'_>,
    routes: &RouteTable,
    summary: &SummaryRules,
    mode: RunMode,
    split_label_buckets: bool,
) -> AssemblyPlan {
    let mut plan = AssemblyPlan::default();

    if mode == RunMode::Label {
        let matched = run.ordered(Bucket::Matched, keys, routes);
        let unmatched = run.ordered(Bucket::Unmatched, keys, routes);
        let summaries = run.ordered(Bucket::Summary, keys, routes);

        let combined = matched
            .iter()
            .chain(&unmatched)
            .chain(&summaries)
            .copied()
            .collect::<Vec<_>>();
        if combined.is_empty() {
            warn!("label mode found no label pages; combined output skipped");
            plan.warnings
                .push("label mode found no label pages".to_string());
        } else {
            push_plan(&mut plan, COMBINED_LABELS_FILE, "labels_combined", combined);
        }

        if split_label_buckets {
            push_plan(&mut plan, "labels_matched.pdf", Bucket::Matched.as_str(), matched);
            push_plan(&mut plan, "labels_unmatched.pdf", Bucket::Unmatched.as_str(), unmatched);
            push_plan(&mut plan, "labels_summary.pdf", Bucket::Summary.as_str(), summaries);
        }
    }

    for code in RouteCode::ALL {
        let bucket = Bucket::Route(code);
        let file_name = format!("route_{}_sorted.pdf", code.as_str());
        push_plan(&mut plan, &file_name, bucket.as_str(), run.ordered(bucket, keys, routes));
    }

    let unclassified = run.ordered(Bucket::Unclassified, keys, routes);
    let file_name = if mode == RunMode::Route && mostly_label_pages(run, summary) {
        let message = format!(
            "{} unclassified pages look like customer labels; rerun in label mode",
            unclassified.len()
        );
        warn!(
            pages = unclassified.len(),
            "unclassified pages look like customer labels; rerun in label mode"
        );
        plan.warnings.push(message);
        UNCLASSIFIED_LABELS_FILE
    } else {
        UNCLASSIFIED_FILE
    };
    push_plan(&mut plan, file_name, Bucket::Unclassified.as_str(), unclassified);

    push_plan(
        &mut plan,
        "blank.pdf",
        Bucket::Blank.as_str(),
        run.ordered(Bucket::Blank, keys, routes),
    );

    plan
}

fn push_plan(plan: &mut AssemblyPlan, file_name: &str, bucket: &'static str, pages: Vec<usize>) {
    if pages.is_empty() {
        return;
    }
    plan.outputs.push(OutputPlan {
        file_name: file_name.to_string(),
        bucket,
        pages,
    });
}

/// More than half of the unclassified pages carry a label family marker.
fn mostly_label_pages(run: &ClassifiedRun, summary: &SummaryRules) -> bool {
    let total = run.count(Bucket::Unclassified);
    if total == 0 {
        return false;
    }
    let marked = run
        .members(Bucket::Unclassified)
        .filter(|page| summary.has_family_marker(page.classification.snippet()))
        .count();
    marked * 2 > total
}

pub(crate) fn write_outputs(
    source: &Document,
    plans: &[OutputPlan],
    output_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(plans.len());
    for plan in plans {
        let path = output_dir.join(&plan.file_name);
        write_page_subset(source, &plan.pages, &path)?;
        info!(
            path = %path.display(),
            bucket = plan.bucket,
            pages = plan.pages.len(),
            "wrote output pdf"
        );
        written.push(path);
    }
    Ok(written)
}

/// Writes the given source pages, in order, as a new document. Pages are
/// copied unchanged apart from inherited attributes being made explicit.
pub(crate) fn write_page_subset(source: &Document, pages: &[usize], path: &Path) -> Result<()> {
    let page_ids = source.get_pages().into_values().collect::<Vec<ObjectId>>();
    let kids = pages
        .iter()
        .map(|index| {
            page_ids.get(*index).copied().with_context(|| {
                format!(
                    "page index {} out of range for {} pages",
                    index,
                    page_ids.len()
                )
            })
        })
        .collect::<Result<Vec<ObjectId>>>()?;

    let mut document = source.clone();
    for page_id in &kids {
        push_down_inherited(&mut document, *page_id)?;
    }

    let root_id = document
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .context("pdf trailer has no document catalog")?;
    let catalog = document
        .get_object_mut(root_id)
        .and_then(Object::as_dict_mut)
        .context("failed to read document catalog")?;
    catalog.remove(b"Outlines");
    let pages_id = catalog
        .get(b"Pages")
        .and_then(Object::as_reference)
        .context("document catalog has no page tree")?;

    for page_id in &kids {
        document
            .get_object_mut(*page_id)
            .and_then(Object::as_dict_mut)
            .with_context(|| format!("failed to read page object {page_id:?}"))?
            .set("Parent", Object::Reference(pages_id));
    }

    let page_tree = document
        .get_object_mut(pages_id)
        .and_then(Object::as_dict_mut)
        .context("failed to read page tree root")?;
    page_tree.set(
        "Kids",
        Object::Array(kids.iter().map(|id| Object::Reference(*id)).collect()),
    );
    page_tree.set("Count", Object::Integer(kids.len() as i64));

    document.prune_objects();
    document
        .save(path)
        .with_context(|| format!("failed to write pdf: {}", path.display()))?;
    Ok(())
}

fn push_down_inherited(document: &mut Document, page_id: ObjectId) -> Result<()> {
    let mut inherited = Vec::new();
    {
        let page = document
            .get_dictionary(page_id)
            .with_context(|| format!("failed to read page object {page_id:?}"))?;
        for key in INHERITABLE_KEYS {
            if page.has(key) {
                continue;
            }
            if let Some(value) = inherited_value(document, page_id, key)? {
                inherited.push((key, value));
            }
        }
    }

    if inherited.is_empty() {
        return Ok(());
    }
    let page = document
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .with_context(|| format!("failed to update page object {page_id:?}"))?;
    for (key, value) in inherited {
        page.set(key.to_vec(), value);
    }
    Ok(())
}

fn inherited_value(document: &Document, page_id: ObjectId, key: &[u8]) -> Result<Option<Object>> {
    let mut node_id = page_id;
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        let node = document
            .get_dictionary(node_id)
            .with_context(|| format!("failed to read page tree node {node_id:?}"))?;
        if let Ok(value) = node.get(key) {
            return Ok(Some(value.clone()));
        }
        match node.get(b"Parent").and_then(Object::as_reference) {
            Ok(parent_id) => node_id = parent_id,
            Err(_) => return Ok(None),
        }
    }
    bail!("page tree deeper than {MAX_PAGE_TREE_DEPTH} levels above page {page_id:?}")
}
