use std::collections::BTreeSet;

use anyhow::{Result, ensure};

use crate::matcher::MatchRule;

use super::routes::{RouteCode, RouteLabel, RouteSortKey, RouteTable};
use super::sort_key::{LabelSortKey, SortKeyEngine};
use super::summary::SummaryKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum Bucket {
    Matched,
    Unmatched,
    Summary,
    Route(RouteCode),
    Unclassified,
    Blank,
}

impl Bucket {
    pub(crate) const ALL: [Bucket; 8] = [
        Bucket::Matched,
        Bucket::Unmatched,
        Bucket::Summary,
        Bucket::Route(RouteCode::R915),
        Bucket::Route(RouteCode::R8090),
        Bucket::Route(RouteCode::R60),
        Bucket::Unclassified,
        Bucket::Blank,
    ];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Bucket::Matched => "labels_matched",
            Bucket::Unmatched => "labels_unmatched",
            Bucket::Summary => "labels_summary",
            Bucket::Route(RouteCode::R915) => "route_915",
            Bucket::Route(RouteCode::R8090) => "route_8090",
            Bucket::Route(RouteCode::R60) => "route_60",
            Bucket::Unclassified => "unclassified",
            Bucket::Blank => "blank",
        }
    }
}

/// How a matched page's identifier was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    Matched(MatchRule),
    Scored(u32),
    Unlisted,
}

impl Resolution {
    pub(crate) fn render(self) -> String {
        match self {
            Resolution::Matched(rule) => rule.as_str().to_string(),
            Resolution::Scored(score) => format!("partial_score_{score}"),
            Resolution::Unlisted => "unlisted".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Classification {
    Blank,
    Route {
        code: RouteCode,
        label: RouteLabel,
    },
    Unclassified {
        snippet: String,
    },
    Matched {
        identifier: String,
        resolution: Resolution,
        snippet: String,
    },
    Unmatched {
        reason: String,
        snippet: String,
    },
    Summary {
        key: SummaryKey,
        snippet: String,
    },
}

impl Classification {
    pub(crate) fn bucket(&self) -> Bucket {
        match self {
            Classification::Blank => Bucket::Blank,
            Classification::Route { code, .. } => Bucket::Route(*code),
            Classification::Unclassified { .. } => Bucket::Unclassified,
            Classification::Matched { .. } => Bucket::Matched,
            Classification::Unmatched { .. } => Bucket::Unmatched,
            Classification::Summary { .. } => Bucket::Summary,
        }
    }

    /// Human-readable payload recorded in the run manifest.
    pub(crate) fn payload(&self) -> Option<String> {
        match self {
            Classification::Blank | Classification::Unclassified { .. } => None,
            Classification::Route { label, .. } => Some(label.render()),
            Classification::Matched { identifier, .. } => Some(identifier.clone()),
            Classification::Unmatched { reason, .. } => Some(reason.clone()),
            Classification::Summary { key, .. } => Some(key.render()),
        }
    }

    pub(crate) fn snippet(&self) -> &str {
        match self {
            Classification::Blank | Classification::Route { .. } => "",
            Classification::Unclassified { snippet }
            | Classification::Matched { snippet, .. }
            | Classification::Unmatched { snippet, .. }
            | Classification::Summary { snippet, .. } => snippet,
        }
    }
}

/// Where a page's text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExtractionTrace {
    pub(crate) backend: &'static str,
    pub(crate) reason: &'static str,
    pub(crate) text_char_count: usize,
    pub(crate) ocr_config: Option<String>,
}

impl ExtractionTrace {
    pub(crate) fn text_layer(text: &str, reason: &'static str) -> Self {
        Self {
            backend: "text_layer",
            reason,
            text_char_count: non_whitespace_char_count(text),
            ocr_config: None,
        }
    }

    pub(crate) fn ocr(text: &str, config: &str) -> Self {
        Self {
            backend: "ocr",
            reason: "text_layer_empty_visual_content",
            text_char_count: non_whitespace_char_count(text),
            ocr_config: Some(config.to_string()),
        }
    }

    pub(crate) fn ocr_failed(reason: &'static str) -> Self {
        Self {
            backend: "none",
            reason,
            text_char_count: 0,
            ocr_config: None,
        }
    }
}

fn non_whitespace_char_count(text: &str) -> usize {
    text.chars()
        .filter(|character| !character.is_whitespace())
        .count()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PageOutcome {
    pub(crate) classification: Classification,
    pub(crate) trace: ExtractionTrace,
}

#[derive(Debug, Clone)]
pub(crate) struct ClassifiedPage {
    pub(crate) page_index: usize,
    pub(crate) classification: Classification,
    pub(crate) trace: ExtractionTrace,
}

/// Run-scoped collection of classified pages. Every page must be recorded
/// exactly once before the run can be finished.
#[derive(Debug)]
pub(crate) struct BucketAccumulator {
    page_count: usize,
    seen: BTreeSet<usize>,
    pages: Vec<ClassifiedPage>,
}

impl BucketAccumulator {
    pub(crate) fn new(page_count: usize) -> Self {
        Self {
            page_count,
            seen: BTreeSet::new(),
            pages: Vec::with_capacity(page_count),
        }
    }

    pub(crate) fn record(&mut self, page_index: usize, outcome: PageOutcome) -> Result<()> {
        ensure!(
            page_index < self.page_count,
            "page index {} out of range for {} pages",
            page_index,
            self.page_count
        );
        ensure!(
            self.seen.insert(page_index),
            "page index {} classified twice",
            page_index
        );

        self.pages.push(ClassifiedPage {
            page_index,
            classification: outcome.classification,
            trace: outcome.trace,
        });
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<ClassifiedRun> {
        ensure!(
            self.pages.len() == self.page_count,
            "classified {} of {} pages",
            self.pages.len(),
            self.page_count
        );
        self.pages.sort_by_key(|page| page.page_index);

        Ok(ClassifiedRun {
            page_count: self.page_count,
            pages: self.pages,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum PageOrder {
    Route(RouteSortKey),
    Label(LabelSortKey),
    Summary(SummaryKey),
    Source,
}

#[derive(Debug)]
pub(crate) struct ClassifiedRun {
    page_count: usize,
    pages: Vec<ClassifiedPage>,
}

impl ClassifiedRun {
    pub(crate) fn page_count(&self) -> usize {
        self.page_count
    }

    /// All pages in source order.
    pub(crate) fn pages(&self) -> &[ClassifiedPage] {
        &self.pages
    }

    pub(crate) fn members(&self, bucket: Bucket) -> impl Iterator<Item = &ClassifiedPage> {
        self.pages
            .iter()
            .filter(move |page| page.classification.bucket() == bucket)
    }

    pub(crate) fn count(&self, bucket: Bucket) -> usize {
        self.members(bucket).count()
    }

    /// Page indices of a bucket in output order. Ties fall back to source order.
    pub(crate) fn ordered(
        &self,
        bucket: Bucket,
        keys: &SortKeyEngine<'_>,
        routes: &RouteTable,
    ) -> Vec<usize> {
        let mut members = self.members(bucket).collect::<Vec<_>>();
        members.sort_by_cached_key(|page| {
            (
                page_order(&page.classification, keys, routes),
                page.page_index,
            )
        });
        members.into_iter().map(|page| page.page_index).collect()
    }
}

fn page_order(
    classification: &Classification,
    keys: &SortKeyEngine<'_>,
    routes: &RouteTable,
) -> PageOrder {
    match classification {
        Classification::Route { code, label } => PageOrder::Route(routes.sort_key(*code, label)),
        Classification::Matched { identifier, .. } => PageOrder::Label(keys.label_key(identifier)),
        Classification::Unmatched { .. } => PageOrder::Label(LabelSortKey::Placeholder),
        Classification::Summary { key, .. } => PageOrder::Summary(*key),
        Classification::Blank | Classification::Unclassified { .. } => PageOrder::Source,
    }
}
