use anyhow::Result;
use tracing::{debug, warn};

use crate::cli::{FallbackCriterion, RunMode, SummaryDetector};
use crate::matcher::IdentifierMatcher;
use crate::reference::ReferenceTable;
use crate::util::truncate_chars;

use super::buckets::{Classification, ExtractionTrace, PageOutcome, Resolution};
use super::candidates::CandidateExtractor;
use super::extract::{ExtractedPage, OcrEngine};
use super::routes::{RouteDetection, RouteTable};
use super::summary::SummaryRules;

pub(crate) const OCR_UNAVAILABLE: &str = "OCR unavailable";
pub(crate) const OCR_EMPTY: &str = "OCR produced no text";
pub(crate) const NO_IDENTIFIER: &str = "no identifier recognized";

const LABEL_SNIPPET_CHARS: usize = 200;
const SHORT_SNIPPET_CHARS: usize = 100;
const OCR_ERROR_CHARS: usize = 120;

/// Knobs for one classification run.
#[derive(Debug, Clone)]
pub(crate) struct ClassifierSettings {
    pub(crate) mode: RunMode,
    pub(crate) summary_detector: SummaryDetector,
    pub(crate) fallback_order: Vec<FallbackCriterion>,
    pub(crate) ocr_dpi: u32,
    pub(crate) ocr_configs: Vec<String>,
}

enum OcrAttempt {
    Recognized { text: String, config: String },
    Empty,
    Failed { last_error: String },
    Unavailable,
}

/// Stateless per-page classification. Holds compiled rules and borrowed
/// run context; calling it never mutates anything.
pub(crate) struct PageClassifier<'a> {
    settings: &'a ClassifierSettings,
    matcher: &'a IdentifierMatcher,
    table: &'a ReferenceTable,
    ocr: Option<&'a dyn OcrEngine>,
    routes: &'a RouteTable,
    summary: SummaryRules,
    candidates: CandidateExtractor,
}

impl<'a> PageClassifier<'a> {
    pub(crate) fn new(
        settings: &'a ClassifierSettings,
        matcher: &'a IdentifierMatcher,
        table: &'a ReferenceTable,
        routes: &'a RouteTable,
        ocr: Option<&'a dyn OcrEngine>,
    ) -> Result<Self> {
        Ok(Self {
            settings,
            matcher,
            table,
            ocr,
            routes,
            summary: SummaryRules::new(settings.summary_detector)?,
            candidates: CandidateExtractor::new()?,
        })
    }

    pub(crate) fn summary_rules(&self) -> &SummaryRules {
        &self.summary
    }

    pub(crate) fn classify(&self, page_index: usize, page: &ExtractedPage) -> PageOutcome {
        if !page.has_text() && !page.has_visual_content {
            return PageOutcome {
                classification: Classification::Blank,
                trace: ExtractionTrace::text_layer(&page.text, "text_layer_empty"),
            };
        }

        let label_mode = self.settings.mode == RunMode::Label;
        if !page.has_text() && !label_mode {
            return PageOutcome {
                classification: Classification::Unclassified {
                    snippet: String::new(),
                },
                trace: ExtractionTrace::text_layer(&page.text, "text_layer_empty_visual_content"),
            };
        }

        let (text, trace) = if page.has_text() {
            (
                page.text.clone(),
                ExtractionTrace::text_layer(&page.text, "text_layer_default"),
            )
        } else {
            match self.run_ocr(page_index) {
                OcrAttempt::Recognized { text, config } => {
                    let trace = ExtractionTrace::ocr(&text, &config);
                    (text, trace)
                }
                OcrAttempt::Empty => {
                    return PageOutcome {
                        classification: unmatched(OCR_EMPTY.to_string(), ""),
                        trace: ExtractionTrace::ocr_failed("ocr_empty"),
                    };
                }
                OcrAttempt::Failed { last_error } => {
                    let reason = format!(
                        "OCR failed: {}",
                        truncate_chars(&last_error, OCR_ERROR_CHARS)
                    );
                    return PageOutcome {
                        classification: unmatched(reason, ""),
                        trace: ExtractionTrace::ocr_failed("ocr_failed"),
                    };
                }
                OcrAttempt::Unavailable => {
                    return PageOutcome {
                        classification: unmatched(OCR_UNAVAILABLE.to_string(), ""),
                        trace: ExtractionTrace::ocr_failed("ocr_unavailable"),
                    };
                }
            }
        };

        PageOutcome {
            classification: self.classify_text(&text),
            trace,
        }
    }

    /// Summary, route and label rules applied to a page that has text.
    pub(crate) fn classify_text(&self, text: &str) -> Classification {
        let label_mode = self.settings.mode == RunMode::Label;

        if label_mode && self.summary.is_summary(text) {
            return self.summary_page(text);
        }

        match self.routes.detect(text) {
            Some(RouteDetection::Recognized { code, label }) => {
                return Classification::Route { code, label };
            }
            Some(RouteDetection::UnknownPrefix { prefix }) => {
                debug!(prefix = %prefix, "route label with unknown prefix");
                return Classification::Unclassified {
                    snippet: truncate_chars(text, SHORT_SNIPPET_CHARS),
                };
            }
            None => {}
        }

        if label_mode {
            return self.classify_label(text);
        }

        Classification::Unclassified {
            snippet: truncate_chars(text, SHORT_SNIPPET_CHARS),
        }
    }

    fn classify_label(&self, text: &str) -> Classification {
        let snippet = truncate_chars(text, LABEL_SNIPPET_CHARS);
        let candidates = self.candidates.extract(text);
        if candidates.is_empty() {
            return unmatched(NO_IDENTIFIER.to_string(), &snippet);
        }

        if !self.table.is_empty() {
            let entries = self.table.entries();
            for candidate in &candidates {
                if let Some((position, rule)) = self.matcher.best_reference(candidate, entries) {
                    return Classification::Matched {
                        identifier: entries[position].clone(),
                        resolution: Resolution::Matched(rule),
                        snippet,
                    };
                }
            }

            if let Some((position, score)) = self.candidates.best_partial(&candidates, entries) {
                return Classification::Matched {
                    identifier: entries[position].clone(),
                    resolution: Resolution::Scored(score),
                    snippet,
                };
            }
        }

        match self
            .candidates
            .rank_fallback(&candidates, &self.settings.fallback_order)
        {
            Some(candidate) => Classification::Matched {
                identifier: candidate.clone(),
                resolution: Resolution::Unlisted,
                snippet,
            },
            None => unmatched(NO_IDENTIFIER.to_string(), &snippet),
        }
    }

    fn summary_page(&self, text: &str) -> Classification {
        Classification::Summary {
            key: self.summary.key(text),
            snippet: truncate_chars(text, SHORT_SNIPPET_CHARS),
        }
    }

    fn run_ocr(&self, page_index: usize) -> OcrAttempt {
        let Some(engine) = self.ocr else {
            return OcrAttempt::Unavailable;
        };

        let mut produced_output = false;
        let mut last_error: Option<String> = None;

        for config in &self.settings.ocr_configs {
            match engine.recognize(page_index, self.settings.ocr_dpi, config) {
                Ok(text) if !text.trim().is_empty() => {
                    debug!(page = page_index + 1, config = %config, "OCR recognized text");
                    return OcrAttempt::Recognized {
                        text,
                        config: config.clone(),
                    };
                }
                Ok(_) => produced_output = true,
                Err(err) => {
                    warn!(page = page_index + 1, config = %config, error = %err, "OCR attempt failed");
                    last_error = Some(err.to_string());
                }
            }
        }

        match last_error {
            Some(last_error) if !produced_output => OcrAttempt::Failed { last_error },
            _ => OcrAttempt::Empty,
        }
    }
}

fn unmatched(reason: String, snippet: &str) -> Classification {
    Classification::Unmatched {
        reason,
        snippet: snippet.to_string(),
    }
}
