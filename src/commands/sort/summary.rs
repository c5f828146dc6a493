use anyhow::{Context, Result};
use regex::Regex;

use crate::cli::SummaryDetector;

/// Ordering key for summary pages: order numbers first, then counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum SummaryKey {
    OrderNumber(u64),
    Count(u64),
    Unkeyed,
}

impl SummaryKey {
    pub(crate) fn render(self) -> String {
        match self {
            SummaryKey::OrderNumber(number) => format!("order {number}"),
            SummaryKey::Count(count) => format!("count {count}"),
            SummaryKey::Unkeyed => "unkeyed".to_string(),
        }
    }
}

const LOOSE_PHRASES: &[&str] = &[
    r"TOTAL\s+\d+\s+LABELS",
    r"UPS:\s*\d+\s+LABELS",
    r"SINGLE.*LABEL",
    r"TOTAL.*\d+.*LABEL",
];

const DETAILED_IDENTIFIERS: &[&str] = &[
    r"\b\d{3}-[A-Z]{2,4}-[A-Z0-9]+\b",
    r"\b[A-Z0-9]{4,6}-[A-Z]{2}\b",
    r"\b\d{3}-[A-Z]{2,4}—\d+\b",
    r"\b[A-Z0-9]{3,5}—[A-Z]{2}\b",
];

#[derive(Debug)]
pub(crate) struct SummaryRules {
    detector: SummaryDetector,
    loose_phrases: Vec<Regex>,
    family_marker: Regex,
    numbered_label: Regex,
    aggregator: Regex,
    detailed_identifiers: Vec<Regex>,
    order_number: Regex,
    ups_count: Regex,
    total_count: Regex,
}

impl SummaryRules {
    pub(crate) fn new(detector: SummaryDetector) -> Result<Self> {
        Ok(Self {
            detector,
            loose_phrases: compile_all(LOOSE_PHRASES, "summary phrase")?,
            family_marker: Regex::new(r"ALN|ALGIN|ALIGN")
                .context("failed to compile family marker regex")?,
            numbered_label: Regex::new(r"UPS\d*L")
                .context("failed to compile numbered label regex")?,
            aggregator: Regex::new(r"FSO").context("failed to compile aggregator regex")?,
            detailed_identifiers: compile_all(DETAILED_IDENTIFIERS, "detailed identifier")?,
            order_number: Regex::new(r"SO#\s*(\d+)")
                .context("failed to compile order number regex")?,
            ups_count: Regex::new(r"UPS:\s*(\d+)").context("failed to compile UPS count regex")?,
            total_count: Regex::new(r"TOTAL\s+(\d+)\s+LABELS")
                .context("failed to compile total count regex")?,
        })
    }

    pub(crate) fn is_summary(&self, text: &str) -> bool {
        let upper = text.to_uppercase();
        match self.detector {
            SummaryDetector::Loose => self
                .loose_phrases
                .iter()
                .any(|phrase| phrase.is_match(&upper)),
            SummaryDetector::Strict => {
                self.family_marker.is_match(&upper)
                    && self.numbered_label.is_match(&upper)
                    && self.aggregator.is_match(&upper)
                    && !self
                        .detailed_identifiers
                        .iter()
                        .any(|pattern| pattern.is_match(&upper))
            }
        }
    }

    pub(crate) fn key(&self, text: &str) -> SummaryKey {
        let upper = text.to_uppercase();
        if let Some(number) = first_number(&self.order_number, &upper) {
            return SummaryKey::OrderNumber(number);
        }
        if let Some(count) =
            first_number(&self.ups_count, &upper).or_else(|| first_number(&self.total_count, &upper))
        {
            return SummaryKey::Count(count);
        }
        SummaryKey::Unkeyed
    }

    /// True when the text carries a label family marker.
    pub(crate) fn has_family_marker(&self, text: &str) -> bool {
        self.family_marker.is_match(&text.to_uppercase())
    }
}

fn first_number(pattern: &Regex, text: &str) -> Option<u64> {
    pattern
        .captures(text)
        .and_then(|captures| captures.get(1))
        .and_then(|digits| digits.as_str().parse::<u64>().ok())
}

fn compile_all(patterns: &[&str], what: &str) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).with_context(|| format!("failed to compile {what} regex: {pattern}"))
        })
        .collect()
}
