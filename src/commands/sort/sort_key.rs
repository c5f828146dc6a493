use anyhow::{Context, Result};
use regex::Regex;

use crate::matcher::{IdentifierMatcher, normalize_separators};
use crate::reference::ReferenceTable;

/// Group assigned to alphanumeric-family identifiers such as `TFO1S-BK`.
const ALNUM_FAMILY_GROUP: u64 = 999;
const LETTER_RUN_GROUP: u64 = 1000;
const UNKNOWN_SHAPE_GROUP: u64 = 9999;

/// Ordering of a label page. Variant order is the bucket order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum LabelSortKey {
    Reference(usize),
    Pattern(PatternKey),
    Unlisted(String),
    Placeholder,
}

/// Structural decomposition used when no reference table is loaded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct PatternKey {
    pub(crate) group: u64,
    pub(crate) family: String,
    pub(crate) number: u64,
    pub(crate) tail: String,
}

#[derive(Debug)]
struct PatternKeyParser {
    numbered_family: Regex,
    lettered_family: Regex,
    numbered_pair: Regex,
    alnum_family: Regex,
    letter_run: Regex,
}

impl PatternKeyParser {
    fn new() -> Result<Self> {
        Ok(Self {
            numbered_family: Regex::new(r"(\d{3})-([A-Z]{2,4})-(\d+)(.*)")
                .context("failed to compile numbered family regex")?,
            lettered_family: Regex::new(r"(\d{3})-([A-Z]{2})-([A-Z0-9]+)")
                .context("failed to compile lettered family regex")?,
            numbered_pair: Regex::new(r"(\d+)-([A-Z]+)")
                .context("failed to compile numbered pair regex")?,
            alnum_family: Regex::new(r"([A-Z0-9]{3,5})-([A-Z]{2})")
                .context("failed to compile alphanumeric family regex")?,
            letter_run: Regex::new(r"([A-Z]{2,4})(\d+)([A-Z]*)")
                .context("failed to compile letter run regex")?,
        })
    }

    fn key(&self, identifier: &str) -> PatternKey {
        let normalized = normalize_separators(identifier);

        if let Some(captures) = self.numbered_family.captures(&normalized) {
            return PatternKey {
                group: number(captures.get(1).map(|m| m.as_str())),
                family: text(captures.get(2).map(|m| m.as_str())),
                number: number(captures.get(3).map(|m| m.as_str())),
                tail: text(captures.get(4).map(|m| m.as_str())),
            };
        }
        if let Some(captures) = self.lettered_family.captures(&normalized) {
            return PatternKey {
                group: number(captures.get(1).map(|m| m.as_str())),
                family: text(captures.get(2).map(|m| m.as_str())),
                number: 0,
                tail: text(captures.get(3).map(|m| m.as_str())),
            };
        }
        if let Some(captures) = self.numbered_pair.captures(&normalized) {
            return PatternKey {
                group: number(captures.get(1).map(|m| m.as_str())),
                family: text(captures.get(2).map(|m| m.as_str())),
                number: 0,
                tail: String::new(),
            };
        }
        if let Some(captures) = self.alnum_family.captures(&normalized) {
            return PatternKey {
                group: ALNUM_FAMILY_GROUP,
                family: text(captures.get(1).map(|m| m.as_str())),
                number: 0,
                tail: text(captures.get(2).map(|m| m.as_str())),
            };
        }
        if let Some(captures) = self.letter_run.captures(&normalized) {
            return PatternKey {
                group: LETTER_RUN_GROUP,
                family: text(captures.get(1).map(|m| m.as_str())),
                number: number(captures.get(2).map(|m| m.as_str())),
                tail: text(captures.get(3).map(|m| m.as_str())),
            };
        }

        PatternKey {
            group: UNKNOWN_SHAPE_GROUP,
            family: normalized,
            number: 0,
            tail: String::new(),
        }
    }
}

fn number(digits: Option<&str>) -> u64 {
    digits
        .and_then(|digits| digits.parse::<u64>().ok())
        .unwrap_or(u64::MAX)
}

fn text(value: Option<&str>) -> String {
    value.unwrap_or_default().to_string()
}

pub(crate) struct SortKeyEngine<'a> {
    matcher: &'a IdentifierMatcher,
    table: &'a ReferenceTable,
    patterns: PatternKeyParser,
}

impl<'a> SortKeyEngine<'a> {
    pub(crate) fn new(matcher: &'a IdentifierMatcher, table: &'a ReferenceTable) -> Result<Self> {
        Ok(Self {
            matcher,
            table,
            patterns: PatternKeyParser::new()?,
        })
    }

    pub(crate) fn label_key(&self, identifier: &str) -> LabelSortKey {
        if self.table.is_empty() {
            return LabelSortKey::Pattern(self.patterns.key(identifier));
        }
        if let Some(position) = self.table.position(identifier) {
            return LabelSortKey::Reference(position);
        }
        match self.matcher.best_reference(identifier, self.table.entries()) {
            Some((position, _)) => LabelSortKey::Reference(position),
            None => LabelSortKey::Unlisted(identifier.to_string()),
        }
    }
}
