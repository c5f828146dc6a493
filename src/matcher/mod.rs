//! Decides whether an OCR-derived candidate and a catalog identifier are the
//! same item.
//!
//! Rules escalate from exact comparison to narrow, family-gated misread
//! corrections. A false match silently swaps two real items in the sorted
//! output while a miss only sends a page to review, so the later rungs stay
//! scoped to the misreads actually seen on label scans.

mod confusables;
mod families;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;

pub use confusables::Confusables;
pub use families::Family;

use families::{FamilyRules, PrefixRepair};

/// Shortest normalized length for which a truncated read is accepted.
const TRUNCATION_MIN_LEN: usize = 8;
const TRUNCATION_MAX_DIFF: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case", tag = "rule", content = "family")]
pub enum MatchRule {
    Exact,
    Separators,
    PrefixRepair,
    Substitution,
    CoreTokens,
    Family(Family),
    Truncation,
}

impl MatchRule {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchRule::Exact => "exact",
            MatchRule::Separators => "separators",
            MatchRule::PrefixRepair => "prefix_repair",
            MatchRule::Substitution => "substitution",
            MatchRule::CoreTokens => "core_tokens",
            MatchRule::Family(family) => family.as_str(),
            MatchRule::Truncation => "truncation",
        }
    }
}

#[derive(Debug)]
pub struct IdentifierMatcher {
    prefix_repairs: Vec<PrefixRepair>,
    confusables: Confusables,
    families: FamilyRules,
    core_token: Regex,
}

impl IdentifierMatcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            prefix_repairs: PrefixRepair::standard()?,
            confusables: Confusables::default(),
            families: FamilyRules::new()?,
            core_token: Regex::new(r"[A-Z0-9]+").context("failed to compile core token regex")?,
        })
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn matches(&self, candidate: &str, reference: &str) -> bool {
        self.match_rule(candidate, reference).is_some()
    }

    /// The first rung of the ladder that accepts the pair.
    pub fn match_rule(&self, candidate: &str, reference: &str) -> Option<MatchRule> {
        let candidate_clean = candidate.trim().to_uppercase();
        let reference_clean = reference.trim().to_uppercase();
        if candidate_clean.is_empty() || reference_clean.is_empty() {
            return None;
        }
        if candidate_clean == reference_clean {
            return Some(MatchRule::Exact);
        }

        let candidate_norm = normalize_separators(&candidate_clean);
        let reference_norm = normalize_separators(&reference_clean);
        if candidate_norm == reference_norm {
            return Some(MatchRule::Separators);
        }

        if self
            .prefix_repairs
            .iter()
            .filter_map(|repair| repair.repair(&candidate_norm, &reference_norm))
            .any(|repaired| repaired == reference_norm)
        {
            return Some(MatchRule::PrefixRepair);
        }

        if self.confusables.corrects_to(&candidate_norm, &reference_norm) {
            return Some(MatchRule::Substitution);
        }

        if self.core_tokens(&candidate_norm) == self.core_tokens(&reference_norm) {
            return Some(MatchRule::CoreTokens);
        }

        if let Some(family) = self.families.accepts(&candidate_norm, &reference_norm) {
            return Some(MatchRule::Family(family));
        }

        if is_truncation(&candidate_norm, &reference_norm) {
            return Some(MatchRule::Truncation);
        }

        None
    }

    /// Best reference for a candidate: the earliest rung wins, ties go to the
    /// entry listed first. Returns the entry's position and the rule used.
    pub fn best_reference(
        &self,
        candidate: &str,
        references: &[String],
    ) -> Option<(usize, MatchRule)> {
        let mut best: Option<(usize, MatchRule)> = None;
        for (position, reference) in references.iter().enumerate() {
            let Some(rule) = self.match_rule(candidate, reference) else {
                continue;
            };
            if rule == MatchRule::Exact {
                return Some((position, rule));
            }
            if best.map(|(_, current)| rule < current).unwrap_or(true) {
                best = Some((position, rule));
            }
        }
        best
    }

    fn core_tokens(&self, input: &str) -> String {
        self.core_token
            .find_iter(input)
            .map(|m| m.as_str())
            .collect::<String>()
    }
}

/// Upper-cases, maps dash and underscore variants to `-` and drops whitespace.
pub fn normalize_separators(input: &str) -> String {
    input
        .trim()
        .to_uppercase()
        .chars()
        .filter_map(|character| match character {
            '—' | '–' | '_' => Some('-'),
            character if character.is_whitespace() => None,
            character => Some(character),
        })
        .collect()
}

fn is_truncation(left: &str, right: &str) -> bool {
    if left.len() < TRUNCATION_MIN_LEN || right.len() < TRUNCATION_MIN_LEN {
        return false;
    }
    if !left.starts_with(right) && !right.starts_with(left) {
        return false;
    }
    left.len().abs_diff(right.len()) <= TRUNCATION_MAX_DIFF
}
