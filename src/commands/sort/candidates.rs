use std::collections::HashSet;

use anyhow::{Context, Result};
use regex::Regex;

use crate::cli::FallbackCriterion;

/// Identifier shapes in priority order, complete shapes before the loose ones
/// that only exist to salvage damaged reads.
const IDENTIFIER_PATTERNS: &[&str] = &[
    r"\b(\d{3})-([A-Z]{2,4})-([A-Z0-9]+)\b",
    r"\b(\d{3})-([A-Z]{2,4})—(\d+)-?([A-Z]*)\b",
    r"\b([A-Z0-9]{3,5})-([A-Z]{2})\b",
    r"\b([A-Z0-9]{3,5})—([A-Z]{2})\b",
    r"\b(\d{3})-([A-Z]{2})—([A-Z0-9]+)\b",
    r"\b(014)-([A-Z]{2})-(\d{5})-([A-Z]+)\b",
    r"\b(014)-([A-Z]{2})-(\d{5})-([A-Z]{2,3})\b",
    r"\b(014)-([A-Z]{2})-(\d{5})\b",
    r"\b(050)-([A-Z]{2,3})-(\d{2,5})-?([A-Z]*)\b",
    r"\b(060)-([A-Z]{3})-(\d{2,3}[A-Z]*)-([A-Z]{2,3})\b",
    r"(\d{3})\s*-\s*([A-Z]{2,4})\s*[-—]\s*([A-Z0-9]+)",
    r"(\d{3})\s*-\s*([A-Z]{2,4})\s*[-—]\s*([A-Z0-9]*)",
    r"([A-Z0-9]{3,5})\s*[-—]\s*([A-Z]{2})",
    r"(\d{3})\s*[-—]?\s*([A-Z]{2,4})",
    r"([A-Z0-9]{4,6})\s*[-—]\s*([A-Z]{1,3})",
    r"\b(\d{3})-([A-Z]{2,4})-([A-Z0-9-]+)\b",
    r"\b([A-Z0-9]{3,6})-([A-Z0-9]{2,6})\b",
];

const MIN_CANDIDATE_LEN: usize = 5;
/// Page-number tokens printed by the label printer.
const PAGE_TOKEN_PREFIXES: &[&str] = &["101-", "102-", "103-", "104-", "105-"];
/// Leading digit groups shared by a whole identifier family.
const FAMILY_HEADS: &[&str] = &["048", "TF", "060", "014", "050"];
const SCORED_KEYWORDS: &[&str] = &["OPAC", "ROT", "HG"];

const FAMILY_HEAD_SCORE: u32 = 50;
const OPAC_TL_SCORE: u32 = 30;
const KEYWORD_SCORE: u32 = 20;
pub(crate) const PARTIAL_MATCH_THRESHOLD: u32 = 50;

#[derive(Debug)]
pub(crate) struct CandidateExtractor {
    patterns: Vec<Regex>,
    bare_four_digits: Regex,
    timestamp: Regex,
    time_marker: Regex,
    known_family: Regex,
}

impl CandidateExtractor {
    pub(crate) fn new() -> Result<Self> {
        let patterns = IDENTIFIER_PATTERNS
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .with_context(|| format!("failed to compile identifier regex: {pattern}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            patterns,
            bare_four_digits: Regex::new(r"^\d{4}$")
                .context("failed to compile four-digit regex")?,
            timestamp: Regex::new(r"^\d{3}-[A-Z]{2,4}$")
                .context("failed to compile timestamp regex")?,
            time_marker: Regex::new(r"AOI|AATT|AI0").context("failed to compile time marker regex")?,
            known_family: Regex::new(r"^(048-(OPAC|TL)|TFO1S|060-ROT|014-HG|050-(HA|LMT))")
                .context("failed to compile known family regex")?,
        })
    }

    /// Validated candidates from upper-cased page text, first-seen order.
    pub(crate) fn extract(&self, text: &str) -> Vec<String> {
        let upper = text.to_uppercase();
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for pattern in &self.patterns {
            for captures in pattern.captures_iter(&upper) {
                let candidate = captures
                    .iter()
                    .skip(1)
                    .flatten()
                    .map(|group| group.as_str())
                    .filter(|part| !part.is_empty())
                    .collect::<Vec<_>>()
                    .join("-");

                if self.is_plausible(&candidate) && seen.insert(candidate.clone()) {
                    candidates.push(candidate);
                }
            }
        }

        candidates
    }

    pub(crate) fn is_plausible(&self, candidate: &str) -> bool {
        candidate.chars().count() >= MIN_CANDIDATE_LEN
            && candidate.chars().any(|c| c.is_ascii_uppercase())
            && candidate.chars().any(|c| c.is_ascii_digit())
            && !self.bare_four_digits.is_match(candidate)
            && !candidate.starts_with("AGD")
            && !self.timestamp.is_match(candidate)
            && !PAGE_TOKEN_PREFIXES
                .iter()
                .any(|prefix| candidate.starts_with(prefix))
            && !self.time_marker.is_match(candidate)
    }

    /// Highest-scoring reference for the first candidate that clears the
    /// threshold. Equal scores keep the entry listed first.
    pub(crate) fn best_partial(
        &self,
        candidates: &[String],
        references: &[String],
    ) -> Option<(usize, u32)> {
        for candidate in candidates {
            let mut best: Option<(usize, u32)> = None;
            for (position, reference) in references.iter().enumerate() {
                let score = partial_score(candidate, reference);
                if score > best.map(|(_, current)| current).unwrap_or(0) {
                    best = Some((position, score));
                }
            }
            if let Some(hit) = best.filter(|(_, score)| *score >= PARTIAL_MATCH_THRESHOLD) {
                return Some(hit);
            }
        }
        None
    }

    /// Most plausible raw candidate under the configured criteria; earlier
    /// candidates win ties.
    pub(crate) fn rank_fallback<'c>(
        &self,
        candidates: &'c [String],
        order: &[FallbackCriterion],
    ) -> Option<&'c String> {
        let mut best: Option<(&String, Vec<usize>)> = None;
        for candidate in candidates {
            let rank = order
                .iter()
                .map(|criterion| self.criterion_score(*criterion, candidate))
                .collect::<Vec<_>>();
            let better = best
                .as_ref()
                .map(|(_, current)| rank > *current)
                .unwrap_or(true);
            if better {
                best = Some((candidate, rank));
            }
        }
        best.map(|(candidate, _)| candidate)
    }

    fn criterion_score(&self, criterion: FallbackCriterion, candidate: &str) -> usize {
        match criterion {
            FallbackCriterion::FamilyPrefix => usize::from(self.known_family.is_match(candidate)),
            FallbackCriterion::Length => candidate.chars().count(),
            FallbackCriterion::Separator => {
                usize::from(candidate.contains('-') || candidate.contains('—'))
            }
        }
    }
}

pub(crate) fn partial_score(candidate: &str, reference: &str) -> u32 {
    let mut score = 0;

    if let Some(head) = FAMILY_HEADS
        .iter()
        .find(|head| candidate.starts_with(*head) && reference.starts_with(*head))
    {
        score += FAMILY_HEAD_SCORE;
        if *head == "048"
            && ["OPAC", "TL"]
                .iter()
                .any(|token| candidate.contains(token) && reference.contains(token))
        {
            score += OPAC_TL_SCORE;
        }
    }

    for keyword in SCORED_KEYWORDS {
        if candidate.contains(keyword) && reference.contains(keyword) {
            score += KEYWORD_SCORE;
        }
    }

    score
}
