use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;

/// Identifier families with their own narrow misread rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Opac,
    Tfo1s,
    Hg,
}

impl Family {
    pub fn as_str(self) -> &'static str {
        match self {
            Family::Opac => "opac",
            Family::Tfo1s => "tfo1s",
            Family::Hg => "hg",
        }
    }
}

/// OCR readings of the TFO1S family code.
const TFO1S_READINGS: &[&str] = &["TFO1S", "TF01S", "TFO15", "TF015"];

/// OPAC size digits the scanner misreads as a 6.
const OPAC_SIZE_MISREADS: &[&str] = &["9", "5"];

/// OPAC suffixes accepted for a reference suffix of `H`.
const OPAC_H_READINGS: &[&str] = &["H", "HB"];

/// Prefixes that can be synthesized onto a candidate missing its numeric head.
#[derive(Debug)]
pub(super) struct PrefixRepair {
    numeric_head: &'static str,
    prefix: &'static str,
    triggers: &'static [&'static str],
    sub_token: Regex,
}

impl PrefixRepair {
    pub(super) fn standard() -> Result<Vec<Self>> {
        Ok(vec![
            Self {
                numeric_head: "048-",
                prefix: "048-OPAC-",
                triggers: &["OPAC"],
                sub_token: Regex::new(r"OPAC-?(\d+[A-Z]?)")
                    .context("failed to compile OPAC prefix-repair regex")?,
            },
            Self {
                numeric_head: "048-",
                prefix: "048-TL-",
                triggers: &["TL", "W"],
                sub_token: Regex::new(r"(W\d+[A-Z]+)")
                    .context("failed to compile TL prefix-repair regex")?,
            },
        ])
    }

    pub(super) fn repair(&self, candidate: &str, reference: &str) -> Option<String> {
        if candidate.starts_with(self.numeric_head) || !reference.starts_with(self.prefix) {
            return None;
        }
        if !self.triggers.iter().any(|token| candidate.contains(token)) {
            return None;
        }

        let captures = self.sub_token.captures(candidate)?;
        let token = captures.get(1)?.as_str();
        Some(format!("{}{}", self.prefix, token))
    }
}

#[derive(Debug)]
pub(super) struct FamilyRules {
    opac: Regex,
    hg: Regex,
}

impl FamilyRules {
    pub(super) fn new() -> Result<Self> {
        Ok(Self {
            opac: Regex::new(r"OPAC-?(\d+)([A-Z]*)").context("failed to compile OPAC regex")?,
            hg: Regex::new(r"HG-?(\d{5})-?([A-Z]*)").context("failed to compile HG regex")?,
        })
    }

    /// First family whose narrow rule accepts the pair. These rules are
    /// directional: misread sets describe what the scanner produces, not what
    /// the catalog lists.
    pub(super) fn accepts(&self, candidate: &str, reference: &str) -> Option<Family> {
        if self.opac_equivalent(candidate, reference) {
            return Some(Family::Opac);
        }
        if tfo1s_equivalent(candidate, reference) {
            return Some(Family::Tfo1s);
        }
        if self.hg_equivalent(candidate, reference) {
            return Some(Family::Hg);
        }
        None
    }

    /// Plain 9/6 misreads are already caught by the substitution rule, so this
    /// only decides the 5-for-6 size and `HB` suffix readings.
    pub(super) fn opac_equivalent(&self, candidate: &str, reference: &str) -> bool {
        if !candidate.contains("OPAC") || !reference.contains("OPAC") {
            return false;
        }

        let (Some(found), Some(expected)) =
            (self.opac.captures(candidate), self.opac.captures(reference))
        else {
            return false;
        };

        let found_size = found.get(1).map(|m| m.as_str()).unwrap_or("");
        let found_suffix = found.get(2).map(|m| m.as_str()).unwrap_or("");
        let expected_size = expected.get(1).map(|m| m.as_str()).unwrap_or("");
        let expected_suffix = expected.get(2).map(|m| m.as_str()).unwrap_or("");

        let size_matches = found_size == expected_size
            || (expected_size == "6" && OPAC_SIZE_MISREADS.contains(&found_size));
        if !size_matches {
            return false;
        }

        found_suffix == expected_suffix
            || (expected_suffix == "H" && OPAC_H_READINGS.contains(&found_suffix))
    }

    fn hg_equivalent(&self, candidate: &str, reference: &str) -> bool {
        if !candidate.contains("HG") || !reference.contains("HG") || !reference.contains("014") {
            return false;
        }

        let (Some(found), Some(expected)) =
            (self.hg.captures(candidate), self.hg.captures(reference))
        else {
            return false;
        };

        found.get(1).map(|m| m.as_str()) == expected.get(1).map(|m| m.as_str())
    }
}

fn tfo1s_equivalent(candidate: &str, reference: &str) -> bool {
    reference.contains("TFO1S")
        && TFO1S_READINGS
            .iter()
            .any(|reading| candidate.contains(reading))
}
