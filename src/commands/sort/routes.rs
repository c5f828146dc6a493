use anyhow::{Context, Result};
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum RouteCode {
    R915,
    R8090,
    R60,
}

impl RouteCode {
    pub(crate) const ALL: [RouteCode; 3] = [RouteCode::R915, RouteCode::R8090, RouteCode::R60];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            RouteCode::R915 => "915",
            RouteCode::R8090 => "8090",
            RouteCode::R60 => "60",
        }
    }
}

/// Location printed on a route label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RouteLabel {
    /// `WZ-101-ABC`: prefix, bin number, free suffix.
    Numbered {
        prefix: String,
        number: u32,
        suffix: String,
    },
    /// `AA-AB-12`: prefix, row, bin number.
    Rowed {
        prefix: String,
        row: String,
        number: u32,
    },
}

impl RouteLabel {
    pub(crate) fn render(&self) -> String {
        match self {
            RouteLabel::Numbered {
                prefix,
                number,
                suffix,
            } => format!("{prefix}-{number:03}-{suffix}"),
            RouteLabel::Rowed {
                prefix,
                row,
                number,
            } => format!("{prefix}-{row}-{number}"),
        }
    }
}

/// (prefix rank, row rank, bin number). Unknown tokens rank after every known one.
pub(crate) type RouteSortKey = (usize, usize, u32);

#[derive(Debug, Clone)]
pub(crate) struct RouteDefinition {
    pub(crate) code: RouteCode,
    pub(crate) prefixes: Vec<String>,
    pub(crate) rows: Option<Vec<String>>,
}

impl RouteDefinition {
    fn prefix_rank(&self, prefix: &str) -> usize {
        self.prefixes
            .iter()
            .position(|known| known == prefix)
            .unwrap_or(self.prefixes.len())
    }

    fn row_rank(&self, row: &str) -> usize {
        match &self.rows {
            Some(rows) => rows.iter().position(|known| known == row).unwrap_or(rows.len()),
            None => 0,
        }
    }

    pub(crate) fn has_prefix(&self, prefix: &str) -> bool {
        self.prefixes.iter().any(|known| known == prefix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RouteDetection {
    Recognized { code: RouteCode, label: RouteLabel },
    UnknownPrefix { prefix: String },
}

#[derive(Debug)]
pub(crate) struct RouteTable {
    definitions: Vec<RouteDefinition>,
    numbered: Regex,
    rowed: Regex,
}

impl RouteTable {
    pub(crate) fn standard() -> Result<Self> {
        let mut prefixes_915 = vec!["WZ".to_string(), "WX".to_string()];
        prefixes_915.extend(('A'..='X').map(|letter| format!("X{letter}")));

        let mut rows_8090 = ('A'..='Z')
            .map(|letter| format!("A{letter}"))
            .collect::<Vec<String>>();
        rows_8090.extend(('P'..='Z').map(|letter| format!("{letter}{letter}")));

        Ok(Self {
            definitions: vec![
                RouteDefinition {
                    code: RouteCode::R915,
                    prefixes: prefixes_915,
                    rows: None,
                },
                RouteDefinition {
                    code: RouteCode::R8090,
                    prefixes: to_strings(&["AA", "BB", "CC", "DD", "EE", "FF"]),
                    rows: Some(rows_8090),
                },
                RouteDefinition {
                    code: RouteCode::R60,
                    prefixes: to_strings(&["GA", "GB", "GC"]),
                    rows: Some(to_strings(&["AA", "AB", "AC", "AD"])),
                },
            ],
            numbered: Regex::new(r"\b([A-Z]{2})-(\d{3})-([A-Z0-9]+)\b")
                .context("failed to compile numbered route regex")?,
            rowed: Regex::new(r"\b([A-Z]{2})-([A-Z]{2})-(\d{2,3})\b")
                .context("failed to compile rowed route regex")?,
        })
    }

    pub(crate) fn definition(&self, code: RouteCode) -> Option<&RouteDefinition> {
        self.definitions
            .iter()
            .find(|definition| definition.code == code)
    }

    /// The numbered shape is tried first and, when present, decides alone.
    pub(crate) fn detect(&self, text: &str) -> Option<RouteDetection> {
        if let Some(captures) = self.numbered.captures(text) {
            let prefix = captures.get(1)?.as_str().to_string();
            let number = captures.get(2)?.as_str().parse::<u32>().ok()?;
            let suffix = captures.get(3)?.as_str().to_string();

            let known = self
                .definition(RouteCode::R915)
                .map(|definition| definition.has_prefix(&prefix))
                .unwrap_or(false);
            if !known {
                return Some(RouteDetection::UnknownPrefix { prefix });
            }
            return Some(RouteDetection::Recognized {
                code: RouteCode::R915,
                label: RouteLabel::Numbered {
                    prefix,
                    number,
                    suffix,
                },
            });
        }

        let captures = self.rowed.captures(text)?;
        let prefix = captures.get(1)?.as_str().to_string();
        let row = captures.get(2)?.as_str().to_string();
        let number = captures.get(3)?.as_str().parse::<u32>().ok()?;

        let code = [RouteCode::R8090, RouteCode::R60].into_iter().find(|code| {
            self.definition(*code)
                .map(|definition| definition.has_prefix(&prefix))
                .unwrap_or(false)
        });

        match code {
            Some(code) => Some(RouteDetection::Recognized {
                code,
                label: RouteLabel::Rowed {
                    prefix,
                    row,
                    number,
                },
            }),
            None => Some(RouteDetection::UnknownPrefix { prefix }),
        }
    }

    pub(crate) fn sort_key(&self, code: RouteCode, label: &RouteLabel) -> RouteSortKey {
        let Some(definition) = self.definition(code) else {
            return (usize::MAX, usize::MAX, u32::MAX);
        };

        match label {
            RouteLabel::Numbered { prefix, number, .. } => {
                (definition.prefix_rank(prefix), 0, *number)
            }
            RouteLabel::Rowed {
                prefix,
                row,
                number,
            } => (
                definition.prefix_rank(prefix),
                definition.row_rank(row),
                *number,
            ),
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
