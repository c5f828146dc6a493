use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::MatchArgs;
use crate::matcher::{IdentifierMatcher, MatchRule, normalize_separators};
use crate::reference::ReferenceTable;

#[derive(Debug, Serialize)]
struct MatchResponse {
    candidate: String,
    normalized: String,
    compared_against: String,
    matched: bool,
    reference: Option<String>,
    position: Option<usize>,
    rule: Option<MatchRule>,
}

pub fn run(args: MatchArgs) -> Result<()> {
    let matcher = IdentifierMatcher::new()?;

    let response = match &args.reference {
        Some(reference) => {
            let rule = matcher.match_rule(&args.candidate, reference);
            MatchResponse {
                candidate: args.candidate.clone(),
                normalized: normalize_separators(&args.candidate),
                compared_against: "single reference".to_string(),
                matched: rule.is_some(),
                reference: Some(reference.trim().to_uppercase()),
                position: None,
                rule,
            }
        }
        None => {
            let table = ReferenceTable::resolve(args.reference_table.as_deref())?;
            let best = matcher.best_reference(&args.candidate, table.entries());
            MatchResponse {
                candidate: args.candidate.clone(),
                normalized: normalize_separators(&args.candidate),
                compared_against: format!("{} ({} entries)", table.source(), table.len()),
                matched: best.is_some(),
                reference: best.map(|(position, _)| table.entries()[position].clone()),
                position: best.map(|(position, _)| position + 1),
                rule: best.map(|(_, rule)| rule),
            }
        }
    };

    info!(
        candidate = %response.candidate,
        matched = response.matched,
        rule = response.rule.map(MatchRule::as_str).unwrap_or("none"),
        "identifier match"
    );

    if args.json {
        write_json_response(&response)
    } else {
        write_text_response(&response)
    }
}

fn write_json_response(response: &MatchResponse) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, response)
        .context("failed to serialize match json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_response(response: &MatchResponse) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(
        output,
        "Candidate: {} (normalized {})",
        response.candidate, response.normalized
    )?;
    writeln!(output, "Compared against: {}", response.compared_against)?;
    match (&response.reference, response.rule) {
        (Some(reference), Some(rule)) => {
            let position = response
                .position
                .map(|position| format!(" at position {position}"))
                .unwrap_or_default();
            writeln!(output, "Match: {reference}{position} via {}", rule.as_str())?;
        }
        _ => writeln!(output, "Match: none")?,
    }
    output.flush()?;
    Ok(())
}
