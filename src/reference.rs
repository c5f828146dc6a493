use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use calamine::{Data, Reader, open_workbook_auto};
use tracing::info;

/// Customer catalog order used when no external table is supplied.
const BUILTIN_ORDER: &[&str] = &[
    "014-HG-17061-A",
    "014-HG-17061-B",
    "014-HG-20064-BRO",
    "014-HG-30343-B",
    "014-HG-31803-DG",
    "014-HG-31804-LB",
    "014-HG-31804-NA",
    "014-HG-31901-GY",
    "014-HG-31957-BK",
    "014-HG-40007-ESP",
    "014-HG-40009-GY-A",
    "014-HG-40009-GY-B",
    "014-HG-40010-GY",
    "014-HG-40013-BRO",
    "014-HG-40013-WH",
    "014-HG-40740-DWA-A",
    "014-HG-40740-DWA-B",
    "014-HG-41020-WH",
    "014-HG-41023",
    "014-HG-41802-ESP",
    "014-HG-41830-APE",
    "014-HG-41830-CT-GYW",
    "014-HG-41830-GYW",
    "014-HG-41831-BRO",
    "014-HG-41831-HT-WHT",
    "014-HG-41831-WHT",
    "014-HG-41890-BK",
    "014-HG-41894-EB",
    "014-HG-41894-WS",
    "014-HG-41896-WH",
    "014-HG-41898-BE",
    "014-HG-43004-BRO",
    "014-HG-43301-CAM",
    "014-HG-43302-BRO",
    "014-HG-43302-WL",
    "014-HG-43303-CAM",
    "014-HG-43501-BK",
    "014-HG-43503-CH",
    "014-HG-43503-OAK",
    "014-HG-43503-WA",
    "014-HG-43505-BRO",
    "014-HG-44701-BK",
    "048-OPAC-5",
    "048-OPAC-5H",
    "048-OPAC-6",
    "048-OPAC-6H",
    "048-TL-W10KI",
    "048-TL-W10KWD",
    "048-TL-W12KWD",
    "048-TL-W14KWD",
    "048-TL-W6KWD",
    "048-TL-W8KWD",
    "050-HA-50028",
    "050-HA-50036-LT",
    "050-HA-50042-CT",
    "050-LMT-23-GY",
    "050-LMT-23-WD",
    "050-LMT-28-GY-B",
    "060-ROT-11L-WH",
    "060-ROT-15V2-DG",
    "060-ROT-15V2-GN",
    "060-ROT-15V2-RD",
    "060-ROT-22L-BK",
    "TFO1S-BK",
];

pub fn builtin_order() -> &'static [&'static str] {
    BUILTIN_ORDER
}

/// Ordered canonical identifiers; position defines output order.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    entries: Vec<String>,
    source: String,
}

impl ReferenceTable {
    pub fn builtin() -> Self {
        Self {
            entries: builtin_order()
                .iter()
                .map(|entry| entry.to_string())
                .collect(),
            source: "builtin".to_string(),
        }
    }

    pub fn from_entries(entries: Vec<String>, source: &str) -> Self {
        Self {
            entries,
            source: source.to_string(),
        }
    }

    /// Built-in table, or the table at `path` when one is given.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let table = match path {
            Some(path) => Self::load(path)?,
            None => Self::builtin(),
        };
        info!(
            source = %table.source,
            entries = table.entries.len(),
            "loaded reference order table"
        );
        Ok(table)
    }

    /// Loads `.json` (array of strings), `.csv` or `.xlsx` (first column) or
    /// plain text (one identifier per line). Blank lines, a leading byte-order
    /// mark and `#` comments are skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        let entries = match extension.as_str() {
            "xlsx" | "xlsm" | "xls" | "ods" => parse_spreadsheet(path)?,
            _ => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let raw = raw.strip_prefix('\u{feff}').unwrap_or(&raw);
                match extension.as_str() {
                    "json" => parse_json(raw)
                        .with_context(|| format!("failed to parse {}", path.display()))?,
                    "csv" => parse_csv(raw)
                        .with_context(|| format!("failed to parse {}", path.display()))?,
                    _ => parse_lines(raw),
                }
            }
        };

        Ok(Self::from_entries(
            dedupe_preserving_order(entries),
            &path.display().to_string(),
        ))
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn position(&self, identifier: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry == identifier)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

fn parse_json(raw: &str) -> Result<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let Some(items) = value.as_array() else {
        bail!("reference table json must be an array of strings");
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let Some(text) = item.as_str() else {
            bail!("reference table json contains a non-string entry: {item}");
        };
        if let Some(entry) = clean_entry(text) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

fn parse_csv(raw: &str) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record.context("failed to read csv record")?;
        let Some(cell) = record.get(0) else {
            continue;
        };
        if is_header_cell(cell.trim()) {
            continue;
        }
        if let Some(entry) = clean_entry(cell) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// First column of the first worksheet.
fn parse_spreadsheet(path: &Path) -> Result<Vec<String>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open spreadsheet {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .with_context(|| format!("spreadsheet has no worksheets: {}", path.display()))?
        .with_context(|| format!("failed to read first worksheet of {}", path.display()))?;

    let entries = range
        .rows()
        .filter_map(|row| row.first())
        .filter_map(|cell| match cell {
            Data::String(text) => Some(text.clone()),
            Data::Empty => None,
            other => Some(other.to_string()),
        })
        .filter(|cell| !is_header_cell(cell.trim()))
        .filter_map(|cell| clean_entry(&cell))
        .collect();
    Ok(entries)
}

fn parse_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(clean_entry)
        .collect()
}

fn is_header_cell(cell: &str) -> bool {
    matches!(
        cell.to_ascii_lowercase().as_str(),
        "sku" | "identifier" | "item" | "code"
    )
}

fn clean_entry(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_uppercase())
}

fn dedupe_preserving_order(entries: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "labelsort_reference_{}_{}",
            name,
            std::process::id()
        ));
        fs::create_dir_all(&dir).expect("scratch dir");
        dir
    }

    #[test]
    fn builtin_table_keeps_catalog_order() {
        let table = ReferenceTable::builtin();
        assert_eq!(table.len(), 64);
        assert_eq!(table.entries()[0], "014-HG-17061-A");
        assert_eq!(table.position("048-OPAC-6H"), Some(45));
        assert_eq!(table.entries().last().map(String::as_str), Some("TFO1S-BK"));
    }

    #[test]
    fn loads_text_csv_and_json_tables() {
        let dir = scratch_dir("formats");

        let text_path = dir.join("order.txt");
        fs::write(&text_path, "# catalog\n048-opac-6\n\n048-OPAC-5\n048-OPAC-6\n").expect("write");
        let text = ReferenceTable::load(&text_path).expect("text table");
        assert_eq!(text.entries(), ["048-OPAC-6", "048-OPAC-5"]);

        let csv_path = dir.join("order.csv");
        fs::write(&csv_path, "SKU,Qty\n\"TFO1S-BK\",3\n060-ROT-11L-WH,1\n").expect("write");
        let csv = ReferenceTable::load(&csv_path).expect("csv table");
        assert_eq!(csv.entries(), ["TFO1S-BK", "060-ROT-11L-WH"]);

        let json_path = dir.join("order.json");
        fs::write(&json_path, r#"["050-HA-50028", " 050-LMT-23-GY "]"#).expect("write");
        let json = ReferenceTable::load(&json_path).expect("json table");
        assert_eq!(json.entries(), ["050-HA-50028", "050-LMT-23-GY"]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn csv_table_handles_byte_order_mark_and_quoted_commas() {
        let dir = scratch_dir("csv_bom");
        let path = dir.join("order.csv");
        fs::write(
            &path,
            "\u{feff}SKU,Qty\n\"048-OPAC-6, rev B\",2\n048-OPAC-5,1\n\n",
        )
        .expect("write");

        let table = ReferenceTable::load(&path).expect("csv table");
        assert_eq!(table.entries(), ["048-OPAC-6, REV B", "048-OPAC-5"]);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn spreadsheet_table_reports_unreadable_workbook() {
        let dir = scratch_dir("bad_xlsx");
        let path = dir.join("ALGIN.xlsx");
        fs::write(&path, "not a workbook").expect("write");

        let err = ReferenceTable::load(&path).expect_err("invalid workbook");
        assert!(err.to_string().contains("failed to open spreadsheet"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn json_table_rejects_non_string_entries() {
        let dir = scratch_dir("bad_json");
        let path = dir.join("order.json");
        fs::write(&path, r#"["048-OPAC-6", 12]"#).expect("write");

        assert!(ReferenceTable::load(&path).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
