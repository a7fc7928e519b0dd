//! Record serialization formats.
//!
//! The destination extension picks the format: `.json` (array of records),
//! `.csv` (fixed header row, one row per record), `.txt` (one summary line
//! per record). Anything else falls back to JSON.

use std::path::Path;

use super::ExchangeRecord;
use crate::error::RecorderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
    Text,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => OutputFormat::Csv,
            Some("txt") => OutputFormat::Text,
            _ => OutputFormat::Json,
        }
    }
}

pub fn render(records: &[ExchangeRecord], format: OutputFormat) -> Result<String, RecorderError> {
    match format {
        OutputFormat::Json => render_json(records),
        OutputFormat::Csv => Ok(render_csv(records)),
        OutputFormat::Text => Ok(render_text(records)),
    }
}

fn render_json(records: &[ExchangeRecord]) -> Result<String, RecorderError> {
    serde_json::to_string_pretty(records).map_err(|e| RecorderError::Serialize(e.to_string()))
}

/// Column order matches the record's field order; the record shape is fixed,
/// so every row is homogeneous by construction.
const CSV_HEADER: &str = "id,method,target,headers,body,source,destination,outcome,elapsed_ms,bytes_sent,bytes_received,timestamp";

fn render_csv(records: &[ExchangeRecord]) -> String {
    let mut csv = String::new();
    csv.push_str(CSV_HEADER);
    csv.push('\n');

    for record in records {
        // Headers collapse into one JSON-encoded cell.
        let headers = serde_json::to_string(&record.headers).unwrap_or_default();
        let row = vec![
            record.id.to_string(),
            csv_escape(&record.method),
            csv_escape(&record.target),
            csv_escape(&headers),
            csv_escape(&record.body),
            csv_escape(&record.source),
            csv_escape(&record.destination),
            record.outcome.as_str().to_string(),
            record
                .elapsed_ms
                .map(|ms| ms.to_string())
                .unwrap_or_else(|| super::UNAVAILABLE.to_string()),
            record.bytes_sent.to_string(),
            record.bytes_received.to_string(),
            record.timestamp.to_rfc3339(),
        ];

        csv.push_str(&row.join(","));
        csv.push('\n');
    }

    csv
}

fn render_text(records: &[ExchangeRecord]) -> String {
    let mut text = String::new();
    for record in records {
        text.push_str(&format!(
            "{} | {} [{}]\n",
            record.method,
            record.target,
            record.timestamp.to_rfc3339()
        ));
    }
    text
}

/// Escape a value for CSV (handle commas, quotes, newlines).
fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Outcome;

    fn sample() -> ExchangeRecord {
        let mut record = ExchangeRecord::new("GET", "http://example.com/x");
        record.source = "127.0.0.1:51000".into();
        record.elapsed_ms = Some(12);
        record
    }

    #[test]
    fn format_selected_by_extension() {
        assert_eq!(OutputFormat::from_path(Path::new("out.json")), OutputFormat::Json);
        assert_eq!(OutputFormat::from_path(Path::new("out.csv")), OutputFormat::Csv);
        assert_eq!(OutputFormat::from_path(Path::new("out.txt")), OutputFormat::Text);
        // Unrecognized extensions default to JSON
        assert_eq!(OutputFormat::from_path(Path::new("out.log")), OutputFormat::Json);
        assert_eq!(OutputFormat::from_path(Path::new("out")), OutputFormat::Json);
    }

    #[test]
    fn json_round_trips() {
        let records = vec![sample(), sample()];
        let json = render(&records, OutputFormat::Json).unwrap();
        let parsed: Vec<ExchangeRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, records);
    }

    #[test]
    fn csv_has_header_and_one_row_per_record() {
        let records = vec![sample(), sample()];
        let csv = render(&records, OutputFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("id,method,target"));
        assert!(lines[1].contains("GET"));
    }

    #[test]
    fn csv_escapes_embedded_quotes_and_commas() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn text_lines_carry_method_and_target() {
        let mut record = sample();
        record.outcome = Outcome::Tunneled;
        let text = render(&[record], OutputFormat::Text).unwrap();
        assert!(text.starts_with("GET | http://example.com/x ["));
        assert!(text.ends_with("]\n"));
    }
}
