//! Flush behavior of the buffered recorder across output formats.

use anyhow::Result;
use std::sync::Arc;
use tempfile::TempDir;

use httpspy::record::{ExchangeRecord, LogBook, Outcome, RequestRecorder};

fn sample_records(n: usize) -> Vec<ExchangeRecord> {
    (0..n)
        .map(|i| {
            let mut record = ExchangeRecord::new("GET", format!("http://example.test/item/{i}"));
            record.source = format!("127.0.0.1:{}", 50_000 + i);
            record.elapsed_ms = Some(i as u64);
            record.bytes_sent = 100 + i as u64;
            record
        })
        .collect()
}

#[tokio::test]
async fn json_flush_round_trips_all_fields() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("records.json");

    let book = LogBook::new(false);
    let records = sample_records(5);
    for record in &records {
        book.record(record.clone());
    }
    book.flush(&path).await?;

    let parsed: Vec<ExchangeRecord> = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(parsed, records);
    Ok(())
}

#[tokio::test]
async fn csv_flush_writes_header_and_rows() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("records.csv");

    let book = LogBook::new(false);
    for record in sample_records(3) {
        book.record(record);
    }
    book.flush(&path).await?;

    let contents = std::fs::read_to_string(&path)?;
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("id,method,target"));
    for line in &lines[1..] {
        assert!(line.contains("GET"));
    }
    Ok(())
}

#[tokio::test]
async fn text_flush_writes_summary_lines() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("records.txt");

    let book = LogBook::new(false);
    let mut record = ExchangeRecord::new("CONNECT", "example.test:443");
    record.outcome = Outcome::Tunneled;
    book.record(record);
    book.flush(&path).await?;

    let contents = std::fs::read_to_string(&path)?;
    assert!(contents.starts_with("CONNECT | example.test:443 ["));
    assert_eq!(contents.lines().count(), 1);
    Ok(())
}

#[tokio::test]
async fn unrecognized_extension_defaults_to_json() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("records.log");

    let book = LogBook::new(false);
    for record in sample_records(2) {
        book.record(record);
    }
    book.flush(&path).await?;

    let parsed: Vec<ExchangeRecord> = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(parsed.len(), 2);
    Ok(())
}

#[tokio::test]
async fn empty_flush_reports_success_without_a_file() -> Result<()> {
    let temp = TempDir::new()?;
    let path = temp.path().join("untouched.json");

    let book = LogBook::new(false);
    book.flush(&path).await?;
    assert!(!path.exists());
    Ok(())
}

#[tokio::test]
async fn flush_failure_surfaces_io_error() -> Result<()> {
    let temp = TempDir::new()?;
    // A directory at the target path makes the write fail.
    let path = temp.path().join("blocked.json");
    std::fs::create_dir(&path)?;

    let book = LogBook::new(false);
    book.record(ExchangeRecord::new("GET", "/"));
    assert!(book.flush(&path).await.is_err());
    Ok(())
}

#[tokio::test]
async fn concurrent_records_all_land_in_the_buffer() -> Result<()> {
    let book = Arc::new(LogBook::new(false));
    let mut tasks = Vec::new();
    for i in 0..32 {
        let book = book.clone();
        tasks.push(tokio::spawn(async move {
            book.record(ExchangeRecord::new("GET", format!("/{i}")));
        }));
    }
    for task in tasks {
        task.await?;
    }
    assert_eq!(book.len(), 32);
    Ok(())
}
