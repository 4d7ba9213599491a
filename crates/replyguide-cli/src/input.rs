//! CSV ingestion: a header row followed by one record per row.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use replyguide_core::Row;

/// Rows of a CSV file plus its header names, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

pub fn read_csv<R: Read>(source: R) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(source);

    let headers: Vec<String> = reader
        .headers()
        .context("read CSV header")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut seen = HashSet::new();
    for header in &headers {
        if !seen.insert(header.as_str()) {
            bail!("duplicate CSV header {header:?}");
        }
    }

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("read CSV record {index}"))?;
        // Short records leave trailing columns absent, which the batch
        // layer reports as a missing column.
        let row: Row = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        rows.push(row);
    }

    Ok(Table { headers, rows })
}

pub fn load_csv(path: &Path) -> Result<Table> {
    let file = std::fs::File::open(path).with_context(|| format!("open {:?}", path))?;
    read_csv(file).with_context(|| format!("parse {:?}", path))
}
