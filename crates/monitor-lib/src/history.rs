//! CSV import of historical per-minute counts
//!
//! Expected layout is a header row naming `timestamp`, `status` and `count`
//! (any order, extra columns ignored) followed by one observation per line.
//!
//! Fields are split on every comma and surrounding quotes are stripped, so a
//! quoted field containing a comma is not supported. Such a row shifts the
//! columns after it and is normally reported as rejected.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::MonitorError;
use crate::models::Observation;

/// A data row that failed validation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRow {
    /// 1-based line number in the source
    pub line: usize,
    pub reason: String,
}

/// Result of parsing a CSV document
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CsvImport {
    pub observations: Vec<Observation>,
    pub rejected: Vec<RejectedRow>,
}

struct Columns {
    timestamp: usize,
    status: usize,
    count: usize,
}

impl Columns {
    fn from_header(header: &str) -> Result<Self, MonitorError> {
        let names: Vec<String> = header
            .split(',')
            .map(|c| c.trim().trim_matches('"').to_ascii_lowercase())
            .collect();
        let find = |name: &str| {
            names
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| MonitorError::Validation(format!("CSV header missing '{}' column", name)))
        };
        Ok(Self {
            timestamp: find("timestamp")?,
            status: find("status")?,
            count: find("count")?,
        })
    }
}

fn parse_row(columns: &Columns, line: &str) -> Result<Observation, MonitorError> {
    let fields: Vec<&str> = line.split(',').map(|f| f.trim().trim_matches('"')).collect();
    let field = |idx: usize, name: &str| {
        fields
            .get(idx)
            .copied()
            .ok_or_else(|| MonitorError::Validation(format!("missing {} field", name)))
    };

    let raw_count = field(columns.count, "count")?;
    let count: i64 = raw_count
        .parse::<i64>()
        .or_else(|_| raw_count.parse::<f64>().map(|c| c as i64))
        .map_err(|_| MonitorError::Validation(format!("invalid count '{}'", raw_count)))?;

    Observation::parse(
        field(columns.timestamp, "timestamp")?,
        field(columns.status, "status")?,
        count,
    )
}

/// Parse CSV text. Invalid rows are collected, not fatal; a bad header is.
pub fn parse_csv(content: &str) -> Result<CsvImport, MonitorError> {
    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    let Some((_, header)) = lines.next() else {
        return Ok(CsvImport::default());
    };
    let columns = Columns::from_header(header)?;

    let mut import = CsvImport::default();
    for (idx, line) in lines {
        match parse_row(&columns, line) {
            Ok(obs) => import.observations.push(obs),
            Err(e) => import.rejected.push(RejectedRow {
                line: idx + 1,
                reason: e.to_string(),
            }),
        }
    }

    import.observations.sort_by_key(|o| o.timestamp);
    Ok(import)
}

/// Read and parse a CSV file, sorted by timestamp
pub async fn load_csv(path: impl AsRef<Path>) -> Result<CsvImport, MonitorError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path).await?;
    let import = parse_csv(&content)?;

    if !import.rejected.is_empty() {
        warn!(
            path = %path.display(),
            rejected = import.rejected.len(),
            first_line = import.rejected[0].line,
            "Skipped invalid CSV rows"
        );
    }
    debug!(path = %path.display(), observations = import.observations.len(), "Loaded CSV history");
    Ok(import)
}
