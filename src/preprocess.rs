//! Cleans a raw blocks CSV into the processed file the uploader consumes:
//! drops duplicate blocks, derives the date partition key from the block
//! timestamp, strips thousands separators from numeric columns, and drops
//! rows that would never make a valid record.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tracing::{debug, info};

const DATE_COLUMN: &str = "Date";
const BLOCK_COLUMN: &str = "Block";
const DATETIME_COLUMN: &str = "DateTime (UTC)";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const NUMERIC_COLUMNS: &[&str] = &["Block", "Slot", "Epoch", "Txn", "Gas Used", "Gas Limit"];

#[derive(Debug, Default, PartialEq)]
pub struct PreprocessSummary {
    pub rows_read: u64,
    pub duplicate_rows: u64,
    pub invalid_rows: u64,
    pub rows_written: u64,
}

pub fn preprocess_blocks(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<PreprocessSummary> {
    let input = input.as_ref();
    let mut reader = csv::Reader::from_path(input)
        .with_context(|| format!("failed to open raw blocks CSV at {}", input.display()))?;
    let headers = reader
        .headers()
        .context("failed to read raw blocks CSV header")?
        .clone();

    let datetime_idx = headers
        .iter()
        .position(|header| header == DATETIME_COLUMN)
        .with_context(|| format!("raw blocks CSV is missing the {DATETIME_COLUMN:?} column"))?;
    let block_idx = headers
        .iter()
        .position(|header| header == BLOCK_COLUMN)
        .with_context(|| format!("raw blocks CSV is missing the {BLOCK_COLUMN:?} column"))?;

    // Key columns move to the front, everything else keeps its input order.
    // An existing Date column is dropped in favor of the derived one.
    let passthrough: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(i, header)| *header != DATE_COLUMN && *i != block_idx)
        .map(|(i, _)| i)
        .collect();

    let numeric_idx: HashSet<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, header)| NUMERIC_COLUMNS.contains(header))
        .map(|(i, _)| i)
        .collect();

    let output = output.as_ref();
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("failed to create processed CSV at {}", output.display()))?;

    let mut out_headers = vec![DATE_COLUMN.to_string(), BLOCK_COLUMN.to_string()];
    out_headers.extend(passthrough.iter().map(|&i| headers[i].to_string()));
    writer
        .write_record(&out_headers)
        .context("failed to write processed CSV header")?;

    let mut summary = PreprocessSummary::default();
    let mut seen_blocks: HashSet<String> = HashSet::new();

    for row in reader.records() {
        let row = row.context("failed to read row from raw blocks CSV")?;
        summary.rows_read += 1;

        let raw_block = row.get(block_idx).unwrap_or("").trim().to_string();
        if !seen_blocks.insert(raw_block.clone()) {
            summary.duplicate_rows += 1;
            continue;
        }

        let clean_block = raw_block.replace(',', "");
        if clean_block.parse::<i64>().is_err() {
            debug!(block = %raw_block, "dropping row with invalid block number");
            summary.invalid_rows += 1;
            continue;
        }

        let raw_datetime = row.get(datetime_idx).unwrap_or("").trim();
        let date = match NaiveDateTime::parse_from_str(raw_datetime, DATETIME_FORMAT) {
            Ok(datetime) => datetime.format("%Y-%m-%d").to_string(),
            Err(_) => {
                debug!(datetime = %raw_datetime, "dropping row with unparseable timestamp");
                summary.invalid_rows += 1;
                continue;
            }
        };

        let mut out_row = vec![date, clean_block];
        for &i in &passthrough {
            let value = row.get(i).unwrap_or("");
            if numeric_idx.contains(&i) {
                out_row.push(value.replace(',', ""));
            } else {
                out_row.push(value.to_string());
            }
        }

        writer
            .write_record(&out_row)
            .context("failed to write row to processed CSV")?;
        summary.rows_written += 1;
    }

    writer.flush().context("failed to flush processed CSV")?;

    info!(
        rows_read = summary.rows_read,
        duplicates_removed = summary.duplicate_rows,
        invalid_removed = summary.invalid_rows,
        rows_written = summary.rows_written,
        "preprocessing done"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn preprocess_blocks_test() {
        let mut input = tempfile::NamedTempFile::new().unwrap();
        writeln!(input, "Block,DateTime (UTC),Txn,Gas Used,Fee Recipient").unwrap();
        writeln!(
            input,
            "\"17,038,430\",2024-03-01 12:00:05,150,\"12,500,000\",0xabc"
        )
        .unwrap();
        // Duplicate of the first block, dropped.
        writeln!(
            input,
            "\"17,038,430\",2024-03-01 12:00:17,151,\"12,600,000\",0xdef"
        )
        .unwrap();
        writeln!(input, "not-a-block,2024-03-01 12:00:29,152,1,0xdef").unwrap();
        writeln!(input, "17038431,2024-03-02 00:00:01,,\"13,000\",0xdef").unwrap();
        writeln!(input, "17038432,half past three,153,1,0xdef").unwrap();
        input.flush().unwrap();

        let output = tempfile::NamedTempFile::new().unwrap();

        let summary = preprocess_blocks(input.path(), output.path()).unwrap();

        assert_eq!(
            summary,
            PreprocessSummary {
                rows_read: 5,
                duplicate_rows: 1,
                invalid_rows: 2,
                rows_written: 2,
            }
        );

        let mut reader = csv::Reader::from_path(output.path()).unwrap();
        assert_eq!(
            reader.headers().unwrap(),
            &csv::StringRecord::from(vec![
                "Date",
                "Block",
                "DateTime (UTC)",
                "Txn",
                "Gas Used",
                "Fee Recipient"
            ])
        );

        let rows = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            csv::StringRecord::from(vec![
                "2024-03-01",
                "17038430",
                "2024-03-01 12:00:05",
                "150",
                "12500000",
                "0xabc"
            ])
        );
        assert_eq!(rows[1].get(0), Some("2024-03-02"));
        assert_eq!(rows[1].get(1), Some("17038431"));
    }

    #[test]
    fn preprocess_blocks_requires_datetime_column_test() {
        let mut input = tempfile::NamedTempFile::new().unwrap();
        writeln!(input, "Block,Txn").unwrap();
        writeln!(input, "17038430,150").unwrap();
        input.flush().unwrap();

        let output = tempfile::NamedTempFile::new().unwrap();

        assert!(preprocess_blocks(input.path(), output.path()).is_err());
    }
}
