use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A field value in the store's tagged wire format. Numbers travel as
/// comma-stripped decimal strings so large counters survive the trip
/// without a float round-trip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrValue {
    #[serde(rename = "S")]
    String(String),
    #[serde(rename = "N")]
    Number(String),
    #[serde(rename = "NULL")]
    Null(bool),
}

impl AttrValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn number(value: impl Into<String>) -> Self {
        Self::Number(value.into())
    }

    pub fn null() -> Self {
        Self::Null(true)
    }
}

/// Composite key identifying a block record in the store: the date partition
/// key plus the block number sort key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub date: String,
    pub block: i64,
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.date, self.block)
    }
}

#[derive(Clone, Copy, Debug)]
enum FieldType {
    Text,
    Numeric,
}

// Columns we upload besides the key, with how each is typed. Anything else
// in the CSV is ignored.
const FIELD_TYPES: &[(&str, FieldType)] = &[
    ("DateTime (UTC)", FieldType::Text),
    ("Slot", FieldType::Numeric),
    ("Epoch", FieldType::Numeric),
    ("BlobCount", FieldType::Text),
    ("Txn", FieldType::Numeric),
    ("Fee Recipient", FieldType::Text),
    ("Fee Recipient Nametag", FieldType::Text),
    ("Gas Used", FieldType::Numeric),
    ("Gas Used(%)", FieldType::Text),
    (" % Of Gas Target", FieldType::Text),
    ("Gas Limit", FieldType::Numeric),
    ("Base Fee", FieldType::Text),
    ("Reward", FieldType::Text),
    ("Burnt Fees (ETH)", FieldType::Numeric),
    ("Burnt Fees (%)", FieldType::Text),
];

const DATE_COLUMN: &str = "Date";
const BLOCK_COLUMN: &str = "Block";

fn is_missing_value(raw: &str) -> bool {
    raw.is_empty() || matches!(raw.to_lowercase().as_str(), "nan" | "null" | "none")
}

fn attr_from_raw(raw: &str, field_type: FieldType) -> AttrValue {
    let raw = raw.trim();

    if is_missing_value(raw) {
        return AttrValue::null();
    }

    match field_type {
        FieldType::Text => AttrValue::string(raw),
        FieldType::Numeric => {
            let clean = raw.replace(',', "");
            if clean.parse::<f64>().is_ok() {
                AttrValue::number(clean)
            } else {
                AttrValue::null()
            }
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("blocks CSV is missing required column {0:?}")]
    MissingColumn(&'static str),
    #[error("row has an empty {0:?} value")]
    EmptyKeyField(&'static str),
    #[error("block number {0:?} is not a valid integer")]
    InvalidBlockNumber(String),
}

/// One row of block data, keyed by (date, block number). Built once from a
/// CSV row and not mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockRecord {
    pub key: RecordKey,
    extras: BTreeMap<String, AttrValue>,
}

impl BlockRecord {
    pub fn new(key: RecordKey) -> Self {
        Self {
            key,
            extras: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: AttrValue) -> Self {
        self.extras.insert(name.into(), value);
        self
    }

    pub fn extras(&self) -> &BTreeMap<String, AttrValue> {
        &self.extras
    }

    pub fn from_csv_row(
        headers: &csv::StringRecord,
        row: &csv::StringRecord,
    ) -> Result<Self, RecordError> {
        let fields: BTreeMap<&str, &str> = headers.iter().zip(row.iter()).collect();

        let date = fields
            .get(DATE_COLUMN)
            .ok_or(RecordError::MissingColumn(DATE_COLUMN))?
            .trim();
        if date.is_empty() {
            return Err(RecordError::EmptyKeyField(DATE_COLUMN));
        }

        let block_raw = fields
            .get(BLOCK_COLUMN)
            .ok_or(RecordError::MissingColumn(BLOCK_COLUMN))?
            .trim();
        let block = block_raw
            .replace(',', "")
            .parse::<i64>()
            .map_err(|_| RecordError::InvalidBlockNumber(block_raw.to_string()))?;

        let mut record = BlockRecord::new(RecordKey {
            date: date.to_string(),
            block,
        });

        for (name, field_type) in FIELD_TYPES {
            if let Some(&raw) = fields.get(name) {
                record
                    .extras
                    .insert(name.to_string(), attr_from_raw(raw, *field_type));
            }
        }

        Ok(record)
    }
}

/// Opens the processed blocks CSV and yields records lazily, one per row.
/// Failing to open the file is the one fatal error a run cannot recover
/// from, so it surfaces here rather than through the iterator.
pub fn stream_records(
    path: impl AsRef<Path>,
) -> anyhow::Result<impl Iterator<Item = anyhow::Result<BlockRecord>>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open blocks CSV at {}", path.display()))?;
    let headers = reader
        .headers()
        .context("failed to read blocks CSV header")?
        .clone();

    Ok(reader.into_records().map(move |row| {
        let row = row.context("failed to read row from blocks CSV")?;
        BlockRecord::from_csv_row(&headers, &row)
            .map_err(anyhow::Error::from)
    }))
}
