use std::collections::BTreeMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use format_url::FormatUrl;
use mockall::{automock, predicate::*};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::records::{AttrValue, BlockRecord, RecordKey};

use super::MAX_BATCH_WRITE_ITEMS;

/// What the store reported back for one bulk-write call. An accepted call
/// may still leave items unpersisted; those come back by key.
#[derive(Debug, Default, Deserialize)]
pub struct BatchWriteOutcome {
    #[serde(default)]
    pub unprocessed: Vec<RecordKey>,
}

#[automock]
#[async_trait]
pub trait BlockStore {
    async fn write_batch(&self, records: &[BlockRecord]) -> Result<BatchWriteOutcome>;
    async fn put_record(&self, record: &BlockRecord) -> Result<()>;
}

/// An item as the store's API expects it: the two key attributes plus
/// whatever other fields the record carries, all in tagged form.
#[derive(Serialize)]
struct WireItem<'a> {
    #[serde(rename = "Date")]
    date: AttrValue,
    #[serde(rename = "Block")]
    block: AttrValue,
    #[serde(flatten)]
    extras: &'a BTreeMap<String, AttrValue>,
}

impl<'a> From<&'a BlockRecord> for WireItem<'a> {
    fn from(record: &'a BlockRecord) -> Self {
        Self {
            date: AttrValue::string(record.key.date.clone()),
            block: AttrValue::number(record.key.block.to_string()),
            extras: record.extras(),
        }
    }
}

#[derive(Serialize)]
struct BatchWriteRequest<'a> {
    items: Vec<WireItem<'a>>,
}

pub struct BlockStoreHttp {
    server_url: String,
    table: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl BlockStoreHttp {
    pub fn new(server_url: &str, table: &str, api_key: Option<String>) -> Self {
        Self {
            server_url: server_url.into(),
            table: table.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn post(&self, action: &str) -> reqwest::RequestBuilder {
        let url = FormatUrl::new(&self.server_url)
            .with_path_template(&format!("/v1/tables/{}/{}", self.table, action))
            .format_url();
        let request = self.client.post(url);
        match &self.api_key {
            Some(key) => request.header("X-Api-Key", key),
            None => request,
        }
    }
}

#[async_trait]
impl BlockStore for BlockStoreHttp {
    async fn write_batch(&self, records: &[BlockRecord]) -> Result<BatchWriteOutcome> {
        if records.len() > MAX_BATCH_WRITE_ITEMS {
            bail!(
                "batch of {} items exceeds the store's limit of {} per call",
                records.len(),
                MAX_BATCH_WRITE_ITEMS
            );
        }

        debug!(items = records.len(), table = %self.table, "writing batch");

        let body = BatchWriteRequest {
            items: records.iter().map(WireItem::from).collect(),
        };

        let outcome = self
            .post("batch-write")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<BatchWriteOutcome>()
            .await?;

        Ok(outcome)
    }

    async fn put_record(&self, record: &BlockRecord) -> Result<()> {
        self.post("items")
            .json(&WireItem::from(record))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
