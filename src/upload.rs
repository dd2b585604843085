use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use pit_wall::Progress;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::block_store::{BlockStore, MAX_BATCH_WRITE_ITEMS};
use crate::records::{BlockRecord, RecordKey};

const PROGRESS_EVERY_N_BATCHES: u64 = 10;

// Rough per-batch cost used for pre-run estimates, deliberately
// conservative.
const SECONDS_PER_BATCH_ESTIMATE: f64 = 0.1;

#[derive(Clone, Debug)]
pub struct UploadConfig {
    /// Records per bulk-write call, clamped to the store's per-call limit.
    pub batch_size: usize,
    /// Attempts per batch before its records are given up on.
    pub max_retries: u32,
    /// Backoff before the second attempt; doubles after every failed
    /// attempt.
    pub initial_delay: Duration,
    /// Stop consuming the input after this many records. For dry runs.
    pub max_records: Option<u64>,
    /// Total records the caller expects to upload, when known. Only used
    /// for progress reporting.
    pub expected_records: Option<u64>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_WRITE_ITEMS,
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_records: None,
            expected_records: None,
        }
    }
}

/// What happened over one whole run.
#[derive(Debug, Default)]
pub struct UploadSummary {
    pub records_uploaded: u64,
    /// Records the store never confirmed, in input order.
    pub failed_records: Vec<BlockRecord>,
    pub batches_attempted: u64,
}

struct BatchOutcome {
    written: u64,
    failed: Vec<BlockRecord>,
}

struct RunState {
    summary: UploadSummary,
    batches_succeeded: u64,
    progress: Option<Progress>,
}

impl RunState {
    fn new(expected_records: Option<u64>) -> Self {
        Self {
            summary: UploadSummary::default(),
            batches_succeeded: 0,
            progress: expected_records.map(|total| Progress::new("bulk-upload", total)),
        }
    }
}

/// Drains the record stream into batches and submits them one at a time.
/// A batch that exhausts its retries lands in the summary's failure list
/// and the run moves on; only a failure to read the input itself aborts.
pub async fn upload_all(
    store: &impl BlockStore,
    records: impl IntoIterator<Item = Result<BlockRecord>>,
    config: &UploadConfig,
) -> Result<UploadSummary> {
    if config.batch_size > MAX_BATCH_WRITE_ITEMS {
        warn!(
            batch_size = config.batch_size,
            limit = MAX_BATCH_WRITE_ITEMS,
            "configured batch size exceeds the store's per-call limit, clamping"
        );
    }
    let batch_size = config.batch_size.clamp(1, MAX_BATCH_WRITE_ITEMS);

    info!(
        batch_size,
        max_retries = config.max_retries,
        "starting bulk upload"
    );

    let mut state = RunState::new(config.expected_records);
    let mut batch: Vec<BlockRecord> = Vec::with_capacity(batch_size);
    let mut records_read: u64 = 0;

    for record in records {
        let record = record.context("failed to read record from input stream")?;
        batch.push(record);
        records_read += 1;

        if batch.len() >= batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            submit_batch(store, full, config, &mut state).await;
        }

        if config.max_records.map_or(false, |max| records_read >= max) {
            info!(records_read, "reached the configured record cap, stopping early");
            break;
        }
    }

    if !batch.is_empty() {
        submit_batch(store, batch, config, &mut state).await;
    }

    info!(
        records_uploaded = state.summary.records_uploaded,
        batches_attempted = state.summary.batches_attempted,
        failed = state.summary.failed_records.len(),
        "bulk upload done"
    );

    Ok(state.summary)
}

async fn submit_batch(
    store: &impl BlockStore,
    batch: Vec<BlockRecord>,
    config: &UploadConfig,
    state: &mut RunState,
) {
    state.summary.batches_attempted += 1;
    let batch_number = state.summary.batches_attempted;

    let outcome = upload_batch(store, batch, config, batch_number).await;

    state.summary.records_uploaded += outcome.written;
    let batch_succeeded = outcome.failed.is_empty();
    state.summary.failed_records.extend(outcome.failed);

    if let Some(progress) = state.progress.as_mut() {
        progress.set_work_done(
            state.summary.records_uploaded + state.summary.failed_records.len() as u64,
        );
    }

    if batch_succeeded {
        state.batches_succeeded += 1;
        if state.batches_succeeded % PROGRESS_EVERY_N_BATCHES == 0 {
            match state.progress.as_ref() {
                Some(progress) => info!("{}", progress.get_progress_string()),
                None => info!(
                    records_uploaded = state.summary.records_uploaded,
                    batches = batch_number,
                    "upload progress"
                ),
            }
        }
    }
}

/// Tries to write one batch, retrying with doubling backoff. Items the
/// store reports unprocessed are counted as written only once confirmed;
/// the unconfirmed remainder is resubmitted on the next attempt rather
/// than dropped. The backoff runs before each retry, never after the last
/// attempt.
async fn upload_batch(
    store: &impl BlockStore,
    batch: Vec<BlockRecord>,
    config: &UploadConfig,
    batch_number: u64,
) -> BatchOutcome {
    let mut pending = batch;
    let mut written: u64 = 0;
    let mut delay = config.initial_delay;

    for attempt in 1..=config.max_retries {
        match store.write_batch(&pending).await {
            Ok(outcome) if outcome.unprocessed.is_empty() => {
                written += pending.len() as u64;
                debug!(batch = batch_number, attempt, "batch written");
                return BatchOutcome {
                    written,
                    failed: Vec::new(),
                };
            }
            Ok(outcome) => {
                let unprocessed: HashSet<RecordKey> = outcome.unprocessed.into_iter().collect();
                let (remainder, stored): (Vec<_>, Vec<_>) = pending
                    .into_iter()
                    .partition(|record| unprocessed.contains(&record.key));
                written += stored.len() as u64;
                warn!(
                    batch = batch_number,
                    attempt,
                    unprocessed = remainder.len(),
                    "store left items unprocessed, resubmitting"
                );
                pending = remainder;
                if pending.is_empty() {
                    // The store flagged keys that weren't ours to begin
                    // with; everything we sent is confirmed.
                    return BatchOutcome {
                        written,
                        failed: Vec::new(),
                    };
                }
            }
            Err(err) => {
                warn!(batch = batch_number, attempt, %err, "batch write failed");
            }
        }

        if attempt < config.max_retries {
            debug!(batch = batch_number, backoff = ?delay, "backing off before retry");
            sleep(delay).await;
            delay *= 2;
        }
    }

    error!(
        batch = batch_number,
        failed = pending.len(),
        "batch not fully written after {} attempts",
        config.max_retries
    );

    BatchOutcome {
        written,
        failed: pending,
    }
}

#[derive(Debug)]
pub struct UploadEstimate {
    pub records: u64,
    pub batches: u64,
    pub expected_duration: Duration,
}

/// Counts the CSV's data rows to size up a run before starting it.
pub fn estimate_upload(path: impl AsRef<Path>, batch_size: usize) -> Result<UploadEstimate> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open blocks CSV at {}", path.display()))?;

    let mut records: u64 = 0;
    for row in reader.records() {
        row.context("failed to read row from blocks CSV")?;
        records += 1;
    }

    let batch_size = batch_size.clamp(1, MAX_BATCH_WRITE_ITEMS) as u64;
    let batches = records.div_ceil(batch_size);
    let expected_duration = Duration::from_secs_f64(batches as f64 * SECONDS_PER_BATCH_ESTIMATE);

    Ok(UploadEstimate {
        records,
        batches,
        expected_duration,
    })
}
