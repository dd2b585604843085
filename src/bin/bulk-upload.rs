use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use console::Term;
use dialoguer::Confirm;
use tracing::{info, warn};

use eth_block_ingest::{
    env::ENV_CONFIG, estimate_upload, log, stream_records, upload_all, BlockStoreHttp,
    UploadConfig,
};

// Runs over this size ask for confirmation before starting.
const CONFIRM_RECORD_THRESHOLD: u64 = 10_000;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Path to the processed blocks CSV.
    #[clap(long, default_value = "ETH_Block_Data_Processed.csv")]
    input: String,
    /// Records per bulk-write call.
    #[clap(long, default_value_t = 25)]
    batch_size: usize,
    /// Attempts per batch before giving up on its records.
    #[clap(long, default_value_t = 3)]
    max_retries: u32,
    /// Backoff before the first retry, in milliseconds.
    #[clap(long, default_value_t = 1000)]
    initial_delay_ms: u64,
    /// Upload at most this many records. For dry runs.
    #[clap(long)]
    max_records: Option<u64>,
    /// Skip the confirmation prompt for large uploads.
    #[clap(long)]
    yes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    log::init();

    let cli = Cli::parse();

    let estimate = estimate_upload(&cli.input, cli.batch_size)?;
    info!(
        records = estimate.records,
        batches = estimate.batches,
        "estimated upload size"
    );

    if estimate.records == 0 {
        info!("no records to upload");
        return Ok(());
    }

    let term = Term::stdout();
    term.write_line(&format!(
        "uploading {} records to table {} in batches of {}",
        estimate.records, ENV_CONFIG.store_table, cli.batch_size
    ))?;

    if estimate.records > CONFIRM_RECORD_THRESHOLD && !cli.yes {
        let minutes = estimate.expected_duration.as_secs_f64() / 60.0;
        let prompt = format!(
            "ready to upload {} records, this will take roughly {minutes:.1} minutes. continue?",
            estimate.records
        );
        if !Confirm::new().with_prompt(prompt).default(false).interact()? {
            term.write_line("upload cancelled")?;
            return Ok(());
        }
    }

    let store = BlockStoreHttp::new(
        &ENV_CONFIG.store_url,
        &ENV_CONFIG.store_table,
        ENV_CONFIG.store_api_key.clone(),
    );

    let config = UploadConfig {
        batch_size: cli.batch_size,
        max_retries: cli.max_retries,
        initial_delay: Duration::from_millis(cli.initial_delay_ms),
        max_records: cli.max_records,
        expected_records: Some(estimate.records),
    };

    let records = stream_records(&cli.input)?;

    let started_at = Instant::now();
    let summary = upload_all(&store, records, &config).await?;
    let elapsed = started_at.elapsed();

    let records_per_second =
        summary.records_uploaded as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    info!(
        records_uploaded = summary.records_uploaded,
        batches_attempted = summary.batches_attempted,
        failed = summary.failed_records.len(),
        elapsed_secs = elapsed.as_secs(),
        "upload complete, {records_per_second:.1} records per second"
    );

    if !summary.failed_records.is_empty() {
        warn!(
            failed = summary.failed_records.len(),
            "some records failed to upload; rerunning is safe, the store upserts on (date, block)"
        );
    }

    Ok(())
}
