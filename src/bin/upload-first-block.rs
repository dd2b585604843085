use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use eth_block_ingest::{env::ENV_CONFIG, log, stream_records, BlockStore, BlockStoreHttp};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Path to the processed blocks CSV.
    #[clap(long, default_value = "ETH_Block_Data_Processed.csv")]
    input: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    log::init();

    let cli = Cli::parse();

    let record = stream_records(&cli.input)?
        .next()
        .context("blocks CSV has no data rows")??;

    info!(key = %record.key, "uploading first record as a smoke test");

    let store = BlockStoreHttp::new(
        &ENV_CONFIG.store_url,
        &ENV_CONFIG.store_table,
        ENV_CONFIG.store_api_key.clone(),
    );

    store.put_record(&record).await?;

    info!(key = %record.key, "record stored");

    Ok(())
}
