use anyhow::Result;
use clap::Parser;
use tracing::info;

use eth_block_ingest::{log, preprocess::preprocess_blocks};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Path to the raw blocks CSV export.
    #[clap(long, default_value = "ETH_Block_Data.csv")]
    input: String,
    /// Where to write the processed CSV.
    #[clap(long, default_value = "ETH_Block_Data_Processed.csv")]
    output: String,
}

fn main() -> Result<()> {
    log::init();

    let cli = Cli::parse();

    info!(input = %cli.input, output = %cli.output, "preprocessing blocks CSV");

    let summary = preprocess_blocks(&cli.input, &cli.output)?;

    info!(
        rows_written = summary.rows_written,
        duplicates_removed = summary.duplicate_rows,
        invalid_removed = summary.invalid_rows,
        "processed file ready"
    );

    Ok(())
}
