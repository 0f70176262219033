use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
    time::Duration,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;

use dune_holders::{fetch_dune_data, log, CutoffBlocks, FetchOptions};

/// Fetches vlCVX, BAL and bveCVX holder snapshots from Dune and writes them as JSON.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Mainnet block the snapshots are taken at.
    #[clap(long, env = "MAINNET_CUTOFF_BLOCK")]
    mainnet_block: u64,
    /// Polygon block the snapshots are taken at.
    #[clap(long, env = "POLYGON_CUTOFF_BLOCK")]
    polygon_block: u64,
    /// Directory holding the query SQL, defaults to DUNE_SQL_DIR or ./sql.
    #[clap(long)]
    sql_dir: Option<PathBuf>,
    /// Seconds to wait between checks for a query result.
    #[clap(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval_secs: u64,
    /// Retries per query, each preceded by a fresh login.
    #[clap(long, default_value_t = 2)]
    max_retries: u32,
    /// Output file path (e.g., ./dune.json), stdout when omitted.
    #[clap(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    log::init();

    let cli = Cli::parse();

    let cutoffs = CutoffBlocks {
        mainnet: cli.mainnet_block,
        polygon: cli.polygon_block,
    };
    let options = FetchOptions {
        max_retries: cli.max_retries,
        poll_interval: Duration::from_secs(cli.poll_interval_secs),
        ..FetchOptions::default()
    };

    info!(?cutoffs, "fetching dune data");
    let data = fetch_dune_data(&cutoffs, cli.sql_dir.as_deref(), &options)
        .await
        .context("failed to fetch dune data")?;

    let writer: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(File::create(path).with_context(|| {
            format!("failed to create output file {}", path.display())
        })?),
        None => Box::new(io::stdout()),
    };
    let mut writer = BufWriter::new(writer);
    serde_json::to_writer_pretty(&mut writer, &data).context("failed to write dune data")?;
    writeln!(writer)?;
    writer.flush()?;

    info!("done fetching dune data");

    Ok(())
}
