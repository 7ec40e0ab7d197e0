use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use filing_indexer::{
    config::{self, Config},
    logging,
    processing::{Pipeline, PipelineOutcome},
};

#[derive(Parser)]
#[command(
    name = "filing-indexer",
    about = "Download SEC 10-K/10-Q filings and index them for retrieval"
)]
struct Cli {
    /// Index the filings already on disk without contacting EDGAR.
    #[arg(long)]
    skip_download: bool,
    /// Comma separated tickers to download, e.g. `AAPL,MSFT`.
    #[arg(long)]
    tickers: Option<String>,
    /// Filings fetched per ticker and form.
    #[arg(long)]
    limit: Option<NonZeroUsize>,
    /// Maximum characters per chunk.
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Characters shared between adjacent chunks.
    #[arg(long)]
    chunk_overlap: Option<usize>,
    /// Root of the filing content store.
    #[arg(long)]
    sec_dir: Option<PathBuf>,
    /// Directory of the local vector index.
    #[arg(long)]
    index_dir: Option<PathBuf>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if self.skip_download {
            config.run_download = false;
        }
        if let Some(tickers) = self.tickers {
            config.archive.tickers = config::parse_tickers(&tickers);
        }
        if let Some(limit) = self.limit {
            config.archive.limit_per_type = limit;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunking.chunk_size = chunk_size;
        }
        if let Some(overlap) = self.chunk_overlap {
            config.chunking.overlap = overlap;
        }
        if let Some(sec_dir) = self.sec_dir {
            config.sec_dir = sec_dir;
        }
        if let Some(index_dir) = self.index_dir {
            config.index.index_dir = index_dir;
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!(error = %format!("{err:#}"), "Ingestion failed");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let mut config = Config::from_env().context("failed to load configuration")?;
    cli.apply(&mut config);
    config
        .validate()
        .context("invalid configuration after applying command-line overrides")?;

    let pipeline = Pipeline::from_config(config).context("failed to initialize the pipeline")?;
    match pipeline.run().await.context("ingestion run failed")? {
        PipelineOutcome::NoDocuments { skipped } => {
            tracing::warn!(
                sec_dir = %pipeline.config().sec_dir.display(),
                skipped,
                "no documents found"
            );
        }
        PipelineOutcome::Completed(summary) => {
            let rendered =
                serde_json::to_string(&summary).context("failed to render run summary")?;
            println!("{rendered}");
        }
    }
    Ok(())
}
