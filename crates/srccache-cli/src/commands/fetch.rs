//! Fetch a location through the cache.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use srccache::{Fetcher, FetcherFactory};
use tracing::info;

use crate::args::CacheArgs;

#[derive(clap::Args)]
pub struct Args {
    /// Path, file://, sftp:// or https:// location
    pub location: String,

    /// Write the content to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub cache: CacheArgs,
}

pub fn run(args: Args) -> anyhow::Result<()> {
    let opts = args.cache.to_cache_options();
    let factory = FetcherFactory::from_options(&opts).with_credentials(args.cache.credentials());
    let mut fetcher = factory.get_fetcher(&args.location, opts.refresh, opts.cache_only)?;

    let content = fetcher
        .get_raw()
        .with_context(|| format!("failed to fetch {}", fetcher.location()))?;
    info!(cache_path = %fetcher.cache_path().display(), bytes = content.len(), "fetched");

    match args.output {
        Some(path) => fs::write(&path, &content)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&content)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
