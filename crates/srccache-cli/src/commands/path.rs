//! Show where a location is cached.

use std::path::PathBuf;

use srccache::{CacheOptions, FetcherFactory, compute_cache_key, storage::read_meta};

#[derive(clap::Args)]
pub struct Args {
    /// Path, file://, sftp:// or https:// location
    pub location: String,

    /// Custom cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

pub fn run(args: Args) -> anyhow::Result<()> {
    let factory = FetcherFactory::from_options(&CacheOptions {
        cache_dir: args.cache_dir,
        ..Default::default()
    });
    let location = factory.classify(&args.location)?;
    let key = compute_cache_key(&location);
    let cache_path = factory.cache_dir().join(&key.cache_path);

    println!("{}", cache_path.display());
    match read_meta(&cache_path)? {
        Some(meta) if cache_path.is_file() => eprintln!(
            "cached {} ({} bytes, sha256 {})",
            meta.fetched_at.format("%Y-%m-%d %H:%M"),
            meta.size_bytes,
            meta.content_sha256
        ),
        _ => eprintln!("not cached"),
    }
    Ok(())
}
