//! Cache management commands.

use std::path::PathBuf;

use anyhow::Context;
use srccache::{FsStorage, clean, default_cache_dir, gc, parse_duration};

#[derive(clap::Args)]
pub struct ListArgs {
    /// Custom cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct GcArgs {
    /// Remove entries older than this duration (e.g., "30d", "7d", "24h")
    #[arg(long, default_value = "30d")]
    pub older_than: String,
    /// Custom cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct CleanArgs {
    /// Custom cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

pub fn run_list(args: ListArgs) -> anyhow::Result<()> {
    let dir = args.cache_dir.unwrap_or_else(default_cache_dir);
    let entries = FsStorage::new(dir).list().context("failed to list cache")?;

    if entries.is_empty() {
        println!("Cache is empty.");
        return Ok(());
    }

    println!("{:<60} {:>10} {:>20}", "SOURCE", "SIZE", "FETCHED");
    println!("{}", "-".repeat(92));

    let mut total_size: u64 = 0;
    for entry in &entries {
        let fetched = entry.meta.fetched_at.format("%Y-%m-%d %H:%M").to_string();
        println!(
            "{:<60} {:>10} {:>20}",
            truncate(&entry.meta.source, 58),
            format_size(entry.meta.size_bytes),
            fetched
        );
        total_size += entry.meta.size_bytes;
    }

    println!("{}", "-".repeat(92));
    println!("{} entries, {} total", entries.len(), format_size(total_size));
    Ok(())
}

pub fn run_gc(args: GcArgs) -> anyhow::Result<()> {
    let older_than = parse_duration(&args.older_than)
        .with_context(|| format!("invalid duration: {}", args.older_than))?;
    let dir = args.cache_dir.unwrap_or_else(default_cache_dir);
    let stats = gc(&dir, older_than).context("failed to run GC")?;
    println!(
        "Removed {} files ({}), kept {} files",
        stats.files_removed,
        format_size(stats.bytes_freed),
        stats.files_kept
    );
    Ok(())
}

pub fn run_clean(args: CleanArgs) -> anyhow::Result<()> {
    let dir = args.cache_dir.unwrap_or_else(default_cache_dir);
    clean(&dir).context("failed to clean cache")?;
    println!("Cache cleaned.");
    Ok(())
}

pub fn run_dir() {
    println!("{}", default_cache_dir().display());
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{head}...")
}

fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * 1024 * 1024;

    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MiB");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024), "5.0 GiB");
    }

    #[test]
    fn test_truncate_keeps_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééééééééé", 6), "ééé...");
    }

    #[test]
    fn test_gc_rejects_invalid_duration() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_gc(GcArgs {
            older_than: "soon".to_string(),
            cache_dir: Some(dir.path().to_path_buf()),
        });
        assert!(result.is_err());
    }
}
