use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod args;
mod commands;

#[derive(Parser)]
#[command(name = "srccache", about = "Fetch file, SFTP and HTTPS sources through a local cache")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a location through the cache and print its content
    Fetch(commands::fetch::Args),
    /// Show the cache file a location maps to
    Path(commands::path::Args),
    /// List cached entries
    List(commands::cache::ListArgs),
    /// Remove old cache entries
    Gc(commands::cache::GcArgs),
    /// Remove all cached entries
    Clean(commands::cache::CleanArgs),
    /// Show the default cache directory
    Dir,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("srccache=warn"),
        1 => EnvFilter::new("srccache=info"),
        _ => EnvFilter::new("srccache=debug"),
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Fetch(args) => commands::fetch::run(args),
        Commands::Path(args) => commands::path::run(args),
        Commands::List(args) => commands::cache::run_list(args),
        Commands::Gc(args) => commands::cache::run_gc(args),
        Commands::Clean(args) => commands::cache::run_clean(args),
        Commands::Dir => {
            commands::cache::run_dir();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
