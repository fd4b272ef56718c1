//! Shared argument definitions.

use std::path::PathBuf;
use std::sync::Arc;

use srccache::{CacheOptions, CredentialSource, EnvCredentials};

/// Cache-related command-line arguments.
///
/// Can be embedded in other command Args using `#[command(flatten)]`.
#[derive(clap::Args, Clone, Default)]
pub struct CacheArgs {
    /// Cache only: use cached content, never contact the source
    #[arg(long)]
    pub cache_only: bool,

    /// Force refresh: re-fetch even if a cached copy exists
    #[arg(long)]
    pub refresh: bool,

    /// Custom cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Additional SSH known hosts file (default: $SSH_KEY)
    #[arg(long)]
    pub host_key_file: Option<PathBuf>,

    /// Prefix of environment variables holding `{{NAME}}` credential values
    #[arg(long)]
    pub credential_prefix: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl CacheArgs {
    /// Build CacheOptions from command-line arguments.
    pub fn to_cache_options(&self) -> CacheOptions {
        let mut opts = CacheOptions {
            cache_dir: self.cache_dir.clone(),
            refresh: self.refresh,
            cache_only: self.cache_only,
            host_key_file: self.host_key_file.clone(),
            ..Default::default()
        };
        if let Some(secs) = self.timeout {
            opts.timeout = std::time::Duration::from_secs(secs);
        }
        opts
    }

    pub fn credentials(&self) -> Arc<dyn CredentialSource> {
        match &self.credential_prefix {
            Some(prefix) => Arc::new(EnvCredentials::with_prefix(prefix.clone())),
            None => Arc::new(EnvCredentials::new()),
        }
    }
}
