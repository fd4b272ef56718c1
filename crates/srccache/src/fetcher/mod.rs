//! Fetchers: one strategy per protocol, sharing the cache access policy.

mod https;
mod local;
mod sftp;

use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::access::{FetcherState, UpdateAction, parse_cached, plan_update, read_cached};
use crate::error::CacheError;
use crate::location::Location;
use crate::storage::write_atomic;

pub use https::HttpsFetcher;
pub use local::LocalFetcher;
pub use sftp::{SSH_KEY_ENV, SftpFetcher, auth_methods};

/// A source that can be synchronized into its cache path and read back.
///
/// Implementors provide [`Fetcher::sync_remote`]; the cache policy and the
/// read path are shared.
pub trait Fetcher {
    /// The location this fetcher reads from.
    fn location(&self) -> &Location;

    /// The cache file this fetcher owns.
    fn cache_path(&self) -> &Path;

    fn state(&self) -> FetcherState;

    fn state_mut(&mut self) -> &mut FetcherState;

    /// Copy the source content into `sink`.
    ///
    /// Only called by [`Fetcher::sync_cache`] when a sync is due; never in
    /// cache-only mode.
    fn sync_remote(&mut self, sink: &mut dyn Write) -> Result<(), CacheError>;

    /// Bring the cache file up to date according to the fetcher flags.
    fn sync_cache(&mut self) -> Result<(), CacheError> {
        let cache_path = self.cache_path().to_path_buf();
        let source = self.location().to_string();

        match plan_update(self.state(), cache_path.is_file()) {
            UpdateAction::UseCached => {
                debug!(%source, "using cached copy");
                Ok(())
            }
            UpdateAction::RefreshSuppressed => {
                warn!(%source, "refresh ignored in cache-only mode, using cached copy");
                Ok(())
            }
            UpdateAction::CacheOnlyMiss => Err(CacheError::CacheOnlyViolation(source)),
            UpdateAction::Sync => {
                info!(%source, "syncing cache");
                write_atomic(&cache_path, &source, |sink| self.sync_remote(sink))?;
                Ok(())
            }
        }
    }

    /// Raw bytes of the source, synced first if the policy requires it.
    fn get_raw(&mut self) -> Result<Vec<u8>, CacheError> {
        self.sync_cache()?;
        read_cached(self.cache_path())
    }

    /// The source parsed as a structured document of type `T`.
    ///
    /// The format is chosen from the file extension; parse or type errors are
    /// reported as [`CacheError::Validation`].
    fn get_structured<T: DeserializeOwned>(&mut self) -> Result<T, CacheError>
    where
        Self: Sized,
    {
        let bytes = self.get_raw()?;
        parse_cached(self.cache_path(), &bytes)
    }
}

/// The fetcher chosen by the factory for a location.
pub enum AnyFetcher {
    Local(LocalFetcher),
    Sftp(SftpFetcher),
    Https(HttpsFetcher),
}

impl AnyFetcher {
    fn inner(&self) -> &dyn Fetcher {
        match self {
            AnyFetcher::Local(f) => f,
            AnyFetcher::Sftp(f) => f,
            AnyFetcher::Https(f) => f,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Fetcher {
        match self {
            AnyFetcher::Local(f) => f,
            AnyFetcher::Sftp(f) => f,
            AnyFetcher::Https(f) => f,
        }
    }
}

impl Fetcher for AnyFetcher {
    fn location(&self) -> &Location {
        self.inner().location()
    }

    fn cache_path(&self) -> &Path {
        self.inner().cache_path()
    }

    fn state(&self) -> FetcherState {
        self.inner().state()
    }

    fn state_mut(&mut self) -> &mut FetcherState {
        self.inner_mut().state_mut()
    }

    fn sync_remote(&mut self, sink: &mut dyn Write) -> Result<(), CacheError> {
        self.inner_mut().sync_remote(sink)
    }
}

impl std::fmt::Debug for AnyFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            AnyFetcher::Local(_) => "Local",
            AnyFetcher::Sftp(_) => "Sftp",
            AnyFetcher::Https(_) => "Https",
        };
        f.debug_struct("AnyFetcher")
            .field("kind", &kind)
            .field("location", &self.location().to_string())
            .field("cache_path", &self.cache_path())
            .field("state", &self.state())
            .finish()
    }
}
