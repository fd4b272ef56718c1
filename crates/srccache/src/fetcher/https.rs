use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::access::FetcherState;
use crate::credentials::{CredentialSource, NoCredentials};
use crate::error::CacheError;
use crate::location::{HttpsLocation, Location};
use crate::transport::{HttpRequest, HttpTransport};

use super::Fetcher;

/// Downloads a resource with an (optionally authenticated) HTTPS GET.
pub struct HttpsFetcher {
    location: Location,
    remote: HttpsLocation,
    cache_path: PathBuf,
    state: FetcherState,
    credentials: Arc<dyn CredentialSource>,
    transport: Arc<dyn HttpTransport>,
}

impl HttpsFetcher {
    pub fn new(
        remote: HttpsLocation,
        cache_path: PathBuf,
        state: FetcherState,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            location: Location::Https(remote.clone()),
            remote,
            cache_path,
            state,
            credentials: Arc::new(NoCredentials),
            transport,
        }
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialSource>) -> Self {
        self.credentials = credentials;
        self
    }
}

impl Fetcher for HttpsFetcher {
    fn location(&self) -> &Location {
        &self.location
    }

    fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    fn state(&self) -> FetcherState {
        self.state
    }

    fn state_mut(&mut self) -> &mut FetcherState {
        &mut self.state
    }

    fn sync_remote(&mut self, sink: &mut dyn Write) -> Result<(), CacheError> {
        let resolved = self.remote.resolve_credentials(self.credentials.as_ref())?;
        let request = HttpRequest {
            url: &resolved.url,
            credentials: resolved.credentials.as_ref(),
        };
        let bytes = self
            .transport
            .get(&request, sink)
            .map_err(|source| CacheError::Http {
                url: resolved.url.to_string(),
                source,
            })?;
        debug!(url = %resolved.url, bytes, "HTTPS download complete");
        Ok(())
    }
}
