use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::access::FetcherState;
use crate::error::CacheError;
use crate::location::Location;

use super::Fetcher;

/// Copies a local file into the cache. Never touches the network.
#[derive(Debug)]
pub struct LocalFetcher {
    location: Location,
    source: PathBuf,
    cache_path: PathBuf,
    state: FetcherState,
}

impl LocalFetcher {
    pub fn new(source: PathBuf, cache_path: PathBuf, state: FetcherState) -> Self {
        Self {
            location: Location::Local {
                path: source.clone(),
            },
            source,
            cache_path,
            state,
        }
    }

    /// The local source file.
    pub fn source(&self) -> &Path {
        &self.source
    }
}

impl Fetcher for LocalFetcher {
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
        if !self.source.is_file() {
            return Err(CacheError::NotFound(self.source.clone()));
        }
        let mut file = File::open(&self.source)?;
        io::copy(&mut file, sink)?;
        Ok(())
    }
}
