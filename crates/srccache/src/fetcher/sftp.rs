use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::access::FetcherState;
use crate::credentials::{CredentialSource, NoCredentials, Secret};
use crate::error::{CacheError, SftpError};
use crate::location::{Location, SftpLocation};
use crate::transport::{SshAuth, SshTarget, SshTransport};

use super::Fetcher;

/// Environment variable naming an additional known hosts file.
pub const SSH_KEY_ENV: &str = "SSH_KEY";

/// Private keys tried, in order, when no password is given and the agent fails.
const DEFAULT_KEY_FILES: &[&str] = &["id_ed25519", "id_rsa"];

/// Downloads a file over SFTP.
///
/// Stages run strictly in order: host keys, connect/authenticate, open the
/// SFTP channel, transfer. The first failure stops the sequence.
pub struct SftpFetcher {
    location: Location,
    remote: SftpLocation,
    cache_path: PathBuf,
    state: FetcherState,
    credentials: Arc<dyn CredentialSource>,
    host_key_file: Option<PathBuf>,
    host_key_env: Option<&'static str>,
    home_dir: Option<PathBuf>,
    os_user: Option<String>,
    transport: Box<dyn SshTransport>,
}

impl SftpFetcher {
    pub fn new(
        remote: SftpLocation,
        cache_path: PathBuf,
        state: FetcherState,
        transport: Box<dyn SshTransport>,
    ) -> Self {
        Self {
            location: Location::Sftp(remote.clone()),
            remote,
            cache_path,
            state,
            credentials: Arc::new(NoCredentials),
            host_key_file: None,
            host_key_env: Some(SSH_KEY_ENV),
            home_dir: directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()),
            os_user: current_user(),
            transport,
        }
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialSource>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Use `path` as the additional known hosts file instead of `$SSH_KEY`.
    ///
    /// `None` disables the additional file altogether.
    pub fn with_host_key_file(mut self, path: Option<PathBuf>) -> Self {
        self.host_key_file = path;
        self.host_key_env = None;
        self
    }

    /// Home directory used to locate default private keys.
    pub fn with_home_dir(mut self, home_dir: Option<PathBuf>) -> Self {
        self.home_dir = home_dir;
        self
    }

    /// User to act as when the URI names none.
    pub fn with_os_user(mut self, user: Option<String>) -> Self {
        self.os_user = user;
        self
    }

    fn additional_host_keys(&self) -> Option<PathBuf> {
        self.host_key_file.clone().or_else(|| {
            self.host_key_env
                .and_then(std::env::var_os)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
    }

    fn download(&mut self, remote: &SftpLocation, sink: &mut dyn Write) -> Result<(), CacheError> {
        self.transport.load_system_host_keys()?;
        if let Some(path) = self.additional_host_keys() {
            self.transport.load_host_keys(&path)?;
        }

        let user = remote
            .user
            .clone()
            .or_else(|| self.os_user.clone())
            .ok_or_else(|| SftpError::Auth("cannot determine the current user".to_string()))?;
        let target = SshTarget {
            host: remote.host.clone(),
            port: remote.port,
            user,
        };
        let auth = auth_methods(remote.password.as_ref(), self.home_dir.as_deref());
        self.transport.connect(&target, &auth)?;
        self.transport.open_sftp()?;
        let bytes = self.transport.download(&remote.remote_path, sink)?;
        debug!(host = %target.host, bytes, "SFTP download complete");
        Ok(())
    }
}

impl Fetcher for SftpFetcher {
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
        let remote = self.remote.resolve_credentials(self.credentials.as_ref())?;
        let result = self.download(&remote, sink);
        self.transport.close();
        result
    }
}

/// Authentication attempts, in order.
///
/// A password from the URI is the only method when present. Otherwise the
/// ssh-agent is tried first, then `~/.ssh/id_ed25519` and `~/.ssh/id_rsa`
/// if they exist.
pub fn auth_methods(password: Option<&Secret>, home_dir: Option<&Path>) -> Vec<SshAuth> {
    if let Some(password) = password {
        return vec![SshAuth::Password(password.clone())];
    }

    let mut methods = vec![SshAuth::Agent];
    if let Some(home) = home_dir {
        methods.extend(
            DEFAULT_KEY_FILES
                .iter()
                .map(|name| home.join(".ssh").join(name))
                .filter(|path| path.is_file())
                .map(SshAuth::KeyFile),
        );
    }
    methods
}

fn current_user() -> Option<String> {
    ["USER", "USERNAME", "LOGNAME"]
        .into_iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|user| !user.is_empty())
}
