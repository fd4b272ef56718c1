//! SSH/SFTP transport.

use std::fs;
use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ssh2::{CheckResult, KnownHostFileKind, KnownHosts, Session, Sftp};
use tracing::debug;

use crate::credentials::Secret;
use crate::error::SftpError;

/// Where to connect and as whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
}

/// One authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SshAuth {
    Password(Secret),
    Agent,
    /// Private key file (public key expected next to it as `.pub`, optional).
    KeyFile(PathBuf),
}

/// The stages of an SFTP download, called in order by the SFTP fetcher.
///
/// Any stage failing aborts the download; later stages are not called.
pub trait SshTransport: Send {
    /// Load the user's known hosts file.
    fn load_system_host_keys(&mut self) -> Result<(), SftpError>;

    /// Load an additional known hosts file.
    fn load_host_keys(&mut self, path: &Path) -> Result<(), SftpError>;

    /// Connect, verify the host key and authenticate, trying `auth` in order.
    fn connect(&mut self, target: &SshTarget, auth: &[SshAuth]) -> Result<(), SftpError>;

    /// Open the SFTP channel on the connected session.
    fn open_sftp(&mut self) -> Result<(), SftpError>;

    /// Stream a remote file into `sink`. Returns the number of bytes copied.
    fn download(&mut self, remote_path: &str, sink: &mut dyn Write) -> Result<u64, SftpError>;

    /// Tear down the session.
    fn close(&mut self);
}

/// [`SshTransport`] over libssh2.
///
/// Host keys are verified against every known hosts file loaded before
/// `connect`; an unknown or mismatching host key fails the connect stage.
pub struct Ssh2Transport {
    timeout: Duration,
    system_known_hosts: Option<PathBuf>,
    known_hosts_files: Vec<PathBuf>,
    session: Option<Session>,
    sftp: Option<Sftp>,
}

impl Ssh2Transport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            system_known_hosts: directories::BaseDirs::new()
                .map(|dirs| dirs.home_dir().join(".ssh").join("known_hosts")),
            known_hosts_files: Vec::new(),
            session: None,
            sftp: None,
        }
    }

    /// Parse `path` as an OpenSSH known hosts file and remember it.
    fn add_known_hosts(&mut self, path: &Path) -> Result<(), SftpError> {
        let session = Session::new().map_err(|e| SftpError::Auth(e.to_string()))?;
        let count = read_known_hosts(&session, &[path.to_path_buf()])
            .map_err(|e| SftpError::Auth(format!("cannot load host keys: {e}")))?
            .1;
        debug!(path = %path.display(), count, "loaded host keys");
        self.known_hosts_files.push(path.to_path_buf());
        Ok(())
    }

    fn open_tcp(&self, target: &SshTarget) -> Result<TcpStream, SftpError> {
        let addrs = (target.host.as_str(), target.port)
            .to_socket_addrs()
            .map_err(|e| SftpError::Connect(format!("cannot resolve {}: {e}", target.host)))?;
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(SftpError::Connect(match last_err {
            Some(e) => format!("cannot connect to {}:{}: {e}", target.host, target.port),
            None => format!("no addresses for {}", target.host),
        }))
    }

    fn verify_host_key(&self, session: &Session, target: &SshTarget) -> Result<(), SftpError> {
        let (key, _) = session
            .host_key()
            .ok_or_else(|| SftpError::Connect("server sent no host key".to_string()))?;
        let (known_hosts, _) = read_known_hosts(session, &self.known_hosts_files)
            .map_err(|e| SftpError::Connect(format!("cannot load host keys: {e}")))?;
        match known_hosts.check_port(&target.host, target.port, key) {
            CheckResult::Match => Ok(()),
            CheckResult::Mismatch => Err(SftpError::Connect(format!(
                "host key for {} does not match known hosts",
                target.host
            ))),
            CheckResult::NotFound => Err(SftpError::Connect(format!(
                "host {} is not in known hosts",
                target.host
            ))),
            CheckResult::Failure => Err(SftpError::Connect(
                "host key verification failed".to_string(),
            )),
        }
    }
}

/// Known hosts store of `session` filled from `paths`, with the number of entries read.
fn read_known_hosts(session: &Session, paths: &[PathBuf]) -> Result<(KnownHosts, u32), String> {
    let mut known_hosts = session.known_hosts().map_err(|e| e.to_string())?;
    let mut count = 0;
    for path in paths {
        count += known_hosts
            .read_file(path, KnownHostFileKind::OpenSSH)
            .map_err(|e| format!("{}: {e}", path.display()))?;
    }
    Ok((known_hosts, count))
}

impl SshTransport for Ssh2Transport {
    fn load_system_host_keys(&mut self) -> Result<(), SftpError> {
        // A user without a known_hosts file simply trusts no hosts yet.
        match self.system_known_hosts.clone() {
            Some(path) if path.exists() => self.add_known_hosts(&path),
            _ => Ok(()),
        }
    }

    fn load_host_keys(&mut self, path: &Path) -> Result<(), SftpError> {
        if let Err(e) = fs::metadata(path) {
            return Err(SftpError::Auth(format!(
                "host key file {} is not readable: {e}",
                path.display()
            )));
        }
        self.add_known_hosts(path)
    }

    fn connect(&mut self, target: &SshTarget, auth: &[SshAuth]) -> Result<(), SftpError> {
        let tcp = self.open_tcp(target)?;
        let mut session = Session::new().map_err(|e| SftpError::Connect(e.to_string()))?;
        session.set_timeout(u32::try_from(self.timeout.as_millis()).unwrap_or(u32::MAX));
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| SftpError::Connect(format!("handshake failed: {e}")))?;
        self.verify_host_key(&session, target)?;

        for method in auth {
            let attempt = match method {
                SshAuth::Password(password) => {
                    session.userauth_password(&target.user, password.expose())
                }
                SshAuth::Agent => session.userauth_agent(&target.user),
                SshAuth::KeyFile(key) => {
                    session.userauth_pubkey_file(&target.user, None, key, None)
                }
            };
            match attempt {
                Ok(()) if session.authenticated() => {
                    self.session = Some(session);
                    return Ok(());
                }
                Ok(()) => {}
                Err(e) => debug!(user = %target.user, error = %e, "SSH auth method failed"),
            }
        }

        Err(SftpError::Connect(format!(
            "authentication failed for user {} on {}",
            target.user, target.host
        )))
    }

    fn open_sftp(&mut self) -> Result<(), SftpError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| SftpError::Channel("not connected".to_string()))?;
        let sftp = session
            .sftp()
            .map_err(|e| SftpError::Channel(e.to_string()))?;
        self.sftp = Some(sftp);
        Ok(())
    }

    fn download(&mut self, remote_path: &str, sink: &mut dyn Write) -> Result<u64, SftpError> {
        let sftp = self
            .sftp
            .as_ref()
            .ok_or_else(|| SftpError::Transfer("SFTP channel not open".to_string()))?;
        let mut file = sftp
            .open(Path::new(remote_path))
            .map_err(|e| SftpError::Transfer(format!("cannot open {remote_path}: {e}")))?;
        io::copy(&mut file, sink)
            .map_err(|e| SftpError::Transfer(format!("cannot read {remote_path}: {e}")))
    }

    fn close(&mut self) {
        self.sftp = None;
        self.known_hosts_files.clear();
        if let Some(session) = self.session.take() {
            let _ = session.disconnect(None, "closing", None);
        }
    }
}
