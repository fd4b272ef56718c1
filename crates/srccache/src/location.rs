//! Location classification.
//!
//! A location string is one of:
//!
//! - a bare filesystem path or a `file://` URI,
//! - `sftp://[user[:password]@]host[:port]/absolute/remote/path`,
//! - `https://[user[:password]@]host[:port]/path`.
//!
//! [`Location::classify`] turns such a string into a typed [`Location`] or
//! rejects it with [`CacheError::MalformedLocation`].

use std::fmt;
use std::path::{Component, Path, PathBuf};

use percent_encoding::percent_decode_str;
use url::{Host, Url};

use crate::credentials::{self, CredentialSource, Credentials, Secret};
use crate::error::CacheError;

/// Default SSH port.
pub const SFTP_DEFAULT_PORT: u16 = 22;

/// A validated, fetchable source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// Local file, absolute and lexically normalized.
    Local { path: PathBuf },
    /// File on an SFTP server.
    Sftp(SftpLocation),
    /// Resource behind an HTTPS URL.
    Https(HttpsLocation),
}

/// An SFTP source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SftpLocation {
    /// Lowercased host name.
    pub host: String,
    pub port: u16,
    /// User from the URI; `None` means the current OS user.
    pub user: Option<String>,
    pub password: Option<Secret>,
    /// Absolute remote path, percent-decoded.
    pub remote_path: String,
}

/// An HTTPS source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HttpsLocation {
    /// The URL with userinfo and fragment removed.
    pub url: Url,
    /// Basic auth credentials taken from the URL userinfo.
    pub credentials: Option<Credentials>,
}

impl Location {
    /// Classify a raw location string.
    ///
    /// Relative local paths are resolved against `base_dir`.
    pub fn classify(raw: &str, base_dir: &Path) -> Result<Self, CacheError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CacheError::malformed(raw, "empty location"));
        }

        match split_scheme(trimmed) {
            Some((scheme, _)) => match scheme.to_ascii_lowercase().as_str() {
                "file" => classify_file_uri(trimmed),
                "sftp" => classify_sftp(trimmed).map(Location::Sftp),
                "https" => classify_https(trimmed).map(Location::Https),
                other => Err(CacheError::malformed(
                    trimmed,
                    format!("unsupported scheme `{other}`"),
                )),
            },
            None => classify_local(Path::new(trimmed), base_dir),
        }
    }

    /// Scheme name used for cache layout and display.
    pub fn scheme(&self) -> &'static str {
        match self {
            Location::Local { .. } => "file",
            Location::Sftp(_) => "sftp",
            Location::Https(_) => "https",
        }
    }

    /// Host name of a remote location.
    pub fn host(&self) -> Option<&str> {
        match self {
            Location::Local { .. } => None,
            Location::Sftp(sftp) => Some(&sftp.host),
            Location::Https(https) => https.url.host_str(),
        }
    }

    /// Last path segment of the source, if any.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Location::Local { path } => path.file_name().and_then(|n| n.to_str()),
            Location::Sftp(sftp) => last_segment(&sftp.remote_path),
            Location::Https(https) => last_segment(https.url.path()),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Location::Local { .. })
    }

    /// Whether any credential field still holds a `{{NAME}}` placeholder.
    pub fn has_placeholders(&self) -> bool {
        match self {
            Location::Local { .. } => false,
            Location::Sftp(sftp) => {
                sftp.user.as_deref().is_some_and(credentials::is_templated)
                    || sftp
                        .password
                        .as_ref()
                        .is_some_and(|p| credentials::is_templated(p.expose()))
            }
            Location::Https(https) => https.credentials.as_ref().is_some_and(|c| {
                credentials::is_templated(&c.username)
                    || c.password
                        .as_ref()
                        .is_some_and(|p| credentials::is_templated(p.expose()))
            }),
        }
    }

    /// Substitute credential placeholders from `source`.
    ///
    /// Pure: returns a new location, the receiver is unchanged.
    pub fn resolve_credentials(&self, source: &dyn CredentialSource) -> Result<Self, CacheError> {
        match self {
            Location::Local { .. } => Ok(self.clone()),
            Location::Sftp(sftp) => Ok(Location::Sftp(sftp.resolve_credentials(source)?)),
            Location::Https(https) => Ok(Location::Https(https.resolve_credentials(source)?)),
        }
    }
}

impl SftpLocation {
    pub fn resolve_credentials(&self, source: &dyn CredentialSource) -> Result<Self, CacheError> {
        Ok(Self {
            user: self
                .user
                .as_deref()
                .map(|u| credentials::substitute(u, source))
                .transpose()?,
            password: self
                .password
                .as_ref()
                .map(|p| credentials::substitute(p.expose(), source).map(Secret::new))
                .transpose()?,
            ..self.clone()
        })
    }
}

impl HttpsLocation {
    pub fn resolve_credentials(&self, source: &dyn CredentialSource) -> Result<Self, CacheError> {
        Ok(Self {
            url: self.url.clone(),
            credentials: self
                .credentials
                .as_ref()
                .map(|c| credentials::resolve_credentials(c, source))
                .transpose()?,
        })
    }
}

/// Never prints credentials.
impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local { path } => write!(f, "{}", path.display()),
            Location::Sftp(sftp) => write!(f, "{sftp}"),
            Location::Https(https) => write!(f, "{}", https.url),
        }
    }
}

impl fmt::Display for SftpLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "sftp://[{}]", self.host)?;
        } else {
            write!(f, "sftp://{}", self.host)?;
        }
        if self.port != SFTP_DEFAULT_PORT {
            write!(f, ":{}", self.port)?;
        }
        write!(f, "{}", self.remote_path)
    }
}

/// Split `scheme://rest` when the prefix is a syntactically valid scheme.
fn split_scheme(raw: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = raw.split_once("://")?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}

fn classify_local(path: &Path, base_dir: &Path) -> Result<Location, CacheError> {
    let raw = path.to_string_lossy();
    if path.file_name().is_none() {
        return Err(CacheError::malformed(&raw, "local path does not name a file"));
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    };
    Ok(Location::Local {
        path: normalize_lexically(&absolute),
    })
}

fn classify_file_uri(raw: &str) -> Result<Location, CacheError> {
    let url = Url::parse(raw)
        .map_err(|e| CacheError::malformed(raw, format!("invalid file URI: {e}")))?;
    let path = url
        .to_file_path()
        .map_err(|()| CacheError::malformed(raw, "file URI does not map to a local path"))?;
    if path.file_name().is_none() {
        return Err(CacheError::malformed(raw, "local path does not name a file"));
    }
    Ok(Location::Local {
        path: normalize_lexically(&path),
    })
}

fn classify_sftp(raw: &str) -> Result<SftpLocation, CacheError> {
    if raw.contains('\\') {
        return Err(CacheError::malformed(
            raw,
            "malformed SFTP URI: backslash path separators are not allowed",
        ));
    }
    let url = Url::parse(raw)
        .map_err(|e| CacheError::malformed(raw, format!("malformed SFTP URI: {e}")))?;

    // `?` and `#` are part of an SFTP file name, never a query or fragment.
    if url.query().is_some() || url.fragment().is_some() {
        return Err(CacheError::malformed(
            raw,
            "malformed SFTP URI: `?` and `#` must be percent-encoded in the remote path",
        ));
    }

    let host = match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_ascii_lowercase(),
        // Bare address, so it resolves as a socket address.
        Some(Host::Ipv6(addr)) => addr.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        _ => return Err(CacheError::malformed(raw, "malformed SFTP URI: missing host")),
    };

    let path = url.path();
    if !path.starts_with('/') || last_segment(path).is_none() {
        return Err(CacheError::malformed(
            raw,
            "malformed SFTP URI: missing absolute remote file path",
        ));
    }
    let remote_path = decode(path, raw)?;
    if remote_path.contains('\\') {
        return Err(CacheError::malformed(
            raw,
            "malformed SFTP URI: backslash path separators are not allowed",
        ));
    }

    let (user, password) = decode_userinfo(&url, raw)?;
    if user.is_none() && password.is_some() {
        return Err(CacheError::malformed(
            raw,
            "malformed SFTP URI: password given without a user",
        ));
    }

    Ok(SftpLocation {
        host,
        port: url.port().unwrap_or(SFTP_DEFAULT_PORT),
        user,
        password: password.map(Secret::new),
        remote_path,
    })
}

fn classify_https(raw: &str) -> Result<HttpsLocation, CacheError> {
    // `https:///host` would otherwise be accepted with the extra slash dropped.
    let after_scheme = &raw["https://".len()..];
    if after_scheme.is_empty() || after_scheme.starts_with(['/', '\\']) {
        return Err(CacheError::malformed(raw, "malformed HTTPS URL: missing host"));
    }

    let mut url = Url::parse(raw)
        .map_err(|e| CacheError::malformed(raw, format!("malformed HTTPS URL: {e}")))?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(CacheError::malformed(raw, "malformed HTTPS URL: missing host"));
    }

    let (user, password) = decode_userinfo(&url, raw)?;
    let credentials = match (user, password) {
        (Some(username), password) => Some(Credentials {
            username,
            password: password.map(Secret::new),
        }),
        (None, Some(_)) => {
            return Err(CacheError::malformed(
                raw,
                "malformed HTTPS URL: password given without a user",
            ));
        }
        (None, None) => None,
    };

    url.set_username("")
        .and_then(|()| url.set_password(None))
        .map_err(|()| CacheError::malformed(raw, "malformed HTTPS URL: cannot strip credentials"))?;
    url.set_fragment(None);

    Ok(HttpsLocation { url, credentials })
}

/// Percent-decoded, template-checked user and password.
fn decode_userinfo(url: &Url, raw: &str) -> Result<(Option<String>, Option<String>), CacheError> {
    let user = Some(decode(url.username(), raw)?).filter(|u| !u.is_empty());
    let password = url.password().map(|p| decode(p, raw)).transpose()?;

    for value in user.iter().chain(password.iter()) {
        credentials::check_template(value).map_err(|reason| CacheError::malformed(raw, reason))?;
    }
    Ok((user, password))
}

fn decode(value: &str, raw: &str) -> Result<String, CacheError> {
    percent_decode_str(value)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| CacheError::malformed(raw, "URI component is not valid UTF-8"))
}

fn last_segment(path: &str) -> Option<&str> {
    path.rsplit('/').next().filter(|s| !s.is_empty() && *s != "." && *s != "..")
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
