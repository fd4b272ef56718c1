//! HTTPS transport.

use std::io::{Read, Write};
use std::sync::OnceLock;
use std::time::Duration;

use reqwest::blocking::Client;
use url::Url;

use crate::credentials::Credentials;
use crate::error::HttpError;

/// An authenticated GET request.
#[derive(Debug, Clone)]
pub struct HttpRequest<'a> {
    pub url: &'a Url,
    /// Basic auth credentials, already resolved.
    pub credentials: Option<&'a Credentials>,
}

/// Performs GET requests and streams the body.
pub trait HttpTransport: Send + Sync {
    /// Stream the response body of a successful GET into `sink`.
    ///
    /// Non-success statuses are errors. Returns the number of bytes copied.
    fn get(&self, request: &HttpRequest<'_>, sink: &mut dyn Write) -> Result<u64, HttpError>;
}

/// [`HttpTransport`] over a blocking reqwest client.
///
/// - Connect timeout: 10 seconds by default
/// - Request timeout: 30 seconds by default
pub struct ReqwestTransport {
    connect_timeout: Duration,
    timeout: Duration,
    max_file_size: u64,
    client: OnceLock<Client>,
}

impl ReqwestTransport {
    pub fn new(connect_timeout: Duration, timeout: Duration, max_file_size: u64) -> Self {
        Self {
            connect_timeout,
            timeout,
            max_file_size,
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&Client, HttpError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(format!(
                "{}@{}",
                option_env!("CARGO_BIN_NAME").unwrap_or("srccache"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        Ok(self.client.get_or_init(|| client))
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, request: &HttpRequest<'_>, sink: &mut dyn Write) -> Result<u64, HttpError> {
        let mut builder = self.client()?.get(request.url.as_str());
        if let Some(credentials) = request.credentials {
            builder = builder.basic_auth(
                &credentials.username,
                credentials.password.as_ref().map(|p| p.expose()),
            );
        }

        let response = builder
            .send()
            .map_err(|e| HttpError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                status: status.as_u16(),
            });
        }

        // Check content length
        if let Some(content_length) = response.content_length()
            && content_length > self.max_file_size
        {
            return Err(HttpError::FileTooLarge {
                size: content_length,
                limit: self.max_file_size,
            });
        }

        // Verify size limit for streaming responses
        let mut body = response.take(self.max_file_size.saturating_add(1));
        let copied = std::io::copy(&mut body, sink)
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        if copied > self.max_file_size {
            return Err(HttpError::FileTooLarge {
                size: copied,
                limit: self.max_file_size,
            });
        }
        Ok(copied)
    }
}
