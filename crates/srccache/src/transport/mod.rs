//! Network transports used by the remote fetchers.
//!
//! Fetchers talk to the network only through these traits, so tests can
//! substitute recording fakes.

mod http;
mod ssh;

pub use http::{HttpRequest, HttpTransport, ReqwestTransport};
pub use ssh::{Ssh2Transport, SshAuth, SshTarget, SshTransport};
