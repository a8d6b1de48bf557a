//! Endpoint parsing and TCP/TLS dialing.
//!
//! Accepted endpoint forms:
//! - `tcp://host:port` (Docker CLI style)
//! - `http://host:port` / `https://host:port`
//!
//! The scheme only picks a default port; TLS is used exactly when a
//! connector is supplied.

use std::fmt;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use url::Url;

use crate::error::{DockerpcError, Result};

/// Default plaintext daemon port.
pub const DEFAULT_HTTP_PORT: u16 = 2375;

/// Default TLS daemon port.
pub const DEFAULT_TLS_PORT: u16 = 2376;

/// Byte stream usable as an attach connection.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Dialed connection, plain or encrypted.
pub type BoxedStream = Box<dyn AsyncStream>;

/// Parsed daemon address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or IP literal (without brackets).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Endpoint {
    /// Parse an endpoint string.
    ///
    /// # Errors
    ///
    /// `AttachFailed` if the string is not a URL, uses an unsupported scheme
    /// (including `unix://`), or has no host.
    ///
    /// # Example
    ///
    /// ```
    /// use dockerpc::transport::Endpoint;
    ///
    /// let endpoint = Endpoint::parse("tcp://192.168.99.100:2376").unwrap();
    /// assert_eq!(endpoint.host, "192.168.99.100");
    /// assert_eq!(endpoint.port, 2376);
    /// ```
    pub fn parse(endpoint: &str) -> Result<Self> {
        let url = Url::parse(endpoint).map_err(|e| {
            DockerpcError::AttachFailed(format!("Malformed endpoint {:?}: {}", endpoint, e))
        })?;

        let default_port = match url.scheme() {
            "tcp" | "http" => DEFAULT_HTTP_PORT,
            "https" => DEFAULT_TLS_PORT,
            other => {
                return Err(DockerpcError::AttachFailed(format!(
                    "Unsupported endpoint scheme {:?} in {:?}",
                    other, endpoint
                )))
            }
        };

        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| {
                DockerpcError::AttachFailed(format!("Endpoint {:?} has no host", endpoint))
            })?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        Ok(Self {
            host,
            port: url.port().unwrap_or(default_port),
        })
    }

    /// `host:port` form suitable for an HTTP `Host` header.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

/// Open a connection to `endpoint`, wrapping it in TLS when `tls` is set.
///
/// # Errors
///
/// `DialFailed` if the TCP connect or the TLS handshake fails.
pub async fn dial(endpoint: &Endpoint, tls: Option<&TlsConnector>) -> Result<BoxedStream> {
    let addr = endpoint.authority();
    let dial_error = |source: std::io::Error| DockerpcError::DialFailed {
        addr: addr.clone(),
        source,
    };

    let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(dial_error)?;
    tcp.set_nodelay(true).map_err(dial_error)?;

    let Some(connector) = tls else {
        tracing::debug!(%addr, "Dialed daemon (plaintext)");
        return Ok(Box::new(tcp));
    };

    let server_name = ServerName::try_from(endpoint.host.clone()).map_err(|e| {
        dial_error(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
    })?;
    let stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(dial_error)?;

    tracing::debug!(%addr, "Dialed daemon (TLS)");
    Ok(Box::new(stream))
}
