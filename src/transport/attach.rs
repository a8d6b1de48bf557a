//! Attach session: upgrade an HTTP request into the container's stdio stream.
//!
//! Two phases:
//! 1. `POST /containers/{id}/attach?...` with `Connection: Upgrade` and
//!    `Upgrade: tcp`, sent over a freshly dialed connection
//! 2. on `101 Switching Protocols`, take the raw upgraded connection
//!
//! Nothing after phase 2 touches the HTTP request or response again; the
//! returned [`AttachedStream`] carries only the multiplexed attach protocol.
//!
//! # Example
//!
//! ```ignore
//! use dockerpc::transport::{AttachOptions, AttachSession, Endpoint};
//!
//! let session = AttachSession::new(Endpoint::parse("tcp://127.0.0.1:2375")?, None);
//! let stream = session.attach("4f1c2b", &AttachOptions::default()).await?;
//! ```

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::header::{CONNECTION, CONTENT_TYPE, HOST, UPGRADE};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use tokio_rustls::TlsConnector;
use url::form_urlencoded;

use super::dial::{dial, Endpoint};
use crate::error::{DockerpcError, Result};

/// Raw bidirectional connection after a successful upgrade.
pub type AttachedStream = TokioIo<hyper::upgrade::Upgraded>;

/// Which streams to attach and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachOptions {
    /// Attach to stdin.
    pub stdin: bool,
    /// Attach to stdout.
    pub stdout: bool,
    /// Attach to stderr.
    pub stderr: bool,
    /// Keep streaming after past output is replayed.
    pub stream: bool,
    /// Replay output produced before the attach.
    pub logs: bool,
    /// Override the key sequence for detaching.
    pub detach_keys: Option<String>,
}

impl Default for AttachOptions {
    /// Full duplex streaming: stdin, stdout, stderr and stream all on.
    fn default() -> Self {
        Self {
            stdin: true,
            stdout: true,
            stderr: true,
            stream: true,
            logs: false,
            detach_keys: None,
        }
    }
}

impl AttachOptions {
    /// Encode as a query string.
    ///
    /// Set flags become `key=1`, unset flags are omitted, keys are sorted.
    ///
    /// # Example
    ///
    /// ```
    /// use dockerpc::transport::AttachOptions;
    ///
    /// assert_eq!(
    ///     AttachOptions::default().query_string(),
    ///     "stderr=1&stdin=1&stdout=1&stream=1"
    /// );
    /// ```
    pub fn query_string(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        if let Some(keys) = &self.detach_keys {
            query.append_pair("detachKeys", keys);
        }
        let flags = [
            ("logs", self.logs),
            ("stderr", self.stderr),
            ("stdin", self.stdin),
            ("stdout", self.stdout),
            ("stream", self.stream),
        ];
        for (key, set) in flags {
            if set {
                query.append_pair(key, "1");
            }
        }
        query.finish()
    }

    /// Request path for `container_id`, including the query.
    pub fn path(&self, container_id: &str) -> String {
        let id: String = form_urlencoded::byte_serialize(container_id.as_bytes()).collect();
        format!("/containers/{}/attach?{}", id, self.query_string())
    }
}

/// Performs the attach handshake against one daemon endpoint.
#[derive(Clone)]
pub struct AttachSession {
    endpoint: Endpoint,
    tls: Option<TlsConnector>,
}

impl AttachSession {
    /// Create a session. TLS is used exactly when `tls` is set.
    pub fn new(endpoint: Endpoint, tls: Option<TlsConnector>) -> Self {
        Self { endpoint, tls }
    }

    /// Daemon address this session dials.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Check if the session dials with TLS.
    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Attach to `container_id` and return the hijacked connection.
    ///
    /// # Errors
    ///
    /// - `DialFailed` if the daemon cannot be reached
    /// - `AttachFailed` if the daemon rejects the request (status and body
    ///   are included) or the upgrade breaks
    pub async fn attach(&self, container_id: &str, options: &AttachOptions) -> Result<AttachedStream> {
        let path = options.path(container_id);
        let stream = dial(&self.endpoint, self.tls.as_ref()).await?;

        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| DockerpcError::AttachFailed(format!("HTTP handshake failed: {}", e)))?;

        // Drives the connection until the upgrade hands the socket over.
        tokio::spawn(async move {
            if let Err(e) = connection.with_upgrades().await {
                tracing::error!("Attach connection error: {}", e);
            }
        });

        let request = Request::builder()
            .method(Method::POST)
            .uri(&path)
            .header(HOST, self.endpoint.authority())
            .header(CONTENT_TYPE, "plain/text")
            .header(CONNECTION, "Upgrade")
            .header(UPGRADE, "tcp")
            .body(Empty::<Bytes>::new())
            .map_err(|e| DockerpcError::AttachFailed(format!("Invalid attach request: {}", e)))?;

        tracing::debug!(endpoint = %self.endpoint, %path, "Requesting attach upgrade");

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| DockerpcError::AttachFailed(format!("Attach request failed: {}", e)))?;

        let status = response.status();
        if status != StatusCode::SWITCHING_PROTOCOLS {
            let detail = match response.into_body().collect().await {
                Ok(body) => String::from_utf8_lossy(&body.to_bytes()).trim().to_string(),
                Err(_) => String::new(),
            };
            return Err(DockerpcError::AttachFailed(if detail.is_empty() {
                format!("Daemon responded {}", status)
            } else {
                format!("Daemon responded {}: {}", status, detail)
            }));
        }

        let upgraded = hyper::upgrade::on(response)
            .await
            .map_err(|e| DockerpcError::AttachFailed(format!("Upgrade failed: {}", e)))?;

        tracing::info!(container = container_id, "Attached to container stdio");
        Ok(TokioIo::new(upgraded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Read an HTTP request head (up to and including the blank line).
    async fn read_head(socket: &mut TcpStream) -> String {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            socket.read_exact(&mut byte).await.unwrap();
            head.push(byte[0]);
        }
        String::from_utf8(head).unwrap()
    }

    async fn session_for(listener: &TcpListener) -> AttachSession {
        let port = listener.local_addr().unwrap().port();
        AttachSession::new(
            Endpoint {
                host: "127.0.0.1".to_string(),
                port,
            },
            None,
        )
    }

    #[test]
    fn test_default_query_string() {
        assert_eq!(
            AttachOptions::default().query_string(),
            "stderr=1&stdin=1&stdout=1&stream=1"
        );
    }

    #[test]
    fn test_query_string_omits_unset_flags() {
        let options = AttachOptions {
            stdin: false,
            stream: false,
            logs: true,
            ..AttachOptions::default()
        };
        assert_eq!(options.query_string(), "logs=1&stderr=1&stdout=1");
    }

    #[test]
    fn test_query_string_detach_keys() {
        let options = AttachOptions {
            detach_keys: Some("ctrl-p,ctrl-q".to_string()),
            ..AttachOptions::default()
        };
        assert!(options
            .query_string()
            .starts_with("detachKeys=ctrl-p%2Cctrl-q&"));
    }

    #[test]
    fn test_attach_path() {
        let path = AttachOptions::default().path("abc123");
        assert_eq!(
            path,
            "/containers/abc123/attach?stderr=1&stdin=1&stdout=1&stream=1"
        );
    }

    #[tokio::test]
    async fn test_attach_upgrade_hands_over_raw_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let session = session_for(&listener).await;

        let daemon = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let head = read_head(&mut socket).await;
            socket
                .write_all(
                    b"HTTP/1.1 101 UPGRADED\r\n\
                      Content-Type: application/vnd.docker.raw-stream\r\n\
                      Connection: Upgrade\r\n\
                      Upgrade: tcp\r\n\r\n",
                )
                .await
                .unwrap();
            socket.write_all(b"raw bytes").await.unwrap();

            let mut echo = [0u8; 5];
            socket.read_exact(&mut echo).await.unwrap();
            (head, echo)
        });

        let mut stream = session
            .attach("abc123", &AttachOptions::default())
            .await
            .unwrap();

        let mut buf = [0u8; 9];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"raw bytes");
        stream.write_all(b"hello").await.unwrap();
        stream.flush().await.unwrap();

        let (head, echo) = daemon.await.unwrap();
        let lower = head.to_ascii_lowercase();
        assert!(head.starts_with(
            "POST /containers/abc123/attach?stderr=1&stdin=1&stdout=1&stream=1 HTTP/1.1\r\n"
        ));
        assert!(lower.contains("content-type: plain/text\r\n"));
        assert!(lower.contains("connection: upgrade\r\n"));
        assert!(lower.contains("upgrade: tcp\r\n"));
        assert_eq!(&echo, b"hello");
    }

    #[tokio::test]
    async fn test_attach_rejected_carries_detail() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let session = session_for(&listener).await;

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = read_head(&mut socket).await;
            let body = "{\"message\":\"No such container: nope\"}";
            let response = format!(
                "HTTP/1.1 404 Not Found\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });

        let err = session
            .attach("nope", &AttachOptions::default())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, DockerpcError::AttachFailed(_)));
        let message = err.to_string();
        assert!(message.contains("404"));
        assert!(message.contains("No such container"));
    }

    #[tokio::test]
    async fn test_attach_dial_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let session = session_for(&listener).await;
        drop(listener);

        let err = session
            .attach("abc123", &AttachOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DockerpcError::DialFailed { .. }));
    }
}
