//! Configuration: environment lookup and TLS material locations.
//!
//! Follows the Docker CLI conventions:
//! - `DOCKER_HOST` names the daemon endpoint (`tcp://host:port`)
//! - `DOCKER_CERT_PATH` points at a directory holding `ca.pem`, `cert.pem`
//!   and `key.pem`; when it is unset the connection is plaintext

use std::path::{Path, PathBuf};

/// Environment variable selecting TLS and naming the certificate directory.
pub const DOCKER_CERT_PATH_ENV: &str = "DOCKER_CERT_PATH";

/// Environment variable holding the daemon endpoint.
pub const DOCKER_HOST_ENV: &str = "DOCKER_HOST";

/// CA bundle file name inside the certificate directory.
pub const CA_FILE: &str = "ca.pem";

/// Client certificate file name inside the certificate directory.
pub const CERT_FILE: &str = "cert.pem";

/// Client key file name inside the certificate directory.
pub const KEY_FILE: &str = "key.pem";

/// Timeout in seconds for lifecycle calls against the Docker API.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 120;

/// Paths to the PEM files used for mutual TLS with the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    /// CA certificate(s) used to verify the daemon.
    pub ca: PathBuf,
    /// Client certificate chain.
    pub cert: PathBuf,
    /// Client private key.
    pub key: PathBuf,
}

impl TlsPaths {
    /// Paths for the conventional file names under `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            ca: dir.join(CA_FILE),
            cert: dir.join(CERT_FILE),
            key: dir.join(KEY_FILE),
        }
    }

    /// Read `DOCKER_CERT_PATH`. Unset or empty means no TLS.
    pub fn from_env() -> Option<Self> {
        std::env::var_os(DOCKER_CERT_PATH_ENV)
            .filter(|path| !path.is_empty())
            .map(Self::from_dir)
    }
}

/// Read `DOCKER_HOST`, if set and non-empty.
pub fn docker_host_from_env() -> Option<String> {
    std::env::var(DOCKER_HOST_ENV)
        .ok()
        .filter(|host| !host.is_empty())
}

/// Serializes tests that touch process environment variables.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Run `f` with `name` set to `value` (or removed), restoring it afterwards.
#[cfg(test)]
pub(crate) fn with_env_var<R>(name: &str, value: Option<&str>, f: impl FnOnce() -> R) -> R {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let saved = std::env::var_os(name);
    match value {
        Some(value) => std::env::set_var(name, value),
        None => std::env::remove_var(name),
    }
    let result = f();
    match saved {
        Some(saved) => std::env::set_var(name, saved),
        None => std::env::remove_var(name),
    }
    result
}
