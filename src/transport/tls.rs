//! TLS connector built from the daemon's PEM files.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::config::TlsPaths;
use crate::error::{DockerpcError, Result};

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| DockerpcError::Tls(format!("Cannot open {}: {}", path.display(), e)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| DockerpcError::Tls(format!("Invalid PEM in {}: {}", path.display(), e)))?;

    if certs.is_empty() {
        return Err(DockerpcError::Tls(format!(
            "No certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|e| DockerpcError::Tls(format!("Invalid PEM in {}: {}", path.display(), e)))?
        .ok_or_else(|| DockerpcError::Tls(format!("No private key found in {}", path.display())))
}

/// Build a client-authenticating TLS connector from `paths`.
///
/// The daemon is verified against the CA in `paths.ca` only; system roots
/// are not consulted.
pub fn load_connector(paths: &TlsPaths) -> Result<TlsConnector> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(&paths.ca)? {
        roots
            .add(cert)
            .map_err(|e| DockerpcError::Tls(format!("Bad CA certificate: {}", e)))?;
    }

    let chain = load_certs(&paths.cert)?;
    let key = load_key(&paths.key)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| DockerpcError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_client_auth_cert(chain, key)
        .map_err(|e| DockerpcError::Tls(format!("Bad client certificate: {}", e)))?;

    Ok(TlsConnector::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_files_are_tls_errors() {
        let dir = tempfile::tempdir().unwrap();
        let paths = TlsPaths::from_dir(dir.path());

        let err = load_connector(&paths).err().unwrap();
        assert!(matches!(err, DockerpcError::Tls(_)));
        assert!(err.to_string().contains("ca.pem"));
    }

    #[test]
    fn test_empty_ca_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("ca.pem")).unwrap();

        let err = load_connector(&TlsPaths::from_dir(dir.path())).err().unwrap();
        assert!(err.to_string().contains("No certificates found"));
    }

    #[test]
    fn test_key_file_without_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = File::create(dir.path().join("key.pem")).unwrap();
        writeln!(file, "not a pem block").unwrap();

        let err = load_key(&dir.path().join("key.pem")).err().unwrap();
        assert!(err.to_string().contains("No private key found"));
    }
}
