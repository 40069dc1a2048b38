//! PEM-backed TLS credential provider
//!
//! Certificates are generated elsewhere; this module only loads them.
//! Expected layout under the certificate directory:
//!
//! ```text
//! <cert_dir>/<service>/ca.pem
//! <cert_dir>/<service>/client.pem   <cert_dir>/<service>/client-key.pem
//! <cert_dir>/<service>/server.pem   <cert_dir>/<service>/server-key.pem
//! ```
//!
//! `extra` replaces the role in the file stem (`<extra>.pem`, `<extra>-key.pem`).

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};

use crate::error::CredentialError;
use crate::traits::{CredentialProvider, TlsConfig, TlsRole};

/// Loads mTLS material from PEM files
#[derive(Debug, Clone)]
pub struct PemCredentialProvider {
    cert_dir: PathBuf,
    crypto: Arc<CryptoProvider>,
}

impl PemCredentialProvider {
    /// Create a provider rooted at `cert_dir`
    pub fn new(cert_dir: impl Into<PathBuf>) -> Self {
        Self {
            cert_dir: cert_dir.into(),
            crypto: Arc::new(rustls::crypto::ring::default_provider()),
        }
    }

    /// Directory holding the files of `service`
    pub fn service_dir(&self, service: &str) -> PathBuf {
        self.cert_dir.join(service)
    }

    fn roots(&self, service: &str) -> Result<RootCertStore, CredentialError> {
        let mut roots = RootCertStore::empty();
        for cert in load_certs(&self.service_dir(service).join("ca.pem"))? {
            roots
                .add(cert)
                .map_err(|e| CredentialError::Tls(e.to_string()))?;
        }
        Ok(roots)
    }

    fn identity(
        &self,
        service: &str,
        stem: &str,
    ) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), CredentialError> {
        let dir = self.service_dir(service);
        let certs = load_certs(&dir.join(format!("{}.pem", stem)))?;
        let key = load_key(&dir.join(format!("{}-key.pem", stem)))?;
        Ok((certs, key))
    }

    fn client(&self, service: &str, stem: &str) -> Result<ClientConfig, CredentialError> {
        let roots = self.roots(service)?;
        let (certs, key) = self.identity(service, stem)?;

        ClientConfig::builder_with_provider(Arc::clone(&self.crypto))
            .with_safe_default_protocol_versions()
            .map_err(|e| CredentialError::Tls(e.to_string()))?
            .with_root_certificates(roots)
            .with_client_auth_cert(certs, key)
            .map_err(|e| CredentialError::Tls(e.to_string()))
    }

    fn server(&self, service: &str, stem: &str) -> Result<ServerConfig, CredentialError> {
        let roots = self.roots(service)?;
        let (certs, key) = self.identity(service, stem)?;

        let verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&self.crypto))
                .build()
                .map_err(|e| CredentialError::Tls(e.to_string()))?;

        ServerConfig::builder_with_provider(Arc::clone(&self.crypto))
            .with_safe_default_protocol_versions()
            .map_err(|e| CredentialError::Tls(e.to_string()))?
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)
            .map_err(|e| CredentialError::Tls(e.to_string()))
    }
}

impl CredentialProvider for PemCredentialProvider {
    fn tls_config(
        &self,
        service: &str,
        role: TlsRole,
        extra: Option<&str>,
    ) -> Result<TlsConfig, CredentialError> {
        let role_name = role.to_string();
        let stem = extra.filter(|e| !e.is_empty()).unwrap_or(&role_name);
        tracing::debug!(service, %role, stem, "Loading TLS credentials");

        match role {
            TlsRole::Client => Ok(TlsConfig::Client(Arc::new(self.client(service, stem)?))),
            TlsRole::Server => Ok(TlsConfig::Server(Arc::new(self.server(service, stem)?))),
        }
    }
}

fn open(path: &Path) -> Result<BufReader<File>, CredentialError> {
    if !path.exists() {
        return Err(CredentialError::NotFound(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|source| CredentialError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, CredentialError> {
    let mut reader = open(path)?;
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| CredentialError::Read {
            path: path.to_path_buf(),
            source,
        })
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, CredentialError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| CredentialError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| CredentialError::NoKey(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_ca_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let provider = PemCredentialProvider::new(dir.path());

        match provider.client_config("workflow") {
            Err(CredentialError::NotFound(path)) => {
                assert!(path.ends_with("workflow/ca.pem"));
            }
            Err(other) => panic!("Expected NotFound, got {:?}", other),
            Ok(_) => panic!("Expected NotFound, got a config"),
        }
    }

    #[test]
    fn test_pem_without_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client-key.pem");
        std::fs::write(&path, "not a pem file\n").unwrap();

        assert!(matches!(load_key(&path), Err(CredentialError::NoKey(_))));
    }

    #[test]
    fn test_empty_ca_file_yields_no_certs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ca.pem");
        std::fs::write(&path, "").unwrap();

        assert!(load_certs(&path).unwrap().is_empty());
    }
}
