//! TLS trust configuration for the HTTP transport
//!
//! PEM material is read and parsed while the configuration is built, so a
//! bad path or a broken certificate is reported before any request is made.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use reqwest::{Certificate, Identity};
use thiserror::Error;

/// Errors loading TLS material
#[derive(Debug, Error)]
pub enum TlsError {
    /// A PEM file could not be read
    #[error("Unable to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The CA bundle could not be parsed
    #[error("Invalid CA bundle {path}: {source}")]
    CaBundle {
        path: PathBuf,
        #[source]
        source: reqwest::Error,
    },

    /// The CA bundle parsed, but contained no certificates
    #[error("No certificates found in CA bundle {0}")]
    EmptyCaBundle(PathBuf),

    /// The client certificate and key do not form an identity
    #[error("Invalid client certificate {cert} / key {key}: {source}")]
    Identity {
        cert: PathBuf,
        key: PathBuf,
        #[source]
        source: reqwest::Error,
    },
}

/// Trust settings applied once to the HTTP client
#[derive(Clone, Default)]
pub struct TlsPolicy {
    /// Skip server certificate verification
    pub insecure: bool,
    /// When set, these replace the built-in root certificates
    pub ca_certs: Option<Vec<Certificate>>,
    /// Client certificate presented to the server
    pub identity: Option<Identity>,
}

impl fmt::Debug for TlsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsPolicy")
            .field("insecure", &self.insecure)
            .field("ca_certs", &self.ca_certs.as_ref().map(Vec::len))
            .field("identity", &self.identity.is_some())
            .finish()
    }
}

impl TlsPolicy {
    /// Loads the policy from optional PEM paths.
    ///
    /// When only a certificate is given, the key is expected in the same
    /// file. A key without a certificate is ignored.
    pub fn load(
        insecure: bool,
        ca_bundle: Option<&Path>,
        cert: Option<&Path>,
        key: Option<&Path>,
    ) -> Result<Self, TlsError> {
        let ca_certs = ca_bundle.map(load_ca_bundle).transpose()?;
        let identity = cert
            .map(|cert| load_identity(cert, key.unwrap_or(cert)))
            .transpose()?;

        Ok(Self {
            insecure,
            ca_certs,
            identity,
        })
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, TlsError> {
    fs::read(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn load_ca_bundle(path: &Path) -> Result<Vec<Certificate>, TlsError> {
    let pem = read_pem(path)?;
    let certs = Certificate::from_pem_bundle(&pem).map_err(|source| TlsError::CaBundle {
        path: path.to_path_buf(),
        source,
    })?;
    if certs.is_empty() {
        return Err(TlsError::EmptyCaBundle(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_identity(cert: &Path, key: &Path) -> Result<Identity, TlsError> {
    let mut pem = read_pem(key)?;
    if key != cert {
        pem.push(b'\n');
        pem.extend(read_pem(cert)?);
    }
    Identity::from_pem(&pem).map_err(|source| TlsError::Identity {
        cert: cert.to_path_buf(),
        key: key.to_path_buf(),
        source,
    })
}
