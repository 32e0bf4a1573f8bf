//! TLS configuration for the relay's HTTPS listener.
//!
//! Certificates and keys are loaded from PEM files named in the
//! [`RelayConfig`](crate::config::RelayConfig). rustls only ships TLS 1.2
//! and 1.3, which satisfies the relay's minimum-version floor without
//! further configuration.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::ValueEnum;
use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;

/// Errors raised while assembling the TLS configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A PEM file could not be read.
    #[error("could not read {path}: {source}")]
    Read {
        /// The offending path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A PEM file held no usable private key.
    #[error("no private key in {0}")]
    NoPrivateKey(PathBuf),
    /// A PEM file held a malformed certificate.
    #[error("bad certificate in {0}")]
    BadCertificate(PathBuf),
    /// An error bubbled up from rustls while assembling the config.
    #[error(transparent)]
    Rustls(#[from] rustls::Error),
    /// The client-certificate verifier could not be assembled, e.g. because
    /// verification is required but no client CAs are configured.
    #[error("could not build client verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),
}

/// How the relay treats client certificates during the TLS handshake.
///
/// rustls always verifies an offered certificate against the configured
/// client CAs, so the policies only choose whether a certificate is
/// mandatory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ClientAuthPolicy {
    /// No client certificate is requested.
    NoClientCert,
    /// A certificate is requested but the handshake proceeds without one.
    RequestClientCert,
    /// A certificate is required and verified against the client CAs.
    RequireAnyClientCert,
    /// An offered certificate is verified, but the handshake proceeds
    /// without one.
    VerifyClientCertIfGiven,
    /// A certificate is required and verified against the client CAs.
    RequireAndVerifyClientCert,
}

impl ClientAuthPolicy {
    fn requires_certificate(self) -> bool {
        matches!(
            self,
            ClientAuthPolicy::RequireAnyClientCert | ClientAuthPolicy::RequireAndVerifyClientCert
        )
    }
}

/// Builds a rustls server configuration from PEM material on disk.
pub fn server_config(
    cert: &Path,
    key: &Path,
    client_cas: &[PathBuf],
    policy: ClientAuthPolicy,
) -> Result<rustls::ServerConfig, Error> {
    let certs = load_certs(cert)?;
    let key = load_key(key)?;
    let builder = rustls::ServerConfig::builder();
    let builder = if policy == ClientAuthPolicy::NoClientCert {
        builder.with_no_client_auth()
    } else {
        let mut roots = RootCertStore::empty();
        for path in client_cas {
            for cert in load_certs(path)? {
                roots
                    .add(cert)
                    .map_err(|_| Error::BadCertificate(path.clone()))?;
            }
        }
        let verifier = WebPkiClientVerifier::builder(Arc::new(roots));
        let verifier = if policy.requires_certificate() {
            verifier
        } else {
            verifier.allow_unauthenticated()
        };
        builder.with_client_cert_verifier(verifier.build()?)
    };
    Ok(builder.with_single_cert(certs, key)?)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, Error> {
    let pem = read(path)?;
    rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| Error::BadCertificate(path.to_owned()))
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, Error> {
    let pem = read(path)?;
    rustls_pemfile::private_key(&mut pem.as_slice())
        .map_err(|_| Error::NoPrivateKey(path.to_owned()))?
        .ok_or_else(|| Error::NoPrivateKey(path.to_owned()))
}

fn read(path: &Path) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|source| Error::Read {
        path: path.to_owned(),
        source,
    })
}
