//! TLS transport policy (§6): tolerate exactly the self-signed/unknown-issuer
//! certificate class the original client waives wholesale, and treat every
//! other certificate failure as fatal.
//!
//! **Resolved TLS policy (SPEC_FULL §6, a deliberate REDESIGN):** the
//! original (`Weechat::onSslErrors`) calls `ignoreSslErrors` on *every*
//! reported error, accepting expired, hostname-mismatched, or revoked
//! certificates alike. relaycore narrows this to the one named class
//! spec.md §6 explicitly calls out
//! (`UnableToGetLocalIssuerCertificate` / rustls's `UnknownIssuer`) by
//! wrapping the platform verifier and only downgrading that specific
//! failure.

#![cfg(feature = "tls")]

use std::fmt;
use std::sync::Arc;

use tokio_rustls::rustls;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::client::WebPkiServerVerifier;
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{CertificateError, ClientConfig, DigitallySignedStruct, Error as TlsError, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;

/// A [`ServerCertVerifier`] that delegates to the platform/webpki-roots
/// verifier and downgrades exactly one failure class — an unknown
/// certificate issuer, i.e. a self-signed certificate — to a warning.
pub struct TolerantVerifier {
    inner: Arc<WebPkiServerVerifier>,
}

impl fmt::Debug for TolerantVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TolerantVerifier").finish_non_exhaustive()
    }
}

impl TolerantVerifier {
    /// Build a verifier rooted at the platform's webpki trust anchors.
    pub fn new() -> Result<Self, TlsError> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let inner = WebPkiServerVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| TlsError::General(e.to_string()))?;
        Ok(Self { inner })
    }
}

impl ServerCertVerifier for TolerantVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        match self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
        {
            Ok(verified) => Ok(verified),
            Err(TlsError::InvalidCertificate(detail))
                if matches!(detail, CertificateError::UnknownIssuer) =>
            {
                tracing::warn!(
                    server_name = ?server_name,
                    "tolerating self-signed certificate (unknown issuer)"
                );
                Ok(ServerCertVerified::assertion())
            }
            Err(e) => Err(e),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Build a [`TlsConnector`] configured with [`TolerantVerifier`] and no
/// client authentication.
pub fn connector() -> Result<TlsConnector, TlsError> {
    let verifier = TolerantVerifier::new()?;
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TlsError::General(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}
