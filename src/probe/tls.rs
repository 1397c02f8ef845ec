//! TCP+TLS handshake probe.
//!
//! Certificates are not validated: the probe measures whether a handshake
//! completes, not whether the peer is trusted.

use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio_rustls::TlsConnector;

use super::tcp::connect;
use super::ProbeError;
use crate::target::Target;

/// Run a TLS probe against the given target.
///
/// Returns the time from the start of the TCP attempt to handshake completion.
pub async fn run_tls_probe(target: &Target) -> Result<Duration, ProbeError> {
    let server_name = ServerName::try_from(target.host.clone())
        .map_err(|e| ProbeError::Config(format!("invalid server name {}: {}", target.host, e)))?;
    let connector = TlsConnector::from(insecure_client_config()?);

    let (stream, started) = connect(target).await?;
    let tls_stream = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| ProbeError::Tls(e.to_string()))?;

    let elapsed = started.elapsed();
    drop(tls_stream);
    Ok(elapsed)
}

fn insecure_client_config() -> Result<Arc<ClientConfig>, ProbeError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| ProbeError::Config(format!("TLS setup failed: {}", e)))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider }))
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Accepts any server certificate but still checks handshake signatures, so a
/// completed handshake means the peer really speaks TLS.
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
