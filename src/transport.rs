//! Connection establishment: a pluggable TLS provider over plain TCP (§6
//! "External Interfaces — Transport").
//!
//! The core only ever deals with an already-encrypted byte stream; how that
//! stream gets encrypted is a collaborator, not core logic. We model that
//! collaborator as a trait so tests can swap in a bare TCP stream instead of
//! standing up a TLS server.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::error::{Error, Result};

/// A duplex byte stream the codec can be framed over.
pub trait PanelStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> PanelStream for T {}

pub type BoxedStream = Box<dyn PanelStream>;

/// Establishes the byte stream a panel session frames its protocol over.
///
/// Implementations own whatever TLS policy they choose; the core never
/// inspects certificates itself (§6: "the core assumes an already-encrypted
/// byte stream from a configurable TLS provider").
#[async_trait]
pub trait TlsProvider: Send + Sync {
    async fn connect(&self, addr: SocketAddr) -> Result<BoxedStream>;
}

/// Default provider: TLS over TCP with the lenient policy §6 mandates —
/// no hostname check, no certificate-chain verification. Panels ship with
/// self-signed certificates and no stable SAN, so this is not a relaxed
/// option but the only one that works out of the box; callers who can
/// provision real CAs may supply their own `TlsProvider`.
pub struct LenientTlsProvider {
    connector: tokio_rustls::TlsConnector,
}

impl LenientTlsProvider {
    pub fn new() -> Self {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = rustls::ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .expect("ring provider supports the default protocol versions")
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
            .with_no_client_auth();
        config.enable_sni = false;
        Self { connector: tokio_rustls::TlsConnector::from(Arc::new(config)) }
    }
}

impl Default for LenientTlsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TlsProvider for LenientTlsProvider {
    async fn connect(&self, addr: SocketAddr) -> Result<BoxedStream> {
        let tcp = TcpStream::connect(addr).await?;
        tcp.set_nodelay(true).ok();
        // The server name is unchecked by our verifier; any valid DNS name
        // satisfies rustls-pki-types's constructor.
        let name = rustls_pki_types::ServerName::try_from("panel.local")
            .map_err(|e| Error::transport(e))?
            .to_owned();
        let stream = self.connector.connect(name, tcp).await?;
        Ok(Box::new(stream))
    }
}

/// Plain TCP, no TLS at all. Used by integration tests driving a mock panel
/// over loopback where standing up a TLS listener would add nothing.
#[derive(Debug, Default)]
pub struct TcpOnlyProvider;

#[async_trait]
impl TlsProvider for TcpOnlyProvider {
    async fn connect(&self, addr: SocketAddr) -> Result<BoxedStream> {
        let tcp = TcpStream::connect(addr).await?;
        tcp.set_nodelay(true).ok();
        Ok(Box::new(tcp))
    }
}

#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<rustls::crypto::CryptoProvider>,
}

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls_pki_types::CertificateDer<'_>,
        _intermediates: &[rustls_pki_types::CertificateDer<'_>],
        _server_name: &rustls_pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls_pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls_pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
