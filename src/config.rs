//! Caller-supplied connection configuration.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::transport::{LenientTlsProvider, TlsProvider};

/// Authentication codes, keyed by the roles §4.4 distinguishes. Which of
/// these are required is family-dependent and validated by the
/// authenticator, not here.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Numeric installer-or-user code (Solution: required; AMAX: required
    /// alongside `automation_code`; B/G: unused).
    pub installer_or_user_code: Option<String>,
    /// Alphanumeric automation-user pass (AMAX, B/G: required; Solution: unused).
    pub automation_code: Option<String>,
}

/// Everything `connect` needs: where to dial and how to authenticate.
pub struct PanelConfig {
    pub addr: SocketAddr,
    pub credentials: Credentials,
    pub tls_provider: Arc<dyn TlsProvider>,
}

impl PanelConfig {
    pub fn new(addr: SocketAddr, credentials: Credentials) -> Self {
        Self { addr, credentials, tls_provider: Arc::new(LenientTlsProvider::new()) }
    }

    pub fn with_tls_provider(mut self, provider: Arc<dyn TlsProvider>) -> Self {
        self.tls_provider = provider;
        self
    }
}
