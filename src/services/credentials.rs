use async_trait::async_trait;

/// A currently valid bearer credential for the collector.
#[derive(Debug, Clone)]
pub struct Credential {
    pub token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// No valid credential can be produced right now. Upload attempts treat
    /// this as retryable-later, never as a hard failure.
    #[error("no valid credential available: {0}")]
    Unavailable(String),
}

/// Seam to the external authentication component.
///
/// The credential lifecycle (login, refresh tokens, expiry) lives elsewhere;
/// the queue only ever asks for "a currently valid credential or failure".
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current credential, refreshing behind the scenes if the provider
    /// chooses to. May block on I/O.
    async fn credential(&self) -> Result<Credential, CredentialError>;

    /// Force a refresh after the collector rejected the current credential.
    async fn refresh(&self) -> Result<Credential, CredentialError>;
}

/// Fixed-token provider for deployments using a long-lived API token
/// (the worker binary). Refreshing hands back the same token.
pub struct StaticTokenProvider {
    credential: Credential,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            credential: Credential { token: token.into() },
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenProvider {
    async fn credential(&self) -> Result<Credential, CredentialError> {
        Ok(self.credential.clone())
    }

    async fn refresh(&self) -> Result<Credential, CredentialError> {
        Ok(self.credential.clone())
    }
}
