//! Login strategies for offline and online servers.
//!
//! Both strategies produce the LoginStart packet; online mode additionally
//! consults an external token provider. Token acquisition itself (browser
//! flows, launcher caches) lives outside this crate.

use crate::error::ConnectError;
use crate::packet::Serverbound;
use async_trait::async_trait;

/// Identity the server confirmed at login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Server-assigned session identity.
    pub session_id: u64,
    /// Canonical username the server registered.
    pub username: String,
}

/// A source of session tokens for online-mode servers.
///
/// Implemented by the embedding application; the agent never performs the
/// credential exchange itself.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Produce a session token for the given username.
    async fn session_token(&self, username: &str) -> anyhow::Result<String>;
}

/// A login strategy: offline (client-chosen identity) or online (delegated
/// credential exchange).
#[async_trait]
pub trait AuthScheme: Send + Sync {
    /// Username this scheme will announce.
    fn username(&self) -> &str;

    /// Build the LoginStart packet, acquiring external credentials if the
    /// scheme requires them.
    async fn login_request(&self) -> Result<Serverbound, ConnectError>;
}

/// Derive a stable client identity from a username.
///
/// Offline servers have no authority to assign identities, so the client
/// derives one deterministically: the same name always yields the same id.
pub fn derive_client_id(username: &str) -> u64 {
    let hash = blake3::hash(username.as_bytes());
    u64::from_le_bytes(hash.as_bytes()[0..8].try_into().expect("8-byte prefix"))
}

/// Offline-mode login: no credentials, identity chosen by the client.
#[derive(Debug, Clone)]
pub struct OfflineAuth {
    username: String,
}

impl OfflineAuth {
    /// Create an offline strategy for the given username.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

#[async_trait]
impl AuthScheme for OfflineAuth {
    fn username(&self) -> &str {
        &self.username
    }

    async fn login_request(&self) -> Result<Serverbound, ConnectError> {
        Ok(Serverbound::LoginStart {
            username: self.username.clone(),
            client_id: derive_client_id(&self.username),
            token: None,
        })
    }
}

/// Online-mode login: forwards a token acquired from the provider.
pub struct OnlineAuth<P> {
    username: String,
    provider: P,
}

impl<P: TokenProvider> OnlineAuth<P> {
    /// Create an online strategy backed by the given token provider.
    pub fn new(username: impl Into<String>, provider: P) -> Self {
        Self {
            username: username.into(),
            provider,
        }
    }
}

#[async_trait]
impl<P: TokenProvider> AuthScheme for OnlineAuth<P> {
    fn username(&self) -> &str {
        &self.username
    }

    async fn login_request(&self) -> Result<Serverbound, ConnectError> {
        let token = self
            .provider
            .session_token(&self.username)
            .await
            .map_err(|err| ConnectError::TokenAcquisition {
                reason: err.to_string(),
            })?;
        Ok(Serverbound::LoginStart {
            username: self.username.clone(),
            client_id: derive_client_id(&self.username),
            token: Some(token),
        })
    }
}
