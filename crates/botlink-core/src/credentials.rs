//! Credential suppliers for the backend link.
//!
//! The link never knows where a secret came from; it only asks a
//! [`Credentials`] implementation for what to put on the upgrade request and
//! what (if anything) to announce after connecting.

use std::sync::Arc;

use crate::{
    config::{AuthMode, Config},
    envelope::MessageKind,
    errors::Error,
    Result,
};

/// Header the backend reads the API key from on the websocket upgrade.
pub const API_KEY_HEADER: &str = "X-API-Key";

pub trait Credentials: Send + Sync {
    /// Shared secret used to sign and verify every frame.
    fn signing_secret(&self) -> &[u8];

    /// Extra headers for the websocket upgrade request.
    fn connect_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// First frame to send after the transport is up, if this strategy
    /// authenticates in-band.
    fn auth_announcement(&self) -> Option<MessageKind> {
        None
    }
}

/// In-band variant: authenticates by sending a signed `auth` frame; a valid
/// signature is the proof of possession.
pub struct SignedSecret {
    secret: Vec<u8>,
}

impl SignedSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl Credentials for SignedSecret {
    fn signing_secret(&self) -> &[u8] {
        &self.secret
    }

    fn auth_announcement(&self) -> Option<MessageKind> {
        Some(MessageKind::Auth)
    }
}

/// Out-of-band variant: the API key rides on the upgrade request; frames are
/// still signed with the shared secret.
pub struct ApiKeyHeader {
    api_key: String,
    secret: Vec<u8>,
}

impl ApiKeyHeader {
    pub fn new(api_key: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
        }
    }
}

impl Credentials for ApiKeyHeader {
    fn signing_secret(&self) -> &[u8] {
        &self.secret
    }

    fn connect_headers(&self) -> Vec<(String, String)> {
        vec![(API_KEY_HEADER.to_string(), self.api_key.clone())]
    }
}

/// Build the credential supplier the configuration asks for.
pub fn from_config(cfg: &Config) -> Result<Arc<dyn Credentials>> {
    match cfg.auth_mode {
        AuthMode::Signed => Ok(Arc::new(SignedSecret::new(cfg.secret.as_bytes()))),
        AuthMode::ApiKey => {
            let api_key = cfg.api_key.clone().ok_or_else(|| {
                Error::Config("AUTH_MODE=api-key requires an API_KEY".to_string())
            })?;
            Ok(Arc::new(ApiKeyHeader::new(api_key, cfg.secret.as_bytes())))
        }
    }
}
