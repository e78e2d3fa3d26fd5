//! In-memory holder for the MtGox API credential pair.
//!
//! Decryption of the pair at rest happens outside this crate; the engine is
//! handed the already-decrypted strings and merely validates and decodes
//! them. Without a valid pair the engine keeps running in read-only mode.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::ApiError;
use crate::utils::config::Config;

/// A validated API key + secret. The key is a dashed hex UUID that decodes
/// to 16 bytes, the secret a base64 string that decodes to 64 bytes; both
/// decoded forms are kept so the signer never re-parses them.
#[derive(Clone)]
pub struct Secret {
    key: String,
    key_bytes: Vec<u8>,
    secret_bytes: Vec<u8>,
}

impl Secret {
    /// Validate and decode a credential pair.
    ///
    /// # Errors
    ///
    /// Will return [`ApiError::InvalidCredential`] if the key is not 16
    /// bytes of hex (dashes ignored) or the secret is not 64 bytes of
    /// base64.
    pub fn new(key: impl Into<String>, secret: &str) -> Result<Self, ApiError> {
        let key = key.into();
        let key_bytes = hex::decode(key.replace('-', ""))
            .map_err(|err| ApiError::InvalidCredential(format!("key is not hex: {err}")))?;
        if key_bytes.len() != 16 {
            return Err(ApiError::InvalidCredential("key has wrong size".to_owned()));
        }

        let secret_bytes = BASE64
            .decode(secret.trim())
            .map_err(|err| ApiError::InvalidCredential(format!("secret is not base64: {err}")))?;
        if secret_bytes.len() != 64 {
            return Err(ApiError::InvalidCredential(
                "secret has wrong size".to_owned(),
            ));
        }

        Ok(Self {
            key,
            key_bytes,
            secret_bytes,
        })
    }

    /// Read the credential pair from `gox.secret_key` / `gox.secret_secret`.
    /// An empty pair means read-only mode; an invalid pair degrades to the
    /// same with a warning.
    #[must_use]
    pub fn from_config(config: &Config) -> Option<Self> {
        let key = config.get_string("gox", "secret_key");
        let secret = config.get_string("gox", "secret_secret");
        if key.is_empty() || secret.is_empty() {
            return None;
        }

        match Self::new(key, &secret) {
            Ok(secret) => Some(secret),
            Err(err) => {
                log::warn!("{err}, trading disabled");
                None
            }
        }
    }

    /// The API key as it appears in the `Rest-Key` header.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The 16 decoded key bytes that prefix a streaming call payload.
    #[must_use]
    pub fn key_bytes(&self) -> &[u8] {
        &self.key_bytes
    }

    /// The 64 decoded secret bytes used as the HMAC key.
    #[must_use]
    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret_bytes
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret").field("key", &self.key).finish()
    }
}
