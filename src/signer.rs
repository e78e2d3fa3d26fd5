//! Builder and multiplexer for authenticated calls.
//!
//! Calls are correlated purely by a caller-chosen `reqid`; no FIFO across
//! the transport is assumed. The signer keeps every in-flight call until
//! the matching `result` frame arrives, so a `remark` reporting a silent
//! server-side drop can be answered by resending the identical call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::prelude::{HmacSha512, Mac};
use crate::utils::epoch_us;
use crate::utils::secret::Secret;

/// Request ids issued by the subscription hook. Only these are resent
/// after a silent failure; the server quirk has never been observed on
/// other calls.
const BOOTSTRAP_IDS: &[&str] = &["idkey", "info", "orders"];

/// One authenticated call waiting for its `result` frame.
#[derive(Debug, Clone)]
pub struct PendingCall {
    /// API endpoint, e.g. `private/info`.
    pub endpoint: String,
    /// Call parameters.
    pub params: Value,
    /// Whether the call has already been resent once after a remark.
    pub resent: bool,
}

/// Builds signed calls and correlates their responses.
#[derive(Debug)]
pub struct Signer {
    currency: String,
    secret: Option<Secret>,
    last_nonce: AtomicU64,
    pending: Mutex<HashMap<String, PendingCall>>,
}

impl Signer {
    /// A signer for one quote currency. Without a secret every signing
    /// attempt fails and the callers degrade to read-only behavior.
    #[must_use]
    pub fn new(currency: impl Into<String>, secret: Option<Secret>) -> Self {
        Self {
            currency: currency.into(),
            secret,
            last_nonce: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Whether authenticated calls are possible.
    #[must_use]
    pub fn know_secret(&self) -> bool {
        self.secret.is_some()
    }

    /// Next nonce: microseconds since the epoch, bumped past the previous
    /// nonce when two calls land in the same microsecond. The exchange
    /// requires nonces to be strictly increasing.
    pub fn next_nonce(&self) -> u64 {
        let now = epoch_us();
        let previous = self
            .last_nonce
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(last.max(now.saturating_sub(1)) + 1)
            })
            .unwrap_or(0);

        previous.max(now.saturating_sub(1)) + 1
    }

    /// Build the outbound frame for a signed streaming call. The inner
    /// call object is serialized, HMAC-SHA-512 signed with the decoded
    /// secret, and wrapped as `key_bytes || hmac || json` in base64.
    ///
    /// # Errors
    ///
    /// Will return [`ApiError::InvalidCredential`] if no secret is loaded.
    pub fn stream_call(
        &self,
        api_endpoint: &str,
        params: &Value,
        reqid: &str,
    ) -> Result<String, ApiError> {
        let secret = self
            .secret
            .as_ref()
            .ok_or_else(|| ApiError::InvalidCredential("no secret loaded".to_owned()))?;

        let call = json!({
            "id": reqid,
            "call": api_endpoint,
            "nonce": self.next_nonce(),
            "params": params,
            "currency": self.currency,
            "item": "BTC",
        })
        .to_string();

        let mut mac = HmacSha512::new_from_slice(secret.secret_bytes())
            .map_err(|err| ApiError::InvalidCredential(err.to_string()))?;
        mac.update(call.as_bytes());
        let sign = mac.finalize().into_bytes();

        let mut signed_call = Vec::with_capacity(secret.key_bytes().len() + sign.len() + call.len());
        signed_call.extend_from_slice(secret.key_bytes());
        signed_call.extend_from_slice(&sign);
        signed_call.extend_from_slice(call.as_bytes());

        Ok(json!({
            "op": "call",
            "call": BASE64.encode(signed_call),
            "id": reqid,
            "context": "mtgox.com",
        })
        .to_string())
    }

    /// Sign the body of an HTTP call. Returns the `Rest-Key` and
    /// `Rest-Sign` header values.
    ///
    /// # Errors
    ///
    /// Will return [`ApiError::InvalidCredential`] if no secret is loaded.
    pub fn sign_request(&self, body: &str) -> Result<(String, String), ApiError> {
        let secret = self
            .secret
            .as_ref()
            .ok_or_else(|| ApiError::InvalidCredential("no secret loaded".to_owned()))?;

        let mut mac = HmacSha512::new_from_slice(secret.secret_bytes())
            .map_err(|err| ApiError::InvalidCredential(err.to_string()))?;
        mac.update(body.as_bytes());
        let sign = mac.finalize().into_bytes();

        Ok((secret.key().to_owned(), BASE64.encode(sign)))
    }

    /// Record an in-flight call under its reqid. Reusing a reqid replaces
    /// the earlier entry; the later response then supersedes it.
    pub fn register(&self, reqid: &str, api_endpoint: &str, params: Value) {
        self.pending.lock().insert(
            reqid.to_owned(),
            PendingCall {
                endpoint: api_endpoint.to_owned(),
                params,
                resent: false,
            },
        );
    }

    /// A `result` frame arrived for the reqid; forget the pending call.
    pub fn complete(&self, reqid: &str) -> Option<PendingCall> {
        self.pending.lock().remove(reqid)
    }

    /// A `remark` with `success == false` arrived for the reqid. Returns
    /// the call to resend if it is a still-pending bootstrap call that has
    /// not been resent yet.
    pub fn take_retry(&self, reqid: &str) -> Option<(String, Value)> {
        if !BOOTSTRAP_IDS.contains(&reqid) {
            return None;
        }

        let mut pending = self.pending.lock();
        let call = pending.get_mut(reqid)?;
        if call.resent {
            return None;
        }
        call.resent = true;

        Some((call.endpoint.clone(), call.params.clone()))
    }
}
