//! Crate prelude.

use hmac::Hmac;
pub use hmac::Mac;
use sha2::Sha512;

pub use crate::error::ApiError;
pub use crate::message::Side;

/// Hashing type for call signatures.
pub type HmacSha512 = Hmac<Sha512>;
