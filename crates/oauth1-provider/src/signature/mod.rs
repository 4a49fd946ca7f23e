//! Pluggable signature methods.
//!
//! A [`SignatureMethod`] computes and checks an OAuth signature over a base
//! string given the consumer and token secrets. HMAC-SHA1 is the
//! standards-compliant method; MD5 is a legacy extension kept only for
//! backward compatibility with deployed consumers.

mod hmac_sha1;
mod md5;

pub use hmac_sha1::HmacSha1;
pub use md5::Md5;

use subtle::ConstantTimeEq;

use crate::codec;
use crate::error::{OAuthError, OAuthResult};

/// A signature algorithm over the OAuth signature base string.
pub trait SignatureMethod: Send + Sync + std::fmt::Debug {
    /// Wire name of the method (`oauth_signature_method` value).
    fn name(&self) -> &'static str;

    /// Compute the signature for a base string. The result is
    /// RFC3986-encoded, as it appears on the wire.
    fn sign(&self, base: &str, consumer_secret: &str, token_secret: &str) -> String;

    /// Check a presented signature (still URL encoded) against the one
    /// computed for the base string. Comparison is constant-time.
    fn verify(
        &self,
        base: &str,
        consumer_secret: &str,
        token_secret: &str,
        signature: &str,
    ) -> bool {
        let presented = codec::decode(signature);
        let computed = codec::decode(&self.sign(base, consumer_secret, token_secret));
        constant_time_eq(presented.as_bytes(), computed.as_bytes())
    }
}

/// Resolve a signature method by its wire name (case-insensitive).
/// `HMACSHA1` is accepted as an alias some consumers send.
///
/// # Errors
///
/// Fails with [`OAuthError::SignatureMethodRejected`] for unknown names.
pub fn for_method(method: &str) -> OAuthResult<&'static dyn SignatureMethod> {
    static HMAC_SHA1: HmacSha1 = HmacSha1;
    static MD5: Md5 = Md5;

    match method.to_uppercase().as_str() {
        "HMAC-SHA1" | "HMACSHA1" => Ok(&HMAC_SHA1),
        "MD5" => {
            tracing::warn!("MD5 signature method is legacy and insecure; prefer HMAC-SHA1");
            Ok(&MD5)
        }
        _ => Err(OAuthError::SignatureMethodRejected { value: method.to_string() }),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.ct_eq(b).into()
}
