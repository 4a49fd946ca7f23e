//! HMAC-SHA1 signature method (RFC 5849 §3.4.2).

use base64::{engine::general_purpose::STANDARD as BASE64_ENGINE, Engine};
use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::SignatureMethod;
use crate::codec;

type HmacSha1Mac = Hmac<Sha1>;

/// The standards-compliant OAuth 1.0a signature method. The signing key is
/// `encode(consumer_secret) & encode(token_secret)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacSha1;

impl SignatureMethod for HmacSha1 {
    fn name(&self) -> &'static str {
        "HMAC-SHA1"
    }

    fn sign(&self, base: &str, consumer_secret: &str, token_secret: &str) -> String {
        let key = format!("{}&{}", codec::encode(consumer_secret), codec::encode(token_secret));

        // HMAC accepts keys of any length
        let mut mac = HmacSha1Mac::new_from_slice(key.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC key length is unrestricted"));
        mac.update(base.as_bytes());
        let digest = mac.finalize().into_bytes();

        codec::encode(&BASE64_ENGINE.encode(digest))
    }
}
