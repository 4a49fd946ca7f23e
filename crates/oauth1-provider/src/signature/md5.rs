//! Legacy MD5 signature method.
//!
//! Non-standard, kept for backward compatibility with consumers deployed
//! against it. The digest covers only the base string: the consumer and
//! token secrets are NOT mixed into the computation, so this method provides
//! integrity but no authentication. Do not enable for new consumers.

use base64::{engine::general_purpose::STANDARD as BASE64_ENGINE, Engine};
use md5::{Digest, Md5 as Md5Hasher};

use super::SignatureMethod;
use crate::codec;

/// Legacy MD5 method: `base64(md5(base))`, RFC3986-encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5;

impl SignatureMethod for Md5 {
    fn name(&self) -> &'static str {
        "MD5"
    }

    fn sign(&self, base: &str, _consumer_secret: &str, _token_secret: &str) -> String {
        let digest = Md5Hasher::digest(base.as_bytes());
        codec::encode(&BASE64_ENGINE.encode(digest))
    }
}
