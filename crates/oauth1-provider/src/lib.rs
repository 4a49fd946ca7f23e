//! OAuth 1.0a provider engine
//!
//! Server-side implementation of the OAuth 1.0a three-legged flow plus the
//! xAuth two-legged exchange: canonical request parsing, signature
//! verification with replay protection, and the full token lifecycle behind
//! pluggable storage traits.
//!
//! # Features
//!
//! - **Canonical parsing**: query, form body, and `Authorization` header
//!   merge into one signature base string
//! - **Signature methods**: HMAC-SHA1, plus a legacy MD5 method kept for
//!   backward compatibility
//! - **Replay protection**: timestamp window and atomic nonce
//!   check-and-insert
//! - **Problem reporting**: stable numeric codes and OAuth Problem Extension
//!   challenges
//!
//! # Example
//!
//! ```no_run
//! use oauth1_provider::{config::Config, provider::Provider, storage::memory::MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let provider = Provider::from_memory(Config::new("http://api.example.com/"), MemoryStore::new());
//!     oauth1_provider::http::serve(provider, 8000).await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod provider;
pub mod request;
pub mod signature;
pub mod storage;
pub mod verify;

pub use config::Config;
pub use error::{OAuthError, OAuthResult};
pub use provider::Provider;
pub use request::{RawRequest, SignedRequest};
pub use verify::{TokenType, VerifiedIdentity, Verifier};
