//! OAuth problem taxonomy.
//!
//! Every protocol failure carries a stable numeric code and an
//! `oauth_problem` identifier so the HTTP layer can render an OAuth Problem
//! Extension challenge. Uses `thiserror` for structured error handling.

use crate::codec;

/// A typed OAuth protocol fault.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OAuthError {
    /// A required OAuth parameter is absent.
    #[error("The parameter \"{name}\" is required.")]
    ParameterAbsent {
        /// Name of the missing parameter
        name: String,
    },

    /// The oauth_timestamp value is in the future, too old, or malformed.
    #[error("The timestamp \"{value}\" is one of the following: in the future, too old, or malformed.")]
    TimestampRefused {
        /// The refused timestamp
        value: String,
    },

    /// The oauth_nonce value was seen in a previous request.
    #[error("Provided nonce \"{value}\" has been seen before.")]
    NonceUsed {
        /// The replayed nonce
        value: String,
    },

    /// The oauth_signature_method value is not supported.
    #[error("Invalid signature method \"{value}\", currently supports \"HMAC-SHA1\".")]
    SignatureMethodRejected {
        /// The rejected method name
        value: String,
    },

    /// The oauth_signature value does not match.
    #[error("Invalid signature \"{value}\", provided signature base \"{base}\".")]
    SignatureInvalid {
        /// The presented signature, still URL encoded
        value: String,
        /// The signature base string it was checked against
        base: String,
    },

    /// The oauth_consumer_key value is unknown or disabled.
    #[error("Invalid consumer key or consumer key not found \"{value}\".")]
    ConsumerKeyRejected {
        /// The rejected consumer key
        value: String,
    },

    /// The oauth_token value has expired.
    #[error("Expired user token \"{value}\".")]
    TokenExpired {
        /// The expired token
        value: String,
    },

    /// The oauth_token value is unknown, expired, or failed lookup.
    #[error("Invalid user token \"{value}\".")]
    TokenRejected {
        /// The rejected token
        value: String,
    },

    /// The oauth_version value is not 1.0 or 1.0a.
    #[error("The version \"{value}\" is not supported. Use \"1.0\" or \"1.0a\" for the oauth_version parameter.")]
    VersionRejected {
        /// The rejected version string
        value: String,
    },

    /// The consumer key/token passed was not valid or the token was never authorized.
    #[error("The consumer key/token passed was not valid or has expired.")]
    NotAuthorized,

    /// The caller's IP address is not allowed.
    #[error("The IP address \"{value}\" is not allowed.")]
    IpRejected {
        /// The rejected address
        value: String,
    },

    /// The service is not available.
    #[error("The service is temporarily unavailable.")]
    ServiceUnavailable,

    /// A URL (request URI or redirect callback) is malformed or uses a
    /// forbidden scheme.
    #[error("Illegal URL \"{url}\".")]
    BadUrl {
        /// The offending URL
        url: String,
    },

    /// xAuth credentials did not resolve to a user.
    #[error("The user credentials passed for username \"{username}\" are not valid.")]
    InvalidCredentials {
        /// The username that failed resolution
        username: String,
    },
}

impl OAuthError {
    /// Missing-parameter fault for the named parameter.
    #[must_use]
    pub fn parameter_absent(name: impl Into<String>) -> Self {
        Self::ParameterAbsent { name: name.into() }
    }

    /// Token-rejected fault for the given token value.
    #[must_use]
    pub fn token_rejected(value: impl Into<String>) -> Self {
        Self::TokenRejected { value: value.into() }
    }

    /// The stable numeric code carried by every fault.
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::ParameterAbsent { .. } => 90,
            Self::TimestampRefused { .. } => 91,
            Self::NonceUsed { .. } => 92,
            Self::SignatureMethodRejected { .. } => 93,
            Self::SignatureInvalid { .. } => 94,
            Self::ConsumerKeyRejected { .. } => 95,
            Self::TokenExpired { .. } => 96,
            Self::TokenRejected { .. } => 97,
            Self::VersionRejected { .. } => 98,
            Self::NotAuthorized => 99,
            Self::IpRejected { .. } => 100,
            Self::ServiceUnavailable => 101,
            Self::BadUrl { .. } => 102,
            Self::InvalidCredentials { .. } => 103,
        }
    }

    /// The `oauth_problem` identifier string for this fault.
    ///
    /// `IpRejected` intentionally reports `service_unavailable`, matching the
    /// identifiers existing consumers already handle.
    #[must_use]
    pub const fn problem(&self) -> &'static str {
        match self {
            Self::ParameterAbsent { .. } => "parameter_absent",
            Self::TimestampRefused { .. } => "timestamp_refused",
            Self::NonceUsed { .. } => "nonce_used",
            Self::SignatureMethodRejected { .. } => "signature_method_rejected",
            Self::SignatureInvalid { .. } => "signature_invalid",
            Self::ConsumerKeyRejected { .. } => "consumer_key_rejected",
            Self::TokenExpired { .. } => "token_expired",
            Self::TokenRejected { .. } => "token_rejected",
            Self::VersionRejected { .. } => "version_rejected",
            Self::NotAuthorized => "not_authorized",
            Self::IpRejected { .. } | Self::ServiceUnavailable => "service_unavailable",
            Self::BadUrl { .. } => "bad_url",
            Self::InvalidCredentials { .. } => "invalid_credentials",
        }
    }

    /// HTTP status code the endpoint glue should respond with.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::ParameterAbsent { .. }
            | Self::TimestampRefused { .. }
            | Self::VersionRejected { .. }
            | Self::SignatureMethodRejected { .. }
            | Self::BadUrl { .. } => 400,
            Self::NonceUsed { .. }
            | Self::SignatureInvalid { .. }
            | Self::ConsumerKeyRejected { .. }
            | Self::TokenExpired { .. }
            | Self::TokenRejected { .. }
            | Self::NotAuthorized
            | Self::InvalidCredentials { .. } => 401,
            Self::IpRejected { .. } => 403,
            Self::ServiceUnavailable => 503,
        }
    }

    /// Render the OAuth Problem Extension challenge for a `WWW-Authenticate`
    /// header: `OAuth realm="<realm>", oauth_problem="<p>",
    /// oauth_problem_advice="<advice>"`.
    #[must_use]
    pub fn challenge(&self, realm: &str) -> String {
        let mut challenge = format!("OAuth realm=\"{realm}\"");
        challenge.push_str(&format!(", oauth_problem=\"{}\"", codec::encode(self.problem())));
        let advice = self.to_string();
        if !advice.is_empty() {
            challenge.push_str(&format!(", oauth_problem_advice=\"{}\"", codec::encode(&advice)));
        }
        challenge
    }
}

/// Result type alias for protocol operations.
pub type OAuthResult<T> = Result<T, OAuthError>;
