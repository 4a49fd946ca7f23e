//! Canonical parsing of a signed OAuth request.
//!
//! An inbound HTTP request is described by an explicit [`RawRequest`] (the
//! transport layer reads the body exactly once and hands it over; the parser
//! never touches a stream). [`SignedRequest::parse`] merges parameters from
//! the query string, a form-encoded or multipart body, and the `Authorization`
//! header into one RFC3986-encoded multimap, so the same logical request
//! produces the same signature base string no matter how its parameters
//! arrived.

use std::collections::BTreeMap;

use url::Url;

use crate::codec;
use crate::error::{OAuthError, OAuthResult};

/// `oauth_consumer_key`
pub const OAUTH_CONSUMER_KEY: &str = "oauth_consumer_key";
/// `oauth_token`
pub const OAUTH_TOKEN: &str = "oauth_token";
/// `oauth_token_secret`
pub const OAUTH_TOKEN_SECRET: &str = "oauth_token_secret";
/// `oauth_signature_method`
pub const OAUTH_SIGNATURE_METHOD: &str = "oauth_signature_method";
/// `oauth_signature`
pub const OAUTH_SIGNATURE: &str = "oauth_signature";
/// `oauth_timestamp`
pub const OAUTH_TIMESTAMP: &str = "oauth_timestamp";
/// `oauth_nonce`
pub const OAUTH_NONCE: &str = "oauth_nonce";
/// `oauth_callback`
pub const OAUTH_CALLBACK: &str = "oauth_callback";
/// `oauth_callback_confirmed`
pub const OAUTH_CALLBACK_CONFIRMED: &str = "oauth_callback_confirmed";
/// `oauth_verifier`
pub const OAUTH_VERIFIER: &str = "oauth_verifier";
/// `oauth_version`
pub const OAUTH_VERSION: &str = "oauth_version";
/// Non-standard TTL extension: `xoauth_token_ttl`
pub const XOAUTH_TOKEN_TTL: &str = "xoauth_token_ttl";
/// Non-standard body signature: `xoauth_body_signature`
pub const XOAUTH_BODY_SIGNATURE: &str = "xoauth_body_signature";
/// Non-standard body signature method: `xoauth_body_signature_method`
pub const XOAUTH_BODY_SIGNATURE_METHOD: &str = "xoauth_body_signature_method";
/// xAuth mode parameter: `x_auth_mode`
pub const X_AUTH_MODE: &str = "x_auth_mode";
/// xAuth username parameter: `x_auth_username`
pub const X_AUTH_USERNAME: &str = "x_auth_username";
/// xAuth password parameter: `x_auth_password`
pub const X_AUTH_PASSWORD: &str = "x_auth_password";

/// The "out of band" callback sentinel. Never redirected to; the verifier is
/// displayed to the user instead.
pub const OOB: &str = "oob";

/// Transport-agnostic description of an inbound HTTP request.
///
/// The body, if any, must already have been read; multipart bodies cannot be
/// re-derived as a canonical string, so their posted fields are carried
/// pre-parsed in `form_fields` (arrival order preserved).
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    /// HTTP method (any case).
    pub method: String,
    /// Absolute request URL.
    pub url: String,
    /// Request headers, as received.
    pub headers: Vec<(String, String)>,
    /// Raw body, read once by the transport.
    pub body: Option<String>,
    /// Pre-parsed multipart form fields in arrival order.
    pub form_fields: Vec<(String, String)>,
}

impl RawRequest {
    /// Describe a request by method and absolute URL.
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self { method: method.into(), url: url.into(), ..Self::default() }
    }

    /// Append a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach the raw body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Attach pre-parsed multipart form fields.
    #[must_use]
    pub fn form_fields(mut self, fields: Vec<(String, String)>) -> Self {
        self.form_fields = fields;
        self
    }
}

/// Multi-valued parameter map: name to ordered list of values, both stored
/// RFC3986-encoded. A single-valued parameter is a one-element list.
#[derive(Debug, Clone, Default)]
pub struct ParamMap {
    inner: BTreeMap<String, Vec<String>>,
}

impl ParamMap {
    /// Insert an already-encoded name/value pair; a repeated name appends to
    /// the value list.
    pub fn insert_encoded(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.entry(name.into()).or_default().push(value.into());
    }

    /// Insert a plain (unencoded) name/value pair.
    pub fn insert(&mut self, name: &str, value: &str) {
        self.insert_encoded(codec::encode(name), codec::encode(value));
    }

    /// First value for a name, as stored (encoded). Falls back to the encoded
    /// form of the name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .get(name)
            .or_else(|| self.inner.get(&codec::encode(name)))
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// All values for a name, as stored.
    #[must_use]
    pub fn get_all(&self, name: &str) -> &[String] {
        self.inner.get(name).map_or(&[], Vec::as_slice)
    }

    /// Whether the name is present at all.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name) || self.inner.contains_key(&codec::encode(name))
    }

    /// Parse an `a=b&a=c&d=e` string, merging with duplicate promotion.
    /// Pairs without `=` (or with an empty name) are skipped.
    pub fn parse_str(&mut self, input: &str) {
        for pair in input.split('&') {
            match pair.find('=') {
                Some(pos) if pos > 0 => {
                    self.insert_encoded(&pair[..pos], &pair[pos + 1..]);
                }
                _ => {}
            }
        }
    }

    /// Re-encode every name and value so all entries are canonically
    /// RFC3986-encoded exactly once, whatever their source encoding was.
    pub fn transcode_all(&mut self) {
        let mut canonical = BTreeMap::new();
        for (name, values) in std::mem::take(&mut self.inner) {
            let entry: &mut Vec<String> =
                canonical.entry(codec::transcode(&name)).or_default();
            entry.extend(values.iter().map(|v| codec::transcode(v)));
        }
        self.inner = canonical;
    }

    /// Iterate entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of distinct parameter names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Decomposed request URI.
#[derive(Debug, Clone)]
struct UriParts {
    scheme: String,
    user: String,
    pass: Option<String>,
    host: String,
    port: Option<u16>,
    path: String,
}

/// A parsed, canonicalized signed request.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    method: String,
    uri: UriParts,
    body: Option<String>,
    realm: Option<String>,
    params: ParamMap,
}

impl SignedRequest {
    /// Parse a raw request description into canonical form.
    ///
    /// # Errors
    ///
    /// Fails with [`OAuthError::BadUrl`] when the URL does not parse or uses
    /// a scheme other than http/https.
    pub fn parse(raw: &RawRequest) -> OAuthResult<Self> {
        Self::parse_with_params(raw, "")
    }

    /// Parse, merging an additional raw parameter string (e.g. POST
    /// parameters a framework already consumed).
    pub fn parse_with_params(raw: &RawRequest, extra_params: &str) -> OAuthResult<Self> {
        let method = raw.method.to_uppercase();
        let uri = parse_uri(&raw.url)?;

        let mut params = ParamMap::default();
        let mut extra = extra_params.to_string();
        let mut body = raw.body.clone();

        let content_type = header(&raw.headers, "content-type")
            .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase());

        if method == "POST" {
            match content_type.as_deref() {
                Some("application/x-www-form-urlencoded") => {
                    // Form body parameters are signable; the body itself is
                    // not kept for body-signature checks.
                    if let Some(form) = body.take() {
                        append_params(&mut extra, &form);
                    }
                }
                Some("multipart/form-data") => {
                    append_params(&mut extra, &multipart_param_string(&raw.form_fields));
                }
                _ => {}
            }
        }

        if let Some(query) = url_query(&raw.url) {
            params.parse_str(query);
        }
        if !extra.is_empty() {
            params.parse_str(&extra);
        }

        let realm = parse_authorization(&raw.headers, &mut params);

        // Guarantee canonical encoding after merging all sources.
        params.transcode_all();

        Ok(Self { method, uri, body, realm, params })
    }

    /// HTTP method, uppercased.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Raw body, when one was supplied and not consumed as form parameters.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Realm from the `Authorization` header, if any.
    #[must_use]
    pub fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }

    /// The merged parameter map (all entries RFC3986-encoded).
    #[must_use]
    pub const fn params(&self) -> &ParamMap {
        &self.params
    }

    /// First value of a parameter, as stored (encoded).
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// First value of a parameter, decoded. Empty values yield `None`, the
    /// way absent and empty parameters are interchangeable on the wire.
    #[must_use]
    pub fn param_decoded(&self, name: &str) -> Option<String> {
        self.params.get(name).filter(|v| !v.is_empty()).map(codec::decode)
    }

    /// Whether the request carries a signature at all, either as a parameter
    /// or inside an OAuth `Authorization` header.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.params.contains(OAUTH_SIGNATURE)
    }

    /// The normalized URL for signature checks:
    /// `scheme://[user[:pass]@]host[:port]/path`, excluding query and
    /// fragment. The port is omitted when it is the scheme default
    /// (80 for http, 443 for https).
    #[must_use]
    pub fn request_url(&self) -> String {
        let mut url = format!("{}://", self.uri.scheme);
        if !self.uri.user.is_empty() {
            url.push_str(&self.uri.user);
            if let Some(pass) = &self.uri.pass {
                url.push(':');
                url.push_str(pass);
            }
            url.push('@');
        }
        url.push_str(&self.uri.host);
        if let Some(port) = self.uri.port {
            if port != default_port(&self.uri.scheme) {
                url.push_str(&format!(":{port}"));
            }
        }
        url.push_str(&self.uri.path);
        url
    }

    /// The complete parameter string for the signature check: names sorted,
    /// multiple values per name sorted, `oauth_signature` excluded, joined as
    /// `name=value` pairs with `&`.
    #[must_use]
    pub fn normalized_params(&self) -> String {
        let mut normalized = Vec::new();
        for (name, values) in self.params.iter() {
            if name == OAUTH_SIGNATURE {
                continue;
            }
            let mut values = values.to_vec();
            values.sort();
            for value in values {
                normalized.push(format!("{name}={value}"));
            }
        }
        normalized.join("&")
    }

    /// The signature base string: `METHOD&URL&PARAMS`, each of the three
    /// components RFC3986-encoded.
    #[must_use]
    pub fn signature_base(&self) -> String {
        [
            codec::encode(&self.method),
            codec::encode(&self.request_url()),
            codec::encode(&self.normalized_params()),
        ]
        .join("&")
    }
}

/// Default port for a supported scheme. Only called after `parse_uri`
/// restricted the scheme to http/https.
fn default_port(scheme: &str) -> u16 {
    if scheme == "https" {
        443
    } else {
        80
    }
}

fn parse_uri(raw: &str) -> OAuthResult<UriParts> {
    let url = Url::parse(raw).map_err(|_| OAuthError::BadUrl { url: raw.to_string() })?;
    let scheme = url.scheme().to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err(OAuthError::BadUrl { url: raw.to_string() });
    }
    let host = url.host_str().unwrap_or("").to_string();
    if host.is_empty() {
        return Err(OAuthError::BadUrl { url: raw.to_string() });
    }
    Ok(UriParts {
        user: url.username().to_string(),
        pass: url.password().map(ToString::to_string),
        host,
        port: url.port(),
        path: url.path().to_string(),
        scheme,
    })
}

/// Append to an `a=b&c=d` string, separating when both sides are non-empty.
fn append_params(target: &mut String, more: &str) {
    if more.is_empty() {
        return;
    }
    if !target.is_empty() {
        target.push('&');
    }
    target.push_str(more);
}

fn url_query(raw: &str) -> Option<&str> {
    let after_scheme = raw.split('#').next().unwrap_or(raw);
    after_scheme.split_once('?').map(|(_, q)| q)
}

/// Case-insensitive header lookup, first match wins.
fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Reconstruct a deterministic parameter string from posted multipart fields
/// (arrival order, values RFC3986-encoded).
fn multipart_param_string(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}={}", codec::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Extract OAuth parameters from an `Authorization: OAuth ...` header.
///
/// Splits on commas, strips quotes, captures `realm` separately (it is not a
/// signable parameter) and merges the rest with duplicate promotion. Returns
/// the realm, if present.
fn parse_authorization(headers: &[(String, String)], params: &mut ParamMap) -> Option<String> {
    let auth = header(headers, "authorization")?.trim();
    let (scheme, rest) = auth.split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("oauth") {
        return None;
    }

    let mut realm = None;
    for pair in rest.split(',') {
        let pair = pair.trim();
        let Some(pos) = pair.find('=') else { continue };
        if pos == 0 {
            continue;
        }
        let name = &pair[..pos];
        let mut value = &pair[pos + 1..];
        if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            value = &value[1..value.len() - 1];
        }
        if name.eq_ignore_ascii_case("realm") {
            realm = Some(value.to_string());
        } else {
            params.insert_encoded(name, value);
        }
    }
    realm
}
