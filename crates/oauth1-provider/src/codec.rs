//! RFC 3986 percent-encoding helpers.
//!
//! OAuth 1.0a requires strict RFC 3986 encoding for every component of the
//! signature base string. The unreserved set is `ALPHA / DIGIT / "-" / "." /
//! "_" / "~"`; note that `~` must stay unescaped.

/// Percent-encode a string per RFC 3986.
#[must_use]
pub fn encode(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    encoded
}

/// Decode a percent-encoded string.
///
/// Only `%XX` escapes are decoded; a literal `+` is left alone so that
/// form-style space encoding survives into [`transcode`] (which then
/// percent-encodes it). Malformed or truncated escapes pass through verbatim.
#[must_use]
pub fn decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let (Some(hi), Some(lo)) = (
                bytes.get(i + 1).copied().and_then(hex_val),
                bytes.get(i + 2).copied().and_then(hex_val),
            ) {
                out.push(hi * 16 + lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Decode then re-encode, guaranteeing canonical RFC 3986 form.
///
/// Idempotent on already-correctly-encoded input. Used to normalize
/// parameters whose source encoding is uncertain.
#[must_use]
pub fn transcode(input: &str) -> String {
    encode(&decode(input))
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
