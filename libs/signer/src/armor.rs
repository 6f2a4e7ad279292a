//! Signature text armor
//!
//! Signature text has the form `[<algorithm> ":"] <base64>`. The base64 body is
//! either one unbroken line or wrapped at 76 characters with CRLF between
//! chunks (no trailing break), the MIME base64 layout. The colon never occurs
//! in the base64 alphabet, so the first colon always ends the prefix.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

/// Line width of wrapped base64 output
pub const WRAP_WIDTH: usize = 76;

/// Line separator inserted between wrapped base64 chunks
pub const WRAP_SEPARATOR: &str = "\r\n";

/// Armor parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArmorError {
    /// Signature text has no base64 body
    #[error("Signature text is empty")]
    Empty,

    /// Body is not standard base64
    #[error("Invalid base64 signature: {0}")]
    InvalidBase64(String),
}

/// Encode signature bytes as base64, optionally wrapped at [`WRAP_WIDTH`]
#[must_use]
pub fn encode(bytes: &[u8], wrapped: bool) -> String {
    let b64 = STANDARD.encode(bytes);
    if !wrapped || b64.len() <= WRAP_WIDTH {
        return b64;
    }

    // base64 output is ASCII, so byte chunks are char chunks
    b64.as_bytes()
        .chunks(WRAP_WIDTH)
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(WRAP_SEPARATOR)
}

/// Split off an optional `<algorithm>:` prefix
///
/// Returns the trimmed prefix (if any) and the remaining body.
#[must_use]
pub fn split_prefix(text: &str) -> (Option<&str>, &str) {
    let text = text.trim();
    match text.split_once(':') {
        Some((prefix, body)) => (Some(prefix.trim()), body),
        None => (None, text),
    }
}

/// Decode a base64 body, ignoring any line breaks or other whitespace
pub fn decode(body: &str) -> Result<Vec<u8>, ArmorError> {
    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err(ArmorError::Empty);
    }
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ArmorError::InvalidBase64(e.to_string()))
}
