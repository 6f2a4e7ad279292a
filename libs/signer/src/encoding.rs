//! Canonical text-to-bytes encoding for signed payloads
//!
//! Script text is hashed as ISO-8859-1 (Latin-1): every character in
//! `U+0000..=U+00FF` maps to the single byte of the same value. The same
//! function feeds both the signing and the verification path, so a payload
//! hashes identically on both sides. Characters above `U+00FF` have no
//! Latin-1 byte and are rejected instead of being replaced.
//!
//! For pure ASCII payloads the output is identical to UTF-8 and ASCII.

use thiserror::Error;

/// Payload encoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// Character outside the Latin-1 range
    #[error("Character {ch:?} at index {index} cannot be encoded as ISO-8859-1")]
    Unrepresentable {
        /// The offending character
        ch: char,
        /// Character index (not byte offset) within the payload
        index: usize,
    },
}

/// Encode `text` as ISO-8859-1 bytes
pub fn encode_payload(text: &str) -> Result<Vec<u8>, EncodingError> {
    text.chars()
        .enumerate()
        .map(|(index, ch)| {
            u8::try_from(u32::from(ch)).map_err(|_| EncodingError::Unrepresentable { ch, index })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_matches_utf8() {
        let text = "Get-Process | Where-Object { $_.CPU -gt 100 }\r\n";
        assert_eq!(encode_payload(text).unwrap(), text.as_bytes());
    }

    #[test]
    fn test_latin1_maps_to_single_bytes() {
        let bytes = encode_payload("café ÿ").unwrap();
        assert_eq!(bytes, vec![b'c', b'a', b'f', 0xE9, b' ', 0xFF]);
    }

    #[test]
    fn test_rejects_characters_above_latin1() {
        let err = encode_payload("Write-Host '€5'").unwrap_err();
        assert_eq!(err, EncodingError::Unrepresentable { ch: '€', index: 12 });
        assert!(err.to_string().contains("index 12"));
    }

    #[test]
    fn test_empty_payload() {
        assert!(encode_payload("").unwrap().is_empty());
    }
}
