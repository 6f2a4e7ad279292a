//! RSA PKCS#1 v1.5 signing and verification of text payloads
//!
//! Payload text is turned into bytes with [`encode_payload`] (ISO-8859-1) on
//! both paths, hashed with the selected [`Algorithm`] and signed with PKCS#1
//! v1.5 padding. Signing is deterministic: the same key, payload and algorithm
//! always produce the same signature bytes.

use crate::armor::{self, ArmorError};
use crate::encoding::{EncodingError, encode_payload};
use crate::keys::{KeyPair, PublicKey};
use rsa::Pkcs1v15Sign;
use rsa::rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Signer errors
#[derive(Error, Debug)]
pub enum SignerError {
    /// Payload contains characters outside the canonical encoding
    #[error("Payload encoding error: {0}")]
    PayloadEncoding(#[from] EncodingError),

    /// Signature text is not `[<algorithm>:]<base64>`
    #[error("Invalid signature text: {0}")]
    SignatureFormat(String),

    /// Algorithm name not recognized
    #[error("Unknown signature algorithm '{0}'")]
    UnknownAlgorithm(String),

    /// RSA primitive failure
    #[error("RSA error: {0}")]
    Rsa(#[from] rsa::Error),
}

impl From<ArmorError> for SignerError {
    fn from(e: ArmorError) -> Self {
        Self::SignatureFormat(e.to_string())
    }
}

/// Result type for signer operations
pub type Result<T> = std::result::Result<T, SignerError>;

/// Hash algorithm paired with RSA PKCS#1 v1.5
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// SHA-1, accepted for legacy signatures only
    #[serde(rename = "SHA-1", alias = "SHA1withRSA")]
    Sha1,
    /// SHA-256 (default)
    #[default]
    #[serde(rename = "SHA-256", alias = "SHA256withRSA")]
    Sha256,
    /// SHA-384
    #[serde(rename = "SHA-384", alias = "SHA384withRSA")]
    Sha384,
    /// SHA-512
    #[serde(rename = "SHA-512", alias = "SHA512withRSA")]
    Sha512,
}

impl Algorithm {
    /// Every supported algorithm, in marker lookup order
    pub const ALL: [Self; 4] = [Self::Sha1, Self::Sha256, Self::Sha384, Self::Sha512];

    /// Canonical name, also used as the signature text prefix
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Digest output size in bits
    #[must_use]
    pub const fn digest_bits(self) -> usize {
        match self {
            Self::Sha1 => 160,
            Self::Sha256 => 256,
            Self::Sha384 => 384,
            Self::Sha512 => 512,
        }
    }

    fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => sha1::Sha1::digest(data).to_vec(),
            Self::Sha256 => sha2::Sha256::digest(data).to_vec(),
            Self::Sha384 => sha2::Sha384::digest(data).to_vec(),
            Self::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }

    fn padding(self) -> Pkcs1v15Sign {
        match self {
            Self::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
            Self::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
            Self::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
            Self::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = SignerError;

    /// Accepts `SHA-256`, `SHA256`, `sha256` and the JCA form `SHA256withRSA`
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "");
        let normalized = normalized.strip_suffix("WITHRSA").unwrap_or(normalized.as_str());
        match normalized {
            "SHA1" => Ok(Self::Sha1),
            "SHA256" => Ok(Self::Sha256),
            "SHA384" => Ok(Self::Sha384),
            "SHA512" => Ok(Self::Sha512),
            _ => Err(SignerError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Layout of the base64 signature body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureEncoding {
    /// One unbroken base64 line
    #[default]
    Compact,
    /// Wrapped at 76 characters with CRLF line breaks
    Wrapped,
}

/// Options for [`sign`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignOptions {
    /// Hash algorithm
    pub algorithm: Algorithm,
    /// Base64 layout
    pub encoding: SignatureEncoding,
    /// Prepend `"<algorithm>:"` to the signature text
    pub write_algo_as_prefix: bool,
}

/// A signature together with the way it is rendered as text
///
/// `Display` produces the signature text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    algorithm: Algorithm,
    bytes: Vec<u8>,
    encoding: SignatureEncoding,
    prefixed: bool,
}

impl Signature {
    /// Parse signature text of the form `[<algorithm>:]<base64>`
    ///
    /// Unprefixed text is attributed to the default algorithm.
    pub fn parse(text: &str) -> Result<Self> {
        let (prefix, body) = armor::split_prefix(text);

        let algorithm = match prefix {
            Some(name) => name.parse::<Algorithm>().map_err(|_| {
                SignerError::SignatureFormat(format!("unknown algorithm prefix '{name}'"))
            })?,
            None => Algorithm::default(),
        };
        let bytes = armor::decode(body)?;
        let encoding = if body.trim().contains('\n') {
            SignatureEncoding::Wrapped
        } else {
            SignatureEncoding::Compact
        };

        Ok(Self {
            algorithm,
            bytes,
            encoding,
            prefixed: prefix.is_some(),
        })
    }

    /// Algorithm the signature was produced with
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Raw signature bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Base64 layout used by `Display`
    pub fn encoding(&self) -> SignatureEncoding {
        self.encoding
    }

    /// Whether `Display` writes the `"<algorithm>:"` prefix
    pub fn is_prefixed(&self) -> bool {
        self.prefixed
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefixed {
            write!(f, "{}:", self.algorithm)?;
        }
        f.write_str(&armor::encode(
            &self.bytes,
            self.encoding == SignatureEncoding::Wrapped,
        ))
    }
}

/// Sign raw bytes with PKCS#1 v1.5 over the given hash
pub fn sign_bytes(key: &KeyPair, data: &[u8], algorithm: Algorithm) -> Result<Vec<u8>> {
    let digest = algorithm.digest(data);
    // Blinding only; the PKCS#1 v1.5 output does not depend on the RNG
    let sig = key
        .as_rsa()
        .sign_with_rng(&mut OsRng, algorithm.padding(), &digest)?;
    Ok(sig)
}

/// Check a PKCS#1 v1.5 signature over raw bytes
///
/// Any mismatch, including a signature of the wrong length, is `false`.
pub fn verify_bytes(key: &PublicKey, data: &[u8], signature: &[u8], algorithm: Algorithm) -> bool {
    let digest = algorithm.digest(data);
    key.as_rsa()
        .verify(algorithm.padding(), &digest, signature)
        .is_ok()
}

/// Sign a text payload
pub fn sign(key: &KeyPair, payload: &str, options: &SignOptions) -> Result<Signature> {
    let data = encode_payload(payload)?;
    let bytes = sign_bytes(key, &data, options.algorithm)?;

    log::debug!(
        "Signed {} payload bytes with {} (key {})",
        data.len(),
        options.algorithm,
        key.public_key().fingerprint()
    );

    Ok(Signature {
        algorithm: options.algorithm,
        bytes,
        encoding: options.encoding,
        prefixed: options.write_algo_as_prefix,
    })
}

/// Verify signature text against a text payload
///
/// Returns `Ok(false)` on a cryptographic mismatch or when the signature text
/// carries a prefix naming a different algorithm than `algorithm`. Malformed
/// signature text and unencodable payloads are errors.
pub fn verify(
    key: &PublicKey,
    payload: &str,
    signature_text: &str,
    algorithm: Algorithm,
) -> Result<bool> {
    let signature = Signature::parse(signature_text)?;
    let data = encode_payload(payload)?;

    if signature.is_prefixed() && signature.algorithm != algorithm {
        log::debug!(
            "Signature prefix {} does not match requested algorithm {algorithm}",
            signature.algorithm
        );
        return Ok(false);
    }

    Ok(verify_bytes(key, &data, &signature.bytes, algorithm))
}
