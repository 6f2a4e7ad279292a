//! RSA signing and verification for directive-carrying scripts
//!
//! A script is signed so that the host executing it can check it was approved
//! by the holder of a specific RSA private key. The library decides exactly
//! which text is signed (the canonical code), signs it with RSA PKCS#1 v1.5,
//! and embeds the signature back into the script.
//!
//! # Modules
//!
//! - `keys` - RSA-2048 key generation, PEM load/save
//! - `signer` - sign/verify text payloads, signature text format
//! - `script` - canonicalization, embedded signatures
//! - `directive` - `EXECUTE({...})` directive parsing
//! - `config` - canonicalizer configuration
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use scriptsign_lib::{CanonicalizerConfig, KeyPair, ScriptCanonicalizer};
//!
//! let key = KeyPair::generate().unwrap();
//! let canonicalizer = ScriptCanonicalizer::new(CanonicalizerConfig::default());
//!
//! let raw = "EXECUTE({\"Target\":\"Server1\"})\nGet-Process\n";
//! let signed = canonicalizer.sign(raw, &key).unwrap();
//! assert_eq!(signed.code(), "Get-Process");
//! assert_eq!(signed.parameters()["Target"], "Server1");
//!
//! let valid = canonicalizer
//!     .verify_script(signed.text(), key.public_key())
//!     .unwrap();
//! assert!(valid);
//! ```

#![warn(missing_docs)]

pub mod armor;
pub mod config;
pub mod directive;
pub mod encoding;
pub mod keys;
pub mod script;
pub mod signer;
/// Shared fixtures for tests and benchmarks
pub mod test_utils;

// Re-export commonly used types
pub use config::{CanonicalizerConfig, ConfigError};
pub use directive::{DirectiveParser, Parameters};
pub use encoding::EncodingError;
pub use keys::{KeyError, KeyPair, PublicKey};
pub use script::{CanonicalScript, ScriptCanonicalizer, ScriptError, SignedScript};
pub use signer::{
    Algorithm, SignOptions, Signature, SignatureEncoding, SignerError, sign, verify,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
