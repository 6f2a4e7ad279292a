//! Canonicalizer configuration
//!
//! Stored as JSON. Every field is optional and falls back to its default:
//!
//! ```json
//! {
//!   "keyword": "EXECUTE",
//!   "algorithm": "SHA-256",
//!   "encoding": "wrapped"
//! }
//! ```

use crate::signer::{Algorithm, SignatureEncoding};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directive keyword used when none is configured
pub const DEFAULT_KEYWORD: &str = "EXECUTE";

const CONFIG_FILE_NAME: &str = "config.json";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        /// Config file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for this schema
    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        /// Config file path
        path: PathBuf,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// Keyword cannot be recognized as a directive
    #[error("Invalid directive keyword '{0}': must be non-empty without whitespace, brackets or quotes")]
    InvalidKeyword(String),
}

/// Settings for [`ScriptCanonicalizer`](crate::script::ScriptCanonicalizer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalizerConfig {
    /// Directive keyword, e.g. `EXECUTE` in `EXECUTE({...})`
    pub keyword: String,

    /// Hash algorithm for new signatures; its name is the signature marker
    pub algorithm: Algorithm,

    /// Layout of embedded signatures
    pub encoding: SignatureEncoding,
}

impl Default for CanonicalizerConfig {
    fn default() -> Self {
        Self {
            keyword: DEFAULT_KEYWORD.to_string(),
            algorithm: Algorithm::Sha256,
            encoding: SignatureEncoding::Wrapped,
        }
    }
}

impl CanonicalizerConfig {
    /// Config with a custom keyword and default everything else
    pub fn with_keyword(keyword: impl Into<String>) -> Result<Self, ConfigError> {
        let config = Self {
            keyword: keyword.into(),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Default config file location (`<XDG config>/scriptsign/config.json` on Linux)
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "scriptsign", "scriptsign")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;

        log::debug!("Loaded config from {}: {config:?}", path.display());
        Ok(config)
    }

    /// Load `explicit` if given, else the default file if it exists, else defaults
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file is not.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Check that the keyword can start a directive
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = self.keyword.is_empty()
            || self
                .keyword
                .chars()
                .any(|c| c.is_whitespace() || "(){}[]\"".contains(c));

        if invalid {
            return Err(ConfigError::InvalidKeyword(self.keyword.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = CanonicalizerConfig::default();
        assert_eq!(config.keyword, "EXECUTE");
        assert_eq!(config.algorithm, Algorithm::Sha256);
        assert_eq!(config.encoding, SignatureEncoding::Wrapped);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"keyword": "PSEXECUTE"}"#).unwrap();

        let config = CanonicalizerConfig::load(&path).unwrap();
        assert_eq!(config.keyword, "PSEXECUTE");
        assert_eq!(config.algorithm, Algorithm::Sha256);
        assert_eq!(config.encoding, SignatureEncoding::Wrapped);
    }

    #[test]
    fn test_load_full_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"keyword": "RUN", "algorithm": "SHA512withRSA", "encoding": "compact"}"#,
        )
        .unwrap();

        let config = CanonicalizerConfig::load(&path).unwrap();
        assert_eq!(config.keyword, "RUN");
        assert_eq!(config.algorithm, Algorithm::Sha512);
        assert_eq!(config.encoding, SignatureEncoding::Compact);
    }

    #[test]
    fn test_save_format_roundtrips() {
        let config = CanonicalizerConfig {
            keyword: "RUN".to_string(),
            algorithm: Algorithm::Sha384,
            encoding: SignatureEncoding::Compact,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"SHA-384\""));
        assert_eq!(serde_json::from_str::<CanonicalizerConfig>(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_keyword_rejected() {
        for keyword in ["", "EXEC UTE", "EXECUTE(", "\"X\""] {
            assert!(
                matches!(
                    CanonicalizerConfig::with_keyword(keyword),
                    Err(ConfigError::InvalidKeyword(_))
                ),
                "{keyword:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_invalid_keyword_in_file_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"keyword": ""}"#).unwrap();

        assert!(matches!(
            CanonicalizerConfig::load(&path),
            Err(ConfigError::InvalidKeyword(_))
        ));
    }

    #[test]
    fn test_corrupt_file_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            CanonicalizerConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_explicit_missing_path_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.json");

        assert!(matches!(
            CanonicalizerConfig::load_or_default(Some(&missing)),
            Err(ConfigError::Io { .. })
        ));
    }
}
