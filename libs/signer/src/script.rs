//! Script canonicalization and embedded signatures
//!
//! A script moves through three states:
//!
//! ```text
//! raw text ──canonicalize──▶ CanonicalScript ──sign──▶ SignedScript
//! ```
//!
//! Canonicalization decides exactly which bytes are signed:
//!
//! 1. line endings are normalized to `\n`
//! 2. directive lines (`EXECUTE({...})`, possibly spanning several lines) are
//!    removed
//! 3. everything from the first signature marker line (`SHA-256:...`) on is
//!    dropped, so an already signed script canonicalizes like its unsigned
//!    original
//! 4. the result is trimmed
//!
//! Signing keeps the original text (directive included) up to the marker,
//! appends one line break and the `"<algorithm>:<base64>"` signature, and
//! writes the whole document with CRLF line endings.

use crate::config::CanonicalizerConfig;
use crate::directive::{Directive, DirectiveParser, Parameters};
use crate::keys::{KeyPair, PublicKey};
use crate::signer::{self, Algorithm, SignOptions, Signature, SignerError};
use thiserror::Error;

/// Script signing errors
#[derive(Error, Debug)]
pub enum ScriptError {
    /// Signing or signature parsing failed
    #[error(transparent)]
    Signer(#[from] SignerError),

    /// Script has no embedded signature marker
    #[error("Script is not signed: no signature marker found")]
    Unsigned,
}

/// Result type for script operations
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Normalize `\r\n` and lone `\r` to `\n`
#[must_use]
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Position of an embedded signature within normalized text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Marker {
    line: usize,
    algorithm: Algorithm,
}

/// Line-level view of a normalized script
struct Layout<'t> {
    parser: DirectiveParser<'t>,
    lines: Vec<&'t str>,
    directives: Vec<Directive<'t>>,
    marker: Option<Marker>,
}

impl<'t> Layout<'t> {
    fn parse(normalized: &'t str, keyword: &'t str) -> Self {
        let parser = DirectiveParser::new(keyword);
        let lines: Vec<&str> = normalized.split('\n').collect();
        let directives = parser.scan(normalized);

        let in_directive = |index: usize| directives.iter().any(|d| d.lines.contains(&index));
        let marker = lines
            .iter()
            .enumerate()
            .filter(|(index, _)| !in_directive(*index))
            .find_map(|(index, line)| {
                marker_algorithm(line).map(|algorithm| Marker {
                    line: index,
                    algorithm,
                })
            });

        Self {
            parser,
            lines,
            directives,
            marker,
        }
    }

    /// Index of the first line that is not signed content
    fn content_end(&self) -> usize {
        self.marker.map_or(self.lines.len(), |m| m.line)
    }

    /// Signed content with every directive removed
    ///
    /// Removing a directive can let an earlier rejected candidate balance, so
    /// removal repeats until the code holds no directive.
    fn canonical_code(&self) -> String {
        let mut code = without_directives(&self.lines[..self.content_end()], &self.directives);

        loop {
            let next = {
                let directives = self.parser.scan(&code);
                if directives.is_empty() {
                    break;
                }
                let lines: Vec<&str> = code.split('\n').collect();
                without_directives(&lines, &directives)
            };
            code = next;
        }

        code
    }

    /// Original text before the marker, directives included
    ///
    /// With a marker, the line break that ended the last content line is kept.
    fn unsigned_text(&self) -> String {
        let mut text = self.lines[..self.content_end()].join("\n");
        if self.marker.is_some_and(|m| m.line > 0) {
            text.push('\n');
        }
        text
    }

    fn embedded_signature(&self) -> Option<String> {
        self.marker
            .map(|m| self.lines[m.line..].join("\n").trim().to_string())
    }

    fn parameters(&self) -> Parameters {
        let Some(directive) = self.directives.first() else {
            return Parameters::new();
        };

        directive.parameters().unwrap_or_else(|e| {
            log::debug!("Ignoring malformed directive arguments: {e}");
            Parameters::new()
        })
    }
}

/// Join the lines not covered by any directive, trimmed
fn without_directives(lines: &[&str], directives: &[Directive<'_>]) -> String {
    lines
        .iter()
        .enumerate()
        .filter(|(index, _)| !directives.iter().any(|d| d.lines.contains(index)))
        .map(|(_, line)| *line)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Algorithm named by a signature marker at the start of `line`
fn marker_algorithm(line: &str) -> Option<Algorithm> {
    let line = line.trim_start();
    Algorithm::ALL.into_iter().find(|algorithm| {
        line.strip_prefix(algorithm.name())
            .is_some_and(|rest| rest.starts_with(':'))
    })
}

/// Canonicalizes, signs and verifies scripts for one configuration
#[derive(Debug, Clone, Default)]
pub struct ScriptCanonicalizer {
    config: CanonicalizerConfig,
}

impl ScriptCanonicalizer {
    /// Create a canonicalizer; the keyword is fixed for its lifetime
    #[must_use]
    pub fn new(config: CanonicalizerConfig) -> Self {
        Self { config }
    }

    /// Active configuration
    pub fn config(&self) -> &CanonicalizerConfig {
        &self.config
    }

    /// Derive the canonical view of `raw`
    pub fn canonicalize(&self, raw: &str) -> CanonicalScript {
        let normalized = normalize_line_endings(raw);
        let layout = Layout::parse(&normalized, &self.config.keyword);

        let script = CanonicalScript {
            code: layout.canonical_code(),
            parameters: layout.parameters(),
            unsigned_text: layout.unsigned_text(),
            embedded_signature: layout.embedded_signature(),
            options: SignOptions {
                algorithm: self.config.algorithm,
                encoding: self.config.encoding,
                write_algo_as_prefix: true,
            },
        };

        log::debug!(
            "Canonicalized script: {} directive(s), {} code bytes, signed: {}",
            layout.directives.len(),
            script.code.len(),
            script.embedded_signature.is_some()
        );
        script
    }

    /// Parameters of the first directive; empty when absent or malformed
    pub fn extract_parameters(&self, raw: &str) -> Parameters {
        let normalized = normalize_line_endings(raw);
        Layout::parse(&normalized, &self.config.keyword).parameters()
    }

    /// Canonicalize and sign in one step
    pub fn sign(&self, raw: &str, key: &KeyPair) -> Result<SignedScript> {
        self.canonicalize(raw).sign(key)
    }

    /// Check the signature embedded in `text` against its canonical code
    ///
    /// The algorithm is taken from the signature marker. Markers naming a
    /// shorter digest than the configured algorithm are rejected, so a host
    /// configured for SHA-256 never accepts SHA-1 signatures. A mismatch is
    /// `Ok(false)`; a script without any marker is [`ScriptError::Unsigned`].
    pub fn verify_script(&self, text: &str, key: &PublicKey) -> Result<bool> {
        let script = self.canonicalize(text);
        let embedded = script.embedded_signature().ok_or(ScriptError::Unsigned)?;

        let signature = Signature::parse(embedded)?;
        if signature.algorithm().digest_bits() < self.config.algorithm.digest_bits() {
            log::warn!(
                "Rejecting {} signature: weaker than configured {}",
                signature.algorithm(),
                self.config.algorithm
            );
            return Ok(false);
        }
        let valid = signer::verify(key, script.code(), embedded, signature.algorithm())?;

        if valid {
            log::debug!("Signature valid for key {}", key.fingerprint());
        } else {
            log::warn!(
                "Signature does not match script content for key {}",
                key.fingerprint()
            );
        }
        Ok(valid)
    }
}

/// A script after canonicalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalScript {
    code: String,
    parameters: Parameters,
    unsigned_text: String,
    embedded_signature: Option<String>,
    options: SignOptions,
}

impl CanonicalScript {
    /// The exact text that is signed
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Directive parameters
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Signature text already embedded in the script, marker included
    pub fn embedded_signature(&self) -> Option<&str> {
        self.embedded_signature.as_deref()
    }

    /// Sign the canonical code and embed the new signature
    ///
    /// The text before the signature is kept verbatim. One line break is
    /// appended unless a replaced signature already followed one.
    pub fn sign(&self, key: &KeyPair) -> Result<SignedScript> {
        let signature = signer::sign(key, &self.code, &self.options)?;

        let mut text = self.unsigned_text.clone();
        if self.embedded_signature.is_none() || !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&normalize_line_endings(&signature.to_string()));
        let text = text.replace('\n', "\r\n");

        log::info!(
            "Signed script ({} code bytes) with {} key {}",
            self.code.len(),
            signature.algorithm(),
            key.public_key().fingerprint()
        );

        Ok(SignedScript {
            code: self.code.clone(),
            parameters: self.parameters.clone(),
            signature,
            text,
        })
    }
}

/// A script with an embedded signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedScript {
    code: String,
    parameters: Parameters,
    signature: Signature,
    text: String,
}

impl SignedScript {
    /// The signed canonical code
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Directive parameters
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// The new signature
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Full signed document, CRLF line endings
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume into the signed document text
    pub fn into_text(self) -> String {
        self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::SignatureEncoding;
    use crate::test_utils::{SAMPLE_SCRIPT, other_keypair, shared_keypair};

    fn canonicalizer() -> ScriptCanonicalizer {
        ScriptCanonicalizer::default()
    }

    #[test]
    fn test_directive_example() {
        let script = canonicalizer().canonicalize("EXECUTE({\"Target\":\"Server1\"})\nGet-Process\n");

        assert_eq!(script.code(), "Get-Process");
        assert_eq!(script.parameters().len(), 1);
        assert_eq!(script.parameters()["Target"], "Server1");
        assert!(script.embedded_signature().is_none());
    }

    #[test]
    fn test_missing_directive_gives_empty_parameters() {
        let c = canonicalizer();
        assert!(c.extract_parameters("Get-Process\n").is_empty());
        assert_eq!(c.canonicalize("Get-Process\n").code(), "Get-Process");
    }

    #[test]
    fn test_malformed_directive_arguments_give_empty_parameters() {
        let c = canonicalizer();
        let script = c.canonicalize("EXECUTE({Target: Server1})\nGet-Process");

        assert!(script.parameters().is_empty());
        // Still a balanced directive line, so it is not signed
        assert_eq!(script.code(), "Get-Process");
    }

    #[test]
    fn test_crlf_and_lf_canonicalize_identically() {
        let c = canonicalizer();
        let lf = c.canonicalize("EXECUTE({})\nline one\nline two\n");
        let crlf = c.canonicalize("EXECUTE({})\r\nline one\r\nline two\r\n");
        assert_eq!(lf.code(), crlf.code());
        assert_eq!(lf.code(), "line one\nline two");
    }

    #[test]
    fn test_code_is_trimmed() {
        let script = canonicalizer().canonicalize("\n\n   Get-Process  \n\n");
        assert_eq!(script.code(), "Get-Process");
    }

    #[test]
    fn test_directive_in_the_middle_is_removed() {
        let script = canonicalizer().canonicalize("Import-Module X\nEXECUTE({\"a\":\"b\"})\nGet-X\n");
        assert_eq!(script.code(), "Import-Module X\nGet-X");
    }

    #[test]
    fn test_custom_keyword() {
        let config = CanonicalizerConfig::with_keyword("PSEXECUTE").unwrap();
        let c = ScriptCanonicalizer::new(config);

        let script = c.canonicalize("PSEXECUTE({\"Target\":\"Server1\"})\nEXECUTE({})\nGet-Process");
        assert_eq!(script.code(), "EXECUTE({})\nGet-Process");
        assert_eq!(script.parameters()["Target"], "Server1");
    }

    #[test]
    fn test_marker_truncates_code() {
        let script = canonicalizer().canonicalize("Get-Process\n\nSHA-256:AAAA\r\nBBBB");
        assert_eq!(script.code(), "Get-Process");
        assert_eq!(script.embedded_signature(), Some("SHA-256:AAAA\nBBBB"));
    }

    #[test]
    fn test_algorithm_name_inside_code_is_not_a_marker() {
        let text = "Get-FileHash -Algorithm SHA-256 .\\file.txt";
        let script = canonicalizer().canonicalize(text);
        assert_eq!(script.code(), text);
        assert!(script.embedded_signature().is_none());
    }

    #[test]
    fn test_canonicalization_is_idempotent() {
        let c = canonicalizer();
        let once = c.canonicalize(SAMPLE_SCRIPT);
        let twice = c.canonicalize(once.code());
        assert_eq!(once.code(), twice.code());
    }

    #[test]
    fn test_directive_unblocked_by_removal_is_removed_too() {
        // Line 1 only balances once line 2 is gone
        let raw = "EXECUTE({\"x\nEXECUTE({\"a\":\"]\"})\n\"})\nGet-Process";
        let c = canonicalizer();

        let once = c.canonicalize(raw);
        assert_eq!(once.code(), "Get-Process");
        assert_eq!(c.canonicalize(once.code()).code(), once.code());
    }

    #[test]
    fn test_trailing_blank_lines_are_kept_when_signing() {
        let c = canonicalizer();

        let signed = c.sign("Get-Process\n\n", shared_keypair()).unwrap();
        assert!(signed.text().starts_with("Get-Process\r\n\r\n\r\nSHA-256:"));

        let signed = c.sign("Get-Process", shared_keypair()).unwrap();
        assert!(signed.text().starts_with("Get-Process\r\nSHA-256:"));
    }

    #[test]
    fn test_resigning_does_not_add_blank_lines() {
        let c = canonicalizer();
        let first = c.sign("Get-Process\n\n", shared_keypair()).unwrap();
        let second = c.sign(first.text(), shared_keypair()).unwrap();
        assert_eq!(second.text(), first.text());

        // Signature directly after the last code line
        let glued = format!("Get-Process\n{}", first.signature());
        let resigned = c.sign(&glued, shared_keypair()).unwrap();
        assert!(resigned.text().starts_with("Get-Process\r\nSHA-256:"));
    }

    #[test]
    fn test_signed_text_layout() {
        let c = canonicalizer();
        let signed = c.sign("EXECUTE({\"Target\":\"Server1\"})\nGet-Process\n", shared_keypair()).unwrap();

        let text = signed.text();
        // Original text kept verbatim, then one added break before the signature
        assert!(text.starts_with("EXECUTE({\"Target\":\"Server1\"})\r\nGet-Process\r\n\r\nSHA-256:"));
        assert!(signed.signature().is_prefixed());
        assert!(!text.replace("\r\n", "").contains('\n'));
        assert!(!text.replace("\r\n", "").contains('\r'));
        assert_eq!(signed.code(), "Get-Process");
        assert_eq!(signed.signature().encoding(), SignatureEncoding::Wrapped);
    }

    #[test]
    fn test_sign_then_verify() {
        let c = canonicalizer();
        let signed = c.sign(SAMPLE_SCRIPT, shared_keypair()).unwrap();

        assert!(c.verify_script(signed.text(), shared_keypair().public_key()).unwrap());
        assert!(!c.verify_script(signed.text(), other_keypair().public_key()).unwrap());
    }

    #[test]
    fn test_resigning_recovers_same_code_and_signature() {
        let c = canonicalizer();
        let first = c.sign(SAMPLE_SCRIPT, shared_keypair()).unwrap();

        let resigned_view = c.canonicalize(first.text());
        assert_eq!(resigned_view.code(), c.canonicalize(SAMPLE_SCRIPT).code());

        let second = resigned_view.sign(shared_keypair()).unwrap();
        assert_eq!(second.text(), first.text());
    }

    #[test]
    fn test_tampered_script_fails_verification() {
        let c = canonicalizer();
        let signed = c.sign(SAMPLE_SCRIPT, shared_keypair()).unwrap();

        let tampered = signed.text().replace("Get-Service", "Stop-Service");
        assert!(!c.verify_script(&tampered, shared_keypair().public_key()).unwrap());
    }

    #[test]
    fn test_directive_is_not_covered_by_signature() {
        let c = canonicalizer();
        let signed = c.sign(SAMPLE_SCRIPT, shared_keypair()).unwrap();

        let retargeted = signed.text().replace("Server1", "Server2");
        assert!(c.verify_script(&retargeted, shared_keypair().public_key()).unwrap());
        assert_eq!(c.extract_parameters(&retargeted)["Target"], "Server2");
    }

    #[test]
    fn test_unsigned_script_is_error() {
        let err = canonicalizer()
            .verify_script("Get-Process", shared_keypair().public_key())
            .unwrap_err();
        assert!(matches!(err, ScriptError::Unsigned));
    }

    #[test]
    fn test_garbage_signature_is_format_error() {
        let err = canonicalizer()
            .verify_script("Get-Process\nSHA-256:***", shared_keypair().public_key())
            .unwrap_err();
        assert!(matches!(err, ScriptError::Signer(SignerError::SignatureFormat(_))));
    }

    #[test]
    fn test_verify_uses_marker_algorithm() {
        let config = CanonicalizerConfig {
            algorithm: Algorithm::Sha512,
            encoding: SignatureEncoding::Compact,
            ..CanonicalizerConfig::default()
        };
        let signed = ScriptCanonicalizer::new(config)
            .sign(SAMPLE_SCRIPT, shared_keypair())
            .unwrap();
        assert!(signed.text().contains("\r\nSHA-512:"));

        // Default (SHA-256) canonicalizer still verifies it via the marker
        assert!(canonicalizer()
            .verify_script(signed.text(), shared_keypair().public_key())
            .unwrap());
    }

    #[test]
    fn test_weaker_marker_algorithm_is_rejected() {
        let sha1 = ScriptCanonicalizer::new(CanonicalizerConfig {
            algorithm: Algorithm::Sha1,
            ..CanonicalizerConfig::default()
        });
        let signed = sha1.sign(SAMPLE_SCRIPT, shared_keypair()).unwrap();

        assert!(sha1.verify_script(signed.text(), shared_keypair().public_key()).unwrap());
        assert!(!canonicalizer()
            .verify_script(signed.text(), shared_keypair().public_key())
            .unwrap());
    }

    #[test]
    fn test_empty_script_signs_after_one_break() {
        let signed = canonicalizer().sign("", shared_keypair()).unwrap();
        assert!(signed.text().starts_with("\r\nSHA-256:"));
        assert_eq!(signed.code(), "");
        assert!(canonicalizer()
            .verify_script(signed.text(), shared_keypair().public_key())
            .unwrap());
    }
}
