//! Test utilities shared by unit tests, integration tests and benchmarks
//!
//! RSA-2048 generation takes a noticeable fraction of a second even with an
//! optimized `rsa` build, so fixtures hand out process-wide keys instead of
//! generating one per test.

use crate::keys::KeyPair;
use std::sync::OnceLock;

/// A script with a directive, CRLF line endings and a trailing break
pub const SAMPLE_SCRIPT: &str = "EXECUTE({\"Target\":\"Server1\",\"User\":\"svc-deploy\"})\r\n\
Get-Process | Sort-Object CPU -Descending | Select-Object -First 5\r\n\
Get-Service -Name 'W32Time'\r\n";

/// Key pair generated once per test process
pub fn shared_keypair() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    KEY.get_or_init(|| KeyPair::generate().expect("RSA key generation failed"))
}

/// A second, unrelated key pair for wrong-key tests
pub fn other_keypair() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    KEY.get_or_init(|| KeyPair::generate().expect("RSA key generation failed"))
}

/// Build a script whose first line is `<keyword>(<args_json>)`
#[must_use]
pub fn script_with_directive(keyword: &str, args_json: &str, body: &str) -> String {
    format!("{keyword}({args_json})\r\n{body}")
}
