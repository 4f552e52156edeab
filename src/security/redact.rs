//! Identifier anonymization and PII scrubbing for telemetry payloads.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Bytes of the SHA-256 digest kept in [`hash_identifier`]
const IDENTIFIER_HASH_BYTES: usize = 16;

/// Default cap on normalized error messages, in characters
pub const DEFAULT_ERROR_MAX_LEN: usize = 100;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("valid email regex")
});

static IPV4_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").expect("valid ip regex"));

/// One-way hash of a login identifier (email, username, IP).
///
/// SHA-256 truncated to 128 bits, lowercase hex. Identifiers are trimmed and
/// lowercased first so `Bob@x.io` and `bob@x.io ` hash alike.
pub fn hash_identifier(identifier: &str) -> String {
    let normalized = identifier.trim().to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..IDENTIFIER_HASH_BYTES])
}

/// Redact emails and IPv4 addresses, then cap the message at `max_len` chars.
pub fn normalize_error(message: &str, max_len: usize) -> String {
    let redacted = EMAIL_RE.replace_all(message, "[email]");
    let redacted = IPV4_RE.replace_all(&redacted, "[ip]");
    redacted.chars().take(max_len).collect()
}
