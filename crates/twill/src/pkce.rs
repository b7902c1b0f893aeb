//! PKCE helpers (RFC 7636), S256 only.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::ThreadRng};
use smol_str::SmolStr;

use crate::error::{ConfigurationError, Result};
use crate::utils::hash_to_base64url_sha256;

pub const MIN_VERIFIER_LENGTH: usize = 43;
pub const MAX_VERIFIER_LENGTH: usize = 128;
const DEFAULT_VERIFIER_LENGTH: usize = 64;

/// Random code verifier of the given character length (default 64). RFC
/// 7636 bounds the length to 43..=128.
pub fn generate_code_verifier(length: Option<usize>) -> Result<SmolStr> {
    let length = length.unwrap_or(DEFAULT_VERIFIER_LENGTH);
    if !(MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&length) {
        return Err(ConfigurationError::PkceVerifierLength { length }.into());
    }
    // 3 bytes encode to 4 chars; over-generate and truncate to the exact
    // requested length.
    let mut bytes = vec![0u8; length.div_ceil(4) * 3];
    ThreadRng::default().fill_bytes(&mut bytes);
    let mut encoded = URL_SAFE_NO_PAD.encode(bytes);
    encoded.truncate(length);
    Ok(encoded.into())
}

/// S256 code challenge for a verifier: base64url(SHA-256(verifier)).
pub fn generate_code_challenge(code_verifier: &str) -> Result<SmolStr> {
    if code_verifier.is_empty() {
        return Err(ConfigurationError::PkceEmptyVerifier.into());
    }
    Ok(hash_to_base64url_sha256(code_verifier))
}
