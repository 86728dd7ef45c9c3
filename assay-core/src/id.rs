//! ID generation utilities with prefix support
//!
//! Session and visitor identifiers are generated from the operating system's
//! random number generator and rendered as `{prefix}_{base64url}`. They are
//! never derived from request data, so they cannot be guessed from the outside.

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use rand::{TryRngCore, rngs::OsRng};

use crate::error::SessionError;

/// Minimum number of random bytes accepted for an identifier (128 bits).
pub const MIN_ID_BYTES: usize = 16;

/// Default number of random bytes used for session and visitor identifiers.
pub const DEFAULT_ID_BYTES: usize = 32;

/// Generate a prefixed ID with the given number of random bytes
///
/// Fails only if the operating system random source is unavailable.
///
/// # Example
/// ```
/// # use assay_core::id::generate_prefixed_id;
/// let id = generate_prefixed_id("ses", 32).unwrap();
/// assert!(id.starts_with("ses_"));
/// ```
pub fn generate_prefixed_id(prefix: &str, bytes: usize) -> Result<String, SessionError> {
    let mut random_bytes = vec![0u8; bytes.max(MIN_ID_BYTES)];
    OsRng
        .try_fill_bytes(&mut random_bytes)
        .map_err(|e| SessionError::IdGeneration(format!("random source unavailable: {e}")))?;

    let encoded = BASE64_URL_SAFE_NO_PAD.encode(random_bytes);

    Ok(format!("{prefix}_{encoded}"))
}

/// Validate that a prefixed ID has the expected format
///
/// # Returns
/// `true` if the ID has the correct prefix and at least [`MIN_ID_BYTES`] of
/// decodable random data, `false` otherwise
pub fn validate_prefixed_id(id: &str, expected_prefix: &str) -> bool {
    let Some(random_part) = id
        .strip_prefix(expected_prefix)
        .and_then(|rest| rest.strip_prefix('_'))
    else {
        return false;
    };

    match BASE64_URL_SAFE_NO_PAD.decode(random_part) {
        Ok(decoded) => decoded.len() >= MIN_ID_BYTES,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_prefixed_id() {
        let id = generate_prefixed_id("ses", DEFAULT_ID_BYTES).unwrap();
        assert!(id.starts_with("ses_"));

        let id2 = generate_prefixed_id("ses", DEFAULT_ID_BYTES).unwrap();
        assert_ne!(id, id2);
    }

    #[test]
    fn test_generate_prefixed_id_enforces_minimum_entropy() {
        let id = generate_prefixed_id("vis", 4).unwrap();
        let decoded = BASE64_URL_SAFE_NO_PAD.decode(&id[4..]).unwrap();
        assert_eq!(decoded.len(), MIN_ID_BYTES);
    }

    #[test]
    fn test_validate_prefixed_id() {
        let id = generate_prefixed_id("ses", DEFAULT_ID_BYTES).unwrap();
        assert!(validate_prefixed_id(&id, "ses"));
        assert!(!validate_prefixed_id(&id, "vis"));

        assert!(!validate_prefixed_id("ses", "ses"));
        assert!(!validate_prefixed_id("ses_", "ses"));
        assert!(!validate_prefixed_id("ses_invalid!", "ses"));
        assert!(!validate_prefixed_id("ses_c2hvcnQ", "ses"));
    }

    #[test]
    fn test_id_is_url_safe() {
        let id = generate_prefixed_id("vis", DEFAULT_ID_BYTES).unwrap();
        assert!(
            id.chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        );
    }
}
