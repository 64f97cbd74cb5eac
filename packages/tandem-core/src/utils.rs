//! General utilities shared across the application.

use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::protocol_constants::{
    MAX_SESSION_CODE_LENGTH, MIN_SESSION_CODE_LENGTH, SESSION_CODE_ALPHABET,
};

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Codes
// ─────────────────────────────────────────────────────────────────────────────

/// Generates a random session code of `length` base-36 characters.
///
/// Digits are peeled off the 128-bit value of a fresh v4 UUID. The code is
/// not guaranteed unique; callers re-check the store before the first write.
///
/// `length` is clamped to the supported range.
#[must_use]
pub fn generate_session_code(length: usize) -> String {
    let length = length.clamp(MIN_SESSION_CODE_LENGTH, MAX_SESSION_CODE_LENGTH);
    let radix = SESSION_CODE_ALPHABET.len() as u128;
    let mut value = Uuid::new_v4().as_u128();

    let mut code = String::with_capacity(length);
    for _ in 0..length {
        code.push(SESSION_CODE_ALPHABET[(value % radix) as usize] as char);
        value /= radix;
    }
    code
}

/// Normalizes a user-supplied session code (trim + uppercase).
///
/// Returns `None` if the result is empty or contains characters outside the
/// session code alphabet.
#[must_use]
pub fn normalize_session_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_uppercase();
    if code.is_empty() || code.len() > MAX_SESSION_CODE_LENGTH {
        return None;
    }
    if !code.bytes().all(|b| SESSION_CODE_ALPHABET.contains(&b)) {
        return None;
    }
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_code_has_requested_length_and_alphabet() {
        for _ in 0..100 {
            let code = generate_session_code(6);
            assert_eq!(code.len(), 6);
            assert!(code
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase()));
        }
    }

    #[test]
    fn generated_code_length_is_clamped() {
        assert_eq!(generate_session_code(1).len(), MIN_SESSION_CODE_LENGTH);
        assert_eq!(generate_session_code(64).len(), MAX_SESSION_CODE_LENGTH);
    }

    #[test]
    fn generated_codes_vary() {
        let a = generate_session_code(8);
        let b = generate_session_code(8);
        let c = generate_session_code(8);
        // Three identical 8-char codes in a row would mean the source isn't random.
        assert!(!(a == b && b == c));
    }

    #[test]
    fn normalize_uppercases_and_trims() {
        assert_eq!(normalize_session_code("  ab12cd "), Some("AB12CD".into()));
    }

    #[test]
    fn normalize_rejects_empty_and_foreign_characters() {
        assert_eq!(normalize_session_code(""), None);
        assert_eq!(normalize_session_code("   "), None);
        assert_eq!(normalize_session_code("AB-12"), None);
        assert_eq!(normalize_session_code("ÄB12CD"), None);
        assert_eq!(normalize_session_code("ABCDEFGHIJKLM"), None);
    }

    #[test]
    fn now_millis_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }
}
