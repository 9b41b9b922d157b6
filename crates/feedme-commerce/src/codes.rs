//! Human-facing random codes for vouchers, referrals and orders.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Attempts made before giving up on a colliding code.
pub(crate) const MAX_CODE_ATTEMPTS: usize = 5;

/// `PREFIX-XXXXXX` with uppercase alphanumerics.
pub(crate) fn random_code(prefix: &str, len: usize) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("{}-{}", prefix, suffix)
}

/// Canonical form used for code lookups.
pub(crate) fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_code_shape() {
        let code = random_code("WELCOME", 6);
        let (prefix, suffix) = code.split_once('-').unwrap();
        assert_eq!(prefix, "WELCOME");
        assert_eq!(suffix.len(), 6);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  welcome-ab12 "), "WELCOME-AB12");
    }
}
