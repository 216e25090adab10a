//! One-time e-mail codes

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// Number of digits in a code
pub const OTP_LENGTH: usize = 6;

/// Random zero-padded numeric code
pub fn generate_code() -> String {
    generate_code_with(&mut rand::rng())
}

pub fn generate_code_with<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{:06}", rng.random_range(0..1_000_000u32))
}

/// Expiry instant for a code issued at `now`
pub fn expires_at(now: DateTime<Utc>, ttl_minutes: i64) -> DateTime<Utc> {
    now + Duration::minutes(ttl_minutes)
}

/// Compare a submitted code without short-circuiting on the first mismatch
pub fn codes_match(expected: &str, submitted: &str) -> bool {
    let submitted = submitted.trim();
    if expected.len() != submitted.len() {
        return false;
    }
    expected
        .bytes()
        .zip(submitted.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_codes_match() {
        assert!(codes_match("042917", "042917"));
        assert!(codes_match("042917", " 042917 "));
        assert!(!codes_match("042917", "042918"));
        assert!(!codes_match("042917", "42917"));
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        assert_eq!(expires_at(now, 10) - now, Duration::minutes(10));
    }

    proptest! {
        #[test]
        fn prop_codes_are_six_digits(_seed in 0u8..32) {
            let code = generate_code();
            prop_assert_eq!(code.len(), OTP_LENGTH);
            prop_assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
