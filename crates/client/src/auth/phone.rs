//! Input sanitising for the login form.

/// Country prefix for the only market in scope (Malaysia).
pub const COUNTRY_PREFIX: &str = "60";
pub const MAX_PHONE_DIGITS: usize = 11;
pub const OTP_LENGTH: usize = 6;

/// Normalises free-form input to a country-prefixed digit string.
///
/// Non-digits are dropped, a leading trunk `0` becomes `60`, anything not
/// already prefixed gets `60` in front, and the result is capped at
/// [`MAX_PHONE_DIGITS`]. The function is idempotent.
pub fn normalize_phone(input: &str) -> String {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();

    let prefixed = if digits.is_empty() || digits.starts_with(COUNTRY_PREFIX) {
        digits
    } else if let Some(rest) = digits.strip_prefix('0') {
        format!("{COUNTRY_PREFIX}{rest}")
    } else {
        format!("{COUNTRY_PREFIX}{digits}")
    };

    prefixed.chars().take(MAX_PHONE_DIGITS).collect()
}

/// Whether a normalised number is complete enough to request a code for.
pub fn is_valid_phone(normalized: &str) -> bool {
    normalized.starts_with(COUNTRY_PREFIX)
        && (10..=MAX_PHONE_DIGITS).contains(&normalized.len())
        && normalized.chars().all(|c| c.is_ascii_digit())
}

/// Keeps at most [`OTP_LENGTH`] digits.
pub fn sanitize_otp(input: &str) -> String {
    input
        .chars()
        .filter(char::is_ascii_digit)
        .take(OTP_LENGTH)
        .collect()
}

pub fn is_complete_otp(code: &str) -> bool {
    code.len() == OTP_LENGTH && code.chars().all(|c| c.is_ascii_digit())
}
