//! Referral codes and links.

use yalls_types::UserId;

const CODE_LEN: usize = 8;

/// Shareable referral code: the first eight characters of the user id, upper-cased.
pub fn referral_code(user: &UserId) -> String {
    user.as_str()
        .chars()
        .take(CODE_LEN)
        .collect::<String>()
        .to_uppercase()
}

/// Sign-up link carrying a referral code.
pub fn referral_link(base_url: &str, code: &str) -> String {
    format!("{}/login?ref={}", base_url.trim_end_matches('/'), code)
}
