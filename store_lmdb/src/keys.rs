//! Composite key layouts.
//!
//! Per-user keys start with `user ‖ 0x00`. User ids never contain NUL, so
//! `[user ‖ 0x00, user ‖ 0x01)` bounds exactly one user's entries, and the
//! big-endian timestamp that follows sorts them chronologically.

use yalls_types::{IdempotencyKey, PayoutId, ResidualId, Timestamp, UserId};

const SEPARATOR: u8 = 0x00;

fn user_prefix(user: &UserId, extra: usize) -> Vec<u8> {
    let raw = user.as_str().as_bytes();
    let mut key = Vec::with_capacity(raw.len() + 1 + extra);
    key.extend_from_slice(raw);
    key.push(SEPARATOR);
    key
}

/// Inclusive lower and exclusive upper bound over all of `user`'s keys.
pub fn user_range(user: &UserId) -> (Vec<u8>, Vec<u8>) {
    let lower = user_prefix(user, 0);
    let mut upper = lower.clone();
    if let Some(last) = upper.last_mut() {
        *last = SEPARATOR + 1;
    }
    (lower, upper)
}

/// `user ‖ 0x00 ‖ created_be ‖ payout_id`
pub fn payout_index_key(user: &UserId, created_at: Timestamp, id: &PayoutId) -> Vec<u8> {
    let mut key = user_prefix(user, 8 + 16);
    key.extend_from_slice(&created_at.to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

/// `user ‖ 0x00 ‖ idempotency_key`
pub fn idempotency_key(user: &UserId, token: &IdempotencyKey) -> Vec<u8> {
    let raw = token.as_str().as_bytes();
    let mut key = user_prefix(user, raw.len());
    key.extend_from_slice(raw);
    key
}

/// `earner ‖ 0x00 ‖ created_be ‖ residual_id`
pub fn residual_key(earner: &UserId, created_at: Timestamp, id: &ResidualId) -> Vec<u8> {
    let mut key = user_prefix(earner, 8 + 16);
    key.extend_from_slice(&created_at.to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

/// `referrer ‖ 0x00 ‖ enrolled_be ‖ user`
pub fn referral_index_key(referrer: &UserId, enrolled_at: Timestamp, user: &UserId) -> Vec<u8> {
    let raw = user.as_str().as_bytes();
    let mut key = user_prefix(referrer, 8 + raw.len());
    key.extend_from_slice(&enrolled_at.to_be_bytes());
    key.extend_from_slice(raw);
    key
}
