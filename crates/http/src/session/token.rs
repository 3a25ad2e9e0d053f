//! Reading claims out of access tokens without verifying them

use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    exp: Option<i64>,
}

/// Expiry (seconds since the epoch) of a JWT access token.
///
/// The signature is not checked; only the server can do that. Returns `None`
/// for opaque tokens and for JWTs without an `exp` claim.
pub fn expires_at(token: &str) -> Option<i64> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<ExpiryClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .and_then(|data| data.claims.exp)
}

/// Whether the token is known to be expired at `now_millis`
pub fn is_expired(token: &str, now_millis: i64) -> bool {
    expires_at(token).is_some_and(|exp| exp.saturating_mul(1000) <= now_millis)
}
