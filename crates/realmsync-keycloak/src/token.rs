//! Session token handling.
//!
//! A session token is the token endpoint response, kept as an opaque JSON
//! blob in the object store so a restarted engine can reuse it. Only the
//! `exp` claim of the access token is ever inspected; signatures are the
//! server's business.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{ApiError, ApiResult};

/// Tokens within this window of their expiry are treated as expired.
pub const EXPIRY_LEEWAY: Duration = Duration::from_secs(30);

/// Token endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_expires_in: i64,
    #[serde(default)]
    pub token_type: String,
}

impl SessionToken {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_in: 0,
            refresh_expires_in: 0,
            token_type: "Bearer".to_string(),
        }
    }

    /// Serializes the token into the blob stored in the token secret.
    pub fn to_blob(&self) -> ApiResult<String> {
        serde_json::to_string(self).map_err(|e| ApiError::InvalidToken(e.to_string()))
    }

    pub fn from_blob(blob: &str) -> ApiResult<Self> {
        serde_json::from_str(blob).map_err(|e| ApiError::InvalidToken(e.to_string()))
    }

    /// Expiry decoded from the access token's `exp` claim.
    pub fn expires_at(&self) -> ApiResult<OffsetDateTime> {
        decode_expiry(&self.access_token)
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> ApiResult<bool> {
        Ok(self.expires_at()? - EXPIRY_LEEWAY <= now)
    }

    pub fn is_expired(&self) -> ApiResult<bool> {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    /// Fails with [`ApiError::TokenExpired`] for an expired token.
    pub fn ensure_valid(&self) -> ApiResult<()> {
        if self.is_expired()? {
            return Err(ApiError::TokenExpired);
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: i64,
}

/// Reads the `exp` claim of a JWT without verifying it.
pub fn decode_expiry(jwt: &str) -> ApiResult<OffsetDateTime> {
    let payload = jwt
        .split('.')
        .nth(1)
        .ok_or_else(|| ApiError::InvalidToken("token is not a JWT".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ApiError::InvalidToken(format!("payload is not base64url: {e}")))?;
    let claim: ExpiryClaim = serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::InvalidToken(format!("payload has no exp claim: {e}")))?;
    OffsetDateTime::from_unix_timestamp(claim.exp)
        .map_err(|e| ApiError::InvalidToken(format!("exp out of range: {e}")))
}

/// Builds an unsigned JWT carrying only an `exp` claim.
#[cfg(any(test, feature = "testing"))]
pub fn unsigned_jwt(expires_at: OffsetDateTime) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{}}}"#, expires_at.unix_timestamp()));
    format!("{header}.{payload}.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_expiry() {
        let exp = OffsetDateTime::from_unix_timestamp(1_900_000_000).unwrap();
        let token = SessionToken::bearer(unsigned_jwt(exp));
        assert_eq!(token.expires_at().unwrap(), exp);
    }

    #[test]
    fn test_leeway_counts_as_expired() {
        let now = OffsetDateTime::now_utc();
        let almost = SessionToken::bearer(unsigned_jwt(now + Duration::from_secs(10)));
        assert!(almost.is_expired_at(now).unwrap());

        let fresh = SessionToken::bearer(unsigned_jwt(now + Duration::from_secs(300)));
        assert!(!fresh.is_expired_at(now).unwrap());
        assert!(fresh.ensure_valid().is_ok());
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(matches!(
            decode_expiry("opaque"),
            Err(ApiError::InvalidToken(_))
        ));
        assert!(matches!(
            decode_expiry("a.!!!.c"),
            Err(ApiError::InvalidToken(_))
        ));
        let no_exp = format!("x.{}.y", URL_SAFE_NO_PAD.encode(br#"{"sub":"admin"}"#));
        assert!(matches!(
            decode_expiry(&no_exp),
            Err(ApiError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_blob_round_trip() {
        let token = SessionToken {
            access_token: "abc".to_string(),
            refresh_token: Some("def".to_string()),
            expires_in: 60,
            refresh_expires_in: 1800,
            token_type: "Bearer".to_string(),
        };
        let blob = token.to_blob().unwrap();
        assert_eq!(SessionToken::from_blob(&blob).unwrap(), token);
        assert!(SessionToken::from_blob("not json").is_err());
    }
}
