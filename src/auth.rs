//! Signed, time-limited bearer tokens for backend calls.
//!
//! A token is `<payload>.<signature>` where the payload is the URL-safe base64
//! of the JSON [`Claims`] and the signature is HMAC-SHA256 over the payload,
//! keyed with the node secret.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::models::{Node, NodeKeys};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Token signature does not match")]
    BadSignature,

    #[error("Token was issued for key {0}")]
    WrongKey(String),

    #[error("Token expired at {0}")]
    Expired(DateTime<Utc>),
}

/// What a backend token asserts about the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub key_id: String,
    pub project: String,
    pub stage: String,
    /// Issued at, unix seconds.
    pub iat: i64,
    /// Expires at, unix seconds.
    pub exp: i64,
}

impl Node {
    /// Sign a token for `project`/`stage` valid for `ttl` from `now`.
    pub fn issue_token(&self, project: &str, stage: &str, ttl: Duration, now: DateTime<Utc>) -> String {
        let claims = Claims {
            key_id: self.keys.key_id.clone(),
            project: project.to_string(),
            stage: stage.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        sign(&self.keys, &claims)
    }
}

pub fn sign(keys: &NodeKeys, claims: &Claims) -> String {
    // Serializing a plain struct of strings and integers cannot fail.
    let json = serde_json::to_vec(claims).unwrap_or_default();
    let payload = URL_SAFE_NO_PAD.encode(json);
    let signature = hex::encode(mac(keys, payload.as_bytes()).finalize().into_bytes());
    format!("{}.{}", payload, signature)
}

/// Verify a token against the node keys at time `now`.
pub fn verify(keys: &NodeKeys, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
    let (payload, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;
    let signature = hex::decode(signature).map_err(|_| TokenError::Malformed)?;
    mac(keys, payload.as_bytes())
        .verify_slice(&signature)
        .map_err(|_| TokenError::BadSignature)?;

    let json = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| TokenError::Malformed)?;
    let claims: Claims = serde_json::from_slice(&json).map_err(|_| TokenError::Malformed)?;
    if claims.key_id != keys.key_id {
        return Err(TokenError::WrongKey(claims.key_id));
    }
    if now.timestamp() >= claims.exp {
        let expired_at = DateTime::from_timestamp(claims.exp, 0).unwrap_or(now);
        return Err(TokenError::Expired(expired_at));
    }
    Ok(claims)
}

fn mac(keys: &NodeKeys, message: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(keys.secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC takes keys of any size"));
    mac.update(message);
    mac
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> Node {
        Node {
            name: "main".into(),
            id: "abc1234".into(),
            account_id: "123456789012".into(),
            region: "eu-central-1".into(),
            bucket: "artifacts".into(),
            endpoint: "http://localhost".into(),
            keys: NodeKeys::generate(),
            default: true,
        }
    }

    #[test]
    fn test_hmac_known_vector() {
        // RFC 4231 test case 2
        let keys = NodeKeys {
            key_id: "k".into(),
            secret: "Jefe".into(),
        };
        let mac = mac(&keys, b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(mac.finalize().into_bytes()),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_forged_signature_is_rejected() {
        let node = node();
        let token = node.issue_token("shop", "dev", Duration::seconds(60), Utc::now());
        let (payload, signature) = token.split_once('.').expect("token has a signature");

        let mut forged = signature.to_string();
        let last = if forged.ends_with('0') { "1" } else { "0" };
        forged.replace_range(forged.len() - 1.., last);
        assert_eq!(
            verify(&node.keys, &format!("{}.{}", payload, forged), Utc::now()),
            Err(TokenError::BadSignature)
        );
        assert_eq!(
            verify(&node.keys, &format!("{}.not-hex", payload), Utc::now()),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn test_issue_and_verify() {
        let node = node();
        let now = Utc::now();
        let token = node.issue_token("shop", "dev", Duration::seconds(60), now);
        let claims = verify(&node.keys, &token, now).expect("token should verify");
        assert_eq!(claims.project, "shop");
        assert_eq!(claims.stage, "dev");
    }

    #[test]
    fn test_expired_token() {
        let node = node();
        let now = Utc::now();
        let token = node.issue_token("shop", "dev", Duration::seconds(60), now);
        let later = now + Duration::seconds(61);
        assert!(matches!(
            verify(&node.keys, &token, later),
            Err(TokenError::Expired(_))
        ));
    }

    #[test]
    fn test_tampered_token() {
        let node = node();
        let token = node.issue_token("shop", "dev", Duration::seconds(60), Utc::now());
        let other = NodeKeys::generate();
        assert_eq!(
            verify(&other, &token, Utc::now()),
            Err(TokenError::BadSignature)
        );
    }
}
