use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dashboard::Session;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("Token has an empty subject")]
    EmptySubject,

    #[error("Token subject {0:?} is not a valid user id")]
    InvalidSubject(String),

    #[error("Token lifetime of {0} hours is out of range")]
    InvalidTtl(u64),
}

/// Issues and verifies session tokens with a shared secret
#[derive(Clone)]
pub struct TokenVerifier {
    secret: String,
}

impl TokenVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn issue(&self, uid: &str, email: Option<&str>, ttl_hours: u64) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = i64::try_from(ttl_hours)
            .ok()
            .and_then(Duration::try_hours)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or(AuthError::InvalidTtl(ttl_hours))?;

        let claims = Claims {
            sub: uid.to_string(),
            email: email.map(str::to_string),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_ref()),
        )?)
    }

    pub fn claims(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_ref()),
            &Validation::default(),
        )?;
        Ok(data.claims)
    }

    /// Verify a token and turn it into a dashboard session
    pub fn verify(&self, token: &str) -> Result<Session, AuthError> {
        let claims = self.claims(token)?;
        if claims.sub.trim().is_empty() {
            return Err(AuthError::EmptySubject);
        }
        // The uid becomes a storage path segment
        if claims.sub.contains('/') {
            return Err(AuthError::InvalidSubject(claims.sub));
        }
        Ok(Session {
            uid: claims.sub,
            email: claims.email,
        })
    }

    /// Verify the value of an `Authorization: Bearer ...` header
    pub fn verify_bearer(&self, header: Option<&str>) -> Result<Session, AuthError> {
        let token = header
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;
        self.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key";

    #[test]
    fn test_issue_and_verify() {
        let verifier = TokenVerifier::new(SECRET);
        let token = verifier.issue("u1", Some("me@example.com"), 24).unwrap();

        let session = verifier.verify(&token).unwrap();
        assert_eq!(session.uid, "u1");
        assert_eq!(session.email.as_deref(), Some("me@example.com"));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = TokenVerifier::new(SECRET).issue("u1", None, 24).unwrap();
        let result = TokenVerifier::new("wrong-secret").verify(&token);
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let now = Utc::now();
        let claims = Claims {
            sub: "u1".to_string(),
            email: None,
            exp: (now - Duration::hours(1)).timestamp(),
            iat: (now - Duration::hours(2)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_ref()),
        )
        .unwrap();

        assert!(TokenVerifier::new(SECRET).verify(&token).is_err());
    }

    #[test]
    fn test_empty_subject_rejected() {
        let verifier = TokenVerifier::new(SECRET);
        let token = verifier.issue("  ", None, 1).unwrap();
        assert!(matches!(verifier.verify(&token), Err(AuthError::EmptySubject)));
    }

    #[test]
    fn test_subject_with_slash_rejected() {
        let verifier = TokenVerifier::new(SECRET);
        let token = verifier.issue("a/", None, 1).unwrap();
        assert!(matches!(
            verifier.verify(&token),
            Err(AuthError::InvalidSubject(sub)) if sub == "a/"
        ));
    }

    #[test]
    fn test_huge_ttl_is_an_error() {
        let verifier = TokenVerifier::new(SECRET);
        for ttl in [u64::MAX, i64::MAX as u64, 1 << 40] {
            assert!(matches!(
                verifier.issue("u1", None, ttl),
                Err(AuthError::InvalidTtl(t)) if t == ttl
            ));
        }
        assert!(verifier.issue("u1", None, 24 * 365).is_ok());
    }

    #[test]
    fn test_bearer_header() {
        let verifier = TokenVerifier::new(SECRET);
        let token = verifier.issue("u1", None, 1).unwrap();

        let header = format!("Bearer {}", token);
        assert_eq!(verifier.verify_bearer(Some(&header)).unwrap().uid, "u1");
        assert!(matches!(verifier.verify_bearer(None), Err(AuthError::MissingToken)));
        assert!(matches!(
            verifier.verify_bearer(Some(&token)),
            Err(AuthError::MissingToken)
        ));
    }
}
