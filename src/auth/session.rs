//! Sessions, session-change events, and the JWT token format used by the
//! in-memory auth service.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{errors::Error, types::UserId};

/// Proof of authenticated identity issued by the auth service.
///
/// The access token is opaque to the gate; its lifecycle is owned by the
/// auth service. No session means anonymous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user_id: UserId,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

/// Session lifecycle notification emitted by the auth service.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    SignedIn(Session),
    /// Token refresh. Carries the replacement session; the user identifier
    /// is unchanged from the session being refreshed.
    TokenRefreshed(Session),
    SignedOut { access_token: String, user_id: UserId },
}

impl SessionEvent {
    /// The access token this event refers to.
    pub fn access_token(&self) -> &str {
        match self {
            SessionEvent::SignedIn(s) | SessionEvent::TokenRefreshed(s) => &s.access_token,
            SessionEvent::SignedOut { access_token, .. } => access_token,
        }
    }

    pub fn user_id(&self) -> UserId {
        match self {
            SessionEvent::SignedIn(s) | SessionEvent::TokenRefreshed(s) => s.user_id,
            SessionEvent::SignedOut { user_id, .. } => *user_id,
        }
    }

    /// The session carried by the event, if any (sign-out carries none).
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionEvent::SignedIn(s) | SessionEvent::TokenRefreshed(s) => Some(s),
            SessionEvent::SignedOut { .. } => None,
        }
    }
}

/// JWT session claims
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: UserId,   // Subject (user ID)
    pub email: String, // User email
    pub exp: i64,      // Expiration time
    pub iat: i64,      // Issued at
}

/// Create a JWT access token for a user session
pub fn create_session_token(user_id: UserId, email: &str, secret_key: &str, ttl: std::time::Duration) -> Result<String, Error> {
    let now = Utc::now();
    let claims = SessionClaims {
        sub: user_id,
        email: email.to_string(),
        exp: (now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(24))).timestamp(),
        iat: now.timestamp(),
    };

    let key = EncodingKey::from_secret(secret_key.as_bytes());
    encode(&Header::default(), &claims, &key).map_err(|e| Error::Internal {
        operation: format!("create JWT: {e}"),
    })
}

/// Verify and decode a JWT access token, reconstructing the session it proves
pub fn verify_session_token(token: &str, secret_key: &str) -> Result<Session, Error> {
    let key = DecodingKey::from_secret(secret_key.as_bytes());
    let validation = Validation::default();

    let token_data = decode::<SessionClaims>(token, &key, &validation).map_err(|e| match e.kind() {
        // Client errors (401) - malformed tokens, invalid claims, expired tokens
        jsonwebtoken::errors::ErrorKind::InvalidToken
        | jsonwebtoken::errors::ErrorKind::InvalidSignature
        | jsonwebtoken::errors::ErrorKind::ExpiredSignature
        | jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(_)
        | jsonwebtoken::errors::ErrorKind::ImmatureSignature
        | jsonwebtoken::errors::ErrorKind::Base64(_)
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => Error::Unauthenticated { message: None },

        // Server errors (500) - key issues, internal failures
        _ => Error::Internal {
            operation: format!("JWT verification: {e}"),
        },
    })?;

    let claims = token_data.claims;
    Ok(Session {
        access_token: token.to_string(),
        user_id: claims.sub,
        email: claims.email,
        expires_at: Utc.timestamp_opt(claims.exp, 0).single().unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    const SECRET: &str = "test-secret-key-for-jwt";

    #[test]
    fn test_create_and_verify_session_token() {
        let user_id = Uuid::new_v4();
        let token = create_session_token(user_id, "test@example.com", SECRET, Duration::from_secs(3600)).unwrap();
        assert!(!token.is_empty());

        let session = verify_session_token(&token, SECRET).unwrap();
        assert_eq!(session.user_id, user_id);
        assert_eq!(session.email, "test@example.com");
        assert_eq!(session.access_token, token);
        assert!(session.expires_at > Utc::now());
    }

    #[test]
    fn test_verify_token_wrong_secret() {
        let token = create_session_token(Uuid::new_v4(), "a@b.c", SECRET, Duration::from_secs(3600)).unwrap();
        let result = verify_session_token(&token, "different-secret");
        assert!(matches!(result.unwrap_err(), Error::Unauthenticated { .. }));
    }

    #[test]
    fn test_verify_expired_token() {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: Uuid::new_v4(),
            email: "a@b.c".to_string(),
            exp: (now - chrono::Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
        };
        let key = EncodingKey::from_secret(SECRET.as_bytes());
        let token = encode(&Header::default(), &claims, &key).unwrap();

        let result = verify_session_token(&token, SECRET);
        assert!(matches!(result.unwrap_err(), Error::Unauthenticated { .. }));
    }

    #[test]
    fn test_verify_malformed_token() {
        for token in ["not.a.token", "invalid", "", "too.many.parts.in.this.token"] {
            let result = verify_session_token(token, SECRET);
            assert!(
                matches!(result.unwrap_err(), Error::Unauthenticated { .. }),
                "Expected Unauthenticated error for token: {}",
                token
            );
        }
    }

    #[test]
    fn test_signed_out_event_accessors() {
        let user_id = Uuid::new_v4();
        let event = SessionEvent::SignedOut {
            access_token: "tok".to_string(),
            user_id,
        };
        assert_eq!(event.access_token(), "tok");
        assert_eq!(event.user_id(), user_id);
        assert!(event.session().is_none());
    }
}
