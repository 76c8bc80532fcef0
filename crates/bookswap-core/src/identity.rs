// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Identity provider contract and the JWT implementation.
//!
//! The web layer only needs one thing from authentication: turn an opaque token
//! into `(user_id, role)`. Issuing tokens lives here too so that login flows and
//! tests share the same signing key handling.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Role attached to an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Regular member.
    User,
    /// Staff member with access to moderation.
    Admin,
}

impl Role {
    /// Database / token representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Self::User),
            "ADMIN" => Ok(Self::Admin),
            other => Err(AuthError::Invalid(format!("unknown role '{}'", other))),
        }
    }
}

/// Authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    /// User id the token was issued for.
    pub user_id: i64,
    /// Role at issue time.
    pub role: Role,
}

impl Identity {
    /// Whether this identity may use the admin surface.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Token handling errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No token was presented.
    #[error("missing access token")]
    Missing,

    /// The token is malformed or its signature does not verify.
    #[error("invalid access token: {0}")]
    Invalid(String),

    /// The token was valid but has expired.
    #[error("access token expired")]
    Expired,

    /// Signing a new token failed.
    #[error("failed to issue token: {0}")]
    Issue(String),
}

/// Decodes (and issues) access tokens.
pub trait IdentityProvider: Send + Sync {
    /// Validate `token` and return the identity it carries.
    fn decode(&self, token: &str) -> Result<Identity, AuthError>;

    /// Sign a token for `identity`.
    fn issue(&self, identity: Identity) -> Result<String, AuthError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    user_id: i64,
    role: Role,
    exp: i64,
}

/// HS256 JWT identity provider.
pub struct JwtIdentityProvider {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtIdentityProvider {
    /// Create a provider signing with `secret`; issued tokens live for `ttl`.
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            ttl,
        }
    }
}

impl IdentityProvider for JwtIdentityProvider {
    fn decode(&self, token: &str) -> Result<Identity, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(e.to_string()),
            }
        })?;

        Ok(Identity {
            user_id: data.claims.user_id,
            role: data.claims.role,
        })
    }

    fn issue(&self, identity: Identity) -> Result<String, AuthError> {
        let claims = Claims {
            user_id: identity.user_id,
            role: identity.role,
            exp: (Utc::now() + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Issue(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> JwtIdentityProvider {
        JwtIdentityProvider::new(b"test-secret", Duration::hours(1))
    }

    #[test]
    fn test_issue_then_decode() {
        let p = provider();
        let identity = Identity {
            user_id: 7,
            role: Role::Admin,
        };

        let token = p.issue(identity).unwrap();
        let decoded = p.decode(&token).unwrap();

        assert_eq!(decoded, identity);
        assert!(decoded.is_admin());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = provider()
            .issue(Identity {
                user_id: 1,
                role: Role::User,
            })
            .unwrap();
        let other = JwtIdentityProvider::new(b"other-secret", Duration::hours(1));

        assert!(matches!(other.decode(&token), Err(AuthError::Invalid(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let p = JwtIdentityProvider::new(b"test-secret", Duration::hours(-2));
        let token = p
            .issue(Identity {
                user_id: 1,
                role: Role::User,
            })
            .unwrap();

        assert_eq!(p.decode(&token), Err(AuthError::Expired));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            provider().decode("not-a-token"),
            Err(AuthError::Invalid(_))
        ));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("USER".parse::<Role>().unwrap(), Role::User);
        assert!("admin".parse::<Role>().is_err());
    }
}
