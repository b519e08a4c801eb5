pub mod verifier;

use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::config::SecurityConfig;

pub use verifier::{bearer_credential, ActiveUserVerifier, AuthError, IdentityVerifier, JwtVerifier};

/// Caller roles, ordered by privilege: `Member < Admin < SuperAdmin`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Member,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Role::Member),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// The authenticated principal of one request. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerIdentity {
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

impl CallerIdentity {
    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }
}

/// JWT claims accepted on admin requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(identity: &CallerIdentity, ttl: Duration, security: &SecurityConfig) -> Self {
        let now = Utc::now();
        Self {
            sub: identity.user_id.clone(),
            email: Some(identity.email.clone()).filter(|e| !e.is_empty()),
            role: Some(identity.role.as_str().to_string()),
            iss: security.jwt_issuer.clone(),
            aud: security.jwt_audience.clone(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("Invalid JWT secret")]
    InvalidSecret,
}

/// Sign a token for `identity`. Used by the operator CLI and tests.
pub fn issue_token(
    identity: &CallerIdentity,
    ttl: Duration,
    security: &SecurityConfig,
) -> Result<String, JwtError> {
    if security.jwt_secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let claims = Claims::new(identity, ttl, security);
    let encoding_key = EncodingKey::from_secret(security.jwt_secret.as_bytes());

    encode(&Header::default(), &claims, &encoding_key)
        .map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

/// Short, non-reversible tag for a credential, safe to put in logs.
pub fn credential_fingerprint(credential: &str) -> String {
    let digest = Sha256::digest(credential.as_bytes());
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_totally_ordered() {
        assert!(Role::Member < Role::Admin);
        assert!(Role::Admin < Role::SuperAdmin);
        assert_eq!(Role::default(), Role::Member);
    }

    #[test]
    fn role_parses_wire_names() {
        assert_eq!("super_admin".parse::<Role>(), Ok(Role::SuperAdmin));
        assert_eq!(Role::Admin.to_string(), "admin");
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn has_role_compares_against_minimum() {
        let identity = CallerIdentity {
            user_id: "u1".into(),
            email: "a@example.com".into(),
            role: Role::Admin,
        };
        assert!(identity.has_role(Role::Member));
        assert!(identity.has_role(Role::Admin));
        assert!(!identity.has_role(Role::SuperAdmin));
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let a = credential_fingerprint("token-a");
        assert_eq!(a, credential_fingerprint("token-a"));
        assert_ne!(a, credential_fingerprint("token-b"));
        assert_eq!(a.len(), 16);
    }
}
