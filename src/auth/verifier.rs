use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};

use super::{credential_fingerprint, CallerIdentity, Claims, Role};
use crate::config::SecurityConfig;
use crate::database::models::AdminUser;
use crate::database::Collection;

/// Why a credential was refused. Only ever logged; callers see a generic 401.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingCredential,

    #[error("malformed credential: {0}")]
    MalformedCredential(&'static str),

    #[error("credential expired")]
    Expired,

    #[error("credential rejected: {0}")]
    Rejected(String),

    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}

/// Resolves a raw bearer credential to the identity it proves.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<CallerIdentity, AuthError>;
}

/// Extract the bearer credential from the standard Authorization header.
pub fn bearer_credential(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingCredential)?
        .to_str()
        .map_err(|_| AuthError::MalformedCredential("header is not valid ASCII"))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or(AuthError::MalformedCredential("expected 'Bearer <token>'"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MalformedCredential("unsupported authorization scheme"));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::MalformedCredential("empty bearer token"));
    }

    Ok(token)
}

/// HS256 JWT verifier backed by the configured shared secret.
#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(security: &SecurityConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = security.jwt_leeway_secs;
        match &security.jwt_audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = &security.jwt_issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            decoding_key: DecodingKey::from_secret(security.jwt_secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, credential: &str) -> Result<CallerIdentity, AuthError> {
        let token_data = decode::<Claims>(credential, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                    AuthError::MalformedCredential("not a JWT")
                }
                _ => AuthError::Rejected(e.to_string()),
            })?;

        let claims = token_data.claims;
        if claims.sub.trim().is_empty() {
            return Err(AuthError::Rejected("empty subject".to_string()));
        }

        Ok(CallerIdentity {
            role: role_from_claim(claims.role.as_deref(), credential),
            user_id: claims.sub,
            email: claims.email.unwrap_or_default(),
        })
    }
}

/// Checks a verified identity against the managed user records. A subject
/// whose record is disabled is refused, and a stored role lower than the
/// token's claim replaces it. Subjects without a record pass through.
pub struct ActiveUserVerifier<V> {
    inner: V,
    users: Collection<AdminUser>,
}

impl<V: IdentityVerifier> ActiveUserVerifier<V> {
    pub fn new(inner: V, users: Collection<AdminUser>) -> Self {
        Self { inner, users }
    }
}

#[async_trait]
impl<V: IdentityVerifier> IdentityVerifier for ActiveUserVerifier<V> {
    async fn verify(&self, credential: &str) -> Result<CallerIdentity, AuthError> {
        let mut identity = self.inner.verify(credential).await?;

        let user = self
            .users
            .find(&identity.user_id)
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        if let Some(user) = user {
            if user.disabled {
                tracing::warn!(
                    user_id = %identity.user_id,
                    credential = %credential_fingerprint(credential),
                    "credential presented for disabled user"
                );
                return Err(AuthError::Rejected("user is disabled".to_string()));
            }
            if user.role < identity.role {
                tracing::debug!(
                    user_id = %identity.user_id,
                    claimed = %identity.role,
                    stored = %user.role,
                    "role claim exceeds stored role, using stored role"
                );
                identity.role = user.role;
            }
        }

        Ok(identity)
    }
}

/// Absent or unrecognised role claims fall back to the lowest privilege.
fn role_from_claim(claim: Option<&str>, credential: &str) -> Role {
    match claim {
        None => Role::default(),
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(
                role = raw,
                credential = %credential_fingerprint(credential),
                "unrecognised role claim, treating caller as member"
            );
            Role::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::issue_token;
    use crate::config::AppConfig;
    use crate::database::models::collections;
    use crate::database::MemoryStore;
    use axum::http::HeaderValue;
    use std::sync::Arc;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "verifier-test-secret";

    fn security() -> SecurityConfig {
        AppConfig::for_tests(SECRET).security
    }

    fn sign(claims: &serde_json::Value, secret: &str) -> String {
        encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_credential_requires_bearer_scheme() {
        assert!(matches!(bearer_credential(&HeaderMap::new()), Err(AuthError::MissingCredential)));
        assert!(matches!(
            bearer_credential(&headers_with("Basic abc")),
            Err(AuthError::MalformedCredential(_))
        ));
        assert!(matches!(
            bearer_credential(&headers_with("Bearer    ")),
            Err(AuthError::MalformedCredential(_))
        ));
        assert_eq!(bearer_credential(&headers_with("Bearer abc.def")).unwrap(), "abc.def");
        assert_eq!(bearer_credential(&headers_with("bearer abc")).unwrap(), "abc");
    }

    #[tokio::test]
    async fn verifies_issued_token() {
        let identity = CallerIdentity {
            user_id: "user-1".into(),
            email: "root@example.com".into(),
            role: Role::SuperAdmin,
        };
        let token = issue_token(&identity, Duration::hours(1), &security()).unwrap();

        let verified = JwtVerifier::new(&security()).verify(&token).await.unwrap();
        assert_eq!(verified, identity);
    }

    #[tokio::test]
    async fn missing_role_claim_defaults_to_member() {
        let now = Utc::now().timestamp();
        let token = sign(
            &serde_json::json!({ "sub": "u2", "email": "m@example.com", "iat": now, "exp": now + 600 }),
            SECRET,
        );

        let verified = JwtVerifier::new(&security()).verify(&token).await.unwrap();
        assert_eq!(verified.role, Role::Member);
        assert_eq!(verified.email, "m@example.com");
    }

    #[tokio::test]
    async fn unknown_role_claim_defaults_to_member() {
        let now = Utc::now().timestamp();
        let token = sign(
            &serde_json::json!({ "sub": "u3", "role": "owner", "iat": now, "exp": now + 600 }),
            SECRET,
        );

        let verified = JwtVerifier::new(&security()).verify(&token).await.unwrap();
        assert_eq!(verified.role, Role::Member);
    }

    #[tokio::test]
    async fn rejects_bad_signature() {
        let now = Utc::now().timestamp();
        let token = sign(
            &serde_json::json!({ "sub": "u4", "role": "super_admin", "iat": now, "exp": now + 600 }),
            "some-other-secret",
        );

        let err = JwtVerifier::new(&security()).verify(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected(_)));
    }

    #[tokio::test]
    async fn rejects_expired_token() {
        let now = Utc::now().timestamp();
        let token = sign(
            &serde_json::json!({ "sub": "u5", "iat": now - 7200, "exp": now - 3600 }),
            SECRET,
        );

        let err = JwtVerifier::new(&security()).verify(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::Expired));
    }

    fn user(user_id: &str, role: Role, disabled: bool) -> AdminUser {
        AdminUser {
            user_id: user_id.into(),
            email: format!("{user_id}@example.com"),
            display_name: None,
            role,
            team_id: None,
            disabled,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn active_user_verifier(users: &[AdminUser]) -> ActiveUserVerifier<JwtVerifier> {
        let collection = Collection::new(collections::USERS, Arc::new(MemoryStore::new()));
        for record in users {
            collection.create(&record.user_id, record).await.unwrap();
        }
        ActiveUserVerifier::new(JwtVerifier::new(&security()), collection)
    }

    fn token_for(user_id: &str, role: Role) -> String {
        let identity = CallerIdentity { user_id: user_id.into(), email: String::new(), role };
        issue_token(&identity, Duration::hours(1), &security()).unwrap()
    }

    #[tokio::test]
    async fn disabled_user_is_refused() {
        let verifier = active_user_verifier(&[user("u6", Role::SuperAdmin, true)]).await;
        let err = verifier.verify(&token_for("u6", Role::SuperAdmin)).await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected(_)));
    }

    #[tokio::test]
    async fn stored_role_caps_claimed_role() {
        let verifier = active_user_verifier(&[user("u7", Role::Member, false)]).await;
        let verified = verifier.verify(&token_for("u7", Role::SuperAdmin)).await.unwrap();
        assert_eq!(verified.role, Role::Member);
    }

    #[tokio::test]
    async fn subjects_without_a_record_pass_through() {
        let verifier = active_user_verifier(&[user("u8", Role::Admin, false)]).await;
        let verified = verifier.verify(&token_for("root", Role::SuperAdmin)).await.unwrap();
        assert_eq!(verified.role, Role::SuperAdmin);

        let verified = verifier.verify(&token_for("u8", Role::Member)).await.unwrap();
        assert_eq!(verified.role, Role::Member);
    }

    #[tokio::test]
    async fn rejects_garbage() {
        let err = JwtVerifier::new(&security()).verify("not-a-token").await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedCredential(_)));
    }
}
