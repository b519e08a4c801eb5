use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::app::AppState;
use crate::audit::AuditRecordInput;
use crate::auth::{bearer_credential, CallerIdentity, IdentityVerifier, Role};
use crate::error::AppError;

/// Authorization requirement attached to a route when it is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Any caller with a valid credential.
    Authenticated,
    /// Callers whose role is at least the given one.
    AtLeast(Role),
}

impl Policy {
    pub fn check(&self, identity: &CallerIdentity) -> Result<(), AppError> {
        match self {
            Policy::Authenticated => Ok(()),
            Policy::AtLeast(required) if identity.has_role(*required) => Ok(()),
            Policy::AtLeast(required) => Err(AppError::Forbidden {
                required: *required,
                actual: identity.role,
            }),
        }
    }
}

/// Verifies the caller and enforces one route's policy before its handler runs.
#[derive(Clone)]
pub struct Gate {
    verifier: Arc<dyn IdentityVerifier>,
    policy: Policy,
}

impl Gate {
    pub fn new(verifier: Arc<dyn IdentityVerifier>, policy: Policy) -> Self {
        Self { verifier, policy }
    }

    /// Resolve the caller and check the policy, without running anything else.
    pub async fn admit(&self, headers: &HeaderMap) -> Result<CallerIdentity, AppError> {
        let credential = bearer_credential(headers)?;
        let identity = self.verifier.verify(credential).await?;
        self.policy.check(&identity)?;
        Ok(identity)
    }

    /// Run `handler` with the verified identity, or reject without running it.
    pub async fn authorize<F, Fut, R>(&self, headers: &HeaderMap, handler: F) -> Response
    where
        F: FnOnce(CallerIdentity) -> Fut,
        Fut: Future<Output = R>,
        R: IntoResponse,
    {
        match self.admit(headers).await {
            Ok(identity) => handler(identity).await.into_response(),
            Err(rejection) => rejection.into_response(),
        }
    }
}

/// Axum middleware form of [`Gate::authorize`]. The verified identity rides
/// along in the request extensions for the [`Caller`] extractor.
pub async fn gate_layer(State(gate): State<Gate>, request: Request, next: Next) -> Response {
    let headers = request.headers().clone();
    gate.authorize(&headers, move |identity| async move {
        let mut request = request;
        request.extensions_mut().insert(identity);
        next.run(request).await
    })
    .await
}

/// The verified caller of the current request, plus where the request came from.
///
/// Only populated by [`gate_layer`]; extraction fails closed with a 401 when
/// the gate did not run. Forwarding headers are only believed when
/// `security.trust_proxy_headers` is set; otherwise the peer address is used.
#[derive(Debug, Clone)]
pub struct Caller {
    pub identity: CallerIdentity,
    pub ip_address: Option<String>,
}

impl Caller {
    /// Start an audit entry attributed to this caller.
    pub fn audit(
        &self,
        action: impl Into<String>,
        resource: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> AuditRecordInput {
        AuditRecordInput::new(
            &self.identity.user_id,
            &self.identity.email,
            action,
            resource,
            resource_id,
        )
        .ip_address(self.ip_address.clone())
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let identity = parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or(AppError::Unauthenticated)?;

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        Ok(Caller {
            identity,
            ip_address: client_ip(&parts.headers, peer, state.config.security.trust_proxy_headers),
        })
    }
}

fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust_forwarded: bool) -> Option<String> {
    let peer = peer.map(|ip| ip.to_string());
    if !trust_forwarded {
        return peer;
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .map(str::to_string)
        .or(peer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthError;
    use axum::http::{header, HeaderValue, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts tokens of the form `<role>:<user>`.
    struct StubVerifier;

    #[async_trait]
    impl IdentityVerifier for StubVerifier {
        async fn verify(&self, credential: &str) -> Result<CallerIdentity, AuthError> {
            let (role, user) = credential
                .split_once(':')
                .ok_or(AuthError::Rejected("bad stub token".into()))?;
            Ok(CallerIdentity {
                user_id: user.to_string(),
                email: format!("{user}@example.com"),
                role: role.parse().map_err(|_| AuthError::Rejected("bad role".into()))?,
            })
        }
    }

    fn gate(policy: Policy) -> Gate {
        Gate::new(Arc::new(StubVerifier), policy)
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
        headers
    }

    async fn run(gate: &Gate, headers: &HeaderMap, calls: &AtomicUsize) -> (StatusCode, Option<CallerIdentity>) {
        let seen = std::sync::Mutex::new(None);
        let response = gate
            .authorize(headers, |identity| async {
                calls.fetch_add(1, Ordering::SeqCst);
                *seen.lock().unwrap() = Some(identity);
                StatusCode::OK
            })
            .await;
        let identity = seen.lock().unwrap().clone();
        (response.status(), identity)
    }

    #[tokio::test]
    async fn missing_credential_is_401_and_handler_not_called() {
        let calls = AtomicUsize::new(0);
        let (status, _) = run(&gate(Policy::Authenticated), &HeaderMap::new(), &calls).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_credential_is_401_and_handler_not_called() {
        let calls = AtomicUsize::new(0);
        let (status, _) = run(&gate(Policy::AtLeast(Role::Member)), &bearer("garbage"), &calls).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn insufficient_role_is_403_and_handler_not_called() {
        let calls = AtomicUsize::new(0);
        let gate = gate(Policy::AtLeast(Role::SuperAdmin));
        for token in ["member:m1", "admin:a1"] {
            let (status, _) = run(&gate, &bearer(token), &calls).await;
            assert_eq!(status, StatusCode::FORBIDDEN);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sufficient_role_calls_handler_once_with_identity() {
        let calls = AtomicUsize::new(0);
        let (status, identity) = run(&gate(Policy::AtLeast(Role::Admin)), &bearer("super_admin:root"), &calls).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let identity = identity.unwrap();
        assert_eq!(identity.user_id, "root");
        assert_eq!(identity.role, Role::SuperAdmin);
    }

    #[tokio::test]
    async fn authenticated_policy_admits_members() {
        let calls = AtomicUsize::new(0);
        let (status, _) = run(&gate(Policy::Authenticated), &bearer("member:m2"), &calls).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    fn forwarded_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        headers
    }

    #[test]
    fn client_ip_ignores_forwarding_headers_by_default() {
        let peer: IpAddr = "192.0.2.10".parse().unwrap();
        assert_eq!(client_ip(&forwarded_headers(), Some(peer), false).as_deref(), Some("192.0.2.10"));
        assert_eq!(client_ip(&forwarded_headers(), None, false), None);
    }

    #[test]
    fn trusted_proxy_headers_prefer_first_forwarded_hop() {
        let peer: IpAddr = "192.0.2.10".parse().unwrap();
        let mut headers = forwarded_headers();
        assert_eq!(client_ip(&headers, Some(peer), true).as_deref(), Some("203.0.113.7"));

        headers.remove("x-forwarded-for");
        assert_eq!(client_ip(&headers, Some(peer), true).as_deref(), Some("10.0.0.2"));

        headers.remove("x-real-ip");
        assert_eq!(client_ip(&headers, Some(peer), true).as_deref(), Some("192.0.2.10"));
    }
}
