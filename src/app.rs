use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::Response,
    routing::{get, MethodRouter},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::audit::AuditRecorder;
use crate::auth::{ActiveUserVerifier, IdentityVerifier, JwtVerifier};
use crate::config::{AppConfig, SecurityConfig};
use crate::database::models::{collections, AdminUser, FeatureFlag, Settings, Team};
use crate::database::{AuditStore, Collection, DocumentStore, MemoryStore};
use crate::handlers;
use crate::middleware::{gate_layer, response, Gate, Policy};

/// Everything a handler needs, shared across requests.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub documents: Arc<dyn DocumentStore>,
    pub audit_log: Arc<dyn AuditStore>,
    pub audit: AuditRecorder,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        verifier: Arc<dyn IdentityVerifier>,
        documents: Arc<dyn DocumentStore>,
        audit_log: Arc<dyn AuditStore>,
    ) -> Self {
        let audit = AuditRecorder::new(
            audit_log.clone(),
            Duration::from_millis(config.audit.write_timeout_ms),
        );
        Self {
            config: Arc::new(config),
            verifier,
            documents,
            audit_log,
            audit,
        }
    }

    /// JWT verification checked against the stored user records.
    pub fn with_jwt(config: AppConfig, documents: Arc<dyn DocumentStore>, audit_log: Arc<dyn AuditStore>) -> Self {
        let users = Collection::new(collections::USERS, documents.clone());
        let verifier = Arc::new(ActiveUserVerifier::new(JwtVerifier::new(&config.security), users));
        Self::new(config, verifier, documents, audit_log)
    }

    /// [`AppState::with_jwt`] over a fresh [`MemoryStore`].
    pub fn in_memory(config: AppConfig) -> Self {
        let store = MemoryStore::new();
        Self::with_jwt(config, Arc::new(store.clone()), Arc::new(store))
    }

    pub fn feature_flags(&self) -> Collection<FeatureFlag> {
        Collection::new(collections::FEATURE_FLAGS, self.documents.clone())
    }

    pub fn users(&self) -> Collection<AdminUser> {
        Collection::new(collections::USERS, self.documents.clone())
    }

    pub fn teams(&self) -> Collection<Team> {
        Collection::new(collections::TEAMS, self.documents.clone())
    }

    pub fn settings(&self) -> Collection<Settings> {
        Collection::new(collections::SETTINGS, self.documents.clone())
    }
}

/// Route table for `/api/admin`. Registering a route requires a [`Policy`],
/// and the gate is layered onto every method router handed in. Registrations
/// for the same path may carry different policies and are merged.
pub struct AdminRouter {
    routes: Vec<(String, MethodRouter<AppState>)>,
    verifier: Arc<dyn IdentityVerifier>,
}

impl AdminRouter {
    pub fn new(verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self {
            routes: Vec::new(),
            verifier,
        }
    }

    pub fn route(mut self, path: &str, policy: Policy, methods: MethodRouter<AppState>) -> Self {
        let gate = Gate::new(self.verifier.clone(), policy);
        let gated = methods.route_layer(middleware::from_fn_with_state(gate, gate_layer));

        match self.routes.iter().position(|(existing, _)| existing == path) {
            Some(index) => {
                let (path, existing) = self.routes.remove(index);
                self.routes.insert(index, (path, existing.merge(gated)));
            }
            None => self.routes.push((path.to_string(), gated)),
        }
        self
    }

    fn into_router(self) -> Router<AppState> {
        self.routes
            .into_iter()
            .fold(Router::new(), |router, (path, methods)| {
                router.route(&path, methods.fallback(method_not_allowed))
            })
    }
}

pub fn router(state: AppState) -> Router {
    let admin = handlers::admin::routes(AdminRouter::new(state.verifier.clone())).into_router();

    Router::new()
        // Public
        .route("/", get(handlers::public::root))
        .route("/health", get(handlers::public::health))
        // Gated
        .nest("/api/admin", admin)
        .fallback(not_found)
        // Global middleware
        .layer(DefaultBodyLimit::max(state.config.server.max_request_size_bytes))
        .layer(cors_layer(&state.config.security))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> Response {
    response::error("Route not found", StatusCode::NOT_FOUND)
}

// Unregistered methods on a gated path never reach a handler.
async fn method_not_allowed() -> Response {
    response::error("Method not allowed", StatusCode::METHOD_NOT_ALLOWED)
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if security.cors_origins.iter().any(|o| o == "*") {
        layer.allow_origin(AllowOrigin::any())
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    #[tokio::test]
    async fn unknown_route_gets_error_envelope() {
        let app = router(AppState::in_memory(AppConfig::for_tests("unit-secret")));
        let response = app
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn wrong_method_on_gated_path_gets_error_envelope() {
        let app = router(AppState::in_memory(AppConfig::for_tests("unit-secret")));
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri("/api/admin/feature-flags")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "method_not_allowed");
    }

    #[tokio::test]
    async fn admin_routes_reject_anonymous_callers() {
        let app = router(AppState::in_memory(AppConfig::for_tests("unit-secret")));
        let response = app
            .oneshot(Request::builder().uri("/api/admin/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
