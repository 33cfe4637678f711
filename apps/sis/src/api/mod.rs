//! # SIS HTTP Module
//!
//! The server-rendered portal, built on axum.
//!
//! ## Sections
//!
//! - `/accounts/` - login and logout
//! - `/dashboard/` - role-specific home page, own profile, guardian edits
//! - `/adminportal/` - catalogue, people, enrollment and fee management (admins)
//! - `/lecturer/` - attendance, class rosters and student records (lecturers)
//! - `/student/` - own class, subjects, attendance and records (students)
//! - `/notifications/` - stored messages
//! - `/health` - JSON health check
//!
//! ## Security Configuration
//!
//! Read from [`Settings`]: `allowed_hosts`, `cors_origins`, `rate_limit`
//! and `debug` (which drops the `Secure` flag on the session cookie).

pub mod auth;
pub mod error;
pub mod handlers;
pub mod html;
pub mod middleware;
pub mod types;

pub use auth::{AdminUser, CurrentUser, LecturerUser, Sessions, StudentUser};
pub use error::ApiError;
pub use middleware::create_rate_limiter;

use crate::config::Settings;
use axum::{
    Router,
    http::{HeaderValue, Method, StatusCode, header},
    middleware as axum_middleware,
    response::{Html, IntoResponse, Redirect, Response},
};
use sis_core::{SisError, Store};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Result type of page handlers.
pub type PageResult = Result<Response, ApiError>;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub sessions: Sessions,
    pub settings: Arc<Settings>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Store, settings: Settings) -> Self {
        Self {
            store: Arc::new(store),
            sessions: Sessions::default(),
            settings: Arc::new(settings),
        }
    }

    /// Queue a message for the user's next page.
    pub async fn flash(&self, me: &CurrentUser, message: impl Into<String>) {
        self.sessions.push_message(&me.token, message.into()).await;
    }

    /// Render a full page for the signed-in user, consuming queued messages.
    pub async fn render(&self, me: &CurrentUser, title: &str, body: &str) -> Html<String> {
        let messages = self.sessions.take_messages(&me.token).await;
        html::page(title, Some(&me.user), &messages, body)
    }

    /// [`render`](Self::render) as a 200 handler result.
    pub async fn show(&self, me: &CurrentUser, title: &str, body: &str) -> PageResult {
        Ok(self.render(me, title, body).await.into_response())
    }

    /// [`render`](Self::render) with 422, for forms that failed validation.
    pub async fn invalid(&self, me: &CurrentUser, title: &str, body: &str) -> Response {
        (StatusCode::UNPROCESSABLE_ENTITY, self.render(me, title, body).await).into_response()
    }
}

/// 303 redirect.
pub fn see_other(to: &str) -> Response {
    Redirect::to(to).into_response()
}

/// Split a core result into the form errors to re-render and everything else.
pub fn form_result<T>(
    result: Result<T, SisError>,
) -> Result<Result<T, sis_core::FormErrors>, ApiError> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(SisError::Validation(errors)) => Ok(Err(errors)),
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer from `cors_origins`.
///
/// - `["*"]`: allows all origins
/// - empty: localhost only
/// - otherwise: the listed origins
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        tracing::warn!(
            "CORS: Allowing ALL origins (cors_origins=*). This is insecure for production!"
        );
        return CorsLayer::permissive();
    }
    if origins.is_empty() {
        tracing::info!("CORS: No origins configured, defaulting to localhost only");
        return build_localhost_cors();
    }

    let allowed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(hv) => {
                tracing::info!("CORS: Allowing origin: {}", origin);
                Some(hv)
            }
            Err(e) => {
                tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    if allowed_origins.is_empty() {
        tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
        build_localhost_cors()
    } else {
        CorsLayer::new()
            .allow_origin(allowed_origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all pages and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit
/// 4. Allowed hosts - rejects unknown `Host` headers
/// 5. Rate limiting - if enabled
pub fn create_router(state: AppState) -> Router {
    let settings = state.settings.clone();
    let cors = build_cors_layer(&settings.cors_origins);

    let mut router = handlers::routes();

    if settings.rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", settings.rate_limit);
        router = router.layer(axum_middleware::from_fn_with_state(
            create_rate_limiter(settings.rate_limit),
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("Rate limiting disabled");
    }

    router = router.layer(axum_middleware::from_fn_with_state(
        Arc::new(settings.allowed_hosts.clone()),
        middleware::allowed_hosts_middleware,
    ));

    router
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(store: Store, settings: Settings) -> Result<(), SisError> {
    let addr = settings.bind_addr();
    if !settings.debug {
        tracing::info!("Debug mode off: session cookies are marked Secure");
    }
    let router = create_router(AppState::new(store, settings));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| SisError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("SIS portal listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| SisError::IoError(format!("Server error: {}", e)))
}
