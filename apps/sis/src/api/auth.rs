//! # Authentication Module
//!
//! Login sessions for the portal.
//!
//! ## Sessions
//!
//! A successful login stores a [`Session`] under a random uuid token and
//! sends the token back in the `sis_session` cookie (`HttpOnly`,
//! `SameSite=Lax`, `Secure` outside debug mode). Clients that cannot keep
//! cookies may send the token instead:
//!
//! ```text
//! Authorization: Bearer <token>
//! ```
//!
//! Sessions live in memory and expire after `session_hours`. Each session
//! also carries the one-shot messages shown on the next rendered page.
//!
//! ## Guards
//!
//! [`CurrentUser`] redirects anonymous requests to the login page.
//! [`AdminUser`], [`LecturerUser`] and [`StudentUser`] additionally answer
//! 403 when the signed-in account has another role.

use super::{AppState, error::ApiError, html};
use axum::{
    extract::{Form, FromRequestParts, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Duration, Utc};
use cookie::{Cookie, SameSite};
use serde::Deserialize;
use sis_core::{Reader, Role, SisError, User, UserId, accounts, validation::FormErrors};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "sis_session";

pub const LOGIN_PATH: &str = "/accounts/login/";

/// Where every role lands after logging in.
pub const HOME_PATH: &str = "/dashboard/";

// =============================================================================
// SESSION STORE
// =============================================================================

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub messages: Vec<String>,
}

/// Token -> session map shared by every request.
#[derive(Debug, Clone, Default)]
pub struct Sessions {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl Sessions {
    /// Start a session for `user` and return its token.
    pub async fn create(&self, user: UserId, hours: u32) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        let session = Session {
            user_id: user,
            expires_at: Utc::now() + Duration::hours(i64::from(hours)),
            messages: Vec::new(),
        };
        let mut sessions = self.inner.write().await;
        sessions.retain(|_, s| s.expires_at > Utc::now());
        sessions.insert(token.clone(), session);
        token
    }

    /// The user behind a live token. Expired sessions are dropped.
    pub async fn user_of(&self, token: &str) -> Option<UserId> {
        let mut sessions = self.inner.write().await;
        match sessions.get(token) {
            Some(s) if s.expires_at > Utc::now() => Some(s.user_id),
            Some(_) => {
                sessions.remove(token);
                None
            }
            None => None,
        }
    }

    pub async fn remove(&self, token: &str) {
        self.inner.write().await.remove(token);
    }

    /// Queue a message for the next page of this session.
    pub async fn push_message(&self, token: &str, message: String) {
        if let Some(session) = self.inner.write().await.get_mut(token) {
            session.messages.push(message);
        }
    }

    pub async fn take_messages(&self, token: &str) -> Vec<String> {
        self.inner
            .write()
            .await
            .get_mut(token)
            .map(|s| std::mem::take(&mut s.messages))
            .unwrap_or_default()
    }
}

// =============================================================================
// COOKIES
// =============================================================================

/// Session token from the cookie, falling back to a bearer header.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(raw) = value.to_str() else {
            continue;
        };
        for cookie in Cookie::split_parse(raw).flatten() {
            if cookie.name() == SESSION_COOKIE && !cookie.value().is_empty() {
                return Some(cookie.value().to_string());
            }
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

pub fn session_cookie(token: &str, secure: bool) -> String {
    Cookie::build((SESSION_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
        .to_string()
}

pub fn removal_cookie() -> String {
    let mut cookie = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    cookie.make_removal();
    cookie.to_string()
}

// =============================================================================
// EXTRACTORS
// =============================================================================

/// The signed-in account of a request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

/// Resolve the request's session to an active account.
pub async fn resolve(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<CurrentUser>, SisError> {
    let Some(token) = token_from_headers(headers) else {
        return Ok(None);
    };
    let Some(user_id) = state.sessions.user_of(&token).await else {
        tracing::warn!(
            event = "auth_failure",
            reason = "unknown_session",
            "Session token is unknown or expired"
        );
        return Ok(None);
    };
    let account = state.store.read()?.get::<User>(user_id)?;
    match account {
        Some(user) if user.is_active => Ok(Some(CurrentUser { user, token })),
        _ => {
            tracing::warn!(
                event = "auth_failure",
                reason = "inactive_account",
                user_id = user_id.0,
                "Session belongs to a missing or inactive account"
            );
            state.sessions.remove(&token).await;
            Ok(None)
        }
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match resolve(state, &parts.headers).await {
            Ok(Some(current)) => Ok(current),
            Ok(None) => Err(Redirect::to(LOGIN_PATH).into_response()),
            Err(e) => Err(ApiError::from(e).into_response()),
        }
    }
}

macro_rules! role_guard {
    ($(#[$meta:meta])* $name:ident, $allowed:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(pub CurrentUser);

        impl FromRequestParts<AppState> for $name {
            type Rejection = Response;

            async fn from_request_parts(
                parts: &mut Parts,
                state: &AppState,
            ) -> Result<Self, Self::Rejection> {
                let current = CurrentUser::from_request_parts(parts, state).await?;
                let allowed: fn(&User) -> bool = $allowed;
                if allowed(&current.user) {
                    Ok(Self(current))
                } else {
                    tracing::warn!(
                        event = "auth_failure",
                        reason = "wrong_role",
                        user_id = current.user.id.0,
                        path = %parts.uri.path(),
                        "Access denied for role {}",
                        current.user.role.as_str()
                    );
                    Err(ApiError::from(SisError::not_authorized()).into_response())
                }
            }
        }
    };
}

role_guard!(
    /// Administrators and superusers.
    AdminUser,
    |u| u.is_admin()
);
role_guard!(LecturerUser, |u| u.role == Role::Lecturer);
role_guard!(StudentUser, |u| u.role == Role::Student);

// =============================================================================
// LOGIN / LOGOUT
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub identifier: String,
    pub password: String,
}

fn login_page(form: &LoginForm, errors: &FormErrors) -> axum::response::Html<String> {
    let fields = format!(
        "{}{}",
        html::text("identifier", "Email or IC number", &form.identifier, errors),
        html::input("password", "password", "Password", "", errors)
    );
    html::page("Login", None, &[], &html::form(LOGIN_PATH, errors, &fields, "Log in"))
}

pub async fn login_form_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if resolve(&state, &headers).await?.is_some() {
        return Ok(Redirect::to(HOME_PATH).into_response());
    }
    Ok(login_page(&LoginForm::default(), &FormErrors::new()).into_response())
}

pub async fn login_handler(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    match accounts::authenticate(&state.store, &form.identifier, &form.password, Utc::now()) {
        Ok(user) => {
            let token = state.sessions.create(user.id, state.settings.session_hours).await;
            tracing::info!(user_id = user.id.0, role = user.role.as_str(), "User logged in");
            let cookie = session_cookie(&token, !state.settings.debug);
            Ok(([(header::SET_COOKIE, cookie)], Redirect::to(HOME_PATH)).into_response())
        }
        Err(e @ SisError::InvalidCredentials) => {
            tracing::warn!(
                event = "auth_failure",
                reason = "invalid_credentials",
                "Login failed"
            );
            let mut errors = FormErrors::new();
            errors.add_general(e.to_string());
            let retry = LoginForm {
                identifier: form.identifier,
                password: String::new(),
            };
            Ok((StatusCode::UNAUTHORIZED, login_page(&retry, &errors)).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn logout_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = token_from_headers(&headers) {
        state.sessions.remove(&token).await;
    }
    ([(header::SET_COOKIE, removal_cookie())], Redirect::to(LOGIN_PATH)).into_response()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_token_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; sis_session=abc-123"),
        );
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc-123"));
    }

    #[test]
    fn test_token_from_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("xyz"));
        assert!(token_from_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("tok", true);
        assert!(cookie.starts_with("sis_session=tok"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Secure"));
        assert!(!session_cookie("tok", false).contains("Secure"));
        assert!(removal_cookie().contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_sessions_lifecycle() {
        let sessions = Sessions::default();
        let token = sessions.create(UserId(7), 1).await;
        assert_eq!(sessions.user_of(&token).await, Some(UserId(7)));

        sessions.push_message(&token, "Saved.".to_string()).await;
        assert_eq!(sessions.take_messages(&token).await, ["Saved."]);
        assert!(sessions.take_messages(&token).await.is_empty());

        sessions.remove(&token).await;
        assert!(sessions.user_of(&token).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected() {
        let sessions = Sessions::default();
        let token = sessions.create(UserId(1), 0).await;
        assert!(sessions.user_of(&token).await.is_none());
    }
}
