//! # Page Handlers
//!
//! One submodule per portal section. Each exposes `routes()` with absolute
//! paths; [`routes`] merges them with the public pages.
//!
//! Handlers read inside a block so the redb snapshot is dropped before the
//! page is rendered.

pub mod admin;
pub mod dashboard;
pub mod lecturer;
pub mod notifications;
pub mod student;

use super::{AppState, auth, html, types::HealthResponse};
use axum::{
    Json, Router,
    http::header,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::{DateTime, NaiveDate, Utc};
use sis_core::records::ParentForm;
use sis_core::{Department, FormErrors, Percentage, Reader, SisError, academics};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route(
            auth::LOGIN_PATH,
            get(auth::login_form_handler).post(auth::login_handler),
        )
        .route("/accounts/logout/", post(auth::logout_handler))
        .route("/logout/", get(auth::logout_handler).post(auth::logout_handler))
        .merge(dashboard::routes())
        .merge(admin::routes())
        .merge(lecturer::routes())
        .merge(student::routes())
        .merge(notifications::routes())
}

// =============================================================================
// PUBLIC PAGES
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

pub async fn root_handler() -> Redirect {
    Redirect::to(auth::LOGIN_PATH)
}

// =============================================================================
// SHARED RENDERING
// =============================================================================

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn date_text(date: Option<NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_default()
}

pub fn datetime_text(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

/// `"87.50%"`, or `N/A` when nothing is marked.
pub fn percent_text(p: Option<Percentage>) -> String {
    match p {
        Some(p) => format!("{}%", p),
        None => "N/A".to_string(),
    }
}

pub fn department_name(
    r: &impl Reader,
    id: Option<sis_core::DepartmentId>,
) -> Result<String, SisError> {
    Ok(match id {
        Some(id) => r.get::<Department>(id)?.map(|d| d.name).unwrap_or_default(),
        None => String::new(),
    })
}

pub fn department_options(r: &impl Reader) -> Result<Vec<(String, String)>, SisError> {
    Ok(academics::list_departments(r)?
        .into_iter()
        .map(|d| (d.id.to_string(), d.name))
        .collect())
}

pub fn class_group_options(r: &impl Reader) -> Result<Vec<(String, String)>, SisError> {
    Ok(academics::class_groups_by_department(r, None)?
        .into_iter()
        .map(|g| (g.id.to_string(), format!("{} ({})", g.name, g.year)))
        .collect())
}

/// A CSV attachment. Quotes and line breaks in the name become `_`.
pub fn csv_download(filename: &str, bytes: Vec<u8>) -> Response {
    let filename: String = filename
        .chars()
        .map(|c| if matches!(c, '"' | '\r' | '\n') { '_' } else { c })
        .collect();
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
        .into_response()
}

/// Guardian fields shared by the lecturer and dashboard forms.
pub fn parent_fields(form: &ParentForm, errors: &FormErrors) -> String {
    [
        html::text("full_name", "Full name", &form.full_name, errors),
        html::input("email", "email", "Email", &form.email, errors),
        html::text("phone_number", "Phone number", &form.phone_number, errors),
        html::textarea("address", "Address", &form.address, errors),
        html::text("occupation", "Occupation", &form.occupation, errors),
        html::text(
            "roles",
            "Roles (comma separated: father, mother, guardian, grandfather, grandmother, other)",
            &form.roles,
            errors,
        ),
    ]
    .concat()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_text() {
        assert_eq!(percent_text(None), "N/A");
        assert_eq!(percent_text(Percentage::of(1, 3)), "33.33%");
    }

    #[test]
    fn test_parent_fields_keep_values() {
        let form = ParentForm {
            full_name: "Siti".into(),
            roles: "mother".into(),
            ..ParentForm::default()
        };
        let markup = parent_fields(&form, &FormErrors::new());
        assert!(markup.contains("value=\"Siti\""));
        assert!(markup.contains("value=\"mother\""));
    }

    #[test]
    fn test_csv_download_filename_cannot_break_header() {
        let response = csv_download("5 \"A\"\r\nSet-Cookie: x.csv", b"a,b\n".to_vec());
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert_eq!(disposition, "attachment; filename=\"5 _A___Set-Cookie: x.csv\"");
    }
}
