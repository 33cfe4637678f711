//! Stored notifications of the signed-in user.

use super::datetime_text;
use crate::api::{AppState, CurrentUser, PageResult, html, see_other};
use axum::{
    Router,
    extract::{Path, State},
    routing::{get, post},
};
use sis_core::{NotificationId, Reader, User, notifications};

const LIST_PATH: &str = "/notifications/";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(LIST_PATH, get(list_handler))
        .route(
            "/notifications/mark_as_read/{id}/",
            post(mark_read_handler),
        )
}

pub async fn list_handler(State(state): State<AppState>, me: CurrentUser) -> PageResult {
    let rows = {
        let r = state.store.read()?;
        let mut rows = Vec::new();
        for note in notifications::list_for(&r, me.user.id)? {
            let sender = match note.sender_id {
                Some(id) => r.get::<User>(id)?.map(|u| u.full_name).unwrap_or_default(),
                None => String::new(),
            };
            let action = if note.is_read {
                "Read".to_string()
            } else {
                html::post_button(
                    &format!("/notifications/mark_as_read/{}/", note.id),
                    "Mark as read",
                )
            };
            rows.push(vec![
                datetime_text(Some(note.created_at)),
                html::or_dash(&sender),
                html::escape(&note.message),
                action,
            ]);
        }
        rows
    };
    let body = html::table(&["Received", "From", "Message", ""], &rows);
    state.show(&me, "Notifications", &body).await
}

pub async fn mark_read_handler(
    State(state): State<AppState>,
    me: CurrentUser,
    Path(id): Path<NotificationId>,
) -> PageResult {
    notifications::mark_read(&state.store, me.user.id, id)?;
    Ok(see_other(LIST_PATH))
}
