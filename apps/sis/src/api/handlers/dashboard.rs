//! Home page, own profile and guardian edits, for every role.

use super::{
    date_text, datetime_text, department_name, department_options, parent_fields, percent_text,
    today,
};
use crate::api::{AppState, CurrentUser, PageResult, form_result, html, see_other};
use axum::{
    Router,
    extract::{Form, Path, State},
    routing::get,
};
use chrono::Utc;
use sis_core::accounts::{self, ProfileForm};
use sis_core::records::{self, GUARDIAN_EDIT_FORBIDDEN, ParentForm};
use sis_core::{FormErrors, Parent, ParentId, Reader, Role, SisError, Subject, User, dashboard};

const PROFILE_PATH: &str = "/dashboard/profile/";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard/", get(dashboard_handler))
        .route(PROFILE_PATH, get(profile_handler))
        .route(
            "/dashboard/profile/update/",
            get(profile_form_handler).post(profile_update_handler),
        )
        .route(
            "/dashboard/guardian/{id}/update/",
            get(guardian_form_handler).post(guardian_update_handler),
        )
}

// =============================================================================
// DASHBOARD
// =============================================================================

pub async fn dashboard_handler(State(state): State<AppState>, me: CurrentUser) -> PageResult {
    let body = if me.user.is_admin() {
        admin_board(&state)?
    } else if me.user.role == Role::Lecturer {
        lecturer_board(&state, &me.user)?
    } else {
        student_board(&state, &me.user)?
    };
    state.show(&me, "Dashboard", &body).await
}

fn admin_board(state: &AppState) -> Result<String, SisError> {
    let board = dashboard::admin(&state.store.read()?)?;
    Ok(format!(
        "{}<p>{} {} {} {}</p>",
        html::details(&[
            ("Total lecturers", board.total_lecturers.to_string()),
            ("Total students", board.total_students.to_string()),
            ("Total courses", board.total_courses.to_string()),
            ("Total users", board.total_users.to_string()),
        ]),
        html::link("/adminportal/lecturers/add/", "Add lecturer"),
        html::link("/adminportal/students/add/", "Add student"),
        html::link("/adminportal/courses/add/", "Add course"),
        html::link("/adminportal/fees/new/", "New fee plan"),
    ))
}

fn lecturer_board(state: &AppState, user: &User) -> Result<String, SisError> {
    let board = dashboard::lecturer(&state.store.read()?, user.id, today())?;
    let mut body = html::details(&[
        ("Total students", board.total_students.to_string()),
        ("Average attendance", format!("{}%", board.average_attendance)),
        ("Marked today", board.todays_attendance.to_string()),
        ("Unread notifications", board.unread_notifications.to_string()),
    ]);
    if board.classes.is_empty() {
        body.push_str(&html::paragraph("No class found for you."));
    }
    for (group, students) in &board.classes {
        body.push_str(&html::heading(&format!("{} ({})", group.name, group.year)));
        body.push_str(&format!(
            "<p>{} {} {} {}</p>",
            html::link(
                &format!("/lecturer/attendance/?class_group={}", group.id),
                "Take attendance",
            ),
            html::link(
                &format!("/lecturer/classgroup/{}/attendance/", group.id),
                "Attendance summary",
            ),
            html::link(&format!("/lecturer/classgroup/{}/students/", group.id), "Students"),
            html::link(
                &format!("/lecturer/classgroup/{}/export/students/", group.id),
                "Export students",
            ),
        ));
        let rows: Vec<Vec<String>> = students
            .iter()
            .map(|info| {
                vec![
                    html::escape(info.user.display_name()),
                    html::escape(&info.user.email),
                    format!("{}%", info.percentage),
                    html::link(
                        &format!("/lecturer/students/{}/full-details/", info.profile.id),
                        "Details",
                    ),
                ]
            })
            .collect();
        body.push_str(&html::table(&["Name", "Email", "Attendance", ""], &rows));
    }
    Ok(body)
}

fn student_board(state: &AppState, user: &User) -> Result<String, SisError> {
    let board = dashboard::student(&state.store, user.id, Utc::now())?;
    let classes: Vec<Vec<String>> = board
        .enrollments
        .iter()
        .map(|(group, pct)| {
            vec![
                html::link(&format!("/student/attendance/{}/", group.id), &group.name),
                html::escape(&group.classroom),
                format!("{}%", pct),
            ]
        })
        .collect();
    let conduct: Vec<Vec<String>> = board
        .disciplinary
        .iter()
        .map(|d| vec![d.date.to_string(), html::escape(&d.action), html::escape(&d.description)])
        .collect();
    Ok(format!(
        "{}{}{}{}",
        html::heading("My classes"),
        html::table(&["Class group", "Classroom", "Attendance"], &classes),
        html::heading("Disciplinary actions"),
        html::table(&["Date", "Action", "Description"], &conduct),
    ))
}

// =============================================================================
// PROFILE
// =============================================================================

pub async fn profile_handler(State(state): State<AppState>, me: CurrentUser) -> PageResult {
    let body = {
        let r = state.store.read()?;
        let user = &me.user;
        let mut body = html::details(&[
            ("Email", user.email.clone()),
            ("IC number", user.identity_card_number.clone()),
            ("Full name", user.full_name.clone()),
            ("Short name", user.short_name.clone()),
            ("Role", user.role.label().to_string()),
            ("Phone number", user.phone_number.clone()),
            ("Address", user.address.clone()),
            ("Department", department_name(&r, user.department_id)?),
            ("Date joined", user.date_joined.date_naive().to_string()),
        ]);

        match user.role {
            Role::Student => {
                if let Ok(profile) = accounts::student_profile(&r, user.id) {
                    let class_group = match profile.class_group_id {
                        Some(id) => r
                            .get::<sis_core::ClassGroup>(id)?
                            .map(|g| g.name)
                            .unwrap_or_default(),
                        None => String::new(),
                    };
                    body.push_str(&html::details(&[
                        ("Registration number", profile.registration_number.clone()),
                        ("Class group", class_group),
                        ("Date of birth", date_text(profile.date_of_birth)),
                        ("Latest activity", datetime_text(profile.latest_activity)),
                        ("Emergency contact", profile.emergency_name.clone()),
                        ("Relation", profile.emergency_relation.clone()),
                        ("Emergency phone", profile.emergency_phone.clone()),
                    ]));
                    let mut rows = Vec::new();
                    for id in &profile.parent_ids {
                        let Some(parent) = r.get::<Parent>(*id)? else {
                            continue;
                        };
                        let edit = if records::can_edit_guardian(user, &parent) {
                            html::link(
                                &format!("/dashboard/guardian/{}/update/", parent.id),
                                "Edit",
                            )
                        } else {
                            String::new()
                        };
                        rows.push(vec![
                            html::escape(&parent.full_name),
                            html::escape(&parent.roles_list().join(", ")),
                            html::or_dash(&parent.phone_number),
                            html::or_dash(&parent.email),
                            edit,
                        ]);
                    }
                    body.push_str(&html::heading("Guardians"));
                    body.push_str(&html::table(&["Name", "Roles", "Phone", "Email", ""], &rows));
                }
            }
            Role::Lecturer => {
                if let Ok(profile) = accounts::lecturer_profile(&r, user.id) {
                    let mut subjects = Vec::new();
                    for id in &profile.subject_ids {
                        if let Some(subject) = r.get::<Subject>(*id)? {
                            subjects.push(subject.label());
                        }
                    }
                    body.push_str(&html::details(&[("Subjects", subjects.join(", "))]));
                }
            }
            Role::Admin => {}
        }
        body.push_str(&html::link("/dashboard/profile/update/", "Edit profile"));
        body
    };
    state.show(&me, "My Profile", &body).await
}

fn profile_page(
    state: &AppState,
    user: &User,
    form: &ProfileForm,
    errors: &FormErrors,
) -> Result<String, SisError> {
    let mut fields = vec![
        html::text("full_name", "Full name", &form.full_name, errors),
        html::text("short_name", "Short name", &form.short_name, errors),
        html::text("phone_number", "Phone number", &form.phone_number, errors),
        html::textarea("address", "Address", &form.address, errors),
    ];
    if user.role == Role::Student {
        fields.extend([
            html::input("date", "date_of_birth", "Date of birth", &form.date_of_birth, errors),
            html::text("emergency_name", "Emergency contact", &form.emergency_name, errors),
            html::text("emergency_relation", "Relation", &form.emergency_relation, errors),
            html::text("emergency_phone", "Emergency phone", &form.emergency_phone, errors),
        ]);
    } else {
        let options = department_options(&state.store.read()?)?;
        fields.push(html::select("department", "Department", &options, &form.department, errors));
    }
    Ok(html::form("/dashboard/profile/update/", errors, &fields.concat(), "Save"))
}

pub async fn profile_form_handler(State(state): State<AppState>, me: CurrentUser) -> PageResult {
    let body = {
        let student = accounts::student_profile(&state.store.read()?, me.user.id).ok();
        let form = ProfileForm::from_records(&me.user, student.as_ref());
        profile_page(&state, &me.user, &form, &FormErrors::new())?
    };
    state.show(&me, "Update Profile", &body).await
}

pub async fn profile_update_handler(
    State(state): State<AppState>,
    me: CurrentUser,
    Form(form): Form<ProfileForm>,
) -> PageResult {
    match form_result(accounts::update_profile(&state.store, me.user.id, &form))? {
        Ok(_) => {
            state.flash(&me, "Profile updated successfully.").await;
            Ok(see_other(PROFILE_PATH))
        }
        Err(errors) => {
            let body = profile_page(&state, &me.user, &form, &errors)?;
            Ok(state.invalid(&me, "Update Profile", &body).await)
        }
    }
}

// =============================================================================
// GUARDIANS
// =============================================================================

fn guardian_page(id: ParentId, form: &ParentForm, errors: &FormErrors) -> String {
    html::form(
        &format!("/dashboard/guardian/{}/update/", id),
        errors,
        &parent_fields(form, errors),
        "Save",
    )
}

pub async fn guardian_form_handler(
    State(state): State<AppState>,
    me: CurrentUser,
    Path(id): Path<ParentId>,
) -> PageResult {
    let parent = state.store.read()?.fetch::<Parent>(id)?;
    if !records::can_edit_guardian(&me.user, &parent) {
        state.flash(&me, GUARDIAN_EDIT_FORBIDDEN).await;
        return Ok(see_other(PROFILE_PATH));
    }
    let body = guardian_page(id, &ParentForm::from(&parent), &FormErrors::new());
    state.show(&me, "Update Guardian", &body).await
}

pub async fn guardian_update_handler(
    State(state): State<AppState>,
    me: CurrentUser,
    Path(id): Path<ParentId>,
    Form(form): Form<ParentForm>,
) -> PageResult {
    match records::update_guardian(&state.store, &me.user, id, &form) {
        Ok(_) => {
            state.flash(&me, "Guardian profile updated successfully.").await;
            Ok(see_other(PROFILE_PATH))
        }
        Err(SisError::Forbidden(message)) => {
            state.flash(&me, message).await;
            Ok(see_other(PROFILE_PATH))
        }
        Err(SisError::Validation(errors)) => {
            Ok(state.invalid(&me, "Update Guardian", &guardian_page(id, &form, &errors)).await)
        }
        Err(e) => Err(e.into()),
    }
}
