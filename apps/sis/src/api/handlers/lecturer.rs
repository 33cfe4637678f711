//! # Lecturer Pages
//!
//! Attendance taking and history, class rosters, student records,
//! guardians and messages to students.
//!
//! Class group pages and attendance marks are limited to the groups the
//! lecturer teaches. Guardian management is further limited to students
//! whose home class group the lecturer teaches.

use super::{csv_download, date_text, datetime_text, parent_fields, percent_text, today};
use crate::api::types::{ExportQuery, HistoryQuery, SearchQuery, SheetQuery, parse_opt};
use crate::api::{
    ApiError, AppState, CurrentUser, LecturerUser, PageResult, auth, form_result, html, see_other,
};
use axum::{
    Router,
    extract::{Form, Path, Query, State},
    routing::{get, post},
};
use chrono::Utc;
use sis_core::academics;
use sis_core::accounts;
use sis_core::attendance::{self, BULK_STATUSES, MarkForm, Period};
use sis_core::notifications::{self, MessageForm};
use sis_core::primitives::EXPORT_DATE_FORMAT;
use sis_core::records::{self, AchievementForm, DisciplinaryForm, LinkOutcome, ParentForm};
use sis_core::{
    AttendanceSession, AttendanceStatus, ClassGroup, ClassGroupId, Enrollment, EnrollmentId,
    FormErrors, LecturerProfile, ParentId, Reader, Record, SisError, StudentId, StudentProfile,
    User, export,
};
use std::collections::HashMap;

const SHEET_PATH: &str = "/lecturer/attendance/";

pub fn routes() -> Router<AppState> {
    Router::new()
        // attendance
        .route(SHEET_PATH, get(sheet_handler).post(sheet_save_handler))
        .route("/lecturer/attendance/mark/", post(mark_handler))
        .route(
            "/lecturer/attendance/mark/{enrollment}/",
            get(mark_form_handler).post(mark_enrollment_handler),
        )
        .route("/lecturer/attendance/history/", get(history_handler))
        .route("/lecturer/attendance/export/", get(attendance_export_handler))
        // class groups
        .route(
            "/lecturer/classgroup/{id}/attendance/",
            get(class_attendance_handler),
        )
        .route("/lecturer/classgroup/{id}/students/", get(roster_handler))
        .route(
            "/lecturer/classgroup/{id}/export/students/",
            get(roster_export_handler),
        )
        // student records
        .route(
            "/lecturer/students/{id}/achievements/",
            get(achievements_handler).post(achievement_add_handler),
        )
        .route(
            "/lecturer/students/{id}/disciplinary-actions/",
            get(disciplinary_handler),
        )
        .route(
            "/lecturer/students/{id}/take-disciplinary-action/",
            get(disciplinary_form_handler).post(disciplinary_add_handler),
        )
        .route(
            "/lecturer/students/{id}/full-details/",
            get(full_details_handler),
        )
        .route(
            "/lecturer/students/{id}/update-activity/",
            post(update_activity_handler),
        )
        // guardians
        .route("/lecturer/students/{id}/parents/", get(parents_handler))
        .route(
            "/lecturer/students/{id}/parents/add/",
            get(parent_form_handler).post(parent_add_handler),
        )
        .route(
            "/lecturer/students/{id}/parents/{parent_id}/remove/",
            post(parent_remove_handler),
        )
        // messages
        .route(
            "/lecturer/send-message/",
            get(message_form_handler).post(message_send_handler),
        )
}

// =============================================================================
// ACCESS
// =============================================================================

fn lecturer_of(r: &impl Reader, me: &CurrentUser) -> Result<LecturerProfile, SisError> {
    accounts::lecturer_profile(r, me.user.id)
}

/// The class group, if the lecturer teaches it.
fn taught_group(
    r: &impl Reader,
    me: &CurrentUser,
    id: ClassGroupId,
) -> Result<ClassGroup, SisError> {
    let group = r.fetch::<ClassGroup>(id)?;
    let lecturer = lecturer_of(r, me)?;
    if !group.lecturer_ids.contains(&lecturer.id) {
        tracing::warn!(
            user_id = me.user.id.0,
            class_group = id.0,
            "Class group not taught by lecturer"
        );
        return Err(SisError::not_authorized());
    }
    Ok(group)
}

/// The enrollment and its student's account, if the lecturer teaches the class group.
fn taught_enrollment(
    r: &impl Reader,
    me: &CurrentUser,
    id: EnrollmentId,
) -> Result<(Enrollment, User), SisError> {
    let enrollment = r.fetch::<Enrollment>(id)?;
    taught_group(r, me, enrollment.class_group_id)?;
    let profile = r.fetch::<StudentProfile>(enrollment.student_id)?;
    let user = r.fetch::<User>(profile.user_id)?;
    Ok((enrollment, user))
}

fn student_of(r: &impl Reader, id: StudentId) -> Result<(StudentProfile, User), SisError> {
    let profile = r.fetch::<StudentProfile>(id)?;
    let user = r.fetch::<User>(profile.user_id)?;
    Ok((profile, user))
}

fn status_text(status: Option<AttendanceStatus>) -> &'static str {
    status.map(|s| s.label()).unwrap_or(export::NOT_MARKED_LABEL)
}

fn student_links(id: StudentId) -> String {
    format!(
        "{} {} {} {}",
        html::link(&format!("/lecturer/students/{}/full-details/", id), "Details"),
        html::link(&format!("/lecturer/students/{}/achievements/", id), "Achievements"),
        html::link(&format!("/lecturer/students/{}/disciplinary-actions/", id), "Discipline"),
        html::link(&format!("/lecturer/students/{}/parents/", id), "Guardians"),
    )
}

// =============================================================================
// BULK ATTENDANCE
// =============================================================================

/// Requested class group, else the first one the lecturer teaches.
fn sheet_group(
    r: &impl Reader,
    me: &CurrentUser,
    raw: &str,
) -> Result<Option<ClassGroup>, SisError> {
    match parse_opt::<ClassGroupId>(raw) {
        Some(id) => taught_group(r, me, id).map(Some),
        None => {
            let lecturer = lecturer_of(r, me)?;
            Ok(academics::class_groups_of_lecturer(r, lecturer.id)?.into_iter().next())
        }
    }
}

fn sheet_page(r: &impl Reader, group: &ClassGroup, query: &SheetQuery) -> Result<String, SisError> {
    let date = query.date_or(today());
    let session = query.session();
    let none = FormErrors::new();
    let statuses = html::choices(&BULK_STATUSES, AttendanceStatus::as_str, AttendanceStatus::label);
    let sessions = html::choices(
        AttendanceSession::ALL,
        AttendanceSession::as_str,
        AttendanceSession::label,
    );

    let rows: Vec<Vec<String>> = attendance::sheet(r, group.id, date, session)?
        .iter()
        .map(|row| {
            let id = row.enrollment.id;
            let selected = row.mark.as_ref().map(|m| m.status.as_str()).unwrap_or_default();
            let remarks = row.mark.as_ref().map(|m| m.description.as_str()).unwrap_or_default();
            vec![
                html::escape(row.user.display_name()),
                html::select(&format!("status_{}", id), "", &statuses, selected, &none),
                html::text(&format!("remarks_{}", id), "", remarks, &none),
                html::link(&format!("/lecturer/attendance/mark/{}/", id), "Mark individually"),
            ]
        })
        .collect();

    let course = match group.course_id {
        Some(id) => r.get::<sis_core::Course>(id)?.map(|c| c.name).unwrap_or_default(),
        None => String::new(),
    };
    let selection = format!(
        "{}{}{}",
        html::input("hidden", "class_group", "", &group.id.to_string(), &none),
        html::input("date", "date", "Date", &date.to_string(), &none),
        html::select("session", "Session", &sessions, session.as_str(), &none),
    );
    Ok(format!(
        "{}{}{}",
        html::details(&[
            ("Class group", group.name.clone()),
            ("Course", course),
            ("Classroom", group.classroom.clone()),
        ]),
        html::filter_form(SHEET_PATH, &selection),
        html::form(
            SHEET_PATH,
            &none,
            &format!(
                "{}{}",
                selection,
                html::table(&["Student", "Status", "Remarks", ""], &rows)
            ),
            "Save attendance",
        ),
    ))
}

pub async fn sheet_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Query(query): Query<SheetQuery>,
) -> PageResult {
    let body = {
        let r = state.store.read()?;
        match sheet_group(&r, &me, &query.class_group)? {
            Some(group) => sheet_page(&r, &group, &query)?,
            None => String::new(),
        }
    };
    if body.is_empty() {
        state.flash(&me, "No class found for you.").await;
    }
    state.show(&me, "Take Attendance", &body).await
}

pub async fn sheet_save_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Query(query): Query<SheetQuery>,
    Form(fields): Form<HashMap<String, String>>,
) -> PageResult {
    let pick = |name: &str, fallback: &str| {
        fields
            .get(name)
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    };
    let selection = SheetQuery {
        class_group: pick("class_group", &query.class_group),
        date: pick("date", &query.date),
        session: pick("session", &query.session),
    };
    let group = sheet_group(&state.store.read()?, &me, &selection.class_group)?
        .ok_or_else(|| SisError::NotFound(ClassGroup::NAME))?;
    let date = selection.date_or(today());
    let session = selection.session();

    let saved = attendance::mark_bulk(&state.store, group.id, date, session, &fields)?;
    tracing::info!(class_group = group.id.0, %date, saved, "Attendance saved");
    state
        .flash(
            &me,
            format!(
                "Attendance saved for {} students ({} session).",
                saved,
                session.label()
            ),
        )
        .await;
    Ok(see_other(&format!(
        "{}?class_group={}&date={}&session={}",
        SHEET_PATH,
        group.id,
        date,
        session.as_str()
    )))
}

// =============================================================================
// SINGLE MARKS
// =============================================================================

pub async fn mark_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Form(form): Form<MarkForm>,
) -> PageResult {
    let target = match parse_opt::<EnrollmentId>(&form.enrollment) {
        Some(id) => Some(taught_enrollment(&state.store.read()?, &me, id)?),
        None => None,
    };
    let enrollment = target.as_ref().map(|(e, _)| e.id);
    match form_result(attendance::mark_from_form(&state.store, enrollment, &form))? {
        Ok(mark) => {
            let name = target.map(|(_, u)| u.full_name).unwrap_or_default();
            state
                .flash(&me, format!("Attendance updated for {} on {}.", name, mark.date))
                .await;
        }
        Err(_) => {
            state.flash(&me, "Please correct the errors in the attendance form.").await;
        }
    }
    Ok(see_other(auth::HOME_PATH))
}

fn mark_page(enrollment: &Enrollment, user: &User, form: &MarkForm, errors: &FormErrors) -> String {
    let statuses = html::choices(
        AttendanceStatus::ALL,
        AttendanceStatus::as_str,
        AttendanceStatus::label,
    );
    let sessions = html::choices(
        AttendanceSession::ALL,
        AttendanceSession::as_str,
        AttendanceSession::label,
    );
    let fields = [
        html::paragraph(&format!("Student: {}", user.display_name())),
        html::input("date", "date", "Date", &form.date, errors),
        html::select("session", "Session", &sessions, &form.session, errors),
        html::select("status", "Status", &statuses, &form.status, errors),
        html::textarea("remarks", "Remarks", &form.remarks, errors),
    ]
    .concat();
    html::form(
        &format!("/lecturer/attendance/mark/{}/", enrollment.id),
        errors,
        &fields,
        "Save",
    )
}

pub async fn mark_form_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Path(id): Path<EnrollmentId>,
) -> PageResult {
    let (enrollment, user) = taught_enrollment(&state.store.read()?, &me, id)?;
    let form = MarkForm {
        date: today().to_string(),
        session: AttendanceSession::default().as_str().to_string(),
        ..MarkForm::default()
    };
    let body = mark_page(&enrollment, &user, &form, &FormErrors::new());
    state.show(&me, "Mark Attendance", &body).await
}

pub async fn mark_enrollment_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Path(id): Path<EnrollmentId>,
    Form(form): Form<MarkForm>,
) -> PageResult {
    let (enrollment, user) = taught_enrollment(&state.store.read()?, &me, id)?;
    match form_result(attendance::mark_from_form(&state.store, Some(enrollment.id), &form))? {
        Ok(mark) => {
            state
                .flash(&me, format!("Attendance recorded for {} on {}.", user.full_name, mark.date))
                .await;
            Ok(see_other(SHEET_PATH))
        }
        Err(errors) => {
            let body = mark_page(&enrollment, &user, &form, &errors);
            Ok(state.invalid(&me, "Mark Attendance", &body).await)
        }
    }
}

// =============================================================================
// HISTORY & EXPORT
// =============================================================================

pub async fn history_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Query(query): Query<HistoryQuery>,
) -> PageResult {
    let body = {
        let r = state.store.read()?;
        let lecturer = lecturer_of(&r, &me)?;
        let courses = academics::courses_of_lecturer(&r, lecturer.id)?;
        let course = match parse_opt(&query.course) {
            Some(id) => Some(export::taught_course(&r, lecturer.id, id)?),
            None => courses.first().cloned(),
        };
        let anchor = query.date_or(today());
        let period = query.period();

        let none = FormErrors::new();
        let course_options: Vec<(String, String)> = courses
            .iter()
            .map(|c| (c.id.to_string(), format!("{} ({})", c.name, c.code)))
            .collect();
        let period_options: Vec<(String, String)> = Period::ALL
            .iter()
            .map(|p| (p.as_str().to_string(), p.as_str().to_string()))
            .collect();
        let selected_course = course.as_ref().map(|c| c.id.to_string()).unwrap_or_default();
        let filters = format!(
            "{}{}{}",
            html::select("course", "Course", &course_options, &selected_course, &none),
            html::input("date", "date", "Date", &anchor.to_string(), &none),
            html::select("period", "Period", &period_options, period.as_str(), &none),
        );
        let mut body = html::filter_form("/lecturer/attendance/history/", &filters);

        if let Some(course) = course {
            let history = attendance::history(&r, course.id, anchor, period)?;
            let mut headers: Vec<String> = vec!["Student".to_string()];
            headers.extend(history.days.iter().map(|d| d.format("%d-%m").to_string()));
            headers.extend(
                ["Present", "Absent", "Late", "Excused", "Attendance"].map(String::from),
            );
            let header_refs: Vec<&str> = headers.iter().map(String::as_str).collect();

            let rows: Vec<Vec<String>> = history
                .rows
                .iter()
                .map(|row| {
                    let mut cells = vec![html::escape(row.user.display_name())];
                    cells.extend(row.days.iter().map(|d| {
                        format!("{} / {}", status_text(d.morning), status_text(d.evening))
                    }));
                    cells.extend([
                        row.present.to_string(),
                        row.absent.to_string(),
                        row.late.to_string(),
                        row.excused.to_string(),
                        percent_text(row.percentage),
                    ]);
                    cells
                })
                .collect();
            body.push_str(&html::heading(&format!("{} ({})", course.name, course.code)));
            body.push_str(&html::table(&header_refs, &rows));
            body.push_str(&html::link(
                &format!(
                    "/lecturer/attendance/export/?course={}&date={}",
                    course.id,
                    anchor.format(EXPORT_DATE_FORMAT)
                ),
                "Export this day",
            ));
        }
        body
    };
    state.show(&me, "Attendance History", &body).await
}

/// `?course=<id>&date=<dd-mm-yyyy>` as CSV.
pub async fn attendance_export_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Query(query): Query<ExportQuery>,
) -> PageResult {
    let r = state.store.read()?;
    let lecturer = lecturer_of(&r, &me)?;
    let course_id = parse_opt(&query.course).ok_or(SisError::NotFound("Course"))?;
    let course = export::taught_course(&r, lecturer.id, course_id)?;
    let date = export::parse_export_date(&query.date)
        .ok_or_else(|| ApiError::BadRequest("Invalid date format. Use dd-mm-yyyy.".to_string()))?;
    let bytes = export::attendance_csv(&r, course.id, date)?;
    Ok(csv_download(&export::attendance_filename(&course, date), bytes))
}

// =============================================================================
// CLASS GROUPS
// =============================================================================

pub async fn class_attendance_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Path(id): Path<ClassGroupId>,
) -> PageResult {
    let (title, body) = {
        let r = state.store.read()?;
        let group = taught_group(&r, &me, id)?;
        let rows: Vec<Vec<String>> = attendance::class_summary(&r, id)?
            .iter()
            .map(|row| {
                vec![
                    html::escape(row.user.display_name()),
                    row.tally.present.to_string(),
                    row.tally.total.to_string(),
                    percent_text(row.percentage),
                ]
            })
            .collect();
        (
            format!("Attendance: {}", group.name),
            html::table(&["Student", "Present", "Total", "Attendance"], &rows),
        )
    };
    state.show(&me, &title, &body).await
}

pub async fn roster_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Path(id): Path<ClassGroupId>,
    Query(query): Query<SearchQuery>,
) -> PageResult {
    let (title, body) = {
        let r = state.store.read()?;
        let group = taught_group(&r, &me, id)?;
        let rows: Vec<Vec<String>> = academics::class_group_students(&r, id, query.q.trim())?
            .iter()
            .map(|(enrollment, user, profile)| {
                vec![
                    html::escape(user.display_name()),
                    html::escape(&user.email),
                    html::or_dash(&profile.registration_number),
                    enrollment.date_enrolled.to_string(),
                    format!(
                        "{} {}",
                        student_links(profile.id),
                        html::link(
                            &format!("/lecturer/attendance/mark/{}/", enrollment.id),
                            "Mark",
                        ),
                    ),
                ]
            })
            .collect();
        let filters = html::text("q", "Search", &query.q, &FormErrors::new());
        (
            format!("Students: {}", group.name),
            format!(
                "{}<p>{}</p>{}",
                html::filter_form(&format!("/lecturer/classgroup/{}/students/", id), &filters),
                html::link(&format!("/lecturer/classgroup/{}/export/students/", id), "Export CSV"),
                html::table(&["Name", "Email", "Registration no.", "Enrolled", ""], &rows),
            ),
        )
    };
    state.show(&me, &title, &body).await
}

pub async fn roster_export_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Path(id): Path<ClassGroupId>,
) -> PageResult {
    let r = state.store.read()?;
    let group = taught_group(&r, &me, id)?;
    let bytes = export::class_students_csv(&r, id)?;
    Ok(csv_download(&export::class_students_filename(&group), bytes))
}

// =============================================================================
// ACHIEVEMENTS & DISCIPLINE
// =============================================================================

fn achievements_page(
    r: &impl Reader,
    id: StudentId,
    form: &AchievementForm,
    errors: &FormErrors,
) -> Result<String, SisError> {
    let rows: Vec<Vec<String>> = records::achievements_of(r, id)?
        .iter()
        .map(|a| {
            vec![
                a.date_awarded.to_string(),
                html::escape(&a.title),
                html::escape(&a.description),
            ]
        })
        .collect();
    let fields = [
        html::text("title", "Title", &form.title, errors),
        html::textarea("description", "Description", &form.description, errors),
        html::input("date", "date_awarded", "Date awarded", &form.date_awarded, errors),
    ]
    .concat();
    Ok(format!(
        "{}{}{}",
        html::table(&["Date", "Title", "Description"], &rows),
        html::heading("Add achievement"),
        html::form(&format!("/lecturer/students/{}/achievements/", id), errors, &fields, "Add"),
    ))
}

pub async fn achievements_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Path(id): Path<StudentId>,
) -> PageResult {
    let (title, body) = {
        let r = state.store.read()?;
        let (_, user) = student_of(&r, id)?;
        (
            format!("Achievements: {}", user.display_name()),
            achievements_page(&r, id, &AchievementForm::default(), &FormErrors::new())?,
        )
    };
    state.show(&me, &title, &body).await
}

pub async fn achievement_add_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Path(id): Path<StudentId>,
    Form(form): Form<AchievementForm>,
) -> PageResult {
    match form_result(records::add_achievement(&state.store, id, &form))? {
        Ok(_) => {
            state.flash(&me, "Achievement added successfully.").await;
            Ok(see_other(&format!("/lecturer/students/{}/achievements/", id)))
        }
        Err(errors) => {
            let (title, body) = {
                let r = state.store.read()?;
                let (_, user) = student_of(&r, id)?;
                (
                    format!("Achievements: {}", user.display_name()),
                    achievements_page(&r, id, &form, &errors)?,
                )
            };
            Ok(state.invalid(&me, &title, &body).await)
        }
    }
}

pub async fn disciplinary_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Path(id): Path<StudentId>,
) -> PageResult {
    let (title, body) = {
        let r = state.store.read()?;
        let (_, user) = student_of(&r, id)?;
        let mut rows = Vec::new();
        for d in records::disciplinary_of(&r, id)? {
            let reporter = match d.reported_by {
                Some(uid) => r.get::<User>(uid)?.map(|u| u.full_name).unwrap_or_default(),
                None => String::new(),
            };
            rows.push(vec![
                d.date.to_string(),
                html::escape(&d.action),
                html::escape(&d.description),
                html::or_dash(&reporter),
            ]);
        }
        (
            format!("Disciplinary Actions: {}", user.display_name()),
            format!(
                "<p>{}</p>{}",
                html::link(
                    &format!("/lecturer/students/{}/take-disciplinary-action/", id),
                    "Take action",
                ),
                html::table(&["Date", "Action", "Description", "Reported by"], &rows),
            ),
        )
    };
    state.show(&me, &title, &body).await
}

fn disciplinary_page(id: StudentId, form: &DisciplinaryForm, errors: &FormErrors) -> String {
    let fields = [
        html::text("action", "Action", &form.action, errors),
        html::textarea("description", "Description", &form.description, errors),
        html::input("date", "date", "Date", &form.date, errors),
    ]
    .concat();
    html::form(
        &format!("/lecturer/students/{}/take-disciplinary-action/", id),
        errors,
        &fields,
        "Record",
    )
}

pub async fn disciplinary_form_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Path(id): Path<StudentId>,
) -> PageResult {
    let (_, user) = student_of(&state.store.read()?, id)?;
    let form = DisciplinaryForm {
        date: today().to_string(),
        ..DisciplinaryForm::default()
    };
    let body = disciplinary_page(id, &form, &FormErrors::new());
    state
        .show(&me, &format!("Disciplinary Action: {}", user.display_name()), &body)
        .await
}

pub async fn disciplinary_add_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Path(id): Path<StudentId>,
    Form(form): Form<DisciplinaryForm>,
) -> PageResult {
    match form_result(records::add_disciplinary(&state.store, id, me.user.id, &form))? {
        Ok(action) => {
            tracing::info!(
                student_id = id.0,
                action_id = action.id.0,
                "Disciplinary action recorded"
            );
            state.flash(&me, "Disciplinary action recorded successfully.").await;
            Ok(see_other(&format!("/lecturer/students/{}/disciplinary-actions/", id)))
        }
        Err(errors) => {
            let body = disciplinary_page(id, &form, &errors);
            Ok(state.invalid(&me, "Disciplinary Action", &body).await)
        }
    }
}

// =============================================================================
// FULL DETAILS
// =============================================================================

pub async fn full_details_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Path(id): Path<StudentId>,
) -> PageResult {
    let (title, body) = {
        let r = state.store.read()?;
        let (profile, _) = student_of(&r, id)?;
        let full = records::full_details(&r, profile.user_id)?;
        let detail = &full.detail;
        let user = &detail.user;

        let mut body = html::details(&[
            ("Email", user.email.clone()),
            ("IC number", user.identity_card_number.clone()),
            ("Registration number", detail.profile.registration_number.clone()),
            (
                "Department",
                detail.department.as_ref().map(|d| d.name.clone()).unwrap_or_default(),
            ),
            (
                "Class group",
                detail.class_group.as_ref().map(|g| g.name.clone()).unwrap_or_default(),
            ),
            ("Phone number", user.phone_number.clone()),
            ("Date of birth", date_text(detail.profile.date_of_birth)),
            ("Latest activity", datetime_text(detail.profile.latest_activity)),
            ("Emergency contact", detail.profile.emergency_name.clone()),
            ("Emergency phone", detail.profile.emergency_phone.clone()),
        ]);
        body.push_str(&html::post_button(
            &format!("/lecturer/students/{}/update-activity/", id),
            "Update latest activity",
        ));

        let classes: Vec<Vec<String>> = full
            .lecturers
            .iter()
            .map(|(group, lecturers)| {
                let names: Vec<&str> = lecturers.iter().map(|u| u.display_name()).collect();
                vec![
                    html::escape(&group.name),
                    group.year.to_string(),
                    html::or_dash(&names.join(", ")),
                ]
            })
            .collect();
        body.push_str(&html::heading("Class groups"));
        body.push_str(&html::table(&["Class group", "Year", "Lecturers"], &classes));

        let achievements: Vec<Vec<String>> = full
            .achievements
            .iter()
            .map(|a| vec![a.date_awarded.to_string(), html::escape(&a.title)])
            .collect();
        body.push_str(&html::heading("Achievements"));
        body.push_str(&html::table(&["Date", "Title"], &achievements));

        let conduct: Vec<Vec<String>> = full
            .disciplinary
            .iter()
            .map(|d| vec![d.date.to_string(), html::escape(&d.action)])
            .collect();
        body.push_str(&html::heading("Disciplinary actions"));
        body.push_str(&html::table(&["Date", "Action"], &conduct));

        let parents: Vec<Vec<String>> = detail
            .parents
            .iter()
            .map(|p| {
                vec![
                    html::escape(&p.full_name),
                    html::escape(&p.roles_list().join(", ")),
                    html::or_dash(&p.phone_number),
                ]
            })
            .collect();
        body.push_str(&html::heading("Guardians"));
        body.push_str(&html::table(&["Name", "Roles", "Phone"], &parents));
        body.push_str(&format!("<p>{}</p>", student_links(id)));

        (user.display_name().to_string(), body)
    };
    state.show(&me, &title, &body).await
}

pub async fn update_activity_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Path(id): Path<StudentId>,
) -> PageResult {
    let profile = records::touch_activity(&state.store, id, Utc::now())?;
    let user = state.store.read()?.fetch::<User>(profile.user_id)?;
    state
        .flash(&me, format!("Updated latest activity for {}.", user.full_name))
        .await;
    Ok(see_other(&format!("/lecturer/students/{}/full-details/", id)))
}

// =============================================================================
// GUARDIANS
// =============================================================================

pub async fn parents_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Path(id): Path<StudentId>,
) -> PageResult {
    let (title, body) = {
        let r = state.store.read()?;
        let parents = records::guardians_of(&r, me.user.id, id)?;
        let (_, user) = student_of(&r, id)?;
        let rows: Vec<Vec<String>> = parents
            .iter()
            .map(|p| {
                vec![
                    html::escape(&p.full_name),
                    html::escape(&p.roles_list().join(", ")),
                    html::or_dash(&p.phone_number),
                    html::or_dash(&p.email),
                    html::post_button(
                        &format!("/lecturer/students/{}/parents/{}/remove/", id, p.id),
                        "Remove",
                    ),
                ]
            })
            .collect();
        (
            format!("Guardians: {}", user.display_name()),
            format!(
                "<p>{}</p>{}",
                html::link(&format!("/lecturer/students/{}/parents/add/", id), "Add guardian"),
                html::table(&["Name", "Roles", "Phone", "Email", ""], &rows),
            ),
        )
    };
    state.show(&me, &title, &body).await
}

fn parent_page(id: StudentId, form: &ParentForm, errors: &FormErrors) -> String {
    html::form(
        &format!("/lecturer/students/{}/parents/add/", id),
        errors,
        &parent_fields(form, errors),
        "Save",
    )
}

pub async fn parent_form_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Path(id): Path<StudentId>,
) -> PageResult {
    records::ensure_manages(&state.store.read()?, me.user.id, id)?;
    let body = parent_page(id, &ParentForm::default(), &FormErrors::new());
    state.show(&me, "Add Guardian", &body).await
}

pub async fn parent_add_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Path(id): Path<StudentId>,
    Form(form): Form<ParentForm>,
) -> PageResult {
    match form_result(records::add_guardian(&state.store, me.user.id, id, &form))? {
        Ok(outcome) => {
            let message = match outcome {
                LinkOutcome::Linked(_) => "Parent/guardian saved and linked to the student.",
                LinkOutcome::AlreadyLinked(_) => "This parent/guardian is already linked.",
            };
            state.flash(&me, message).await;
            Ok(see_other(&format!("/lecturer/students/{}/parents/", id)))
        }
        Err(errors) => {
            let body = parent_page(id, &form, &errors);
            Ok(state.invalid(&me, "Add Guardian", &body).await)
        }
    }
}

pub async fn parent_remove_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Path((id, parent_id)): Path<(StudentId, ParentId)>,
) -> PageResult {
    records::unlink_guardian(&state.store, me.user.id, id, parent_id)?;
    state.flash(&me, "Parent/guardian unlinked from the student.").await;
    Ok(see_other(&format!("/lecturer/students/{}/parents/", id)))
}

// =============================================================================
// MESSAGES
// =============================================================================

fn message_page(form: &MessageForm, errors: &FormErrors) -> String {
    let fields = format!(
        "{}{}",
        html::input("email", "student_email", "Student email", &form.student_email, errors),
        html::textarea("message", "Message", &form.message, errors),
    );
    html::form("/lecturer/send-message/", errors, &fields, "Send")
}

pub async fn message_form_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
) -> PageResult {
    let body = message_page(&MessageForm::default(), &FormErrors::new());
    state.show(&me, "Send Message", &body).await
}

pub async fn message_send_handler(
    State(state): State<AppState>,
    LecturerUser(me): LecturerUser,
    Form(form): Form<MessageForm>,
) -> PageResult {
    match form_result(notifications::send_message(&state.store, &me.user, &form, Utc::now()))? {
        Ok(note) => {
            tracing::info!(recipient_id = note.recipient_id.0, "Message sent");
            state.flash(&me, "Message sent successfully.").await;
            Ok(see_other(auth::HOME_PATH))
        }
        Err(errors) => Ok(state.invalid(&me, "Send Message", &message_page(&form, &errors)).await),
    }
}
