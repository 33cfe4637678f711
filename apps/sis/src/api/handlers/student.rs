//! Student pages: own class, subjects, attendance and records.

use super::{datetime_text, today};
use crate::api::types::{CalendarQuery, parse_opt};
use crate::api::{AppState, CurrentUser, PageResult, StudentUser, html};
use axum::{
    Router,
    extract::{Path, Query, State},
    routing::get,
};
use sis_core::academics::{self, SubjectTeaching};
use sis_core::accounts;
use sis_core::attendance::{self, MonthCalendar};
use sis_core::records;
use sis_core::{AttendanceStatus, ClassGroup, ClassGroupId, Reader, SisError, StudentProfile};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/student/classmates/", get(classmates_handler))
        .route("/student/subjects/", get(subjects_handler))
        .route("/student/class-overview/", get(class_overview_handler))
        .route("/student/attendance/", get(attendance_handler))
        .route(
            "/student/attendance/{class_group}/",
            get(attendance_detail_handler),
        )
        .route("/student/achievements/", get(achievements_handler))
        .route("/student/disciplinary/", get(disciplinary_handler))
}

const NO_CLASS: &str = "You are not assigned to a class group.";

/// The student's profile and home class group.
fn home_class(
    r: &impl Reader,
    me: &CurrentUser,
) -> Result<(StudentProfile, Option<ClassGroup>), SisError> {
    let profile = accounts::student_profile(r, me.user.id)?;
    let group = match profile.class_group_id {
        Some(id) => r.get::<ClassGroup>(id)?,
        None => None,
    };
    Ok((profile, group))
}

fn subjects_of(r: &impl Reader, group: &ClassGroup) -> Result<Vec<SubjectTeaching>, SisError> {
    match group.course_id {
        Some(course) => academics::subjects_with_lecturers(r, course),
        None => Ok(Vec::new()),
    }
}

fn subject_table(subjects: &[SubjectTeaching]) -> String {
    let rows: Vec<Vec<String>> = subjects
        .iter()
        .map(|row| {
            let names: Vec<&str> = row.lecturers.iter().map(|u| u.display_name()).collect();
            vec![
                html::escape(&row.subject.code),
                html::escape(&row.subject.name),
                html::or_dash(&names.join(", ")),
            ]
        })
        .collect();
    html::table(&["Code", "Subject", "Lecturers"], &rows)
}

// =============================================================================
// CLASS
// =============================================================================

pub async fn classmates_handler(
    State(state): State<AppState>,
    StudentUser(me): StudentUser,
) -> PageResult {
    let body = {
        let r = state.store.read()?;
        match home_class(&r, &me)? {
            (profile, Some(group)) => {
                let rows: Vec<Vec<String>> = academics::class_group_members(&r, group.id)?
                    .iter()
                    .map(|(mate, user)| {
                        let name = if mate.id == profile.id {
                            format!("{} (you)", user.display_name())
                        } else {
                            user.display_name().to_string()
                        };
                        vec![html::escape(&name), html::escape(&user.email)]
                    })
                    .collect();
                format!("{}{}", html::heading(&group.name), html::table(&["Name", "Email"], &rows))
            }
            (_, None) => html::paragraph(NO_CLASS),
        }
    };
    state.show(&me, "Classmates", &body).await
}

pub async fn subjects_handler(
    State(state): State<AppState>,
    StudentUser(me): StudentUser,
) -> PageResult {
    let body = {
        let r = state.store.read()?;
        match home_class(&r, &me)? {
            (_, Some(group)) => subject_table(&subjects_of(&r, &group)?),
            (_, None) => html::paragraph(NO_CLASS),
        }
    };
    state.show(&me, "Subjects", &body).await
}

pub async fn class_overview_handler(
    State(state): State<AppState>,
    StudentUser(me): StudentUser,
) -> PageResult {
    let body = {
        let r = state.store.read()?;
        match home_class(&r, &me)? {
            (profile, Some(group)) => {
                let course = match group.course_id {
                    Some(id) => r.get::<sis_core::Course>(id)?.map(|c| c.name).unwrap_or_default(),
                    None => String::new(),
                };
                let classmates: Vec<Vec<String>> = academics::class_group_members(&r, group.id)?
                    .iter()
                    .filter(|(mate, _)| mate.id != profile.id)
                    .map(|(_, user)| {
                        vec![html::escape(user.display_name()), html::escape(&user.email)]
                    })
                    .collect();
                format!(
                    "{}{}{}{}{}",
                    html::details(&[
                        ("Class group", group.name.clone()),
                        ("Course", course),
                        ("Year", group.year.to_string()),
                        ("Classroom", group.classroom.clone()),
                    ]),
                    html::heading("Subjects"),
                    subject_table(&subjects_of(&r, &group)?),
                    html::heading("Classmates"),
                    html::table(&["Name", "Email"], &classmates),
                )
            }
            (_, None) => html::paragraph(NO_CLASS),
        }
    };
    state.show(&me, "Class Overview", &body).await
}

// =============================================================================
// ATTENDANCE
// =============================================================================

pub async fn attendance_handler(
    State(state): State<AppState>,
    StudentUser(me): StudentUser,
) -> PageResult {
    let body = {
        let r = state.store.read()?;
        let profile = accounts::student_profile(&r, me.user.id)?;
        let overview = attendance::student_overview(&r, profile.id)?;
        let rows: Vec<Vec<String>> = overview
            .per_class
            .iter()
            .map(|c| {
                vec![
                    html::link(
                        &format!("/student/attendance/{}/", c.class_group.id),
                        &c.class_group.name,
                    ),
                    c.tally.present.to_string(),
                    c.tally.total.to_string(),
                    format!("{}%", c.percentage),
                ]
            })
            .collect();
        format!(
            "{}{}",
            html::details(&[("Average attendance", format!("{}%", overview.average))]),
            html::table(&["Class group", "Present", "Total", "Attendance"], &rows),
        )
    };
    state.show(&me, "My Attendance", &body).await
}

fn status_cell(status: Option<AttendanceStatus>) -> String {
    match status {
        Some(s) => format!("<span class=\"status-{}\">{}</span>", s.as_str(), s.label()),
        None => "-".to_string(),
    }
}

fn calendar_view(base: &str, calendar: &MonthCalendar) -> String {
    let mut out = format!(
        "<p>{} <strong>{} {}</strong> {}</p><table class=\"calendar\"><thead><tr>",
        html::link(
            &format!("{}?mode=calendar&y={}&m={}", base, calendar.prev.0, calendar.prev.1),
            "Previous"
        ),
        calendar.month_name,
        calendar.year,
        html::link(
            &format!("{}?mode=calendar&y={}&m={}", base, calendar.next.0, calendar.next.1),
            "Next"
        ),
    );
    for day in ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"] {
        out.push_str(&format!("<th>{}</th>", day));
    }
    out.push_str("</tr></thead><tbody>");
    for week in &calendar.weeks {
        out.push_str("<tr>");
        for cell in week {
            let mut class = Vec::new();
            if !cell.in_month {
                class.push("outside");
            }
            if cell.is_today {
                class.push("today");
            }
            out.push_str(&format!(
                "<td class=\"{}\">{}<br>{} / {}</td>",
                class.join(" "),
                cell.date.format("%d"),
                status_cell(cell.morning),
                status_cell(cell.evening),
            ));
        }
        out.push_str("</tr>");
    }
    out.push_str("</tbody></table>");
    out
}

pub async fn attendance_detail_handler(
    State(state): State<AppState>,
    StudentUser(me): StudentUser,
    Path(class_group): Path<ClassGroupId>,
    Query(query): Query<CalendarQuery>,
) -> PageResult {
    let (title, body) = {
        let r = state.store.read()?;
        let profile = accounts::student_profile(&r, me.user.id)?;
        let detail = attendance::student_detail(
            &r,
            profile.id,
            class_group,
            parse_opt(&query.y),
            parse_opt(&query.m),
            today(),
        )?;
        let base = format!("/student/attendance/{}/", class_group);

        let mut body = html::details(&[
            ("Total sessions", detail.total.to_string()),
            ("Attended", detail.attended.to_string()),
            ("Absences", detail.absences.to_string()),
            ("Attendance", format!("{}%", detail.percentage.to_tenths_string())),
        ]);
        body.push_str(&format!(
            "<p>{} {}</p>",
            html::link(&format!("{}?mode=table", base), "Table"),
            html::link(&format!("{}?mode=calendar", base), "Calendar"),
        ));
        if query.is_calendar() {
            body.push_str(&calendar_view(&base, &detail.calendar));
        } else {
            let rows: Vec<Vec<String>> = detail
                .daily
                .iter()
                .map(|day| {
                    let remarks: Vec<&str> = [&day.morning, &day.evening]
                        .into_iter()
                        .flatten()
                        .map(|m| m.description.as_str())
                        .filter(|d| !d.is_empty())
                        .collect();
                    vec![
                        day.date.to_string(),
                        status_cell(day.morning.as_ref().map(|m| m.status)),
                        status_cell(day.evening.as_ref().map(|m| m.status)),
                        html::or_dash(&remarks.join("; ")),
                    ]
                })
                .collect();
            body.push_str(&html::table(&["Date", "Morning", "Evening", "Remarks"], &rows));
        }
        (format!("Attendance: {}", detail.class_group.name), body)
    };
    state.show(&me, &title, &body).await
}

// =============================================================================
// RECORDS
// =============================================================================

pub async fn achievements_handler(
    State(state): State<AppState>,
    StudentUser(me): StudentUser,
) -> PageResult {
    let rows: Vec<Vec<String>> = {
        let r = state.store.read()?;
        let profile = accounts::student_profile(&r, me.user.id)?;
        records::achievements_of(&r, profile.id)?
            .iter()
            .map(|a| {
                vec![
                    a.date_awarded.to_string(),
                    html::escape(&a.title),
                    html::escape(&a.description),
                ]
            })
            .collect()
    };
    let body = html::table(&["Date", "Title", "Description"], &rows);
    state.show(&me, "My Achievements", &body).await
}

pub async fn disciplinary_handler(
    State(state): State<AppState>,
    StudentUser(me): StudentUser,
) -> PageResult {
    let body = {
        let r = state.store.read()?;
        let profile = accounts::student_profile(&r, me.user.id)?;
        let rows: Vec<Vec<String>> = records::disciplinary_of(&r, profile.id)?
            .iter()
            .map(|d| {
                vec![
                    d.date.to_string(),
                    html::escape(&d.action),
                    html::escape(&d.description),
                ]
            })
            .collect();
        format!(
            "{}{}",
            html::details(&[("Latest activity", datetime_text(profile.latest_activity))]),
            html::table(&["Date", "Action", "Description"], &rows),
        )
    };
    state.show(&me, "Disciplinary Record", &body).await
}
