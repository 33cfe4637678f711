//! # Admin Portal
//!
//! Catalogue (departments, courses, subjects, class groups), people
//! (lecturers, staff, students), enrollment and fee plans. Every page
//! requires an [`AdminUser`].

use super::{
    class_group_options, csv_download, date_text, department_name, department_options, today,
};
use crate::api::types::{
    ClassGroupOption, DepartmentQuery, LecturerListQuery, StudentListQuery, parse_opt,
};
use crate::api::{
    AdminUser, ApiError, AppState, CurrentUser, PageResult, form_result, html, see_other,
};
use axum::{
    Json, Router,
    extract::{Form, Path, Query, State},
    routing::{get, post},
};
use chrono::Utc;
use serde::Deserialize;
use sis_core::academics::{
    self, ClassGroupForm, CourseForm, DepartmentForm, EnrollOutcome, STAFF_NOT_PERMITTED,
    StudentEditForm, StudentForm, SubjectForm,
};
use sis_core::accounts::AccountForm;
use sis_core::fees::{self, FeePlanForm, InstallmentForm, PlanFilter};
use sis_core::{
    ClassGroup, ClassGroupId, CourseId, FeePlanId, FeePlanStatus, FormErrors, InstallmentId,
    Reader, SisError, StudentId, StudentProfile, User, UserId, export,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        // lecturers
        .route("/adminportal/lecturers/", get(lecturer_list_handler))
        .route(
            "/adminportal/lecturers/add/",
            get(lecturer_form_handler).post(lecturer_add_handler),
        )
        .route("/adminportal/lecturers/export/", get(lecturer_export_handler))
        // students
        .route("/adminportal/students/", get(student_list_handler))
        .route(
            "/adminportal/students/add/",
            get(student_form_handler).post(student_add_handler),
        )
        .route(
            "/adminportal/students/classgroups_by_department/",
            get(classgroups_by_department_handler),
        )
        .route("/adminportal/students/export/", get(student_export_handler))
        .route("/adminportal/students/{id}/", get(student_detail_handler))
        .route(
            "/adminportal/students/{id}/edit/",
            get(student_edit_form_handler).post(student_edit_handler),
        )
        .route(
            "/adminportal/students/{id}/enroll/",
            get(enroll_form_handler).post(enroll_handler),
        )
        // staff
        .route("/adminportal/staff/", get(staff_list_handler))
        .route(
            "/adminportal/staff/add/",
            get(staff_form_handler).post(staff_add_handler),
        )
        // catalogue
        .route("/adminportal/courses/", get(course_list_handler))
        .route(
            "/adminportal/courses/add/",
            get(course_form_handler).post(course_add_handler),
        )
        .route(
            "/adminportal/courses/{id}/edit/",
            get(course_edit_form_handler).post(course_edit_handler),
        )
        .route("/adminportal/courses/export/", get(course_export_handler))
        .route(
            "/adminportal/classgroup/add/",
            get(class_group_form_handler).post(class_group_add_handler),
        )
        .route(
            "/adminportal/classgroup/{id}/edit/",
            get(class_group_edit_form_handler).post(class_group_edit_handler),
        )
        .route(
            "/adminportal/classgroup/{id}/assign-lecturers/",
            get(assign_form_handler).post(assign_handler),
        )
        .route(
            "/adminportal/subject/add/",
            get(subject_form_handler).post(subject_add_handler),
        )
        .route("/adminportal/departments/", get(department_list_handler))
        .route(
            "/adminportal/departments/add/",
            get(department_form_handler).post(department_add_handler),
        )
        // fees
        .route("/adminportal/fees/", get(fee_list_handler))
        .route(
            "/adminportal/fees/new/",
            get(fee_form_handler).post(fee_create_handler),
        )
        .route(
            "/adminportal/fees/student/{student_id}/new/",
            get(fee_student_form_handler).post(fee_student_create_handler),
        )
        .route(
            "/adminportal/fees/plan/{plan_id}/",
            get(fee_detail_handler).post(installment_update_handler),
        )
        .route(
            "/adminportal/fees/plan/{plan_id}/generate/",
            post(fee_generate_handler),
        )
        .route(
            "/adminportal/fees/installment/{id}/toggle/",
            post(installment_toggle_handler),
        )
}

/// Raw form bodies that only this section posts.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnrollForm {
    pub class_group: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AssignForm {
    pub lecturers: String,
}

fn course_options(r: &impl Reader) -> Result<Vec<(String, String)>, SisError> {
    Ok(academics::list_courses(r)?
        .into_iter()
        .map(|c| (c.id.to_string(), format!("{} ({})", c.name, c.code)))
        .collect())
}

/// `id: name` reference list shown next to free-text id fields.
fn lecturer_hint(r: &impl Reader) -> Result<String, SisError> {
    let names: Vec<String> = academics::list_lecturers(r, "", None)?
        .iter()
        .map(|row| format!("{}: {}", row.profile.id, row.user.display_name()))
        .collect();
    Ok(html::paragraph(&format!("Lecturers - {}", names.join("; "))))
}

fn account_fields(
    form: &AccountForm,
    errors: &FormErrors,
    departments: &[(String, String)],
) -> String {
    [
        html::input("email", "email", "Email", &form.email, errors),
        html::text("identity_card_number", "IC number", &form.identity_card_number, errors),
        html::text("full_name", "Full name", &form.full_name, errors),
        html::text("short_name", "Short name", &form.short_name, errors),
        html::text("phone_number", "Phone number", &form.phone_number, errors),
        html::textarea("address", "Address", &form.address, errors),
        html::select("department", "Department", departments, &form.department, errors),
        html::input("date", "date_joined", "Date joined", &form.date_joined, errors),
        html::input("password", "password", "Password (blank for the default)", "", errors),
        html::input("password", "confirm_password", "Confirm password", "", errors),
    ]
    .concat()
}

// =============================================================================
// LECTURERS
// =============================================================================

pub async fn lecturer_list_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Query(query): Query<LecturerListQuery>,
) -> PageResult {
    let body = {
        let r = state.store.read()?;
        let lecturers = academics::list_lecturers(&r, &query.q, parse_opt(&query.department))?;
        let rows: Vec<Vec<String>> = lecturers
            .iter()
            .map(|row| {
                let groups: Vec<&str> = row.class_groups.iter().map(|g| g.name.as_str()).collect();
                vec![
                    html::escape(row.user.display_name()),
                    html::escape(&row.user.email),
                    html::or_dash(&row.profile.phone_number),
                    html::or_dash(
                        &row.department.as_ref().map(|d| d.name.clone()).unwrap_or_default(),
                    ),
                    html::or_dash(&groups.join(", ")),
                ]
            })
            .collect();
        let filters = format!(
            "{}{}",
            html::text("q", "Search", &query.q, &FormErrors::new()),
            html::select(
                "department",
                "Department",
                &department_options(&r)?,
                &query.department,
                &FormErrors::new(),
            ),
        );
        format!(
            "{}<p>{} {}</p>{}",
            html::filter_form("/adminportal/lecturers/", &filters),
            html::link("/adminportal/lecturers/add/", "Add lecturer"),
            html::link("/adminportal/lecturers/export/", "Export CSV"),
            html::table(&["Name", "Email", "Phone", "Department", "Class groups"], &rows),
        )
    };
    state.show(&me, "Lecturers", &body).await
}

fn lecturer_page(
    state: &AppState,
    form: &AccountForm,
    errors: &FormErrors,
) -> Result<String, SisError> {
    let r = state.store.read()?;
    let subjects: Vec<String> = r
        .all::<sis_core::Subject>()?
        .iter()
        .map(|s| format!("{}: {}", s.id, s.label()))
        .collect();
    let fields = format!(
        "{}{}{}",
        account_fields(form, errors, &department_options(&r)?),
        html::text("subjects", "Subject ids (comma separated)", &form.subjects, errors),
        html::paragraph(&format!("Subjects - {}", subjects.join("; "))),
    );
    Ok(html::form("/adminportal/lecturers/add/", errors, &fields, "Add lecturer"))
}

pub async fn lecturer_form_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
) -> PageResult {
    let body = lecturer_page(&state, &AccountForm::default(), &FormErrors::new())?;
    state.show(&me, "Add Lecturer", &body).await
}

pub async fn lecturer_add_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Form(form): Form<AccountForm>,
) -> PageResult {
    match form_result(academics::add_lecturer(&state.store, &form, Utc::now()))? {
        Ok(user) => {
            tracing::info!(user_id = user.id.0, "Lecturer added");
            state.flash(&me, "Lecturer added successfully.").await;
            Ok(see_other("/adminportal/lecturers/"))
        }
        Err(errors) => {
            let body = lecturer_page(&state, &form, &errors)?;
            Ok(state.invalid(&me, "Add Lecturer", &body).await)
        }
    }
}

pub async fn lecturer_export_handler(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
) -> PageResult {
    let bytes = export::lecturers_csv(&state.store.read()?)?;
    Ok(csv_download("lecturers.csv", bytes))
}

// =============================================================================
// STUDENTS
// =============================================================================

pub async fn student_list_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Query(query): Query<StudentListQuery>,
) -> PageResult {
    let body = {
        let r = state.store.read()?;
        let rows: Vec<Vec<String>> = academics::list_students(&r, &query.filter())?
            .iter()
            .map(|row| {
                let id = row.user.id;
                vec![
                    html::link(&format!("/adminportal/students/{}/", id), row.user.display_name()),
                    html::escape(&row.user.email),
                    html::or_dash(&row.profile.registration_number),
                    html::or_dash(
                        &row.department.as_ref().map(|d| d.name.clone()).unwrap_or_default(),
                    ),
                    format!(
                        "{} {} {}",
                        html::link(&format!("/adminportal/students/{}/edit/", id), "Edit"),
                        html::link(&format!("/adminportal/students/{}/enroll/", id), "Enroll"),
                        html::link(
                            &format!("/adminportal/fees/student/{}/new/", row.profile.id),
                            "Fee plan",
                        ),
                    ),
                ]
            })
            .collect();
        let none = FormErrors::new();
        let filters = format!(
            "{}{}{}",
            html::text("q", "Search", &query.q, &none),
            html::select(
                "department",
                "Department",
                &department_options(&r)?,
                &query.department,
                &none,
            ),
            html::select(
                "classgroup",
                "Class group",
                &class_group_options(&r)?,
                &query.classgroup,
                &none,
            ),
        );
        format!(
            "{}<p>{} {}</p>{}",
            html::filter_form("/adminportal/students/", &filters),
            html::link("/adminportal/students/add/", "Add student"),
            html::link("/adminportal/students/export/", "Export CSV"),
            html::table(&["Name", "Email", "Registration no.", "Department", ""], &rows),
        )
    };
    state.show(&me, "Students", &body).await
}

fn student_page(
    state: &AppState,
    form: &StudentForm,
    errors: &FormErrors,
) -> Result<String, SisError> {
    let r = state.store.read()?;
    let account = AccountForm {
        email: form.email.clone(),
        identity_card_number: form.identity_card_number.clone(),
        full_name: form.full_name.clone(),
        short_name: form.short_name.clone(),
        phone_number: form.phone_number.clone(),
        address: form.address.clone(),
        department: form.department.clone(),
        ..AccountForm::default()
    };
    let fields = [
        account_fields(&account, errors, &department_options(&r)?),
        html::select(
            "class_group",
            "Class group",
            &class_group_options(&r)?,
            &form.class_group,
            errors,
        ),
        html::text("registration_number", "Registration number", &form.registration_number, errors),
        html::input("date", "date_of_birth", "Date of birth", &form.date_of_birth, errors),
        html::text("emergency_name", "Emergency contact", &form.emergency_name, errors),
        html::text("emergency_relation", "Relation", &form.emergency_relation, errors),
        html::text("emergency_phone", "Emergency phone", &form.emergency_phone, errors),
    ]
    .concat();
    Ok(html::form("/adminportal/students/add/", errors, &fields, "Add student"))
}

pub async fn student_form_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
) -> PageResult {
    let body = student_page(&state, &StudentForm::default(), &FormErrors::new())?;
    state.show(&me, "Add Student", &body).await
}

pub async fn student_add_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Form(form): Form<StudentForm>,
) -> PageResult {
    match form_result(academics::add_student(&state.store, &form, Utc::now()))? {
        Ok(user) => {
            tracing::info!(user_id = user.id.0, "Student added");
            state
                .flash(&me, format!("Student {} added and enrolled successfully.", user.full_name))
                .await;
            Ok(see_other("/adminportal/students/"))
        }
        Err(errors) => {
            let body = student_page(&state, &form, &errors)?;
            Ok(state.invalid(&me, "Add Student", &body).await)
        }
    }
}

/// JSON list of a department's class groups, for the add-student page.
pub async fn classgroups_by_department_handler(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Query(query): Query<DepartmentQuery>,
) -> Result<Json<Vec<ClassGroupOption>>, ApiError> {
    let Some(department) = parse_opt(&query.department) else {
        return Ok(Json(Vec::new()));
    };
    let groups = academics::class_groups_by_department(&state.store.read()?, Some(department))?;
    Ok(Json(
        groups
            .into_iter()
            .map(|g| ClassGroupOption {
                id: g.id.0,
                name: g.name,
            })
            .collect(),
    ))
}

pub async fn student_export_handler(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
) -> PageResult {
    let bytes = export::students_csv(&state.store.read()?)?;
    Ok(csv_download("students.csv", bytes))
}

pub async fn student_detail_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Path(id): Path<UserId>,
) -> PageResult {
    let (title, body) = {
        let r = state.store.read()?;
        let detail = academics::student_detail(&r, id)?;
        let user = &detail.user;
        let profile = &detail.profile;
        let mut body = html::details(&[
            ("Email", user.email.clone()),
            ("IC number", user.identity_card_number.clone()),
            ("Registration number", profile.registration_number.clone()),
            (
                "Department",
                detail.department.as_ref().map(|d| d.name.clone()).unwrap_or_default(),
            ),
            (
                "Class group",
                detail.class_group.as_ref().map(|g| g.name.clone()).unwrap_or_default(),
            ),
            ("Phone number", user.phone_number.clone()),
            ("Date of birth", date_text(profile.date_of_birth)),
            ("Date joined", user.date_joined.date_naive().to_string()),
            ("Status", if user.is_active { "Active" } else { "Inactive" }.to_string()),
        ]);

        let enrollments: Vec<Vec<String>> = detail
            .enrollments
            .iter()
            .map(|(e, g)| {
                vec![
                    html::escape(&g.name),
                    g.year.to_string(),
                    e.date_enrolled.to_string(),
                ]
            })
            .collect();
        body.push_str(&html::heading("Enrollments"));
        body.push_str(&html::table(&["Class group", "Year", "Enrolled"], &enrollments));

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

        let plans: Vec<Vec<String>> = fees::plans_of_student(&r, profile.id)?
            .iter()
            .map(|p| {
                vec![
                    html::link(&format!("/adminportal/fees/plan/{}/", p.id), &p.description),
                    p.total_amount.to_string(),
                    p.status.label().to_string(),
                ]
            })
            .collect();
        body.push_str(&html::heading("Fee plans"));
        body.push_str(&html::table(&["Description", "Total", "Status"], &plans));

        body.push_str(&format!(
            "<p>{} {} {}</p>",
            html::link(&format!("/adminportal/students/{}/edit/", id), "Edit"),
            html::link(&format!("/adminportal/students/{}/enroll/", id), "Enroll"),
            html::link(&format!("/adminportal/fees/student/{}/new/", profile.id), "New fee plan"),
        ));
        (user.display_name().to_string(), body)
    };
    state.show(&me, &title, &body).await
}

fn student_edit_page(
    state: &AppState,
    id: UserId,
    form: &StudentEditForm,
    errors: &FormErrors,
) -> Result<String, SisError> {
    let departments = department_options(&state.store.read()?)?;
    let fields = [
        html::text("full_name", "Full name", &form.full_name, errors),
        html::text("short_name", "Short name", &form.short_name, errors),
        html::input("email", "email", "Email", &form.email, errors),
        html::select("department", "Department", &departments, &form.department, errors),
        html::text("phone_number", "Phone number", &form.phone_number, errors),
        html::textarea("address", "Address", &form.address, errors),
        html::input("date", "date_of_birth", "Date of birth", &form.date_of_birth, errors),
    ]
    .concat();
    Ok(html::form(&format!("/adminportal/students/{}/edit/", id), errors, &fields, "Save"))
}

pub async fn student_edit_form_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Path(id): Path<UserId>,
) -> PageResult {
    let detail = academics::student_detail(&state.store.read()?, id)?;
    let body = student_edit_page(&state, id, &StudentEditForm::from(&detail), &FormErrors::new())?;
    state.show(&me, "Edit Student", &body).await
}

pub async fn student_edit_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Path(id): Path<UserId>,
    Form(form): Form<StudentEditForm>,
) -> PageResult {
    match form_result(academics::edit_student(&state.store, id, &form))? {
        Ok(_) => {
            state.flash(&me, "Student information updated successfully.").await;
            Ok(see_other(&format!("/adminportal/students/{}/", id)))
        }
        Err(errors) => {
            let body = student_edit_page(&state, id, &form, &errors)?;
            Ok(state.invalid(&me, "Edit Student", &body).await)
        }
    }
}

pub async fn enroll_form_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Path(id): Path<UserId>,
) -> PageResult {
    let (name, body) = {
        let r = state.store.read()?;
        let detail = academics::student_detail(&r, id)?;
        let none = FormErrors::new();
        let options = class_group_options(&r)?;
        let field = html::select("class_group", "Class group", &options, "", &none);
        (
            detail.user.display_name().to_string(),
            html::form(&format!("/adminportal/students/{}/enroll/", id), &none, &field, "Enroll"),
        )
    };
    state.show(&me, &format!("Enroll {}", name), &body).await
}

pub async fn enroll_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Path(id): Path<UserId>,
    Form(form): Form<EnrollForm>,
) -> PageResult {
    let group: Option<ClassGroupId> = parse_opt(&form.class_group);
    match academics::enroll_student(&state.store, id, group, today()) {
        Ok(outcome) => {
            let (name, group_name) = {
                let r = state.store.read()?;
                let user = r.fetch::<User>(id)?;
                let group = match &outcome {
                    EnrollOutcome::Enrolled(e) | EnrollOutcome::AlreadyEnrolled(e) => {
                        r.fetch::<ClassGroup>(e.class_group_id)?
                    }
                };
                (user.full_name, group.name)
            };
            let message = match outcome {
                EnrollOutcome::Enrolled(_) => {
                    format!("{} enrolled in {} successfully.", name, group_name)
                }
                EnrollOutcome::AlreadyEnrolled(_) => {
                    format!("{} is already enrolled in {}.", name, group_name)
                }
            };
            state.flash(&me, message).await;
            Ok(see_other("/adminportal/students/"))
        }
        Err(SisError::Validation(errors)) => {
            for (_, messages) in errors.iter() {
                for message in messages {
                    state.flash(&me, message.clone()).await;
                }
            }
            Ok(see_other(&format!("/adminportal/students/{}/enroll/", id)))
        }
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// STAFF
// =============================================================================

pub async fn staff_list_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
) -> PageResult {
    let rows: Vec<Vec<String>> = academics::list_staff(&state.store.read()?)?
        .iter()
        .map(|u| {
            vec![
                html::escape(u.display_name()),
                html::escape(&u.email),
                html::or_dash(&u.phone_number),
                if u.is_superuser { "Yes" } else { "No" }.to_string(),
            ]
        })
        .collect();
    let body = format!(
        "<p>{}</p>{}",
        html::link("/adminportal/staff/add/", "Add staff"),
        html::table(&["Name", "Email", "Phone", "Superuser"], &rows),
    );
    state.show(&me, "Staff", &body).await
}

fn staff_page(
    state: &AppState,
    me: &CurrentUser,
    form: &AccountForm,
    errors: &FormErrors,
) -> Result<String, SisError> {
    if !me.user.is_superuser {
        return Ok(format!("<p class=\"error\">{}</p>", html::escape(STAFF_NOT_PERMITTED)));
    }
    let departments = department_options(&state.store.read()?)?;
    Ok(html::form(
        "/adminportal/staff/add/",
        errors,
        &account_fields(form, errors, &departments),
        "Add staff",
    ))
}

pub async fn staff_form_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
) -> PageResult {
    let body = staff_page(&state, &me, &AccountForm::default(), &FormErrors::new())?;
    state.show(&me, "Add Staff", &body).await
}

pub async fn staff_add_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Form(form): Form<AccountForm>,
) -> PageResult {
    match form_result(academics::add_staff(&state.store, &me.user, &form, Utc::now()))? {
        Ok(_) => {
            state.flash(&me, "Staff added successfully.").await;
            Ok(see_other("/adminportal/staff/"))
        }
        Err(errors) => {
            let body = staff_page(&state, &me, &form, &errors)?;
            Ok(state.invalid(&me, "Add Staff", &body).await)
        }
    }
}

// =============================================================================
// COURSES, SUBJECTS & CLASS GROUPS
// =============================================================================

pub async fn course_list_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
) -> PageResult {
    let body = {
        let r = state.store.read()?;
        let groups = academics::class_groups_by_department(&r, None)?;
        let mut rows = Vec::new();
        for course in academics::list_courses(&r)? {
            let subjects: Vec<String> = academics::subjects_of_course(&r, course.id)?
                .iter()
                .map(|s| s.label())
                .collect();
            let course_groups: Vec<String> = groups
                .iter()
                .filter(|g| g.course_id == Some(course.id))
                .map(|g| {
                    format!(
                        "{} ({}, {})",
                        html::escape(&g.name),
                        html::link(&format!("/adminportal/classgroup/{}/edit/", g.id), "edit"),
                        html::link(
                            &format!("/adminportal/classgroup/{}/assign-lecturers/", g.id),
                            "lecturers",
                        ),
                    )
                })
                .collect();
            rows.push(vec![
                html::escape(&course.name),
                html::escape(&course.code),
                html::or_dash(&department_name(&r, course.department_id)?),
                html::or_dash(&subjects.join(", ")),
                if course_groups.is_empty() { "-".to_string() } else { course_groups.join("<br>") },
                html::link(&format!("/adminportal/courses/{}/edit/", course.id), "Edit"),
            ]);
        }
        format!(
            "<p>{} {} {} {}</p>{}",
            html::link("/adminportal/courses/add/", "Add course"),
            html::link("/adminportal/subject/add/", "Add subject"),
            html::link("/adminportal/classgroup/add/", "Add class group"),
            html::link("/adminportal/courses/export/", "Export CSV"),
            html::table(&["Course", "Code", "Department", "Subjects", "Class groups", ""], &rows),
        )
    };
    state.show(&me, "Courses", &body).await
}

fn course_page(
    state: &AppState,
    action: &str,
    form: &CourseForm,
    errors: &FormErrors,
) -> Result<String, SisError> {
    let departments = department_options(&state.store.read()?)?;
    let fields = [
        html::text("name", "Name", &form.name, errors),
        html::text("code", "Code", &form.code, errors),
        html::select("department", "Department", &departments, &form.department, errors),
        html::textarea("description", "Description", &form.description, errors),
    ]
    .concat();
    Ok(html::form(action, errors, &fields, "Save"))
}

pub async fn course_form_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
) -> PageResult {
    let body = course_page(
        &state,
        "/adminportal/courses/add/",
        &CourseForm::default(),
        &FormErrors::new(),
    )?;
    state.show(&me, "Add Course", &body).await
}

pub async fn course_add_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Form(form): Form<CourseForm>,
) -> PageResult {
    match form_result(academics::add_course(&state.store, &form))? {
        Ok(_) => {
            state.flash(&me, "Course added successfully.").await;
            Ok(see_other("/adminportal/courses/"))
        }
        Err(errors) => {
            let body = course_page(&state, "/adminportal/courses/add/", &form, &errors)?;
            Ok(state.invalid(&me, "Add Course", &body).await)
        }
    }
}

pub async fn course_edit_form_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Path(id): Path<CourseId>,
) -> PageResult {
    let course = state.store.read()?.fetch::<sis_core::Course>(id)?;
    let action = format!("/adminportal/courses/{}/edit/", id);
    let body = course_page(&state, &action, &CourseForm::from(&course), &FormErrors::new())?;
    state.show(&me, "Edit Course", &body).await
}

pub async fn course_edit_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Path(id): Path<CourseId>,
    Form(form): Form<CourseForm>,
) -> PageResult {
    match form_result(academics::edit_course(&state.store, id, &form))? {
        Ok(_) => {
            state.flash(&me, "Course updated successfully.").await;
            Ok(see_other("/adminportal/courses/"))
        }
        Err(errors) => {
            let action = format!("/adminportal/courses/{}/edit/", id);
            let body = course_page(&state, &action, &form, &errors)?;
            Ok(state.invalid(&me, "Edit Course", &body).await)
        }
    }
}

pub async fn course_export_handler(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
) -> PageResult {
    let bytes = export::courses_csv(&state.store.read()?)?;
    Ok(csv_download("courses.csv", bytes))
}

fn subject_page(
    state: &AppState,
    form: &SubjectForm,
    errors: &FormErrors,
) -> Result<String, SisError> {
    let courses = course_options(&state.store.read()?)?;
    let fields = [
        html::select("course", "Course", &courses, &form.course, errors),
        html::text("name", "Name", &form.name, errors),
        html::text("code", "Code", &form.code, errors),
        html::textarea("description", "Description", &form.description, errors),
    ]
    .concat();
    Ok(html::form("/adminportal/subject/add/", errors, &fields, "Add subject"))
}

pub async fn subject_form_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
) -> PageResult {
    let body = subject_page(&state, &SubjectForm::default(), &FormErrors::new())?;
    state.show(&me, "Add Subject", &body).await
}

pub async fn subject_add_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Form(form): Form<SubjectForm>,
) -> PageResult {
    match form_result(academics::add_subject(&state.store, &form))? {
        Ok(subject) => {
            state.flash(&me, format!("Subject '{}' added successfully.", subject.name)).await;
            Ok(see_other("/adminportal/courses/"))
        }
        Err(errors) => {
            let body = subject_page(&state, &form, &errors)?;
            Ok(state.invalid(&me, "Add Subject", &body).await)
        }
    }
}

fn class_group_page(
    state: &AppState,
    action: &str,
    form: &ClassGroupForm,
    errors: &FormErrors,
) -> Result<String, SisError> {
    let r = state.store.read()?;
    let fields = [
        html::text("name", "Name", &form.name, errors),
        html::select("course", "Course", &course_options(&r)?, &form.course, errors),
        html::select(
            "department",
            "Department",
            &department_options(&r)?,
            &form.department,
            errors,
        ),
        html::input("number", "year", "Year", &form.year, errors),
        html::text("classroom", "Classroom", &form.classroom, errors),
        html::text("lecturers", "Lecturer ids (comma separated)", &form.lecturers, errors),
        lecturer_hint(&r)?,
    ]
    .concat();
    Ok(html::form(action, errors, &fields, "Save"))
}

pub async fn class_group_form_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
) -> PageResult {
    let body = class_group_page(
        &state,
        "/adminportal/classgroup/add/",
        &ClassGroupForm::default(),
        &FormErrors::new(),
    )?;
    state.show(&me, "Add Class Group", &body).await
}

pub async fn class_group_add_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Form(form): Form<ClassGroupForm>,
) -> PageResult {
    match form_result(academics::add_class_group(&state.store, &form, today()))? {
        Ok(group) => {
            state.flash(&me, format!("Class group '{}' added successfully.", group.name)).await;
            Ok(see_other("/adminportal/courses/"))
        }
        Err(errors) => {
            let body = class_group_page(&state, "/adminportal/classgroup/add/", &form, &errors)?;
            Ok(state.invalid(&me, "Add Class Group", &body).await)
        }
    }
}

pub async fn class_group_edit_form_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Path(id): Path<ClassGroupId>,
) -> PageResult {
    let group = state.store.read()?.fetch::<ClassGroup>(id)?;
    let action = format!("/adminportal/classgroup/{}/edit/", id);
    let body = class_group_page(
        &state,
        &action,
        &ClassGroupForm::from(&group),
        &FormErrors::new(),
    )?;
    state.show(&me, "Edit Class Group", &body).await
}

pub async fn class_group_edit_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Path(id): Path<ClassGroupId>,
    Form(form): Form<ClassGroupForm>,
) -> PageResult {
    match form_result(academics::edit_class_group(&state.store, id, &form, today()))? {
        Ok(group) => {
            state.flash(&me, format!("Class group '{}' updated successfully.", group.name)).await;
            Ok(see_other("/adminportal/courses/"))
        }
        Err(errors) => {
            let action = format!("/adminportal/classgroup/{}/edit/", id);
            let body = class_group_page(&state, &action, &form, &errors)?;
            Ok(state.invalid(&me, "Edit Class Group", &body).await)
        }
    }
}

fn assign_page(
    state: &AppState,
    group: &ClassGroup,
    raw: &str,
    errors: &FormErrors,
) -> Result<String, SisError> {
    let hint = lecturer_hint(&state.store.read()?)?;
    let fields = format!(
        "{}{}",
        html::text("lecturers", "Lecturer ids (comma separated)", raw, errors),
        hint
    );
    Ok(html::form(
        &format!("/adminportal/classgroup/{}/assign-lecturers/", group.id),
        errors,
        &fields,
        "Assign",
    ))
}

pub async fn assign_form_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Path(id): Path<ClassGroupId>,
) -> PageResult {
    let group = state.store.read()?.fetch::<ClassGroup>(id)?;
    let current = academics::join_ids(&group.lecturer_ids);
    let body = assign_page(&state, &group, &current, &FormErrors::new())?;
    state.show(&me, &format!("Assign Lecturers to {}", group.name), &body).await
}

pub async fn assign_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Path(id): Path<ClassGroupId>,
    Form(form): Form<AssignForm>,
) -> PageResult {
    match form_result(academics::assign_lecturers(&state.store, id, &form.lecturers))? {
        Ok(_) => {
            state.flash(&me, "Lecturers assigned to class group successfully.").await;
            Ok(see_other("/adminportal/courses/"))
        }
        Err(errors) => {
            let group = state.store.read()?.fetch::<ClassGroup>(id)?;
            let body = assign_page(&state, &group, &form.lecturers, &errors)?;
            Ok(state.invalid(&me, "Assign Lecturers", &body).await)
        }
    }
}

// =============================================================================
// DEPARTMENTS
// =============================================================================

pub async fn department_list_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
) -> PageResult {
    let rows: Vec<Vec<String>> = academics::list_departments(&state.store.read()?)?
        .iter()
        .map(|d| vec![html::escape(&d.name)])
        .collect();
    let body = format!(
        "<p>{}</p>{}",
        html::link("/adminportal/departments/add/", "Add department"),
        html::table(&["Name"], &rows),
    );
    state.show(&me, "Departments", &body).await
}

fn department_page(form: &DepartmentForm, errors: &FormErrors) -> String {
    html::form(
        "/adminportal/departments/add/",
        errors,
        &html::text("name", "Name", &form.name, errors),
        "Add department",
    )
}

pub async fn department_form_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
) -> PageResult {
    let body = department_page(&DepartmentForm::default(), &FormErrors::new());
    state.show(&me, "Add Department", &body).await
}

pub async fn department_add_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Form(form): Form<DepartmentForm>,
) -> PageResult {
    match form_result(academics::add_department(&state.store, &form))? {
        Ok(_) => {
            state.flash(&me, "Department added successfully.").await;
            Ok(see_other("/adminportal/departments/"))
        }
        Err(errors) => {
            let body = department_page(&form, &errors);
            Ok(state.invalid(&me, "Add Department", &body).await)
        }
    }
}

// =============================================================================
// FEES
// =============================================================================

fn status_options() -> Vec<(String, String)> {
    html::choices(FeePlanStatus::ALL, FeePlanStatus::as_str, FeePlanStatus::label)
}

pub async fn fee_list_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Query(filter): Query<PlanFilter>,
) -> PageResult {
    let list = fees::list_plans(&state.store.read()?, &filter)?;
    let rows: Vec<Vec<String>> = list
        .plans
        .iter()
        .map(|(plan, user)| {
            vec![
                html::escape(user.display_name()),
                html::link(&format!("/adminportal/fees/plan/{}/", plan.id), &plan.description),
                plan.total_amount.to_string(),
                plan.months.to_string(),
                plan.start_date.to_string(),
                plan.status.label().to_string(),
            ]
        })
        .collect();
    let none = FormErrors::new();
    let filters = format!(
        "{}{}",
        html::text("q", "Search", &filter.q, &none),
        html::select("status", "Status", &status_options(), &filter.status, &none),
    );
    let body = format!(
        "{}<p>{}</p>{}{}",
        html::filter_form("/adminportal/fees/", &filters),
        html::link("/adminportal/fees/new/", "New fee plan"),
        html::details(
            &[("Plans", list.count.to_string()), ("Total amount", list.total.to_string())],
        ),
        html::table(&["Student", "Description", "Total", "Months", "Start", "Status"], &rows),
    );
    state.show(&me, "Fee Plans", &body).await
}

fn plan_fields(form: &FeePlanForm, errors: &FormErrors) -> String {
    [
        html::text("description", "Description", &form.description, errors),
        html::text("total_amount", "Total amount", &form.total_amount, errors),
        html::input("number", "months", "Months", &form.months, errors),
        html::input("date", "start_date", "Start date", &form.start_date, errors),
        html::select("status", "Status", &status_options(), &form.status, errors),
    ]
    .concat()
}

fn fee_page(state: &AppState, form: &FeePlanForm, errors: &FormErrors) -> Result<String, SisError> {
    let r = state.store.read()?;
    let mut students = Vec::new();
    for profile in r.all::<StudentProfile>()? {
        if let Some(user) = r.get::<User>(profile.user_id)? {
            let label = format!("{} ({})", user.display_name(), user.email);
            students.push((profile.id.to_string(), label));
        }
    }
    students.sort_by(|a, b| a.1.cmp(&b.1));
    let fields = format!(
        "{}{}",
        html::select("student", "Student", &students, &form.student, errors),
        plan_fields(form, errors)
    );
    Ok(html::form("/adminportal/fees/new/", errors, &fields, "Create plan"))
}

pub async fn fee_form_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
) -> PageResult {
    let body = fee_page(&state, &FeePlanForm::default(), &FormErrors::new())?;
    state.show(&me, "New Fee Plan", &body).await
}

pub async fn fee_create_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Form(form): Form<FeePlanForm>,
) -> PageResult {
    match form_result(fees::create_plan(&state.store, &form, None, Utc::now()))? {
        Ok(plan) => {
            state.flash(&me, "Fee plan created. You can now generate installments.").await;
            Ok(see_other(&format!("/adminportal/fees/plan/{}/", plan.id)))
        }
        Err(errors) => {
            let body = fee_page(&state, &form, &errors)?;
            Ok(state.invalid(&me, "New Fee Plan", &body).await)
        }
    }
}

/// The student a plan is created for, with their account.
fn fee_student(state: &AppState, id: StudentId) -> Result<(StudentProfile, User), SisError> {
    let r = state.store.read()?;
    let profile = r.fetch::<StudentProfile>(id)?;
    let user = r.fetch::<User>(profile.user_id)?;
    Ok((profile, user))
}

fn fee_student_page(id: StudentId, form: &FeePlanForm, errors: &FormErrors) -> String {
    html::form(
        &format!("/adminportal/fees/student/{}/new/", id),
        errors,
        &plan_fields(form, errors),
        "Create plan",
    )
}

pub async fn fee_student_form_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Path(student_id): Path<StudentId>,
) -> PageResult {
    let (_, user) = fee_student(&state, student_id)?;
    let body = fee_student_page(student_id, &FeePlanForm::default(), &FormErrors::new());
    state.show(&me, &format!("New Fee Plan for {}", user.display_name()), &body).await
}

pub async fn fee_student_create_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Path(student_id): Path<StudentId>,
    Form(form): Form<FeePlanForm>,
) -> PageResult {
    let (profile, user) = fee_student(&state, student_id)?;
    match form_result(fees::create_plan(&state.store, &form, Some(profile.id), Utc::now()))? {
        Ok(plan) => {
            state.flash(&me, format!("Fee plan created for {}.", user.display_name())).await;
            Ok(see_other(&format!("/adminportal/fees/plan/{}/", plan.id)))
        }
        Err(errors) => {
            let body = fee_student_page(student_id, &form, &errors);
            let title = format!("New Fee Plan for {}", user.display_name());
            Ok(state.invalid(&me, &title, &body).await)
        }
    }
}

pub async fn fee_detail_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Path(plan_id): Path<FeePlanId>,
) -> PageResult {
    let summary = fees::plan_summary(&state.store.read()?, plan_id)?;
    let plan = &summary.plan;
    let none = FormErrors::new();
    let rows: Vec<Vec<String>> = summary
        .installments
        .iter()
        .map(|i| {
            let update = format!(
                "{}{}{}{}",
                html::input("hidden", "installment_id", "", &i.id.to_string(), &none),
                html::checkbox("is_paid", "Paid", i.is_paid),
                html::input("date", "paid_date", "Paid on", &date_text(i.paid_date), &none),
                html::text("note", "Note", &i.note, &none),
            );
            vec![
                i.sequence_no.to_string(),
                i.due_date.to_string(),
                i.amount.to_string(),
                if i.is_paid { "PAID" } else { "UNPAID" }.to_string(),
                html::or_dash(&date_text(i.paid_date)),
                html::post_button(
                    &format!("/adminportal/fees/installment/{}/toggle/", i.id),
                    "Toggle paid",
                ),
                html::form(
                    &format!("/adminportal/fees/plan/{}/", plan.id),
                    &none,
                    &update,
                    "Update",
                ),
            ]
        })
        .collect();
    let body = format!(
        "{}{}{}",
        html::details(&[
            ("Student", format!("{} ({})", summary.student.display_name(), summary.student.email)),
            ("Description", plan.description.clone()),
            ("Total amount", plan.total_amount.to_string()),
            ("Months", plan.months.to_string()),
            ("Monthly amount", summary.monthly_amount.to_string()),
            ("Start date", plan.start_date.to_string()),
            ("Status", plan.status.label().to_string()),
            ("Total due", summary.total_due.to_string()),
            ("Total paid", summary.total_paid.to_string()),
            ("Balance", summary.balance.to_string()),
        ]),
        html::post_button(
            &format!("/adminportal/fees/plan/{}/generate/", plan.id),
            "Generate installments",
        ),
        html::table(&["#", "Due", "Amount", "State", "Paid on", "", ""], &rows),
    );
    state.show(&me, "Fee Plan", &body).await
}

pub async fn installment_update_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Path(plan_id): Path<FeePlanId>,
    Form(form): Form<InstallmentForm>,
) -> PageResult {
    match fees::update_installment(&state.store, plan_id, &form, today()) {
        Ok(row) => {
            state.flash(&me, format!("Installment #{} updated.", row.sequence_no)).await;
        }
        Err(SisError::Validation(_)) => {
            state.flash(&me, "Invalid form submission.").await;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(see_other(&format!("/adminportal/fees/plan/{}/", plan_id)))
}

pub async fn fee_generate_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Path(plan_id): Path<FeePlanId>,
) -> PageResult {
    let created = fees::ensure_installments(&state.store, plan_id)?;
    tracing::info!(plan_id = plan_id.0, rows = created, "Installments generated");
    state
        .flash(&me, format!("Installments generated/updated ({} rows).", created))
        .await;
    Ok(see_other(&format!("/adminportal/fees/plan/{}/", plan_id)))
}

pub async fn installment_toggle_handler(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Path(id): Path<InstallmentId>,
) -> PageResult {
    let row = fees::toggle_paid(&state.store, id, today())?;
    let label = if row.is_paid { "PAID" } else { "UNPAID" };
    state
        .flash(&me, format!("Installment #{} is now {}.", row.sequence_no, label))
        .await;
    Ok(see_other(&format!("/adminportal/fees/plan/{}/", row.plan_id)))
}
