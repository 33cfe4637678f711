//! # Academics
//!
//! The administrative structure of the school: departments, courses,
//! subjects, class groups, and the lecturer, staff and student rosters
//! built on top of them.
//!
//! Every `add_*` / `edit_*` operation validates a raw form, checks
//! references and unique columns inside its write transaction, and returns
//! either the stored record or `SisError::Validation` with field messages.

use crate::accounts::{self, AccountForm, NewUser, check_unique, student_profile};
use crate::primitives::{
    MAX_CLASS_GROUP_NAME_LENGTH, MAX_CLASSROOM_LENGTH, MAX_CODE_LENGTH, MAX_COURSE_NAME_LENGTH,
    MAX_DEPARTMENT_NAME_LENGTH, MAX_FULL_NAME_LENGTH, MAX_PHONE_LENGTH, MAX_SHORT_NAME_LENGTH,
    MAX_TEXT_LENGTH,
};
use crate::storage::{Reader, Store, WriteTx};
use crate::types::{
    ClassGroup, ClassGroupId, Course, CourseId, Department, DepartmentId, Enrollment,
    LecturerId, LecturerProfile, Parent, Role, StudentId, StudentProfile, Subject, SubjectId, User,
    UserId,
};
use crate::validation::{INVALID_CHOICE, Validator, parse_id_list};
use crate::SisError;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;

pub const STAFF_NOT_PERMITTED: &str =
    "You are not permitted to add staff. Only superusers can perform this action.";

/// Case-insensitive substring match used by every search box.
pub fn matches_query(query: &str, haystacks: &[&str]) -> bool {
    let query = query.trim().to_lowercase();
    query.is_empty() || haystacks.iter().any(|h| h.to_lowercase().contains(&query))
}

fn check_department(
    r: &impl Reader,
    v: &mut Validator,
    id: Option<DepartmentId>,
) -> Result<(), SisError> {
    if let Some(id) = id {
        if r.get::<Department>(id)?.is_none() {
            v.error("department", INVALID_CHOICE);
        }
    }
    Ok(())
}

// =============================================================================
// DEPARTMENTS
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DepartmentForm {
    pub name: String,
}

/// All departments by name.
pub fn list_departments(r: &impl Reader) -> Result<Vec<Department>, SisError> {
    let mut departments = r.all::<Department>()?;
    departments.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    Ok(departments)
}

pub fn add_department(store: &Store, form: &DepartmentForm) -> Result<Department, SisError> {
    store.write(|tx| {
        let mut v = Validator::new();
        let name = v.required("name", &form.name, MAX_DEPARTMENT_NAME_LENGTH);
        let lowered = name.to_lowercase();
        if !name.is_empty()
            && tx
                .find::<Department>(|d| d.name.to_lowercase() == lowered)?
                .is_some()
        {
            v.error("name", "Department with this Name already exists.");
        }
        v.finish()?;
        tx.insert(Department {
            id: DepartmentId::default(),
            name,
        })
    })
}

// =============================================================================
// COURSES & SUBJECTS
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CourseForm {
    pub name: String,
    pub code: String,
    pub department: String,
    pub description: String,
}

impl From<&Course> for CourseForm {
    fn from(course: &Course) -> Self {
        Self {
            name: course.name.clone(),
            code: course.code.clone(),
            department: course
                .department_id
                .map(|d| d.to_string())
                .unwrap_or_default(),
            description: course.description.clone(),
        }
    }
}

/// All courses by name.
pub fn list_courses(r: &impl Reader) -> Result<Vec<Course>, SisError> {
    let mut courses = r.all::<Course>()?;
    courses.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(courses)
}

fn save_course(tx: &WriteTx, id: Option<CourseId>, form: &CourseForm) -> Result<Course, SisError> {
    let mut v = Validator::new();
    let name = v.required("name", &form.name, MAX_COURSE_NAME_LENGTH);
    let code = v.required("code", &form.code, MAX_CODE_LENGTH);
    let department_id = v.optional_number::<DepartmentId>("department", &form.department);
    let description = v.text("description", &form.description, MAX_TEXT_LENGTH);
    check_department(tx, &mut v, department_id)?;

    let lowered = code.to_lowercase();
    if !code.is_empty()
        && tx
            .find::<Course>(|c| Some(c.id) != id && c.code.to_lowercase() == lowered)?
            .is_some()
    {
        v.error("code", "Course with this Code already exists.");
    }
    v.finish()?;

    let course = Course {
        id: id.unwrap_or_default(),
        name,
        code,
        department_id,
        description,
    };
    match id {
        Some(_) => {
            tx.put(&course)?;
            Ok(course)
        }
        None => tx.insert(course),
    }
}

pub fn add_course(store: &Store, form: &CourseForm) -> Result<Course, SisError> {
    store.write(|tx| save_course(tx, None, form))
}

pub fn edit_course(store: &Store, id: CourseId, form: &CourseForm) -> Result<Course, SisError> {
    store.write(|tx| {
        tx.fetch::<Course>(id)?;
        save_course(tx, Some(id), form)
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubjectForm {
    pub name: String,
    pub code: String,
    pub course: String,
    pub description: String,
}

pub fn add_subject(store: &Store, form: &SubjectForm) -> Result<Subject, SisError> {
    store.write(|tx| {
        let mut v = Validator::new();
        let name = v.required("name", &form.name, MAX_COURSE_NAME_LENGTH);
        let code = v.required("code", &form.code, MAX_CODE_LENGTH);
        let course_id = v.number::<CourseId>("course", &form.course);
        let description = v.text("description", &form.description, MAX_TEXT_LENGTH);
        if let Some(course) = course_id {
            if tx.get::<Course>(course)?.is_none() {
                v.error("course", INVALID_CHOICE);
            }
        }
        v.finish()?;
        tx.insert(Subject {
            id: SubjectId::default(),
            course_id: course_id.unwrap_or_default(),
            name,
            code,
            description,
        })
    })
}

/// Subjects of a course ordered by code.
pub fn subjects_of_course(r: &impl Reader, course: CourseId) -> Result<Vec<Subject>, SisError> {
    let mut subjects = r.filter::<Subject>(|s| s.course_id == course)?;
    subjects.sort_by(|a, b| a.code.cmp(&b.code));
    Ok(subjects)
}

/// A subject with the lecturers who teach it.
#[derive(Debug, Clone)]
pub struct SubjectTeaching {
    pub subject: Subject,
    pub lecturers: Vec<User>,
}

/// Subjects of a course with their lecturers' accounts.
pub fn subjects_with_lecturers(
    r: &impl Reader,
    course: CourseId,
) -> Result<Vec<SubjectTeaching>, SisError> {
    let lecturers = r.all::<LecturerProfile>()?;
    let mut rows = Vec::new();
    for subject in subjects_of_course(r, course)? {
        let mut users = Vec::new();
        for lecturer in lecturers.iter().filter(|l| l.subject_ids.contains(&subject.id)) {
            if let Some(user) = r.get::<User>(lecturer.user_id)? {
                users.push(user);
            }
        }
        rows.push(SubjectTeaching {
            subject,
            lecturers: users,
        });
    }
    Ok(rows)
}

// =============================================================================
// CLASS GROUPS
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClassGroupForm {
    pub name: String,
    pub course: String,
    pub department: String,
    pub year: String,
    pub classroom: String,
    /// Comma-separated lecturer profile ids.
    pub lecturers: String,
}

impl From<&ClassGroup> for ClassGroupForm {
    fn from(group: &ClassGroup) -> Self {
        Self {
            name: group.name.clone(),
            course: group.course_id.map(|c| c.to_string()).unwrap_or_default(),
            department: group
                .department_id
                .map(|d| d.to_string())
                .unwrap_or_default(),
            year: group.year.to_string(),
            classroom: group.classroom.clone(),
            lecturers: join_ids(&group.lecturer_ids),
        }
    }
}

/// Ids joined with commas, for prefilled id-list inputs.
pub fn join_ids<T: std::fmt::Display>(ids: &BTreeSet<T>) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn clean_lecturers(
    r: &impl Reader,
    v: &mut Validator,
    raw: &str,
) -> Result<BTreeSet<LecturerId>, SisError> {
    let Some(ids) = parse_id_list::<LecturerId>(raw) else {
        v.error("lecturers", INVALID_CHOICE);
        return Ok(BTreeSet::new());
    };
    for id in &ids {
        if r.get::<LecturerProfile>(*id)?.is_none() {
            v.error(
                "lecturers",
                format!(
                    "Select a valid choice. {} is not one of the available choices.",
                    id
                ),
            );
        }
    }
    Ok(ids.into_iter().collect())
}

fn save_class_group(
    tx: &WriteTx,
    id: Option<ClassGroupId>,
    form: &ClassGroupForm,
    today: NaiveDate,
) -> Result<ClassGroup, SisError> {
    let mut v = Validator::new();
    let name = v.required("name", &form.name, MAX_CLASS_GROUP_NAME_LENGTH);
    let course_id = v.optional_number::<CourseId>("course", &form.course);
    let department_id = v.optional_number::<DepartmentId>("department", &form.department);
    let year = v
        .optional_number::<i32>("year", &form.year)
        .unwrap_or_else(|| today.year());
    let classroom = v.text("classroom", &form.classroom, MAX_CLASSROOM_LENGTH);
    let lecturer_ids = clean_lecturers(tx, &mut v, &form.lecturers)?;

    if let Some(course) = course_id {
        if tx.get::<Course>(course)?.is_none() {
            v.error("course", INVALID_CHOICE);
        }
    }
    check_department(tx, &mut v, department_id)?;
    v.finish()?;

    let group = ClassGroup {
        id: id.unwrap_or_default(),
        name,
        department_id,
        course_id,
        year,
        classroom,
        lecturer_ids,
    };
    match id {
        Some(_) => {
            tx.put(&group)?;
            Ok(group)
        }
        None => tx.insert(group),
    }
}

pub fn add_class_group(
    store: &Store,
    form: &ClassGroupForm,
    today: NaiveDate,
) -> Result<ClassGroup, SisError> {
    store.write(|tx| save_class_group(tx, None, form, today))
}

pub fn edit_class_group(
    store: &Store,
    id: ClassGroupId,
    form: &ClassGroupForm,
    today: NaiveDate,
) -> Result<ClassGroup, SisError> {
    store.write(|tx| {
        tx.fetch::<ClassGroup>(id)?;
        save_class_group(tx, Some(id), form, today)
    })
}

/// Replace the lecturers teaching a class group.
pub fn assign_lecturers(
    store: &Store,
    id: ClassGroupId,
    raw_ids: &str,
) -> Result<ClassGroup, SisError> {
    store.write(|tx| {
        let mut group = tx.fetch::<ClassGroup>(id)?;
        let mut v = Validator::new();
        group.lecturer_ids = clean_lecturers(tx, &mut v, raw_ids)?;
        v.finish()?;
        tx.put(&group)?;
        Ok(group)
    })
}

/// Class groups, optionally only those of one department, by name.
pub fn class_groups_by_department(
    r: &impl Reader,
    department: Option<DepartmentId>,
) -> Result<Vec<ClassGroup>, SisError> {
    let mut groups =
        r.filter::<ClassGroup>(|g| department.is_none() || g.department_id == department)?;
    groups.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(groups)
}

/// Class groups a lecturer teaches, in id order.
pub fn class_groups_of_lecturer(
    r: &impl Reader,
    lecturer: LecturerId,
) -> Result<Vec<ClassGroup>, SisError> {
    r.filter::<ClassGroup>(|g| g.lecturer_ids.contains(&lecturer))
}

/// True when the lecturer teaches the class group.
pub fn teaches(
    r: &impl Reader,
    lecturer: LecturerId,
    group: Option<ClassGroupId>,
) -> Result<bool, SisError> {
    let Some(group) = group else {
        return Ok(false);
    };
    Ok(r
        .get::<ClassGroup>(group)?
        .is_some_and(|g| g.lecturer_ids.contains(&lecturer)))
}

/// Courses with at least one class group taught by the lecturer.
pub fn courses_of_lecturer(r: &impl Reader, lecturer: LecturerId) -> Result<Vec<Course>, SisError> {
    let ids: BTreeSet<CourseId> = class_groups_of_lecturer(r, lecturer)?
        .into_iter()
        .filter_map(|g| g.course_id)
        .collect();
    let mut courses = Vec::new();
    for id in ids {
        if let Some(course) = r.get::<Course>(id)? {
            courses.push(course);
        }
    }
    Ok(courses)
}

// =============================================================================
// LECTURERS
// =============================================================================

/// One row of the lecturer roster.
#[derive(Debug, Clone)]
pub struct LecturerRow {
    pub user: User,
    pub profile: LecturerProfile,
    pub department: Option<Department>,
    pub class_groups: Vec<ClassGroup>,
}

/// Lecturers matching a name/email search and optional department.
pub fn list_lecturers(
    r: &impl Reader,
    query: &str,
    department: Option<DepartmentId>,
) -> Result<Vec<LecturerRow>, SisError> {
    let groups = r.all::<ClassGroup>()?;
    let mut rows = Vec::new();
    for profile in r.all::<LecturerProfile>()? {
        if department.is_some() && profile.department_id != department {
            continue;
        }
        let Some(user) = r.get::<User>(profile.user_id)? else {
            continue;
        };
        if !matches_query(query, &[&user.full_name, &user.short_name, &user.email]) {
            continue;
        }
        let department = match user.department_id.or(profile.department_id) {
            Some(id) => r.get::<Department>(id)?,
            None => None,
        };
        let class_groups = groups
            .iter()
            .filter(|g| g.lecturer_ids.contains(&profile.id))
            .cloned()
            .collect();
        rows.push(LecturerRow {
            user,
            profile,
            department,
            class_groups,
        });
    }
    rows.sort_by(|a, b| a.user.full_name.cmp(&b.user.full_name));
    Ok(rows)
}

/// Create a lecturer account. Department and joining date are required.
pub fn add_lecturer(
    store: &Store,
    form: &AccountForm,
    now: DateTime<Utc>,
) -> Result<User, SisError> {
    store.write(|tx| {
        let mut v = Validator::new();
        let new = form.clean(&mut v, Role::Lecturer, true, now);
        v.date("date_joined", &form.date_joined);
        let subject_ids = parse_id_list::<SubjectId>(&form.subjects).unwrap_or_else(|| {
            v.error("subjects", INVALID_CHOICE);
            Vec::new()
        });
        for id in &subject_ids {
            if tx.get::<Subject>(*id)?.is_none() {
                v.error("subjects", INVALID_CHOICE);
            }
        }
        check_unique(tx, &mut v, &new.email, &new.identity_card_number, None)?;
        check_department(tx, &mut v, new.department_id)?;
        v.finish()?;

        let user = accounts::create_user(tx, new)?;
        let mut profile = accounts::lecturer_profile(tx, user.id)?;
        profile.subject_ids = subject_ids.into_iter().collect();
        tx.put(&profile)?;
        Ok(user)
    })
}

// =============================================================================
// STAFF
// =============================================================================

/// Administrators ordered by full name, then short name.
pub fn list_staff(r: &impl Reader) -> Result<Vec<User>, SisError> {
    let mut staff = r.filter::<User>(|u| u.role == Role::Admin)?;
    staff.sort_by(|a, b| {
        a.full_name
            .cmp(&b.full_name)
            .then_with(|| a.short_name.cmp(&b.short_name))
    });
    Ok(staff)
}

/// Create an administrator. Only superusers may do this.
pub fn add_staff(
    store: &Store,
    actor: &User,
    form: &AccountForm,
    now: DateTime<Utc>,
) -> Result<User, SisError> {
    if !actor.is_superuser {
        return Err(SisError::Forbidden(STAFF_NOT_PERMITTED.to_string()));
    }
    store.write(|tx| {
        let mut v = Validator::new();
        let new = form.clean(&mut v, Role::Admin, false, now);
        v.required("password", &form.password, usize::MAX);
        v.required("confirm_password", &form.confirm_password, usize::MAX);
        check_unique(tx, &mut v, &new.email, &new.identity_card_number, None)?;
        check_department(tx, &mut v, new.department_id)?;
        v.finish()?;
        accounts::create_user(tx, new)
    })
}

// =============================================================================
// STUDENTS
// =============================================================================

/// One row of the student roster.
#[derive(Debug, Clone)]
pub struct StudentRow {
    pub user: User,
    pub profile: StudentProfile,
    pub department: Option<Department>,
}

/// Roster filters. Every filter is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StudentFilter {
    pub department: Option<DepartmentId>,
    pub classgroup: Option<ClassGroupId>,
    pub q: String,
}

/// Students matching the filters, ordered by full name.
pub fn list_students(r: &impl Reader, filter: &StudentFilter) -> Result<Vec<StudentRow>, SisError> {
    let enrolled: Option<BTreeSet<StudentId>> = match filter.classgroup {
        Some(group) => Some(
            r.filter::<Enrollment>(|e| e.class_group_id == group)?
                .into_iter()
                .map(|e| e.student_id)
                .collect(),
        ),
        None => None,
    };

    let mut rows = Vec::new();
    for user in r.filter::<User>(|u| u.role == Role::Student)? {
        if filter.department.is_some() && user.department_id != filter.department {
            continue;
        }
        if !matches_query(&filter.q, &[&user.full_name, &user.short_name, &user.email]) {
            continue;
        }
        let Ok(profile) = student_profile(r, user.id) else {
            continue;
        };
        if let Some(enrolled) = &enrolled {
            if !enrolled.contains(&profile.id) {
                continue;
            }
        }
        let department = match user.department_id {
            Some(id) => r.get::<Department>(id)?,
            None => None,
        };
        rows.push(StudentRow {
            user,
            profile,
            department,
        });
    }
    rows.sort_by(|a, b| a.user.full_name.cmp(&b.user.full_name));
    Ok(rows)
}

/// The add-student page: account fields plus enrollment and profile fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StudentForm {
    pub email: String,
    pub identity_card_number: String,
    pub full_name: String,
    pub short_name: String,
    pub phone_number: String,
    pub address: String,
    pub department: String,
    pub password: String,
    pub confirm_password: String,
    pub class_group: String,
    pub registration_number: String,
    pub date_of_birth: String,
    pub emergency_name: String,
    pub emergency_relation: String,
    pub emergency_phone: String,
}

impl StudentForm {
    fn account(&self) -> AccountForm {
        AccountForm {
            email: self.email.clone(),
            identity_card_number: self.identity_card_number.clone(),
            full_name: self.full_name.clone(),
            short_name: self.short_name.clone(),
            phone_number: self.phone_number.clone(),
            address: self.address.clone(),
            department: self.department.clone(),
            password: self.password.clone(),
            confirm_password: self.confirm_password.clone(),
            ..AccountForm::default()
        }
    }
}

/// Create a student account, fill in the profile, and enroll them in their
/// class group, all in one transaction.
pub fn add_student(
    store: &Store,
    form: &StudentForm,
    now: DateTime<Utc>,
) -> Result<User, SisError> {
    store.write(|tx| {
        let mut v = Validator::new();
        let new: NewUser = form.account().clean(&mut v, Role::Student, true, now);
        let class_group_id = v.number::<ClassGroupId>("class_group", &form.class_group);
        let registration_number =
            v.text("registration_number", &form.registration_number, MAX_CODE_LENGTH);
        let date_of_birth = v.optional_date("date_of_birth", &form.date_of_birth);
        let emergency_name = v.text("emergency_name", &form.emergency_name, MAX_FULL_NAME_LENGTH);
        let emergency_relation =
            v.text("emergency_relation", &form.emergency_relation, MAX_SHORT_NAME_LENGTH);
        let emergency_phone = v.text("emergency_phone", &form.emergency_phone, MAX_PHONE_LENGTH);

        if let Some(group) = class_group_id {
            if tx.get::<ClassGroup>(group)?.is_none() {
                v.error("class_group", INVALID_CHOICE);
            }
        }
        check_department(tx, &mut v, new.department_id)?;
        check_unique(tx, &mut v, &new.email, &new.identity_card_number, None)?;
        v.finish()?;

        let today = now.date_naive();
        let user = accounts::create_user(tx, new)?;
        let mut profile = student_profile(tx, user.id)?;
        profile.class_group_id = class_group_id;
        profile.registration_number = registration_number;
        profile.date_of_birth = date_of_birth;
        profile.emergency_name = emergency_name;
        profile.emergency_relation = emergency_relation;
        profile.emergency_phone = emergency_phone;
        tx.put(&profile)?;

        if let Some(group) = class_group_id {
            enroll(tx, profile.id, group, today)?;
        }
        Ok(user)
    })
}

/// Everything the student detail pages show.
#[derive(Debug, Clone)]
pub struct StudentDetail {
    pub user: User,
    pub profile: StudentProfile,
    pub department: Option<Department>,
    pub class_group: Option<ClassGroup>,
    pub enrollments: Vec<(Enrollment, ClassGroup)>,
    pub parents: Vec<Parent>,
}

/// Load a student by account id. Non-student accounts are not found.
pub fn student_detail(r: &impl Reader, user_id: UserId) -> Result<StudentDetail, SisError> {
    let user = r.fetch::<User>(user_id)?;
    if user.role != Role::Student {
        return Err(SisError::NotFound("Student"));
    }
    let profile = student_profile(r, user.id)?;
    detail_of(r, user, profile)
}

fn detail_of(
    r: &impl Reader,
    user: User,
    profile: StudentProfile,
) -> Result<StudentDetail, SisError> {
    let department = match user.department_id {
        Some(id) => r.get::<Department>(id)?,
        None => None,
    };
    let class_group = match profile.class_group_id {
        Some(id) => r.get::<ClassGroup>(id)?,
        None => None,
    };
    let mut enrollments = Vec::new();
    for enrollment in r.filter::<Enrollment>(|e| e.student_id == profile.id)? {
        let group = r.fetch::<ClassGroup>(enrollment.class_group_id)?;
        enrollments.push((enrollment, group));
    }
    let mut parents = Vec::new();
    for id in &profile.parent_ids {
        if let Some(parent) = r.get::<Parent>(*id)? {
            parents.push(parent);
        }
    }
    Ok(StudentDetail {
        user,
        profile,
        department,
        class_group,
        enrollments,
        parents,
    })
}

/// Admin edit of a student's account and profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StudentEditForm {
    pub full_name: String,
    pub short_name: String,
    pub email: String,
    pub department: String,
    pub phone_number: String,
    pub address: String,
    pub date_of_birth: String,
}

impl From<&StudentDetail> for StudentEditForm {
    fn from(detail: &StudentDetail) -> Self {
        Self {
            full_name: detail.user.full_name.clone(),
            short_name: detail.user.short_name.clone(),
            email: detail.user.email.clone(),
            department: detail
                .user
                .department_id
                .map(|d| d.to_string())
                .unwrap_or_default(),
            phone_number: detail.profile.phone_number.clone(),
            address: detail.profile.address.clone(),
            date_of_birth: detail
                .profile
                .date_of_birth
                .map(|d| d.to_string())
                .unwrap_or_default(),
        }
    }
}

pub fn edit_student(
    store: &Store,
    user_id: UserId,
    form: &StudentEditForm,
) -> Result<User, SisError> {
    store.write(|tx| {
        let mut user = tx.fetch::<User>(user_id)?;
        if user.role != Role::Student {
            return Err(SisError::NotFound("Student"));
        }
        let mut profile = student_profile(tx, user.id)?;

        let mut v = Validator::new();
        let full_name = v.required("full_name", &form.full_name, MAX_FULL_NAME_LENGTH);
        let short_name = v.text("short_name", &form.short_name, MAX_SHORT_NAME_LENGTH);
        let email = v.email("email", &form.email);
        let department_id = v.optional_number::<DepartmentId>("department", &form.department);
        let phone_number = v.text("phone_number", &form.phone_number, MAX_PHONE_LENGTH);
        let address = v.text("address", &form.address, MAX_TEXT_LENGTH);
        let date_of_birth = v.optional_date("date_of_birth", &form.date_of_birth);
        check_department(tx, &mut v, department_id)?;
        check_unique(tx, &mut v, &email, "", Some(user.id))?;
        v.finish()?;

        user.short_name = if short_name.is_empty() {
            accounts::default_short_name(&full_name)
        } else {
            short_name
        };
        user.full_name = full_name;
        user.email = email;
        user.department_id = department_id;
        tx.put(&user)?;

        profile.phone_number = phone_number;
        profile.address = address;
        profile.date_of_birth = date_of_birth;
        tx.put(&profile)?;
        Ok(user)
    })
}

/// Result of an enrollment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollOutcome {
    Enrolled(Enrollment),
    /// The pair already existed; nothing changed.
    AlreadyEnrolled(Enrollment),
}

/// Enroll inside an open transaction, keeping `(student, class group)` unique.
pub fn enroll(
    tx: &WriteTx,
    student: StudentId,
    class_group: ClassGroupId,
    today: NaiveDate,
) -> Result<EnrollOutcome, SisError> {
    if let Some(existing) = tx.find::<Enrollment>(|e| {
        e.student_id == student && e.class_group_id == class_group
    })? {
        return Ok(EnrollOutcome::AlreadyEnrolled(existing));
    }
    let enrollment = tx.insert(Enrollment {
        id: Default::default(),
        student_id: student,
        class_group_id: class_group,
        date_enrolled: today,
    })?;
    Ok(EnrollOutcome::Enrolled(enrollment))
}

/// Enroll a student (by account id) in a class group.
pub fn enroll_student(
    store: &Store,
    user_id: UserId,
    class_group: Option<ClassGroupId>,
    today: NaiveDate,
) -> Result<EnrollOutcome, SisError> {
    store.write(|tx| {
        let profile = student_profile(tx, user_id)?;
        let Some(group) = class_group else {
            return Err(SisError::field("class_group", "Please select a class group."));
        };
        tx.fetch::<ClassGroup>(group)?;
        enroll(tx, profile.id, group, today)
    })
}

/// Students enrolled in a class group with an optional name/email search.
pub fn class_group_students(
    r: &impl Reader,
    group: ClassGroupId,
    query: &str,
) -> Result<Vec<(Enrollment, User, StudentProfile)>, SisError> {
    let mut rows = Vec::new();
    for enrollment in r.filter::<Enrollment>(|e| e.class_group_id == group)? {
        let profile = r.fetch::<StudentProfile>(enrollment.student_id)?;
        let user = r.fetch::<User>(profile.user_id)?;
        if matches_query(query, &[&user.full_name, &user.email]) {
            rows.push((enrollment, user, profile));
        }
    }
    Ok(rows)
}

/// Students whose home class group is `group`, ordered by full name then email.
pub fn class_group_members(
    r: &impl Reader,
    group: ClassGroupId,
) -> Result<Vec<(StudentProfile, User)>, SisError> {
    let mut members = Vec::new();
    for profile in r.filter::<StudentProfile>(|p| p.class_group_id == Some(group))? {
        if let Some(user) = r.get::<User>(profile.user_id)? {
            members.push((profile, user));
        }
    }
    members.sort_by(|a, b| {
        a.1.full_name
            .cmp(&b.1.full_name)
            .then_with(|| a.1.email.cmp(&b.1.email))
    });
    Ok(members)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_717_000_000, 0).expect("timestamp")
    }

    fn setup() -> (tempfile::TempDir, Store) {
        let dir = tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("sis.redb")).expect("open store");
        (dir, store)
    }

    fn science(store: &Store) -> Department {
        add_department(
            store,
            &DepartmentForm {
                name: "Science".into(),
            },
        )
        .expect("department")
    }

    #[test]
    fn test_department_name_is_unique() {
        let (_dir, store) = setup();
        science(&store);
        let err = add_department(
            &store,
            &DepartmentForm {
                name: "science".into(),
            },
        )
        .expect_err("duplicate");
        assert!(matches!(err, SisError::Validation(_)));
    }

    #[test]
    fn test_course_code_unique_but_editable() {
        let (_dir, store) = setup();
        let dept = science(&store);
        let form = CourseForm {
            name: "Physics".into(),
            code: "PHY".into(),
            department: dept.id.to_string(),
            description: String::new(),
        };
        let course = add_course(&store, &form).expect("course");
        assert!(add_course(&store, &form).is_err());

        let renamed = CourseForm {
            name: "Applied Physics".into(),
            ..form
        };
        let edited = edit_course(&store, course.id, &renamed).expect("edit keeps own code");
        assert_eq!(edited.name, "Applied Physics");
    }

    #[test]
    fn test_class_group_year_defaults_to_current() {
        let (_dir, store) = setup();
        let today = NaiveDate::from_ymd_opt(2025, 1, 15).expect("date");
        let group = add_class_group(
            &store,
            &ClassGroupForm {
                name: "5A".into(),
                ..ClassGroupForm::default()
            },
            today,
        )
        .expect("group");
        assert_eq!(group.year, 2025);
        assert!(group.lecturer_ids.is_empty());
    }

    #[test]
    fn test_assign_unknown_lecturer_rejected() {
        let (_dir, store) = setup();
        let today = NaiveDate::from_ymd_opt(2025, 1, 15).expect("date");
        let group = add_class_group(
            &store,
            &ClassGroupForm {
                name: "5A".into(),
                ..ClassGroupForm::default()
            },
            today,
        )
        .expect("group");
        assert!(assign_lecturers(&store, group.id, "99").is_err());
    }

    #[test]
    fn test_add_student_enrolls_in_class_group() {
        let (_dir, store) = setup();
        let dept = science(&store);
        let group = add_class_group(
            &store,
            &ClassGroupForm {
                name: "5A".into(),
                department: dept.id.to_string(),
                ..ClassGroupForm::default()
            },
            now().date_naive(),
        )
        .expect("group");

        let form = StudentForm {
            email: "kid@x.com".into(),
            identity_card_number: "IC-1".into(),
            full_name: "Kid Student".into(),
            department: dept.id.to_string(),
            class_group: group.id.to_string(),
            ..StudentForm::default()
        };
        let user = add_student(&store, &form, now()).expect("student");
        assert_eq!(user.role, Role::Student);

        let read = store.read().expect("read");
        let detail = student_detail(&read, user.id).expect("detail");
        assert_eq!(detail.profile.class_group_id, Some(group.id));
        assert_eq!(detail.enrollments.len(), 1);

        let rows = list_students(
            &read,
            &StudentFilter {
                classgroup: Some(group.id),
                q: "kid".into(),
                ..StudentFilter::default()
            },
        )
        .expect("list");
        assert_eq!(rows.len(), 1);
        drop(read);

        let other = StudentForm {
            email: "abu@x.com".into(),
            identity_card_number: "IC-2".into(),
            full_name: "Abu".into(),
            ..form
        };
        add_student(&store, &other, now()).expect("second student");
        let members = class_group_members(&store.read().expect("read"), group.id).expect("members");
        let names: Vec<&str> = members.iter().map(|(_, u)| u.full_name.as_str()).collect();
        assert_eq!(names, ["Abu", "Kid Student"]);
    }

    #[test]
    fn test_duplicate_enrollment_is_reported() {
        let (_dir, store) = setup();
        let group = add_class_group(
            &store,
            &ClassGroupForm {
                name: "5A".into(),
                ..ClassGroupForm::default()
            },
            now().date_naive(),
        )
        .expect("group");
        let new = NewUser::new("s@x.com", "IC-5", "S", Role::Student, now());
        let user = store
            .write(|tx| accounts::create_user(tx, new))
            .expect("user");

        let first = enroll_student(&store, user.id, Some(group.id), now().date_naive())
            .expect("enroll");
        assert!(matches!(first, EnrollOutcome::Enrolled(_)));
        let second = enroll_student(&store, user.id, Some(group.id), now().date_naive())
            .expect("enroll again");
        assert!(matches!(second, EnrollOutcome::AlreadyEnrolled(_)));
    }

    #[test]
    fn test_only_superuser_adds_staff() {
        let (_dir, store) = setup();
        let admin_form = NewUser::new("a@x.com", "IC-A", "Plain Admin", Role::Admin, now());
        let admin = store
            .write(|tx| accounts::create_user(tx, admin_form))
            .expect("admin");
        let form = AccountForm {
            email: "b@x.com".into(),
            identity_card_number: "IC-B".into(),
            full_name: "B".into(),
            password: "pw".into(),
            confirm_password: "pw".into(),
            ..AccountForm::default()
        };
        assert!(matches!(
            add_staff(&store, &admin, &form, now()),
            Err(SisError::Forbidden(_))
        ));

        let mut root = admin;
        root.is_superuser = true;
        let staff = add_staff(&store, &root, &form, now()).expect("staff");
        assert_eq!(staff.role, Role::Admin);
        assert_eq!(list_staff(&store.read().expect("read")).expect("staff").len(), 2);
    }

    #[test]
    fn test_matches_query() {
        assert!(matches_query("", &["anything"]));
        assert!(matches_query("ALI", &["Muhammad Ali"]));
        assert!(!matches_query("zed", &["Ali", "ali@x.com"]));
    }
}
