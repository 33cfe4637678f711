//! # CSV Export
//!
//! Spreadsheet downloads of the rosters, the course catalogue and daily
//! attendance. Every function returns the finished document as bytes; the
//! caller decides the file name and transport.
//!
//! Missing values are written as `-`.

use crate::academics::{
    class_group_students, class_groups_of_lecturer, list_lecturers, subjects_of_course,
};
use crate::attendance::course_day_status;
use crate::primitives::{EXPORT_DATE_FORMAT, PLACEHOLDER};
use crate::storage::Reader;
use crate::types::{
    ClassGroup, ClassGroupId, Course, CourseId, Department, Enrollment, LecturerId,
    LecturerProfile, Role, StudentProfile, User,
};
use crate::SisError;
use chrono::NaiveDate;
use csv::Writer;

pub const NOT_MARKED_LABEL: &str = "Not marked";

fn csv_err(e: impl std::fmt::Display) -> SisError {
    SisError::IoError(format!("CSV export failed: {}", e))
}

fn row(wtr: &mut Writer<Vec<u8>>, fields: &[&str]) -> Result<(), SisError> {
    wtr.write_record(fields).map_err(csv_err)
}

fn finish(wtr: Writer<Vec<u8>>) -> Result<Vec<u8>, SisError> {
    wtr.into_inner().map_err(csv_err)
}

fn or_placeholder(value: &str) -> &str {
    if value.trim().is_empty() { PLACEHOLDER } else { value }
}

fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(", ")
}

/// Parse a `dd-mm-yyyy` export date.
pub fn parse_export_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), EXPORT_DATE_FORMAT).ok()
}

// =============================================================================
// ROSTERS
// =============================================================================

/// `Name, Email, Phone, Department, Class Groups`
pub fn lecturers_csv(r: &impl Reader) -> Result<Vec<u8>, SisError> {
    let mut wtr = Writer::from_writer(vec![]);
    row(&mut wtr, &["Name", "Email", "Phone", "Department", "Class Groups"])?;

    for lecturer in list_lecturers(r, "", None)? {
        let department = lecturer.department.as_ref().map(|d| d.name.as_str());
        row(&mut wtr, &[
            lecturer.user.display_name(),
            &lecturer.user.email,
            or_placeholder(&lecturer.user.phone_number),
            department.unwrap_or(PLACEHOLDER),
            &join_names(lecturer.class_groups.iter().map(|g| g.name.as_str())),
        ])?;
    }
    finish(wtr)
}

/// `Name, Email, Department, Date Joined, Registration Number, Phone Number`
pub fn students_csv(r: &impl Reader) -> Result<Vec<u8>, SisError> {
    let mut wtr = Writer::from_writer(vec![]);
    row(&mut wtr, &[
        "Name",
        "Email",
        "Department",
        "Date Joined",
        "Registration Number",
        "Phone Number",
    ])?;

    let profiles = r.all::<StudentProfile>()?;
    for user in r.filter::<User>(|u| u.role == Role::Student)? {
        let department = match user.department_id {
            Some(id) => r.get::<Department>(id)?.map(|d| d.name),
            None => None,
        };
        let registration = profiles
            .iter()
            .find(|p| p.user_id == user.id)
            .map(|p| p.registration_number.as_str())
            .unwrap_or_default();
        row(&mut wtr, &[
            user.display_name(),
            &user.email,
            department.as_deref().unwrap_or(PLACEHOLDER),
            &user.date_joined.format("%Y-%m-%d").to_string(),
            or_placeholder(registration),
            or_placeholder(&user.phone_number),
        ])?;
    }
    finish(wtr)
}

// =============================================================================
// COURSES
// =============================================================================

fn lecturer_users<'a>(
    r: &impl Reader,
    ids: impl IntoIterator<Item = &'a LecturerId>,
) -> Result<Vec<User>, SisError> {
    let mut users = Vec::new();
    for id in ids {
        if let Some(profile) = r.get::<LecturerProfile>(*id)? {
            if let Some(user) = r.get::<User>(profile.user_id)? {
                users.push(user);
            }
        }
    }
    Ok(users)
}

/// One row per class group; course columns only on each course's first row.
pub fn courses_csv(r: &impl Reader) -> Result<Vec<u8>, SisError> {
    let mut wtr = Writer::from_writer(vec![]);
    row(&mut wtr, &[
        "Course Name",
        "Course Code",
        "Subject(s)",
        "Class Group",
        "Academic Year",
        "Classroom",
        "Lecturers (names)",
        "Lecturers (emails)",
        "Number of Students",
    ])?;

    let profiles = r.all::<StudentProfile>()?;
    for course in r.all::<Course>()? {
        let subjects = subjects_of_course(r, course.id)?;
        let subjects = if subjects.is_empty() {
            PLACEHOLDER.to_string()
        } else {
            subjects
                .iter()
                .map(|s| s.label())
                .collect::<Vec<_>>()
                .join(", ")
        };

        let groups = r.filter::<ClassGroup>(|g| g.course_id == Some(course.id))?;
        if groups.is_empty() {
            let mut fields = vec![course.name.as_str(), course.code.as_str(), subjects.as_str()];
            fields.resize(9, PLACEHOLDER);
            row(&mut wtr, &fields)?;
            continue;
        }

        for (idx, group) in groups.iter().enumerate() {
            let lecturers = lecturer_users(r, &group.lecturer_ids)?;
            let (names, emails) = if lecturers.is_empty() {
                (PLACEHOLDER.to_string(), PLACEHOLDER.to_string())
            } else {
                (
                    join_names(lecturers.iter().map(|u| u.full_name.as_str())),
                    join_names(lecturers.iter().map(|u| u.email.as_str())),
                )
            };
            let students = profiles
                .iter()
                .filter(|p| p.class_group_id == Some(group.id))
                .count();
            let first = idx == 0;
            row(&mut wtr, &[
                if first { course.name.as_str() } else { "" },
                if first { course.code.as_str() } else { "" },
                if first { subjects.as_str() } else { "" },
                &group.name,
                &group.year.to_string(),
                or_placeholder(&group.classroom),
                &names,
                &emails,
                &students.to_string(),
            ])?;
        }
    }
    finish(wtr)
}

// =============================================================================
// ATTENDANCE & CLASS LISTS
// =============================================================================

/// A course taught by the lecturer, or `NotFound`.
pub fn taught_course(
    r: &impl Reader,
    lecturer: LecturerId,
    course: CourseId,
) -> Result<Course, SisError> {
    let teaches = class_groups_of_lecturer(r, lecturer)?
        .iter()
        .any(|g| g.course_id == Some(course));
    if !teaches {
        return Err(SisError::NotFound("Course"));
    }
    r.fetch::<Course>(course)
}

/// `attendance_<code>_<dd-mm-yyyy>.csv`
pub fn attendance_filename(course: &Course, date: NaiveDate) -> String {
    format!(
        "attendance_{}_{}.csv",
        course.code,
        date.format(EXPORT_DATE_FORMAT)
    )
}

/// `Student Name, Email, Status` for one course and date.
pub fn attendance_csv(
    r: &impl Reader,
    course: CourseId,
    date: NaiveDate,
) -> Result<Vec<u8>, SisError> {
    let mut wtr = Writer::from_writer(vec![]);
    row(&mut wtr, &["Student Name", "Email", "Status"])?;
    for (user, status) in course_day_status(r, course, date)? {
        row(&mut wtr, &[
            user.display_name(),
            &user.email,
            status.map(|s| s.label()).unwrap_or(NOT_MARKED_LABEL),
        ])?;
    }
    finish(wtr)
}

/// `students_<class group name>.csv`
pub fn class_students_filename(group: &ClassGroup) -> String {
    format!("students_{}.csv", group.name)
}

/// `#, Full Name, Email, Class Groups, Date Joined, Status` for a class group.
pub fn class_students_csv(r: &impl Reader, group: ClassGroupId) -> Result<Vec<u8>, SisError> {
    let mut wtr = Writer::from_writer(vec![]);
    row(&mut wtr, &["#", "Full Name", "Email", "Class Groups", "Date Joined", "Status"])?;

    for (idx, (_, user, profile)) in class_group_students(r, group, "")?.into_iter().enumerate() {
        let mut names = Vec::new();
        for enrollment in r.filter::<Enrollment>(|e| e.student_id == profile.id)? {
            if let Some(g) = r.get::<ClassGroup>(enrollment.class_group_id)? {
                names.push(g.name);
            }
        }
        row(&mut wtr, &[
            &(idx + 1).to_string(),
            user.display_name(),
            &user.email,
            &names.join(", "),
            &user.date_joined.format("%Y-%m-%d").to_string(),
            if user.is_active { "Active" } else { "Inactive" },
        ])?;
    }
    finish(wtr)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::academics::{
        ClassGroupForm, CourseForm, EnrollOutcome, SubjectForm, add_class_group, add_course,
        add_subject, assign_lecturers, enroll,
    };
    use crate::accounts::{NewUser, create_user, lecturer_profile, student_profile};
    use crate::attendance::mark;
    use crate::storage::Store;
    use crate::types::{AttendanceSession, AttendanceStatus};
    use chrono::{DateTime, Utc};
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_717_000_000, 0).expect("timestamp")
    }

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).expect("utf8")
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Store,
        course: Course,
        group: ClassGroup,
        lecturer: LecturerId,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("sis.redb")).expect("open store");
        let today = now().date_naive();
        let course = add_course(
            &store,
            &CourseForm {
                name: "Physics".into(),
                code: "PHY".into(),
                ..CourseForm::default()
            },
        )
        .expect("course");
        add_subject(
            &store,
            &SubjectForm {
                name: "Optics".into(),
                code: "PHY1".into(),
                course: course.id.to_string(),
                ..SubjectForm::default()
            },
        )
        .expect("subject");
        let group = add_class_group(
            &store,
            &ClassGroupForm {
                name: "5A".into(),
                course: course.id.to_string(),
                ..ClassGroupForm::default()
            },
            today,
        )
        .expect("group");

        let lecturer_user = store
            .write(|tx| {
                let lecturer = create_user(
                    tx,
                    NewUser::new("lee@x.com", "IC-L", "Lee Chong", Role::Lecturer, now()),
                )?;
                let kid = create_user(
                    tx,
                    NewUser::new("kid@x.com", "IC-K", "Kid Ali", Role::Student, now()),
                )?;
                let mut profile = student_profile(tx, kid.id)?;
                profile.class_group_id = Some(group.id);
                tx.put(&profile)?;
                let EnrollOutcome::Enrolled(_) = enroll(tx, profile.id, group.id, today)? else {
                    unreachable!("fresh enrollment");
                };
                Ok(lecturer)
            })
            .expect("users");
        let lecturer = lecturer_profile(&store.read().expect("read"), lecturer_user.id)
            .expect("profile")
            .id;
        assign_lecturers(&store, group.id, &lecturer.to_string()).expect("assign");

        Fixture {
            _dir: dir,
            store,
            course,
            group,
            lecturer,
        }
    }

    #[test]
    fn test_lecturers_csv() {
        let f = fixture();
        let csv = text(lecturers_csv(&f.store.read().expect("read")).expect("csv"));
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Name,Email,Phone,Department,Class Groups");
        assert_eq!(lines[1], "Lee Chong,lee@x.com,-,-,5A");
    }

    #[test]
    fn test_students_csv_uses_placeholders() {
        let f = fixture();
        let csv = text(students_csv(&f.store.read().expect("read")).expect("csv"));
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "Kid Ali,kid@x.com,-,2024-05-29,-,-");
    }

    #[test]
    fn test_courses_csv_rows() {
        let f = fixture();
        add_course(
            &f.store,
            &CourseForm {
                name: "Art".into(),
                code: "ART".into(),
                ..CourseForm::default()
            },
        )
        .expect("course");
        let csv = text(courses_csv(&f.store.read().expect("read")).expect("csv"));
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "Physics,PHY,Optics (PHY1),5A,2024,-,Lee Chong,lee@x.com,1"
        );
        assert_eq!(lines[2], "Art,ART,-,-,-,-,-,-,-");
    }

    #[test]
    fn test_attendance_csv_and_access() {
        let f = fixture();
        let date = parse_export_date("06-05-2024").expect("date");
        assert!(parse_export_date("2024-05-06").is_none());

        let read = f.store.read().expect("read");
        let course = taught_course(&read, f.lecturer, f.course.id).expect("taught");
        assert_eq!(attendance_filename(&course, date), "attendance_PHY_06-05-2024.csv");
        assert!(taught_course(&read, LecturerId(99), f.course.id).is_err());

        let csv = text(attendance_csv(&read, f.course.id, date).expect("csv"));
        assert!(csv.ends_with("Kid Ali,kid@x.com,Not marked\n"));
        drop(read);

        let enrollment = f
            .store
            .read()
            .expect("read")
            .find::<Enrollment>(|e| e.class_group_id == f.group.id)
            .expect("find")
            .expect("enrollment");
        mark(&f.store, enrollment.id, date, AttendanceSession::Morning, AttendanceStatus::Late, "")
            .expect("mark");
        let read = f.store.read().expect("read");
        let csv = text(attendance_csv(&read, f.course.id, date).expect("csv"));
        assert!(csv.ends_with("Kid Ali,kid@x.com,Late\n"));
    }

    #[test]
    fn test_class_students_csv() {
        let f = fixture();
        let read = f.store.read().expect("read");
        let csv = text(class_students_csv(&read, f.group.id).expect("csv"));
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "#,Full Name,Email,Class Groups,Date Joined,Status");
        assert_eq!(lines[1], "1,Kid Ali,kid@x.com,5A,2024-05-29,Active");
        assert_eq!(class_students_filename(&f.group), "students_5A.csv");
    }
}
