//! # Workflow Tests
//!
//! A school term end to end: set up the catalogue, register people, take
//! attendance, keep records, bill fees and export the results.

use chrono::{DateTime, NaiveDate, Utc};
use sis_core::academics::{
    self, ClassGroupForm, CourseForm, DepartmentForm, StudentForm, SubjectForm,
};
use sis_core::accounts::{self, AccountForm};
use sis_core::attendance::{self, Period};
use sis_core::fees::{self, FeePlanForm};
use sis_core::primitives::DEFAULT_PASSWORD;
use sis_core::records::{self, LinkOutcome, ParentForm};
use sis_core::{
    AttendanceSession, ClassGroup, Course, Enrollment, LecturerId, Reader, SisError, Store,
    StudentId, User, dashboard, export,
};
use std::collections::HashMap;
use tempfile::TempDir;

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_717_000_000, 0).expect("timestamp")
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("date")
}

struct School {
    _dir: TempDir,
    store: Store,
    course: Course,
    group: ClassGroup,
    lecturer: User,
    lecturer_id: LecturerId,
    student: User,
    student_id: StudentId,
}

fn school() -> School {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open(dir.path().join("sis.redb")).expect("open store");
    let today = now().date_naive();

    let science = academics::add_department(
        &store,
        &DepartmentForm {
            name: "Science".into(),
        },
    )
    .expect("department");
    let course = academics::add_course(
        &store,
        &CourseForm {
            name: "Biology".into(),
            code: "BIO".into(),
            department: science.id.to_string(),
            ..CourseForm::default()
        },
    )
    .expect("course");
    let subject = academics::add_subject(
        &store,
        &SubjectForm {
            name: "Genetics".into(),
            code: "BIO1".into(),
            course: course.id.to_string(),
            ..SubjectForm::default()
        },
    )
    .expect("subject");
    let group = academics::add_class_group(
        &store,
        &ClassGroupForm {
            name: "4 Cempaka".into(),
            course: course.id.to_string(),
            department: science.id.to_string(),
            classroom: "Lab 2".into(),
            ..ClassGroupForm::default()
        },
        today,
    )
    .expect("class group");

    let lecturer = academics::add_lecturer(
        &store,
        &AccountForm {
            email: "tan@school.edu".into(),
            identity_card_number: "IC-T1".into(),
            full_name: "Tan Mei Ling".into(),
            department: science.id.to_string(),
            date_joined: "2024-01-15".into(),
            subjects: subject.id.to_string(),
            ..AccountForm::default()
        },
        now(),
    )
    .expect("lecturer");
    let lecturer_id = accounts::lecturer_profile(&store.read().expect("read"), lecturer.id)
        .expect("lecturer profile")
        .id;
    academics::assign_lecturers(&store, group.id, &lecturer_id.to_string()).expect("assign");

    let student = academics::add_student(
        &store,
        &StudentForm {
            email: "aina@school.edu".into(),
            identity_card_number: "IC-S1".into(),
            full_name: "Nur Aina".into(),
            department: science.id.to_string(),
            class_group: group.id.to_string(),
            registration_number: "R-001".into(),
            ..StudentForm::default()
        },
        now(),
    )
    .expect("student");
    let student_id = accounts::student_profile(&store.read().expect("read"), student.id)
        .expect("student profile")
        .id;

    School {
        _dir: dir,
        store,
        course,
        group,
        lecturer,
        lecturer_id,
        student,
        student_id,
    }
}

fn enrollment_of(s: &School) -> Enrollment {
    s.store
        .read()
        .expect("read")
        .find::<Enrollment>(|e| e.student_id == s.student_id)
        .expect("find")
        .expect("enrolled on creation")
}

// =============================================================================
// ACCOUNTS
// =============================================================================

#[test]
fn new_accounts_log_in_with_default_password() {
    let s = school();
    let by_ic = accounts::authenticate(&s.store, "ic-s1", DEFAULT_PASSWORD, now()).expect("login");
    assert_eq!(by_ic.id, s.student.id);
    assert!(matches!(
        accounts::authenticate(&s.store, "aina@school.edu", "wrong", now()),
        Err(SisError::InvalidCredentials)
    ));

    let profile = accounts::student_profile(&s.store.read().expect("read"), s.student.id)
        .expect("profile");
    assert_eq!(profile.latest_activity, Some(now()));
}

#[test]
fn duplicate_student_is_rejected() {
    let s = school();
    let err = academics::add_student(
        &s.store,
        &StudentForm {
            email: "AINA@school.edu".into(),
            identity_card_number: "IC-S2".into(),
            full_name: "Copy".into(),
            department: s.group.department_id.expect("department").to_string(),
            ..StudentForm::default()
        },
        now(),
    )
    .expect_err("email taken");
    let SisError::Validation(errors) = err else {
        unreachable!("validation error expected");
    };
    assert!(!errors.field("email").is_empty());
}

// =============================================================================
// ATTENDANCE
// =============================================================================

#[test]
fn bulk_marks_feed_history_and_export() {
    let s = school();
    let enrollment = enrollment_of(&s);
    let date = day(2024, 5, 6);

    let mut fields = HashMap::new();
    fields.insert(format!("status_{}", enrollment.id), "present".to_string());
    fields.insert(format!("remarks_{}", enrollment.id), "on time".to_string());
    let saved =
        attendance::mark_bulk(&s.store, s.group.id, date, AttendanceSession::Morning, &fields)
            .expect("bulk");
    assert_eq!(saved, 1);

    fields.insert(format!("status_{}", enrollment.id), "absent".to_string());
    attendance::mark_bulk(
        &s.store,
        s.group.id,
        date.succ_opt().expect("next"),
        AttendanceSession::Morning,
        &fields,
    )
    .expect("bulk");

    let read = s.store.read().expect("read");
    let history = attendance::history(&read, s.course.id, date, Period::Week).expect("history");
    assert_eq!(history.days.len(), 7);
    let row = &history.rows[0];
    assert_eq!((row.present, row.absent, row.total_marked), (1, 1, 2));
    assert_eq!(row.percentage.expect("marked").to_string(), "50.00");

    let course = export::taught_course(&read, s.lecturer_id, s.course.id).expect("taught");
    let csv = String::from_utf8(export::attendance_csv(&read, course.id, date).expect("csv"))
        .expect("utf8");
    assert_eq!(csv, "Student Name,Email,Status\nNur Aina,aina@school.edu,Present\n");

    let board = dashboard::lecturer(&read, s.lecturer.id, date).expect("dashboard");
    assert_eq!(board.total_students, 1);
    assert_eq!(board.todays_attendance, 1);
}

// =============================================================================
// RECORDS
// =============================================================================

#[test]
fn guardians_are_shared_between_siblings() {
    let s = school();
    let form = ParentForm {
        full_name: "Ahmad Zaki".into(),
        phone_number: "012-3456789".into(),
        roles: "father".into(),
        ..ParentForm::default()
    };
    let LinkOutcome::Linked(parent) =
        records::add_guardian(&s.store, s.lecturer.id, s.student_id, &form).expect("link")
    else {
        unreachable!("first link");
    };
    assert!(matches!(
        records::add_guardian(&s.store, s.lecturer.id, s.student_id, &form),
        Ok(LinkOutcome::AlreadyLinked(_))
    ));

    let sibling = academics::add_student(
        &s.store,
        &StudentForm {
            email: "amir@school.edu".into(),
            identity_card_number: "IC-S2".into(),
            full_name: "Amir".into(),
            department: s.group.department_id.expect("department").to_string(),
            class_group: s.group.id.to_string(),
            ..StudentForm::default()
        },
        now(),
    )
    .expect("sibling");
    let sibling_id = accounts::student_profile(&s.store.read().expect("read"), sibling.id)
        .expect("profile")
        .id;
    let LinkOutcome::Linked(reused) = records::add_guardian(
        &s.store,
        s.lecturer.id,
        sibling_id,
        &ParentForm {
            full_name: "ahmad zaki".into(),
            ..form.clone()
        },
    )
    .expect("link sibling") else {
        unreachable!("new link for sibling");
    };
    assert_eq!(reused.id, parent.id);

    let details =
        records::full_details(&s.store.read().expect("read"), sibling.id).expect("details");
    assert_eq!(details.detail.parents.len(), 1);
    assert_eq!(details.lecturers[0].1[0].id, s.lecturer.id);
}

// =============================================================================
// FEES & EXPORTS
// =============================================================================

#[test]
fn fee_plan_lifecycle() {
    let s = school();
    let plan = fees::create_plan(
        &s.store,
        &FeePlanForm {
            description: "Term fees".into(),
            total_amount: "1000".into(),
            months: "3".into(),
            start_date: "2024-01-31".into(),
            ..FeePlanForm::default()
        },
        Some(s.student_id),
        now(),
    )
    .expect("plan");
    assert_eq!(fees::ensure_installments(&s.store, plan.id).expect("generate"), 3);

    let summary = fees::plan_summary(&s.store.read().expect("read"), plan.id).expect("summary");
    let amounts: Vec<String> = summary.installments.iter().map(|i| i.amount.to_string()).collect();
    assert_eq!(amounts, ["333.33", "333.33", "333.34"]);
    let dues: Vec<NaiveDate> = summary.installments.iter().map(|i| i.due_date).collect();
    assert_eq!(dues, [day(2024, 1, 31), day(2024, 2, 29), day(2024, 3, 31)]);

    let first = summary.installments[0].id;
    fees::toggle_paid(&s.store, first, day(2024, 2, 1)).expect("pay");
    let summary = fees::plan_summary(&s.store.read().expect("read"), plan.id).expect("summary");
    assert_eq!(summary.total_paid.to_string(), "333.33");
    assert_eq!(summary.balance.to_string(), "666.67");

    // paid rows survive regeneration untouched
    assert_eq!(fees::ensure_installments(&s.store, plan.id).expect("regenerate"), 2);
}

#[test]
fn exports_cover_the_school() {
    let s = school();
    let read = s.store.read().expect("read");

    let students = String::from_utf8(export::students_csv(&read).expect("csv")).expect("utf8");
    assert!(students.contains("Nur Aina,aina@school.edu,Science,2024-05-29,R-001,-"));

    let courses = String::from_utf8(export::courses_csv(&read).expect("csv")).expect("utf8");
    assert!(courses.contains(
        "Biology,BIO,Genetics (BIO1),4 Cempaka,2024,Lab 2,Tan Mei Ling,tan@school.edu,1"
    ));

    let class = String::from_utf8(export::class_students_csv(&read, s.group.id).expect("csv"))
        .expect("utf8");
    assert!(class.contains("1,Nur Aina,aina@school.edu,4 Cempaka,2024-05-29,Active"));
}
