//! # Dashboards
//!
//! The landing page of each role, aggregated from the record store.

use crate::academics::{class_group_members, class_groups_of_lecturer};
use crate::accounts::{lecturer_profile, student_profile};
use crate::attendance::Tally;
use crate::notifications::unread_count;
use crate::records::disciplinary_of;
use crate::storage::{Reader, Store};
use crate::types::{
    ClassGroup, Course, DisciplinaryAction, Enrollment, LecturerProfile, Percentage, Role,
    StudentId, StudentProfile, User, UserId,
};
use crate::SisError;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Head counts for administrators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdminDashboard {
    pub total_lecturers: usize,
    pub total_students: usize,
    pub total_courses: u64,
    pub total_users: u64,
}

pub fn admin(r: &impl Reader) -> Result<AdminDashboard, SisError> {
    let users = r.all::<User>()?;
    Ok(AdminDashboard {
        total_lecturers: users.iter().filter(|u| u.role == Role::Lecturer).count(),
        total_students: users.iter().filter(|u| u.role == Role::Student).count(),
        total_courses: r.count::<Course>()?,
        total_users: users.len() as u64,
    })
}

/// One student line on the lecturer dashboard.
#[derive(Debug, Clone)]
pub struct StudentInfo {
    pub user: User,
    pub profile: StudentProfile,
    /// Enrollment in the listed class group, if the student has one.
    pub enrollment: Option<Enrollment>,
    /// Zero when nothing is marked.
    pub percentage: Percentage,
}

#[derive(Debug, Clone)]
pub struct LecturerDashboard {
    pub lecturer: LecturerProfile,
    /// Each class group with the students whose home class group it is.
    pub classes: Vec<(ClassGroup, Vec<StudentInfo>)>,
    pub total_students: usize,
    /// Mean of the unrounded per-student shares, zero for unmarked students.
    pub average_attendance: Percentage,
    /// Distinct students with any mark today.
    pub todays_attendance: usize,
    pub unread_notifications: usize,
}

pub fn lecturer(
    r: &impl Reader,
    user: UserId,
    today: NaiveDate,
) -> Result<LecturerDashboard, SisError> {
    let lecturer = lecturer_profile(r, user)?;
    let mut classes = Vec::new();
    let mut shares = Vec::new();
    let mut marked_today: BTreeSet<StudentId> = BTreeSet::new();

    for group in class_groups_of_lecturer(r, lecturer.id)? {
        let mut tallies: BTreeMap<StudentId, (Enrollment, Tally)> = BTreeMap::new();
        for enrollment in r.filter::<Enrollment>(|e| e.class_group_id == group.id)? {
            let marks = r.attendance_of(enrollment.id)?;
            if marks.iter().any(|m| m.date == today) {
                marked_today.insert(enrollment.student_id);
            }
            tallies.insert(enrollment.student_id, (enrollment, Tally::of(&marks)));
        }

        let mut students = Vec::new();
        for (profile, user) in class_group_members(r, group.id)? {
            let (enrollment, tally) = match tallies.remove(&profile.id) {
                Some((enrollment, tally)) => (Some(enrollment), tally),
                None => (None, Tally::default()),
            };
            shares.push((tally.present, tally.total));
            students.push(StudentInfo {
                user,
                profile,
                enrollment,
                percentage: tally.percentage().unwrap_or_default(),
            });
        }
        classes.push((group, students));
    }

    Ok(LecturerDashboard {
        total_students: shares.len(),
        average_attendance: Percentage::mean_of_shares(shares).unwrap_or_default(),
        todays_attendance: marked_today.len(),
        unread_notifications: unread_count(r, user)?,
        lecturer,
        classes,
    })
}

#[derive(Debug, Clone)]
pub struct StudentDashboard {
    pub profile: StudentProfile,
    pub enrollments: Vec<(ClassGroup, Percentage)>,
    /// Newest first.
    pub disciplinary: Vec<DisciplinaryAction>,
}

/// The student landing page. Opening it counts as activity.
pub fn student(
    store: &Store,
    user: UserId,
    now: DateTime<Utc>,
) -> Result<StudentDashboard, SisError> {
    let profile = store.write(|tx| {
        let mut profile = student_profile(tx, user)?;
        profile.latest_activity = Some(now);
        tx.put(&profile)?;
        Ok(profile)
    })?;

    let r = store.read()?;
    let mut enrollments = Vec::new();
    for enrollment in r.filter::<Enrollment>(|e| e.student_id == profile.id)? {
        let group = r.fetch::<ClassGroup>(enrollment.class_group_id)?;
        let percentage = Tally::of(&r.attendance_of(enrollment.id)?)
            .percentage()
            .unwrap_or_default();
        enrollments.push((group, percentage));
    }
    let disciplinary = disciplinary_of(&r, profile.id)?;

    Ok(StudentDashboard {
        profile,
        enrollments,
        disciplinary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::academics::{
        ClassGroupForm, EnrollOutcome, add_class_group, assign_lecturers, enroll,
    };
    use crate::accounts::{NewUser, create_user};
    use crate::attendance::mark;
    use crate::notifications::{MessageForm, send_message};
    use crate::types::{AttendanceSession, AttendanceStatus, EnrollmentId};
    use chrono::Days;
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_717_000_000, 0).expect("timestamp")
    }

    fn mark_at(
        store: &Store,
        enrollment: EnrollmentId,
        date: NaiveDate,
        session: AttendanceSession,
        status: AttendanceStatus,
    ) {
        mark(store, enrollment, date, session, status, "").expect("mark");
    }

    #[test]
    fn test_dashboards() {
        let dir = tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("sis.redb")).expect("open store");
        let today = now().date_naive();
        let group = add_class_group(
            &store,
            &ClassGroupForm {
                name: "5A".into(),
                ..ClassGroupForm::default()
            },
            today,
        )
        .expect("group");

        let (lecturer, students) = store
            .write(|tx| {
                let lecturer =
                    create_user(tx, NewUser::new("l@x.com", "IC-L", "Lee", Role::Lecturer, now()))?;
                let mut students: Vec<(User, EnrollmentId)> = Vec::new();
                let kids = [
                    ("a@x.com", "IC-A", true),
                    ("b@x.com", "IC-B", true),
                    ("c@x.com", "IC-C", false),
                ];
                for (email, ic, home) in kids {
                    let user =
                        create_user(tx, NewUser::new(email, ic, "Kid", Role::Student, now()))?;
                    let mut profile = student_profile(tx, user.id)?;
                    if home {
                        profile.class_group_id = Some(group.id);
                        tx.put(&profile)?;
                    }
                    let outcome = enroll(tx, profile.id, group.id, today)?;
                    let EnrollOutcome::Enrolled(e) = outcome else {
                        unreachable!("fresh enrollment");
                    };
                    students.push((user, e.id));
                }
                Ok((lecturer, students))
            })
            .expect("users");
        let profile = lecturer_profile(&store.read().expect("read"), lecturer.id).expect("profile");
        assign_lecturers(&store, group.id, &profile.id.to_string()).expect("assign");

        // a: 2 of 3 present
        let yesterday = today.pred_opt().expect("date");
        let (a, b, c) = (students[0].1, students[1].1, students[2].1);
        mark_at(&store, a, today, AttendanceSession::Morning, AttendanceStatus::Present);
        mark_at(&store, a, today, AttendanceSession::Evening, AttendanceStatus::Present);
        mark_at(&store, a, yesterday, AttendanceSession::Morning, AttendanceStatus::Absent);
        // b: 1 of 8 present
        for back in 0..4 {
            let date = today.checked_sub_days(Days::new(back)).expect("date");
            for session in [AttendanceSession::Morning, AttendanceSession::Evening] {
                let status = if back == 0 && session == AttendanceSession::Morning {
                    AttendanceStatus::Present
                } else {
                    AttendanceStatus::Absent
                };
                mark_at(&store, b, date, session, status);
            }
        }
        // c is enrolled but belongs to no home class group
        mark_at(&store, c, yesterday, AttendanceSession::Morning, AttendanceStatus::Absent);

        let form = MessageForm {
            student_email: "a@x.com".into(),
            message: "Well done".into(),
        };
        send_message(&store, &lecturer, &form, now()).expect("send");

        let read = store.read().expect("read");
        let counts = admin(&read).expect("admin");
        assert_eq!((counts.total_lecturers, counts.total_students, counts.total_users), (1, 3, 4));

        let board = super::lecturer(&read, lecturer.id, today).expect("lecturer");
        assert_eq!(board.total_students, 2);
        assert_eq!(board.classes[0].1.len(), 2);
        assert_eq!(board.todays_attendance, 2);
        assert_eq!(board.classes[0].1[0].percentage.to_string(), "66.67");
        assert_eq!(board.classes[0].1[1].percentage.to_string(), "12.50");
        // Mean of 66.666..% and 12.5%, not of the rounded figures
        assert_eq!(board.average_attendance.to_string(), "39.58");
        assert_eq!(board.unread_notifications, 1);
        drop(read);

        let mine = student(&store, students[0].0.id, now()).expect("student");
        assert_eq!(mine.profile.latest_activity, Some(now()));
        assert_eq!(mine.enrollments[0].1.to_string(), "66.67");
    }

    #[test]
    fn test_member_without_enrollment_counts_as_zero() {
        let dir = tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("sis.redb")).expect("open store");
        let today = now().date_naive();
        let group = add_class_group(
            &store,
            &ClassGroupForm {
                name: "5B".into(),
                ..ClassGroupForm::default()
            },
            today,
        )
        .expect("group");
        let lecturer = store
            .write(|tx| {
                let lecturer =
                    create_user(tx, NewUser::new("l@x.com", "IC-L", "Lee", Role::Lecturer, now()))?;
                let user =
                    create_user(tx, NewUser::new("s@x.com", "IC-S", "Sam", Role::Student, now()))?;
                let mut profile = student_profile(tx, user.id)?;
                profile.class_group_id = Some(group.id);
                tx.put(&profile)?;
                Ok(lecturer)
            })
            .expect("users");
        let profile = lecturer_profile(&store.read().expect("read"), lecturer.id).expect("profile");
        assign_lecturers(&store, group.id, &profile.id.to_string()).expect("assign");

        let board = super::lecturer(&store.read().expect("read"), lecturer.id, today).expect("lecturer");
        let (_, students) = &board.classes[0];
        assert_eq!(board.total_students, 1);
        assert!(students[0].enrollment.is_none());
        assert_eq!(students[0].percentage, Percentage::ZERO);
        assert_eq!(board.average_attendance, Percentage::ZERO);
    }
}
