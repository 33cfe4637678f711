//! # Student Records
//!
//! Achievements, disciplinary actions and guardians of a student, as kept by
//! lecturers, plus the combined "full details" view.
//!
//! Guardians are shared records: one parent may be linked to several
//! students, and unlinking never deletes the parent.

use crate::academics::{StudentDetail, student_detail, teaches};
use crate::accounts::lecturer_profile;
use crate::primitives::{
    MAX_FULL_NAME_LENGTH, MAX_PHONE_LENGTH, MAX_TEXT_LENGTH, MAX_TITLE_LENGTH,
};
use crate::storage::{Reader, Store};
use crate::types::{
    Achievement, ClassGroup, DisciplinaryAction, GuardianRole, LecturerProfile, Parent, ParentId,
    StudentId, StudentProfile, User, UserId,
};
use crate::validation::{INVALID_CHOICE, Validator};
use crate::SisError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;

pub const GUARDIAN_EDIT_FORBIDDEN: &str = "You are not allowed to edit this guardian.";
pub const MANAGE_FORBIDDEN: &str = "You are not authorized to manage this student.";

// =============================================================================
// ACHIEVEMENTS
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AchievementForm {
    pub title: String,
    pub description: String,
    pub date_awarded: String,
}

/// Achievements of a student, newest award first.
pub fn achievements_of(r: &impl Reader, student: StudentId) -> Result<Vec<Achievement>, SisError> {
    let mut items = r.filter::<Achievement>(|a| a.student_id == student)?;
    items.sort_by(|a, b| b.date_awarded.cmp(&a.date_awarded).then(b.id.cmp(&a.id)));
    Ok(items)
}

pub fn add_achievement(
    store: &Store,
    student: StudentId,
    form: &AchievementForm,
) -> Result<Achievement, SisError> {
    store.write(|tx| {
        tx.fetch::<StudentProfile>(student)?;
        let mut v = Validator::new();
        let title = v.required("title", &form.title, MAX_TITLE_LENGTH);
        let description = v.text("description", &form.description, MAX_TEXT_LENGTH);
        let date_awarded = v.date("date_awarded", &form.date_awarded);
        v.finish()?;
        tx.insert(Achievement {
            id: Default::default(),
            student_id: student,
            title,
            description,
            date_awarded: date_awarded.unwrap_or_default(),
        })
    })
}

// =============================================================================
// DISCIPLINARY ACTIONS
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DisciplinaryForm {
    pub action: String,
    pub description: String,
    pub date: String,
}

/// Disciplinary actions of a student, newest first.
pub fn disciplinary_of(
    r: &impl Reader,
    student: StudentId,
) -> Result<Vec<DisciplinaryAction>, SisError> {
    let mut items = r.filter::<DisciplinaryAction>(|d| d.student_id == student)?;
    items.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
    Ok(items)
}

/// Record a disciplinary action reported by `reporter`.
pub fn add_disciplinary(
    store: &Store,
    student: StudentId,
    reporter: UserId,
    form: &DisciplinaryForm,
) -> Result<DisciplinaryAction, SisError> {
    store.write(|tx| {
        tx.fetch::<StudentProfile>(student)?;
        let mut v = Validator::new();
        let action = v.required("action", &form.action, MAX_TITLE_LENGTH);
        let description = v.text("description", &form.description, MAX_TEXT_LENGTH);
        let date = v.date("date", &form.date);
        v.finish()?;
        tx.insert(DisciplinaryAction {
            id: Default::default(),
            student_id: student,
            action,
            description,
            date: date.unwrap_or_default(),
            reported_by: Some(reporter),
        })
    })
}

// =============================================================================
// GUARDIANS
// =============================================================================

/// Guardian fields. `roles` is a comma-separated list of role codes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ParentForm {
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    pub address: String,
    pub occupation: String,
    pub roles: String,
}

impl From<&Parent> for ParentForm {
    fn from(parent: &Parent) -> Self {
        Self {
            full_name: parent.full_name.clone(),
            email: parent.email.clone(),
            phone_number: parent.phone_number.clone(),
            address: parent.address.clone(),
            occupation: parent.occupation.clone(),
            roles: parent.roles_codes(),
        }
    }
}

impl ParentForm {
    /// Validate into a parent record without id or linked account.
    fn clean(&self) -> Result<Parent, SisError> {
        let mut v = Validator::new();
        let full_name = v.required("full_name", &self.full_name, MAX_FULL_NAME_LENGTH);
        let email = v.text("email", &self.email, crate::primitives::MAX_EMAIL_LENGTH);
        if !email.is_empty() && !crate::validation::is_valid_email(&email) {
            v.error("email", crate::validation::INVALID_EMAIL);
        }
        let phone_number = v.text("phone_number", &self.phone_number, MAX_PHONE_LENGTH);
        let address = v.text("address", &self.address, MAX_TEXT_LENGTH);
        let occupation = v.text("occupation", &self.occupation, MAX_TITLE_LENGTH);

        let mut roles = BTreeSet::new();
        for code in self.roles.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match GuardianRole::parse(code) {
                Some(role) => {
                    roles.insert(role);
                }
                None => v.error("roles", INVALID_CHOICE),
            }
        }
        v.finish()?;

        Ok(Parent {
            id: ParentId::default(),
            user_id: None,
            full_name,
            email: email.to_lowercase(),
            phone_number,
            address,
            occupation,
            roles,
        })
    }
}

/// Fail unless the lecturer account teaches the student's class group.
pub fn ensure_manages(
    r: &impl Reader,
    lecturer_user: UserId,
    student: StudentId,
) -> Result<(LecturerProfile, StudentProfile), SisError> {
    let lecturer = lecturer_profile(r, lecturer_user)?;
    let profile = r.fetch::<StudentProfile>(student)?;
    if !teaches(r, lecturer.id, profile.class_group_id)? {
        return Err(SisError::Forbidden(MANAGE_FORBIDDEN.to_string()));
    }
    Ok((lecturer, profile))
}

/// Result of adding a guardian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked(Parent),
    AlreadyLinked(Parent),
}

/// Add a guardian to a student the lecturer teaches.
///
/// An existing parent with the same name (and phone, when one is given)
/// is reused instead of creating a duplicate.
pub fn add_guardian(
    store: &Store,
    lecturer_user: UserId,
    student: StudentId,
    form: &ParentForm,
) -> Result<LinkOutcome, SisError> {
    store.write(|tx| {
        let (_, mut profile) = ensure_manages(tx, lecturer_user, student)?;
        let candidate = form.clean()?;

        let name = candidate.full_name.to_lowercase();
        let phone = candidate.phone_number.to_lowercase();
        let existing = tx.find::<Parent>(|p| {
            p.full_name.trim().to_lowercase() == name
                && (phone.is_empty() || p.phone_number.trim().to_lowercase() == phone)
        })?;
        let parent = match existing {
            Some(parent) => parent,
            None => tx.insert(candidate)?,
        };

        if profile.parent_ids.insert(parent.id) {
            tx.put(&profile)?;
            Ok(LinkOutcome::Linked(parent))
        } else {
            Ok(LinkOutcome::AlreadyLinked(parent))
        }
    })
}

/// Guardians linked to a student the lecturer teaches.
pub fn guardians_of(
    r: &impl Reader,
    lecturer_user: UserId,
    student: StudentId,
) -> Result<Vec<Parent>, SisError> {
    let (_, profile) = ensure_manages(r, lecturer_user, student)?;
    let mut parents = Vec::new();
    for id in &profile.parent_ids {
        if let Some(parent) = r.get::<Parent>(*id)? {
            parents.push(parent);
        }
    }
    Ok(parents)
}

/// Unlink a guardian from a student. The parent record stays.
pub fn unlink_guardian(
    store: &Store,
    lecturer_user: UserId,
    student: StudentId,
    parent: ParentId,
) -> Result<(), SisError> {
    store.write(|tx| {
        let (_, mut profile) = ensure_manages(tx, lecturer_user, student)?;
        tx.fetch::<Parent>(parent)?;
        if profile.parent_ids.remove(&parent) {
            tx.put(&profile)?;
        }
        Ok(())
    })
}

/// Edit a guardian. Only the guardian's own account or an administrator may.
pub fn update_guardian(
    store: &Store,
    actor: &User,
    parent: ParentId,
    form: &ParentForm,
) -> Result<Parent, SisError> {
    store.write(|tx| {
        let current = tx.fetch::<Parent>(parent)?;
        if !can_edit_guardian(actor, &current) {
            return Err(SisError::Forbidden(GUARDIAN_EDIT_FORBIDDEN.to_string()));
        }
        let mut updated = form.clean()?;
        updated.id = current.id;
        updated.user_id = current.user_id;
        tx.put(&updated)?;
        Ok(updated)
    })
}

pub fn can_edit_guardian(actor: &User, parent: &Parent) -> bool {
    parent.user_id == Some(actor.id) || actor.is_admin()
}

// =============================================================================
// FULL DETAILS
// =============================================================================

/// Student detail with records and the lecturers of every class group.
#[derive(Debug, Clone)]
pub struct FullDetails {
    pub detail: StudentDetail,
    pub achievements: Vec<Achievement>,
    pub disciplinary: Vec<DisciplinaryAction>,
    /// Lecturer accounts per enrolled class group, in enrollment order.
    pub lecturers: Vec<(ClassGroup, Vec<User>)>,
}

/// Everything known about a student, by account id.
pub fn full_details(r: &impl Reader, user_id: UserId) -> Result<FullDetails, SisError> {
    let detail = student_detail(r, user_id)?;
    let achievements = achievements_of(r, detail.profile.id)?;
    let disciplinary = disciplinary_of(r, detail.profile.id)?;

    let mut lecturers = Vec::new();
    for (_, group) in &detail.enrollments {
        let mut users = Vec::new();
        for id in &group.lecturer_ids {
            if let Some(profile) = r.get::<LecturerProfile>(*id)? {
                if let Some(user) = r.get::<User>(profile.user_id)? {
                    users.push(user);
                }
            }
        }
        lecturers.push((group.clone(), users));
    }

    Ok(FullDetails {
        detail,
        achievements,
        disciplinary,
        lecturers,
    })
}

/// Stamp a student's latest activity.
pub fn touch_activity(
    store: &Store,
    student: StudentId,
    now: DateTime<Utc>,
) -> Result<StudentProfile, SisError> {
    store.write(|tx| {
        let mut profile = tx.fetch::<StudentProfile>(student)?;
        profile.latest_activity = Some(now);
        tx.put(&profile)?;
        Ok(profile)
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::academics::{ClassGroupForm, add_class_group, assign_lecturers};
    use crate::accounts::{NewUser, create_user, student_profile};
    use crate::types::Role;
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_717_000_000, 0).expect("timestamp")
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Store,
        lecturer: User,
        outsider: User,
        student: StudentId,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().expect("tempdir");
        let store = Store::open(dir.path().join("sis.redb")).expect("open store");
        let group = add_class_group(
            &store,
            &ClassGroupForm {
                name: "5A".into(),
                ..ClassGroupForm::default()
            },
            now().date_naive(),
        )
        .expect("group");

        let (lecturer, outsider, student) = store
            .write(|tx| {
                let lecturer =
                    create_user(tx, NewUser::new("l@x.com", "IC-L", "Lee", Role::Lecturer, now()))?;
                let outsider =
                    create_user(tx, NewUser::new("o@x.com", "IC-O", "Ong", Role::Lecturer, now()))?;
                let kid =
                    create_user(tx, NewUser::new("k@x.com", "IC-K", "Kid", Role::Student, now()))?;
                let mut profile = student_profile(tx, kid.id)?;
                profile.class_group_id = Some(group.id);
                tx.put(&profile)?;
                Ok((lecturer, outsider, profile.id))
            })
            .expect("users");

        let lecturer_id = lecturer_profile(&store.read().expect("read"), lecturer.id)
            .expect("profile")
            .id;
        assign_lecturers(&store, group.id, &lecturer_id.to_string()).expect("assign");

        Fixture {
            _dir: dir,
            store,
            lecturer,
            outsider,
            student,
        }
    }

    fn mum() -> ParentForm {
        ParentForm {
            full_name: "Siti Aminah".into(),
            phone_number: "012-111".into(),
            roles: "mother, guardian".into(),
            ..ParentForm::default()
        }
    }

    #[test]
    fn test_add_guardian_dedups_and_links_once() {
        let f = fixture();
        let first = add_guardian(&f.store, f.lecturer.id, f.student, &mum()).expect("add");
        let LinkOutcome::Linked(parent) = first else {
            unreachable!("first add links");
        };
        assert_eq!(parent.roles.len(), 2);

        let again = ParentForm {
            full_name: "SITI AMINAH".into(),
            ..mum()
        };
        let second = add_guardian(&f.store, f.lecturer.id, f.student, &again).expect("add");
        assert!(matches!(second, LinkOutcome::AlreadyLinked(ref p) if p.id == parent.id));
        assert_eq!(f.store.read().expect("read").count::<Parent>().expect("count"), 1);
    }

    #[test]
    fn test_only_class_lecturer_manages_guardians() {
        let f = fixture();
        let err = add_guardian(&f.store, f.outsider.id, f.student, &mum()).expect_err("forbidden");
        assert!(matches!(err, SisError::Forbidden(_)));
        let read = f.store.read().expect("read");
        assert!(guardians_of(&read, f.outsider.id, f.student).is_err());
    }

    #[test]
    fn test_unlink_keeps_parent() {
        let f = fixture();
        let LinkOutcome::Linked(parent) =
            add_guardian(&f.store, f.lecturer.id, f.student, &mum()).expect("add")
        else {
            unreachable!("first add links");
        };
        unlink_guardian(&f.store, f.lecturer.id, f.student, parent.id).expect("unlink");

        let read = f.store.read().expect("read");
        assert!(guardians_of(&read, f.lecturer.id, f.student).expect("list").is_empty());
        assert!(read.get::<Parent>(parent.id).expect("get").is_some());
    }

    #[test]
    fn test_guardian_update_permissions() {
        let f = fixture();
        let LinkOutcome::Linked(parent) =
            add_guardian(&f.store, f.lecturer.id, f.student, &mum()).expect("add")
        else {
            unreachable!("first add links");
        };
        let edit = ParentForm {
            occupation: "Teacher".into(),
            ..mum()
        };
        let err = update_guardian(&f.store, &f.lecturer, parent.id, &edit).expect_err("forbidden");
        assert_eq!(err.to_string(), GUARDIAN_EDIT_FORBIDDEN);

        let mut admin = f.lecturer.clone();
        admin.role = Role::Admin;
        let updated = update_guardian(&f.store, &admin, parent.id, &edit).expect("admin edits");
        assert_eq!(updated.occupation, "Teacher");
    }

    #[test]
    fn test_records_are_newest_first() {
        let f = fixture();
        for date in ["2024-01-10", "2024-03-02", "2024-02-20"] {
            add_achievement(
                &f.store,
                f.student,
                &AchievementForm {
                    title: format!("Prize {date}"),
                    description: String::new(),
                    date_awarded: date.into(),
                },
            )
            .expect("achievement");
        }
        add_disciplinary(
            &f.store,
            f.student,
            f.lecturer.id,
            &DisciplinaryForm {
                action: "Warning".into(),
                description: "Late".into(),
                date: "2024-02-01".into(),
            },
        )
        .expect("action");

        let read = f.store.read().expect("read");
        let items = achievements_of(&read, f.student).expect("list");
        assert_eq!(items[0].title, "Prize 2024-03-02");
        let actions = disciplinary_of(&read, f.student).expect("list");
        assert_eq!(actions[0].reported_by, Some(f.lecturer.id));
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn test_achievement_requires_title_and_date() {
        let f = fixture();
        let err = add_achievement(&f.store, f.student, &AchievementForm::default())
            .expect_err("invalid");
        let SisError::Validation(errors) = err else {
            unreachable!("validation error expected");
        };
        assert!(!errors.field("title").is_empty());
        assert!(!errors.field("date_awarded").is_empty());
    }

    #[test]
    fn test_touch_activity() {
        let f = fixture();
        let profile = touch_activity(&f.store, f.student, now()).expect("touch");
        assert_eq!(profile.latest_activity, Some(now()));
    }
}
