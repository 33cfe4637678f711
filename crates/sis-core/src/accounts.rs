//! # Accounts
//!
//! User accounts, password hashing, login, and the per-role profiles that
//! hang off every account.
//!
//! ## Identity
//!
//! A user logs in with either their email or their identity card number,
//! both matched case-insensitively. Both are unique across all users; a
//! duplicate is reported as a field error on the submitting form.
//!
//! ## Profiles
//!
//! Saving a user with role `STUDENT` or `LECTURER` guarantees the matching
//! profile record exists (see [`ensure_profile`]).

use crate::primitives::{
    DEFAULT_ADMIN_IC, DEFAULT_ADMIN_NAME, DEFAULT_ADMIN_SHORT_NAME, DEFAULT_PASSWORD,
    MAX_FULL_NAME_LENGTH, MAX_IC_LENGTH, MAX_PHONE_LENGTH, MAX_SHORT_NAME_LENGTH, MAX_TEXT_LENGTH,
    MAX_TITLE_LENGTH,
};
use crate::storage::{Reader, Store, WriteTx};
use crate::types::{
    Achievement, ClassGroup, Department, DepartmentId, DisciplinaryAction, Enrollment, FeePlan,
    Installment, LecturerProfile, Notification, Parent, Role, StudentProfile, User, UserId,
};
use crate::validation::{INVALID_CHOICE, REQUIRED, Validator};
use crate::SisError;
use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;

pub const DUPLICATE_EMAIL: &str = "A user with this email already exists.";
pub const DUPLICATE_IC: &str = "A user with this IC number already exists.";
pub const PASSWORD_MISMATCH: &str = "Passwords do not match.";

// =============================================================================
// PASSWORDS
// =============================================================================

/// Hash a password into an Argon2 PHC string.
pub fn hash_password(raw: &str) -> Result<String, SisError> {
    let salt = SaltString::encode_b64(uuid::Uuid::new_v4().as_bytes())
        .map_err(|e| SisError::HashError(e.to_string()))?;
    Argon2::default()
        .hash_password(raw.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| SisError::HashError(e.to_string()))
}

/// Check a password against a stored PHC string. Malformed hashes never match.
pub fn verify_password(raw: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(raw.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

// =============================================================================
// CREATION
// =============================================================================

/// Cleaned data for a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub identity_card_number: String,
    pub full_name: String,
    /// Blank means "first word of the full name".
    pub short_name: String,
    pub role: Role,
    pub phone_number: String,
    pub address: String,
    pub department_id: Option<DepartmentId>,
    /// Blank means [`DEFAULT_PASSWORD`].
    pub password: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
}

impl NewUser {
    pub fn new(
        email: &str,
        identity_card_number: &str,
        full_name: &str,
        role: Role,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            email: email.trim().to_lowercase(),
            identity_card_number: identity_card_number.trim().to_string(),
            full_name: full_name.trim().to_string(),
            short_name: String::new(),
            role,
            phone_number: String::new(),
            address: String::new(),
            department_id: None,
            password: String::new(),
            is_staff: role == Role::Admin,
            is_superuser: false,
            date_joined: now,
        }
    }
}

/// Raw account fields as submitted by the add-lecturer, add-staff and
/// add-student pages.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccountForm {
    pub email: String,
    pub identity_card_number: String,
    pub full_name: String,
    pub short_name: String,
    pub phone_number: String,
    pub address: String,
    pub department: String,
    pub password: String,
    pub confirm_password: String,
    pub date_joined: String,
    /// Comma-separated subject ids; only lecturers teach subjects.
    pub subjects: String,
}

impl AccountForm {
    /// Validate the shared account fields into a [`NewUser`].
    pub fn clean(
        &self,
        v: &mut Validator,
        role: Role,
        department_required: bool,
        now: DateTime<Utc>,
    ) -> NewUser {
        let email = v.email("email", &self.email);
        let ic = v.required("identity_card_number", &self.identity_card_number, MAX_IC_LENGTH);
        let full_name = v.required("full_name", &self.full_name, MAX_FULL_NAME_LENGTH);
        let short_name = v.text("short_name", &self.short_name, MAX_SHORT_NAME_LENGTH);
        let phone_number = v.text("phone_number", &self.phone_number, MAX_PHONE_LENGTH);
        let address = v.text("address", &self.address, MAX_TEXT_LENGTH);
        let department_id = if department_required {
            v.number("department", &self.department)
        } else {
            v.optional_number("department", &self.department)
        };

        if (!self.password.is_empty() || !self.confirm_password.is_empty())
            && self.password != self.confirm_password
        {
            v.error("confirm_password", PASSWORD_MISMATCH);
        }

        let date_joined = v
            .optional_date("date_joined", &self.date_joined)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .unwrap_or(now);

        NewUser {
            email,
            identity_card_number: ic,
            full_name,
            short_name,
            role,
            phone_number,
            address,
            department_id,
            password: self.password.clone(),
            is_staff: role == Role::Admin,
            is_superuser: false,
            date_joined,
        }
    }
}

/// First word of a full name.
pub fn default_short_name(full_name: &str) -> String {
    full_name
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Report duplicate email / IC into `v`, ignoring `exclude`.
pub fn check_unique(
    r: &impl Reader,
    v: &mut Validator,
    email: &str,
    identity_card_number: &str,
    exclude: Option<UserId>,
) -> Result<(), SisError> {
    let email = email.trim().to_lowercase();
    let ic = identity_card_number.trim().to_lowercase();
    let users = r.all::<User>()?;
    let others = users.iter().filter(|u| Some(u.id) != exclude);

    let mut email_taken = false;
    let mut ic_taken = false;
    for user in others {
        email_taken |= !email.is_empty() && user.email.to_lowercase() == email;
        ic_taken |= !ic.is_empty() && user.identity_card_number.to_lowercase() == ic;
    }
    if email_taken {
        v.error("email", DUPLICATE_EMAIL);
    }
    if ic_taken {
        v.error("identity_card_number", DUPLICATE_IC);
    }
    Ok(())
}

/// Create an account and its profile inside an open write transaction.
pub fn create_user(tx: &WriteTx, new: NewUser) -> Result<User, SisError> {
    let mut v = Validator::new();
    if new.email.trim().is_empty() {
        v.error("email", REQUIRED);
    }
    if new.identity_card_number.trim().is_empty() {
        v.error("identity_card_number", REQUIRED);
    }
    if let Some(department) = new.department_id {
        if tx.get::<Department>(department)?.is_none() {
            v.error("department", INVALID_CHOICE);
        }
    }
    check_unique(tx, &mut v, &new.email, &new.identity_card_number, None)?;
    v.finish()?;

    let password = if new.password.is_empty() {
        DEFAULT_PASSWORD
    } else {
        new.password.as_str()
    };
    let short_name = if new.short_name.trim().is_empty() {
        default_short_name(&new.full_name)
    } else {
        new.short_name.trim().to_string()
    };

    let user = tx.insert(User {
        id: UserId::default(),
        email: new.email.trim().to_lowercase(),
        identity_card_number: new.identity_card_number.trim().to_string(),
        full_name: new.full_name,
        short_name,
        role: new.role,
        phone_number: new.phone_number,
        address: new.address,
        department_id: new.department_id,
        is_active: true,
        is_staff: new.is_staff,
        is_superuser: new.is_superuser,
        date_joined: new.date_joined,
        last_login: None,
        password_hash: hash_password(password)?,
    })?;
    ensure_profile(tx, &user)?;
    Ok(user)
}

/// Create an administrator with superuser rights.
///
/// Blank identity card number and names fall back to the built-in admin
/// defaults.
pub fn create_superuser(
    store: &Store,
    email: &str,
    password: &str,
    identity_card_number: Option<&str>,
    full_name: Option<&str>,
    now: DateTime<Utc>,
) -> Result<User, SisError> {
    let ic = identity_card_number
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_ADMIN_IC);
    let name = full_name
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_ADMIN_NAME);

    let mut new = NewUser::new(email, ic, name, Role::Admin, now);
    new.short_name = if full_name.is_some_and(|s| !s.trim().is_empty()) {
        default_short_name(name)
    } else {
        DEFAULT_ADMIN_SHORT_NAME.to_string()
    };
    new.password = password.to_string();
    new.is_staff = true;
    new.is_superuser = true;
    store.write(|tx| create_user(tx, new))
}

/// Make sure a student or lecturer account has its profile record.
pub fn ensure_profile(tx: &WriteTx, user: &User) -> Result<(), SisError> {
    match user.role {
        Role::Student => {
            if tx
                .find::<StudentProfile>(|s| s.user_id == user.id)?
                .is_none()
            {
                tx.insert(StudentProfile {
                    id: Default::default(),
                    user_id: user.id,
                    class_group_id: None,
                    parent_ids: BTreeSet::new(),
                    registration_number: String::new(),
                    date_of_birth: None,
                    address: user.address.clone(),
                    phone_number: user.phone_number.clone(),
                    latest_activity: None,
                    emergency_name: String::new(),
                    emergency_relation: String::new(),
                    emergency_phone: String::new(),
                })?;
            }
        }
        Role::Lecturer => {
            if tx
                .find::<LecturerProfile>(|l| l.user_id == user.id)?
                .is_none()
            {
                tx.insert(LecturerProfile {
                    id: Default::default(),
                    user_id: user.id,
                    department_id: user.department_id,
                    subject_ids: BTreeSet::new(),
                    phone_number: user.phone_number.clone(),
                    address: user.address.clone(),
                })?;
            }
        }
        Role::Admin => {}
    }
    Ok(())
}

// =============================================================================
// LOOKUP
// =============================================================================

/// Student profile of a user.
pub fn student_profile(r: &impl Reader, user: UserId) -> Result<StudentProfile, SisError> {
    r.find::<StudentProfile>(|s| s.user_id == user)?
        .ok_or(SisError::NotFound("Student"))
}

/// Lecturer profile of a user.
pub fn lecturer_profile(r: &impl Reader, user: UserId) -> Result<LecturerProfile, SisError> {
    r.find::<LecturerProfile>(|l| l.user_id == user)?
        .ok_or(SisError::NotFound("Lecturer"))
}

/// Account with the given email, case-insensitively.
pub fn user_by_email(r: &impl Reader, email: &str) -> Result<Option<User>, SisError> {
    let email = email.trim().to_lowercase();
    r.find::<User>(|u| u.email.to_lowercase() == email)
}

// =============================================================================
// LOGIN
// =============================================================================

/// Check credentials and record the login.
///
/// `identifier` is an email or identity card number. Unknown identifiers,
/// wrong passwords and inactive accounts all fail the same way.
pub fn authenticate(
    store: &Store,
    identifier: &str,
    password: &str,
    now: DateTime<Utc>,
) -> Result<User, SisError> {
    let ident = identifier.trim().to_lowercase();
    if ident.is_empty() || password.is_empty() {
        return Err(SisError::InvalidCredentials);
    }

    let candidate = store.read()?.find::<User>(|u| {
        u.email.to_lowercase() == ident || u.identity_card_number.to_lowercase() == ident
    })?;
    let Some(user) = candidate else {
        return Err(SisError::InvalidCredentials);
    };
    if !user.is_active || !verify_password(password, &user.password_hash) {
        return Err(SisError::InvalidCredentials);
    }

    store.write(|tx| {
        let mut user = tx.fetch::<User>(user.id)?;
        user.last_login = Some(now);
        tx.put(&user)?;
        if user.role == Role::Student {
            if let Some(mut profile) = tx.find::<StudentProfile>(|s| s.user_id == user.id)? {
                profile.latest_activity = Some(now);
                tx.put(&profile)?;
            }
        }
        Ok(user)
    })
}

// =============================================================================
// PROFILE UPDATE
// =============================================================================

/// Self-service profile fields. Which ones apply depends on the role; email
/// and identity card number are never editable here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileForm {
    pub full_name: String,
    pub short_name: String,
    pub phone_number: String,
    pub address: String,
    pub department: String,
    pub date_of_birth: String,
    pub emergency_name: String,
    pub emergency_relation: String,
    pub emergency_phone: String,
}

impl ProfileForm {
    /// Prefill from the current records.
    pub fn from_records(user: &User, student: Option<&StudentProfile>) -> Self {
        let mut form = Self {
            full_name: user.full_name.clone(),
            short_name: user.short_name.clone(),
            phone_number: user.phone_number.clone(),
            address: user.address.clone(),
            department: user
                .department_id
                .map(|d| d.to_string())
                .unwrap_or_default(),
            ..Self::default()
        };
        if let Some(student) = student {
            form.date_of_birth = student
                .date_of_birth
                .map(|d| d.to_string())
                .unwrap_or_default();
            form.emergency_name = student.emergency_name.clone();
            form.emergency_relation = student.emergency_relation.clone();
            form.emergency_phone = student.emergency_phone.clone();
        }
        form
    }
}

/// Apply a profile form for the given user.
pub fn update_profile(
    store: &Store,
    user_id: UserId,
    form: &ProfileForm,
) -> Result<User, SisError> {
    store.write(|tx| {
        let mut user = tx.fetch::<User>(user_id)?;
        let mut v = Validator::new();

        let full_name = v.required("full_name", &form.full_name, MAX_FULL_NAME_LENGTH);
        let short_name = v.text("short_name", &form.short_name, MAX_SHORT_NAME_LENGTH);
        let phone_number = v.text("phone_number", &form.phone_number, MAX_PHONE_LENGTH);
        let address = v.text("address", &form.address, MAX_TEXT_LENGTH);
        let department_id = match user.role {
            Role::Admin | Role::Lecturer => {
                let id = v.optional_number::<DepartmentId>("department", &form.department);
                if let Some(id) = id {
                    if tx.get::<Department>(id)?.is_none() {
                        v.error("department", INVALID_CHOICE);
                    }
                }
                id
            }
            Role::Student => user.department_id,
        };
        let date_of_birth = v.optional_date("date_of_birth", &form.date_of_birth);
        let emergency_name = v.text("emergency_name", &form.emergency_name, MAX_FULL_NAME_LENGTH);
        let emergency_relation =
            v.text("emergency_relation", &form.emergency_relation, MAX_TITLE_LENGTH);
        let emergency_phone = v.text("emergency_phone", &form.emergency_phone, MAX_PHONE_LENGTH);
        v.finish()?;

        user.full_name = full_name;
        user.short_name = if short_name.is_empty() {
            default_short_name(&user.full_name)
        } else {
            short_name
        };
        user.department_id = department_id;
        if user.role != Role::Admin {
            user.phone_number = phone_number.clone();
            user.address = address.clone();
        }
        tx.put(&user)?;

        match user.role {
            Role::Lecturer => {
                ensure_profile(tx, &user)?;
                let mut lecturer = lecturer_profile(tx, user.id)?;
                lecturer.department_id = department_id;
                lecturer.phone_number = phone_number;
                lecturer.address = address;
                tx.put(&lecturer)?;
            }
            Role::Student => {
                ensure_profile(tx, &user)?;
                let mut student = student_profile(tx, user.id)?;
                student.phone_number = phone_number;
                student.address = address;
                student.date_of_birth = date_of_birth;
                student.emergency_name = emergency_name;
                student.emergency_relation = emergency_relation;
                student.emergency_phone = emergency_phone;
                tx.put(&student)?;
            }
            Role::Admin => {}
        }
        Ok(user)
    })
}

// =============================================================================
// DELETION
// =============================================================================

/// Delete an account together with everything that belongs to it.
///
/// A student takes their profile, enrollments, attendance, achievements,
/// disciplinary record and fee plans along. A lecturer is removed from the
/// class groups they teach. Guardians linked to the account stay, unlinked.
pub fn delete_user(store: &Store, user_id: UserId) -> Result<(), SisError> {
    store.write(|tx| {
        let user = tx.fetch::<User>(user_id)?;

        if let Some(student) = tx.find::<StudentProfile>(|s| s.user_id == user.id)? {
            for enrollment in tx.filter::<Enrollment>(|e| e.student_id == student.id)? {
                for mark in tx.attendance_of(enrollment.id)? {
                    tx.remove_attendance(&mark)?;
                }
                tx.remove::<Enrollment>(enrollment.id)?;
            }
            for item in tx.filter::<Achievement>(|a| a.student_id == student.id)? {
                tx.remove::<Achievement>(item.id)?;
            }
            for item in tx.filter::<DisciplinaryAction>(|d| d.student_id == student.id)? {
                tx.remove::<DisciplinaryAction>(item.id)?;
            }
            for plan in tx.filter::<FeePlan>(|p| p.student_id == student.id)? {
                for inst in tx.filter::<Installment>(|i| i.plan_id == plan.id)? {
                    tx.remove::<Installment>(inst.id)?;
                }
                tx.remove::<FeePlan>(plan.id)?;
            }
            tx.remove::<StudentProfile>(student.id)?;
        }

        if let Some(lecturer) = tx.find::<LecturerProfile>(|l| l.user_id == user.id)? {
            for mut group in tx.filter::<ClassGroup>(|g| g.lecturer_ids.contains(&lecturer.id))? {
                group.lecturer_ids.remove(&lecturer.id);
                tx.put(&group)?;
            }
            tx.remove::<LecturerProfile>(lecturer.id)?;
        }

        for mut parent in tx.filter::<Parent>(|p| p.user_id == Some(user.id))? {
            parent.user_id = None;
            tx.put(&parent)?;
        }
        for note in tx.filter::<Notification>(|n| n.recipient_id == user.id)? {
            tx.remove::<Notification>(note.id)?;
        }

        tx.remove::<User>(user.id)?;
        Ok(())
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::academics::{EnrollOutcome, enroll};
    use crate::attendance::mark;
    use crate::fees::ensure_installments;
    use crate::types::{
        Attendance, AttendanceSession, AttendanceStatus, ClassGroupId, FeePlanStatus,
        GuardianRole, LecturerId, Money, StudentId,
    };
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_717_000_000, 0).expect("timestamp")
    }

    fn open_store(dir: &tempfile::TempDir) -> Store {
        Store::open(dir.path().join("sis.redb")).expect("open store")
    }

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("s3cret").expect("hash");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cret", "not-a-hash"));
    }

    #[test]
    fn test_short_name_defaults_to_first_word() {
        assert_eq!(default_short_name("Nur Aisyah Binti Ali"), "Nur");
        assert_eq!(default_short_name(""), "");
    }

    #[test]
    fn test_create_student_makes_profile() {
        let dir = tempdir().expect("tempdir");
        let store = open_store(&dir);
        let new = NewUser::new(
            "Ali@School.edu",
            "990101-14-5555",
            "Ali Bin Abu",
            Role::Student,
            now(),
        );
        let user = store.write(|tx| create_user(tx, new)).expect("create");

        assert_eq!(user.email, "ali@school.edu");
        assert_eq!(user.short_name, "Ali");
        assert!(verify_password(DEFAULT_PASSWORD, &user.password_hash));

        let read = store.read().expect("read");
        assert!(student_profile(&read, user.id).is_ok());
        assert!(lecturer_profile(&read, user.id).is_err());
    }

    #[test]
    fn test_duplicate_email_and_ic_are_field_errors() {
        let dir = tempdir().expect("tempdir");
        let store = open_store(&dir);
        let first = NewUser::new("a@x.com", "IC-1", "A", Role::Lecturer, now());
        store.write(|tx| create_user(tx, first)).expect("create");

        let dup = NewUser::new("A@X.COM", "ic-1", "B", Role::Lecturer, now());
        let err = store.write(|tx| create_user(tx, dup)).expect_err("duplicate");
        let SisError::Validation(errors) = err else {
            unreachable!("expected validation error, got {err:?}");
        };
        assert_eq!(errors.field("email"), [DUPLICATE_EMAIL.to_string()]);
        assert_eq!(errors.field("identity_card_number"), [DUPLICATE_IC.to_string()]);
        assert_eq!(store.read().expect("read").count::<User>().expect("count"), 1);
    }

    #[test]
    fn test_authenticate_by_email_or_ic() {
        let dir = tempdir().expect("tempdir");
        let store = open_store(&dir);
        let mut new = NewUser::new("sara@x.com", "IC-77", "Sara", Role::Student, now());
        new.password = "pw-123456".into();
        store.write(|tx| create_user(tx, new)).expect("create");

        let by_email = authenticate(&store, "SARA@x.com", "pw-123456", now()).expect("email");
        assert_eq!(by_email.last_login, Some(now()));
        assert!(authenticate(&store, "ic-77", "pw-123456", now()).is_ok());
        assert!(matches!(
            authenticate(&store, "sara@x.com", "nope", now()),
            Err(SisError::InvalidCredentials)
        ));

        let read = store.read().expect("read");
        let profile = student_profile(&read, by_email.id).expect("profile");
        assert_eq!(profile.latest_activity, Some(now()));
    }

    #[test]
    fn test_inactive_user_cannot_login() {
        let dir = tempdir().expect("tempdir");
        let store = open_store(&dir);
        let new = NewUser::new("old@x.com", "IC-2", "Old", Role::Lecturer, now());
        let mut user = store.write(|tx| create_user(tx, new)).expect("create");
        user.is_active = false;
        store.write(|tx| tx.put(&user)).expect("deactivate");

        assert!(authenticate(&store, "old@x.com", DEFAULT_PASSWORD, now()).is_err());
    }

    #[test]
    fn test_superuser_defaults() {
        let dir = tempdir().expect("tempdir");
        let store = open_store(&dir);
        let admin = create_superuser(&store, "root@x.com", "pw", None, None, now()).expect("admin");
        assert_eq!(admin.identity_card_number, DEFAULT_ADMIN_IC);
        assert_eq!(admin.full_name, DEFAULT_ADMIN_NAME);
        assert_eq!(admin.short_name, DEFAULT_ADMIN_SHORT_NAME);
        assert!(admin.is_superuser && admin.is_staff);
        assert_eq!(admin.role, Role::Admin);
    }

    #[test]
    fn test_account_form_password_mismatch() {
        let form = AccountForm {
            email: "x@y.com".into(),
            identity_card_number: "IC".into(),
            full_name: "X".into(),
            password: "a".into(),
            confirm_password: "b".into(),
            ..AccountForm::default()
        };
        let mut v = Validator::new();
        form.clean(&mut v, Role::Student, false, now());
        assert_eq!(v.errors().field("confirm_password"), [PASSWORD_MISMATCH.to_string()]);
    }

    #[test]
    fn test_update_student_profile() {
        let dir = tempdir().expect("tempdir");
        let store = open_store(&dir);
        let new = NewUser::new("kid@x.com", "IC-9", "Kid One", Role::Student, now());
        let user = store.write(|tx| create_user(tx, new)).expect("create");

        let form = ProfileForm {
            full_name: "Kid Two".into(),
            phone_number: "012-345".into(),
            date_of_birth: "2008-02-29".into(),
            emergency_name: "Mum".into(),
            ..ProfileForm::default()
        };
        let updated = update_profile(&store, user.id, &form).expect("update");
        assert_eq!(updated.short_name, "Kid");
        assert_eq!(updated.phone_number, "012-345");

        let read = store.read().expect("read");
        let profile = student_profile(&read, user.id).expect("profile");
        assert_eq!(profile.emergency_name, "Mum");
        assert!(profile.date_of_birth.is_some());
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).expect("date")
    }

    fn seed_group(tx: &WriteTx, lecturers: BTreeSet<LecturerId>) -> Result<ClassGroup, SisError> {
        tx.insert(ClassGroup {
            id: Default::default(),
            name: "5 Bestari".into(),
            department_id: None,
            course_id: None,
            year: 2024,
            classroom: "B-12".into(),
            lecturer_ids: lecturers,
        })
    }

    fn guardian(user_id: Option<UserId>) -> Parent {
        Parent {
            id: Default::default(),
            user_id,
            full_name: "Abu Bakar".into(),
            email: String::new(),
            phone_number: "012-1111".into(),
            address: String::new(),
            occupation: String::new(),
            roles: BTreeSet::from([GuardianRole::Father]),
        }
    }

    fn enrolled(
        tx: &WriteTx,
        student: StudentId,
        group: ClassGroupId,
    ) -> Result<Enrollment, SisError> {
        match enroll(tx, student, group, day(1))? {
            EnrollOutcome::Enrolled(e) | EnrollOutcome::AlreadyEnrolled(e) => Ok(e),
        }
    }

    #[test]
    fn test_delete_student_cascades() {
        let dir = tempdir().expect("tempdir");
        let store = open_store(&dir);
        let group = store.write(|tx| seed_group(tx, BTreeSet::new())).expect("group");
        let new = NewUser::new("amir@x.com", "IC-10", "Amir Hamzah", Role::Student, now());
        let user = store.write(|tx| create_user(tx, new)).expect("create");
        let student = student_profile(&store.read().expect("read"), user.id).expect("profile");

        let enrollment = store
            .write(|tx| {
                let parent = tx.insert(guardian(None))?;
                let mut profile = tx.fetch::<StudentProfile>(student.id)?;
                profile.parent_ids.insert(parent.id);
                tx.put(&profile)?;
                tx.insert(Achievement {
                    id: Default::default(),
                    student_id: student.id,
                    title: "Chess".into(),
                    description: String::new(),
                    date_awarded: day(2),
                })?;
                tx.insert(DisciplinaryAction {
                    id: Default::default(),
                    student_id: student.id,
                    action: "Warning".into(),
                    description: String::new(),
                    date: day(3),
                    reported_by: None,
                })?;
                tx.insert(Notification {
                    id: Default::default(),
                    recipient_id: user.id,
                    sender_id: None,
                    message: "Welcome".into(),
                    created_at: now(),
                    is_read: false,
                })?;
                enrolled(tx, student.id, group.id)
            })
            .expect("seed");
        let morning = mark(
            &store,
            enrollment.id,
            day(6),
            AttendanceSession::Morning,
            AttendanceStatus::Present,
            "",
        )
        .expect("mark");
        mark(
            &store,
            enrollment.id,
            day(6),
            AttendanceSession::Evening,
            AttendanceStatus::Absent,
            "",
        )
        .expect("mark");
        let plan = store
            .write(|tx| {
                tx.insert(FeePlan {
                    id: Default::default(),
                    student_id: student.id,
                    description: "Tuition".into(),
                    total_amount: Money::from_cents(30_000),
                    months: 3,
                    start_date: day(1),
                    status: FeePlanStatus::Active,
                    created_at: now(),
                })
            })
            .expect("plan");
        assert_eq!(ensure_installments(&store, plan.id).expect("installments"), 3);

        delete_user(&store, user.id).expect("delete");

        let read = store.read().expect("read");
        assert_eq!(read.count::<User>().expect("count"), 0);
        assert_eq!(read.count::<StudentProfile>().expect("count"), 0);
        assert_eq!(read.count::<Enrollment>().expect("count"), 0);
        assert_eq!(read.count::<Attendance>().expect("count"), 0);
        assert_eq!(read.attendance_key_count().expect("keys"), 0);
        assert_eq!(read.count::<Achievement>().expect("count"), 0);
        assert_eq!(read.count::<DisciplinaryAction>().expect("count"), 0);
        assert_eq!(read.count::<FeePlan>().expect("count"), 0);
        assert_eq!(read.count::<Installment>().expect("count"), 0);
        assert_eq!(read.count::<Notification>().expect("count"), 0);
        // The guardian and the class group are shared, so they stay
        assert_eq!(read.count::<Parent>().expect("count"), 1);
        assert_eq!(read.count::<ClassGroup>().expect("count"), 1);
        drop(read);

        // Same person back in the same class group
        let again = NewUser::new("amir@x.com", "IC-10", "Amir Hamzah", Role::Student, now());
        let user = store.write(|tx| create_user(tx, again)).expect("recreate");
        let student = student_profile(&store.read().expect("read"), user.id).expect("profile");
        let outcome = store
            .write(|tx| enroll(tx, student.id, group.id, day(7)))
            .expect("enroll");
        let EnrollOutcome::Enrolled(fresh) = outcome else {
            unreachable!("expected a new enrollment, got {outcome:?}");
        };
        mark(
            &store,
            fresh.id,
            day(6),
            AttendanceSession::Morning,
            AttendanceStatus::Late,
            "",
        )
        .expect("mark");

        // An enrollment restored under its old id must not pick up the old key
        store.write(|tx| tx.put(&enrollment)).expect("restore");
        let remarked = mark(
            &store,
            enrollment.id,
            day(6),
            AttendanceSession::Morning,
            AttendanceStatus::Present,
            "",
        )
        .expect("remark");
        assert_ne!(remarked.id, morning.id);

        let read = store.read().expect("read");
        assert_eq!(read.count::<Attendance>().expect("count"), 2);
        assert_eq!(read.attendance_key_count().expect("keys"), 2);
    }

    #[test]
    fn test_delete_lecturer_leaves_class_groups() {
        let dir = tempdir().expect("tempdir");
        let store = open_store(&dir);
        let gone = NewUser::new("lee@x.com", "IC-20", "Lee Wei", Role::Lecturer, now());
        let gone = store.write(|tx| create_user(tx, gone)).expect("create");
        let stays = NewUser::new("tan@x.com", "IC-21", "Tan Mei", Role::Lecturer, now());
        let stays = store.write(|tx| create_user(tx, stays)).expect("create");

        let read = store.read().expect("read");
        let gone_profile = lecturer_profile(&read, gone.id).expect("profile");
        let stays_profile = lecturer_profile(&read, stays.id).expect("profile");
        drop(read);

        let (first, second, parent) = store
            .write(|tx| {
                let both = BTreeSet::from([gone_profile.id, stays_profile.id]);
                let first = seed_group(tx, both)?;
                let second = seed_group(tx, BTreeSet::from([gone_profile.id]))?;
                // The lecturer is also a guardian with a login
                let parent = tx.insert(guardian(Some(gone.id)))?;
                Ok((first, second, parent))
            })
            .expect("seed");

        delete_user(&store, gone.id).expect("delete");

        let read = store.read().expect("read");
        assert_eq!(read.count::<LecturerProfile>().expect("count"), 1);
        let first = read.fetch::<ClassGroup>(first.id).expect("first");
        assert_eq!(first.lecturer_ids, BTreeSet::from([stays_profile.id]));
        let second = read.fetch::<ClassGroup>(second.id).expect("second");
        assert!(second.lecturer_ids.is_empty());
        let parent = read.fetch::<Parent>(parent.id).expect("guardian kept");
        assert_eq!(parent.user_id, None);
        assert!(read.get::<User>(stays.id).expect("get").is_some());
    }
}
