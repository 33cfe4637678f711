//! Stored records.
//!
//! Every struct here is one row of one redb table. Relations are held as
//! ids; many-to-many links are `BTreeSet`s on the owning side.

use super::{
    AchievementId, AttendanceId, AttendanceSession, AttendanceStatus, ClassGroupId, CourseId,
    DepartmentId, DisciplinaryId, EnrollmentId, FeePlanId, FeePlanStatus, GuardianRole,
    InstallmentId, LecturerId, Money, NotificationId, ParentId, Role, StudentId, SubjectId,
    UserId,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// ACCOUNTS
// =============================================================================

/// A login account. Email and identity card number are both unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub identity_card_number: String,
    pub full_name: String,
    pub short_name: String,
    pub role: Role,
    pub phone_number: String,
    pub address: String,
    pub department_id: Option<DepartmentId>,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    /// Argon2 PHC string.
    pub password_hash: String,
}

impl User {
    /// Name shown in lists and exports.
    pub fn display_name(&self) -> &str {
        if self.full_name.is_empty() {
            &self.email
        } else {
            &self.full_name
        }
    }

    /// True for administrators, including superusers of any role.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin || self.is_superuser
    }
}

// =============================================================================
// ACADEMIC STRUCTURE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
}

/// A programme of study. `code` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
    pub code: String,
    pub department_id: Option<DepartmentId>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub course_id: CourseId,
    pub name: String,
    pub code: String,
    pub description: String,
}

impl Subject {
    /// `"name (code)"`, the form used in course exports.
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.code)
    }
}

/// A cohort of one course in one academic year, taught by several lecturers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassGroup {
    pub id: ClassGroupId,
    pub name: String,
    pub department_id: Option<DepartmentId>,
    pub course_id: Option<CourseId>,
    pub year: i32,
    pub classroom: String,
    pub lecturer_ids: BTreeSet<LecturerId>,
}

// =============================================================================
// PROFILES
// =============================================================================

/// Teaching profile, one per lecturer account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LecturerProfile {
    pub id: LecturerId,
    pub user_id: UserId,
    pub department_id: Option<DepartmentId>,
    pub subject_ids: BTreeSet<SubjectId>,
    pub phone_number: String,
    pub address: String,
}

/// Student profile, one per student account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub id: StudentId,
    pub user_id: UserId,
    /// Home class group. Enrollments may add more.
    pub class_group_id: Option<ClassGroupId>,
    pub parent_ids: BTreeSet<ParentId>,
    pub registration_number: String,
    pub date_of_birth: Option<NaiveDate>,
    pub address: String,
    pub phone_number: String,
    pub latest_activity: Option<DateTime<Utc>>,
    pub emergency_name: String,
    pub emergency_relation: String,
    pub emergency_phone: String,
}

/// A parent or guardian. May be linked to several students.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parent {
    pub id: ParentId,
    /// Login account of the guardian, when they have one.
    pub user_id: Option<UserId>,
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    pub address: String,
    pub occupation: String,
    pub roles: BTreeSet<GuardianRole>,
}

impl Parent {
    /// Capitalized role labels, e.g. `["Father", "Guardian"]`.
    pub fn roles_list(&self) -> Vec<&'static str> {
        self.roles.iter().map(|r| r.label()).collect()
    }

    /// Stored codes joined with commas, e.g. `"father,guardian"`.
    pub fn roles_codes(&self) -> String {
        self.roles
            .iter()
            .map(|r| r.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

// =============================================================================
// ENROLLMENT & ATTENDANCE
// =============================================================================

/// Membership of a student in a class group. The pair is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub student_id: StudentId,
    pub class_group_id: ClassGroupId,
    pub date_enrolled: NaiveDate,
}

/// One mark. Unique per `(enrollment, date, session)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendance {
    pub id: AttendanceId,
    pub enrollment_id: EnrollmentId,
    pub date: NaiveDate,
    pub session: AttendanceSession,
    pub status: AttendanceStatus,
    pub description: String,
}

// =============================================================================
// CONDUCT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: AchievementId,
    pub student_id: StudentId,
    pub title: String,
    pub description: String,
    pub date_awarded: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisciplinaryAction {
    pub id: DisciplinaryId,
    pub student_id: StudentId,
    pub action: String,
    pub description: String,
    pub date: NaiveDate,
    pub reported_by: Option<UserId>,
}

// =============================================================================
// FEES
// =============================================================================

/// A total fee split into monthly installments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePlan {
    pub id: FeePlanId,
    pub student_id: StudentId,
    pub description: String,
    pub total_amount: Money,
    pub months: u32,
    pub start_date: NaiveDate,
    pub status: FeePlanStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    pub id: InstallmentId,
    pub plan_id: FeePlanId,
    /// 1-based position within the plan.
    pub sequence_no: u32,
    pub due_date: NaiveDate,
    pub amount: Money,
    pub is_paid: bool,
    pub paid_date: Option<NaiveDate>,
    pub note: String,
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: UserId,
    pub sender_id: Option<UserId>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}
