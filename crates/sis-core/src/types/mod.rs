//! # Core Type Definitions
//!
//! This module contains the foundational types of the record store:
//! - Record identifiers (`UserId`, `StudentId`, ...)
//! - Choice enums stored on records (`Role`, `AttendanceStatus`, ...)
//! - Integer amounts (`Money`, `Percentage`) in `amounts`
//! - Stored records (`User`, `ClassGroup`, `FeePlan`, ...) in `models`
//! - Error types (`SisError`)
//!
//! ## Integer Guarantees
//!
//! Nothing in this module uses floating-point. Money is held in cents and
//! percentages in hundredths of a percent, so every aggregate is exact and
//! every rounding step is explicit half-up.

mod amounts;
mod models;

pub use amounts::{Money, Percentage};
pub use models::{
    Achievement, Attendance, ClassGroup, Course, Department, DisciplinaryAction, Enrollment,
    FeePlan, Installment, LecturerProfile, Notification, Parent, StudentProfile, Subject, User,
};

use crate::validation::FormErrors;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// RECORD IDENTIFIERS
// =============================================================================

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
            Default,
        )]
        pub struct $name(pub u64);

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> u64 {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map(Self)
            }
        }
    };
}

record_id!(
    /// Identifier of a login account.
    UserId
);
record_id!(
    /// Identifier of an academic department.
    DepartmentId
);
record_id!(
    /// Identifier of a course (programme).
    CourseId
);
record_id!(
    /// Identifier of a subject taught within a course.
    SubjectId
);
record_id!(
    /// Identifier of a class group (a cohort of one course in one year).
    ClassGroupId
);
record_id!(
    /// Identifier of a lecturer profile (not the lecturer's user account).
    LecturerId
);
record_id!(
    /// Identifier of a student profile (not the student's user account).
    StudentId
);
record_id!(
    /// Identifier of a parent or guardian.
    ParentId
);
record_id!(
    /// Identifier of a student's membership in a class group.
    EnrollmentId
);
record_id!(
    /// Identifier of one attendance mark.
    AttendanceId
);
record_id!(AchievementId);
record_id!(DisciplinaryId);
record_id!(FeePlanId);
record_id!(InstallmentId);
record_id!(NotificationId);

// =============================================================================
// CHOICE ENUMS
// =============================================================================

macro_rules! choice_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => ($code:literal, $label:literal)),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Every choice, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Stable code stored in forms and query strings.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $code),+
                }
            }

            /// Human readable label.
            pub const fn label(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }

            /// Parse a code, ignoring case and surrounding whitespace.
            pub fn parse(raw: &str) -> Option<Self> {
                let raw = raw.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|choice| choice.as_str().eq_ignore_ascii_case(raw))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

choice_enum!(
    /// Role of a user account. Decides which portal section a user may enter.
    Role {
        Student => ("STUDENT", "Student"),
        Lecturer => ("LECTURER", "Lecturer"),
        Admin => ("ADMIN", "Admin"),
    }
);

impl Default for Role {
    fn default() -> Self {
        Self::Student
    }
}

choice_enum!(
    /// Half of a school day that attendance is taken for.
    AttendanceSession {
        Morning => ("morning", "Morning"),
        Evening => ("evening", "Evening"),
    }
);

impl Default for AttendanceSession {
    fn default() -> Self {
        Self::Morning
    }
}

choice_enum!(
    /// Outcome of one attendance mark.
    AttendanceStatus {
        Present => ("present", "Present"),
        Absent => ("absent", "Absent"),
        Late => ("late", "Late"),
        Excused => ("excused", "Excused"),
    }
);

choice_enum!(
    /// Lifecycle of a fee plan.
    FeePlanStatus {
        Active => ("ACTIVE", "Active"),
        Completed => ("COMPLETED", "Completed"),
        Cancelled => ("CANCELLED", "Cancelled"),
    }
);

impl Default for FeePlanStatus {
    fn default() -> Self {
        Self::Active
    }
}

choice_enum!(
    /// Relationship of a guardian to the student.
    GuardianRole {
        Father => ("father", "Father"),
        Mother => ("mother", "Mother"),
        Guardian => ("guardian", "Guardian"),
        Grandfather => ("grandfather", "Grandfather"),
        Grandmother => ("grandmother", "Grandmother"),
        Other => ("other", "Other"),
    }
);

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the record store.
///
/// - No silent failures
/// - Use `Result<T, SisError>` for fallible operations
/// - A failed mutation aborts its whole write transaction
#[derive(Debug, Error)]
pub enum SisError {
    /// The requested record does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The acting user may not perform this operation.
    #[error("{0}")]
    Forbidden(String),

    /// Submitted form data failed validation.
    #[error("Invalid input: {0}")]
    Validation(FormErrors),

    /// Login failed: unknown identifier, wrong password, or inactive account.
    #[error("Invalid email/IC or password.")]
    InvalidCredentials,

    /// Password hashing failed.
    #[error("Password hashing error: {0}")]
    HashError(String),

    /// Database or file I/O failure.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Record (de)serialization failure.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl SisError {
    /// Forbidden error carrying the portal's standard message.
    pub fn not_authorized() -> Self {
        Self::Forbidden(crate::primitives::FORBIDDEN_MESSAGE.to_string())
    }

    /// Validation error for a single field.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FormErrors::new();
        errors.add(field, message);
        Self::Validation(errors)
    }
}

impl From<FormErrors> for SisError {
    fn from(errors: FormErrors) -> Self {
        Self::Validation(errors)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_ignores_case() {
        assert_eq!(Role::parse("lecturer"), Some(Role::Lecturer));
        assert_eq!(Role::parse(" ADMIN "), Some(Role::Admin));
        assert_eq!(Role::parse("teacher"), None);
    }

    #[test]
    fn test_role_defaults_to_student() {
        assert_eq!(Role::default(), Role::Student);
    }

    #[test]
    fn test_status_codes_are_lowercase() {
        for status in AttendanceStatus::ALL {
            assert_eq!(status.as_str(), status.as_str().to_lowercase());
        }
        assert_eq!(AttendanceStatus::Excused.label(), "Excused");
    }

    #[test]
    fn test_id_from_str() {
        let id: ClassGroupId = " 42 ".parse().expect("parse id");
        assert_eq!(id, ClassGroupId(42));
        assert!("abc".parse::<ClassGroupId>().is_err());
    }

    #[test]
    fn test_not_authorized_message() {
        let err = SisError::not_authorized();
        assert_eq!(err.to_string(), "You are not authorized to view this page.");
    }
}
