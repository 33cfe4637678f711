//! # sis-core
//!
//! The record store and business rules of the Student Information System.
//!
//! This crate owns every piece of academic state (accounts, class groups,
//! enrollments, attendance, guardians, fee plans, notifications) and every
//! rule that reads or changes it. The portal binary renders pages on top of
//! it and never touches the database directly.
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: no async, no network dependencies
//! - Integer arithmetic only: money in cents, percentages in hundredths
//! - Each operation runs inside one redb transaction
//! - Access control lives here, next to the data it guards

// =============================================================================
// MODULES
// =============================================================================

pub mod academics;
pub mod accounts;
pub mod attendance;
pub mod dashboard;
pub mod export;
pub mod fees;
pub mod notifications;
pub mod primitives;
pub mod records;
pub mod storage;
pub mod types;
pub mod validation;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Achievement, AchievementId, Attendance, AttendanceId, AttendanceSession, AttendanceStatus,
    ClassGroup, ClassGroupId, Course, CourseId, Department, DepartmentId, DisciplinaryAction,
    DisciplinaryId, Enrollment, EnrollmentId, FeePlan, FeePlanId, FeePlanStatus, GuardianRole,
    Installment, InstallmentId, LecturerId, LecturerProfile, Money, Notification, NotificationId,
    Parent, ParentId, Percentage, Role, SisError, StudentId, StudentProfile, Subject, SubjectId,
    User, UserId,
};

// =============================================================================
// RE-EXPORTS: Storage & Validation
// =============================================================================

pub use storage::{ReadTx, Reader, Record, Store, WriteTx};
pub use validation::{FormErrors, Validator};
