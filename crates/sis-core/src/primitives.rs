//! # Primitives
//!
//! Fixed constants of the record store.
//!
//! These are compiled into the binary and never change at runtime.
//! Form limits mirror the column widths of the stored records so that a
//! value accepted by validation always round-trips unchanged.

/// Password assigned when an administrator leaves the password field blank.
pub const DEFAULT_PASSWORD: &str = "password123";

/// Identity card number given to a superuser created without one.
pub const DEFAULT_ADMIN_IC: &str = "IC-ADMIN";

/// Full name given to a superuser created without one.
pub const DEFAULT_ADMIN_NAME: &str = "Admin User";

/// Short name given to a superuser created without one.
pub const DEFAULT_ADMIN_SHORT_NAME: &str = "Admin";

/// Message shown when a user opens a page outside their role.
pub const FORBIDDEN_MESSAGE: &str = "You are not authorized to view this page.";

/// Placeholder written into exports and pages for missing values.
pub const PLACEHOLDER: &str = "-";

/// Status label for a session nobody has marked yet.
pub const NOT_MARKED: &str = "not marked";

/// Date format used by the attendance CSV export (`dd-mm-yyyy`).
pub const EXPORT_DATE_FORMAT: &str = "%d-%m-%Y";

// =============================================================================
// FORM LIMITS
// =============================================================================

/// Maximum length of an email address.
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Maximum length of an identity card number.
pub const MAX_IC_LENGTH: usize = 20;

/// Maximum length of a full name.
pub const MAX_FULL_NAME_LENGTH: usize = 255;

/// Maximum length of a short name.
pub const MAX_SHORT_NAME_LENGTH: usize = 64;

/// Maximum length of a phone number.
pub const MAX_PHONE_LENGTH: usize = 20;

/// Maximum length of a department name.
pub const MAX_DEPARTMENT_NAME_LENGTH: usize = 100;

/// Maximum length of a course or subject name.
pub const MAX_COURSE_NAME_LENGTH: usize = 100;

/// Maximum length of a course or subject code.
pub const MAX_CODE_LENGTH: usize = 50;

/// Maximum length of a class group name.
pub const MAX_CLASS_GROUP_NAME_LENGTH: usize = 32;

/// Maximum length of a classroom label.
pub const MAX_CLASSROOM_LENGTH: usize = 50;

/// Maximum length of short free-text titles (achievements, actions, relations).
pub const MAX_TITLE_LENGTH: usize = 200;

/// Maximum length of long free-text fields (descriptions, messages, notes).
pub const MAX_TEXT_LENGTH: usize = 4000;

/// Maximum number of monthly installments in one fee plan.
pub const MAX_PLAN_MONTHS: u32 = 120;

/// Largest amount accepted for a fee plan, in cents (99,999,999.99).
pub const MAX_PLAN_TOTAL_CENTS: i64 = 9_999_999_999;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_password_is_not_empty() {
        assert!(!DEFAULT_PASSWORD.is_empty());
    }

    #[test]
    fn test_admin_ic_fits_column() {
        assert!(DEFAULT_ADMIN_IC.len() <= MAX_IC_LENGTH);
    }
}
