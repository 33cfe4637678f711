//! # API Request/Response Types
//!
//! Query strings of the portal pages and the JSON bodies of the few JSON
//! endpoints. Query fields stay raw strings so that an empty `?department=`
//! means "no filter" instead of a rejected request.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sis_core::academics::StudentFilter;
use sis_core::attendance::Period;
use sis_core::AttendanceSession;
use std::str::FromStr;

/// `None` for blank or unparseable values.
pub fn parse_opt<T: FromStr>(raw: &str) -> Option<T> {
    raw.trim().parse().ok()
}

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// CLASS GROUP LOOKUP
// =============================================================================

/// One entry of the class-groups-by-department lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassGroupOption {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DepartmentQuery {
    pub department: String,
}

// =============================================================================
// LIST FILTERS
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LecturerListQuery {
    pub q: String,
    pub department: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StudentListQuery {
    pub q: String,
    pub department: String,
    pub classgroup: String,
}

impl StudentListQuery {
    pub fn filter(&self) -> StudentFilter {
        StudentFilter {
            department: parse_opt(&self.department),
            classgroup: parse_opt(&self.classgroup),
            q: self.q.trim().to_string(),
        }
    }
}

/// Search box of the class group roster.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub q: String,
}

// =============================================================================
// ATTENDANCE QUERIES
// =============================================================================

/// Selection of the bulk attendance sheet.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SheetQuery {
    pub class_group: String,
    pub date: String,
    pub session: String,
}

impl SheetQuery {
    /// ISO date, today when missing or invalid.
    pub fn date_or(&self, today: NaiveDate) -> NaiveDate {
        NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").unwrap_or(today)
    }

    pub fn session(&self) -> AttendanceSession {
        AttendanceSession::parse(&self.session).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistoryQuery {
    pub course: String,
    pub date: String,
    pub period: String,
}

impl HistoryQuery {
    pub fn date_or(&self, today: NaiveDate) -> NaiveDate {
        NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").unwrap_or(today)
    }

    pub fn period(&self) -> Period {
        Period::parse(&self.period).unwrap_or_default()
    }
}

/// Course and `dd-mm-yyyy` date of an attendance download.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExportQuery {
    pub course: String,
    pub date: String,
}

/// Student attendance detail: `mode=table|calendar`, `y`, `m`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CalendarQuery {
    pub mode: String,
    pub y: String,
    pub m: String,
}

impl CalendarQuery {
    pub fn is_calendar(&self) -> bool {
        self.mode.trim().eq_ignore_ascii_case("calendar")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_filters_are_ignored() {
        let query = StudentListQuery {
            q: " ali ".into(),
            department: String::new(),
            classgroup: "x".into(),
        };
        let filter = query.filter();
        assert!(filter.department.is_none());
        assert!(filter.classgroup.is_none());
        assert_eq!(filter.q, "ali");
    }

    #[test]
    fn test_sheet_defaults() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 6).expect("date");
        let query = SheetQuery::default();
        assert_eq!(query.date_or(today), today);
        assert_eq!(query.session(), AttendanceSession::Morning);

        let query = SheetQuery {
            date: "2024-04-01".into(),
            session: "evening".into(),
            ..SheetQuery::default()
        };
        assert_eq!(query.date_or(today).to_string(), "2024-04-01");
        assert_eq!(query.session(), AttendanceSession::Evening);
    }
}
