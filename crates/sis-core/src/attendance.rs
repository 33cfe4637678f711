//! # Attendance
//!
//! Taking attendance and aggregating it for lecturers and students.
//!
//! ## Marks
//!
//! A mark is keyed by `(enrollment, date, session)`; saving a mark for a key
//! that already has one replaces it. Each school day has a morning and an
//! evening session.
//!
//! ## Percentages
//!
//! Attendance percentage is `present / marked × 100`, rounded half-up to two
//! decimals, and undefined when nothing is marked. The student detail page
//! is the exception: it counts every non-absent mark as attended and rounds
//! to one decimal.

use crate::academics::class_group_students;
use crate::primitives::MAX_TEXT_LENGTH;
use crate::storage::{Reader, Store};
use crate::types::{
    Attendance, AttendanceSession, AttendanceStatus, ClassGroup, ClassGroupId, CourseId,
    Enrollment, EnrollmentId, Percentage, StudentId, StudentProfile, User,
};
use crate::validation::{INVALID_CHOICE, Validator};
use crate::SisError;
use chrono::{Datelike, Days, Month, NaiveDate};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// Statuses offered on the bulk attendance sheet.
pub const BULK_STATUSES: [AttendanceStatus; 2] =
    [AttendanceStatus::Present, AttendanceStatus::Absent];

fn clip(remarks: &str) -> String {
    remarks.trim().chars().take(MAX_TEXT_LENGTH).collect()
}

// =============================================================================
// MARKING
// =============================================================================

/// Save one mark, replacing any mark with the same key.
pub fn mark(
    store: &Store,
    enrollment: EnrollmentId,
    date: NaiveDate,
    session: AttendanceSession,
    status: AttendanceStatus,
    remarks: &str,
) -> Result<Attendance, SisError> {
    store.write(|tx| {
        tx.fetch::<Enrollment>(enrollment)?;
        tx.save_attendance(Attendance {
            id: Default::default(),
            enrollment_id: enrollment,
            date,
            session,
            status,
            description: clip(remarks),
        })
    })
}

/// Single-mark form. `enrollment` is only read where the URL doesn't name one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MarkForm {
    pub enrollment: String,
    pub date: String,
    pub session: String,
    pub status: String,
    pub remarks: String,
}

/// Validate and save a single mark. The session defaults to morning.
pub fn mark_from_form(
    store: &Store,
    enrollment: Option<EnrollmentId>,
    form: &MarkForm,
) -> Result<Attendance, SisError> {
    let mut v = Validator::new();
    let enrollment = match enrollment {
        Some(id) => Some(id),
        None => v.number::<EnrollmentId>("enrollment", &form.enrollment),
    };
    let date = v.date("date", &form.date);
    let session = if form.session.trim().is_empty() {
        Some(AttendanceSession::default())
    } else {
        v.choice("session", &form.session, AttendanceSession::parse)
    };
    let status = v.choice("status", &form.status, AttendanceStatus::parse);
    v.finish()?;

    match (enrollment, date, session, status) {
        (Some(enrollment), Some(date), Some(session), Some(status)) => {
            mark(store, enrollment, date, session, status, &form.remarks)
        }
        _ => Err(SisError::field("status", INVALID_CHOICE)),
    }
}

/// Save the bulk sheet of one class group.
///
/// `fields` holds the submitted `status_<enrollment>` and
/// `remarks_<enrollment>` inputs. Enrollments without a present/absent
/// status are skipped. Returns the number of marks saved.
pub fn mark_bulk(
    store: &Store,
    class_group: ClassGroupId,
    date: NaiveDate,
    session: AttendanceSession,
    fields: &HashMap<String, String>,
) -> Result<usize, SisError> {
    store.write(|tx| {
        let mut saved = 0;
        for enrollment in tx.filter::<Enrollment>(|e| e.class_group_id == class_group)? {
            let status = fields
                .get(&format!("status_{}", enrollment.id))
                .and_then(|raw| AttendanceStatus::parse(raw))
                .filter(|s| BULK_STATUSES.contains(s));
            let Some(status) = status else {
                continue;
            };
            let remarks = fields
                .get(&format!("remarks_{}", enrollment.id))
                .map(String::as_str)
                .unwrap_or_default();
            tx.save_attendance(Attendance {
                id: Default::default(),
                enrollment_id: enrollment.id,
                date,
                session,
                status,
                description: clip(remarks),
            })?;
            saved += 1;
        }
        Ok(saved)
    })
}

/// One line of the bulk attendance sheet.
#[derive(Debug, Clone)]
pub struct SheetRow {
    pub enrollment: Enrollment,
    pub user: User,
    pub mark: Option<Attendance>,
}

/// The bulk sheet for a class group, date and session, with existing marks.
pub fn sheet(
    r: &impl Reader,
    class_group: ClassGroupId,
    date: NaiveDate,
    session: AttendanceSession,
) -> Result<Vec<SheetRow>, SisError> {
    let mut rows = Vec::new();
    for (enrollment, user, _) in class_group_students(r, class_group, "")? {
        let mark = r.attendance_at(enrollment.id, date, session)?;
        rows.push(SheetRow {
            enrollment,
            user,
            mark,
        });
    }
    Ok(rows)
}

// =============================================================================
// CLASS SUMMARY
// =============================================================================

/// Present and total mark counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub present: u64,
    pub total: u64,
}

impl Tally {
    pub fn of(marks: &[Attendance]) -> Self {
        Self {
            present: marks
                .iter()
                .filter(|m| m.status == AttendanceStatus::Present)
                .count() as u64,
            total: marks.len() as u64,
        }
    }

    /// Present share, `None` with no marks.
    pub fn percentage(self) -> Option<Percentage> {
        Percentage::of(self.present, self.total)
    }
}

/// Attendance of one enrollment.
#[derive(Debug, Clone)]
pub struct EnrollmentAttendance {
    pub enrollment: Enrollment,
    pub user: User,
    pub profile: StudentProfile,
    pub tally: Tally,
    pub percentage: Option<Percentage>,
}

/// Per-enrollment attendance of a class group.
pub fn class_summary(
    r: &impl Reader,
    class_group: ClassGroupId,
) -> Result<Vec<EnrollmentAttendance>, SisError> {
    let mut rows = Vec::new();
    for (enrollment, user, profile) in class_group_students(r, class_group, "")? {
        let tally = Tally::of(&r.attendance_of(enrollment.id)?);
        rows.push(EnrollmentAttendance {
            enrollment,
            user,
            profile,
            tally,
            percentage: tally.percentage(),
        });
    }
    Ok(rows)
}

// =============================================================================
// HISTORY
// =============================================================================

/// Span of days covered by the attendance history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    #[default]
    Day,
    /// Monday to Sunday around the anchor date.
    Week,
    /// The anchor date's whole calendar month.
    Month,
}

impl Period {
    pub const ALL: [Self; 3] = [Self::Day, Self::Week, Self::Month];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(raw.trim()))
    }

    /// Every date of the period containing `anchor`.
    pub fn days(self, anchor: NaiveDate) -> Vec<NaiveDate> {
        match self {
            Self::Day => vec![anchor],
            Self::Week => {
                let offset = u64::from(anchor.weekday().num_days_from_monday());
                let start = anchor.checked_sub_days(Days::new(offset)).unwrap_or(anchor);
                start.iter_days().take(7).collect()
            }
            Self::Month => {
                let start = anchor.with_day(1).unwrap_or(anchor);
                start
                    .iter_days()
                    .take_while(|d| d.month() == anchor.month())
                    .collect()
            }
        }
    }
}

/// Both sessions of one day; `None` means not marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayStatus {
    pub date: NaiveDate,
    pub morning: Option<AttendanceStatus>,
    pub evening: Option<AttendanceStatus>,
}

/// One student's line in the history table.
#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub user: User,
    pub profile: StudentProfile,
    pub days: Vec<DayStatus>,
    pub present: u64,
    pub absent: u64,
    pub late: u64,
    pub excused: u64,
    pub total_marked: u64,
    pub percentage: Option<Percentage>,
}

/// The history table of a course over a period.
#[derive(Debug, Clone, Default)]
pub struct History {
    pub days: Vec<NaiveDate>,
    pub rows: Vec<HistoryRow>,
}

/// Attendance of every enrollment in any class group of `course`.
pub fn history(
    r: &impl Reader,
    course: CourseId,
    anchor: NaiveDate,
    period: Period,
) -> Result<History, SisError> {
    let days = period.days(anchor);
    let groups: Vec<ClassGroupId> = r
        .filter::<ClassGroup>(|g| g.course_id == Some(course))?
        .into_iter()
        .map(|g| g.id)
        .collect();

    let mut rows = Vec::new();
    for group in groups {
        for (enrollment, user, profile) in class_group_students(r, group, "")? {
            let marks: BTreeMap<(NaiveDate, AttendanceSession), AttendanceStatus> = r
                .attendance_of(enrollment.id)?
                .into_iter()
                .map(|m| ((m.date, m.session), m.status))
                .collect();

            let mut row = HistoryRow {
                user,
                profile,
                days: Vec::with_capacity(days.len()),
                present: 0,
                absent: 0,
                late: 0,
                excused: 0,
                total_marked: 0,
                percentage: None,
            };
            for &date in &days {
                let morning = marks.get(&(date, AttendanceSession::Morning)).copied();
                let evening = marks.get(&(date, AttendanceSession::Evening)).copied();
                for status in [morning, evening].into_iter().flatten() {
                    match status {
                        AttendanceStatus::Present => row.present += 1,
                        AttendanceStatus::Absent => row.absent += 1,
                        AttendanceStatus::Late => row.late += 1,
                        AttendanceStatus::Excused => row.excused += 1,
                    }
                    row.total_marked += 1;
                }
                row.days.push(DayStatus {
                    date,
                    morning,
                    evening,
                });
            }
            row.percentage = Percentage::of(row.present, row.total_marked);
            rows.push(row);
        }
    }
    Ok(History { days, rows })
}

// =============================================================================
// STUDENT VIEWS
// =============================================================================

/// Attendance in one class group.
#[derive(Debug, Clone)]
pub struct ClassAttendance {
    pub class_group: ClassGroup,
    pub tally: Tally,
    /// Zero when nothing is marked.
    pub percentage: Percentage,
}

/// A student's attendance across all their class groups.
#[derive(Debug, Clone, Default)]
pub struct Overview {
    pub per_class: Vec<ClassAttendance>,
    /// Present share over every mark; zero when nothing is marked.
    pub average: Percentage,
}

pub fn student_overview(r: &impl Reader, student: StudentId) -> Result<Overview, SisError> {
    let mut overview = Overview::default();
    let mut all = Tally::default();
    for enrollment in r.filter::<Enrollment>(|e| e.student_id == student)? {
        let class_group = r.fetch::<ClassGroup>(enrollment.class_group_id)?;
        let tally = Tally::of(&r.attendance_of(enrollment.id)?);
        all.present += tally.present;
        all.total += tally.total;
        overview.per_class.push(ClassAttendance {
            class_group,
            tally,
            percentage: tally.percentage().unwrap_or_default(),
        });
    }
    overview.average = all.percentage().unwrap_or_default();
    Ok(overview)
}

/// Morning and evening marks of one date.
#[derive(Debug, Clone, Default)]
pub struct DailyRow {
    pub date: NaiveDate,
    pub morning: Option<Attendance>,
    pub evening: Option<Attendance>,
}

impl DailyRow {
    fn set(&mut self, mark: Attendance) {
        match mark.session {
            AttendanceSession::Morning => self.morning = Some(mark),
            AttendanceSession::Evening => self.evening = Some(mark),
        }
    }
}

/// One day cell of the month calendar.
#[derive(Debug, Clone)]
pub struct CalendarCell {
    pub date: NaiveDate,
    pub in_month: bool,
    pub is_today: bool,
    pub morning: Option<AttendanceStatus>,
    pub evening: Option<AttendanceStatus>,
}

/// A Monday-first month grid with its neighbours.
#[derive(Debug, Clone)]
pub struct MonthCalendar {
    pub year: i32,
    pub month: u32,
    pub month_name: &'static str,
    pub weeks: Vec<Vec<CalendarCell>>,
    pub prev: (i32, u32),
    pub next: (i32, u32),
}

/// Build the calendar of `year`/`month`, showing only marks of that month.
///
/// Returns `None` for an invalid month.
pub fn month_calendar(
    year: i32,
    month: u32,
    today: NaiveDate,
    marks: &[Attendance],
) -> Option<MonthCalendar> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let month_name = Month::try_from(u8::try_from(month).ok()?).ok()?.name();

    let mut by_date: BTreeMap<NaiveDate, DailyRow> = BTreeMap::new();
    for mark in marks
        .iter()
        .filter(|m| m.date.year() == year && m.date.month() == month)
    {
        by_date
            .entry(mark.date)
            .or_insert_with(|| DailyRow {
                date: mark.date,
                ..DailyRow::default()
            })
            .set(mark.clone());
    }

    let lead = u64::from(first.weekday().num_days_from_monday());
    let start = first.checked_sub_days(Days::new(lead))?;
    let mut weeks = Vec::new();
    let mut day = start;
    loop {
        let mut week = Vec::with_capacity(7);
        for _ in 0..7 {
            let marks = by_date.get(&day);
            week.push(CalendarCell {
                date: day,
                in_month: day.month() == month && day.year() == year,
                is_today: day == today,
                morning: marks.and_then(|m| m.morning.as_ref()).map(|m| m.status),
                evening: marks.and_then(|m| m.evening.as_ref()).map(|m| m.status),
            });
            day = day.succ_opt()?;
        }
        weeks.push(week);
        if day.month() != month || day.year() != year {
            break;
        }
    }

    let prev = if month == 1 { (year - 1, 12) } else { (year, month - 1) };
    let next = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    Some(MonthCalendar {
        year,
        month,
        month_name,
        weeks,
        prev,
        next,
    })
}

/// A student's attendance in one class group.
#[derive(Debug, Clone)]
pub struct StudentAttendanceDetail {
    pub class_group: ClassGroup,
    pub total: u64,
    pub absences: u64,
    /// Every mark that is not an absence.
    pub attended: u64,
    /// One decimal place; zero when nothing is marked.
    pub percentage: Percentage,
    /// Newest date first.
    pub daily: Vec<DailyRow>,
    pub calendar: MonthCalendar,
}

/// Detail page data. A missing or invalid `year`/`month` shows today's month.
pub fn student_detail(
    r: &impl Reader,
    student: StudentId,
    class_group: ClassGroupId,
    year: Option<i32>,
    month: Option<u32>,
    today: NaiveDate,
) -> Result<StudentAttendanceDetail, SisError> {
    let group = r.fetch::<ClassGroup>(class_group)?;
    let enrollment = r
        .find::<Enrollment>(|e| e.student_id == student && e.class_group_id == class_group)?
        .ok_or(SisError::NotFound("Enrollment"))?;
    let marks = r.attendance_of(enrollment.id)?;

    let total = marks.len() as u64;
    let absences = marks
        .iter()
        .filter(|m| m.status == AttendanceStatus::Absent)
        .count() as u64;
    let attended = total - absences;

    let mut by_date: BTreeMap<NaiveDate, DailyRow> = BTreeMap::new();
    for mark in &marks {
        by_date
            .entry(mark.date)
            .or_insert_with(|| DailyRow {
                date: mark.date,
                ..DailyRow::default()
            })
            .set(mark.clone());
    }

    let year = year.unwrap_or_else(|| today.year());
    let month = month.unwrap_or_else(|| today.month());
    let calendar = match month_calendar(year, month, today, &marks) {
        Some(calendar) => calendar,
        None => month_calendar(today.year(), today.month(), today, &marks)
            .ok_or(SisError::NotFound("Month"))?,
    };

    Ok(StudentAttendanceDetail {
        class_group: group,
        total,
        absences,
        attended,
        percentage: Percentage::of_tenths(attended, total).unwrap_or_default(),
        daily: by_date.into_values().rev().collect(),
        calendar,
    })
}

// =============================================================================
// DAY STATUS
// =============================================================================

/// Status of every student of a course on one date.
///
/// Where both sessions are marked the evening mark wins; `None` means
/// neither session was marked.
pub fn course_day_status(
    r: &impl Reader,
    course: CourseId,
    date: NaiveDate,
) -> Result<Vec<(User, Option<AttendanceStatus>)>, SisError> {
    let mut rows = Vec::new();
    for group in r.filter::<ClassGroup>(|g| g.course_id == Some(course))? {
        for (enrollment, user, _) in class_group_students(r, group.id, "")? {
            let evening = r.attendance_at(enrollment.id, date, AttendanceSession::Evening)?;
            let status = match evening {
                Some(mark) => Some(mark.status),
                None => r
                    .attendance_at(enrollment.id, date, AttendanceSession::Morning)?
                    .map(|m| m.status),
            };
            rows.push((user, status));
        }
    }
    Ok(rows)
}

// =============================================================================
// TESTS
// =============================================================================
