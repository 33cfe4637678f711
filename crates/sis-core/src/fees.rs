//! # Fee Plans
//!
//! Student fee plans and their monthly installments.
//!
//! ## Installment Split
//!
//! A plan of `total` over `months` is split into equal monthly amounts
//! rounded half-up to the cent; the last installment absorbs the rounding
//! difference so the rows always sum to `total` exactly:
//!
//! ```text
//! monthly = round_half_up(total / months)
//! last    = total - monthly × (months - 1)
//! ```
//!
//! A plan whose last installment would come out negative is rejected when
//! the plan is validated.
//!
//! ## Regeneration
//!
//! [`ensure_installments`] is idempotent: it rewrites unpaid rows from the
//! plan's current terms, never touches paid rows, and drops unpaid rows past
//! the plan's last month.

use crate::academics::matches_query;
use crate::primitives::{MAX_PLAN_MONTHS, MAX_PLAN_TOTAL_CENTS, MAX_TEXT_LENGTH, MAX_TITLE_LENGTH};
use crate::storage::{Reader, Record, Store};
use crate::types::{
    FeePlan, FeePlanId, FeePlanStatus, Installment, InstallmentId, Money, StudentId,
    StudentProfile, User,
};
use crate::validation::{INVALID_CHOICE, REQUIRED, Validator};
use crate::SisError;
use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;

pub const INVALID_AMOUNT: &str = "Enter a valid amount with at most 2 decimal places.";
pub const NEGATIVE_LAST_INSTALLMENT: &str =
    "This total cannot be split into the given number of months.";

// =============================================================================
// SPLIT
// =============================================================================

/// Split `total` into `months` installments.
///
/// Returns `None` when `months` is zero, `total` is negative, or the last
/// row would be negative.
pub fn split_installments(total: Money, months: u32) -> Option<Vec<Money>> {
    let monthly = total.divide_half_up(months)?;
    let leading = monthly.checked_times(months.checked_sub(1)?)?;
    let last = Money::from_cents(total.cents().checked_sub(leading.cents())?);
    if last.is_negative() {
        return None;
    }

    let mut rows = vec![monthly; usize::try_from(months).ok()?.saturating_sub(1)];
    rows.push(last);
    Some(rows)
}

/// The regular monthly amount of a plan.
pub fn monthly_amount(plan: &FeePlan) -> Option<Money> {
    plan.total_amount.divide_half_up(plan.months)
}

/// Due date of installment `sequence_no` (1-based), clamped to month end.
pub fn due_date(start: NaiveDate, sequence_no: u32) -> Option<NaiveDate> {
    start.checked_add_months(Months::new(sequence_no.saturating_sub(1)))
}

// =============================================================================
// PLANS
// =============================================================================

/// Raw fee plan fields. `student` is ignored when the plan is created from a
/// student's page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FeePlanForm {
    pub student: String,
    pub description: String,
    pub total_amount: String,
    pub months: String,
    pub start_date: String,
    pub status: String,
}

/// Validate a plan form. `fixed_student` replaces the `student` field.
pub fn clean_plan(
    r: &impl Reader,
    form: &FeePlanForm,
    fixed_student: Option<StudentId>,
    now: DateTime<Utc>,
) -> Result<FeePlan, SisError> {
    let mut v = Validator::new();
    let student_id = match fixed_student {
        Some(id) => Some(id),
        None => v.number::<StudentId>("student", &form.student),
    };
    if let Some(id) = student_id {
        if r.get::<StudentProfile>(id)?.is_none() {
            v.error("student", INVALID_CHOICE);
        }
    }

    let description = v.text("description", &form.description, MAX_TITLE_LENGTH);
    let total_amount = if form.total_amount.trim().is_empty() {
        v.error("total_amount", REQUIRED);
        None
    } else {
        match Money::parse(&form.total_amount) {
            Some(amount) if amount.cents() > 0 && amount.cents() <= MAX_PLAN_TOTAL_CENTS => {
                Some(amount)
            }
            Some(_) => {
                v.error("total_amount", "Ensure this value is between 0.01 and 99999999.99.");
                None
            }
            None => {
                v.error("total_amount", INVALID_AMOUNT);
                None
            }
        }
    };
    let months = v.number::<u32>("months", &form.months);
    if let Some(months) = months {
        if months == 0 || months > MAX_PLAN_MONTHS {
            v.error(
                "months",
                format!("Ensure this value is between 1 and {}.", MAX_PLAN_MONTHS),
            );
        }
    }
    let start_date = v.date("start_date", &form.start_date);
    let status = if form.status.trim().is_empty() {
        Some(FeePlanStatus::default())
    } else {
        v.choice("status", &form.status, FeePlanStatus::parse)
    };

    if let (Some(total), Some(months)) = (total_amount, months) {
        if (1..=MAX_PLAN_MONTHS).contains(&months) && split_installments(total, months).is_none()
        {
            v.error("total_amount", NEGATIVE_LAST_INSTALLMENT);
        }
    }
    v.finish()?;

    match (student_id, total_amount, months, start_date, status) {
        (Some(student_id), Some(total_amount), Some(months), Some(start_date), Some(status)) => {
            Ok(FeePlan {
                id: FeePlanId::default(),
                student_id,
                description,
                total_amount,
                months,
                start_date,
                status,
                created_at: now,
            })
        }
        _ => Err(SisError::field("__all__", "Invalid form submission.")),
    }
}

/// Create a plan. Installments are generated separately.
pub fn create_plan(
    store: &Store,
    form: &FeePlanForm,
    fixed_student: Option<StudentId>,
    now: DateTime<Utc>,
) -> Result<FeePlan, SisError> {
    store.write(|tx| {
        let plan = clean_plan(tx, form, fixed_student, now)?;
        tx.insert(plan)
    })
}

/// Create or refresh the installments of a plan.
///
/// Returns the number of rows created or rewritten.
pub fn ensure_installments(store: &Store, plan_id: FeePlanId) -> Result<usize, SisError> {
    store.write(|tx| {
        let plan = tx.fetch::<FeePlan>(plan_id)?;
        let amounts = split_installments(plan.total_amount, plan.months)
            .ok_or_else(|| SisError::field("total_amount", NEGATIVE_LAST_INSTALLMENT))?;

        let mut existing: BTreeMap<u32, Installment> = tx
            .filter::<Installment>(|i| i.plan_id == plan.id)?
            .into_iter()
            .map(|i| (i.sequence_no, i))
            .collect();

        let mut written = 0;
        for (sequence_no, amount) in (1..=plan.months).zip(amounts) {
            let due = due_date(plan.start_date, sequence_no)
                .ok_or_else(|| SisError::field("start_date", "Due date out of range."))?;
            match existing.remove(&sequence_no) {
                Some(row) if row.is_paid => {}
                Some(mut row) => {
                    row.due_date = due;
                    row.amount = amount;
                    tx.put(&row)?;
                    written += 1;
                }
                None => {
                    tx.insert(Installment {
                        id: InstallmentId::default(),
                        plan_id: plan.id,
                        sequence_no,
                        due_date: due,
                        amount,
                        is_paid: false,
                        paid_date: None,
                        note: String::new(),
                    })?;
                    written += 1;
                }
            }
        }

        // Whatever is left lies past the last month
        for row in existing.into_values().filter(|r| !r.is_paid) {
            tx.remove::<Installment>(row.id)?;
        }
        Ok(written)
    })
}

// =============================================================================
// INSTALLMENTS
// =============================================================================

/// Flip an installment between paid (today) and unpaid.
pub fn toggle_paid(
    store: &Store,
    id: InstallmentId,
    today: NaiveDate,
) -> Result<Installment, SisError> {
    store.write(|tx| {
        let mut row = tx.fetch::<Installment>(id)?;
        row.is_paid = !row.is_paid;
        row.paid_date = row.is_paid.then_some(today);
        tx.put(&row)?;
        Ok(row)
    })
}

/// Inline edit of one installment on the plan page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InstallmentForm {
    pub installment_id: String,
    /// Checkbox value; present and not `"false"`/`"off"` means paid.
    pub is_paid: String,
    pub paid_date: String,
    pub note: String,
}

impl InstallmentForm {
    fn paid(&self) -> bool {
        !matches!(
            self.is_paid.trim().to_lowercase().as_str(),
            "" | "false" | "off" | "0"
        )
    }
}

/// Apply an inline installment edit. A paid row without a date is paid today.
pub fn update_installment(
    store: &Store,
    plan_id: FeePlanId,
    form: &InstallmentForm,
    today: NaiveDate,
) -> Result<Installment, SisError> {
    store.write(|tx| {
        let mut v = Validator::new();
        let id = v.number::<InstallmentId>("installment_id", &form.installment_id);
        let paid_date = v.optional_date("paid_date", &form.paid_date);
        let note = v.text("note", &form.note, MAX_TEXT_LENGTH);
        v.finish()?;

        let Some(id) = id else {
            return Err(SisError::NotFound(Installment::NAME));
        };
        let mut row = tx.fetch::<Installment>(id)?;
        if row.plan_id != plan_id {
            return Err(SisError::NotFound(Installment::NAME));
        }

        row.is_paid = form.paid();
        row.paid_date = match (row.is_paid, paid_date) {
            (true, None) => Some(today),
            (_, date) => date,
        };
        row.note = note;
        tx.put(&row)?;
        Ok(row)
    })
}

// =============================================================================
// QUERIES
// =============================================================================

/// A plan with its student, installments and running totals.
#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub plan: FeePlan,
    pub student: User,
    /// Ordered by sequence number.
    pub installments: Vec<Installment>,
    pub monthly_amount: Money,
    pub total_due: Money,
    pub total_paid: Money,
    pub balance: Money,
}

pub fn plan_summary(r: &impl Reader, plan_id: FeePlanId) -> Result<PlanSummary, SisError> {
    let plan = r.fetch::<FeePlan>(plan_id)?;
    let profile = r.fetch::<StudentProfile>(plan.student_id)?;
    let student = r.fetch::<User>(profile.user_id)?;

    let mut installments = r.filter::<Installment>(|i| i.plan_id == plan.id)?;
    installments.sort_by_key(|i| i.sequence_no);

    let total_due: Money = installments.iter().map(|i| i.amount).sum();
    let total_paid: Money = installments
        .iter()
        .filter(|i| i.is_paid)
        .map(|i| i.amount)
        .sum();

    Ok(PlanSummary {
        monthly_amount: monthly_amount(&plan).unwrap_or_default(),
        plan,
        student,
        installments,
        total_due,
        total_paid,
        balance: total_due - total_paid,
    })
}

/// Plan list filters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlanFilter {
    pub q: String,
    pub status: String,
}

/// Filtered plans with header aggregates.
#[derive(Debug, Clone, Default)]
pub struct PlanList {
    /// Newest first.
    pub plans: Vec<(FeePlan, User)>,
    pub count: usize,
    pub total: Money,
}

pub fn list_plans(r: &impl Reader, filter: &PlanFilter) -> Result<PlanList, SisError> {
    let status = FeePlanStatus::parse(&filter.status);
    let mut plans = Vec::new();
    for plan in r.all::<FeePlan>()? {
        if status.is_some_and(|s| s != plan.status) {
            continue;
        }
        let Some(profile) = r.get::<StudentProfile>(plan.student_id)? else {
            continue;
        };
        let Some(user) = r.get::<User>(profile.user_id)? else {
            continue;
        };
        if !matches_query(&filter.q, &[&user.full_name, &user.email, &plan.description]) {
            continue;
        }
        plans.push((plan, user));
    }
    plans.sort_by(|a, b| {
        b.0.created_at
            .cmp(&a.0.created_at)
            .then_with(|| b.0.id.cmp(&a.0.id))
    });

    Ok(PlanList {
        count: plans.len(),
        total: plans.iter().map(|(p, _)| p.total_amount).sum(),
        plans,
    })
}

/// Fee plans of one student, newest first.
pub fn plans_of_student(r: &impl Reader, student: StudentId) -> Result<Vec<FeePlan>, SisError> {
    let mut plans = r.filter::<FeePlan>(|p| p.student_id == student)?;
    plans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(plans)
}

// =============================================================================
// TESTS
// =============================================================================
