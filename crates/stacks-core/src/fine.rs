//! Fine Engine: overdue fine computation and the fine book.
//!
//! Overdue fines are a pure function of the loan's due date, the evaluation
//! date, the holiday calendar and the policy in force. The same function
//! backs both the "currently owed" figure shown for open loans and the fine
//! recorded when a loan is returned, so the two always agree.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
  Error, Result, holiday::HolidayCalendar, loan::Loan, settings::Settings,
};

// ─── Computation ─────────────────────────────────────────────────────────────

/// Count the chargeable days between `due_date` (exclusive) and
/// `evaluation_date` (inclusive).
///
/// Holidays are skipped, then the first `grace_days` of the remaining
/// (non-holiday) days are waived.
pub fn chargeable_days(
  due_date: NaiveDate,
  evaluation_date: NaiveDate,
  calendar: &HolidayCalendar,
  grace_days: u32,
) -> u32 {
  if evaluation_date <= due_date {
    return 0;
  }
  let overdue = due_date
    .iter_days()
    .skip(1)
    .take_while(|d| *d <= evaluation_date)
    .filter(|d| !calendar.is_holiday(*d))
    .count();
  u32::try_from(overdue)
    .unwrap_or(u32::MAX)
    .saturating_sub(grace_days)
}

/// `days * rate`, rounded half away from zero to exactly two places and
/// clamped at zero. Never fails: a product that does not fit is treated as
/// zero.
pub fn fine_amount(days: u32, daily_rate: Decimal) -> Decimal {
  Decimal::from(days)
    .checked_mul(daily_rate)
    .map(|a| {
      let mut a = a.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
      a.rescale(2);
      a
    })
    .filter(|a| a.is_sign_positive())
    .unwrap_or(Decimal::ZERO)
}

/// The inputs and outcome of one overdue-fine evaluation.
///
/// Stored with automatically created fines so the amount can be reproduced
/// later even if policy or holidays change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
  pub due_date:        NaiveDate,
  pub evaluated_on:    NaiveDate,
  pub chargeable_days: u32,
  pub daily_rate:      Decimal,
  pub grace_days:      u32,
}

impl Assessment {
  pub fn amount(&self) -> Decimal {
    fine_amount(self.chargeable_days, self.daily_rate)
  }
}

/// Evaluate `loan` as of `as_of` (or its return date, once returned).
pub fn assess(
  loan: &Loan,
  as_of: NaiveDate,
  settings: &Settings,
  calendar: &HolidayCalendar,
) -> Assessment {
  let evaluated_on = loan.evaluation_date(as_of);
  Assessment {
    due_date: loan.due_date,
    evaluated_on,
    chargeable_days: chargeable_days(
      loan.due_date,
      evaluated_on,
      calendar,
      settings.overdue_grace_period,
    ),
    daily_rate: settings.daily_fine_rate,
    grace_days: settings.overdue_grace_period,
  }
}

pub fn compute_overdue_fine(
  loan: &Loan,
  as_of: NaiveDate,
  settings: &Settings,
  calendar: &HolidayCalendar,
) -> Decimal {
  assess(loan, as_of, settings, calendar).amount()
}

/// Deterministic receipt code for a payment: the first twelve hex digits of
/// SHA-256 over the fine id and payment date, upper-cased.
pub fn receipt_code(fine_id: Uuid, paid_on: NaiveDate) -> String {
  let mut hasher = Sha256::new();
  hasher.update(fine_id.as_bytes());
  hasher.update(paid_on.to_string().as_bytes());
  let digest = hex::encode(hasher.finalize());
  format!("R-{}", digest[..12].to_ascii_uppercase())
}

// ─── Fine ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FineStatus {
  Pending,
  Paid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fine {
  pub fine_id:     Uuid,
  pub borrower_id: Uuid,
  /// `None` for manual fines.
  pub loan_id:     Option<Uuid>,
  pub amount:      Decimal,
  pub reason:      String,
  pub status:      FineStatus,
  pub created_on:  NaiveDate,
  pub paid_on:     Option<NaiveDate>,
  pub receipt:     Option<String>,
  /// Present on fines created automatically at return.
  pub assessment:  Option<Assessment>,
}

impl Fine {
  pub fn is_manual(&self) -> bool { self.loan_id.is_none() }
}

/// Parameters for [`FineBook::select_fines`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FineQuery {
  pub status:      Option<FineStatus>,
  pub borrower_id: Option<Uuid>,
  pub loan_id:     Option<Uuid>,
}

fn checked_reason(reason: &str) -> Result<String> {
  let reason = reason.trim();
  if reason.is_empty() {
    return Err(Error::Empty("reason"));
  }
  Ok(reason.to_owned())
}

fn checked_amount(amount: Decimal, ceiling: Option<Decimal>) -> Result<Decimal> {
  if amount.is_sign_negative() || amount.scale() > 2 {
    return Err(Error::InvalidAmount(amount));
  }
  if let Some(ceiling) = ceiling
    && amount > ceiling
  {
    return Err(Error::FineCeiling { amount, ceiling });
  }
  let mut amount = amount;
  amount.rescale(2);
  Ok(amount)
}

// ─── Contract ────────────────────────────────────────────────────────────────

/// Storage contract for fines.
pub trait FineBook {
  fn load_fine(&mut self, fine_id: Uuid) -> Result<Option<Fine>>;

  fn insert_fine(&mut self, fine: &Fine) -> Result<()>;

  fn update_fine(&mut self, fine: &Fine) -> Result<()>;

  /// Returns `false` if no such fine existed.
  fn delete_fine_row(&mut self, fine_id: Uuid) -> Result<bool>;

  /// Fines matching `query`, newest first.
  fn select_fines(&mut self, query: &FineQuery) -> Result<Vec<Fine>>;

  fn fine(&mut self, fine_id: Uuid) -> Result<Fine> {
    self.load_fine(fine_id)?.ok_or(Error::FineNotFound(fine_id))
  }

  /// Record the overdue fine for a returned loan. Nothing is written when
  /// the assessment comes to zero.
  fn record_overdue(
    &mut self,
    loan: &Loan,
    assessment: Assessment,
    today: NaiveDate,
  ) -> Result<Option<Fine>> {
    let amount = assessment.amount();
    if amount.is_zero() {
      return Ok(None);
    }
    let fine = Fine {
      fine_id: Uuid::new_v4(),
      borrower_id: loan.borrower_id,
      loan_id: Some(loan.loan_id),
      amount,
      reason: format!(
        "Overdue: {} chargeable day(s) after {}",
        assessment.chargeable_days, assessment.due_date
      ),
      status: FineStatus::Pending,
      created_on: today,
      paid_on: None,
      receipt: None,
      assessment: Some(assessment),
    };
    self.insert_fine(&fine)?;
    Ok(Some(fine))
  }

  /// Staff-created fine with no loan behind it; `0 < amount <= ceiling`.
  fn create_manual(
    &mut self,
    borrower_id: Uuid,
    amount: Decimal,
    reason: &str,
    ceiling: Decimal,
    today: NaiveDate,
  ) -> Result<Fine> {
    if amount.is_zero() {
      return Err(Error::InvalidAmount(amount));
    }
    let fine = Fine {
      fine_id: Uuid::new_v4(),
      borrower_id,
      loan_id: None,
      amount: checked_amount(amount, Some(ceiling))?,
      reason: checked_reason(reason)?,
      status: FineStatus::Pending,
      created_on: today,
      paid_on: None,
      receipt: None,
      assessment: None,
    };
    self.insert_fine(&fine)?;
    Ok(fine)
  }

  fn pay(&mut self, fine_id: Uuid, today: NaiveDate) -> Result<Fine> {
    let mut fine = self.fine(fine_id)?;
    if fine.status == FineStatus::Paid {
      return Err(Error::AlreadyPaid(fine_id));
    }
    fine.status = FineStatus::Paid;
    fine.paid_on = Some(today);
    fine.receipt = Some(receipt_code(fine_id, today));
    self.update_fine(&fine)?;
    Ok(fine)
  }

  /// Staff edit of a pending fine. The ceiling applies to manual fines only;
  /// automatic fines may be reduced (or waived to zero) but keep their
  /// assessment for reference.
  fn edit(
    &mut self,
    fine_id: Uuid,
    amount: Decimal,
    reason: &str,
    ceiling: Decimal,
  ) -> Result<Fine> {
    let mut fine = self.fine(fine_id)?;
    if fine.status == FineStatus::Paid {
      return Err(Error::NotEditable(fine_id));
    }
    let ceiling = fine.is_manual().then_some(ceiling);
    if fine.is_manual() && amount.is_zero() {
      return Err(Error::InvalidAmount(amount));
    }
    fine.amount = checked_amount(amount, ceiling)?;
    fine.reason = checked_reason(reason)?;
    self.update_fine(&fine)?;
    Ok(fine)
  }

  fn delete(&mut self, fine_id: Uuid) -> Result<()> {
    if self.delete_fine_row(fine_id)? {
      Ok(())
    } else {
      Err(Error::FineNotFound(fine_id))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::loan::LoanLifecycle;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  fn loan_due(due: NaiveDate) -> Loan {
    Loan {
      loan_id:       Uuid::new_v4(),
      copy_id:       Uuid::new_v4(),
      title_id:      Uuid::new_v4(),
      borrower_id:   Uuid::new_v4(),
      issue_date:    due - chrono::Days::new(14),
      due_date:      due,
      return_date:   None,
      renewal_count: 0,
      lifecycle:     LoanLifecycle::Issued,
    }
  }

  fn settings(rate: i64, grace: u32) -> Settings {
    Settings {
      daily_fine_rate: Decimal::new(rate, 0),
      overdue_grace_period: grace,
      ..Settings::default()
    }
  }

  fn new_year_calendar() -> HolidayCalendar {
    let mut cal = HolidayCalendar::new();
    cal.insert(date(2024, 1, 3), false);
    cal
  }

  #[test]
  fn holiday_is_excluded() {
    let loan = loan_due(date(2024, 1, 1));
    let fine = compute_overdue_fine(
      &loan,
      date(2024, 1, 5),
      &settings(10, 0),
      &new_year_calendar(),
    );
    assert_eq!(fine, Decimal::new(3000, 2));
  }

  #[test]
  fn grace_applies_to_non_holiday_days() {
    let loan = loan_due(date(2024, 1, 1));
    let fine = compute_overdue_fine(
      &loan,
      date(2024, 1, 5),
      &settings(10, 1),
      &new_year_calendar(),
    );
    assert_eq!(fine, Decimal::new(2000, 2));
  }

  #[test]
  fn returned_on_or_before_due_is_free() {
    let cal = HolidayCalendar::new();
    assert_eq!(chargeable_days(date(2024, 1, 10), date(2024, 1, 10), &cal, 0), 0);
    assert_eq!(chargeable_days(date(2024, 1, 10), date(2024, 1, 2), &cal, 0), 0);
  }

  #[test]
  fn grace_larger_than_overdue_clamps_to_zero() {
    let cal = HolidayCalendar::new();
    assert_eq!(chargeable_days(date(2024, 1, 1), date(2024, 1, 3), &cal, 5), 0);
  }

  #[test]
  fn recurring_holidays_checked_in_every_year_spanned() {
    let mut cal = HolidayCalendar::new();
    cal.insert(date(2000, 12, 31), true);
    cal.insert(date(2000, 1, 1), true);
    // 2023-12-30 .. 2024-01-02 minus Dec 31 and Jan 1.
    assert_eq!(chargeable_days(date(2023, 12, 29), date(2024, 1, 2), &cal, 0), 2);
  }

  #[test]
  fn closed_loan_evaluated_at_return_date() {
    let mut loan = loan_due(date(2024, 1, 1));
    loan.return_date = Some(date(2024, 1, 3));
    loan.lifecycle = LoanLifecycle::Returned;
    let cal = HolidayCalendar::new();
    let a = assess(&loan, date(2024, 6, 1), &settings(10, 0), &cal);
    assert_eq!(a.evaluated_on, date(2024, 1, 3));
    assert_eq!(a.amount(), Decimal::new(2000, 2));
  }

  #[test]
  fn computation_is_deterministic() {
    let loan = loan_due(date(2024, 1, 1));
    let s = settings(7, 2);
    let cal = new_year_calendar();
    let a = compute_overdue_fine(&loan, date(2024, 2, 1), &s, &cal);
    let b = compute_overdue_fine(&loan, date(2024, 2, 1), &s, &cal);
    assert_eq!(a, b);
  }

  #[test]
  fn fractional_rate_rounds_to_cents() {
    assert_eq!(fine_amount(3, Decimal::new(3333, 3)), Decimal::new(1000, 2));
    assert_eq!(fine_amount(1, Decimal::new(5, 3)), Decimal::new(1, 2));
  }

  #[test]
  fn negative_rate_clamps_to_zero() {
    assert_eq!(fine_amount(4, Decimal::new(-10, 0)), Decimal::ZERO);
  }

  #[test]
  fn receipt_is_stable() {
    let id = Uuid::new_v4();
    let a = receipt_code(id, date(2024, 3, 1));
    assert_eq!(a, receipt_code(id, date(2024, 3, 1)));
    assert_ne!(a, receipt_code(id, date(2024, 3, 2)));
    assert!(a.starts_with("R-"));
    assert_eq!(a.len(), 14);
  }

  #[test]
  fn amount_validation() {
    assert!(checked_amount(Decimal::new(-1, 0), None).is_err());
    assert!(checked_amount(Decimal::new(1001, 3), None).is_err());
    assert!(matches!(
      checked_amount(Decimal::new(20_000, 0), Some(Decimal::new(10_000, 0))),
      Err(Error::FineCeiling { .. })
    ));
    assert_eq!(
      checked_amount(Decimal::new(10_000, 0), Some(Decimal::new(10_000, 0))).unwrap(),
      Decimal::new(10_000, 0)
    );
  }
}
