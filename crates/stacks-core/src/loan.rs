//! Loan Ledger: one record per issue-to-return episode.
//!
//! Only the lifecycle (`issued`, `renewed`, `returned`) is persisted.
//! Overdue-ness is never stored: [`Loan::status`] derives it from the due
//! date and the date the caller is asking about.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, copy::Copy};

// ─── Status ──────────────────────────────────────────────────────────────────

/// The persisted part of a loan's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanLifecycle {
  Issued,
  Renewed,
  Returned,
}

/// The reported status of a loan, computed at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
  Issued,
  Renewed,
  Overdue,
  Returned,
}

// ─── Loan ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
  pub loan_id:       Uuid,
  pub copy_id:       Uuid,
  pub title_id:      Uuid,
  pub borrower_id:   Uuid,
  pub issue_date:    NaiveDate,
  pub due_date:      NaiveDate,
  pub return_date:   Option<NaiveDate>,
  pub renewal_count: u32,
  pub lifecycle:     LoanLifecycle,
}

impl Loan {
  pub fn is_open(&self) -> bool { self.return_date.is_none() }

  pub fn is_overdue(&self, as_of: NaiveDate) -> bool {
    self.is_open() && self.due_date < as_of
  }

  pub fn status(&self, as_of: NaiveDate) -> LoanStatus {
    if !self.is_open() {
      LoanStatus::Returned
    } else if self.is_overdue(as_of) {
      LoanStatus::Overdue
    } else if self.lifecycle == LoanLifecycle::Renewed {
      LoanStatus::Renewed
    } else {
      LoanStatus::Issued
    }
  }

  /// The date a fine for this loan is evaluated at: the return date once
  /// closed, otherwise `as_of`.
  pub fn evaluation_date(&self, as_of: NaiveDate) -> NaiveDate {
    self.return_date.unwrap_or(as_of)
  }

  fn renewed(&self, new_due_date: NaiveDate, max_renewals: u32) -> Result<Self> {
    if !self.is_open() {
      return Err(Error::NotOutstanding(self.loan_id));
    }
    if self.renewal_count >= max_renewals {
      return Err(Error::RenewalLimitExceeded {
        loan_id: self.loan_id,
        limit:   max_renewals,
      });
    }
    Ok(Self {
      due_date: new_due_date,
      renewal_count: self.renewal_count + 1,
      lifecycle: LoanLifecycle::Renewed,
      ..self.clone()
    })
  }

  fn closed(&self, return_date: NaiveDate) -> Result<Self> {
    if !self.is_open() {
      return Err(Error::AlreadyClosed(self.loan_id));
    }
    Ok(Self {
      return_date: Some(return_date),
      lifecycle: LoanLifecycle::Returned,
      ..self.clone()
    })
  }
}

/// A loan together with its derived status and the fine it would carry if
/// evaluated on `as_of`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanView {
  #[serde(flatten)]
  pub loan:      Loan,
  pub status:    LoanStatus,
  pub as_of:     NaiveDate,
  /// Currently-owed overdue fine for open loans; for returned loans, what
  /// is still pending against them.
  pub fine_owed: Decimal,
}

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`LoanLedger::find`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoanQuery {
  pub borrower_id: Option<Uuid>,
  pub title_id:    Option<Uuid>,
  pub copy_id:     Option<Uuid>,
  /// Filter on the derived status.
  pub status:      Option<LoanStatus>,
  pub limit:       Option<usize>,
  pub offset:      Option<usize>,
}

// ─── Contract ────────────────────────────────────────────────────────────────

/// Storage contract for the loan ledger.
pub trait LoanLedger {
  fn load_loan(&mut self, loan_id: Uuid) -> Result<Option<Loan>>;

  fn open_loan_for_copy(&mut self, copy_id: Uuid) -> Result<Option<Loan>>;

  fn insert_loan(&mut self, loan: &Loan) -> Result<()>;

  fn update_loan(&mut self, loan: &Loan) -> Result<()>;

  fn borrower_open_loans(&mut self, borrower_id: Uuid) -> Result<Vec<Loan>>;

  /// Loans matching the identity filters of `query` (borrower, title, copy),
  /// newest issue first. Status filtering and paging are applied by
  /// [`LoanLedger::find`].
  fn select_loans(&mut self, query: &LoanQuery) -> Result<Vec<Loan>>;

  fn loan(&mut self, loan_id: Uuid) -> Result<Loan> {
    self.load_loan(loan_id)?.ok_or(Error::LoanNotFound(loan_id))
  }

  /// Open a loan on `copy`. Fails with [`Error::Conflict`] if the copy
  /// already has an open loan.
  fn open(
    &mut self,
    copy: &Copy,
    borrower_id: Uuid,
    issue_date: NaiveDate,
    due_date: NaiveDate,
  ) -> Result<Loan> {
    if let Some(existing) = self.open_loan_for_copy(copy.copy_id)? {
      return Err(Error::Conflict {
        copy_id: copy.copy_id,
        loan_id: existing.loan_id,
      });
    }
    let loan = Loan {
      loan_id: Uuid::new_v4(),
      copy_id: copy.copy_id,
      title_id: copy.title_id,
      borrower_id,
      issue_date,
      due_date,
      return_date: None,
      renewal_count: 0,
      lifecycle: LoanLifecycle::Issued,
    };
    self.insert_loan(&loan)?;
    Ok(loan)
  }

  fn renew(
    &mut self,
    loan_id: Uuid,
    new_due_date: NaiveDate,
    max_renewals: u32,
  ) -> Result<Loan> {
    let loan = self.loan(loan_id)?.renewed(new_due_date, max_renewals)?;
    self.update_loan(&loan)?;
    Ok(loan)
  }

  fn close(&mut self, loan_id: Uuid, return_date: NaiveDate) -> Result<Loan> {
    let loan = self.loan(loan_id)?.closed(return_date)?;
    self.update_loan(&loan)?;
    Ok(loan)
  }

  fn find(&mut self, query: &LoanQuery, as_of: NaiveDate) -> Result<Vec<Loan>> {
    let loans = self.select_loans(query)?;
    Ok(
      loans
        .into_iter()
        .filter(|l| query.status.is_none_or(|s| l.status(as_of) == s))
        .skip(query.offset.unwrap_or(0))
        .take(query.limit.unwrap_or(usize::MAX))
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  fn loan() -> Loan {
    Loan {
      loan_id:       Uuid::new_v4(),
      copy_id:       Uuid::new_v4(),
      title_id:      Uuid::new_v4(),
      borrower_id:   Uuid::new_v4(),
      issue_date:    date(2024, 1, 1),
      due_date:      date(2024, 1, 15),
      return_date:   None,
      renewal_count: 0,
      lifecycle:     LoanLifecycle::Issued,
    }
  }

  #[test]
  fn overdue_is_derived_from_as_of() {
    let l = loan();
    assert_eq!(l.status(date(2024, 1, 15)), LoanStatus::Issued);
    assert_eq!(l.status(date(2024, 1, 16)), LoanStatus::Overdue);
  }

  #[test]
  fn returned_loan_is_never_overdue() {
    let l = loan().closed(date(2024, 2, 1)).unwrap();
    assert_eq!(l.status(date(2024, 3, 1)), LoanStatus::Returned);
    assert!(!l.is_overdue(date(2024, 3, 1)));
  }

  #[test]
  fn renewal_pushes_due_date_and_counts() {
    let l = loan().renewed(date(2024, 1, 22), 2).unwrap();
    assert_eq!(l.due_date, date(2024, 1, 22));
    assert_eq!(l.renewal_count, 1);
    assert_eq!(l.status(date(2024, 1, 20)), LoanStatus::Renewed);
  }

  #[test]
  fn renewal_cap_enforced() {
    let mut l = loan();
    l.renewal_count = 2;
    let err = l.renewed(date(2024, 2, 1), 2).unwrap_err();
    assert!(matches!(err, Error::RenewalLimitExceeded { limit: 2, .. }));
  }

  #[test]
  fn renewing_closed_loan_is_not_outstanding() {
    let l = loan().closed(date(2024, 1, 10)).unwrap();
    assert!(matches!(
      l.renewed(date(2024, 2, 1), 5),
      Err(Error::NotOutstanding(_))
    ));
  }

  #[test]
  fn double_close_rejected() {
    let l = loan().closed(date(2024, 1, 10)).unwrap();
    assert!(matches!(l.closed(date(2024, 1, 11)), Err(Error::AlreadyClosed(_))));
  }
}
