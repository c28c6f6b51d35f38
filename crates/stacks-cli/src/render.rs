//! Terminal output for command results.

use anyhow::Result;
use serde::Serialize;
use stacks_core::{
  circulation::{Cancelled, Fulfilled, Returned},
  fine::Fine,
  loan::{Loan, LoanView},
  reservation::{Reservation, ReservationView},
};

pub struct Output {
  pub json: bool,
}

fn loan_line(loan: &Loan) -> String {
  format!(
    "loan {}  copy {}  borrower {}  due {}  ({:?}, {} renewal(s))",
    loan.loan_id,
    loan.copy_id,
    loan.borrower_id,
    loan.due_date,
    loan.lifecycle,
    loan.renewal_count,
  )
}

fn fine_line(fine: &Fine) -> String {
  let mut line = format!(
    "fine {}  borrower {}  {}  {:?}  {}",
    fine.fine_id, fine.borrower_id, fine.amount, fine.status, fine.reason
  );
  if let Some(receipt) = &fine.receipt {
    line.push_str(&format!("  receipt {receipt}"));
  }
  line
}

fn offer_line(offer: &Reservation) -> String {
  let until = offer
    .pickup_deadline
    .map(|d| d.to_rfc3339())
    .unwrap_or_else(|| "?".to_string());
  format!(
    "copy held for reservation {} (borrower {}) until {until}",
    offer.reservation_id, offer.borrower_id
  )
}

impl Output {
  /// Print `value` as JSON when asked to, otherwise the summary `lines`.
  fn emit<T: Serialize>(&self, value: &T, lines: impl FnOnce() -> Vec<String>) -> Result<()> {
    if self.json {
      println!("{}", serde_json::to_string_pretty(value)?);
    } else {
      for line in lines() {
        println!("{line}");
      }
    }
    Ok(())
  }

  pub fn loan(&self, loan: &Loan) -> Result<()> {
    self.emit(loan, || vec![loan_line(loan)])
  }

  pub fn returned(&self, r: &Returned) -> Result<()> {
    self.emit(r, || {
      let mut lines = vec![loan_line(&r.loan)];
      lines.extend(r.fine.as_ref().map(fine_line));
      lines.extend(r.offered.as_ref().map(offer_line));
      lines
    })
  }

  pub fn reservation(&self, view: &ReservationView) -> Result<()> {
    self.emit(view, || {
      let r = &view.reservation;
      let position = view
        .queue_position
        .map(|p| format!(", position {p}"))
        .unwrap_or_default();
      vec![format!(
        "reservation {}  title {}  borrower {}  {:?}{position}",
        r.reservation_id, r.title_id, r.borrower_id, view.status
      )]
    })
  }

  pub fn fulfilled(&self, f: &Fulfilled) -> Result<()> {
    self.emit(f, || {
      vec![
        loan_line(&f.loan),
        format!("reservation {} fulfilled", f.reservation.reservation_id),
      ]
    })
  }

  pub fn cancelled(&self, c: &Cancelled) -> Result<()> {
    self.emit(c, || {
      let mut lines = vec![format!(
        "reservation {} {:?}",
        c.reservation.reservation_id, c.reservation.status
      )];
      lines.extend(c.offered.as_ref().map(offer_line));
      lines
    })
  }

  pub fn fine(&self, fine: &Fine) -> Result<()> {
    self.emit(fine, || vec![fine_line(fine)])
  }

  pub fn loans(&self, views: &[LoanView]) -> Result<()> {
    self.emit(&views, || {
      if views.is_empty() {
        return vec!["no overdue loans".to_string()];
      }
      views
        .iter()
        .map(|v| format!("{}  owes {}", loan_line(&v.loan), v.fine_owed))
        .collect()
    })
  }

  pub fn fines(&self, fines: &[Fine]) -> Result<()> {
    self.emit(&fines, || {
      if fines.is_empty() {
        return vec!["no pending fines".to_string()];
      }
      fines.iter().map(fine_line).collect()
    })
  }

  pub fn swept(&self, expired: &[Cancelled]) -> Result<()> {
    self.emit(&expired, || {
      let mut lines = vec![format!("{} offer(s) expired", expired.len())];
      for c in expired {
        lines.push(format!("reservation {} expired", c.reservation.reservation_id));
        lines.extend(c.offered.as_ref().map(offer_line));
      }
      lines
    })
  }
}
