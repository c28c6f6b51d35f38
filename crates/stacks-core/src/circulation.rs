//! Circulation Coordinator: the atomic transitions of the engine.
//!
//! Each function here is one unit of work over a [`CirculationTx`]. They are
//! written to run inside a single transaction: any error returned part-way
//! through leaves the store untouched once the backend rolls back. Callers
//! are responsible for holding the per-title / per-copy locks (see
//! [`crate::service::Circulation`]).
//!
//! Loan state machine: `issued → renewed* → returned`, with `overdue` derived
//! over the two open states.

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
  Error, Result,
  borrower::Borrower,
  copy::{Copy, NewCopy},
  fine::{self, Fine, FineQuery, FineStatus},
  loan::{Loan, LoanView},
  reservation::{Reservation, ReservationView, check_fulfillable},
  settings::Settings,
  store::CirculationTx,
};

/// The instant a unit of work runs at, with the library's calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Moment {
  pub now:   DateTime<Utc>,
  pub today: NaiveDate,
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Returned {
  pub loan:    Loan,
  /// The overdue fine recorded at return, if any.
  pub fine:    Option<Fine>,
  /// The reservation the freed copy was offered to, if anyone was waiting.
  pub offered: Option<Reservation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fulfilled {
  pub loan:        Loan,
  pub reservation: Reservation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cancelled {
  pub reservation: Reservation,
  /// Set when the cancelled reservation held a copy that passed on.
  pub offered:     Option<Reservation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registered {
  pub copy:    Copy,
  pub offered: Option<Reservation>,
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn add_days(date: NaiveDate, days: u32) -> NaiveDate {
  date
    .checked_add_days(Days::new(u64::from(days)))
    .unwrap_or(NaiveDate::MAX)
}

fn check_cap<T>(tx: &mut T, borrower: &Borrower, settings: &Settings) -> Result<()>
where
  T: CirculationTx + ?Sized,
{
  let limit = settings.max_loans_for(borrower.role);
  let open = tx.borrower_open_loans(borrower.borrower_id)?.len();
  if open >= limit as usize {
    return Err(Error::BorrowingLimit { borrower_id: borrower.borrower_id, limit });
  }
  Ok(())
}

/// Release `copy_id`, then immediately earmark it for the next waiting
/// reservation of the title, if any. Both steps happen in the caller's unit
/// of work, so the copy is never observably available while someone waits.
fn hand_off<T>(
  tx: &mut T,
  at: Moment,
  copy_id: Uuid,
  title_id: Uuid,
  settings: &Settings,
) -> Result<Option<Reservation>>
where
  T: CirculationTx + ?Sized,
{
  tx.release(copy_id)?;
  let offered = tx.offer_next(title_id, copy_id, at.now, settings.pickup_window())?;
  if let Some(r) = &offered {
    tx.hold_for_pickup(copy_id, r.reservation_id)?;
    info!(
      %copy_id,
      %title_id,
      reservation_id = %r.reservation_id,
      borrower_id = %r.borrower_id,
      pickup_deadline = ?r.pickup_deadline,
      "copy held for pickup"
    );
  }
  Ok(offered)
}

// ─── Transitions ─────────────────────────────────────────────────────────────

/// Issue any available copy of `title_id` to `borrower_id`.
pub fn issue<T>(tx: &mut T, at: Moment, borrower_id: Uuid, title_id: Uuid) -> Result<Loan>
where
  T: CirculationTx + ?Sized,
{
  expire_lapsed(tx, at, &[title_id])?;
  let settings = tx.settings()?;
  let borrower = tx.borrower(borrower_id)?;
  check_cap(tx, &borrower, &settings)?;

  let Some(copy_id) = tx.find_available(title_id)? else {
    let waiting = tx.active_reservations(title_id)?.len();
    return Err(Error::NoCopyAvailable { title_id, waiting });
  };

  let copy = tx.acquire(copy_id)?;
  let due = add_days(at.today, settings.loan_period_days);
  let loan = tx.open(&copy, borrower_id, at.today, due)?;

  info!(
    loan_id = %loan.loan_id,
    %copy_id,
    %title_id,
    %borrower_id,
    due_date = %loan.due_date,
    "loan issued"
  );
  Ok(loan)
}

/// Close a loan today, record any overdue fine, and pass the copy on.
pub fn return_loan<T>(tx: &mut T, at: Moment, loan_id: Uuid) -> Result<Returned>
where
  T: CirculationTx + ?Sized,
{
  let settings = tx.settings()?;
  let calendar = tx.calendar()?;

  let loan = tx.close(loan_id, at.today)?;
  let assessment = fine::assess(&loan, at.today, &settings, &calendar);
  let fine = tx.record_overdue(&loan, assessment, at.today)?;
  let offered = hand_off(tx, at, loan.copy_id, loan.title_id, &settings)?;

  info!(
    %loan_id,
    copy_id = %loan.copy_id,
    borrower_id = %loan.borrower_id,
    fine = %fine.as_ref().map_or(Decimal::ZERO, |f| f.amount),
    offered = offered.is_some(),
    "loan returned"
  );
  Ok(Returned { loan, fine, offered })
}

/// Push the due date back by the renewal period. Waiting reservations take
/// priority over renewal.
pub fn renew<T>(tx: &mut T, at: Moment, loan_id: Uuid) -> Result<Loan>
where
  T: CirculationTx + ?Sized,
{
  let settings = tx.settings()?;
  let loan = tx.loan(loan_id)?;
  if !loan.is_open() {
    return Err(Error::NotOutstanding(loan_id));
  }
  expire_lapsed(tx, at, &[loan.title_id])?;
  if !tx.active_reservations(loan.title_id)?.is_empty() {
    return Err(Error::ReservationPending(loan.title_id));
  }

  let due = add_days(loan.due_date, settings.renewal_period_days);
  let loan = tx.renew(loan_id, due, settings.max_renewal_count)?;

  info!(
    %loan_id,
    renewal_count = loan.renewal_count,
    due_date = %loan.due_date,
    today = %at.today,
    "loan renewed"
  );
  Ok(loan)
}

/// Join the queue for a title that has no copy on the shelf.
pub fn reserve<T>(
  tx: &mut T,
  at: Moment,
  borrower_id: Uuid,
  title_id: Uuid,
) -> Result<ReservationView>
where
  T: CirculationTx + ?Sized,
{
  tx.borrower(borrower_id)?;
  expire_lapsed(tx, at, &[title_id])?;
  if let Some(copy_id) = tx.find_available(title_id)? {
    return Err(Error::CopyAvailable { title_id, copy_id });
  }

  let reservation = tx.enqueue(title_id, borrower_id, at.now)?;
  let view = tx.view(reservation, at.now)?;

  info!(
    reservation_id = %view.reservation.reservation_id,
    %title_id,
    %borrower_id,
    queue_position = ?view.queue_position,
    "reservation queued"
  );
  Ok(view)
}

/// Convert an offered reservation into a loan on the earmarked copy.
pub fn fulfill<T>(tx: &mut T, at: Moment, reservation_id: Uuid) -> Result<Fulfilled>
where
  T: CirculationTx + ?Sized,
{
  let settings = tx.settings()?;
  let reservation = tx.reservation(reservation_id)?;
  check_fulfillable(&reservation, at.now)?;
  let copy_id = reservation
    .offered_copy_id
    .ok_or(Error::NotOffered(reservation_id))?;

  let borrower = tx.borrower(reservation.borrower_id)?;
  check_cap(tx, &borrower, &settings)?;

  let copy = tx.claim_held(copy_id, reservation_id)?;
  let due = add_days(at.today, settings.loan_period_days);
  let loan = tx.open(&copy, borrower.borrower_id, at.today, due)?;
  let reservation = tx.fulfill(reservation_id, loan.loan_id, at.now)?;

  info!(
    %reservation_id,
    loan_id = %loan.loan_id,
    %copy_id,
    borrower_id = %loan.borrower_id,
    "reservation fulfilled"
  );
  Ok(Fulfilled { loan, reservation })
}

/// Cancel a reservation; an earmarked copy cascades to the next in line.
pub fn cancel<T>(
  tx: &mut T,
  at: Moment,
  reservation_id: Uuid,
  reason: Option<String>,
) -> Result<Cancelled>
where
  T: CirculationTx + ?Sized,
{
  let settings = tx.settings()?;
  let before = tx.reservation(reservation_id)?;
  let reservation = tx.cancel(reservation_id, reason, at.now)?;

  let offered = match before.offered_copy_id {
    Some(copy_id) if before.is_offered() => {
      hand_off(tx, at, copy_id, before.title_id, &settings)?
    }
    _ => None,
  };

  info!(
    %reservation_id,
    title_id = %reservation.title_id,
    cascaded = offered.is_some(),
    "reservation cancelled"
  );
  Ok(Cancelled { reservation, offered })
}

/// Expire lapsed pickup offers for `titles`, cascading each freed copy.
pub fn expire_lapsed<T>(tx: &mut T, at: Moment, titles: &[Uuid]) -> Result<Vec<Cancelled>>
where
  T: CirculationTx + ?Sized,
{
  let settings = tx.settings()?;
  let mut lapsed: Vec<Reservation> = tx
    .lapsed_offers(at.now)?
    .into_iter()
    .filter(|r| titles.contains(&r.title_id))
    .collect();
  lapsed.sort_by_key(|r| r.pickup_deadline);

  let mut expired = Vec::with_capacity(lapsed.len());
  for before in lapsed {
    let reservation = tx.expire(before.reservation_id, at.now)?;
    let offered = match before.offered_copy_id {
      Some(copy_id) => hand_off(tx, at, copy_id, before.title_id, &settings)?,
      None => None,
    };
    info!(
      reservation_id = %reservation.reservation_id,
      title_id = %reservation.title_id,
      cascaded = offered.is_some(),
      "reservation expired"
    );
    expired.push(Cancelled { reservation, offered });
  }
  Ok(expired)
}

/// Add a copy to the inventory. If the title has a queue, the new copy goes
/// straight to its head.
pub fn register_copy<T>(tx: &mut T, at: Moment, new: NewCopy) -> Result<Registered>
where
  T: CirculationTx + ?Sized,
{
  expire_lapsed(tx, at, &[new.title_id])?;
  let settings = tx.settings()?;
  let copy = new.into_copy(at.now)?;
  tx.insert_copy(&copy)?;
  let offered = hand_off(tx, at, copy.copy_id, copy.title_id, &settings)?;
  let copy = tx.copy(copy.copy_id)?;

  info!(
    copy_id = %copy.copy_id,
    title_id = %copy.title_id,
    accession_code = %copy.accession_code,
    offered = offered.is_some(),
    "copy registered"
  );
  Ok(Registered { copy, offered })
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// Attach derived status and owed fine to loans.
///
/// Open loans carry the fine they would incur if returned `today`; returned
/// loans carry whatever is still pending against them.
pub fn loan_views<T>(tx: &mut T, loans: Vec<Loan>, today: NaiveDate) -> Result<Vec<LoanView>>
where
  T: CirculationTx + ?Sized,
{
  let settings = tx.settings()?;
  let calendar = tx.calendar()?;

  loans
    .into_iter()
    .map(|loan| {
      let fine_owed = if loan.is_open() {
        fine::compute_overdue_fine(&loan, today, &settings, &calendar)
      } else {
        tx.select_fines(&FineQuery {
          status:  Some(FineStatus::Pending),
          loan_id: Some(loan.loan_id),
          ..FineQuery::default()
        })?
        .iter()
        .map(|f| f.amount)
        .sum()
      };
      Ok(LoanView { status: loan.status(today), as_of: today, fine_owed, loan })
    })
    .collect()
}
