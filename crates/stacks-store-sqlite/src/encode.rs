//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so they sort lexically. Calendar dates are `YYYY-MM-DD`. Money is the
//! decimal's canonical string. UUIDs are hyphenated lowercase strings.

use std::str::FromStr as _;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use stacks_core::{
  borrower::{Borrower, Role},
  copy::{Copy, CopyState},
  fine::{Fine, FineStatus},
  holiday::Holiday,
  loan::{Loan, LoanLifecycle},
  reservation::{Reservation, ReservationStatus},
  settings::SettingsVersion,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_decimal(d: Decimal) -> String { d.to_string() }

pub fn decode_decimal(s: &str) -> Result<Decimal> { Ok(Decimal::from_str(s)?) }

fn unknown<T>(column: &'static str, value: &str) -> Result<T> {
  Err(Error::UnknownValue { column, value: value.to_owned() })
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn encode_role(role: Role) -> &'static str {
  match role {
    Role::Student => "student",
    Role::Staff => "staff",
  }
}

pub fn decode_role(s: &str) -> Result<Role> {
  match s {
    "student" => Ok(Role::Student),
    "staff" => Ok(Role::Staff),
    other => unknown("role", other),
  }
}

/// `(state, held_for)` column pair.
pub fn encode_copy_state(state: CopyState) -> (&'static str, Option<String>) {
  match state {
    CopyState::Available => ("available", None),
    CopyState::OnLoan => ("on_loan", None),
    CopyState::HeldForPickup { reservation_id } => {
      ("held_for_pickup", Some(encode_uuid(reservation_id)))
    }
  }
}

pub fn decode_copy_state(state: &str, held_for: Option<&str>) -> Result<CopyState> {
  match (state, held_for) {
    ("available", _) => Ok(CopyState::Available),
    ("on_loan", _) => Ok(CopyState::OnLoan),
    ("held_for_pickup", Some(id)) => {
      Ok(CopyState::HeldForPickup { reservation_id: decode_uuid(id)? })
    }
    (other, _) => unknown("copies.state", other),
  }
}

pub fn encode_lifecycle(l: LoanLifecycle) -> &'static str {
  match l {
    LoanLifecycle::Issued => "issued",
    LoanLifecycle::Renewed => "renewed",
    LoanLifecycle::Returned => "returned",
  }
}

pub fn decode_lifecycle(s: &str) -> Result<LoanLifecycle> {
  match s {
    "issued" => Ok(LoanLifecycle::Issued),
    "renewed" => Ok(LoanLifecycle::Renewed),
    "returned" => Ok(LoanLifecycle::Returned),
    other => unknown("loans.lifecycle", other),
  }
}

pub fn encode_fine_status(s: FineStatus) -> &'static str {
  match s {
    FineStatus::Pending => "pending",
    FineStatus::Paid => "paid",
  }
}

pub fn decode_fine_status(s: &str) -> Result<FineStatus> {
  match s {
    "pending" => Ok(FineStatus::Pending),
    "paid" => Ok(FineStatus::Paid),
    other => unknown("fines.status", other),
  }
}

pub fn encode_reservation_status(s: ReservationStatus) -> &'static str {
  match s {
    ReservationStatus::Active => "active",
    ReservationStatus::Fulfilled => "fulfilled",
    ReservationStatus::Cancelled => "cancelled",
    ReservationStatus::Expired => "expired",
  }
}

pub fn decode_reservation_status(s: &str) -> Result<ReservationStatus> {
  match s {
    "active" => Ok(ReservationStatus::Active),
    "fulfilled" => Ok(ReservationStatus::Fulfilled),
    "cancelled" => Ok(ReservationStatus::Cancelled),
    "expired" => Ok(ReservationStatus::Expired),
    other => unknown("reservations.status", other),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

fn opt<T>(s: Option<String>, f: impl FnOnce(&str) -> Result<T>) -> Result<Option<T>> {
  s.as_deref().map(f).transpose()
}

/// Raw strings read directly from a `borrowers` row.
pub struct RawBorrower {
  pub borrower_id:   String,
  pub role:          String,
  pub registered_at: String,
}

impl RawBorrower {
  pub const COLUMNS: &'static str = "borrower_id, role, registered_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      borrower_id:   row.get(0)?,
      role:          row.get(1)?,
      registered_at: row.get(2)?,
    })
  }

  pub fn into_borrower(self) -> Result<Borrower> {
    Ok(Borrower {
      borrower_id:   decode_uuid(&self.borrower_id)?,
      role:          decode_role(&self.role)?,
      registered_at: decode_dt(&self.registered_at)?,
    })
  }
}

pub struct RawCopy {
  pub copy_id:        String,
  pub title_id:       String,
  pub accession_code: String,
  pub state:          String,
  pub held_for:       Option<String>,
  pub registered_at:  String,
}

impl RawCopy {
  pub const COLUMNS: &'static str =
    "copy_id, title_id, accession_code, state, held_for, registered_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      copy_id:        row.get(0)?,
      title_id:       row.get(1)?,
      accession_code: row.get(2)?,
      state:          row.get(3)?,
      held_for:       row.get(4)?,
      registered_at:  row.get(5)?,
    })
  }

  pub fn into_copy(self) -> Result<Copy> {
    Ok(Copy {
      copy_id:        decode_uuid(&self.copy_id)?,
      title_id:       decode_uuid(&self.title_id)?,
      accession_code: self.accession_code,
      state:          decode_copy_state(&self.state, self.held_for.as_deref())?,
      registered_at:  decode_dt(&self.registered_at)?,
    })
  }
}

pub struct RawLoan {
  pub loan_id:       String,
  pub copy_id:       String,
  pub title_id:      String,
  pub borrower_id:   String,
  pub issue_date:    String,
  pub due_date:      String,
  pub return_date:   Option<String>,
  pub renewal_count: u32,
  pub lifecycle:     String,
}

impl RawLoan {
  pub const COLUMNS: &'static str = "loan_id, copy_id, title_id, borrower_id, issue_date, \
                             due_date, return_date, renewal_count, lifecycle";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      loan_id:       row.get(0)?,
      copy_id:       row.get(1)?,
      title_id:      row.get(2)?,
      borrower_id:   row.get(3)?,
      issue_date:    row.get(4)?,
      due_date:      row.get(5)?,
      return_date:   row.get(6)?,
      renewal_count: row.get(7)?,
      lifecycle:     row.get(8)?,
    })
  }

  pub fn into_loan(self) -> Result<Loan> {
    Ok(Loan {
      loan_id:       decode_uuid(&self.loan_id)?,
      copy_id:       decode_uuid(&self.copy_id)?,
      title_id:      decode_uuid(&self.title_id)?,
      borrower_id:   decode_uuid(&self.borrower_id)?,
      issue_date:    decode_date(&self.issue_date)?,
      due_date:      decode_date(&self.due_date)?,
      return_date:   opt(self.return_date, decode_date)?,
      renewal_count: self.renewal_count,
      lifecycle:     decode_lifecycle(&self.lifecycle)?,
    })
  }
}

pub struct RawReservation {
  pub seq:             i64,
  pub reservation_id:  String,
  pub title_id:        String,
  pub borrower_id:     String,
  pub reserved_at:     String,
  pub status:          String,
  pub pickup_deadline: Option<String>,
  pub offered_copy_id: Option<String>,
  pub cancel_reason:   Option<String>,
  pub loan_id:         Option<String>,
  pub closed_at:       Option<String>,
}

impl RawReservation {
  pub const COLUMNS: &'static str = "seq, reservation_id, title_id, borrower_id, reserved_at, \
                             status, pickup_deadline, offered_copy_id, cancel_reason, \
                             loan_id, closed_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      seq:             row.get(0)?,
      reservation_id:  row.get(1)?,
      title_id:        row.get(2)?,
      borrower_id:     row.get(3)?,
      reserved_at:     row.get(4)?,
      status:          row.get(5)?,
      pickup_deadline: row.get(6)?,
      offered_copy_id: row.get(7)?,
      cancel_reason:   row.get(8)?,
      loan_id:         row.get(9)?,
      closed_at:       row.get(10)?,
    })
  }

  pub fn into_reservation(self) -> Result<Reservation> {
    Ok(Reservation {
      reservation_id:  decode_uuid(&self.reservation_id)?,
      title_id:        decode_uuid(&self.title_id)?,
      borrower_id:     decode_uuid(&self.borrower_id)?,
      reserved_at:     decode_dt(&self.reserved_at)?,
      sequence:        self.seq,
      status:          decode_reservation_status(&self.status)?,
      pickup_deadline: opt(self.pickup_deadline, decode_dt)?,
      offered_copy_id: opt(self.offered_copy_id, decode_uuid)?,
      cancel_reason:   self.cancel_reason,
      loan_id:         opt(self.loan_id, decode_uuid)?,
      closed_at:       opt(self.closed_at, decode_dt)?,
    })
  }
}

pub struct RawFine {
  pub fine_id:     String,
  pub borrower_id: String,
  pub loan_id:     Option<String>,
  pub amount:      String,
  pub reason:      String,
  pub status:      String,
  pub created_on:  String,
  pub paid_on:     Option<String>,
  pub receipt:     Option<String>,
  pub assessment:  Option<String>,
}

impl RawFine {
  pub const COLUMNS: &'static str = "fine_id, borrower_id, loan_id, amount, reason, status, \
                             created_on, paid_on, receipt, assessment";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      fine_id:     row.get(0)?,
      borrower_id: row.get(1)?,
      loan_id:     row.get(2)?,
      amount:      row.get(3)?,
      reason:      row.get(4)?,
      status:      row.get(5)?,
      created_on:  row.get(6)?,
      paid_on:     row.get(7)?,
      receipt:     row.get(8)?,
      assessment:  row.get(9)?,
    })
  }

  pub fn into_fine(self) -> Result<Fine> {
    Ok(Fine {
      fine_id:     decode_uuid(&self.fine_id)?,
      borrower_id: decode_uuid(&self.borrower_id)?,
      loan_id:     opt(self.loan_id, decode_uuid)?,
      amount:      decode_decimal(&self.amount)?,
      reason:      self.reason,
      status:      decode_fine_status(&self.status)?,
      created_on:  decode_date(&self.created_on)?,
      paid_on:     opt(self.paid_on, decode_date)?,
      receipt:     self.receipt,
      assessment:  opt(self.assessment, |s| Ok(serde_json::from_str(s)?))?,
    })
  }
}

pub struct RawHoliday {
  pub holiday_id:  String,
  pub name:        String,
  pub date:        String,
  pub recurring:   bool,
  pub description: Option<String>,
}

impl RawHoliday {
  pub const COLUMNS: &'static str = "holiday_id, name, date, recurring, description";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      holiday_id:  row.get(0)?,
      name:        row.get(1)?,
      date:        row.get(2)?,
      recurring:   row.get(3)?,
      description: row.get(4)?,
    })
  }

  pub fn into_holiday(self) -> Result<Holiday> {
    Ok(Holiday {
      holiday_id:  decode_uuid(&self.holiday_id)?,
      name:        self.name,
      date:        decode_date(&self.date)?,
      recurring:   self.recurring,
      description: self.description,
    })
  }
}

pub struct RawSettings {
  pub version:       i64,
  pub recorded_at:   String,
  pub settings_json: String,
}

impl RawSettings {
  pub const COLUMNS: &'static str = "version, recorded_at, settings_json";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      version:       row.get(0)?,
      recorded_at:   row.get(1)?,
      settings_json: row.get(2)?,
    })
  }

  pub fn into_version(self) -> Result<SettingsVersion> {
    Ok(SettingsVersion {
      version:     self.version,
      recorded_at: decode_dt(&self.recorded_at)?,
      settings:    serde_json::from_str(&self.settings_json)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let a = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    let b = a + chrono::Duration::milliseconds(1);
    assert!(encode_dt(a) < encode_dt(b));
    assert_eq!(decode_dt(&encode_dt(b)).unwrap(), b);
  }

  #[test]
  fn held_copy_state_needs_reservation() {
    let id = Uuid::new_v4();
    let (state, held_for) = encode_copy_state(CopyState::HeldForPickup { reservation_id: id });
    assert_eq!(
      decode_copy_state(state, held_for.as_deref()).unwrap(),
      CopyState::HeldForPickup { reservation_id: id }
    );
    assert!(decode_copy_state("held_for_pickup", None).is_err());
  }

  #[test]
  fn unknown_enum_values_rejected() {
    assert!(matches!(decode_role("admin"), Err(Error::UnknownValue { .. })));
    assert!(decode_fine_status("waived").is_err());
  }
}
