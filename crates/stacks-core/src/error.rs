//! Error types for `stacks-core`.
//!
//! Every circulation failure is a typed variant. [`Error::kind`] groups the
//! variants into the coarse taxonomy callers map onto user-facing responses.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  // ── Not found ─────────────────────────────────────────────────────────

  #[error("copy not found: {0}")]
  CopyNotFound(Uuid),

  #[error("loan not found: {0}")]
  LoanNotFound(Uuid),

  #[error("fine not found: {0}")]
  FineNotFound(Uuid),

  #[error("reservation not found: {0}")]
  ReservationNotFound(Uuid),

  #[error("holiday not found: {0}")]
  HolidayNotFound(Uuid),

  #[error("borrower not found: {0}")]
  BorrowerNotFound(Uuid),

  // ── Conflict ──────────────────────────────────────────────────────────

  #[error("copy {0} is already held")]
  AlreadyHeld(Uuid),

  #[error("copy {copy_id} already has an open loan ({loan_id})")]
  Conflict { copy_id: Uuid, loan_id: Uuid },

  #[error("no copy of title {title_id} is available ({waiting} reservation(s) waiting)")]
  NoCopyAvailable { title_id: Uuid, waiting: usize },

  #[error("borrower {borrower_id} already has an active reservation for title {title_id}")]
  DuplicateActive { title_id: Uuid, borrower_id: Uuid },

  #[error("copy {copy_id} of title {title_id} is available; issue it directly")]
  CopyAvailable { title_id: Uuid, copy_id: Uuid },

  #[error("title {0} has waiting reservations; renewal refused")]
  ReservationPending(Uuid),

  #[error("accession code {0:?} is already registered")]
  DuplicateAccession(String),

  #[error("{0} is already a holiday")]
  DuplicateHoliday(NaiveDate),

  // ── Limit exceeded ────────────────────────────────────────────────────

  #[error("borrower {borrower_id} already holds {limit} loan(s), the maximum for their role")]
  BorrowingLimit { borrower_id: Uuid, limit: u32 },

  #[error("loan {loan_id} has reached the renewal limit of {limit}")]
  RenewalLimitExceeded { loan_id: Uuid, limit: u32 },

  #[error("fine amount {amount} exceeds the ceiling of {ceiling}")]
  FineCeiling { amount: Decimal, ceiling: Decimal },

  // ── Invalid state ─────────────────────────────────────────────────────

  #[error("loan {0} is not outstanding")]
  NotOutstanding(Uuid),

  #[error("loan {0} is already closed")]
  AlreadyClosed(Uuid),

  #[error("fine {0} is already paid")]
  AlreadyPaid(Uuid),

  #[error("fine {0} is paid and can no longer be edited")]
  NotEditable(Uuid),

  #[error("reservation {0} has not been offered a copy")]
  NotOffered(Uuid),

  #[error("reservation {0} is no longer active")]
  ReservationInactive(Uuid),

  #[error("pickup window for reservation {0} has lapsed")]
  PickupExpired(Uuid),

  // ── Invalid input ─────────────────────────────────────────────────────

  #[error("invalid amount: {0}")]
  InvalidAmount(Decimal),

  #[error("{0} must not be empty")]
  Empty(&'static str),

  #[error("invalid settings: {0}")]
  InvalidSettings(String),

  // ── Infrastructure ────────────────────────────────────────────────────

  #[error("resource busy: {0}")]
  Busy(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("storage error: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Coarse grouping of [`Error`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  NotFound,
  Conflict,
  LimitExceeded,
  InvalidState,
  Invalid,
  Busy,
  Internal,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::CopyNotFound(_)
      | Self::LoanNotFound(_)
      | Self::FineNotFound(_)
      | Self::ReservationNotFound(_)
      | Self::HolidayNotFound(_)
      | Self::BorrowerNotFound(_) => ErrorKind::NotFound,

      Self::AlreadyHeld(_)
      | Self::Conflict { .. }
      | Self::NoCopyAvailable { .. }
      | Self::DuplicateActive { .. }
      | Self::CopyAvailable { .. }
      | Self::ReservationPending(_)
      | Self::DuplicateAccession(_)
      | Self::DuplicateHoliday(_) => ErrorKind::Conflict,

      Self::BorrowingLimit { .. }
      | Self::RenewalLimitExceeded { .. }
      | Self::FineCeiling { .. } => ErrorKind::LimitExceeded,

      Self::NotOutstanding(_)
      | Self::AlreadyClosed(_)
      | Self::AlreadyPaid(_)
      | Self::NotEditable(_)
      | Self::NotOffered(_)
      | Self::ReservationInactive(_)
      | Self::PickupExpired(_) => ErrorKind::InvalidState,

      Self::InvalidAmount(_) | Self::Empty(_) | Self::InvalidSettings(_) => {
        ErrorKind::Invalid
      }

      Self::Busy(_) => ErrorKind::Busy,

      Self::Serialization(_) | Self::Storage(_) => ErrorKind::Internal,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
