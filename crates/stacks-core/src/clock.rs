//! Wall-clock source for the coordinator.
//!
//! Loans and fines work in calendar dates local to the library; reservations
//! and pickup deadlines in UTC timestamps. A [`Clock`] supplies both.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset as _, Utc};

pub trait Clock: Send + Sync + 'static {
  fn now(&self) -> DateTime<Utc>;

  /// The library's current calendar date.
  fn today(&self) -> NaiveDate;
}

/// The system clock, with calendar dates taken at a fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
  offset: FixedOffset,
}

impl SystemClock {
  pub fn utc() -> Self {
    Self { offset: Utc.fix() }
  }

  /// `None` if the offset is out of range (more than a day either way).
  pub fn with_offset_minutes(minutes: i32) -> Option<Self> {
    minutes
      .checked_mul(60)
      .and_then(FixedOffset::east_opt)
      .map(|offset| Self { offset })
  }
}

impl Default for SystemClock {
  fn default() -> Self { Self::utc() }
}

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }

  fn today(&self) -> NaiveDate {
    Utc::now().with_timezone(&self.offset).date_naive()
  }
}

/// A manually driven clock for tests and simulations. Dates are UTC.
#[derive(Debug, Clone)]
pub struct ManualClock {
  now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self { now: Arc::new(Mutex::new(start)) }
  }

  /// Start at midnight UTC of `date`.
  pub fn at_date(date: NaiveDate) -> Self {
    Self::new(date.and_time(chrono::NaiveTime::MIN).and_utc())
  }

  pub fn advance(&self, by: Duration) {
    let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
    *now += by;
  }

  pub fn set(&self, to: DateTime<Utc>) {
    *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn today(&self) -> NaiveDate { self.now().date_naive() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn manual_clock_advances() {
    let clock = ManualClock::at_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    clock.advance(Duration::days(3));
    assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
  }

  #[test]
  fn offsets_out_of_range_rejected() {
    assert!(SystemClock::with_offset_minutes(330).is_some());
    assert!(SystemClock::with_offset_minutes(24 * 60).is_none());
  }
}
