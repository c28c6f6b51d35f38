//! The storage seam: the unit-of-work contract and the `CirculationStore`
//! trait.
//!
//! A backend hands the coordinator a [`CirculationTx`]: one object
//! implementing every component contract over a single transaction. Work
//! passed to [`CirculationStore::transact`] either commits as a whole or, if
//! it returns an error, leaves no trace.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Error, Result,
  borrower::BorrowerRegistry,
  copy::CopyInventory,
  fine::FineBook,
  holiday::{Holiday, HolidayCalendar, NewHoliday},
  loan::LoanLedger,
  reservation::ReservationQueue,
  settings::{Settings, SettingsVersion},
};

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Storage contract for the Settings Store and the Holiday Calendar.
pub trait PolicyStore {
  fn current_settings(&mut self) -> Result<Option<SettingsVersion>>;

  fn insert_settings(
    &mut self,
    settings: &Settings,
    recorded_at: DateTime<Utc>,
  ) -> Result<SettingsVersion>;

  fn settings_history(&mut self) -> Result<Vec<SettingsVersion>>;

  /// All holidays ordered by date.
  fn list_holidays(&mut self) -> Result<Vec<Holiday>>;

  fn insert_holiday(&mut self, holiday: &Holiday) -> Result<()>;

  /// Returns `false` if no such holiday existed.
  fn delete_holiday_row(&mut self, holiday_id: Uuid) -> Result<bool>;

  /// The policy in force; defaults until an administrator saves one.
  fn settings(&mut self) -> Result<Settings> {
    Ok(
      self
        .current_settings()?
        .map(|v| v.settings)
        .unwrap_or_default(),
    )
  }

  fn update_settings(
    &mut self,
    settings: &Settings,
    now: DateTime<Utc>,
  ) -> Result<SettingsVersion> {
    settings.validate()?;
    self.insert_settings(settings, now)
  }

  fn calendar(&mut self) -> Result<HolidayCalendar> {
    Ok(HolidayCalendar::from_holidays(&self.list_holidays()?))
  }

  /// Add a holiday unless the day it excludes is already excluded.
  fn add_holiday(&mut self, new: NewHoliday) -> Result<Holiday> {
    new.validate()?;
    if self.calendar()?.overlaps(new.date, new.recurring) {
      return Err(Error::DuplicateHoliday(new.date));
    }
    let holiday = new.into_holiday();
    self.insert_holiday(&holiday)?;
    Ok(holiday)
  }

  fn remove_holiday(&mut self, holiday_id: Uuid) -> Result<()> {
    if self.delete_holiday_row(holiday_id)? {
      Ok(())
    } else {
      Err(Error::HolidayNotFound(holiday_id))
    }
  }
}

// ─── Unit of work ────────────────────────────────────────────────────────────

/// Every component contract over one transaction.
pub trait CirculationTx:
  CopyInventory + LoanLedger + FineBook + ReservationQueue + PolicyStore + BorrowerRegistry
{
}

impl<T> CirculationTx for T where
  T: CopyInventory
    + LoanLedger
    + FineBook
    + ReservationQueue
    + PolicyStore
    + BorrowerRegistry
    + ?Sized
{
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a transactional circulation store.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait CirculationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + Into<Error> + 'static;

  /// Run `work` inside a write transaction. The transaction commits iff
  /// `work` returns `Ok`.
  fn transact<T, F>(
    &self,
    work: F,
  ) -> impl Future<Output = Result<T, Self::Error>> + Send + '_
  where
    T: Send + 'static,
    F: FnOnce(&mut dyn CirculationTx) -> Result<T> + Send + 'static;

  /// Run `work` against a consistent read snapshot. Writes made by `work`
  /// are discarded.
  fn read<T, F>(
    &self,
    work: F,
  ) -> impl Future<Output = Result<T, Self::Error>> + Send + '_
  where
    T: Send + 'static,
    F: FnOnce(&mut dyn CirculationTx) -> Result<T> + Send + 'static;
}
