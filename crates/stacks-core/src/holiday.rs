//! Holiday Calendar: days excluded from fine-accruing day counts.
//!
//! A holiday is either a one-time date or an annually recurring month/day.
//! Recurring holidays are matched on (month, day) in every year, so a
//! recurring 29 February only applies in leap years.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
  pub holiday_id:  Uuid,
  pub name:        String,
  pub date:        NaiveDate,
  /// If `true`, the holiday repeats every year on the same month and day.
  pub recurring:   bool,
  pub description: Option<String>,
}

/// Input to [`PolicyStore::add_holiday`](crate::store::PolicyStore::add_holiday).
#[derive(Debug, Clone, Deserialize)]
pub struct NewHoliday {
  pub name:        String,
  pub date:        NaiveDate,
  #[serde(default)]
  pub recurring:   bool,
  pub description: Option<String>,
}

/// A read-only snapshot of all holidays, optimised for per-day lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidayCalendar {
  one_time:  BTreeSet<NaiveDate>,
  recurring: BTreeSet<(u32, u32)>,
}

impl HolidayCalendar {
  pub fn new() -> Self { Self::default() }

  pub fn from_holidays<'a>(
    holidays: impl IntoIterator<Item = &'a Holiday>,
  ) -> Self {
    let mut calendar = Self::new();
    for h in holidays {
      calendar.insert(h.date, h.recurring);
    }
    calendar
  }

  pub fn insert(&mut self, date: NaiveDate, recurring: bool) {
    if recurring {
      self.recurring.insert((date.month(), date.day()));
    } else {
      self.one_time.insert(date);
    }
  }

  pub fn is_holiday(&self, date: NaiveDate) -> bool {
    self.one_time.contains(&date)
      || self.recurring.contains(&(date.month(), date.day()))
  }

  /// Whether adding `(date, recurring)` would exclude a day that is already
  /// excluded.
  pub fn overlaps(&self, date: NaiveDate, recurring: bool) -> bool {
    if recurring {
      let key = (date.month(), date.day());
      self.recurring.contains(&key)
        || self.one_time.iter().any(|d| (d.month(), d.day()) == key)
    } else {
      self.is_holiday(date)
    }
  }

  pub fn is_empty(&self) -> bool {
    self.one_time.is_empty() && self.recurring.is_empty()
  }
}

impl NewHoliday {
  pub fn validate(&self) -> Result<()> {
    if self.name.trim().is_empty() {
      return Err(Error::Empty("holiday name"));
    }
    Ok(())
  }

  pub fn into_holiday(self) -> Holiday {
    Holiday {
      holiday_id:  Uuid::new_v4(),
      name:        self.name.trim().to_owned(),
      date:        self.date,
      recurring:   self.recurring,
      description: self.description,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  #[test]
  fn one_time_matches_exact_date_only() {
    let mut cal = HolidayCalendar::new();
    cal.insert(date(2024, 1, 3), false);
    assert!(cal.is_holiday(date(2024, 1, 3)));
    assert!(!cal.is_holiday(date(2025, 1, 3)));
  }

  #[test]
  fn recurring_matches_every_year() {
    let mut cal = HolidayCalendar::new();
    cal.insert(date(1999, 12, 25), true);
    assert!(cal.is_holiday(date(2024, 12, 25)));
    assert!(cal.is_holiday(date(2031, 12, 25)));
    assert!(!cal.is_holiday(date(2024, 12, 24)));
  }

  #[test]
  fn recurring_leap_day_only_in_leap_years() {
    let mut cal = HolidayCalendar::new();
    cal.insert(date(2024, 2, 29), true);
    assert!(cal.is_holiday(date(2028, 2, 29)));
    assert!(!cal.is_holiday(date(2027, 2, 28)));
    assert!(!cal.is_holiday(date(2027, 3, 1)));
  }

  #[test]
  fn overlap_detection() {
    let mut cal = HolidayCalendar::new();
    cal.insert(date(2024, 5, 1), true);
    cal.insert(date(2024, 8, 15), false);

    assert!(cal.overlaps(date(2030, 5, 1), false));
    assert!(cal.overlaps(date(2024, 5, 1), true));
    assert!(cal.overlaps(date(2010, 8, 15), true));
    assert!(!cal.overlaps(date(2025, 8, 15), false));
  }

  #[test]
  fn blank_name_rejected() {
    let h = NewHoliday {
      name:        "  ".into(),
      date:        date(2024, 1, 1),
      recurring:   false,
      description: None,
    };
    assert!(matches!(h.validate(), Err(Error::Empty(_))));
  }
}
