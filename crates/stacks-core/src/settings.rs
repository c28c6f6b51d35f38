//! Circulation policy: the Settings Store.
//!
//! Settings are versioned: every update appends a new version and only the
//! newest one is consulted. Fines already recorded keep the amount computed
//! under the version that was current when they were assessed.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, borrower::Role};

/// Tunable circulation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub max_books_per_student: u32,
  pub max_books_per_staff:   u32,
  /// Days from issue to due date.
  pub loan_period_days:      u32,
  pub daily_fine_rate:       Decimal,
  /// Non-holiday overdue days waived before fines accrue.
  pub overdue_grace_period:  u32,
  pub max_renewal_count:     u32,
  /// Days added to the due date by each renewal.
  pub renewal_period_days:   u32,
  /// How long an offered reservation waits for pickup.
  pub pickup_window_hours:   u32,
  /// Upper bound for manually created fines.
  pub manual_fine_ceiling:   Decimal,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      max_books_per_student: 3,
      max_books_per_staff:   5,
      loan_period_days:      14,
      daily_fine_rate:       Decimal::new(100, 2),
      overdue_grace_period:  0,
      max_renewal_count:     2,
      renewal_period_days:   7,
      pickup_window_hours:   48,
      manual_fine_ceiling:   Decimal::new(1_000_000, 2),
    }
  }
}

impl Settings {
  /// The borrowing cap for a role.
  pub fn max_loans_for(&self, role: Role) -> u32 {
    match role {
      Role::Student => self.max_books_per_student,
      Role::Staff => self.max_books_per_staff,
    }
  }

  pub fn pickup_window(&self) -> Duration {
    Duration::hours(i64::from(self.pickup_window_hours))
  }

  /// Reject policy that would make circulation meaningless or fines
  /// ill-defined.
  pub fn validate(&self) -> Result<()> {
    if self.loan_period_days == 0 {
      return Err(Error::InvalidSettings(
        "loan_period_days must be positive".into(),
      ));
    }
    if self.renewal_period_days == 0 {
      return Err(Error::InvalidSettings(
        "renewal_period_days must be positive".into(),
      ));
    }
    if self.pickup_window_hours == 0 {
      return Err(Error::InvalidSettings(
        "pickup_window_hours must be positive".into(),
      ));
    }
    if self.daily_fine_rate.is_sign_negative() {
      return Err(Error::InvalidSettings(
        "daily_fine_rate must not be negative".into(),
      ));
    }
    if self.daily_fine_rate.scale() > 2 {
      return Err(Error::InvalidSettings(
        "daily_fine_rate has more than two fractional digits".into(),
      ));
    }
    if self.manual_fine_ceiling <= Decimal::ZERO {
      return Err(Error::InvalidSettings(
        "manual_fine_ceiling must be positive".into(),
      ));
    }
    Ok(())
  }
}

/// One entry in the settings history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsVersion {
  pub version:     i64,
  pub recorded_at: DateTime<Utc>,
  pub settings:    Settings,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_valid() {
    Settings::default().validate().unwrap();
  }

  #[test]
  fn caps_follow_role() {
    let s = Settings::default();
    assert_eq!(s.max_loans_for(Role::Student), 3);
    assert_eq!(s.max_loans_for(Role::Staff), 5);
  }

  #[test]
  fn negative_rate_rejected() {
    let s = Settings {
      daily_fine_rate: Decimal::new(-1, 0),
      ..Settings::default()
    };
    assert!(matches!(s.validate(), Err(Error::InvalidSettings(_))));
  }

  #[test]
  fn zero_loan_period_rejected() {
    let s = Settings { loan_period_days: 0, ..Settings::default() };
    assert!(matches!(s.validate(), Err(Error::InvalidSettings(_))));
  }

  #[test]
  fn partial_json_fills_defaults() {
    let s: Settings =
      serde_json::from_str(r#"{"daily_fine_rate":"2.50","max_renewal_count":1}"#)
        .unwrap();
    assert_eq!(s.daily_fine_rate, Decimal::new(250, 2));
    assert_eq!(s.max_renewal_count, 1);
    assert_eq!(s.loan_period_days, 14);
  }
}
