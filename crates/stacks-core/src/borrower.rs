//! Borrower: the engine's view of a patron.
//!
//! Identity and credentials belong to the external user-management layer.
//! The engine only records the role that determines a patron's borrowing cap.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Student,
  Staff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Borrower {
  pub borrower_id:   Uuid,
  pub role:          Role,
  pub registered_at: DateTime<Utc>,
}

/// Storage contract for the borrower registry.
pub trait BorrowerRegistry {
  fn load_borrower(&mut self, borrower_id: Uuid) -> Result<Option<Borrower>>;

  /// Insert, or update the role of, a borrower.
  fn save_borrower(&mut self, borrower: &Borrower) -> Result<()>;

  fn list_borrowers(&mut self) -> Result<Vec<Borrower>>;

  fn borrower(&mut self, borrower_id: Uuid) -> Result<Borrower> {
    self
      .load_borrower(borrower_id)?
      .ok_or(Error::BorrowerNotFound(borrower_id))
  }

  /// Register a borrower, keeping the original registration time when the
  /// borrower is already known.
  fn register(
    &mut self,
    borrower_id: Uuid,
    role: Role,
    now: DateTime<Utc>,
  ) -> Result<Borrower> {
    let borrower = match self.load_borrower(borrower_id)? {
      Some(existing) => Borrower { role, ..existing },
      None => Borrower { borrower_id, role, registered_at: now },
    };
    self.save_borrower(&borrower)?;
    Ok(borrower)
  }
}
