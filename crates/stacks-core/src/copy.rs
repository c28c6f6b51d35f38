//! Copy Inventory: physical copies of catalog titles.
//!
//! The catalog itself lives outside the engine; a title is only known here by
//! its UUID. Copy state is mutated exclusively by the circulation
//! coordinator, inside a serialized unit of work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Where a copy currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CopyState {
  /// On the shelf; may be issued to anyone.
  Available,
  /// Referenced by exactly one open loan.
  OnLoan,
  /// Earmarked for an offered reservation; not available to general issue.
  HeldForPickup { reservation_id: Uuid },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Copy {
  pub copy_id:        Uuid,
  pub title_id:       Uuid,
  /// Library-assigned barcode / accession number; unique across copies.
  pub accession_code: String,
  #[serde(flatten)]
  pub state:          CopyState,
  pub registered_at:  DateTime<Utc>,
}

impl Copy {
  pub fn is_available(&self) -> bool {
    matches!(self.state, CopyState::Available)
  }
}

/// Input for registering a new copy.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCopy {
  pub title_id:       Uuid,
  pub accession_code: String,
}

impl NewCopy {
  pub fn into_copy(self, now: DateTime<Utc>) -> Result<Copy> {
    let accession_code = self.accession_code.trim().to_owned();
    if accession_code.is_empty() {
      return Err(Error::Empty("accession code"));
    }
    Ok(Copy {
      copy_id: Uuid::new_v4(),
      title_id: self.title_id,
      accession_code,
      state: CopyState::Available,
      registered_at: now,
    })
  }
}

// ─── Contract ────────────────────────────────────────────────────────────────

/// Storage contract for the copy inventory.
///
/// Backends implement the `load_*` / `save_*` primitives; the state
/// transitions are provided on top of them and must only be driven from
/// within a coordinator unit of work.
pub trait CopyInventory {
  fn load_copy(&mut self, copy_id: Uuid) -> Result<Option<Copy>>;

  /// Persist `copy.state`.
  fn save_copy_state(&mut self, copy: &Copy) -> Result<()>;

  /// Insert a new copy. Fails with [`Error::DuplicateAccession`] if the
  /// accession code is taken.
  fn insert_copy(&mut self, copy: &Copy) -> Result<()>;

  /// Available copies of a title, in a stable order.
  fn available_copies(&mut self, title_id: Uuid) -> Result<Vec<Uuid>>;

  fn list_copies(&mut self, title_id: Option<Uuid>) -> Result<Vec<Copy>>;

  fn copy(&mut self, copy_id: Uuid) -> Result<Copy> {
    self.load_copy(copy_id)?.ok_or(Error::CopyNotFound(copy_id))
  }

  /// Mark an available copy as on loan.
  fn acquire(&mut self, copy_id: Uuid) -> Result<Copy> {
    let mut copy = self.copy(copy_id)?;
    if !copy.is_available() {
      return Err(Error::AlreadyHeld(copy_id));
    }
    copy.state = CopyState::OnLoan;
    self.save_copy_state(&copy)?;
    Ok(copy)
  }

  /// Return a copy to general availability.
  fn release(&mut self, copy_id: Uuid) -> Result<Copy> {
    let mut copy = self.copy(copy_id)?;
    copy.state = CopyState::Available;
    self.save_copy_state(&copy)?;
    Ok(copy)
  }

  /// Earmark a copy for an offered reservation. The copy must not be on
  /// loan; an earmark for a previous reservation is replaced.
  fn hold_for_pickup(
    &mut self,
    copy_id: Uuid,
    reservation_id: Uuid,
  ) -> Result<Copy> {
    let mut copy = self.copy(copy_id)?;
    if copy.state == CopyState::OnLoan {
      return Err(Error::AlreadyHeld(copy_id));
    }
    copy.state = CopyState::HeldForPickup { reservation_id };
    self.save_copy_state(&copy)?;
    Ok(copy)
  }

  /// Convert the earmark for `reservation_id` into a loan hold.
  fn claim_held(&mut self, copy_id: Uuid, reservation_id: Uuid) -> Result<Copy> {
    let mut copy = self.copy(copy_id)?;
    if copy.state != (CopyState::HeldForPickup { reservation_id }) {
      return Err(Error::AlreadyHeld(copy_id));
    }
    copy.state = CopyState::OnLoan;
    self.save_copy_state(&copy)?;
    Ok(copy)
  }

  fn find_available(&mut self, title_id: Uuid) -> Result<Option<Uuid>> {
    Ok(self.available_copies(title_id)?.into_iter().next())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn state_serialises_flat() {
    let copy = Copy {
      copy_id:        Uuid::nil(),
      title_id:       Uuid::nil(),
      accession_code: "ACC-1".into(),
      state:          CopyState::HeldForPickup { reservation_id: Uuid::nil() },
      registered_at:  Utc::now(),
    };
    let json = serde_json::to_value(&copy).unwrap();
    assert_eq!(json["state"], "held_for_pickup");
    assert_eq!(json["reservation_id"], Uuid::nil().to_string());
  }

  #[test]
  fn blank_accession_rejected() {
    let new = NewCopy { title_id: Uuid::new_v4(), accession_code: " ".into() };
    assert!(matches!(new.into_copy(Utc::now()), Err(Error::Empty(_))));
  }
}
