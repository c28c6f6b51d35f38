//! Reservation Queue: per-title FIFO of patrons waiting for a copy.
//!
//! Queue position is never stored. It is the rank of a reservation among the
//! active reservations of its title, ordered by `reserved_at` with the
//! insertion sequence breaking ties.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
  Active,
  Fulfilled,
  Cancelled,
  Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
  pub reservation_id:  Uuid,
  pub title_id:        Uuid,
  pub borrower_id:     Uuid,
  pub reserved_at:     DateTime<Utc>,
  /// Store-assigned insertion order; breaks `reserved_at` ties.
  pub sequence:        i64,
  pub status:          ReservationStatus,
  /// Set once a copy has been offered.
  pub pickup_deadline: Option<DateTime<Utc>>,
  pub offered_copy_id: Option<Uuid>,
  pub cancel_reason:   Option<String>,
  /// The loan created on fulfilment.
  pub loan_id:         Option<Uuid>,
  pub closed_at:       Option<DateTime<Utc>>,
}

impl Reservation {
  pub fn new(title_id: Uuid, borrower_id: Uuid, now: DateTime<Utc>) -> Self {
    Self {
      reservation_id: Uuid::new_v4(),
      title_id,
      borrower_id,
      reserved_at: now,
      sequence: 0,
      status: ReservationStatus::Active,
      pickup_deadline: None,
      offered_copy_id: None,
      cancel_reason: None,
      loan_id: None,
      closed_at: None,
    }
  }

  pub fn is_active(&self) -> bool { self.status == ReservationStatus::Active }

  /// Active and holding an earmarked copy.
  pub fn is_offered(&self) -> bool {
    self.is_active() && self.pickup_deadline.is_some()
  }

  pub fn pickup_lapsed(&self, now: DateTime<Utc>) -> bool {
    self.is_active() && self.pickup_deadline.is_some_and(|d| d < now)
  }

  /// The status as of `now`: an offer whose deadline has passed reads as
  /// expired even before the sweep persists it.
  pub fn effective_status(&self, now: DateTime<Utc>) -> ReservationStatus {
    if self.pickup_lapsed(now) {
      ReservationStatus::Expired
    } else {
      self.status
    }
  }
}

/// FIFO ordering within a title.
pub fn queue_order(a: &Reservation, b: &Reservation) -> Ordering {
  a.reserved_at
    .cmp(&b.reserved_at)
    .then(a.sequence.cmp(&b.sequence))
}

/// A reservation with its derived status and queue position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationView {
  pub reservation:    Reservation,
  /// Overrides the stored status with lazily evaluated expiry.
  pub status:         ReservationStatus,
  /// 1-based rank among active reservations; `None` once inactive.
  pub queue_position: Option<u32>,
}

/// Parameters for [`ReservationQueue::select_reservations`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReservationQuery {
  pub title_id:    Option<Uuid>,
  pub borrower_id: Option<Uuid>,
  pub status:      Option<ReservationStatus>,
}

// ─── Contract ────────────────────────────────────────────────────────────────

/// Storage contract for the reservation queue.
pub trait ReservationQueue {
  fn load_reservation(&mut self, reservation_id: Uuid) -> Result<Option<Reservation>>;

  /// Insert and return the reservation with its `sequence` assigned.
  fn insert_reservation(&mut self, reservation: &Reservation) -> Result<Reservation>;

  fn update_reservation(&mut self, reservation: &Reservation) -> Result<()>;

  /// Active reservations for a title, in any order.
  fn active_reservations(&mut self, title_id: Uuid) -> Result<Vec<Reservation>>;

  fn select_reservations(&mut self, query: &ReservationQuery) -> Result<Vec<Reservation>>;

  /// Active reservations whose pickup deadline is before `now`.
  fn lapsed_offers(&mut self, now: DateTime<Utc>) -> Result<Vec<Reservation>>;

  fn reservation(&mut self, reservation_id: Uuid) -> Result<Reservation> {
    self
      .load_reservation(reservation_id)?
      .ok_or(Error::ReservationNotFound(reservation_id))
  }

  /// Active reservations of a title in queue order.
  fn queue(&mut self, title_id: Uuid) -> Result<Vec<Reservation>> {
    let mut queue = self.active_reservations(title_id)?;
    queue.sort_by(queue_order);
    Ok(queue)
  }

  /// Append a reservation. Fails with [`Error::DuplicateActive`] if the
  /// borrower already waits for this title.
  fn enqueue(
    &mut self,
    title_id: Uuid,
    borrower_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<Reservation> {
    if self
      .active_reservations(title_id)?
      .iter()
      .any(|r| r.borrower_id == borrower_id)
    {
      return Err(Error::DuplicateActive { title_id, borrower_id });
    }
    self.insert_reservation(&Reservation::new(title_id, borrower_id, now))
  }

  /// 1-based rank as of `now`, or `None` if the reservation is not active
  /// then. Lapsed offers drop out of the ranking before the sweep persists
  /// their expiry.
  fn queue_position(&mut self, reservation_id: Uuid, now: DateTime<Utc>) -> Result<Option<u32>> {
    let reservation = self.reservation(reservation_id)?;
    if reservation.effective_status(now) != ReservationStatus::Active {
      return Ok(None);
    }
    let queue = self.queue(reservation.title_id)?;
    Ok(
      queue
        .iter()
        .filter(|r| !r.pickup_lapsed(now))
        .position(|r| r.reservation_id == reservation_id)
        .and_then(|i| u32::try_from(i + 1).ok()),
    )
  }

  /// Offer `copy_id` to the earliest active reservation that has not been
  /// offered a copy yet.
  fn offer_next(
    &mut self,
    title_id: Uuid,
    copy_id: Uuid,
    now: DateTime<Utc>,
    window: Duration,
  ) -> Result<Option<Reservation>> {
    let Some(mut head) = self
      .queue(title_id)?
      .into_iter()
      .find(|r| r.pickup_deadline.is_none())
    else {
      return Ok(None);
    };
    head.pickup_deadline = Some(now + window);
    head.offered_copy_id = Some(copy_id);
    self.update_reservation(&head)?;
    Ok(Some(head))
  }

  /// Mark an offered reservation as picked up by `loan_id`.
  fn fulfill(
    &mut self,
    reservation_id: Uuid,
    loan_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<Reservation> {
    let mut reservation = self.reservation(reservation_id)?;
    check_fulfillable(&reservation, now)?;
    reservation.status = ReservationStatus::Fulfilled;
    reservation.loan_id = Some(loan_id);
    reservation.closed_at = Some(now);
    self.update_reservation(&reservation)?;
    Ok(reservation)
  }

  fn cancel(
    &mut self,
    reservation_id: Uuid,
    reason: Option<String>,
    now: DateTime<Utc>,
  ) -> Result<Reservation> {
    let mut reservation = self.reservation(reservation_id)?;
    if !reservation.is_active() {
      return Err(Error::ReservationInactive(reservation_id));
    }
    reservation.status = ReservationStatus::Cancelled;
    reservation.cancel_reason = reason;
    reservation.closed_at = Some(now);
    self.update_reservation(&reservation)?;
    Ok(reservation)
  }

  fn expire(&mut self, reservation_id: Uuid, now: DateTime<Utc>) -> Result<Reservation> {
    let mut reservation = self.reservation(reservation_id)?;
    if !reservation.is_active() {
      return Err(Error::ReservationInactive(reservation_id));
    }
    reservation.status = ReservationStatus::Expired;
    reservation.closed_at = Some(now);
    self.update_reservation(&reservation)?;
    Ok(reservation)
  }

  fn view(&mut self, reservation: Reservation, now: DateTime<Utc>) -> Result<ReservationView> {
    let queue_position = self.queue_position(reservation.reservation_id, now)?;
    Ok(ReservationView {
      status: reservation.effective_status(now),
      queue_position,
      reservation,
    })
  }
}

/// Whether `reservation` can be converted into a loan at `now`.
pub fn check_fulfillable(reservation: &Reservation, now: DateTime<Utc>) -> Result<()> {
  let id = reservation.reservation_id;
  if !reservation.is_active() {
    return Err(Error::ReservationInactive(id));
  }
  if reservation.pickup_deadline.is_none() {
    return Err(Error::NotOffered(id));
  }
  if reservation.pickup_lapsed(now) {
    return Err(Error::PickupExpired(id));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

  #[test]
  fn ties_broken_by_sequence() {
    let title = Uuid::new_v4();
    let mut a = Reservation::new(title, Uuid::new_v4(), at(100));
    let mut b = Reservation::new(title, Uuid::new_v4(), at(100));
    a.sequence = 2;
    b.sequence = 1;
    assert_eq!(queue_order(&a, &b), Ordering::Greater);

    let c = Reservation::new(title, Uuid::new_v4(), at(50));
    assert_eq!(queue_order(&c, &b), Ordering::Less);
  }

  #[test]
  fn lapsed_offer_reads_as_expired() {
    let mut r = Reservation::new(Uuid::new_v4(), Uuid::new_v4(), at(0));
    assert_eq!(r.effective_status(at(10_000)), ReservationStatus::Active);

    r.pickup_deadline = Some(at(100));
    assert_eq!(r.effective_status(at(100)), ReservationStatus::Active);
    assert_eq!(r.effective_status(at(101)), ReservationStatus::Expired);
  }

  #[test]
  fn fulfillable_checks() {
    let mut r = Reservation::new(Uuid::new_v4(), Uuid::new_v4(), at(0));
    assert!(matches!(check_fulfillable(&r, at(1)), Err(Error::NotOffered(_))));

    r.pickup_deadline = Some(at(100));
    assert!(check_fulfillable(&r, at(50)).is_ok());
    assert!(matches!(check_fulfillable(&r, at(150)), Err(Error::PickupExpired(_))));

    r.status = ReservationStatus::Cancelled;
    assert!(matches!(
      check_fulfillable(&r, at(50)),
      Err(Error::ReservationInactive(_))
    ));
  }
}
