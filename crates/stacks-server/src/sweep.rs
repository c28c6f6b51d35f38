//! Background expiry of lapsed pickup offers.

use std::{sync::Arc, time::Duration};

use stacks_core::{Circulation, store::CirculationStore};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

/// Run [`Circulation::sweep`] every `every` until the returned handle is
/// aborted. The first sweep runs immediately.
pub fn spawn<S>(circulation: Arc<Circulation<S>>, every: Duration) -> JoinHandle<()>
where
  S: CirculationStore + 'static,
{
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
      ticker.tick().await;
      match circulation.sweep().await {
        Ok(expired) if expired.is_empty() => debug!("sweep found no lapsed offers"),
        Ok(expired) => {
          let cascaded = expired.iter().filter(|c| c.offered.is_some()).count();
          info!(expired = expired.len(), cascaded, "lapsed pickup offers expired");
        }
        Err(e) => warn!(error = %e, "reservation sweep failed"),
      }
    }
  })
}

#[cfg(test)]
mod tests {
  use chrono::{NaiveDate, TimeDelta};
  use stacks_core::{borrower::Role, clock::ManualClock, copy::NewCopy, reservation::ReservationStatus};
  use stacks_store_sqlite::SqliteStore;
  use uuid::Uuid;

  use super::*;

  #[tokio::test]
  async fn sweeper_persists_expiry_and_offers_next() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let clock = ManualClock::at_date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    let circ = Arc::new(Circulation::new(
      store,
      Arc::new(clock.clone()),
      Duration::from_millis(500),
    ));

    let title = Uuid::new_v4();
    let [holder, first, second] = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    for borrower in [holder, first, second] {
      circ.register_borrower(borrower, Role::Student).await.unwrap();
    }
    circ
      .register_copy(NewCopy { title_id: title, accession_code: "SW-1".into() })
      .await
      .unwrap();
    let loan = circ.issue(holder, title).await.unwrap();
    let r1 = circ.reserve(first, title).await.unwrap().reservation.reservation_id;
    let r2 = circ.reserve(second, title).await.unwrap().reservation.reservation_id;

    let returned = circ.return_loan(loan.loan_id).await.unwrap();
    assert_eq!(returned.offered.map(|r| r.reservation_id), Some(r1));

    clock.advance(TimeDelta::hours(49));
    let handle = spawn(circ.clone(), Duration::from_millis(10));

    let mut offered = None;
    for _ in 0..100 {
      let view = circ.reservation(r2).await.unwrap();
      if view.reservation.offered_copy_id.is_some() {
        offered = Some(view);
        break;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.abort();

    let offered = offered.expect("second reservation was never offered");
    assert_eq!(offered.queue_position, Some(1));
    let first_view = circ.reservation(r1).await.unwrap();
    assert_eq!(first_view.reservation.status, ReservationStatus::Expired);
  }
}
