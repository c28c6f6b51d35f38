//! The circulation service: what the HTTP layer and the sweep task talk to.
//!
//! [`Circulation`] pairs a [`CirculationStore`] with a [`Clock`] and the
//! in-process [`KeyedLocks`]. Every state-changing operation takes its locks
//! (titles before copies), runs one coordinator transition inside a single
//! store transaction, and is retried once after a short backoff if it comes
//! back [`Error::Busy`].

use std::{future::Future, sync::Arc, time::Duration};

use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  borrower::{Borrower, Role},
  circulation::{self, Cancelled, Fulfilled, Moment, Registered, Returned},
  clock::Clock,
  copy::{Copy, NewCopy},
  fine::{Fine, FineQuery},
  holiday::{Holiday, NewHoliday},
  loan::{Loan, LoanQuery, LoanView},
  locks::{KeyedLocks, LockKey, LockSet},
  reservation::{ReservationQuery, ReservationView},
  settings::{Settings, SettingsVersion},
  store::{CirculationStore, CirculationTx},
};

const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(50);

pub struct Circulation<S> {
  store:         Arc<S>,
  clock:         Arc<dyn Clock>,
  locks:         KeyedLocks,
  retry_backoff: Duration,
}

impl<S: CirculationStore + 'static> Circulation<S> {
  pub fn new(store: S, clock: Arc<dyn Clock>, lock_timeout: Duration) -> Self {
    Self {
      store: Arc::new(store),
      clock,
      locks: KeyedLocks::new(lock_timeout),
      retry_backoff: DEFAULT_RETRY_BACKOFF,
    }
  }

  pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
    self.retry_backoff = backoff;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn clock(&self) -> &dyn Clock { self.clock.as_ref() }

  /// The lock registry every state-changing operation goes through.
  pub fn locks(&self) -> &KeyedLocks { &self.locks }

  fn moment(&self) -> Moment {
    Moment { now: self.clock.now(), today: self.clock.today() }
  }

  // ── Plumbing ─────────────────────────────────────────────────────────────

  async fn transact<T, F>(&self, work: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut dyn CirculationTx) -> Result<T> + Send + 'static,
  {
    self.store.transact(work).await.map_err(Into::into)
  }

  async fn read<T, F>(&self, work: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut dyn CirculationTx) -> Result<T> + Send + 'static,
  {
    self.store.read(work).await.map_err(Into::into)
  }

  async fn lock(&self, keys: Vec<LockKey>) -> Result<LockSet> {
    self.locks.lock(keys).await
  }

  /// Run `op`, and run it once more if it fails with [`Error::Busy`].
  async fn retrying<T, Fut>(&self, op: impl Fn() -> Fut) -> Result<T>
  where
    Fut: Future<Output = Result<T>>,
  {
    match op().await {
      Err(Error::Busy(reason)) => {
        warn!(%reason, backoff = ?self.retry_backoff, "busy; retrying once");
        tokio::time::sleep(self.retry_backoff).await;
        op().await
      }
      other => other,
    }
  }

  // ── Loans ────────────────────────────────────────────────────────────────

  pub async fn issue(&self, borrower_id: Uuid, title_id: Uuid) -> Result<Loan> {
    self
      .retrying(|| async move {
        let _held = self.lock(vec![LockKey::Title(title_id)]).await?;
        let at = self.moment();
        self
          .transact(move |tx| circulation::issue(tx, at, borrower_id, title_id))
          .await
      })
      .await
  }

  pub async fn return_loan(&self, loan_id: Uuid) -> Result<Returned> {
    self
      .retrying(|| async move {
        let loan = self.read(move |tx| tx.loan(loan_id)).await?;
        let _held = self
          .lock(vec![LockKey::Title(loan.title_id), LockKey::Copy(loan.copy_id)])
          .await?;
        let at = self.moment();
        self
          .transact(move |tx| circulation::return_loan(tx, at, loan_id))
          .await
      })
      .await
  }

  pub async fn renew(&self, loan_id: Uuid) -> Result<Loan> {
    self
      .retrying(|| async move {
        let loan = self.read(move |tx| tx.loan(loan_id)).await?;
        let _held = self
          .lock(vec![LockKey::Title(loan.title_id), LockKey::Copy(loan.copy_id)])
          .await?;
        let at = self.moment();
        self
          .transact(move |tx| circulation::renew(tx, at, loan_id))
          .await
      })
      .await
  }

  pub async fn loan(&self, loan_id: Uuid) -> Result<LoanView> {
    let today = self.clock.today();
    self
      .read(move |tx| {
        let loan = tx.loan(loan_id)?;
        let mut views = circulation::loan_views(tx, vec![loan], today)?;
        views.pop().ok_or(Error::LoanNotFound(loan_id))
      })
      .await
  }

  pub async fn loans(&self, query: LoanQuery) -> Result<Vec<LoanView>> {
    let today = self.clock.today();
    self
      .read(move |tx| {
        let loans = tx.find(&query, today)?;
        circulation::loan_views(tx, loans, today)
      })
      .await
  }

  // ── Reservations ─────────────────────────────────────────────────────────

  pub async fn reserve(&self, borrower_id: Uuid, title_id: Uuid) -> Result<ReservationView> {
    self
      .retrying(|| async move {
        let _held = self.lock(vec![LockKey::Title(title_id)]).await?;
        let at = self.moment();
        self
          .transact(move |tx| circulation::reserve(tx, at, borrower_id, title_id))
          .await
      })
      .await
  }

  pub async fn fulfill(&self, reservation_id: Uuid) -> Result<Fulfilled> {
    self
      .retrying(|| async move {
        let reservation = self.read(move |tx| tx.reservation(reservation_id)).await?;
        let mut keys = vec![LockKey::Title(reservation.title_id)];
        keys.extend(reservation.offered_copy_id.map(LockKey::Copy));
        let _held = self.lock(keys).await?;
        let at = self.moment();
        self
          .transact(move |tx| circulation::fulfill(tx, at, reservation_id))
          .await
      })
      .await
  }

  pub async fn cancel(
    &self,
    reservation_id: Uuid,
    reason: Option<String>,
  ) -> Result<Cancelled> {
    self
      .retrying(|| {
        let reason = reason.clone();
        async move {
          let reservation = self.read(move |tx| tx.reservation(reservation_id)).await?;
          let mut keys = vec![LockKey::Title(reservation.title_id)];
          keys.extend(reservation.offered_copy_id.map(LockKey::Copy));
          let _held = self.lock(keys).await?;
          let at = self.moment();
          self
            .transact(move |tx| circulation::cancel(tx, at, reservation_id, reason))
            .await
        }
      })
      .await
  }

  /// Persist the expiry of every offer whose pickup deadline has passed.
  pub async fn sweep(&self) -> Result<Vec<Cancelled>> {
    self
      .retrying(|| async move {
        let now = self.clock.now();
        let lapsed = self.read(move |tx| tx.lapsed_offers(now)).await?;
        let mut titles: Vec<Uuid> = lapsed.iter().map(|r| r.title_id).collect();
        titles.sort_unstable();
        titles.dedup();
        if titles.is_empty() {
          return Ok(Vec::new());
        }

        let _held = self
          .lock(titles.iter().copied().map(LockKey::Title).collect())
          .await?;
        let at = self.moment();
        self
          .transact(move |tx| circulation::expire_lapsed(tx, at, &titles))
          .await
      })
      .await
  }

  pub async fn reservation(&self, reservation_id: Uuid) -> Result<ReservationView> {
    let now = self.clock.now();
    self
      .read(move |tx| {
        let reservation = tx.reservation(reservation_id)?;
        tx.view(reservation, now)
      })
      .await
  }

  /// Reservations matching `query`. The status filter applies to the
  /// effective status, so lapsed offers match `expired` before the sweep.
  pub async fn reservations(&self, query: ReservationQuery) -> Result<Vec<ReservationView>> {
    let now = self.clock.now();
    self
      .read(move |tx| {
        let status = query.status;
        let stored = tx.select_reservations(&ReservationQuery { status: None, ..query })?;
        let mut views = Vec::with_capacity(stored.len());
        for reservation in stored {
          let view = tx.view(reservation, now)?;
          if status.is_none_or(|s| s == view.status) {
            views.push(view);
          }
        }
        Ok(views)
      })
      .await
  }

  // ── Copies ───────────────────────────────────────────────────────────────

  pub async fn register_copy(&self, new: NewCopy) -> Result<Registered> {
    let title_id = new.title_id;
    self
      .retrying(|| {
        let new = new.clone();
        async move {
          let _held = self.lock(vec![LockKey::Title(title_id)]).await?;
          let at = self.moment();
          self
            .transact(move |tx| circulation::register_copy(tx, at, new))
            .await
        }
      })
      .await
  }

  pub async fn copy(&self, copy_id: Uuid) -> Result<Copy> {
    self.read(move |tx| tx.copy(copy_id)).await
  }

  pub async fn copies(&self, title_id: Option<Uuid>) -> Result<Vec<Copy>> {
    self.read(move |tx| tx.list_copies(title_id)).await
  }

  // ── Fines ────────────────────────────────────────────────────────────────

  pub async fn fines(&self, query: FineQuery) -> Result<Vec<Fine>> {
    self.read(move |tx| tx.select_fines(&query)).await
  }

  pub async fn fine(&self, fine_id: Uuid) -> Result<Fine> {
    self.read(move |tx| tx.fine(fine_id)).await
  }

  pub async fn create_fine(
    &self,
    borrower_id: Uuid,
    amount: Decimal,
    reason: String,
  ) -> Result<Fine> {
    let today = self.clock.today();
    let fine = self
      .transact(move |tx| {
        tx.borrower(borrower_id)?;
        let ceiling = tx.settings()?.manual_fine_ceiling;
        tx.create_manual(borrower_id, amount, &reason, ceiling, today)
      })
      .await?;
    info!(fine_id = %fine.fine_id, %borrower_id, amount = %fine.amount, "manual fine created");
    Ok(fine)
  }

  pub async fn edit_fine(&self, fine_id: Uuid, amount: Decimal, reason: String) -> Result<Fine> {
    let fine = self
      .transact(move |tx| {
        let ceiling = tx.settings()?.manual_fine_ceiling;
        tx.edit(fine_id, amount, &reason, ceiling)
      })
      .await?;
    info!(%fine_id, amount = %fine.amount, "fine edited");
    Ok(fine)
  }

  pub async fn pay_fine(&self, fine_id: Uuid) -> Result<Fine> {
    let today = self.clock.today();
    let fine = self.transact(move |tx| tx.pay(fine_id, today)).await?;
    info!(
      %fine_id,
      amount = %fine.amount,
      receipt = fine.receipt.as_deref().unwrap_or_default(),
      "fine paid"
    );
    Ok(fine)
  }

  pub async fn delete_fine(&self, fine_id: Uuid) -> Result<()> {
    self.transact(move |tx| tx.delete(fine_id)).await?;
    info!(%fine_id, "fine deleted");
    Ok(())
  }

  // ── Policy ───────────────────────────────────────────────────────────────

  pub async fn holidays(&self) -> Result<Vec<Holiday>> {
    self.read(|tx| tx.list_holidays()).await
  }

  pub async fn add_holiday(&self, new: NewHoliday) -> Result<Holiday> {
    let holiday = self.transact(move |tx| tx.add_holiday(new)).await?;
    info!(holiday_id = %holiday.holiday_id, date = %holiday.date, recurring = holiday.recurring, "holiday added");
    Ok(holiday)
  }

  pub async fn remove_holiday(&self, holiday_id: Uuid) -> Result<()> {
    self.transact(move |tx| tx.remove_holiday(holiday_id)).await?;
    info!(%holiday_id, "holiday removed");
    Ok(())
  }

  pub async fn settings(&self) -> Result<Settings> {
    self.read(|tx| tx.settings()).await
  }

  pub async fn update_settings(&self, settings: Settings) -> Result<SettingsVersion> {
    let now = self.clock.now();
    let version = self
      .transact(move |tx| tx.update_settings(&settings, now))
      .await?;
    info!(version = version.version, "settings updated");
    Ok(version)
  }

  pub async fn settings_history(&self) -> Result<Vec<SettingsVersion>> {
    self.read(|tx| tx.settings_history()).await
  }

  // ── Borrowers ────────────────────────────────────────────────────────────

  pub async fn register_borrower(&self, borrower_id: Uuid, role: Role) -> Result<Borrower> {
    let now = self.clock.now();
    let borrower = self
      .transact(move |tx| tx.register(borrower_id, role, now))
      .await?;
    info!(%borrower_id, ?role, "borrower registered");
    Ok(borrower)
  }

  pub async fn borrower(&self, borrower_id: Uuid) -> Result<Borrower> {
    self.read(move |tx| tx.borrower(borrower_id)).await
  }

  pub async fn borrowers(&self) -> Result<Vec<Borrower>> {
    self.read(|tx| tx.list_borrowers()).await
  }
}
