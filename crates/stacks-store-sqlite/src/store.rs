//! [`SqliteStore`]: the SQLite implementation of [`CirculationStore`].

use std::path::Path;

use rusqlite::TransactionBehavior;
use stacks_core::{
  Result as CoreResult,
  store::{CirculationStore, CirculationTx},
};

use crate::{Result, schema::SCHEMA, unit::SqliteUnit};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A circulation store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All work is
/// funnelled through that one connection, so units of work never interleave.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `work` in a transaction of the given kind. With `commit` unset the
  /// transaction is always rolled back.
  async fn run<T, F>(&self, behavior: TransactionBehavior, commit: bool, work: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut dyn CirculationTx) -> CoreResult<T> + Send + 'static,
  {
    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(behavior)?;
        let outcome = work(&mut SqliteUnit::new(&tx));
        match &outcome {
          Ok(_) if commit => tx.commit()?,
          Ok(_) => {}
          Err(e) => tracing::debug!(error = %e, "unit of work rolled back"),
        }
        Ok(outcome)
      })
      .await?;
    Ok(outcome?)
  }
}

// ─── CirculationStore impl ───────────────────────────────────────────────────

impl CirculationStore for SqliteStore {
  type Error = crate::Error;

  async fn transact<T, F>(&self, work: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut dyn CirculationTx) -> CoreResult<T> + Send + 'static,
  {
    self.run(TransactionBehavior::Immediate, true, work).await
  }

  async fn read<T, F>(&self, work: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut dyn CirculationTx) -> CoreResult<T> + Send + 'static,
  {
    self.run(TransactionBehavior::Deferred, false, work).await
  }
}
