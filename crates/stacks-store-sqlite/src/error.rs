//! Error type for `stacks-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] stacks_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("decimal parse error: {0}")]
  Decimal(#[from] rust_decimal::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A column held a value outside its encoding.
  #[error("unknown {column} value: {value:?}")]
  UnknownValue { column: &'static str, value: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for stacks_core::Error {
  fn from(err: Error) -> Self {
    match err {
      Error::Core(e) => e,
      other => stacks_core::Error::Storage(Box::new(other)),
    }
  }
}

/// Lift backend failures into the core taxonomy inside a unit of work.
pub(crate) trait IntoCore<T> {
  fn core(self) -> stacks_core::Result<T>;
}

impl<T, E: Into<Error>> IntoCore<T> for std::result::Result<T, E> {
  fn core(self) -> stacks_core::Result<T> {
    self.map_err(|e| stacks_core::Error::from(e.into()))
  }
}
