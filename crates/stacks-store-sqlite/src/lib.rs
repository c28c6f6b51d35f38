//! SQLite backend for the Stacks circulation engine.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Every unit of work handed to
//! [`SqliteStore`] runs inside one `BEGIN IMMEDIATE` transaction.

mod encode;
mod schema;
mod store;
mod unit;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
