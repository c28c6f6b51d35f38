//! Core types and trait definitions for the Stacks circulation engine.
//!
//! This crate is deliberately free of HTTP and database dependencies. It
//! holds the domain model (copies, loans, fines, reservations, policy), the
//! component contracts that storage backends implement, and the circulation
//! coordinator that drives them. Storage backends (e.g.
//! `stacks-store-sqlite`) supply the transactional unit of work.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod borrower;
pub mod circulation;
pub mod clock;
pub mod copy;
pub mod error;
pub mod fine;
pub mod holiday;
pub mod loan;
pub mod locks;
pub mod reservation;
pub mod service;
pub mod settings;
pub mod store;

pub use error::{Error, ErrorKind, Result};
pub use service::Circulation;
