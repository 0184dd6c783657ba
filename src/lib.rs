//! Price Reporter
//!
//! Polls market quotes and keeps on-chain aggregator feeds fresh, submitting
//! a new round when the price deviates or the last round goes stale.

pub mod chain;
pub mod config;
pub mod controller;
pub mod decision;
pub mod error;
pub mod keyring;
pub mod quote;
pub mod types;


pub use error::{ReporterError, Result};
