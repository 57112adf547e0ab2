//! # Giveback Donation Backend
//!
//! Corporate fundraising backend: campaigns, donations, and a pluggable
//! payment gateway layer behind a small REST API.
//!
//! | Concern              | Module       |
//! |----------------------|--------------|
//! | Domain types & money | [`models`]   |
//! | Persistence          | [`db`]       |
//! | Gateway abstraction  | [`payments`] |
//! | Donation pipeline    | [`service`]  |
//! | Confirmations        | [`notify`]   |
//! | HTTP surface         | [`api`]      |
//!
//! ## Architecture
//!
//! [`service::DonationService`] is the only writer of campaign aggregate
//! counters; [`api`] validates input at the HTTP boundary and [`payments`]
//! talks to processors, neither touches the ledger directly. Money is
//! integer cents end to end.

pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod notify;
pub mod payments;
pub mod service;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod test_api;

pub use config::Config;
pub use errors::{DonationError, Result};
pub use service::{DonationOutcome, DonationService};
