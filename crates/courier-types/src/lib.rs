//! Shared types for the courier messaging bot.
//!
//! - [`ids`]: correspondent identifiers (`<localpart>@<domain>`)
//! - [`contact`]: contact records, merge candidates, and name synthesis
//! - [`config`]: top-level bot configuration loaded from `courier.toml`
//! - [`error`]: the error taxonomy shared across crates

pub mod config;
pub mod contact;
pub mod error;
pub mod ids;

pub use config::CourierConfig;
pub use contact::{CandidateOrigin, ContactCandidate, ContactRecord};
pub use error::CourierError;
pub use ids::CorrespondentId;
