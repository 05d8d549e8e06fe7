//! Outbound webhook delivery.
//!
//! [`sender`] performs one signed HTTP POST; [`engine`] owns the retry
//! policy and writes every attempt to the delivery ledger.

pub mod engine;
pub mod sender;
