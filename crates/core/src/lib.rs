//! Domain logic for the event normalization and webhook delivery engine.
//!
//! Everything in this crate is synchronous and free of I/O except the
//! [`trust::TrustScoreProvider`] seam. Stages are pure transformations so
//! they can be shared across concurrent fan-out tasks:
//!
//! - [`normalizer`] -- per-source adapters producing a [`normalizer::NormalizedEvent`].
//! - [`classifier`] -- priority, category, confidence, suggested actions.
//! - [`redaction`] -- trust-tier field stripping and masking.
//! - [`subscriptions`] -- subscription interest matching and validation.
//! - [`signing`] -- HMAC-SHA256 signing and constant-time verification.
//! - [`delivery`] -- delivery status lifecycle and retry backoff.
//! - [`subscription_csv`] -- bulk import/export of subscriptions.

pub mod classifier;
pub mod delivery;
pub mod error;
pub mod normalizer;
pub mod redaction;
pub mod signing;
pub mod subscription_csv;
pub mod subscriptions;
pub mod trust;
pub mod types;
