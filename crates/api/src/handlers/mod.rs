pub mod deliveries;
pub mod ingest;
pub mod intelligence;
pub mod subscriptions;
pub mod transfer;
