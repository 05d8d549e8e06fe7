/// All ledger primary keys are PostgreSQL BIGSERIAL (or in-memory counters).
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Lower-cased HTTP header map handed to source normalizers.
///
/// The core crate stays independent of any HTTP framework; the API layer
/// converts its header map into this shape before normalization.
pub type HeaderPairs = std::collections::HashMap<String, String>;
