//! Trust levels read from the `trust_scores` table.

use async_trait::async_trait;
use vrtrust_core::trust::TrustScoreProvider;
use vrtrust_core::types::DbId;

use crate::repositories::TrustScoreRepo;
use crate::DbPool;

/// [`TrustScoreProvider`] backed by PostgreSQL.
///
/// Lookup failures are logged and treated as an unknown level, which makes
/// redaction fall back to the most restrictive tier.
#[derive(Clone)]
pub struct PgTrustScores {
    pool: DbPool,
}

impl PgTrustScores {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrustScoreProvider for PgTrustScores {
    async fn trust_level(&self, user_id: DbId) -> Option<u32> {
        match TrustScoreRepo::find_level(&self.pool, user_id).await {
            Ok(level) => level.and_then(|l| u32::try_from(l).ok()),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Trust score lookup failed");
                None
            }
        }
    }
}
