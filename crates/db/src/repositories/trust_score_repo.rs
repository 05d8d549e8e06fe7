//! Read-only access to the `trust_scores` table.

use sqlx::PgPool;
use vrtrust_core::types::DbId;

pub struct TrustScoreRepo;

impl TrustScoreRepo {
    /// Current trust level of a user, if one is recorded.
    pub async fn find_level(pool: &PgPool, user_id: DbId) -> Result<Option<i32>, sqlx::Error> {
        sqlx::query_scalar::<_, i32>("SELECT level FROM trust_scores WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }
}
