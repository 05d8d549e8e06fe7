//! Trust-level lookup seam used by redaction.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::types::DbId;

/// Resolves the current trust level of a user.
///
/// `None` means the level is unknown; redaction then applies the lowest tier.
#[async_trait]
pub trait TrustScoreProvider: Send + Sync {
    async fn trust_level(&self, user_id: DbId) -> Option<u32>;
}

/// Provider that knows no scores. Every recipient gets the lowest tier.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTrustScores;

#[async_trait]
impl TrustScoreProvider for NoTrustScores {
    async fn trust_level(&self, _user_id: DbId) -> Option<u32> {
        None
    }
}

/// Fixed in-memory score table.
#[derive(Debug, Default, Clone)]
pub struct StaticTrustScores {
    levels: HashMap<DbId, u32>,
}

impl StaticTrustScores {
    pub fn new(levels: HashMap<DbId, u32>) -> Self {
        Self { levels }
    }

    pub fn with_level(mut self, user_id: DbId, level: u32) -> Self {
        self.levels.insert(user_id, level);
        self
    }
}

#[async_trait]
impl TrustScoreProvider for StaticTrustScores {
    async fn trust_level(&self, user_id: DbId) -> Option<u32> {
        self.levels.get(&user_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_scores_resolve_known_users_only() {
        let scores = StaticTrustScores::default().with_level(1, 9);
        assert_eq!(scores.trust_level(1).await, Some(9));
        assert_eq!(scores.trust_level(2).await, None);
        assert_eq!(NoTrustScores.trust_level(1).await, None);
    }
}
