pub mod trust_score_repo;
pub mod webhook_repo;

pub use trust_score_repo::TrustScoreRepo;
pub use webhook_repo::WebhookRepo;
