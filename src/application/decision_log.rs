use crate::domain::ports::{DecisionLogRepository, DecisionRecord};
use std::sync::Arc;
use tracing::error;

/// Durable record of every evaluation.
///
/// Fail-safe by contract: a logger error never cancels or alters a
/// decision, so persistence runs inside its own error boundary.
pub struct DecisionLogger {
    repo: Arc<dyn DecisionLogRepository>,
}

impl DecisionLogger {
    pub fn new(repo: Arc<dyn DecisionLogRepository>) -> Self {
        Self { repo }
    }

    pub async fn log(&self, record: DecisionRecord) {
        if let Err(e) = self.repo.insert(&record).await {
            error!(
                "DecisionLogger [{}]: failed to persist decision row: {}",
                record.symbol, e
            );
        }
    }
}
