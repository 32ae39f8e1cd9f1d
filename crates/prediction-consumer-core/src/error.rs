//! Errors that end the dispatch loop.

use thiserror::Error;

use crate::broker::BrokerError;
use crate::chat::ChatError;
use crate::prediction::DecodeError;
use crate::readiness::ReadinessError;

/// Every variant is fatal: the loop stops and the record in flight stays
/// uncommitted.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Readiness(#[from] ReadinessError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("malformed prediction at {topic}[{partition}]@{offset}: {source}")]
    Decode {
        topic: String,
        partition: i32,
        offset: i64,
        #[source]
        source: DecodeError,
    },

    #[error("chat platform error: {0}")]
    Platform(#[source] ChatError),
}

impl DispatchError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::Platform(err) if err.is_rate_limit())
    }
}
