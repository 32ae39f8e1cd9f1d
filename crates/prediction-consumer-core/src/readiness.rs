//! Startup sequencing.
//!
//! [`SessionReadiness`] carries the chat session state from the gateway to
//! whoever needs to wait on it. [`ReadinessGate`] uses it to order startup:
//! session live, broker warm-up delay, consumer connect, dispatch loop,
//! consumer close.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

use crate::broker::{BrokerError, RecordSource};
use crate::dispatcher::ModerationDispatcher;
use crate::error::DispatchError;

#[derive(Debug, Error)]
pub enum ReadinessError {
    #[error("chat session failed: {0}")]
    SessionFailed(String),

    #[error("chat session signal dropped")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    Pending,
    Live,
    Lost,
    Failed(String),
}

/// Liveness of the chat platform session.
///
/// Cloning shares the underlying signal.
#[derive(Debug, Clone)]
pub struct SessionReadiness {
    tx: Arc<watch::Sender<SessionState>>,
}

impl Default for SessionReadiness {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionReadiness {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::Pending);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_live(&self) -> bool {
        *self.tx.borrow() == SessionState::Live
    }

    /// A failed session stays failed.
    pub fn mark_live(&self) {
        self.tx.send_if_modified(|state| match state {
            SessionState::Live | SessionState::Failed(_) => false,
            SessionState::Pending | SessionState::Lost => {
                *state = SessionState::Live;
                true
            }
        });
    }

    /// The session dropped but may come back.
    pub fn mark_lost(&self) {
        self.tx.send_if_modified(|state| {
            if matches!(state, SessionState::Live) {
                *state = SessionState::Lost;
                true
            } else {
                false
            }
        });
    }

    /// The session cannot come back (bad token, disallowed intents).
    pub fn mark_failed(&self, reason: impl Into<String>) {
        self.tx.send_replace(SessionState::Failed(reason.into()));
    }

    /// Resolve once the session is live, or fail if it never can be.
    pub async fn wait_live(&self) -> Result<(), ReadinessError> {
        let mut rx = self.tx.subscribe();
        let state = rx
            .wait_for(|state| matches!(state, SessionState::Live | SessionState::Failed(_)))
            .await
            .map_err(|_| ReadinessError::Closed)?;
        match &*state {
            SessionState::Failed(reason) => Err(ReadinessError::SessionFailed(reason.clone())),
            _ => Ok(()),
        }
    }
}

/// Holds the consumer back until the chat session is live.
pub struct ReadinessGate {
    readiness: SessionReadiness,
    warm_up: Duration,
}

impl ReadinessGate {
    pub fn new(readiness: SessionReadiness, warm_up: Duration) -> Self {
        Self { readiness, warm_up }
    }

    /// Wait for the session, wait out the broker warm-up, connect, and run the
    /// dispatcher until it stops. The source is closed on every return path
    /// after a successful connect; a panic drops it instead.
    pub async fn run<S, F, Fut>(
        &self,
        dispatcher: &mut ModerationDispatcher,
        connect: F,
    ) -> Result<(), DispatchError>
    where
        S: RecordSource,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S, BrokerError>>,
    {
        self.readiness.wait_live().await?;
        info!("Discord client ready");

        info!(
            seconds = self.warm_up.as_secs_f64(),
            "Waiting for Kafka broker to be ready"
        );
        tokio::time::sleep(self.warm_up).await;

        let mut source = connect().await?;
        info!("Prediction consumer is ready");

        let result = dispatcher.run(&mut source).await;

        info!("Stopping consumer");
        source.close().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_readiness_starts_pending() {
        let readiness = SessionReadiness::new();
        assert!(!readiness.is_live());
    }

    #[tokio::test]
    async fn test_wait_live_resolves_after_mark() {
        let readiness = SessionReadiness::new();
        let waiter = readiness.clone();
        let handle = tokio::spawn(async move { waiter.wait_live().await });

        tokio::task::yield_now().await;
        assert!(!handle.is_finished());

        readiness.mark_live();
        handle.await.unwrap().unwrap();
        assert!(readiness.is_live());
    }

    #[tokio::test]
    async fn test_wait_live_already_live() {
        let readiness = SessionReadiness::new();
        readiness.mark_live();
        readiness.wait_live().await.unwrap();
    }

    #[tokio::test]
    async fn test_mark_lost_only_from_live() {
        let readiness = SessionReadiness::new();
        readiness.mark_lost();
        assert!(!readiness.is_live());

        readiness.mark_live();
        readiness.mark_lost();
        assert!(!readiness.is_live());
    }

    #[tokio::test]
    async fn test_failed_session_errors() {
        let readiness = SessionReadiness::new();
        readiness.mark_failed("Authentication failed");
        let err = readiness.wait_live().await.unwrap_err();
        assert!(matches!(err, ReadinessError::SessionFailed(reason) if reason == "Authentication failed"));

        readiness.mark_live();
        assert!(!readiness.is_live());
    }
}
