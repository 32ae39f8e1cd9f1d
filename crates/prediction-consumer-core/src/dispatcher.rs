//! Moderation dispatcher
//!
//! Pulls one record at a time, decodes it, resolves the message, waits out
//! the anti-rate-limit delay, applies the action and only then commits.
//! Nothing is pipelined: at most one record is ever uncommitted.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::broker::{RawRecord, RecordSource};
use crate::chat::{ChatClient, ChatError, Reaction};
use crate::error::DispatchError;
use crate::prediction::{DecodeError, PredictionEvent};

/// Dispatcher settings, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Annotate with reactions instead of deleting.
    pub debug_mode: bool,
    /// Pause between resolve and action.
    pub action_delay: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            debug_mode: false,
            action_delay: Duration::from_millis(400),
        }
    }
}

/// What to do with a message that still exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationAction {
    Delete,
    React(Reaction),
    Skip,
}

impl ModerationAction {
    pub fn decide(debug_mode: bool, is_toxic: bool) -> Self {
        match (debug_mode, is_toxic) {
            (false, true) => Self::Delete,
            (false, false) => Self::Skip,
            (true, true) => Self::React(Reaction::Blocked),
            (true, false) => Self::React(Reaction::Approved),
        }
    }
}

/// How one prediction ended, short of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Deleted,
    Reacted(Reaction),
    Skipped,
    NotFound,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub received: u64,
    pub deleted: u64,
    pub reacted: u64,
    pub skipped: u64,
    pub not_found: u64,
}

impl DispatchStats {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Deleted => self.deleted += 1,
            Outcome::Reacted(_) => self.reacted += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::NotFound => self.not_found += 1,
        }
    }
}

pub struct ModerationDispatcher {
    chat: Arc<dyn ChatClient>,
    config: DispatcherConfig,
    stats: DispatchStats,
}

impl ModerationDispatcher {
    pub fn new(chat: Arc<dyn ChatClient>, config: DispatcherConfig) -> Self {
        Self {
            chat,
            config,
            stats: DispatchStats::default(),
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Resolve the message and apply the configured action.
    ///
    /// The delay after resolve is unconditional: it follows the resolve call,
    /// which is itself rate limited.
    pub async fn process(&self, event: PredictionEvent) -> Result<Outcome, ChatError> {
        let PredictionEvent {
            channel_id,
            message_id,
            is_toxic,
        } = event;
        debug!(message_id, channel_id, "Process Discord message");

        let resolution = self.chat.resolve(channel_id, message_id).await?;
        tokio::time::sleep(self.config.action_delay).await;

        let Some(handle) = resolution.handle() else {
            return Ok(Outcome::NotFound);
        };

        match ModerationAction::decide(self.config.debug_mode, is_toxic) {
            ModerationAction::Delete => {
                info!(message_id, "Message is toxic");
                debug!(message_id, "Deleting Discord message");
                self.chat.delete(&handle).await?;
                Ok(Outcome::Deleted)
            }
            ModerationAction::React(reaction) => {
                if is_toxic {
                    info!(message_id, "Message is toxic");
                } else {
                    info!(message_id, "Message is not toxic");
                }
                debug!(message_id, %reaction, "Add reaction to Discord message");
                self.chat.react(&handle, reaction).await?;
                Ok(Outcome::Reacted(reaction))
            }
            ModerationAction::Skip => Ok(Outcome::Skipped),
        }
    }

    /// Take one record from received to committed.
    pub async fn handle_record<S>(
        &mut self,
        source: &mut S,
        record: RawRecord,
    ) -> Result<Outcome, DispatchError>
    where
        S: RecordSource + ?Sized,
    {
        self.stats.received += 1;
        let event = decode_record(&record)?;
        debug!(
            message_id = event.message_id,
            channel_id = event.channel_id,
            is_toxic = event.is_toxic,
            "Received prediction"
        );

        let outcome = match self.process(event).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    message_id = event.message_id,
                    status = ?err.status(),
                    error = %err,
                    "Discord call failed, giving up"
                );
                return Err(DispatchError::Platform(err));
            }
        };
        self.stats.record(outcome);

        source.commit().await?;
        Ok(outcome)
    }

    /// Run until the source ends or a fatal error occurs.
    pub async fn run<S>(&mut self, source: &mut S) -> Result<(), DispatchError>
    where
        S: RecordSource + ?Sized,
    {
        let result = self.drain(source).await;

        let stats = self.stats;
        info!(
            received = stats.received,
            deleted = stats.deleted,
            reacted = stats.reacted,
            skipped = stats.skipped,
            not_found = stats.not_found,
            "Dispatcher stopped"
        );
        result
    }

    async fn drain<S>(&mut self, source: &mut S) -> Result<(), DispatchError>
    where
        S: RecordSource + ?Sized,
    {
        while let Some(record) = source.next_record().await? {
            self.handle_record(source, record).await?;
        }
        info!("Prediction stream ended");
        Ok(())
    }
}

fn decode_record(record: &RawRecord) -> Result<PredictionEvent, DispatchError> {
    let decoded = match &record.payload {
        Some(payload) => PredictionEvent::decode(payload),
        None => Err(DecodeError::EmptyPayload),
    };
    decoded.map_err(|source| DispatchError::Decode {
        topic: record.topic.clone(),
        partition: record.partition,
        offset: record.offset,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_table() {
        assert_eq!(ModerationAction::decide(false, true), ModerationAction::Delete);
        assert_eq!(ModerationAction::decide(false, false), ModerationAction::Skip);
        assert_eq!(
            ModerationAction::decide(true, true),
            ModerationAction::React(Reaction::Blocked)
        );
        assert_eq!(
            ModerationAction::decide(true, false),
            ModerationAction::React(Reaction::Approved)
        );
    }

    #[test]
    fn test_default_config() {
        let config = DispatcherConfig::default();
        assert!(!config.debug_mode);
        assert_eq!(config.action_delay, Duration::from_millis(400));
    }

    #[test]
    fn test_decode_record_without_payload() {
        let record = RawRecord {
            topic: "modelprediction".into(),
            partition: 0,
            offset: 7,
            payload: None,
        };
        let err = decode_record(&record).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Decode {
                offset: 7,
                source: DecodeError::EmptyPayload,
                ..
            }
        ));
    }

    #[test]
    fn test_stats_record() {
        let mut stats = DispatchStats::default();
        stats.record(Outcome::Deleted);
        stats.record(Outcome::NotFound);
        stats.record(Outcome::Reacted(Reaction::Approved));
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.not_found, 1);
        assert_eq!(stats.reacted, 1);
        assert_eq!(stats.skipped, 0);
    }
}
