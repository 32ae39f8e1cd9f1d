//! Prediction Consumer Core
//!
//! Consumes toxicity predictions from Kafka and applies the matching
//! moderation action to the Discord message they refer to.
//!
//! # Architecture
//!
//! ```text
//! Kafka ──▶ RecordSource ──▶ PredictionEvent::decode
//!                                   │
//!                                   ▼
//!                        ModerationDispatcher ──▶ ChatClient (Discord REST)
//!                                   │                 delete | react | skip
//!                                   ▼
//!                             commit offset
//! ```
//!
//! The [`readiness::ReadinessGate`] holds the dispatcher back until the
//! Discord gateway session reports every shard ready, then waits out the
//! broker warm-up delay before connecting the consumer.

pub mod broker;
pub mod chat;
pub mod dispatcher;
pub mod error;
pub mod prediction;
pub mod readiness;
#[cfg(any(test, feature = "test-utils"))]
pub mod testkit;

pub use broker::{BrokerConfig, BrokerError, KafkaRecordSource, RawRecord, RecordSource};
pub use chat::{
    ChannelCache, ChatClient, ChatError, DiscordChatClient, DiscordConfig, DiscordGateway,
    MessageHandle, Reaction, Resolution,
};
pub use dispatcher::{
    DispatchStats, DispatcherConfig, ModerationAction, ModerationDispatcher, Outcome,
};
pub use error::DispatchError;
pub use prediction::{DecodeError, PredictionEvent};
pub use readiness::{ReadinessError, ReadinessGate, SessionReadiness};
