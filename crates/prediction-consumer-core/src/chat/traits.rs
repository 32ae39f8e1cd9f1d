//! Chat client trait definition.

use async_trait::async_trait;

use super::types::{ChatError, MessageHandle, Reaction, Resolution};

/// The operations the dispatcher needs from a chat platform.
///
/// Implementations perform exactly one platform call per `delete`/`react`
/// and never retry; error classification is left to the caller.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Look a message up. Missing channels and messages are reported through
    /// [`Resolution`], not as errors.
    async fn resolve(&self, channel_id: u64, message_id: u64) -> Result<Resolution, ChatError>;

    /// Delete the message.
    async fn delete(&self, handle: &MessageHandle) -> Result<(), ChatError>;

    /// Add a reaction as the bot user.
    async fn react(&self, handle: &MessageHandle, reaction: Reaction) -> Result<(), ChatError>;
}
