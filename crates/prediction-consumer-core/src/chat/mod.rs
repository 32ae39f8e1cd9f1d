//! Chat platform adapter
//!
//! Resolves `(channel_id, message_id)` pairs to live Discord messages and
//! applies moderation actions to them.
//!
//! ```text
//! ┌──────────────────────────────┐      ┌──────────────────────────┐
//! │ DiscordGateway (N shards)    │─────▶│ ChannelCache             │
//! │  - identify / heartbeat      │      │  channel_id -> guild_id  │
//! │  - READY / GUILD_CREATE ...  │      └──────────────────────────┘
//! └──────────────────────────────┘                   │
//!              │ SessionReadiness                    ▼
//!              ▼                       ┌──────────────────────────┐
//!        ReadinessGate                 │ DiscordChatClient (REST) │
//!                                      │  resolve / delete / react│
//!                                      └──────────────────────────┘
//! ```

mod cache;
mod discord;
mod gateway;
mod traits;
mod types;

pub use cache::ChannelCache;
pub use discord::{DiscordChatClient, DiscordConfig};
pub use gateway::DiscordGateway;
pub use traits::ChatClient;
pub use types::{ChatError, MessageHandle, Reaction, Resolution};
