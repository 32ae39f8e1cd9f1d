//! Discord REST client.
//!
//! Message lookups, deletions and reactions go through the REST API. Channel
//! visibility comes from the gateway's [`ChannelCache`], so a channel miss
//! costs no request.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::cache::ChannelCache;
use super::traits::ChatClient;
use super::types::{ChatError, MessageHandle, Reaction, Resolution};

pub(crate) const DISCORD_API_BASE: &str = "https://discord.com/api/v10";
const API_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = concat!(
    "DiscordBot (prediction-consumer, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Discord connection settings.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub bot_token: String,
    /// REST base URL, without trailing slash.
    pub api_base: String,
    pub shard_count: u32,
}

impl DiscordConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: DISCORD_API_BASE.to_string(),
            shard_count: 3,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_shard_count(mut self, shard_count: u32) -> Self {
        self.shard_count = shard_count.max(1);
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.bot_token.trim().is_empty()
    }

    pub(crate) fn authorization(&self) -> String {
        format!("Bot {}", self.bot_token)
    }
}

/// Error body returned by the Discord API on non-2xx responses.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: u64,
    #[serde(default)]
    retry_after: Option<f64>,
    #[serde(default)]
    global: bool,
}

/// [`ChatClient`] backed by the Discord REST API.
pub struct DiscordChatClient {
    config: DiscordConfig,
    client: Client,
    channels: ChannelCache,
}

impl DiscordChatClient {
    pub fn new(config: DiscordConfig, channels: ChannelCache) -> Self {
        Self {
            config,
            client: Client::new(),
            channels,
        }
    }

    fn message_path(handle: &MessageHandle) -> String {
        format!(
            "/channels/{}/messages/{}",
            handle.channel_id, handle.message_id
        )
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", self.config.authorization())
            .header("User-Agent", USER_AGENT)
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base, path)
    }

    /// Turn a non-2xx response into a [`ChatError`].
    async fn error_from_response(route: String, response: Response) -> ChatError {
        let status = response.status();
        let body: ApiErrorBody = response.json().await.unwrap_or_default();

        if status == StatusCode::TOO_MANY_REQUESTS {
            ChatError::RateLimited {
                route,
                retry_after: body.retry_after.unwrap_or_default(),
                global: body.global,
            }
        } else {
            ChatError::Http {
                route,
                status: status.as_u16(),
                code: body.code,
                message: body.message,
            }
        }
    }

    async fn expect_success(route: String, response: Response) -> Result<(), ChatError> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from_response(route, response).await)
        }
    }
}

#[async_trait]
impl ChatClient for DiscordChatClient {
    async fn resolve(&self, channel_id: u64, message_id: u64) -> Result<Resolution, ChatError> {
        debug!(channel_id, "Getting Discord channel");
        if !self.channels.contains(channel_id) {
            warn!(channel_id, "Discord channel not found");
            return Ok(Resolution::ChannelNotFound);
        }

        let handle = MessageHandle {
            channel_id,
            message_id,
        };
        let path = Self::message_path(&handle);
        debug!(message_id, "Fetching Discord message");
        let response = self
            .request(self.client.get(self.url(&path)))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            warn!(channel_id, message_id, "Discord message not found");
            return Ok(Resolution::MessageNotFound);
        }
        Self::expect_success(format!("GET {path}"), response).await?;
        Ok(Resolution::Found(handle))
    }

    async fn delete(&self, handle: &MessageHandle) -> Result<(), ChatError> {
        let path = Self::message_path(handle);
        let response = self
            .request(self.client.delete(self.url(&path)))
            .send()
            .await?;
        Self::expect_success(format!("DELETE {path}"), response).await
    }

    async fn react(&self, handle: &MessageHandle, reaction: Reaction) -> Result<(), ChatError> {
        let path = format!(
            "{}/reactions/{}/@me",
            Self::message_path(handle),
            urlencoding::encode(reaction.emoji())
        );
        let response = self
            .request(self.client.put(self.url(&path)))
            .body("")
            .send()
            .await?;
        Self::expect_success(format!("PUT {path}"), response).await
    }
}
