//! Discord gateway session.
//!
//! Opens one websocket per shard, keeps each alive with heartbeats, and
//! tracks which channels the bot can see. The session is reported live
//! through [`SessionReadiness`] once every shard has received READY and the
//! guilds it announced.

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::cache::ChannelCache;
use super::discord::DiscordConfig;
use super::types::ChatError;
use crate::readiness::SessionReadiness;

/// Intents: GUILDS (1) | GUILD_MESSAGES (512) | MESSAGE_CONTENT (32768)
const GATEWAY_INTENTS: u64 = 1 | 512 | 32768;
const DEFAULT_HEARTBEAT_MS: u64 = 41250;
/// How long a shard waits for announced guilds before declaring itself ready.
const GUILD_READY_TIMEOUT: Duration = Duration::from_secs(2);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// Discord allows one IDENTIFY per bucket every five seconds.
const IDENTIFY_INTERVAL: Duration = Duration::from_secs(5);
/// Close codes after which reconnecting cannot succeed.
const FATAL_CLOSE_CODES: [u16; 6] = [4004, 4010, 4011, 4012, 4013, 4014];

const OP_DISPATCH: u64 = 0;
const OP_HEARTBEAT: u64 = 1;
const OP_IDENTIFY: u64 = 2;
const OP_RECONNECT: u64 = 7;
const OP_INVALID_SESSION: u64 = 9;
const OP_HELLO: u64 = 10;
const OP_HEARTBEAT_ACK: u64 = 11;

type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// Sharded gateway session feeding a [`ChannelCache`].
pub struct DiscordGateway {
    config: DiscordConfig,
    client: Client,
    channels: ChannelCache,
    readiness: SessionReadiness,
}

struct GatewayInfo {
    url: String,
    max_concurrency: u32,
}

impl DiscordGateway {
    pub fn new(config: DiscordConfig, channels: ChannelCache, readiness: SessionReadiness) -> Self {
        Self {
            config,
            client: Client::new(),
            channels,
            readiness,
        }
    }

    /// Validate the token, then spawn one task per shard.
    ///
    /// Errors here (bad token, platform unreachable) happen before any shard
    /// connects. Later failures surface through [`SessionReadiness`].
    pub async fn start(self) -> Result<Vec<JoinHandle<()>>, ChatError> {
        let gateway = self.fetch_gateway().await?;
        let shard_count = self.config.shard_count.max(1);
        info!(
            url = %gateway.url,
            shards = shard_count,
            "Connecting to Discord gateway"
        );

        let states = Arc::new(ShardStates::new(shard_count, self.readiness.clone()));
        let max_concurrency = gateway.max_concurrency.max(1);

        let handles = (0..shard_count)
            .map(|shard_id| {
                let session = ShardSession {
                    shard_id,
                    shard_count,
                    url: gateway.url.clone(),
                    token: self.config.bot_token.clone(),
                    channels: self.channels.clone(),
                    states: states.clone(),
                };
                let stagger = IDENTIFY_INTERVAL * (shard_id / max_concurrency);
                tokio::spawn(async move {
                    tokio::time::sleep(stagger).await;
                    session.run().await;
                })
            })
            .collect();

        Ok(handles)
    }

    async fn fetch_gateway(&self) -> Result<GatewayInfo, ChatError> {
        let route = "GET /gateway/bot".to_string();
        let response = self
            .client
            .get(format!("{}/gateway/bot", self.config.api_base))
            .header("Authorization", self.config.authorization())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or_default();
            return Err(ChatError::Http {
                route,
                status: status.as_u16(),
                code: body["code"].as_u64().unwrap_or_default(),
                message: body["message"].as_str().unwrap_or_default().to_string(),
            });
        }

        let body: Value = response.json().await?;
        let url = body["url"]
            .as_str()
            .ok_or_else(|| ChatError::Protocol("missing 'url' in gateway response".into()))?;
        Ok(GatewayInfo {
            url: format!("{}/?v=10&encoding=json", url),
            max_concurrency: body["session_start_limit"]["max_concurrency"]
                .as_u64()
                .unwrap_or(1) as u32,
        })
    }
}

/// Ready flags of every shard, folded into one [`SessionReadiness`].
struct ShardStates {
    ready: Mutex<Vec<bool>>,
    readiness: SessionReadiness,
}

impl ShardStates {
    fn new(shard_count: u32, readiness: SessionReadiness) -> Self {
        Self {
            ready: Mutex::new(vec![false; shard_count as usize]),
            readiness,
        }
    }

    fn set(&self, shard_id: u32, ready: bool) {
        let mut flags = self.ready.lock();
        if let Some(flag) = flags.get_mut(shard_id as usize) {
            *flag = ready;
        }
        if flags.iter().all(|ready| *ready) {
            self.readiness.mark_live();
        } else {
            self.readiness.mark_lost();
        }
    }

    fn fail(&self, reason: String) {
        self.readiness.mark_failed(reason);
    }
}

/// Progress of one shard towards ready, plus channel bookkeeping.
#[derive(Debug)]
struct ShardProgress {
    shard_id: u32,
    shard_count: u32,
    ready_received: bool,
    pending_guilds: HashSet<u64>,
    ready: bool,
}

impl ShardProgress {
    fn new(shard_id: u32, shard_count: u32) -> Self {
        Self {
            shard_id,
            shard_count,
            ready_received: false,
            pending_guilds: HashSet::new(),
            ready: false,
        }
    }

    /// Apply one dispatch event. Returns true when the shard just became ready.
    fn apply(&mut self, event: &str, data: &Value, channels: &ChannelCache) -> bool {
        match event {
            "READY" => {
                self.ready_received = true;
                self.pending_guilds = data["guilds"]
                    .as_array()
                    .map(|guilds| guilds.iter().filter_map(|g| snowflake(&g["id"])).collect())
                    .unwrap_or_default();
                // Guilds left while this shard was away are absent from READY
                let (shard_id, shard_count) = (self.shard_id, self.shard_count);
                let announced = &self.pending_guilds;
                channels.retain_guilds(|guild_id| {
                    shard_for_guild(guild_id, shard_count) != shard_id
                        || announced.contains(&guild_id)
                });
            }
            "GUILD_CREATE" => {
                if let Some(guild_id) = snowflake(&data["id"]) {
                    for key in ["channels", "threads"] {
                        for channel in data[key].as_array().into_iter().flatten() {
                            if let Some(channel_id) = snowflake(&channel["id"]) {
                                channels.insert(channel_id, guild_id);
                            }
                        }
                    }
                    self.pending_guilds.remove(&guild_id);
                }
            }
            "GUILD_DELETE" => {
                if let Some(guild_id) = snowflake(&data["id"]) {
                    channels.remove_guild(guild_id);
                    self.pending_guilds.remove(&guild_id);
                }
            }
            "CHANNEL_CREATE" | "CHANNEL_UPDATE" | "THREAD_CREATE" | "THREAD_UPDATE" => {
                if let (Some(channel_id), Some(guild_id)) =
                    (snowflake(&data["id"]), snowflake(&data["guild_id"]))
                {
                    channels.insert(channel_id, guild_id);
                }
            }
            "CHANNEL_DELETE" | "THREAD_DELETE" => {
                if let Some(channel_id) = snowflake(&data["id"]) {
                    channels.remove(channel_id);
                }
            }
            _ => {}
        }

        if !self.ready && self.ready_received && self.pending_guilds.is_empty() {
            self.ready = true;
            return true;
        }
        false
    }

    /// Stop waiting for guilds that never arrived.
    fn force_ready(&mut self) -> bool {
        if self.ready || !self.ready_received {
            return false;
        }
        self.ready = true;
        true
    }

    fn waiting_for_guilds(&self) -> bool {
        self.ready_received && !self.ready
    }
}

/// Shard that receives events for `guild_id`.
fn shard_for_guild(guild_id: u64, shard_count: u32) -> u32 {
    ((guild_id >> 22) % u64::from(shard_count.max(1))) as u32
}

fn snowflake(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

enum SessionEnd {
    Reconnect,
    Fatal(String),
}

struct ShardSession {
    shard_id: u32,
    shard_count: u32,
    url: String,
    token: String,
    channels: ChannelCache,
    states: Arc<ShardStates>,
}

impl ShardSession {
    async fn run(self) {
        loop {
            match self.connect_once().await {
                Ok(SessionEnd::Reconnect) => {
                    warn!(shard_id = self.shard_id, "Discord gateway connection ended");
                }
                Ok(SessionEnd::Fatal(reason)) => {
                    error!(shard_id = self.shard_id, %reason, "Discord gateway rejected session");
                    self.states.fail(reason);
                    return;
                }
                Err(e) => {
                    warn!(shard_id = self.shard_id, error = %e, "Discord gateway connection failed");
                }
            }
            self.states.set(self.shard_id, false);
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn connect_once(&self) -> Result<SessionEnd, ChatError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        let (ws_write, mut ws_read) = ws_stream.split();
        let writer = Arc::new(tokio::sync::Mutex::new(ws_write));

        // Hello (opcode 10) carries the heartbeat interval
        let hello = match ws_read.next().await {
            Some(msg) => parse_payload(&msg?)?,
            None => return Ok(SessionEnd::Reconnect),
        };
        if hello["op"].as_u64() != Some(OP_HELLO) {
            return Err(ChatError::Protocol(format!("expected Hello, got {hello}")));
        }
        let heartbeat_ms = hello["d"]["heartbeat_interval"]
            .as_u64()
            .unwrap_or(DEFAULT_HEARTBEAT_MS);
        debug!(shard_id = self.shard_id, heartbeat_ms, "Discord heartbeat interval");

        send(&writer, self.identify_payload()).await?;

        let sequence = Arc::new(AtomicI64::new(-1));
        let heartbeat = tokio::spawn(heartbeat_loop(
            writer.clone(),
            sequence.clone(),
            Duration::from_millis(heartbeat_ms),
        ));
        let _heartbeat = scopeguard::guard(heartbeat, |handle| handle.abort());

        let mut progress = ShardProgress::new(self.shard_id, self.shard_count);

        loop {
            let next = if progress.waiting_for_guilds() {
                match tokio::time::timeout(GUILD_READY_TIMEOUT, ws_read.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        if progress.force_ready() {
                            info!(
                                shard_id = self.shard_id,
                                missing = progress.pending_guilds.len(),
                                "Discord shard ready without all guilds"
                            );
                            self.states.set(self.shard_id, true);
                        }
                        continue;
                    }
                }
            } else {
                ws_read.next().await
            };

            let msg = match next {
                Some(msg) => msg?,
                None => return Ok(SessionEnd::Reconnect),
            };

            let payload = match msg {
                WsMessage::Text(_) => parse_payload(&msg)?,
                WsMessage::Close(frame) => {
                    if let Some(frame) = frame {
                        let code = u16::from(frame.code);
                        if FATAL_CLOSE_CODES.contains(&code) {
                            return Ok(SessionEnd::Fatal(format!(
                                "close code {code}: {}",
                                frame.reason.as_str()
                            )));
                        }
                        debug!(shard_id = self.shard_id, code, "Discord gateway closed");
                    }
                    return Ok(SessionEnd::Reconnect);
                }
                _ => continue,
            };

            match payload["op"].as_u64() {
                Some(OP_DISPATCH) => {
                    if let Some(seq) = payload["s"].as_i64() {
                        sequence.store(seq, Ordering::SeqCst);
                    }
                    let event = payload["t"].as_str().unwrap_or_default();
                    if progress.apply(event, &payload["d"], &self.channels) {
                        info!(
                            shard_id = self.shard_id,
                            channels = self.channels.len(),
                            "Discord shard ready"
                        );
                        self.states.set(self.shard_id, true);
                    }
                }
                Some(OP_HEARTBEAT) => {
                    send(&writer, heartbeat_payload(&sequence)).await?;
                }
                Some(OP_RECONNECT) | Some(OP_INVALID_SESSION) => {
                    debug!(shard_id = self.shard_id, "Discord requested reconnect");
                    return Ok(SessionEnd::Reconnect);
                }
                Some(OP_HEARTBEAT_ACK) => {}
                other => {
                    debug!(shard_id = self.shard_id, op = ?other, "Ignoring gateway payload");
                }
            }
        }
    }

    fn identify_payload(&self) -> Value {
        json!({
            "op": OP_IDENTIFY,
            "d": {
                "token": self.token,
                "intents": GATEWAY_INTENTS,
                "shard": [self.shard_id, self.shard_count],
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "prediction-consumer",
                    "device": "prediction-consumer"
                }
            }
        })
    }
}

fn parse_payload(msg: &WsMessage) -> Result<Value, ChatError> {
    let text = msg.to_text()?;
    serde_json::from_str(text).map_err(|e| ChatError::Protocol(e.to_string()))
}

fn heartbeat_payload(sequence: &AtomicI64) -> Value {
    let seq = sequence.load(Ordering::SeqCst);
    let last = if seq >= 0 { json!(seq) } else { Value::Null };
    json!({ "op": OP_HEARTBEAT, "d": last })
}

async fn send(writer: &tokio::sync::Mutex<WsWriter>, payload: Value) -> Result<(), ChatError> {
    writer
        .lock()
        .await
        .send(WsMessage::Text(payload.to_string().into()))
        .await?;
    Ok(())
}

async fn heartbeat_loop(
    writer: Arc<tokio::sync::Mutex<WsWriter>>,
    sequence: Arc<AtomicI64>,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately
    interval.tick().await;
    loop {
        interval.tick().await;
        if let Err(e) = send(&writer, heartbeat_payload(&sequence)).await {
            warn!("Discord heartbeat failed: {}", e);
            break;
        }
    }
}
