use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use prediction_consumer_core::{
    ChannelCache, DiscordChatClient, DiscordGateway, KafkaRecordSource, ModerationDispatcher,
    ReadinessGate, SessionReadiness,
};

use crate::config::Settings;

/// Start the gateway, then run the gated dispatch loop until it fails, the
/// stream ends or a termination signal arrives.
pub async fn run(settings: Settings) -> Result<()> {
    let Settings {
        discord,
        broker,
        dispatcher,
    } = settings;

    info!(
        broker = %broker.bootstrap_servers,
        topic = %broker.topic,
        debug_mode = dispatcher.debug_mode,
        shards = discord.shard_count,
        "Starting prediction consumer"
    );

    let channels = ChannelCache::new();
    let readiness = SessionReadiness::new();

    let shards = DiscordGateway::new(discord.clone(), channels.clone(), readiness.clone())
        .start()
        .await
        .context("Failed to start Discord gateway")?;

    let chat = Arc::new(DiscordChatClient::new(discord, channels));
    let mut dispatcher = ModerationDispatcher::new(chat, dispatcher);
    let gate = ReadinessGate::new(readiness, broker.warm_up);

    let result = tokio::select! {
        result = gate.run(&mut dispatcher, || KafkaRecordSource::connect(&broker)) => {
            result.context("Prediction consumer stopped")
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    for shard in shards {
        shard.abort();
    }
    result
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
