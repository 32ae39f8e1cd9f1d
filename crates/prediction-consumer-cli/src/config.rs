//! Turns parsed arguments into the settings each component needs.

use std::time::Duration;
use thiserror::Error;

use prediction_consumer_core::broker::CONSUMER_GROUP;
use prediction_consumer_core::{BrokerConfig, DiscordConfig, DispatcherConfig};

use crate::cli::Cli;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DISCORD_TOKEN is not set")]
    MissingToken,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub discord: DiscordConfig,
    pub broker: BrokerConfig,
    pub dispatcher: DispatcherConfig,
}

impl Settings {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let mut discord = DiscordConfig::new(cli.discord_token.clone().unwrap_or_default())
            .with_shard_count(cli.shard_count);
        if let Some(api_base) = &cli.discord_api_base {
            discord = discord.with_api_base(api_base.as_str());
        }
        if !discord.is_configured() {
            return Err(ConfigError::MissingToken);
        }

        let broker = BrokerConfig {
            bootstrap_servers: cli.kafka_broker.clone(),
            topic: cli.kafka_topic.clone(),
            group_id: CONSUMER_GROUP.to_string(),
            warm_up: Duration::from_secs(cli.wait_for_kafka),
            ..BrokerConfig::default()
        };

        let dispatcher = DispatcherConfig {
            debug_mode: cli.debug_mode,
            action_delay: Duration::from_millis(cli.action_delay_ms),
        };

        Ok(Self {
            discord,
            broker,
            dispatcher,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["prediction-consumer"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_settings_from_flags() {
        let cli = parse(&[
            "--discord-token",
            "secret",
            "--kafka-broker",
            "kafka:29092",
            "--kafka-topic",
            "predictions",
            "--debug-mode",
            "yes",
            "--wait-for-kafka",
            "0",
            "--shard-count",
            "1",
            "--action-delay-ms",
            "250",
        ]);
        let settings = Settings::from_cli(&cli).unwrap();

        assert_eq!(settings.discord.bot_token, "secret");
        assert_eq!(settings.discord.api_base, "https://discord.com/api/v10");
        assert_eq!(settings.discord.shard_count, 1);
        assert_eq!(settings.broker.bootstrap_servers, "kafka:29092");
        assert_eq!(settings.broker.topic, "predictions");
        assert_eq!(settings.broker.group_id, "prediction-consumer");
        assert_eq!(settings.broker.warm_up, Duration::ZERO);
        assert!(settings.dispatcher.debug_mode);
        assert_eq!(settings.dispatcher.action_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_api_base_override() {
        let cli = parse(&[
            "--discord-token",
            "secret",
            "--discord-api-base",
            "http://127.0.0.1:8080/api/",
        ]);
        let settings = Settings::from_cli(&cli).unwrap();
        assert_eq!(settings.discord.api_base, "http://127.0.0.1:8080/api");
    }

    #[test]
    fn test_empty_token_is_rejected() {
        let cli = parse(&["--discord-token", ""]);
        assert!(matches!(
            Settings::from_cli(&cli),
            Err(ConfigError::MissingToken)
        ));
    }
}
