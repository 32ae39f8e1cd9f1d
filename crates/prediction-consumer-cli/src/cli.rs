use clap::{ArgAction, Parser};
use std::path::PathBuf;

use prediction_consumer_core::broker::{DEFAULT_BROKER, DEFAULT_TOPIC};

#[derive(Parser, Debug)]
#[command(name = "prediction-consumer")]
#[command(
    version,
    about = "Applies toxicity predictions from Kafka to Discord messages"
)]
pub struct Cli {
    /// Also write logs to this file (rotated daily)
    #[arg(long, env = "LOG_PATH")]
    pub log_path: Option<PathBuf>,

    /// Discord bot token
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    pub discord_token: Option<String>,

    /// Discord REST base URL
    #[arg(long, env = "DISCORD_API_BASE", hide = true)]
    pub discord_api_base: Option<String>,

    /// Kafka bootstrap servers
    #[arg(long, env = "KAFKA_BROKER", default_value = DEFAULT_BROKER)]
    pub kafka_broker: String,

    /// Topic carrying model predictions
    #[arg(long, env = "KAFKA_TOPIC", default_value = DEFAULT_TOPIC)]
    pub kafka_topic: String,

    /// React to messages instead of deleting them
    #[arg(
        long,
        env = "DEBUG_MODE",
        default_value = "False",
        action = ArgAction::Set,
        value_parser = parse_flag,
    )]
    pub debug_mode: bool,

    /// Seconds to wait for the broker before connecting
    #[arg(long, env = "WAIT_FOR_KAFKA", default_value_t = 10)]
    pub wait_for_kafka: u64,

    /// Number of gateway shards
    #[arg(long, env = "DISCORD_SHARD_COUNT", default_value_t = 3)]
    pub shard_count: u32,

    /// Pause between resolving a message and acting on it, in milliseconds
    #[arg(long, env = "ACTION_DELAY_MS", default_value_t = 400)]
    pub action_delay_ms: u64,
}

/// Lenient boolean: `True`, `true`, `1` and `yes` are true, anything else is
/// false.
fn parse_flag(value: &str) -> Result<bool, std::convert::Infallible> {
    Ok(matches!(value.trim(), "True" | "true" | "1" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        for truthy in ["True", "true", "1", "yes", " true "] {
            assert_eq!(parse_flag(truthy), Ok(true), "{truthy}");
        }
        for falsy in ["False", "false", "0", "no", "TRUE", "", "on"] {
            assert_eq!(parse_flag(falsy), Ok(false), "{falsy}");
        }
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["prediction-consumer", "--discord-token", "abc"]).unwrap();
        assert_eq!(cli.discord_token.as_deref(), Some("abc"));
        assert_eq!(cli.kafka_broker, "localhost:9092");
        assert_eq!(cli.kafka_topic, "modelprediction");
        assert!(!cli.debug_mode);
        assert_eq!(cli.wait_for_kafka, 10);
        assert_eq!(cli.shard_count, 3);
        assert_eq!(cli.action_delay_ms, 400);
    }

    #[test]
    fn test_debug_mode_flag_takes_a_value() {
        let cli = Cli::try_parse_from(["prediction-consumer", "--debug-mode", "True"]).unwrap();
        assert!(cli.debug_mode);

        let cli = Cli::try_parse_from(["prediction-consumer", "--debug-mode", "nope"]).unwrap();
        assert!(!cli.debug_mode);
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
