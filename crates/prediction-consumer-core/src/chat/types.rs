//! Chat adapter types.

use std::fmt;
use thiserror::Error;

/// A message that was confirmed to exist at resolve time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle {
    pub channel_id: u64,
    pub message_id: u64,
}

/// Outcome of looking a message up on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Found(MessageHandle),
    /// The channel is not visible to this session.
    ChannelNotFound,
    /// The channel exists but the message does not (anymore).
    MessageNotFound,
}

impl Resolution {
    pub fn handle(&self) -> Option<MessageHandle> {
        match self {
            Self::Found(handle) => Some(*handle),
            Self::ChannelNotFound | Self::MessageNotFound => None,
        }
    }
}

/// Reaction added in debug mode instead of deleting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reaction {
    /// U+26D4 NO ENTRY
    Blocked,
    /// U+2705 WHITE HEAVY CHECK MARK
    Approved,
}

impl Reaction {
    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Blocked => "\u{26D4}",
            Self::Approved => "\u{2705}",
        }
    }
}

impl fmt::Display for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocked => f.write_str("blocked"),
            Self::Approved => f.write_str("approved"),
        }
    }
}

/// Errors returned by the chat platform.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("rate limited on {route} (retry after {retry_after}s, global: {global})")]
    RateLimited {
        route: String,
        retry_after: f64,
        global: bool,
    },

    #[error("HTTP {status} on {route}: {message} (code {code})")]
    Http {
        route: String,
        status: u16,
        code: u64,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway error: {0}")]
    Gateway(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("unexpected gateway payload: {0}")]
    Protocol(String),
}

impl ChatError {
    /// HTTP status of the failed call, if the platform answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { .. } => Some(429),
            Self::Http { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|s| s.as_u16()),
            Self::Gateway(_) | Self::Protocol(_) => None,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reaction_emoji() {
        assert_eq!(Reaction::Blocked.emoji(), "⛔");
        assert_eq!(Reaction::Approved.emoji(), "✅");
        assert_eq!(Reaction::Blocked.to_string(), "blocked");
    }

    #[test]
    fn test_resolution_handle() {
        let handle = MessageHandle {
            channel_id: 1,
            message_id: 2,
        };
        assert_eq!(Resolution::Found(handle).handle(), Some(handle));
        assert_eq!(Resolution::ChannelNotFound.handle(), None);
        assert_eq!(Resolution::MessageNotFound.handle(), None);
    }

    #[test]
    fn test_error_status() {
        let limited = ChatError::RateLimited {
            route: "DELETE /channels/1/messages/2".into(),
            retry_after: 1.5,
            global: false,
        };
        assert_eq!(limited.status(), Some(429));
        assert!(limited.is_rate_limit());

        let forbidden = ChatError::Http {
            route: "PUT /reactions".into(),
            status: 403,
            code: 50013,
            message: "Missing Permissions".into(),
        };
        assert_eq!(forbidden.status(), Some(403));
        assert!(!forbidden.is_rate_limit());
    }
}
