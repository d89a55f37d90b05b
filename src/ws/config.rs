#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::backoff::Constant;

const DEFAULT_RECONNECT_DELAY_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_MESSAGE_CAPACITY: usize = 1024;

/// Configuration for WebSocket client behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    /// Reconnection strategy configuration
    pub reconnect: ReconnectConfig,
    /// Capacity of the broadcast channel feeding [`subscribe`](super::ConnectionManager::subscribe)
    /// receivers. Receivers that fall further behind than this observe a lag error.
    /// A capacity of `0` is treated as `1`, since the channel needs room for one message.
    pub message_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            message_capacity: DEFAULT_MESSAGE_CAPACITY,
        }
    }
}

/// Configuration for automatic reconnection behavior.
///
/// Reconnects happen at a fixed interval after every close, without growth between
/// attempts.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive reconnection attempts before giving up.
    /// `None` means infinite retries. The count resets whenever a connection opens.
    pub max_attempts: Option<u32>,
    /// Delay between a close and the next connection attempt
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None, // Infinite reconnection by default
            delay: DEFAULT_RECONNECT_DELAY_DURATION,
        }
    }
}

impl From<ReconnectConfig> for Constant {
    fn from(config: ReconnectConfig) -> Self {
        Constant::new(config.delay)
    }
}
