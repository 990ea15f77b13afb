use serde::Deserialize;

/// Tunables for the core services.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Refuse to open a conversation between users who are not connected.
    pub require_connection_for_messaging: bool,
    /// Longest accepted message, in characters.
    pub max_message_len: usize,
    /// Change events buffered per subscriber before it lags.
    pub notifier_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            require_connection_for_messaging: false,
            max_message_len: 4000,
            notifier_capacity: 1024,
        }
    }
}
