//! Engine configuration
//!
//! Defaults reproduce the stock server look: the logo header, the
//! players/ping/TPS footer and the ten-line sidebar. The binary overrides the
//! timing values from its command line.

use crate::board::BoardLayout;
use crate::tab::TabTemplate;
use std::time::Duration;

/// Resource pack glyph shown as the tab header and sidebar title
pub const LOGO: &str = "\u{E000}";

/// Address shown at the bottom of the sidebar
pub const DEFAULT_SERVER_ADDRESS: &str = "ᴘʟᴀʏ.ᴋᴇʀɴᴇʟ.ɢᴀᴍᴇѕ";

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Longest a single attribute lookup may take before it degrades to ""
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub refresh_interval: Duration,
    pub lookup_timeout: Duration,
    pub tab: TabTemplate,
    pub board: BoardLayout,
}

impl EngineConfig {
    /// Default configuration with a different address on the sidebar
    pub fn with_server_address(address: &str) -> Self {
        Self {
            board: BoardLayout::standard(address),
            ..Self::default()
        }
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            tab: TabTemplate::default(),
            board: BoardLayout::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.refresh_interval, Duration::from_secs(1));
        assert!(config.lookup_timeout < config.refresh_interval);
        assert_eq!(config.board.title, LOGO);
        assert_eq!(config.board.lines.len(), 10);
    }

    #[test]
    fn test_custom_server_address() {
        let config = EngineConfig::with_server_address("play.example.net")
            .refresh_interval(Duration::from_millis(200));

        let address = config.board.lines.iter().find(|l| l.key == "address").unwrap();
        assert_eq!(address.dynamic_value.as_deref(), Some("play.example.net"));
        assert_eq!(config.refresh_interval, Duration::from_millis(200));
    }
}
