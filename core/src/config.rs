/// Configuration for the synchronization engine and its clients
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PAGE_SIZE: u32 = 15;
const DEFAULT_CACHE_MAX_MESSAGES: usize = 500;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the pull (pagination) API
    pub api_base_url: String,

    /// Websocket URL of the live push channel
    pub ws_url: String,

    /// Page size used for history fetches
    pub page_size: u32,

    /// Fixed delay between reconnect attempts after a transport drop
    pub reconnect_backoff: Duration,

    /// Per-conversation cap on cached messages (newest kept)
    pub cache_max_messages: usize,

    /// Data directory for the local conversation cache
    pub data_dir: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:7404".to_string(),
            ws_url: "ws://localhost:7404/ws".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            reconnect_backoff: Duration::from_secs(3),
            cache_max_messages: DEFAULT_CACHE_MAX_MESSAGES,
            data_dir: PathBuf::from(".pairchat"),
        }
    }
}

impl SyncConfig {
    /// Config pointed at a different backend, defaults elsewhere
    pub fn for_backend(api_base_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ws_url: ws_url.into(),
            ..Default::default()
        }
    }
}
