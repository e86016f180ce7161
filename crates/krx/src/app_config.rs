//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." - every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! 🧠 Knowledge graph:
//! - `ConnectionConfig` feeds `HttpTransport` (url, auth, timeouts).
//! - `BulkConfig` is the middle layer of bulk threshold precedence:
//!   explicit `BulkOptions` > `Settings.bulk` > the built-in defaults below.
//! - `ScrollConfig` is where `ScrollBatches` gets its batch size and cursor timeout
//!   when the caller does not say.

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// 📦 Settings: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    /// 📡 Where the engine lives and how we knock on its door.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// 🗑️ Flush thresholds for bulk scopes.
    #[serde(default)]
    pub bulk: BulkConfig,
    /// 🔄 Defaults for scroll iteration.
    #[serde(default)]
    pub scroll: ScrollConfig,
}

/// 📡 Connection settings. Auth is tri-modal: api_key, username+password, or
/// "I hope anonymous works". api_key wins when both are present.
#[derive(Debug, Deserialize, Clone)]
pub struct ConnectionConfig {
    /// 📡 Base URL of the engine. Include scheme + port. Yes, all of it.
    #[serde(default = "default_url")]
    pub url: String,
    /// 🔒 Username for basic auth.
    #[serde(default)]
    pub username: Option<String>,
    /// 🔒 Password. "password123" is not a password. It is a confession.
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 API key: the velvet rope variant of authentication.
    #[serde(default)]
    pub api_key: Option<String>,
    /// ⏱️ TCP connect deadline.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// ⏱️ Whole-request deadline unless a criteria overrides it with `http_timeout`.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_url() -> String {
    "http://127.0.0.1:9200".to_string()
}

// 🔧 10 seconds to handshake. if the cluster can't say hi in 10s, it's not having a good time.
fn default_connect_timeout_secs() -> u64 {
    10
}

// 🔧 30 seconds per request. bulk bodies get meaty and we're not monsters.
fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: None,
            password: None,
            api_key: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// 🗑️ Process-wide bulk defaults. A bulk scope flushes when either one is reached.
#[derive(Debug, Deserialize, Clone)]
pub struct BulkConfig {
    /// 📦 Max buffered operations per `_bulk` call.
    #[serde(default = "default_bulk_max_items")]
    pub max_items: usize,
    /// 📦 Max buffered NDJSON bytes per `_bulk` call.
    #[serde(default = "default_bulk_max_bytes")]
    pub max_bytes: usize,
}

fn default_bulk_max_items() -> usize {
    1000
}

// 📦 100 MiB, the engine's default http.max_content_length. we stay on the right side of the 413.
fn default_bulk_max_bytes() -> usize {
    100 * 1024 * 1024
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            max_items: default_bulk_max_items(),
            max_bytes: default_bulk_max_bytes(),
        }
    }
}

/// 🔄 Scroll iteration defaults.
#[derive(Debug, Deserialize, Clone)]
pub struct ScrollConfig {
    /// 📦 Hits per scroll page.
    #[serde(default = "default_scroll_batch_size")]
    pub batch_size: u64,
    /// ⏱️ How long the engine keeps the cursor alive between pages.
    #[serde(default = "default_scroll_timeout")]
    pub timeout: String,
}

fn default_scroll_batch_size() -> u64 {
    1000
}

fn default_scroll_timeout() -> String {
    "1m".to_string()
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            batch_size: default_scroll_batch_size(),
            timeout: default_scroll_timeout(),
        }
    }
}

/// 🚀 Load the settings from env vars, with an optional TOML file on top.
///
/// 🔧 Merges environment variables (`KRX_*`, nested with `__`, e.g.
/// `KRX_CONNECTION__URL`) with an optional TOML file. TOML wins on conflicts.
///   - `config_file_name` is None  → env vars only.
///   - `config_file_name` is Some  → env vars + TOML file, merged.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<Settings> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("KRX_").split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (KRX_*). \
             The file exists in our hearts, but apparently not on disk.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (KRX_*). \
                 No file was provided, this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}
