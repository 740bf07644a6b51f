// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for marginalia.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level marginalia configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MarginaliaConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Reading-notes backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Chat completion API settings.
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Daily quota settings.
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Question analysis and tool execution settings.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Chat relay streaming settings.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind the server to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS. Empty means any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origins: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3080
}

/// Reading-notes backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL of the backend REST API.
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Path of the bookshelf listing endpoint.
    #[serde(default = "default_books_path")]
    pub books_path: String,

    /// Path of the per-book notes endpoint. `{book_id}` is substituted.
    #[serde(default = "default_notes_path")]
    pub notes_path: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            books_path: default_books_path(),
            notes_path: default_notes_path(),
            timeout_secs: default_backend_timeout_secs(),
        }
    }
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_books_path() -> String {
    "/api/books".to_string()
}

fn default_notes_path() -> String {
    "/api/books/{book_id}/notes".to_string()
}

fn default_backend_timeout_secs() -> u64 {
    15
}

/// Chat completion API configuration (OpenAI-compatible).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CompletionConfig {
    /// API key. `None` requires `MARGINALIA_COMPLETION_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL; `/chat/completions` is appended.
    #[serde(default = "default_completion_url")]
    pub base_url: String,

    /// Model identifier sent with every request.
    #[serde(default = "default_completion_model")]
    pub model: String,

    /// Maximum tokens to generate per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Optional system prompt prepended when the conversation has none.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Overall request timeout in seconds (covers the whole stream).
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_completion_url(),
            model: default_completion_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: None,
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

fn default_completion_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_completion_model() -> String {
    "deepseek/deepseek-chat".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.7
}

fn default_completion_timeout_secs() -> u64 {
    300
}

/// Where daily counters are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaBackend {
    /// Process memory; resets on restart.
    #[default]
    Memory,
    /// SQLite file at `quota.database_path`.
    Sqlite,
}

/// Which clock decides when a new quota day starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DayBoundary {
    #[default]
    Utc,
    Local,
}

/// Daily quota configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaConfig {
    /// Daily chat allowance for FREE members and unauthenticated callers.
    #[serde(default = "default_free_daily_limit")]
    pub free_daily_limit: u32,

    /// Daily chat allowance for PLUS members. PRO is always unlimited.
    #[serde(default = "default_plus_daily_limit")]
    pub plus_daily_limit: u32,

    /// Counter storage.
    #[serde(default)]
    pub store: QuotaBackend,

    /// SQLite file used when `store = "sqlite"`.
    #[serde(default = "default_quota_database_path")]
    pub database_path: String,

    /// Day rollover clock.
    #[serde(default)]
    pub day_boundary: DayBoundary,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free_daily_limit: default_free_daily_limit(),
            plus_daily_limit: default_plus_daily_limit(),
            store: QuotaBackend::default(),
            database_path: default_quota_database_path(),
            day_boundary: DayBoundary::default(),
        }
    }
}

fn default_free_daily_limit() -> u32 {
    10
}

fn default_plus_daily_limit() -> u32 {
    10
}

fn default_quota_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("marginalia").join("quota.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("quota.db"))
        .to_string_lossy()
        .into_owned()
}

/// Question analysis and tool execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Enable tool augmentation. When false, chat requests are relayed as-is.
    #[serde(default = "default_tools_enabled")]
    pub enabled: bool,

    /// TOML file replacing the built-in trigger phrase tables.
    #[serde(default)]
    pub triggers_file: Option<String>,

    /// Maximum number of keywords turned into tool calls. `None` = no cap.
    #[serde(default)]
    pub max_keywords: Option<usize>,

    /// Concurrent per-book note fetches during a library-wide note search.
    #[serde(default = "default_fanout_concurrency")]
    pub fanout_concurrency: usize,

    /// Deadline in seconds for a library-wide note search.
    #[serde(default = "default_fanout_timeout_secs")]
    pub fanout_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: default_tools_enabled(),
            triggers_file: None,
            max_keywords: None,
            fanout_concurrency: default_fanout_concurrency(),
            fanout_timeout_secs: default_fanout_timeout_secs(),
        }
    }
}

fn default_tools_enabled() -> bool {
    true
}

fn default_fanout_concurrency() -> usize {
    4
}

fn default_fanout_timeout_secs() -> u64 {
    30
}

/// Chat relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Pause in milliseconds after each tool status frame.
    #[serde(default = "default_status_pacing_ms")]
    pub status_pacing_ms: u64,

    /// Upstream line dropped from the relayed stream.
    #[serde(default = "default_keepalive_sentinel")]
    pub keepalive_sentinel: String,

    /// Consume one quota unit after each completed chat turn.
    #[serde(default = "default_charge_quota")]
    pub charge_quota: bool,

    /// Capacity of the channel between the relay task and the client.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            status_pacing_ms: default_status_pacing_ms(),
            keepalive_sentinel: default_keepalive_sentinel(),
            charge_quota: default_charge_quota(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_status_pacing_ms() -> u64 {
    300
}

fn default_keepalive_sentinel() -> String {
    ": OPENROUTER PROCESSING".to_string()
}

fn default_charge_quota() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    64
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
