// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as valid bind addresses, parseable URLs, and non-zero concurrency.

use crate::diagnostic::ConfigError;
use crate::model::{MarginaliaConfig, QuotaBackend};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &MarginaliaConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let host = config.server.host.trim();
    if host.is_empty() {
        fail("server.host must not be empty".to_string());
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            fail(format!(
                "server.host `{host}` is not a valid IP address or hostname"
            ));
        }
    }

    for (key, url) in [
        ("backend.base_url", &config.backend.base_url),
        ("completion.base_url", &config.completion.base_url),
    ] {
        let ok = url.starts_with("http://") || url.starts_with("https://");
        if !ok {
            fail(format!("{key} must be an http(s) URL, got `{url}`"));
        }
    }

    if !config.backend.notes_path.contains("{book_id}") {
        fail(format!(
            "backend.notes_path must contain the `{{book_id}}` placeholder, got `{}`",
            config.backend.notes_path
        ));
    }

    if config.backend.timeout_secs == 0 {
        fail("backend.timeout_secs must be at least 1".to_string());
    }

    if !(0.0..=2.0).contains(&config.completion.temperature) {
        fail(format!(
            "completion.temperature must be between 0.0 and 2.0, got {}",
            config.completion.temperature
        ));
    }

    if config.quota.store == QuotaBackend::Sqlite && config.quota.database_path.trim().is_empty()
    {
        fail("quota.database_path must not be empty when quota.store = \"sqlite\"".to_string());
    }

    if config.tools.fanout_concurrency == 0 {
        fail("tools.fanout_concurrency must be at least 1".to_string());
    }

    if config.tools.fanout_timeout_secs == 0 {
        fail("tools.fanout_timeout_secs must be at least 1".to_string());
    }

    if config.tools.max_keywords == Some(0) {
        fail("tools.max_keywords must be at least 1 when set".to_string());
    }

    if config.relay.channel_capacity == 0 {
        fail("relay.channel_capacity must be at least 1".to_string());
    }

    if config.relay.keepalive_sentinel.trim().is_empty() {
        fail("relay.keepalive_sentinel must not be empty".to_string());
    }

    let level = config.logging.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        fail(format!(
            "logging.level `{}` is not one of {}",
            config.logging.level,
            LOG_LEVELS.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
