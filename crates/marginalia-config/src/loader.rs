// SPDX-FileCopyrightText: 2026 Marginalia Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./marginalia.toml` > `~/.config/marginalia/marginalia.toml`
//! > `/etc/marginalia/marginalia.toml` with environment variable overrides via
//! `MARGINALIA_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::MarginaliaConfig;

/// Top-level sections, used to turn `MARGINALIA_QUOTA_FREE_DAILY_LIMIT`
/// into `quota.free_daily_limit`.
const SECTIONS: &[&str] = &[
    "server",
    "backend",
    "completion",
    "quota",
    "tools",
    "relay",
    "logging",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/marginalia/marginalia.toml` (system-wide)
/// 3. `~/.config/marginalia/marginalia.toml` (user XDG config)
/// 4. `./marginalia.toml` (local directory)
/// 5. `MARGINALIA_*` environment variables
pub fn load_config() -> Result<MarginaliaConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<MarginaliaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MarginaliaConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<MarginaliaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MarginaliaConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(MarginaliaConfig::default()))
        .merge(Toml::file("/etc/marginalia/marginalia.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("marginalia/marginalia.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("marginalia.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider with explicit section mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` so that
/// `MARGINALIA_QUOTA_FREE_DAILY_LIMIT` maps to `quota.free_daily_limit`,
/// not `quota.free.daily.limit`.
fn env_provider() -> Env {
    Env::prefixed("MARGINALIA_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env var name to a dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
