use std::{env, str::FromStr};

use testing_framework_core::IS_DEBUG_TRACING;
use tracing_subscriber::{EnvFilter, fmt};

pub const DEFAULT_USERS: usize = 10;
pub const DEFAULT_SEAL_MILLIS: u64 = 100;
pub const DEFAULT_TARGET_UNITS: u128 = 100;

pub fn init_tracing() {
    let default_level = if *IS_DEBUG_TRACING { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}

/// Parsed value of `key`, falling back to `default` when unset or malformed.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, raw = %raw, "ignoring malformed value");
            default
        }),
        Err(_) => default,
    }
}
