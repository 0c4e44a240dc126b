use std::{env, path::PathBuf};

#[must_use]
pub fn slow_test_env() -> bool {
    env::var("SLOW_TEST_ENV").is_ok_and(|s| s == "true")
}

#[must_use]
pub fn debug_tracing() -> bool {
    env::var("TF_TESTS_TRACING").is_ok_and(|val| val.eq_ignore_ascii_case("true"))
}

/// Wall-clock budget granted to every awaited block, in seconds.
#[must_use]
pub fn tf_block_timeout_secs() -> Option<u64> {
    env::var("TF_BLOCK_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
}

#[must_use]
pub fn tf_provision_attempts() -> Option<usize> {
    env::var("TF_PROVISION_ATTEMPTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
}

#[must_use]
pub fn tf_harness_config() -> Option<PathBuf> {
    env::var("TF_HARNESS_CONFIG").ok().map(PathBuf::from)
}
