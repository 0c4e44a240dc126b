pub mod chain;
pub mod events;
pub mod feed;
pub mod provision;
pub mod scenario;
pub mod schedule;
#[cfg(test)]
mod testing;
pub mod wait;

pub use testing_framework_config::{
    HarnessConfig, IS_DEBUG_TRACING, ProvisioningConfig, TimeoutPolicy, WaitConfig, adjust_timeout,
};
