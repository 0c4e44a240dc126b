pub mod builder;
pub mod expectations;
pub mod matchers;

pub use builder::ScenarioBuilderExt;
pub use expectations::{BlockProgress, EventEmitted, SchedulerDrained};
