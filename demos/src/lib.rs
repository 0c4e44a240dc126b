pub mod defaults;

pub use defaults::env_or;
pub use testing_framework_workflows::ScenarioBuilderExt;
