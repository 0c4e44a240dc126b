//! Scenario-facing surface: the harness facade, expectations and the runner
//! that drives a scenario body against them.

mod definition;
mod expectation;
mod harness;
mod runner;

pub type DynError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub use definition::{Builder as ScenarioBuilder, Scenario};
pub use expectation::Expectation;
pub use harness::{Harness, HarnessBuilder};
pub use runner::ScenarioError;
