//! Typed event matching and open-ended event capture.

mod capture;
mod matcher;

pub use capture::EventCapture;
pub use matcher::{DecodeError, EventMatcher, PayloadError};
