mod block_progress;
mod event_emitted;
mod scheduler_drained;

pub use block_progress::BlockProgress;
pub use event_emitted::EventEmitted;
pub use scheduler_drained::SchedulerDrained;
