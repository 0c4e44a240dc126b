//! State paths and call names the harness relies on.

pub const BALANCES_FREE: &str = "balances.free";
pub const SYSTEM_ACCOUNT_NONCE: &str = "system.accountNonce";
pub const SCHEDULER_AGENDA: &str = "scheduler.agenda";
pub const SCHEDULER_LOOKUP: &str = "scheduler.lookup";

pub const BALANCES_SECTION: &str = "balances";
pub const TRANSFER_METHOD: &str = "transfer";

pub const SCHEDULER_SECTION: &str = "scheduler";
pub const CANCEL_METHOD: &str = "cancel";
pub const CANCEL_NAMED_METHOD: &str = "cancelNamed";

/// Dispatch errors a backend reports when a named schedule id is taken.
pub const SCHEDULE_COLLISION_ERRORS: &[&str] =
    &["scheduler.FailedToSchedule", "scheduler.IdInUse"];
