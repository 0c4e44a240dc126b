use std::sync::Arc;

use serde_json::{Value, json};

use super::{ScheduleError, ScheduleId, ScheduleIdAllocator, ScheduleWhen, ScheduledOperationSpec};
use crate::chain::{
    BlockNumber, Call, CallArg, CallBuilder,
    paths::{CANCEL_METHOD, CANCEL_NAMED_METHOD, SCHEDULER_SECTION},
};

/// Wraps operations into scheduler calls.
#[derive(Clone)]
pub struct ScheduledCallBuilder {
    calls: Arc<dyn CallBuilder>,
    ids: ScheduleIdAllocator,
}

impl ScheduledCallBuilder {
    #[must_use]
    pub fn new(calls: Arc<dyn CallBuilder>) -> Self {
        Self::with_allocator(calls, ScheduleIdAllocator::random())
    }

    #[must_use]
    pub fn with_allocator(calls: Arc<dyn CallBuilder>, ids: ScheduleIdAllocator) -> Self {
        Self { calls, ids }
    }

    /// Fresh id that no other id from this builder's allocator shares.
    pub fn next_id(&self) -> ScheduleId {
        self.ids.next_id()
    }

    /// `schedule` or `scheduleAfter`, with `Named` inserted after the base
    /// verb when `spec` carries an id.
    #[must_use]
    pub const fn method_name(spec: &ScheduledOperationSpec) -> &'static str {
        match (spec.when, spec.is_named()) {
            (ScheduleWhen::At(_), false) => "schedule",
            (ScheduleWhen::At(_), true) => "scheduleNamed",
            (ScheduleWhen::After(_), false) => "scheduleAfter",
            (ScheduleWhen::After(_), true) => "scheduleNamedAfter",
        }
    }

    /// Arguments are `[id?, when, periodic | null, priority | null, call]`.
    pub fn build(&self, spec: &ScheduledOperationSpec, call: Call) -> Result<Call, ScheduleError> {
        let periodic = spec.periodic.map(|periodic| periodic.to_value()).transpose()?;

        let mut args = Vec::with_capacity(5);
        if let Some(id) = spec.id {
            args.push(CallArg::Value(id.to_value()));
        }
        args.push(CallArg::Value(json!(spec.when.block())));
        args.push(periodic.into());
        args.push(spec.priority.map(Value::from).into());
        args.push(call.into());

        self.calls
            .build_call(SCHEDULER_SECTION, Self::method_name(spec), args)
            .map_err(ScheduleError::Build)
    }

    pub fn cancel_named(&self, id: &ScheduleId) -> Result<Call, ScheduleError> {
        self.calls
            .build_call(
                SCHEDULER_SECTION,
                CANCEL_NAMED_METHOD,
                vec![CallArg::Value(id.to_value())],
            )
            .map_err(ScheduleError::Build)
    }

    /// Cancels the anonymous task at `index` of block `when`'s agenda.
    pub fn cancel(&self, when: BlockNumber, index: u32) -> Result<Call, ScheduleError> {
        self.calls
            .build_call(
                SCHEDULER_SECTION,
                CANCEL_METHOD,
                vec![json!(when).into(), json!(index).into()],
            )
            .map_err(ScheduleError::Build)
    }
}
