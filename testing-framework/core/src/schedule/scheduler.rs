use std::sync::Arc;

use tracing::{info, warn};

use super::{ScheduleError, ScheduleId, ScheduledCallBuilder, ScheduledOperationSpec};
use crate::chain::{
    BlockHeader, BlockNumber, Call, EventRecord, Settlement, Signer, Submitter,
    paths::{SCHEDULE_COLLISION_ERRORS, SCHEDULER_SECTION},
};

/// Agenda slot a task was placed in: the block it fires at and its index
/// within that block's agenda.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskAddress {
    pub block: BlockNumber,
    pub index: u32,
}

impl TaskAddress {
    fn from_scheduled_event(events: &[EventRecord]) -> Option<Self> {
        let event = events
            .iter()
            .find(|event| event.is(SCHEDULER_SECTION, "Scheduled"))?;
        let block = event.payload.first()?.as_u64()?;
        let index = event.payload.get(1)?.as_u64()?;
        Some(Self {
            block,
            index: u32::try_from(index).ok()?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleReceipt {
    pub id: Option<ScheduleId>,
    /// Absent when the backend did not report a `scheduler.Scheduled` event.
    pub address: Option<TaskAddress>,
    pub settled_in: BlockHeader,
}

/// Submits scheduler calls on behalf of the harness.
#[derive(Clone)]
pub struct Scheduler {
    builder: ScheduledCallBuilder,
    submitter: Arc<dyn Submitter>,
}

impl Scheduler {
    #[must_use]
    pub fn new(builder: ScheduledCallBuilder, submitter: Arc<dyn Submitter>) -> Self {
        Self { builder, submitter }
    }

    #[must_use]
    pub const fn builder(&self) -> &ScheduledCallBuilder {
        &self.builder
    }

    pub fn next_id(&self) -> ScheduleId {
        self.builder.next_id()
    }

    /// Wraps `call` per `spec` and submits it. A named schedule whose id is
    /// still live fails with [`ScheduleError::Collision`].
    pub async fn schedule(
        &self,
        signer: &dyn Signer,
        spec: ScheduledOperationSpec,
        call: Call,
    ) -> Result<ScheduleReceipt, ScheduleError> {
        let target = call.name();
        let wrapped = self.builder.build(&spec, call)?;
        let settlement = self.submit(signer, wrapped, spec.id).await?;
        let address = TaskAddress::from_scheduled_event(&settlement.events);

        info!(
            call = %target,
            id = ?spec.id,
            when = ?spec.when,
            block = settlement.block.number,
            "operation scheduled"
        );

        Ok(ScheduleReceipt {
            id: spec.id,
            address,
            settled_in: settlement.block,
        })
    }

    pub async fn schedule_at(
        &self,
        signer: &dyn Signer,
        block: BlockNumber,
        call: Call,
    ) -> Result<ScheduleReceipt, ScheduleError> {
        self.schedule(signer, ScheduledOperationSpec::at(block), call)
            .await
    }

    pub async fn schedule_after(
        &self,
        signer: &dyn Signer,
        offset: u64,
        call: Call,
    ) -> Result<ScheduleReceipt, ScheduleError> {
        self.schedule(signer, ScheduledOperationSpec::after(offset), call)
            .await
    }

    pub async fn cancel_named(
        &self,
        signer: &dyn Signer,
        id: &ScheduleId,
    ) -> Result<Settlement, ScheduleError> {
        let call = self.builder.cancel_named(id)?;
        self.submit(signer, call, None).await
    }

    pub async fn cancel(
        &self,
        signer: &dyn Signer,
        address: TaskAddress,
    ) -> Result<Settlement, ScheduleError> {
        let call = self.builder.cancel(address.block, address.index)?;
        self.submit(signer, call, None).await
    }

    async fn submit(
        &self,
        signer: &dyn Signer,
        call: Call,
        id: Option<ScheduleId>,
    ) -> Result<Settlement, ScheduleError> {
        let name = call.name();
        let settlement = self.submitter.submit(signer, call, None).await?;
        let Some(failure) = settlement.failure else {
            return Ok(settlement);
        };

        match id {
            Some(id) if SCHEDULE_COLLISION_ERRORS.contains(&failure.name.as_str()) => {
                warn!(%id, failure = %failure, "schedule id collision");
                Err(ScheduleError::Collision { id })
            }
            _ => Err(ScheduleError::BackendRejected {
                call: name,
                failure,
            }),
        }
    }
}
