use std::collections::{BTreeMap, HashMap};

use serde_json::{Value, json};
use testing_framework_core::chain::{
    AccountId, BlockNumber, Call, CallArg, DispatchFailure, EventRecord,
    paths::SCHEDULER_SECTION,
};

use super::{DispatchResult, bad_argument, string_arg, value_arg};

const DEFAULT_PRIORITY: u8 = 127;

#[derive(Clone, Debug)]
pub(crate) struct ScheduledTask {
    pub(crate) origin: AccountId,
    pub(crate) call: Call,
    pub(crate) id: Option<String>,
    priority: u8,
    /// Period and executions still owed after the next one.
    periodic: Option<(u64, u32)>,
}

impl ScheduledTask {
    pub(crate) fn id_value(&self) -> Value {
        self.id.clone().map_or(Value::Null, Value::String)
    }
}

/// Tasks keyed by the block they fire in; each block's list keeps canceled
/// slots as `None` so indices stay stable.
#[derive(Default)]
pub(crate) struct Agenda {
    slots: BTreeMap<BlockNumber, Vec<Option<ScheduledTask>>>,
    lookup: HashMap<String, (BlockNumber, u32)>,
}

impl Agenda {
    pub(crate) fn dispatch(
        &mut self,
        now: BlockNumber,
        origin: &AccountId,
        method: &str,
        call: &Call,
    ) -> DispatchResult {
        match method {
            "schedule" | "scheduleNamed" | "scheduleAfter" | "scheduleNamedAfter" => {
                self.schedule(now, origin, method, call)
            }
            "cancel" => {
                let when = u64_arg(call, 0)?;
                let index = u32::try_from(u64_arg(call, 1)?)
                    .map_err(|_| bad_argument(call, "index out of range"))?;
                self.cancel(when, index)
            }
            "cancelNamed" => {
                let id = string_arg(call, 0)?;
                let (when, index) = self
                    .lookup
                    .get(id)
                    .copied()
                    .ok_or_else(|| DispatchFailure::new("scheduler.NotFound"))?;
                self.cancel(when, index)
            }
            _ => Err(DispatchFailure::new("system.CallUnknown").with_detail(call.name())),
        }
    }

    fn schedule(
        &mut self,
        now: BlockNumber,
        origin: &AccountId,
        method: &str,
        call: &Call,
    ) -> DispatchResult {
        let named = method.contains("Named");
        let relative = method.ends_with("After");
        let base = usize::from(named);

        let id = if named {
            Some(string_arg(call, 0)?.to_owned())
        } else {
            None
        };
        if let Some(id) = &id {
            if self.lookup.contains_key(id) {
                return Err(DispatchFailure::new("scheduler.FailedToSchedule")
                    .with_detail(format!("id {id} is in use")));
            }
        }
        let raw_when = u64_arg(call, base)?;
        // Relative targets count from the block after the current one.
        let when = if relative {
            now.saturating_add(raw_when).saturating_add(1)
        } else {
            raw_when
        };
        if when <= now {
            return Err(DispatchFailure::new("scheduler.TargetBlockNumberInPast")
                .with_detail(format!("target {when}, now {now}")));
        }

        let periodic = periodic_arg(call, base + 1)?;
        let priority = match call.arg(base + 2) {
            Some(CallArg::Null) | None => DEFAULT_PRIORITY,
            Some(CallArg::Value(value)) => value
                .as_u64()
                .and_then(|priority| u8::try_from(priority).ok())
                .ok_or_else(|| bad_argument(call, "priority must fit a u8"))?,
            Some(CallArg::Call(_)) => return Err(bad_argument(call, "priority must be a value")),
        };
        let inner = call
            .arg(base + 3)
            .and_then(CallArg::as_call)
            .ok_or_else(|| bad_argument(call, "missing scheduled call"))?
            .clone();

        let task = ScheduledTask {
            origin: origin.clone(),
            call: inner,
            id,
            priority,
            periodic,
        };
        let index = self.place(when, task);
        Ok(vec![EventRecord::new(
            SCHEDULER_SECTION,
            "Scheduled",
            vec![json!(when), json!(index)],
        )])
    }

    fn cancel(&mut self, when: BlockNumber, index: u32) -> DispatchResult {
        let task = self
            .slots
            .get_mut(&when)
            .and_then(|slots| slots.get_mut(index as usize))
            .and_then(Option::take)
            .ok_or_else(|| DispatchFailure::new("scheduler.NotFound"))?;
        if let Some(id) = &task.id {
            self.lookup.remove(id);
        }
        Ok(vec![EventRecord::new(
            SCHEDULER_SECTION,
            "Canceled",
            vec![json!(when), json!(index)],
        )])
    }

    fn place(&mut self, when: BlockNumber, task: ScheduledTask) -> u32 {
        let slots = self.slots.entry(when).or_default();
        let index = u32::try_from(slots.len()).unwrap_or(u32::MAX);
        if let Some(id) = &task.id {
            self.lookup.insert(id.clone(), (when, index));
        }
        slots.push(Some(task));
        index
    }

    /// Removes the tasks due at `now`, ordered by priority (lower first) and
    /// then by agenda index.
    pub(crate) fn take_due(&mut self, now: BlockNumber) -> Vec<(u32, ScheduledTask)> {
        let Some(slots) = self.slots.remove(&now) else {
            return Vec::new();
        };
        let mut due: Vec<(u32, ScheduledTask)> = slots
            .into_iter()
            .enumerate()
            .filter_map(|(index, task)| Some((u32::try_from(index).ok()?, task?)))
            .collect();
        due.sort_by_key(|(index, task)| (task.priority, *index));
        for (_, task) in &due {
            if let Some(id) = &task.id {
                self.lookup.remove(id);
            }
        }
        due
    }

    /// Places the next occurrence of a periodic task that just fired.
    pub(crate) fn reschedule(&mut self, now: BlockNumber, mut task: ScheduledTask) -> Option<(BlockNumber, u32)> {
        let (period, remaining) = task.periodic?;
        if remaining == 0 {
            return None;
        }
        task.periodic = (remaining > 1).then_some((period, remaining - 1));
        let when = now.saturating_add(period);
        let index = self.place(when, task);
        Some((when, index))
    }

    pub(crate) fn pending(&self) -> Vec<Value> {
        self.slots
            .iter()
            .flat_map(|(when, slots)| {
                slots.iter().enumerate().filter_map(move |(index, task)| {
                    task.as_ref().map(|task| {
                        json!({
                            "when": when,
                            "index": index,
                            "id": task.id_value(),
                            "call": task.call.name(),
                            "priority": task.priority,
                        })
                    })
                })
            })
            .collect()
    }

    pub(crate) fn lookup(&self, id: &str) -> Option<(BlockNumber, u32)> {
        self.lookup.get(id).copied()
    }
}

fn u64_arg(call: &Call, index: usize) -> Result<u64, DispatchFailure> {
    value_arg(call, index)?
        .as_u64()
        .ok_or_else(|| bad_argument(call, &format!("argument {index} must be a block number")))
}

/// `null` or `[period, executions]`. Fewer than two executions is treated as
/// a one-shot task.
fn periodic_arg(call: &Call, index: usize) -> Result<Option<(u64, u32)>, DispatchFailure> {
    let value = match call.arg(index) {
        Some(CallArg::Null) | None => return Ok(None),
        Some(CallArg::Value(value)) => value,
        Some(CallArg::Call(_)) => return Err(bad_argument(call, "periodic must be a value")),
    };
    let parsed = value.as_array().and_then(|pair| {
        let period = pair.first()?.as_u64()?;
        let executions = u32::try_from(pair.get(1)?.as_u64()?).ok()?;
        Some((period, executions))
    });
    let (period, executions) =
        parsed.ok_or_else(|| bad_argument(call, "periodic must be [period, executions]"))?;
    Ok((period > 0 && executions > 1).then_some((period, executions - 1)))
}
