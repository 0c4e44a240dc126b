//! Matchers for the events scenarios most often wait on or capture.

use serde::Deserialize;
use serde_json::Value;
use testing_framework_core::{
    chain::{AccountId, Balance, BlockNumber, balance_from_value},
    events::{EventMatcher, PayloadError},
    schedule::TaskAddress,
};

/// `democracy.Started [ref_index, threshold]`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DemocracyStarted {
    pub ref_index: u32,
    pub threshold: String,
}

#[must_use]
pub fn democracy_started() -> EventMatcher<DemocracyStarted> {
    EventMatcher::serde("democracy", "Started")
}

/// Payload of `scheduler.Scheduled` and `scheduler.Canceled`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct AgendaSlot {
    pub when: BlockNumber,
    pub index: u32,
}

impl From<AgendaSlot> for TaskAddress {
    fn from(slot: AgendaSlot) -> Self {
        Self {
            block: slot.when,
            index: slot.index,
        }
    }
}

#[must_use]
pub fn scheduler_scheduled() -> EventMatcher<AgendaSlot> {
    EventMatcher::serde("scheduler", "Scheduled")
}

#[must_use]
pub fn scheduler_canceled() -> EventMatcher<AgendaSlot> {
    EventMatcher::serde("scheduler", "Canceled")
}

/// `scheduler.Dispatched [[when, index], id | null, "ok" | {"err": name}]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerDispatched {
    pub task: AgendaSlot,
    /// Hex encoded id of a named task.
    pub id: Option<String>,
    /// Dispatch error name of a task whose call failed.
    pub error: Option<String>,
}

impl SchedulerDispatched {
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[must_use]
pub fn scheduler_dispatched() -> EventMatcher<SchedulerDispatched> {
    EventMatcher::new("scheduler", "Dispatched", |payload| {
        let task = serde_json::from_value(field(payload, 0, "task")?.clone())?;
        let id = match field(payload, 1, "id")? {
            Value::Null => None,
            Value::String(id) => Some(id.clone()),
            other => return Err(format!("id must be a string or null, got {other}").into()),
        };
        let error = match field(payload, 2, "result")? {
            Value::String(ok) if ok == "ok" => None,
            Value::Object(result) => Some(
                result
                    .get("err")
                    .and_then(Value::as_str)
                    .ok_or("result object carries no 'err' name")?
                    .to_owned(),
            ),
            other => return Err(format!("unexpected dispatch result {other}").into()),
        };
        Ok(SchedulerDispatched { task, id, error })
    })
}

/// `balances.Transfer [from, to, amount]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalancesTransfer {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Balance,
}

#[must_use]
pub fn balances_transfer() -> EventMatcher<BalancesTransfer> {
    EventMatcher::new("balances", "Transfer", |payload| {
        let from = account(payload, 0, "from")?;
        let to = account(payload, 1, "to")?;
        let amount = balance_from_value("amount", field(payload, 2, "amount")?.clone())
            .map_err(|err| PayloadError(err.to_string()))?;
        Ok(BalancesTransfer { from, to, amount })
    })
}

/// `system.Remarked [origin, remark]`
#[derive(Clone, Debug, PartialEq)]
pub struct SystemRemarked {
    pub origin: AccountId,
    pub remark: Value,
}

#[must_use]
pub fn system_remarked() -> EventMatcher<SystemRemarked> {
    EventMatcher::new("system", "Remarked", |payload| {
        Ok(SystemRemarked {
            origin: account(payload, 0, "origin")?,
            remark: field(payload, 1, "remark")?.clone(),
        })
    })
}

/// `system.ExtrinsicFailed [error, sender]`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ExtrinsicFailed {
    pub error: String,
    pub sender: AccountId,
}

#[must_use]
pub fn extrinsic_failed() -> EventMatcher<ExtrinsicFailed> {
    EventMatcher::serde("system", "ExtrinsicFailed")
}

fn field<'a>(payload: &'a [Value], index: usize, name: &str) -> Result<&'a Value, PayloadError> {
    payload
        .get(index)
        .ok_or_else(|| PayloadError(format!("missing '{name}' at position {index}")))
}

fn account(payload: &[Value], index: usize, name: &str) -> Result<AccountId, PayloadError> {
    field(payload, index, name)?
        .as_str()
        .map(AccountId::from)
        .ok_or_else(|| PayloadError(format!("'{name}' must be an account string")))
}
