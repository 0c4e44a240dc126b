//! Ledger state and call dispatch for the local chain.

mod agenda;

use std::collections::HashMap;

pub(crate) use agenda::Agenda;
use serde_json::{Value, json};
use testing_framework_core::chain::{
    AccountId, Balance, BlockNumber, Call, CallArg, DispatchFailure, EventRecord, Nonce,
    balance_from_value,
};

pub(crate) type DispatchResult = Result<Vec<EventRecord>, DispatchFailure>;

/// Calls the local ledger knows how to dispatch.
pub(crate) const SUPPORTED_CALLS: &[&str] = &[
    "balances.transfer",
    "system.remarkWithEvent",
    "dev.emit",
    "scheduler.schedule",
    "scheduler.scheduleNamed",
    "scheduler.scheduleAfter",
    "scheduler.scheduleNamedAfter",
    "scheduler.cancel",
    "scheduler.cancelNamed",
];

#[derive(Default)]
pub(crate) struct Ledger {
    pub(crate) height: BlockNumber,
    balances: HashMap<AccountId, Balance>,
    nonces: HashMap<AccountId, Nonce>,
    pub(crate) agenda: Agenda,
    failing_transfers: usize,
}

impl Ledger {
    pub(crate) fn with_endowments(endowments: &[(AccountId, Balance)]) -> Self {
        Self {
            balances: endowments.iter().cloned().collect(),
            ..Self::default()
        }
    }

    pub(crate) fn free_balance(&self, account: &AccountId) -> Balance {
        self.balances.get(account).copied().unwrap_or_default()
    }

    pub(crate) fn nonce(&self, account: &AccountId) -> Nonce {
        self.nonces.get(account).copied().unwrap_or_default()
    }

    pub(crate) fn bump_nonce(&mut self, account: &AccountId) {
        *self.nonces.entry(account.clone()).or_default() += 1;
    }

    pub(crate) fn fail_next_transfers(&mut self, count: usize) {
        self.failing_transfers = count;
    }

    /// Applies `call` on behalf of `origin`. State changes only on success.
    pub(crate) fn dispatch(&mut self, origin: &AccountId, call: &Call) -> DispatchResult {
        match (call.section.as_str(), call.method.as_str()) {
            ("balances", "transfer") => self.transfer(origin, call),
            ("system", "remarkWithEvent") => {
                let remark = value_arg(call, 0)?.clone();
                Ok(vec![EventRecord::new(
                    "system",
                    "Remarked",
                    vec![json!(origin.as_str()), remark],
                )])
            }
            ("dev", "emit") => emit(call),
            ("scheduler", method) => {
                let now = self.height;
                self.agenda.dispatch(now, origin, method, call)
            }
            _ => Err(DispatchFailure::new("system.CallUnknown").with_detail(call.name())),
        }
    }

    fn transfer(&mut self, from: &AccountId, call: &Call) -> DispatchResult {
        let to = AccountId(string_arg(call, 0)?.to_owned());
        let amount = balance_from_value("balances.transfer", value_arg(call, 1)?.clone())
            .map_err(|err| bad_argument(call, &err.to_string()))?;

        if self.failing_transfers > 0 {
            self.failing_transfers -= 1;
            return Err(DispatchFailure::new("dev.InjectedFailure").with_detail(to.to_string()));
        }

        let available = self.free_balance(from);
        if available < amount {
            return Err(DispatchFailure::new("balances.InsufficientBalance")
                .with_detail(format!("{from} holds {available}, needs {amount}")));
        }

        let credited = if to == *from {
            Some(available)
        } else {
            self.free_balance(&to).checked_add(amount)
        }
        .ok_or_else(|| DispatchFailure::new("balances.Overflow").with_detail(to.to_string()))?;

        self.balances.insert(from.clone(), available - amount);
        self.balances.insert(to.clone(), credited);

        Ok(vec![EventRecord::new(
            "balances",
            "Transfer",
            vec![
                json!(from.as_str()),
                json!(to.as_str()),
                json!(amount.to_string()),
            ],
        )])
    }
}

fn emit(call: &Call) -> DispatchResult {
    let category = string_arg(call, 0)?.to_owned();
    let kind = string_arg(call, 1)?.to_owned();
    let payload = match call.arg(2) {
        Some(CallArg::Value(Value::Array(items))) => items.clone(),
        Some(CallArg::Null) | None => Vec::new(),
        Some(_) => return Err(bad_argument(call, "payload must be an array")),
    };
    Ok(vec![EventRecord::new(category, kind, payload)])
}

pub(crate) fn value_arg(call: &Call, index: usize) -> Result<&Value, DispatchFailure> {
    call.arg(index)
        .and_then(CallArg::as_value)
        .ok_or_else(|| bad_argument(call, &format!("missing argument {index}")))
}

pub(crate) fn string_arg(call: &Call, index: usize) -> Result<&str, DispatchFailure> {
    value_arg(call, index)?
        .as_str()
        .ok_or_else(|| bad_argument(call, &format!("argument {index} must be a string")))
}

pub(crate) fn bad_argument(call: &Call, detail: &str) -> DispatchFailure {
    DispatchFailure::new("system.BadArgument").with_detail(format!("{}: {detail}", call.name()))
}
