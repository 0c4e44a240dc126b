use std::{fmt, sync::Arc};

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::chain::EventRecord;

/// Why a payload could not be projected into its typed record.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PayloadError(pub String);

impl From<&str> for PayloadError {
    fn from(message: &str) -> Self {
        Self(message.to_owned())
    }
}

impl From<String> for PayloadError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<serde_json::Error> for PayloadError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.to_string())
    }
}

#[derive(Debug, Error)]
#[error("cannot decode {category}.{kind} payload: {source}")]
pub struct DecodeError {
    pub category: String,
    pub kind: String,
    #[source]
    pub source: PayloadError,
}

type DecodeFn<T> = dyn Fn(&[Value]) -> Result<T, PayloadError> + Send + Sync;

/// Names an event kind and knows how to decode its payload.
pub struct EventMatcher<T> {
    category: String,
    kind: String,
    decode: Arc<DecodeFn<T>>,
}

impl<T> EventMatcher<T> {
    pub fn new(
        category: impl Into<String>,
        kind: impl Into<String>,
        decode: impl Fn(&[Value]) -> Result<T, PayloadError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            category: category.into(),
            kind: kind.into(),
            decode: Arc::new(decode),
        }
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn matches(&self, event: &EventRecord) -> bool {
        event.is(&self.category, &self.kind)
    }

    /// Decodes `event`'s payload. Callers are expected to have checked
    /// [`Self::matches`] first.
    pub fn decode(&self, event: &EventRecord) -> Result<T, DecodeError> {
        (self.decode)(&event.payload).map_err(|source| DecodeError {
            category: self.category.clone(),
            kind: self.kind.clone(),
            source,
        })
    }

    /// Decodes every matching event of `events`, keeping emission order.
    pub fn decode_all(&self, events: &[EventRecord]) -> Result<Vec<T>, DecodeError> {
        events
            .iter()
            .filter(|event| self.matches(event))
            .map(|event| self.decode(event))
            .collect()
    }
}

impl EventMatcher<Vec<Value>> {
    /// Matcher yielding the undecoded payload.
    pub fn raw(category: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::new(category, kind, |payload| Ok(payload.to_vec()))
    }
}

impl<T: DeserializeOwned> EventMatcher<T> {
    /// Decodes the payload as a JSON sequence, so `T` may be a tuple or a
    /// struct whose fields follow payload order.
    pub fn serde(category: impl Into<String>, kind: impl Into<String>) -> Self {
        Self::new(category, kind, |payload| {
            serde_json::from_value(Value::Array(payload.to_vec())).map_err(PayloadError::from)
        })
    }
}

impl<T> Clone for EventMatcher<T> {
    fn clone(&self) -> Self {
        Self {
            category: self.category.clone(),
            kind: self.kind.clone(),
            decode: Arc::clone(&self.decode),
        }
    }
}

impl<T> fmt::Debug for EventMatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventMatcher({}.{})", self.category, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Transfer {
        from: String,
        to: String,
        amount: String,
    }

    #[test]
    fn serde_matcher_decodes_positional_payloads() {
        let matcher = EventMatcher::<Transfer>::serde("balances", "Transfer");
        let event = EventRecord::new(
            "balances",
            "Transfer",
            vec![json!("alice"), json!("bob"), json!("10")],
        );

        assert!(matcher.matches(&event));
        assert_eq!(
            matcher.decode(&event).unwrap(),
            Transfer {
                from: "alice".into(),
                to: "bob".into(),
                amount: "10".into(),
            }
        );
    }

    #[test]
    fn decode_errors_name_the_event() {
        let matcher = EventMatcher::<(u64,)>::serde("democracy", "Started");
        let event = EventRecord::new("democracy", "Started", vec![json!("not a number")]);
        let err = matcher.decode(&event).unwrap_err();
        assert_eq!(err.category, "democracy");
        assert!(err.to_string().contains("democracy.Started"));
    }

    #[test]
    fn decode_all_skips_other_kinds() {
        let matcher = EventMatcher::raw("system", "Remarked");
        let events = vec![
            EventRecord::new("system", "Remarked", vec![json!(1)]),
            EventRecord::new("system", "ExtrinsicSuccess", vec![]),
            EventRecord::new("system", "Remarked", vec![json!(2)]),
        ];
        assert_eq!(
            matcher.decode_all(&events).unwrap(),
            vec![vec![json!(1)], vec![json!(2)]]
        );
    }
}
