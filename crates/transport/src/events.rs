//! Events emitted by a device without being asked
use std::fmt;

use crate::message::Message;

/// A decoded property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    /// A named member of an enumerated setting, e.g. `"separate"`.
    Enum(String),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&str> {
        match self {
            Value::Enum(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Enum(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Enum(value.to_owned())
    }
}

/// A property changed on the device, e.g. the front panel volume knob was turned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueChangeEvent {
    pub name: String,
    pub payload: Message,
    pub value: Value,
    /// Input or group the change applies to, for per-channel properties.
    pub channel: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Event {
    /// A notification without a value, e.g. an input signal change.
    Notice { name: String, payload: Message },
    ValueChange(ValueChangeEvent),
}

impl Event {
    pub fn notice(name: impl Into<String>, payload: Message) -> Self {
        Event::Notice {
            name: name.into(),
            payload,
        }
    }

    pub fn value_change(
        name: impl Into<String>,
        payload: Message,
        value: Value,
        channel: Option<u32>,
    ) -> Self {
        Event::ValueChange(ValueChangeEvent {
            name: name.into(),
            payload,
            value,
            channel,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Event::Notice { name, .. } => name,
            Event::ValueChange(change) => &change.name,
        }
    }

    pub fn payload(&self) -> &Message {
        match self {
            Event::Notice { payload, .. } => payload,
            Event::ValueChange(change) => &change.payload,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Event::Notice { .. } => None,
            Event::ValueChange(change) => Some(&change.value),
        }
    }

    pub fn channel(&self) -> Option<u32> {
        match self {
            Event::Notice { .. } => None,
            Event::ValueChange(change) => change.channel,
        }
    }
}
