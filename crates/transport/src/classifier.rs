//! Decides where each framed message goes.
//!
//! A message is either the reply to the one pending request, an unsolicited
//! event, or neither. The vendor specific parts (which lines are events, which
//! are error codes) come from a [`Grammar`]; which lines answer a request comes
//! from that request's [`crate::Command`].

use std::sync::Arc;

use crate::command::Matcher;
use crate::error::DeviceError;
use crate::events::Event;
use crate::message::Message;

/// Vendor message grammar the engine is parameterized with.
pub trait Grammar: Send + Sync + 'static {
    /// Decode an unsolicited notification, if the message is one.
    fn decode_event(&self, message: &Message) -> Option<Event>;

    /// Recognise an error code sent instead of a regular reply.
    fn decode_error(&self, message: &Message) -> Option<DeviceError> {
        let _ = message;
        None
    }
}

impl<G: Grammar + ?Sized> Grammar for Arc<G> {
    fn decode_event(&self, message: &Message) -> Option<Event> {
        (**self).decode_event(message)
    }

    fn decode_error(&self, message: &Message) -> Option<DeviceError> {
        (**self).decode_error(message)
    }
}

/// A grammar without events or error codes. Every message that does not answer
/// a request is unrecognized.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEvents;

impl Grammar for NoEvents {
    fn decode_event(&self, _message: &Message) -> Option<Event> {
        None
    }
}

/// The part of the pending request the classifier needs.
#[derive(Clone)]
pub(crate) struct PendingSnapshot {
    pub(crate) id: u64,
    pub(crate) matcher: Matcher,
}

#[derive(Debug)]
pub(crate) enum Classification {
    Reply {
        request: u64,
        device_error: Option<DeviceError>,
    },
    Event(Event),
    Unrecognized,
}

/// Replies win over events: a line that both answers the pending request and
/// parses as an event resolves the request.
pub(crate) fn classify(
    grammar: &dyn Grammar,
    message: &Message,
    pending: Option<&PendingSnapshot>,
) -> Classification {
    if let Some(pending) = pending {
        if let Some(device_error) = grammar.decode_error(message) {
            return Classification::Reply {
                request: pending.id,
                device_error: Some(device_error),
            };
        }
        if (pending.matcher)(message) {
            return Classification::Reply {
                request: pending.id,
                device_error: None,
            };
        }
    }

    match grammar.decode_event(message) {
        Some(event) => Classification::Event(event),
        None => Classification::Unrecognized,
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;
    use crate::events::Value;

    struct VolumeGrammar;

    impl Grammar for VolumeGrammar {
        fn decode_event(&self, message: &Message) -> Option<Event> {
            let value = message.text().strip_prefix("Vol")?.parse().ok()?;
            Some(Event::value_change(
                "volume",
                message.clone(),
                Value::Int(value),
                None,
            ))
        }

        fn decode_error(&self, message: &Message) -> Option<DeviceError> {
            let code = message.text().strip_prefix('E')?.parse().ok()?;
            Some(DeviceError {
                code,
                description: Cow::Borrowed("test"),
            })
        }
    }

    fn pending(matcher: impl Fn(&Message) -> bool + Send + Sync + 'static) -> PendingSnapshot {
        PendingSnapshot {
            id: 7,
            matcher: Arc::new(matcher),
        }
    }

    #[test]
    fn matching_reply_resolves_pending() {
        let pending = pending(|m| m.text() == "Vol032");
        let result = classify(&VolumeGrammar, &Message::from("Vol032"), Some(&pending));
        assert!(matches!(
            result,
            Classification::Reply {
                request: 7,
                device_error: None
            }
        ));
    }

    #[test]
    fn non_matching_line_is_an_event_while_pending() {
        let pending = pending(|m| m.text() == "Vol032");
        let result = classify(&VolumeGrammar, &Message::from("Vol045"), Some(&pending));
        match result {
            Classification::Event(event) => {
                assert_eq!(event.name(), "volume");
                assert_eq!(event.value(), Some(&Value::Int(45)));
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[test]
    fn reply_takes_precedence_over_event() {
        let pending = pending(|m| m.text().starts_with("Vol"));
        let result = classify(&VolumeGrammar, &Message::from("Vol045"), Some(&pending));
        assert!(matches!(result, Classification::Reply { .. }));
    }

    #[test]
    fn error_code_answers_pending_request() {
        let pending = pending(|_| false);
        let result = classify(&VolumeGrammar, &Message::from("E13"), Some(&pending));
        assert!(matches!(
            result,
            Classification::Reply {
                device_error: Some(DeviceError { code: 13, .. }),
                ..
            }
        ));
    }

    #[test]
    fn error_code_without_pending_is_unrecognized() {
        let result = classify(&VolumeGrammar, &Message::from("E13"), None);
        assert!(matches!(result, Classification::Unrecognized));
    }

    #[test]
    fn unknown_line_is_unrecognized() {
        let result = classify(&NoEvents, &Message::from("32"), None);
        assert!(matches!(result, Classification::Unrecognized));
    }
}
