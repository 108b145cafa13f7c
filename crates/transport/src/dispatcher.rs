//! Event listener registry.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::coordinator::with_lock;
use crate::events::Event;

/// Register under this name to receive every event.
pub const ANY_EVENT: &str = "*";

/// What a listener returns. An error is reported as an anomaly and does not
/// stop delivery to the remaining listeners.
pub type ListenerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub(crate) type Listener = Arc<dyn Fn(&Event) -> ListenerResult + Send + Sync>;

/// Identifies one registration; pass it to
/// [`crate::Client::remove_event_listener`] to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

/// A listener returned an error or panicked while handling an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerFailure {
    pub event: String,
    pub handle: ListenerHandle,
    pub reason: String,
}

impl fmt::Display for ListenerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "listener {:?} failed on {}: {}",
            self.handle, self.event, self.reason
        )
    }
}

struct Registration {
    handle: ListenerHandle,
    name: String,
    listener: Listener,
}

#[derive(Default)]
pub(crate) struct Dispatcher {
    registrations: Mutex<Vec<Registration>>,
    next_handle: AtomicU64,
}

impl Dispatcher {
    pub(crate) fn add(&self, name: impl Into<String>, listener: Listener) -> ListenerHandle {
        let handle = ListenerHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let name = name.into();
        tracing::debug!(?handle, %name, "adding event listener");
        with_lock("Dispatcher.registrations", &self.registrations, |mut regs| {
            regs.push(Registration {
                handle,
                name,
                listener,
            })
        });
        handle
    }

    /// Returns whether anything was removed.
    pub(crate) fn remove(&self, handle: ListenerHandle) -> bool {
        with_lock("Dispatcher.registrations", &self.registrations, |mut regs| {
            let before = regs.len();
            regs.retain(|r| r.handle != handle);
            before != regs.len()
        })
    }

    pub(crate) fn clear(&self) {
        with_lock("Dispatcher.registrations", &self.registrations, |mut regs| {
            regs.clear()
        });
    }

    pub(crate) fn len(&self) -> usize {
        with_lock("Dispatcher.registrations", &self.registrations, |regs| {
            regs.len()
        })
    }

    /// Invoke every listener registered for the event's name (or for
    /// [`ANY_EVENT`]) in registration order.
    ///
    /// Listeners run without the registry lock held, so they may add or remove
    /// listeners; such changes take effect from the next event.
    pub(crate) fn deliver(&self, event: &Event) -> Vec<ListenerFailure> {
        let targets: Vec<(ListenerHandle, Listener)> =
            with_lock("Dispatcher.registrations", &self.registrations, |regs| {
                regs.iter()
                    .filter(|r| r.name == event.name() || r.name == ANY_EVENT)
                    .map(|r| (r.handle, Arc::clone(&r.listener)))
                    .collect()
            });

        tracing::trace!(event = %event.name(), listeners = targets.len(), "delivering event");

        let mut failures = Vec::new();
        for (handle, listener) in targets {
            let reason = match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };
            failures.push(ListenerFailure {
                event: event.name().to_owned(),
                handle,
                reason,
            });
        }
        failures
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}
