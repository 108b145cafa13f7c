//! Tracking the single in-flight request
//!
//! Two pieces cooperate here. [`RequestGate`] lets one caller at a time past,
//! so at most one request is ever installed. [`PendingSlot`] holds that request
//! until exactly one party removes it: the reader thread when a reply frames,
//! the caller when its window expires, or the client when the connection
//! faults or closes. Whoever removes it resolves it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use bytes::Bytes;

use crate::classifier::PendingSnapshot;
use crate::command::Matcher;
use crate::config::OverlapPolicy;
use crate::error::Error;
use crate::message::Message;

/// What the reader (or close/fault handling) hands back to a waiting caller.
pub(crate) type Outcome = Result<Message, Error>;

pub(crate) fn with_lock<T, F, R>(name: &str, lock: &Mutex<T>, f: F) -> R
where
    F: FnOnce(MutexGuard<'_, T>) -> R,
{
    tracing::trace!(%name, "taking lock");
    let inner = lock.lock().unwrap_or_else(PoisonError::into_inner);
    let res = f(inner);
    tracing::trace!(%name, "releasing lock");
    res
}

pub(crate) struct PendingRequest {
    id: u64,
    matcher: Matcher,
    responder: oneshot::Sender<Outcome>,
    submitted: Instant,
    request: Bytes,
}

impl PendingRequest {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn resolve(self, outcome: Outcome) {
        tracing::debug!(
            id = self.id,
            request = ?self.request,
            elapsed = ?self.submitted.elapsed(),
            ok = outcome.is_ok(),
            "resolving request"
        );
        if self.responder.send(outcome).is_err() {
            tracing::warn!(id = self.id, "caller stopped waiting before resolution");
        }
    }
}

/// Holds zero or one [`PendingRequest`].
#[derive(Default)]
pub(crate) struct PendingSlot {
    slot: Mutex<Option<PendingRequest>>,
    next_id: AtomicU64,
}

impl PendingSlot {
    /// Install a new request. Fails if one is already pending, which the
    /// [`RequestGate`] rules out for well-behaved callers.
    pub(crate) fn install(
        &self,
        matcher: Matcher,
        request: Bytes,
    ) -> Result<(u64, oneshot::Receiver<Outcome>), Error> {
        let (responder, receiver) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        with_lock("PendingSlot.slot", &self.slot, |mut slot| {
            if slot.is_some() {
                return Err(Error::RequestInProgress);
            }
            *slot = Some(PendingRequest {
                id,
                matcher,
                responder,
                submitted: Instant::now(),
                request,
            });
            Ok((id, receiver))
        })
    }

    /// Copy out what the classifier needs without holding the lock while it runs.
    pub(crate) fn snapshot(&self) -> Option<PendingSnapshot> {
        with_lock("PendingSlot.slot", &self.slot, |slot| {
            slot.as_ref().map(|pending| PendingSnapshot {
                id: pending.id,
                matcher: pending.matcher.clone(),
            })
        })
    }

    /// Remove the request if it is still the one identified by `id`.
    pub(crate) fn claim(&self, id: u64) -> Option<PendingRequest> {
        with_lock("PendingSlot.slot", &self.slot, |mut slot| {
            if slot.as_ref().is_some_and(|pending| pending.id == id) {
                slot.take()
            } else {
                None
            }
        })
    }

    /// Remove whatever is pending.
    pub(crate) fn take(&self) -> Option<PendingRequest> {
        with_lock("PendingSlot.slot", &self.slot, |mut slot| slot.take())
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        with_lock("PendingSlot.slot", &self.slot, |slot| slot.is_none())
    }
}

#[derive(Default)]
struct GateState {
    busy: bool,
    waiting: VecDeque<u64>,
    next_ticket: u64,
}

/// Serializes callers of `send`.
#[derive(Default)]
pub(crate) struct RequestGate {
    state: Mutex<GateState>,
    turn: Condvar,
}

/// Held by the caller whose request is in flight. Dropping it lets the next
/// caller through.
pub(crate) struct GateTurn<'a> {
    gate: &'a RequestGate,
}

impl Drop for GateTurn<'_> {
    fn drop(&mut self) {
        with_lock("RequestGate.state", &self.gate.state, |mut state| {
            state.busy = false;
        });
        self.gate.turn.notify_all();
    }
}

impl RequestGate {
    /// Wait for this caller's turn.
    ///
    /// `check` is evaluated before the turn is granted and whenever the gate is
    /// woken; an error from it abandons the wait.
    pub(crate) fn acquire<F>(&self, policy: OverlapPolicy, check: F) -> Result<GateTurn<'_>, Error>
    where
        F: Fn() -> Result<(), Error>,
    {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if policy == OverlapPolicy::FailFast {
            check()?;
            if state.busy || !state.waiting.is_empty() {
                return Err(Error::RequestInProgress);
            }
            state.busy = true;
            return Ok(GateTurn { gate: self });
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiting.push_back(ticket);

        loop {
            if let Err(e) = check() {
                state.waiting.retain(|t| *t != ticket);
                drop(state);
                // the next ticket may now be at the front
                self.turn.notify_all();
                return Err(e);
            }
            if !state.busy && state.waiting.front() == Some(&ticket) {
                state.waiting.pop_front();
                state.busy = true;
                return Ok(GateTurn { gate: self });
            }
            tracing::trace!(ticket, queued = state.waiting.len(), "waiting for request gate");
            state = self
                .turn
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Wake every waiter so it re-evaluates its check, e.g. after close.
    pub(crate) fn wake_all(&self) {
        // taking the lock orders this wake-up after any in-progress check
        drop(self.state.lock().unwrap_or_else(PoisonError::into_inner));
        self.turn.notify_all();
    }
}
