use std::fmt;
use std::io::{self, Read, Write};
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::classifier::{Classification, Grammar, classify};
use crate::command::Command;
use crate::config::ClientConfig;
use crate::coordinator::{Outcome, PendingSlot, RequestGate, with_lock};
use crate::dispatcher::{
    Dispatcher, ListenerFailure, ListenerHandle, ListenerResult, panic_message,
};
use crate::error::{Error, Result};
use crate::events::Event;
use crate::framer::Framer;
use crate::io::SisTransport;
use crate::message::Message;

const READ_CHUNK: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
    Faulted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Closed => "closed",
            ConnectionState::Open => "open",
            ConnectionState::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

/// Something noteworthy that happened on the read side and could not be
/// returned to any caller.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Anomaly {
    /// A line that neither answered the pending request nor parsed as an event.
    Unrecognized(Message),
    ListenerFailed(ListenerFailure),
    /// The connection moved to Faulted; carries the reason.
    ConnectionFaulted(String),
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::Unrecognized(message) => write!(f, "unrecognized message {message:?}"),
            Anomaly::ListenerFailed(failure) => write!(f, "{failure}"),
            Anomaly::ConnectionFaulted(reason) => write!(f, "connection faulted: {reason}"),
        }
    }
}

/// State shared between the client and its reader thread
struct Shared {
    grammar: Arc<dyn Grammar>,
    config: ClientConfig,
    state: Mutex<ConnectionState>,
    pending: PendingSlot,
    gate: RequestGate,
    dispatcher: Dispatcher,
    anomalies_tx: Sender<Anomaly>,
    anomalies_rx: Receiver<Anomaly>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        with_lock("Shared.state", &self.state, |state| *state)
    }

    fn set_state(&self, new: ConnectionState) -> ConnectionState {
        with_lock("Shared.state", &self.state, |mut state| {
            std::mem::replace(&mut *state, new)
        })
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Open => Ok(()),
            other => Err(Error::NotConnected(other)),
        }
    }

    /// Route one framed line from the reader thread.
    fn route(&self, message: Message) {
        tracing::debug!(message = %message, "<--");
        let snapshot = self.pending.snapshot();
        match classify(self.grammar.as_ref(), &message, snapshot.as_ref()) {
            Classification::Reply {
                request,
                device_error,
            } => match self.pending.claim(request) {
                Some(pending) => {
                    let outcome: Outcome = match device_error {
                        Some(device_error) => Err(Error::Device(device_error)),
                        None => Ok(message),
                    };
                    pending.resolve(outcome);
                }
                None => {
                    // the request timed out while the matcher ran
                    tracing::debug!(request, "reply lost the race with a timeout");
                    self.route_unsolicited(message);
                }
            },
            Classification::Event(event) => self.deliver(&event),
            Classification::Unrecognized => self.report(Anomaly::Unrecognized(message)),
        }
    }

    fn route_unsolicited(&self, message: Message) {
        match classify(self.grammar.as_ref(), &message, None) {
            Classification::Event(event) => self.deliver(&event),
            _ => self.report(Anomaly::Unrecognized(message)),
        }
    }

    fn deliver(&self, event: &Event) {
        for failure in self.dispatcher.deliver(event) {
            self.report(Anomaly::ListenerFailed(failure));
        }
    }

    fn report(&self, anomaly: Anomaly) {
        match &anomaly {
            Anomaly::ConnectionFaulted(reason) => tracing::error!(%reason, "connection faulted"),
            other => tracing::warn!(anomaly = %other, "anomaly"),
        }
        match self.anomalies_tx.try_send(anomaly) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => tracing::trace!("anomaly buffer full"),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Open → Faulted. Fails the pending request and wakes queued callers.
    fn fault(&self, reason: &str) {
        let faulted = with_lock("Shared.state", &self.state, |mut state| {
            if *state == ConnectionState::Open {
                *state = ConnectionState::Faulted;
                true
            } else {
                false
            }
        });
        if !faulted {
            tracing::debug!(%reason, "ignoring fault outside of open state");
            return;
        }
        if let Some(pending) = self.pending.take() {
            tracing::debug!(id = pending.id(), "failing pending request");
            pending.resolve(Err(Error::ConnectionLost(reason.to_owned())));
        }
        self.gate.wake_all();
        self.report(Anomaly::ConnectionFaulted(reason.to_owned()));
    }
}

/// Resources owned by one open connection
struct Connection {
    writer: Box<dyn Write + Send>,
    // Option because of drop and take
    exit: Option<oneshot::Sender<()>>,
    reader: Option<JoinHandle<()>>,
}

impl Connection {
    fn shut_down(mut self) {
        if let Some(exit) = self.exit.take() {
            let _ = exit.send(());
        }
        drop(self.writer);
        if let Some(reader) = self.reader.take() {
            if reader.thread().id() == thread::current().id() {
                tracing::debug!("closed from the reader thread, not joining");
                return;
            }
            if reader.join().is_err() {
                tracing::error!("reader thread panicked");
            }
        }
    }
}

/// Request/reply engine for a line-oriented device protocol.
///
/// One request is in flight at a time; unsolicited lines are decoded with the
/// [`Grammar`] and delivered to event listeners from a background thread.
///
/// # Examples
///
/// ```
/// use transport::io::InMemoryTransport;
/// use transport::testing::SimulatedDevice;
/// use transport::{Client, Command, NoEvents};
///
/// let (client_transport, device_transport) = InMemoryTransport::pair();
/// let _device = SimulatedDevice::builder()
///     .respond(|request| (request == b"Q").then(|| vec!["1.02".to_string()]))
///     .spawn(device_transport);
///
/// let client = Client::new(NoEvents, Default::default());
/// let session = client.open(client_transport)?;
/// let version = session.send(Command::text("Q", |reply| reply.text().contains('.')))?;
/// assert_eq!(version, "1.02");
/// # Ok::<(), transport::Error>(())
/// ```
pub struct Client {
    shared: Arc<Shared>,
    connection: Mutex<Option<Connection>>,
}

impl Client {
    pub fn new<G: Grammar>(grammar: G, config: ClientConfig) -> Self {
        let (anomalies_tx, anomalies_rx) = crossbeam_channel::bounded(config.anomaly_capacity);
        Self {
            shared: Arc::new(Shared {
                grammar: Arc::new(grammar),
                config,
                state: Mutex::new(ConnectionState::Closed),
                pending: PendingSlot::default(),
                gate: RequestGate::default(),
                dispatcher: Dispatcher::default(),
                anomalies_tx,
                anomalies_rx,
            }),
            connection: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Anomalies reported since the client was created, oldest first.
    ///
    /// The buffer holds [`ClientConfig::anomaly_capacity`] entries; later
    /// anomalies are only logged until it is drained.
    pub fn anomalies(&self) -> Receiver<Anomaly> {
        self.shared.anomalies_rx.clone()
    }

    /// Take ownership of the transport and start reading from it.
    ///
    /// The returned [`Session`] closes the connection when dropped. A faulted
    /// connection is cleaned up first, so `open` is also how to reconnect.
    #[tracing::instrument(skip(self, transport), level = "debug")]
    pub fn open<T>(&self, transport: T) -> Result<Session<'_>>
    where
        T: SisTransport,
    {
        let stale = with_lock("Client.connection", &self.connection, |mut connection| {
            match self.shared.state() {
                ConnectionState::Open => Err(Error::AlreadyOpen),
                ConnectionState::Faulted => Ok(Some(connection.take())),
                ConnectionState::Closed => Ok(None),
            }
        })?;
        // the old reader may be running a listener that takes the connection lock
        if let Some(connection) = stale {
            self.release(connection);
        }

        with_lock("Client.connection", &self.connection, |mut connection| {
            if self.shared.state() == ConnectionState::Open {
                return Err(Error::AlreadyOpen);
            }

            let (input, output) = transport.split()?;
            let (exit_tx, exit_rx) = oneshot::channel();

            self.shared.set_state(ConnectionState::Open);
            let shared = Arc::clone(&self.shared);
            let reader = thread::Builder::new()
                .name("sis-reader".to_string())
                .spawn(move || read_loop(shared, input, exit_rx));
            let reader = match reader {
                Ok(reader) => reader,
                Err(e) => {
                    self.shared.set_state(ConnectionState::Closed);
                    return Err(Error::Io(e));
                }
            };

            *connection = Some(Connection {
                writer: Box::new(output),
                exit: Some(exit_tx),
                reader: Some(reader),
            });
            tracing::info!("connection open");
            Ok(())
        })?;

        Ok(Session { client: self })
    }

    /// Write the command and block until its reply, a timeout, or the end of
    /// the connection.
    #[tracing::instrument(skip(self, command), fields(request = ?command.request()), level = "debug")]
    pub fn send<T>(&self, command: Command<T>) -> Result<T> {
        let (request, matcher, decoder, timeout) = command.into_parts();
        let timeout = timeout.unwrap_or_else(|| self.shared.config.default_timeout());

        let _turn = self
            .shared
            .gate
            .acquire(self.shared.config.overlap, || self.shared.ensure_open())?;

        let (id, rx) = self.shared.pending.install(matcher, request.clone())?;

        // a fault or close that landed before the install could not see this request
        let written = self.shared.ensure_open().and_then(|()| {
            tracing::debug!(request = ?request, "-->");
            self.write(&request).map_err(|e| {
                let reason = format!("write failed: {e}");
                self.shared.fault(&reason);
                Error::ConnectionLost(reason)
            })
        });

        let outcome = match written {
            Err(e) => self.abandon(id, rx, e),
            Ok(()) => match rx.recv_timeout(timeout) {
                Ok(outcome) => outcome,
                Err(oneshot::RecvTimeoutError::Timeout) => {
                    tracing::debug!(?timeout, "no reply in time");
                    self.abandon(id, rx, Error::Timeout(timeout))
                }
                Err(oneshot::RecvTimeoutError::Disconnected) => Err(Error::Cancelled),
            },
        };

        let reply = outcome?;
        decoder(&reply).map_err(|source| Error::Decode {
            reply: reply.text().to_owned(),
            source,
        })
    }

    /// Withdraw request `id`, failing it with `error`. If someone else removed
    /// it first, their resolution wins.
    fn abandon(&self, id: u64, rx: oneshot::Receiver<Outcome>, error: Error) -> Outcome {
        match self.shared.pending.claim(id) {
            Some(_) => Err(error),
            None => rx.recv().unwrap_or(Err(Error::Cancelled)),
        }
    }

    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        with_lock("Client.connection", &self.connection, |mut connection| {
            let Some(connection) = connection.as_mut() else {
                return Err(io::Error::new(io::ErrorKind::NotConnected, "connection closed"));
            };
            connection.writer.write_all(bytes)?;
            connection.writer.flush()
        })
    }

    /// Register `listener` for events called `name`, or for all events when
    /// `name` is [`crate::ANY_EVENT`].
    pub fn add_event_listener<F>(&self, name: impl Into<String>, listener: F) -> ListenerHandle
    where
        F: Fn(&Event) -> ListenerResult + Send + Sync + 'static,
    {
        self.shared.dispatcher.add(name, Arc::new(listener))
    }

    /// Unregister a listener. Unknown or already removed handles are ignored.
    pub fn remove_event_listener(&self, handle: ListenerHandle) {
        if !self.shared.dispatcher.remove(handle) {
            tracing::debug!(?handle, "listener already removed");
        }
    }

    /// Close the connection. Safe to call in any state and more than once.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn close(&self) {
        let connection = with_lock("Client.connection", &self.connection, |mut c| c.take());
        self.release(connection);
    }

    fn release(&self, connection: Option<Connection>) {
        let previous = self.shared.set_state(ConnectionState::Closed);
        if let Some(pending) = self.shared.pending.take() {
            pending.resolve(Err(Error::Cancelled));
        }
        tracing::debug!(listeners = self.shared.dispatcher.len(), "dropping event listeners");
        self.shared.dispatcher.clear();
        self.shared.gate.wake_all();
        if let Some(connection) = connection {
            connection.shut_down();
        }
        if previous != ConnectionState::Closed {
            tracing::info!(%previous, "connection closed");
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        tracing::debug!("shutting down client");
        self.close();
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

/// An open connection. Closes it when dropped.
#[must_use = "dropping the session closes the connection"]
pub struct Session<'a> {
    client: &'a Client,
}

impl Session<'_> {
    pub fn close(self) {
        drop(self);
    }

    /// Leave the connection open after the guard goes away. It is then closed
    /// by [`Client::close`] or when the client is dropped.
    pub fn detach(self) {
        std::mem::forget(self);
    }
}

impl Deref for Session<'_> {
    type Target = Client;

    fn deref(&self) -> &Client {
        self.client
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.client.close();
    }
}

fn read_loop<R: Read>(shared: Arc<Shared>, mut input: R, exit: oneshot::Receiver<()>) {
    let mut framer = Framer::new(shared.config.line_ending, shared.config.max_frame_len);
    let mut buf = [0u8; READ_CHUNK];

    loop {
        // check for shutdown
        match exit.try_recv() {
            Ok(()) => return,
            Err(oneshot::TryRecvError::Empty) => {}
            Err(oneshot::TryRecvError::Disconnected) => {
                tracing::debug!("shutdown sender dropped");
                return;
            }
        }
        // a failed write faults the connection from the caller's thread
        if shared.state() != ConnectionState::Open {
            tracing::debug!(state = %shared.state(), "connection left open state, stopping reader");
            return;
        }

        let n = match input.read(&mut buf) {
            Ok(0) => {
                shared.fault("transport closed by peer");
                return;
            }
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(e) => {
                shared.fault(&format!("read failed: {e}"));
                return;
            }
        };

        for frame in framer.feed(&buf[..n]) {
            let message = match frame {
                Ok(message) => message,
                Err(e) => {
                    shared.fault(&e.to_string());
                    return;
                }
            };
            if shared.state() != ConnectionState::Open {
                tracing::debug!(%message, "dropping message read after the connection faulted");
                return;
            }
            // matchers and the grammar are caller code
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| shared.route(message))) {
                shared.fault(&format!(
                    "routing a message panicked: {}",
                    panic_message(payload.as_ref())
                ));
                return;
            }
        }
    }
}
