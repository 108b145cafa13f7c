//! A scripted stand-in for a device, for tests and examples.
//!
//! [`SimulatedDevice`] drives the device half of an
//! [`InMemoryTransport`](crate::io::InMemoryTransport) pair on its own thread.
//! Every write from the client is one request; a handler closure decides
//! which lines (if any) to answer with. Unsolicited lines can be pushed at any
//! time.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::io::{InMemoryTransport, WireWriter};

type Handler = Box<dyn FnMut(&[u8]) -> Option<Vec<String>> + Send>;

pub struct SimulatedDeviceBuilder {
    handler: Handler,
    terminator: &'static str,
}

impl SimulatedDeviceBuilder {
    /// Answer each request with the returned lines. `None` (or an empty list)
    /// sends nothing back.
    pub fn respond<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&[u8]) -> Option<Vec<String>> + Send + 'static,
    {
        self.handler = Box::new(handler);
        self
    }

    /// Terminator appended to every line sent; defaults to `"\r\n"`.
    pub fn terminator(mut self, terminator: &'static str) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn spawn(self, transport: InMemoryTransport) -> SimulatedDevice {
        let (mut input, writer) = transport.into_split();
        let requests: Arc<Mutex<Vec<Vec<u8>>>> = Arc::default();
        let (exit_tx, exit_rx) = oneshot::channel::<()>();

        let thread = {
            let requests = Arc::clone(&requests);
            let mut output = writer.clone();
            let mut handler = self.handler;
            let terminator = self.terminator;
            thread::spawn(move || {
                let mut buf = [0u8; 512];
                loop {
                    if !matches!(exit_rx.try_recv(), Err(oneshot::TryRecvError::Empty)) {
                        return;
                    }
                    let request = match input.read(&mut buf) {
                        Ok(0) => return,
                        Ok(n) => buf[..n].to_vec(),
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                        Err(e) => {
                            tracing::debug!(error = %e, "simulated device read failed");
                            return;
                        }
                    };
                    tracing::trace!(request = ?String::from_utf8_lossy(&request), "device <--");
                    requests
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(request.clone());

                    for line in handler(&request).unwrap_or_default() {
                        tracing::trace!(%line, "device -->");
                        let framed = format!("{line}{terminator}");
                        if output.write_all(framed.as_bytes()).is_err() {
                            return;
                        }
                    }
                }
            })
        };

        SimulatedDevice {
            writer: Some(writer),
            terminator: self.terminator,
            requests,
            exit: Some(exit_tx),
            thread: Some(thread),
        }
    }
}

/// Handle to a running simulated device. Dropping it stops the device and
/// disconnects it, so the client's next read sees end of stream.
pub struct SimulatedDevice {
    writer: Option<WireWriter>,
    terminator: &'static str,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
    exit: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SimulatedDevice {
    pub fn builder() -> SimulatedDeviceBuilder {
        SimulatedDeviceBuilder {
            handler: Box::new(|_| None),
            terminator: "\r\n",
        }
    }

    /// Send an unsolicited line.
    pub fn push(&self, line: &str) -> io::Result<()> {
        self.push_raw(format!("{line}{}", self.terminator).as_bytes())
    }

    /// Send bytes exactly as given.
    pub fn push_raw(&self, bytes: &[u8]) -> io::Result<()> {
        match &self.writer {
            Some(writer) => writer.clone().write_all(bytes),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "device disconnected")),
        }
    }

    /// Make the client's next read fail.
    pub fn inject_error(&self, kind: io::ErrorKind, message: &str) -> io::Result<()> {
        match &self.writer {
            Some(writer) => writer.inject_error(kind, message),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "device disconnected")),
        }
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop the device and close its end of the connection.
    pub fn disconnect(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(exit) = self.exit.take() {
            let _ = exit.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.writer.take();
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.stop();
    }
}
