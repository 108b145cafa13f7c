//! A pair of connected transports backed by channels
//!
//! Stands in for a serial cable in tests and in the simulated device rig.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use super::SisTransport;

/// Mirrors the read timeout of a serial port.
const READ_WAIT: Duration = Duration::from_millis(10);

/// One `write` call, or a failure queued for the next read.
type Delivery = io::Result<Vec<u8>>;

fn hung_up() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "other end of the wire is gone")
}

/// One end of a simulated cable.
///
/// ```
/// use std::io::{Read, Write};
/// use transport::io::{InMemoryTransport, SisTransport};
///
/// let (host, device) = InMemoryTransport::pair();
/// let (_host_rx, mut host_tx) = host.split()?;
/// let (mut device_rx, _device_tx) = device.split()?;
///
/// host_tx.write_all(b"Q")?;
/// let mut byte = [0u8; 1];
/// device_rx.read_exact(&mut byte)?;
/// assert_eq!(&byte, b"Q");
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct InMemoryTransport {
    rx: WireReader,
    tx: WireWriter,
}

/// Receiving side of an [`InMemoryTransport`].
///
/// A read that finds nothing within a few milliseconds fails with `WouldBlock`,
/// like a serial port whose timeout expired. After the far side has dropped
/// all of its writers, reads return `Ok(0)`.
pub struct WireReader {
    unread: VecDeque<u8>,
    incoming: Receiver<Delivery>,
}

/// Sending side of an [`InMemoryTransport`]. Cloning gives another handle on
/// the same direction of the wire.
#[derive(Clone)]
pub struct WireWriter {
    outgoing: Sender<Delivery>,
}

impl InMemoryTransport {
    /// Two transports joined back to back: the first is meant for the
    /// client, the second for whatever plays the device.
    pub fn pair() -> (Self, Self) {
        let (host_to_device, device_inbox) = crossbeam_channel::unbounded();
        let (device_to_host, host_inbox) = crossbeam_channel::unbounded();

        let end = |incoming, outgoing| Self {
            rx: WireReader {
                unread: VecDeque::new(),
                incoming,
            },
            tx: WireWriter { outgoing },
        };

        (
            end(host_inbox, host_to_device),
            end(device_inbox, device_to_host),
        )
    }

    /// Same as [`SisTransport::split`], without the `io::Result`.
    pub fn into_split(self) -> (WireReader, WireWriter) {
        (self.rx, self.tx)
    }
}

impl SisTransport for InMemoryTransport {
    type Reader = WireReader;
    type Writer = WireWriter;

    fn split(self) -> io::Result<(WireReader, WireWriter)> {
        Ok(self.into_split())
    }
}

impl Read for WireReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.unread.is_empty() {
            match self.incoming.recv_timeout(READ_WAIT) {
                Ok(delivery) => self.unread.extend(delivery?),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::from(io::ErrorKind::WouldBlock));
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        self.unread.read(buf)
    }
}

impl WireWriter {
    /// Queue a failure; the read on the far side that reaches it returns it.
    pub fn inject_error(&self, kind: io::ErrorKind, message: &str) -> io::Result<()> {
        self.outgoing
            .send(Err(io::Error::new(kind, message.to_owned())))
            .map_err(|_| hung_up())
    }
}

impl Write for WireWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outgoing.send(Ok(buf.to_vec())).map_err(|_| hung_up())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
