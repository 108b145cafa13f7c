//! Byte transports the client runs over.
//!
//! The core trait [`SisTransport`] allows plugging in different IO
//! implementations, such as a serial port or an in-memory channel pair for
//! tests.
//!
//! ## Using In-Memory Transport for Testing
//!
//! ```
//! use transport::io::InMemoryTransport;
//! use transport::{Client, NoEvents};
//!
//! let (client_transport, _device_transport) = InMemoryTransport::pair();
//! let client = Client::new(NoEvents, Default::default());
//! let session = client.open(client_transport)?;
//! session.close();
//! # Ok::<(), transport::Error>(())
//! ```

use std::io::{self, Read, Write};

mod memory;
mod serial;


pub use memory::{InMemoryTransport, WireReader, WireWriter};
pub use serial::SerialTransport;

/// A bidirectional byte stream to a device.
///
/// The transport is split into a reader, which is moved into the client's
/// background thread, and a writer, which stays with the client.
///
/// # Requirements
///
/// - Reads must not block forever. When no data arrives within a short period
///   the reader returns [`io::ErrorKind::WouldBlock`] or
///   [`io::ErrorKind::TimedOut`] so the background thread can notice shutdown.
/// - A read returning `Ok(0)` means the device went away.
pub trait SisTransport: Send + 'static {
    type Reader: Read + Send + 'static;
    type Writer: Write + Send + 'static;

    /// Split the transport into separate reader and writer halves
    fn split(self) -> io::Result<(Self::Reader, Self::Writer)>;
}
