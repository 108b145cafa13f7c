//! SIS protocol engine
//!
//! This crate turns a byte stream to a line-oriented device into typed
//! request/reply calls plus a stream of unsolicited events. It knows nothing
//! about any particular device; the vendor message grammar is supplied with a
//! [`Grammar`] and each request carries its own reply matcher and decoder
//! (see [`Command`]).
mod classifier;
mod client;
mod command;
pub mod config;
mod coordinator;
mod dispatcher;
mod error;
pub mod events;
pub mod framer;
pub mod io;
mod message;
pub mod testing;

pub use classifier::{Grammar, NoEvents};
pub use client::{Anomaly, Client, ConnectionState, Session};
pub use command::{Command, Matcher};
pub use config::{ClientConfig, LineEnding, OverlapPolicy, SerialConfig, Settings};
pub use dispatcher::{ANY_EVENT, ListenerFailure, ListenerHandle, ListenerResult};
pub use error::{ConfigError, DecodeError, DeviceError, Error, Result};
pub use events::{Event, Value, ValueChangeEvent};
pub use io::{InMemoryTransport, SerialTransport, SisTransport};
pub use message::Message;
