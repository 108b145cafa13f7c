//! Extron SIS device support
//!
//! Vendor data layered on top of the [`transport`] engine: error codes, part
//! numbers and, per model, which properties exist and how they look on the
//! wire. [`Device`] ties them to a [`transport::Client`].
//!
//! ```
//! use devices::{Device, PartNumber};
//! use transport::testing::SimulatedDevice;
//! use transport::{ClientConfig, InMemoryTransport, Value};
//!
//! let (client_transport, device_transport) = InMemoryTransport::pair();
//! let _mps112 = SimulatedDevice::builder()
//!     .respond(|request| match request {
//!         b"42V" => Some(vec!["Vol42".to_string()]),
//!         _ => None,
//!     })
//!     .spawn(device_transport);
//!
//! let device = Device::open(client_transport, Some(PartNumber::Mps112), ClientConfig::default())?;
//! assert_eq!(device.set("volume", Value::Int(42))?, Value::Int(42));
//! # Ok::<(), devices::Error>(())
//! ```
mod device;
mod error;
pub mod errors;
pub mod grammar;
pub mod models;
pub mod part_numbers;
pub mod pattern;
pub mod property;
pub mod resolution;

pub use device::Device;
pub use error::{Error, Result};
pub use errors::ErrorCode;
pub use grammar::SisGrammar;
pub use models::Model;
pub use part_numbers::PartNumber;
pub use property::{Channels, Codec, Property, SetCommand, ValueKind};
pub use resolution::Resolution;
