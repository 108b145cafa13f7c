//! Per-model property tables
use transport::{Event, Message};

use crate::property::Property;

pub mod dvs304;
pub mod mps112;

/// Everything a device family supports beyond the common `Q` and `N`
/// commands.
#[derive(Debug, PartialEq, Eq)]
pub struct Model {
    pub name: &'static str,
    pub properties: &'static [Property],
}

impl Model {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// The first property whose notice matches `message` decodes it.
    pub fn decode_event(&self, message: &Message) -> Option<Event> {
        self.properties.iter().find_map(|p| p.decode_notice(message))
    }
}

/// Any SIS device: firmware version and part number only.
pub static GENERIC: Model = Model {
    name: "generic",
    properties: &[],
};
