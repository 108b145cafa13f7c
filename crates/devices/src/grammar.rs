//! The SIS message grammar handed to the transport client
use std::sync::{PoisonError, RwLock};

use transport::{DeviceError, Event, Grammar, Message};

use crate::errors;
use crate::models::{GENERIC, Model};

/// Error replies are common to every SIS device; events depend on the model,
/// which can change once the part number is known.
#[derive(Debug)]
pub struct SisGrammar {
    model: RwLock<&'static Model>,
}

impl SisGrammar {
    pub fn new(model: &'static Model) -> Self {
        Self {
            model: RwLock::new(model),
        }
    }

    pub fn model(&self) -> &'static Model {
        *self.model.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_model(&self, model: &'static Model) {
        *self.model.write().unwrap_or_else(PoisonError::into_inner) = model;
    }
}

impl Default for SisGrammar {
    fn default() -> Self {
        Self::new(&GENERIC)
    }
}

impl Grammar for SisGrammar {
    fn decode_event(&self, message: &Message) -> Option<Event> {
        self.model().decode_event(message)
    }

    fn decode_error(&self, message: &Message) -> Option<DeviceError> {
        errors::parse(message.text())
    }
}
