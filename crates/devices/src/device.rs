use std::sync::Arc;

use crossbeam_channel::Receiver;
use transport::{
    Anomaly, Client, ClientConfig, Command, ConnectionState, Event, ListenerHandle,
    ListenerResult, SerialTransport, Settings, SisTransport, Value,
};

use crate::error::{Error, Result};
use crate::grammar::SisGrammar;
use crate::models::{GENERIC, Model};
use crate::part_numbers::{PartNumber, looks_like_part_number};
use crate::property::Property;

/// An SIS device on an open connection.
///
/// Properties are addressed by name (`"volume"`, `"video_input_format"`)
/// and looked up in the [`Model`] of the device. Dropping the device closes
/// the connection.
#[derive(Debug)]
pub struct Device {
    client: Client,
    grammar: Arc<SisGrammar>,
}

impl Device {
    /// Connect over `transport`.
    ///
    /// Without a part number the device is asked for one (`N`) and the model
    /// is chosen from the answer; unknown parts get the generic model.
    #[tracing::instrument(skip(transport, config), level = "debug")]
    pub fn open<T>(transport: T, part_number: Option<PartNumber>, config: ClientConfig) -> Result<Self>
    where
        T: SisTransport,
    {
        let model = part_number.map_or(&GENERIC, PartNumber::model);
        let grammar = Arc::new(SisGrammar::new(model));
        let client = Client::new(Arc::clone(&grammar), config);
        client.open(transport)?.detach();

        let device = Self { client, grammar };
        if part_number.is_none() {
            device.detect()?;
        }
        Ok(device)
    }

    /// Connect to the serial port named in `settings`.
    pub fn open_serial(settings: &Settings, part_number: Option<PartNumber>) -> Result<Self> {
        let transport = SerialTransport::open(&settings.serial, settings.client.read_poll())
            .map_err(transport::Error::from)?;
        Self::open(transport, part_number, settings.client.clone())
    }

    fn detect(&self) -> Result<()> {
        let reported = self.part_number()?;
        match reported.parse::<PartNumber>() {
            Ok(part) => {
                tracing::info!(%part, model = part.model().name, "detected device");
                self.grammar.set_model(part.model());
            }
            Err(e) => tracing::warn!(error = %e, "using the generic model"),
        }
        Ok(())
    }

    pub fn model(&self) -> &'static Model {
        self.grammar.model()
    }

    /// The underlying client, for commands without a property.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn state(&self) -> ConnectionState {
        self.client.state()
    }

    pub fn anomalies(&self) -> Receiver<Anomaly> {
        self.client.anomalies()
    }

    pub fn property(&self, name: &str) -> Result<&'static Property> {
        let model = self.model();
        model.property(name).ok_or_else(|| Error::UnknownProperty {
            model: model.name,
            name: name.to_owned(),
        })
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        self.query(name, None)
    }

    pub fn get_indexed(&self, name: &str, channel: u32) -> Result<Value> {
        self.query(name, Some(channel))
    }

    /// Set a property and return the value the device echoed.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<Value> {
        self.apply(name, None, value.into())
    }

    pub fn set_indexed(&self, name: &str, channel: u32, value: impl Into<Value>) -> Result<Value> {
        self.apply(name, Some(channel), value.into())
    }

    fn query(&self, name: &str, channel: Option<u32>) -> Result<Value> {
        let command = self.property(name)?.query_command(channel)?;
        Ok(self.client.send(command)?)
    }

    fn apply(&self, name: &str, channel: Option<u32>, value: Value) -> Result<Value> {
        let command = self.property(name)?.set_command(channel, &value)?;
        Ok(self.client.send(command)?)
    }

    /// Firmware version as reported by `Q`, e.g. `1.02`.
    pub fn firmware_version(&self) -> Result<String> {
        let command = Command::text("Q", |reply| looks_like_version(reply.text()));
        Ok(self.client.send(command)?)
    }

    /// Part number as reported by `N`, e.g. `60-532-01`.
    pub fn part_number(&self) -> Result<String> {
        let command = Command::text("N", |reply| looks_like_part_number(reply.text()));
        Ok(self.client.send(command)?)
    }

    /// Listen for changes of one property, or of all with [`transport::ANY_EVENT`].
    pub fn add_event_listener<F>(&self, name: impl Into<String>, listener: F) -> ListenerHandle
    where
        F: Fn(&Event) -> ListenerResult + Send + Sync + 'static,
    {
        self.client.add_event_listener(name, listener)
    }

    pub fn remove_event_listener(&self, handle: ListenerHandle) {
        self.client.remove_event_listener(handle);
    }

    pub fn close(&self) {
        self.client.close();
    }
}

fn looks_like_version(line: &str) -> bool {
    match line.split_once('.') {
        Some((major, minor)) => {
            !major.is_empty()
                && major.bytes().all(|b| b.is_ascii_digit())
                && minor.bytes().next().is_some_and(|b| b.is_ascii_digit())
        }
        None => false,
    }
}
