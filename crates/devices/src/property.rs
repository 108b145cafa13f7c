//! Device properties and the commands that read and write them
use transport::{Command, DecodeError, Event, Message, Value};

use crate::error::{Error, Result};
use crate::pattern::Template;

/// How a property's value is spelled on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// A decimal integer, optionally signed. Leading zeros are accepted.
    Int,
    /// `0` or `1`.
    Bool,
    /// Numeric codes with a name each.
    Enum(&'static [(u32, &'static str)]),
    /// No value at all; the notice itself is the event.
    Signal,
    /// A value with a wire syntax of its own.
    Custom(&'static Codec),
}

/// Conversions for a [`ValueKind::Custom`] value.
#[derive(Clone, Copy)]
pub struct Codec {
    pub name: &'static str,
    /// Shown when a value cannot be encoded.
    pub expected: &'static str,
    pub decode: fn(&str) -> Option<Value>,
    pub encode: fn(&Value) -> Option<String>,
}

impl PartialEq for Codec {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Codec {}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ValueKind {
    pub fn decode(&self, wire: &str) -> Option<Value> {
        match self {
            ValueKind::Int => wire.parse().ok().map(Value::Int),
            ValueKind::Bool => match wire {
                "0" => Some(Value::Bool(false)),
                "1" => Some(Value::Bool(true)),
                _ => None,
            },
            ValueKind::Enum(table) => {
                let code: u32 = wire.parse().ok()?;
                table
                    .iter()
                    .find(|(c, _)| *c == code)
                    .map(|(_, name)| Value::from(*name))
            }
            ValueKind::Signal => None,
            ValueKind::Custom(codec) => (codec.decode)(wire),
        }
    }

    pub fn encode(&self, value: &Value) -> Option<String> {
        match (self, value) {
            (ValueKind::Int, Value::Int(v)) => Some(v.to_string()),
            (ValueKind::Bool, Value::Bool(v)) => Some(if *v { "1" } else { "0" }.to_string()),
            (ValueKind::Enum(table), Value::Enum(name)) => table
                .iter()
                .find(|(_, n)| *n == name.as_str())
                .map(|(code, _)| code.to_string()),
            (ValueKind::Custom(codec), value) => (codec.encode)(value),
            _ => None,
        }
    }

    fn expected(&self) -> String {
        match self {
            ValueKind::Int => "an integer".to_string(),
            ValueKind::Bool => "a boolean".to_string(),
            ValueKind::Enum(table) => {
                let names: Vec<&str> = table.iter().map(|(_, name)| *name).collect();
                format!("one of {}", names.join(", "))
            }
            ValueKind::Signal => "no value".to_string(),
            ValueKind::Custom(codec) => codec.expected.to_string(),
        }
    }
}

/// Valid channel numbers of an indexed property, both ends included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channels {
    pub first: u32,
    pub last: u32,
}

impl Channels {
    pub fn contains(&self, channel: u32) -> bool {
        (self.first..=self.last).contains(&channel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetCommand {
    Template(Template),
    /// Negative values use their own command, carrying the magnitude.
    Signed {
        positive: Template,
        negative: Template,
    },
}

impl SetCommand {
    fn render(&self, channel: Option<u32>, wire: &str) -> String {
        match self {
            SetCommand::Template(template) => template.render(channel, Some(wire)),
            SetCommand::Signed { positive, negative } => match wire.strip_prefix('-') {
                Some(magnitude) => negative.render(channel, Some(magnitude)),
                None => positive.render(channel, Some(wire)),
            },
        }
    }
}

/// One readable, writable or notifying setting of a device model.
///
/// Built in `const` context:
///
/// ```
/// use devices::{Property, ValueKind};
///
/// const VOLUME: Property = Property::new("volume", ValueKind::Int)
///     .query("V")
///     .set("{v}V")
///     .notice("Vol{v}");
/// assert!(VOLUME.is_readable() && VOLUME.is_writable());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Property {
    pub name: &'static str,
    pub kind: ValueKind,
    pub query: Option<Template>,
    pub set: Option<SetCommand>,
    /// What the device sends when the value changes, either because it was
    /// set or unprompted. Set commands are answered with this line.
    pub notice: Option<Template>,
    pub channels: Option<Channels>,
}

impl Property {
    pub const fn new(name: &'static str, kind: ValueKind) -> Self {
        Self {
            name,
            kind,
            query: None,
            set: None,
            notice: None,
            channels: None,
        }
    }

    pub const fn query(mut self, template: &'static str) -> Self {
        self.query = Some(Template::new(template));
        self
    }

    pub const fn set(mut self, template: &'static str) -> Self {
        self.set = Some(SetCommand::Template(Template::new(template)));
        self
    }

    pub const fn set_signed(mut self, positive: &'static str, negative: &'static str) -> Self {
        self.set = Some(SetCommand::Signed {
            positive: Template::new(positive),
            negative: Template::new(negative),
        });
        self
    }

    pub const fn notice(mut self, template: &'static str) -> Self {
        self.notice = Some(Template::new(template));
        self
    }

    pub const fn channels(mut self, first: u32, last: u32) -> Self {
        self.channels = Some(Channels { first, last });
        self
    }

    pub fn is_readable(&self) -> bool {
        self.query.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.set.is_some()
    }

    pub fn check_channel(&self, channel: Option<u32>) -> Result<()> {
        match (self.channels, channel) {
            (None, None) => Ok(()),
            (None, Some(_)) => Err(Error::UnexpectedChannel(self.name)),
            (Some(_), None) => Err(Error::ChannelRequired(self.name)),
            (Some(channels), Some(channel)) if channels.contains(channel) => Ok(()),
            (Some(channels), Some(channel)) => Err(Error::ChannelOutOfRange {
                property: self.name,
                channel,
                first: channels.first,
                last: channels.last,
            }),
        }
    }

    /// Decode `message` if it is this property's notice.
    pub fn decode_notice(&self, message: &Message) -> Option<Event> {
        match self.kind {
            ValueKind::Signal => {
                self.notice?.parse(message.text())?;
                Some(Event::notice(self.name, message.clone()))
            }
            _ => {
                let (channel, value) = self.parse_notice(message)?;
                Some(Event::value_change(self.name, message.clone(), value, channel))
            }
        }
    }

    fn parse_notice(&self, message: &Message) -> Option<(Option<u32>, Value)> {
        let captures = self.notice?.parse(message.text())?;
        let channel = match (captures.channel, self.channels) {
            (Some(text), Some(channels)) => {
                Some(text.parse::<u32>().ok().filter(|c| channels.contains(*c))?)
            }
            (None, None) => None,
            _ => return None,
        };
        let value = self.kind.decode(captures.value?)?;
        Some((channel, value))
    }

    /// A command reading the current value. The reply is the bare value.
    pub fn query_command(&self, channel: Option<u32>) -> Result<Command<Value>> {
        let query = self.query.ok_or(Error::NotReadable(self.name))?;
        self.check_channel(channel)?;

        let kind = self.kind;
        let name = self.name;
        Ok(Command::new(
            query.render(channel, None),
            move |reply| kind.decode(reply.text()).is_some(),
            move |reply| {
                kind.decode(reply.text())
                    .ok_or_else(|| DecodeError::new(format!("not a {name} value")))
            },
        ))
    }

    /// A command setting `value`. The reply is the notice echoing the same
    /// channel and value; the decoded echo is the command's result.
    pub fn set_command(&self, channel: Option<u32>, value: &Value) -> Result<Command<Value>> {
        let set = self.set.ok_or(Error::NotWritable(self.name))?;
        self.check_channel(channel)?;
        let wire = self.kind.encode(value).ok_or_else(|| Error::InvalidValue {
            property: self.name,
            value: value.clone(),
            expected: self.kind.expected(),
        })?;
        let request = set.render(channel, &wire);

        let property = *self;
        // an echo decodes to the canonical value, which may be spelled differently
        let expected = self.kind.decode(&wire).unwrap_or_else(|| value.clone());
        if property.notice.is_none() {
            return Ok(Command::new(request, |_| true, move |_| Ok(expected)));
        }
        Ok(Command::new(
            request,
            move |reply| {
                matches!(property.parse_notice(reply), Some((c, ref v)) if c == channel && *v == expected)
            },
            move |reply| {
                property
                    .parse_notice(reply)
                    .map(|(_, value)| value)
                    .ok_or_else(|| DecodeError::new(format!("not a {} echo", property.name)))
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOLUME: Property = Property::new("volume", ValueKind::Int)
        .query("V")
        .set("{v}V")
        .notice("Vol{v}");

    const MODE: Property = Property::new("mode", ValueKind::Enum(&[(1, "single"), (2, "separate")]))
        .set("{v}*1#")
        .notice("Mod{v}");

    const FORMAT: Property = Property::new("format", ValueKind::Int)
        .query("{i}\\")
        .set("{i}*{v}\\")
        .notice("{i}Typ{v}")
        .channels(1, 4);

    const GAIN: Property = Property::new("gain", ValueKind::Int)
        .set_signed("16*{v}G", "16*{v}g")
        .notice("Aud{v}");

    #[test]
    fn value_kinds() {
        assert_eq!(ValueKind::Int.decode("045"), Some(Value::Int(45)));
        assert_eq!(ValueKind::Int.decode("+12"), Some(Value::Int(12)));
        assert_eq!(ValueKind::Int.decode("-66"), Some(Value::Int(-66)));
        assert_eq!(ValueKind::Int.decode("4.5"), None);
        assert_eq!(ValueKind::Bool.decode("1"), Some(Value::Bool(true)));
        assert_eq!(ValueKind::Bool.decode("2"), None);
        assert_eq!(MODE.kind.decode("2"), Some(Value::from("separate")));
        assert_eq!(MODE.kind.decode("3"), None);

        assert_eq!(MODE.kind.encode(&Value::from("single")), Some("1".to_string()));
        assert_eq!(MODE.kind.encode(&Value::from("mixed")), None);
        assert_eq!(ValueKind::Bool.encode(&Value::Bool(false)), Some("0".to_string()));
        assert_eq!(ValueKind::Int.encode(&Value::Bool(false)), None);
    }

    #[test]
    fn set_matches_only_its_own_echo() {
        let command = VOLUME.set_command(None, &Value::Int(32)).unwrap();
        assert_eq!(command.request(), b"32V");
        assert!(command.matches(&Message::from("Vol32")));
        assert!(command.matches(&Message::from("Vol032")));
        assert!(!command.matches(&Message::from("Vol045")));
        assert!(!command.matches(&Message::from("32")));
    }

    #[test]
    fn query_matches_bare_values() {
        let command = VOLUME.query_command(None).unwrap();
        assert_eq!(command.request(), b"V");
        assert!(command.matches(&Message::from("32")));
        assert!(!command.matches(&Message::from("Vol32")));
    }

    #[test]
    fn indexed_property() {
        let command = FORMAT.set_command(Some(2), &Value::Int(4)).unwrap();
        assert_eq!(command.request(), b"2*4\\");
        assert!(command.matches(&Message::from("2Typ4")));
        assert!(!command.matches(&Message::from("3Typ4")));

        assert_eq!(FORMAT.query_command(Some(3)).unwrap().request(), b"3\\");
        assert!(matches!(FORMAT.query_command(None), Err(Error::ChannelRequired("format"))));
        assert!(matches!(
            FORMAT.query_command(Some(5)),
            Err(Error::ChannelOutOfRange { channel: 5, .. })
        ));
        assert!(matches!(
            VOLUME.query_command(Some(1)),
            Err(Error::UnexpectedChannel("volume"))
        ));

        let event = FORMAT.decode_notice(&Message::from("4Typ6")).unwrap();
        assert_eq!(event.channel(), Some(4));
        assert_eq!(event.value(), Some(&Value::Int(6)));
        assert!(FORMAT.decode_notice(&Message::from("9Typ6")).is_none());
    }

    #[test]
    fn signed_set_uses_the_negative_command() {
        let up = GAIN.set_command(None, &Value::Int(12)).unwrap();
        assert_eq!(up.request(), b"16*12G");
        assert!(up.matches(&Message::from("Aud+12")));

        let down = GAIN.set_command(None, &Value::Int(-66)).unwrap();
        assert_eq!(down.request(), b"16*66g");
        assert!(down.matches(&Message::from("Aud-66")));
        assert!(!down.matches(&Message::from("Aud+66")));
    }

    #[test]
    fn wrong_value_type_is_rejected_before_sending() {
        let err = MODE.set_command(None, &Value::Int(1)).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { property: "mode", .. }));
        assert_eq!(
            err.to_string(),
            "1 is not a valid \"mode\" (expected one of single, separate)"
        );
    }

    #[test]
    fn missing_commands() {
        assert!(matches!(MODE.query_command(None), Err(Error::NotReadable("mode"))));
        let reconfig = Property::new("reconfig", ValueKind::Signal).notice("Reconfig");
        assert!(matches!(
            reconfig.set_command(None, &Value::Bool(true)),
            Err(Error::NotWritable("reconfig"))
        ));
        let event = reconfig.decode_notice(&Message::from("Reconfig")).unwrap();
        assert_eq!(event.name(), "reconfig");
        assert!(event.value().is_none());
    }
}
