//! Extron MPS 112 media presentation switcher
//!
//! Twelve inputs in three groups of four. In separate mode each group has its
//! own selected input; in single mode one input is selected overall.
use transport::{Command, DecodeError, Value};

use crate::device::Device;
use crate::error::Result;
use crate::models::Model;
use crate::property::{Property, ValueKind};

pub const EXECUTIVE_MODES: &[(u32, &str)] = &[(0, "unlocked"), (1, "limited"), (2, "complete")];
pub const SWITCHER_MODES: &[(u32, &str)] = &[(1, "single"), (2, "separate")];

pub static MODEL: Model = Model {
    name: "MPS 112",
    properties: &[
        Property::new("volume", ValueKind::Int)
            .query("V")
            .set("{v}V")
            .notice("Vol{v}"),
        Property::new("mute", ValueKind::Bool)
            .query("Z")
            .set("{v}Z")
            .notice("Amt{v}"),
        Property::new("mic_volume", ValueKind::Int)
            .query("16G")
            .set_signed("16*{v}G", "16*{v}g")
            .notice("Aud{v}"),
        Property::new("mic_mute", ValueKind::Bool)
            .query("M")
            .set("{v}M")
            .notice("Mix{v}"),
        Property::new("executive_mode", ValueKind::Enum(EXECUTIVE_MODES))
            .query("X")
            .set("{v}X")
            .notice("Exe{v}"),
        Property::new("switcher_mode", ValueKind::Enum(SWITCHER_MODES))
            .query("1#")
            .set("{v}*1#")
            .notice("Mod{v}"),
        Property::new("mic_threshold", ValueKind::Int)
            .query("2#")
            .set("{v}*2#")
            .notice("Thr{v}"),
        // no query; the selection per group comes from `status`
        Property::new("input", ValueKind::Int)
            .set("{i}*{v}!")
            .notice("Chn{i}*{v}")
            .channels(1, 3),
        Property::new("single_input", ValueKind::Int)
            .set("{v}!")
            .notice("Chn{v}"),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitcherMode {
    Single,
    Separate,
}

/// Answer to the `I` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub mode: SwitcherMode,
    /// Selected input of groups 1 to 3; 0 means none.
    pub input: [u32; 3],
    /// Group the program audio comes from.
    pub audio_group: u32,
    /// Program audio input within `audio_group`.
    pub audio_input: u32,
}

impl Status {
    pub fn input(&self, group: u32) -> Option<u32> {
        let index = usize::try_from(group.checked_sub(1)?).ok()?;
        self.input.get(index).copied()
    }

    /// The audio selection as an input number from 1 to 12, or 0 for none.
    pub fn single_input(&self) -> u32 {
        separate_to_single_input(self.audio_group, self.audio_input)
    }
}

/// Input `index` of `group`, numbered across all groups.
pub fn separate_to_single_input(group: u32, index: u32) -> u32 {
    if index == 0 {
        0
    } else {
        (group.saturating_sub(1)) * 4 + index
    }
}

/// Parse a status line such as `Mod2 1G1 2G0 3G4 4G=3G4`.
pub fn parse_status(line: &str) -> Option<Status> {
    fn digit(field: &str, prefix: &str) -> Option<u32> {
        let value = field.strip_prefix(prefix)?;
        (value.len() == 1).then(|| value.parse().ok()).flatten()
    }

    let mut fields = line.split(' ');
    let mode = match digit(fields.next()?, "Mod")? {
        1 => SwitcherMode::Single,
        2 => SwitcherMode::Separate,
        _ => return None,
    };
    let input = [
        digit(fields.next()?, "1G")?,
        digit(fields.next()?, "2G")?,
        digit(fields.next()?, "3G")?,
    ];
    let (group, audio_input) = fields.next()?.strip_prefix("4G=")?.split_once('G')?;
    if fields.next().is_some() {
        return None;
    }

    Some(Status {
        mode,
        input,
        audio_group: digit(group, "")?,
        audio_input: digit(audio_input, "")?,
    })
}

fn status_command() -> Command<Status> {
    Command::new(
        "I",
        |reply| parse_status(reply.text()).is_some(),
        |reply| {
            parse_status(reply.text()).ok_or_else(|| DecodeError::new("malformed status line"))
        },
    )
}

/// Read the switcher status.
pub fn status(device: &Device) -> Result<Status> {
    Ok(device.client().send(status_command())?)
}

/// Selected input of `group`, read from the status.
pub fn input(device: &Device, group: u32) -> Result<u32> {
    let property = device.property("input")?;
    property.check_channel(Some(group))?;
    let status = status(device)?;
    Ok(status.input(group).unwrap_or_default())
}

/// Select `input` in `group`.
pub fn set_input(device: &Device, group: u32, input: u32) -> Result<u32> {
    let value = device.set_indexed("input", group, Value::Int(i64::from(input)))?;
    Ok(value.as_int().and_then(|v| u32::try_from(v).ok()).unwrap_or(input))
}
