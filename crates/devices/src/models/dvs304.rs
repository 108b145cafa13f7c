//! Extron DVS 304 scaler family (including the DVI variants)
use std::fmt;
use std::str::FromStr;

use transport::{Command, DecodeError, Value};

use crate::device::Device;
use crate::error::{Error, Result};
use crate::models::Model;
use crate::property::{Codec, Property, ValueKind};
use crate::resolution::Resolution;

pub const INPUT_FORMATS: &[(u32, &str)] = &[
    (1, "cvbs"),
    (2, "svideo"),
    (3, "rgbcvs"),
    (4, "yuv-i"),
    (5, "yuv-p"),
    (6, "rgb-scaled"),
    (7, "rgb-passthrough"),
    (8, "yuv-auto"),
    (9, "sdi"),
];

pub const TEST_PATTERNS: &[(u32, &str)] = &[
    (0, "off"),
    (1, "crop"),
    (2, "alternating-pixels"),
    (3, "color-bars"),
];

/// Output resolution codes of the `=` command.
const RESOLUTIONS: &[(u32, Resolution)] = &[
    (1, Resolution::new(640, 480)),
    (2, Resolution::new(800, 600)),
    (3, Resolution::new(852, 480)),
    (4, Resolution::new(1024, 768)),
    (5, Resolution::new(1024, 852)),
    (6, Resolution::new(1024, 1024)),
    (7, Resolution::new(1280, 768)),
    (8, Resolution::new(1280, 1024)),
    (9, Resolution::new(1360, 765)),
    (10, Resolution::new(1364, 768)),
    (11, Resolution::new(1365, 1024)),
    (12, Resolution::new(1366, 768)),
    (13, Resolution::new(1400, 1050)),
    (14, Resolution::new(1600, 1200)),
    (15, Resolution::new(720, 480)),
    (16, Resolution::new(720, 576)),
    (17, Resolution::new(1280, 720)),
    (18, Resolution::new(1920, 1080).interlaced()),
    (19, Resolution::new(1920, 1080)),
    (20, Resolution::new(1440, 900)),
    (21, Resolution::new(1680, 1050)),
    (22, Resolution::new(1280, 800)),
    (23, Resolution::new(1920, 1080).sharp()),
    (24, Resolution::new(1920, 1200)),
    (25, Resolution::new(1920, 1080).cvt()),
];

const REFRESH_RATES: &[(u32, Refresh)] = &[
    (1, Refresh::hz(50)),
    (2, Refresh::hz(60)),
    (3, Refresh::hz(72)),
    (4, Refresh::hz(96)),
    (5, Refresh::hz(100)),
    (6, Refresh::hz(120)),
    (7, Refresh(5994)),
];

/// Refresh code 3 means 72 Hz except at these resolutions.
fn third_refresh_rate(resolution: Resolution) -> Option<Refresh> {
    match (resolution.width, resolution.height) {
        (1440, 900) => Some(Refresh::hz(75)),
        (1920, 1080) => Some(Refresh::hz(24)),
        _ => None,
    }
}

/// Refresh rate in hundredths of a hertz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Refresh(pub u32);

impl Refresh {
    pub const fn hz(hz: u32) -> Self {
        Self(hz * 100)
    }
}

impl fmt::Display for Refresh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (whole, hundredths) = (self.0 / 100, self.0 % 100);
        if hundredths == 0 {
            write!(f, "{whole}")
        } else {
            write!(f, "{whole}.{hundredths:02}")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not an output rate: {0:?}")]
pub struct ParseOutputRateError(pub String);

impl FromStr for Refresh {
    type Err = ParseOutputRateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || ParseOutputRateError(s.to_owned());
        let digits = |t: &str| !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit());

        let (whole, fraction) = s.split_once('.').unwrap_or((s, "0"));
        if !digits(whole) || !digits(fraction) || fraction.len() > 2 {
            return Err(invalid());
        }
        let whole: u32 = whole.parse().map_err(|_| invalid())?;
        let mut hundredths: u32 = fraction.parse().map_err(|_| invalid())?;
        if fraction.len() == 1 {
            hundredths *= 10;
        }
        whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(hundredths))
            .map(Refresh)
            .ok_or_else(invalid)
    }
}

/// Output resolution and refresh rate, written `<resolution>@<hz>`, e.g.
/// `1280x768@60` or `1080p@59.94`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputRate {
    pub resolution: Resolution,
    pub refresh: Refresh,
}

impl fmt::Display for OutputRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.resolution, self.refresh)
    }
}

impl FromStr for OutputRate {
    type Err = ParseOutputRateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || ParseOutputRateError(s.to_owned());
        let (resolution, refresh) = s.rsplit_once('@').ok_or_else(invalid)?;
        Ok(OutputRate {
            resolution: resolution.parse().map_err(|_| invalid())?,
            refresh: refresh.parse()?,
        })
    }
}

impl OutputRate {
    /// The `<resolution>*<refresh>` codes, if the scaler has this mode.
    fn to_wire(self) -> Option<String> {
        let (resolution, _) = RESOLUTIONS.iter().find(|(_, r)| *r == self.resolution)?;
        let refresh = match third_refresh_rate(self.resolution) {
            Some(third) if third == self.refresh => 3,
            // code 3 would come back as the other rate
            Some(_) if self.refresh == Refresh::hz(72) => return None,
            _ => REFRESH_RATES.iter().find(|(_, r)| *r == self.refresh)?.0,
        };
        Some(format!("{resolution:02}*{refresh:02}"))
    }

    fn from_wire(wire: &str) -> Option<Self> {
        let (resolution, refresh) = wire.split_once('*')?;
        let (resolution, refresh): (u32, u32) = (resolution.parse().ok()?, refresh.parse().ok()?);
        let resolution = RESOLUTIONS.iter().find(|(c, _)| *c == resolution)?.1;
        let refresh = match third_refresh_rate(resolution) {
            Some(third) if refresh == 3 => third,
            _ => REFRESH_RATES.iter().find(|(c, _)| *c == refresh)?.1,
        };
        Some(OutputRate {
            resolution,
            refresh,
        })
    }
}

fn decode_output_rate(wire: &str) -> Option<Value> {
    OutputRate::from_wire(wire).map(|rate| Value::Enum(rate.to_string()))
}

fn encode_output_rate(value: &Value) -> Option<String> {
    value.as_enum()?.parse::<OutputRate>().ok()?.to_wire()
}

static OUTPUT_RATE: Codec = Codec {
    name: "output rate",
    expected: "a supported resolution and refresh rate such as 1280x768@60",
    decode: decode_output_rate,
    encode: encode_output_rate,
};

const fn int(name: &'static str, query: &'static str, set: &'static str, notice: &'static str) -> Property {
    Property::new(name, ValueKind::Int)
        .query(query)
        .set(set)
        .notice(notice)
}

const fn flag(name: &'static str, query: &'static str, set: &'static str, notice: &'static str) -> Property {
    Property::new(name, ValueKind::Bool)
        .query(query)
        .set(set)
        .notice(notice)
}

pub static MODEL: Model = Model {
    name: "DVS 304",
    properties: &[
        int("input", "!", "{v}!", "In{v} All"),
        int("video_input", "&", "{v}&", "In{v} RGB"),
        int("audio_input", "$", "{v}$", "In{v} Aud"),
        Property::new("video_input_format", ValueKind::Enum(INPUT_FORMATS))
            .query("{i}\\")
            .set("{i}*{v}\\")
            .notice("{i}Typ{v}")
            .channels(1, 4),
        int("horiz_start", ")", "{v})", "Hst{v}"),
        int("vert_start", "(", "{v}(", "Vst{v}"),
        int("pixel_phase", "U", "{v}U", "Phs{v}"),
        int("total_pixels", "11#", "11*{v}#", "Tpx{v}"),
        int("active_pixels", "12#", "12*{v}#", "Apx{v}"),
        int("active_lines", "13#", "13*{v}#", "Aln{v}"),
        flag("film_mode", "18#", "18*{v}#", "Flm{v}"),
        flag("video_mute", "B", "{v}B", "Vmt{v}"),
        int("color", "C", "{v}C", "Col{v}"),
        int("tint", "T", "{v}T", "Tin{v}"),
        int("contrast", "^", "{v}^", "Con{v}"),
        int("brightness", "Y", "{v}Y", "Brt{v}"),
        int("detail_filter", "D", "{v}D", "Shp{v}"),
        int("horiz_shift", "H", "{v}H", "Hph{v}"),
        int("vert_shift", "/", "{v}/", "Vph{v}"),
        int("horiz_size", ":", "{v}:", "Hsz{v}"),
        int("vert_size", ";", "{v};", "Vsz{v}"),
        int("zoom", "{", "{v}{", "Zom{v}"),
        Property::new("output_rate", ValueKind::Custom(&OUTPUT_RATE))
            .query("=")
            .set("{v}=")
            .notice("Rte{v}"),
        Property::new("test_pattern", ValueKind::Enum(TEST_PATTERNS))
            .query("J")
            .set("{v}J")
            .notice("Tst{v}"),
        flag("freeze", "F", "{v}F", "Frz{v}"),
        flag("auto_switch", "10#", "10*{v}#", "Asw{v}"),
        flag("blue_screen", "8#", "8*{v}#", "Blu{v}"),
        int("auto_image", "55#", "55*{v}#", "Img{v}"),
        // sent after the scaler re-detects its input signal
        Property::new("reconfig", ValueKind::Signal).notice("Reconfig"),
    ],
};

fn temperature_command() -> Command<f64> {
    Command::new(
        "20S",
        |reply| reply.text().parse::<f64>().is_ok(),
        |reply| {
            reply
                .text()
                .parse()
                .map_err(|e: std::num::ParseFloatError| DecodeError::new(e.to_string()))
        },
    )
}

/// Internal temperature in degrees Celsius.
pub fn temperature(device: &Device) -> Result<f64> {
    Ok(device.client().send(temperature_command())?)
}

fn to_output_rate(value: Value) -> Result<OutputRate> {
    let parsed = value.as_enum().and_then(|text| text.parse().ok());
    parsed.ok_or_else(|| Error::InvalidValue {
        property: "output_rate",
        value,
        expected: OUTPUT_RATE.expected.to_owned(),
    })
}

pub fn output_rate(device: &Device) -> Result<OutputRate> {
    to_output_rate(device.get("output_rate")?)
}

/// Switch the output mode. Combinations the scaler does not offer are
/// rejected by the device with [`crate::ErrorCode::InvalidParameter`].
pub fn set_output_rate(device: &Device, rate: OutputRate) -> Result<OutputRate> {
    to_output_rate(device.set("output_rate", Value::Enum(rate.to_string()))?)
}

/// Video standard detected on an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputStandard {
    None,
    Ntsc358,
    Pal,
    Ntsc443,
    Secam,
    /// Usually RGB or HDTV.
    Other,
}

impl InputStandard {
    fn from_code(code: char) -> Option<Self> {
        Some(match code {
            '0' => InputStandard::None,
            '1' => InputStandard::Ntsc358,
            '2' => InputStandard::Pal,
            '3' => InputStandard::Ntsc443,
            '4' => InputStandard::Secam,
            '-' => InputStandard::Other,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InputStandard::None => "none",
            InputStandard::Ntsc358 => "ntsc-3.58",
            InputStandard::Pal => "pal",
            InputStandard::Ntsc443 => "ntsc-4.43",
            InputStandard::Secam => "secam",
            InputStandard::Other => "other",
        }
    }
}

impl fmt::Display for InputStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer to the `I` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// 0 when no input is selected.
    pub video_input: u32,
    pub audio_input: u32,
    /// Name from [`INPUT_FORMATS`] of the selected input's format.
    pub input_format: &'static str,
    pub input_standard: InputStandard,
    /// Standards stored in memory presets 1 to 3.
    pub presets: [InputStandard; 3],
    /// Only reported by models with an SDI input.
    pub sdi_input: Option<u32>,
}

impl Status {
    pub fn preset(&self, preset: u32) -> Option<InputStandard> {
        let index = usize::try_from(preset.checked_sub(1)?).ok()?;
        self.presets.get(index).copied()
    }
}

/// Parse a status line such as `Vid2 Aud1 Typ1 Std0 Pre100 Sdi3`.
pub fn parse_status(line: &str) -> Option<Status> {
    fn single(field: &str, prefix: &str) -> Option<char> {
        let mut chars = field.strip_prefix(prefix)?.chars();
        let c = chars.next()?;
        chars.next().is_none().then_some(c)
    }
    fn input(c: char) -> Option<u32> {
        if c == '-' { Some(0) } else { c.to_digit(10) }
    }

    let mut fields = line.split(' ');
    let video_input = input(single(fields.next()?, "Vid")?)?;
    let audio_input = input(single(fields.next()?, "Aud")?)?;
    let format = single(fields.next()?, "Typ")?.to_digit(10)?;
    let input_format = INPUT_FORMATS.iter().find(|(c, _)| *c == format)?.1;
    let input_standard = InputStandard::from_code(single(fields.next()?, "Std")?)?;

    let presets: Vec<InputStandard> = fields
        .next()?
        .strip_prefix("Pre")?
        .chars()
        .map(|c| InputStandard::from_code(c).filter(|_| c.is_ascii_digit()))
        .collect::<Option<_>>()?;
    let presets: [InputStandard; 3] = presets.try_into().ok()?;

    let sdi_input = match fields.next() {
        Some(field) => Some(input(single(field, "Sdi")?)?),
        None => None,
    };
    if fields.next().is_some() {
        return None;
    }

    Some(Status {
        video_input,
        audio_input,
        input_format,
        input_standard,
        presets,
        sdi_input,
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

pub fn status(device: &Device) -> Result<Status> {
    Ok(device.client().send(status_command())?)
}
