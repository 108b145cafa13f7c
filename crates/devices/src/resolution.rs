//! Video resolutions as scalers name them
use std::fmt;
use std::str::FromStr;

/// A video resolution, optionally with the timing variants scalers offer.
///
/// Resolutions with a SMPTE name print as that name (`720p`, `1080i`), all
/// others as `<width>x<height>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
    pub interlaced: bool,
    /// VESA coordinated video timings.
    pub cvt: bool,
    pub sharp: bool,
}

const SMPTE: &[(u32, u32)] = &[(720, 480), (720, 576), (1280, 720), (1920, 1080)];

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            interlaced: false,
            cvt: false,
            sharp: false,
        }
    }

    pub const fn interlaced(mut self) -> Self {
        self.interlaced = true;
        self
    }

    pub const fn cvt(mut self) -> Self {
        self.cvt = true;
        self
    }

    pub const fn sharp(mut self) -> Self {
        self.sharp = true;
        self
    }

    fn is_smpte(&self) -> bool {
        SMPTE.contains(&(self.width, self.height))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_smpte() {
            let scan = if self.interlaced { 'i' } else { 'p' };
            write!(f, "{}{scan}", self.height)?;
        } else {
            write!(f, "{}x{}", self.width, self.height)?;
        }
        if self.cvt {
            f.write_str(" CVT")
        } else if self.sharp {
            f.write_str(" Sharp")
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a resolution: {0:?}")]
pub struct ParseResolutionError(pub String);

fn dimension(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

impl FromStr for Resolution {
    type Err = ParseResolutionError;

    /// Accepts `640x480` as well as SMPTE names such as `1080i`, `1080p Sharp`
    /// and `1080p CVT`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseResolutionError(s.to_owned());

        if let Some((width, height)) = s.split_once('x') {
            return match (dimension(width), dimension(height)) {
                (Some(width), Some(height)) => Ok(Resolution::new(width, height)),
                _ => Err(invalid()),
            };
        }

        let (name, cvt, sharp) = if let Some(name) = s.strip_suffix(" CVT") {
            (name, true, false)
        } else if let Some(name) = s.strip_suffix(" Sharp") {
            (name, false, true)
        } else {
            (s, false, false)
        };
        let (lines, interlaced) = if let Some(lines) = name.strip_suffix('p') {
            (lines, false)
        } else if let Some(lines) = name.strip_suffix('i') {
            (lines, true)
        } else {
            return Err(invalid());
        };
        let height = dimension(lines).ok_or_else(invalid)?;
        let &(width, height) = SMPTE
            .iter()
            .find(|(_, h)| *h == height)
            .ok_or_else(invalid)?;

        Ok(Resolution {
            width,
            height,
            interlaced,
            cvt,
            sharp,
        })
    }
}
