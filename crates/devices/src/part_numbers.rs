//! Extron part numbers and the model each one speaks
use std::fmt;
use std::str::FromStr;

use crate::models::{Model, dvs304, mps112};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PartNumber {
    Mps112,
    Mps112Cs,
    Dvs304,
    Dvs304A,
    Dvs304D,
    Dvs304Ad,
    Dvs304Dvi,
    Dvs304DviA,
    Dvs304DviD,
    Dvs304DviAd,
}

const ALL: [PartNumber; 10] = [
    PartNumber::Mps112,
    PartNumber::Mps112Cs,
    PartNumber::Dvs304,
    PartNumber::Dvs304A,
    PartNumber::Dvs304D,
    PartNumber::Dvs304Ad,
    PartNumber::Dvs304Dvi,
    PartNumber::Dvs304DviA,
    PartNumber::Dvs304DviD,
    PartNumber::Dvs304DviAd,
];

impl PartNumber {
    pub fn all() -> &'static [PartNumber] {
        &ALL
    }

    /// As reported by the `N` command.
    pub fn as_str(self) -> &'static str {
        match self {
            PartNumber::Mps112 => "60-532-01",
            PartNumber::Mps112Cs => "60-532-02",
            PartNumber::Dvs304 => "60-736-01",
            PartNumber::Dvs304A => "60-736-02",
            PartNumber::Dvs304D => "60-736-03",
            PartNumber::Dvs304Ad => "60-736-04",
            PartNumber::Dvs304Dvi => "60-1027-01",
            PartNumber::Dvs304DviA => "60-1027-02",
            PartNumber::Dvs304DviD => "60-1027-03",
            PartNumber::Dvs304DviAd => "60-1027-04",
        }
    }

    pub fn model(self) -> &'static Model {
        match self {
            PartNumber::Mps112 | PartNumber::Mps112Cs => &mps112::MODEL,
            _ => &dvs304::MODEL,
        }
    }
}

impl fmt::Display for PartNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown part number {0:?}")]
pub struct UnknownPartNumber(pub String);

impl FromStr for PartNumber {
    type Err = UnknownPartNumber;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ALL.into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownPartNumber(s.to_owned()))
    }
}

/// Shape of a part number reply, `60-532-01`.
pub(crate) fn looks_like_part_number(line: &str) -> bool {
    let groups: Vec<&str> = line.split('-').collect();
    groups.len() == 3
        && groups
            .iter()
            .all(|g| !g.is_empty() && g.bytes().all(|b| b.is_ascii_digit()))
}
