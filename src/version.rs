use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A set of game releases, one bit per release from oldest to newest.
///
/// A single release is a set with one bit; signatures carry the OR of every
/// release they are valid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GameVersion(u8);

const NAMES: [(GameVersion, &str, &str); 5] = [
    (GameVersion::THREAT, "x2", "X2: The Threat"),
    (GameVersion::REUNION, "x3r", "X3: Reunion"),
    (GameVersion::TERRAN_CONFLICT, "x3tc", "X3: Terran Conflict"),
    (GameVersion::ALBION_PRELUDE, "x3ap", "X3: Albion Prelude"),
    (GameVersion::REBIRTH, "xr", "X Rebirth"),
];

impl GameVersion {
    pub const NONE: GameVersion = GameVersion(0);
    pub const THREAT: GameVersion = GameVersion(1 << 0);
    pub const REUNION: GameVersion = GameVersion(1 << 1);
    pub const TERRAN_CONFLICT: GameVersion = GameVersion(1 << 2);
    pub const ALBION_PRELUDE: GameVersion = GameVersion(1 << 3);
    pub const REBIRTH: GameVersion = GameVersion(1 << 4);
    pub const ALL: GameVersion = GameVersion(0b1_1111);

    pub fn from_bits(bits: u8) -> Option<GameVersion> {
        (bits & !Self::ALL.0 == 0).then_some(GameVersion(bits))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every release in `other` is also in `self`.
    pub fn contains(self, other: GameVersion) -> bool {
        !other.is_empty() && self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: GameVersion) -> bool {
        self.0 & other.0 != 0
    }

    pub fn without(self, other: GameVersion) -> GameVersion {
        GameVersion(self.0 & !other.0)
    }

    /// The single releases in this set, oldest first.
    pub fn releases(self) -> impl Iterator<Item = GameVersion> {
        NAMES
            .iter()
            .map(|(v, _, _)| *v)
            .filter(move |v| self.intersects(*v))
    }

    /// Map the engine version number stored in a compiled script to its release.
    pub fn from_engine_version(engine: i32) -> Option<GameVersion> {
        match engine {
            1..=24 => Some(Self::THREAT),
            25..=38 => Some(Self::REUNION),
            39..=49 => Some(Self::TERRAN_CONFLICT),
            50..=59 => Some(Self::ALBION_PRELUDE),
            60..=99 => Some(Self::REBIRTH),
            _ => None,
        }
    }

    /// Human readable release name, e.g. "X3: Terran Conflict".
    pub fn title(self) -> &'static str {
        NAMES
            .iter()
            .find(|(v, _, _)| *v == self)
            .map(|(_, _, title)| *title)
            .unwrap_or("multiple releases")
    }
}

impl BitOr for GameVersion {
    type Output = GameVersion;

    fn bitor(self, rhs: Self) -> Self::Output {
        GameVersion(self.0 | rhs.0)
    }
}

impl BitOrAssign for GameVersion {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for GameVersion {
    type Output = GameVersion;

    fn bitand(self, rhs: Self) -> Self::Output {
        GameVersion(self.0 & rhs.0)
    }
}

impl fmt::Display for GameVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if *self == Self::ALL {
            return write!(f, "all");
        }
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(v, _, _)| self.intersects(*v))
            .map(|(_, name, _)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

impl FromStr for GameVersion {
    type Err = String;

    /// Accepts a decimal bitmask, `all`, or `|`-separated short names such as `x3tc|x3ap`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(bits) = s.parse::<u8>() {
            return GameVersion::from_bits(bits)
                .ok_or_else(|| format!("version bitmask {} has unknown bits", bits));
        }
        if s.eq_ignore_ascii_case("all") {
            return Ok(Self::ALL);
        }
        if s.eq_ignore_ascii_case("none") {
            return Ok(Self::NONE);
        }

        let mut versions = Self::NONE;
        for part in s.split('|') {
            let part = part.trim();
            let (version, _, _) = NAMES
                .iter()
                .find(|(_, name, _)| name.eq_ignore_ascii_case(part))
                .ok_or_else(|| format!("unknown game version '{}'", part))?;
            versions |= *version;
        }
        Ok(versions)
    }
}

impl TryFrom<String> for GameVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GameVersion> for String {
    fn from(value: GameVersion) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmask_membership() {
        let tc_and_ap = GameVersion::TERRAN_CONFLICT | GameVersion::ALBION_PRELUDE;
        assert!(tc_and_ap.contains(GameVersion::ALBION_PRELUDE));
        assert!(!tc_and_ap.contains(GameVersion::REUNION));
        assert!(!tc_and_ap.contains(GameVersion::NONE));
        assert_eq!(tc_and_ap.releases().count(), 2);
        assert_eq!(
            tc_and_ap.without(GameVersion::TERRAN_CONFLICT),
            GameVersion::ALBION_PRELUDE
        );
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("x3tc|x3ap".parse::<GameVersion>().unwrap().bits(), 0b1100);
        assert_eq!("31".parse::<GameVersion>().unwrap(), GameVersion::ALL);
        assert_eq!("ALL".parse::<GameVersion>().unwrap(), GameVersion::ALL);
        assert!("x4".parse::<GameVersion>().is_err());
        assert!("64".parse::<GameVersion>().is_err());
        assert_eq!(
            (GameVersion::THREAT | GameVersion::REBIRTH).to_string(),
            "x2|xr"
        );
        assert_eq!(GameVersion::REUNION.title(), "X3: Reunion");
    }

    #[test]
    fn test_engine_versions() {
        assert_eq!(
            GameVersion::from_engine_version(44),
            Some(GameVersion::TERRAN_CONFLICT)
        );
        assert_eq!(GameVersion::from_engine_version(0), None);
    }

    #[test]
    fn test_serde_uses_names() {
        let json = serde_json::to_string(&GameVersion::ALBION_PRELUDE).unwrap();
        assert_eq!(json, "\"x3ap\"");
        let back: GameVersion = serde_json::from_str("\"x2|x3r\"").unwrap();
        assert_eq!(back, GameVersion::THREAT | GameVersion::REUNION);
    }
}
