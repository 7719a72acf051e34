//! The 13 administrative regions of Saudi Arabia.
//!
//! Each region is addressable three ways: the internal enum value stored in the
//! database (`RIYADH`), the ISO 3166-2 code used by the map layer (`SA-01`), and
//! an English display name (`Riyadh`). `SA-13` is not assigned.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum Region {
    Riyadh,
    Makkah,
    Madinah,
    EasternProvince,
    Qassim,
    Hail,
    Tabuk,
    NorthernBorders,
    Jazan,
    Najran,
    AlBahah,
    AlJawf,
    Asir,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown region '{0}'")]
pub struct UnknownRegion(pub String);

impl Region {
    pub const ALL: [Region; 13] = [
        Region::Riyadh,
        Region::Makkah,
        Region::Madinah,
        Region::EasternProvince,
        Region::Qassim,
        Region::Hail,
        Region::Tabuk,
        Region::NorthernBorders,
        Region::Jazan,
        Region::Najran,
        Region::AlBahah,
        Region::AlJawf,
        Region::Asir,
    ];

    /// Internal enum value, as persisted.
    pub const fn as_str(self) -> &'static str {
        match self {
            Region::Riyadh => "RIYADH",
            Region::Makkah => "MAKKAH",
            Region::Madinah => "MADINAH",
            Region::EasternProvince => "EASTERN_PROVINCE",
            Region::Qassim => "QASSIM",
            Region::Hail => "HAIL",
            Region::Tabuk => "TABUK",
            Region::NorthernBorders => "NORTHERN_BORDERS",
            Region::Jazan => "JAZAN",
            Region::Najran => "NAJRAN",
            Region::AlBahah => "AL_BAHAH",
            Region::AlJawf => "AL_JAWF",
            Region::Asir => "ASIR",
        }
    }

    /// ISO 3166-2 subdivision code.
    pub const fn code(self) -> &'static str {
        match self {
            Region::Riyadh => "SA-01",
            Region::Makkah => "SA-02",
            Region::Madinah => "SA-03",
            Region::EasternProvince => "SA-04",
            Region::Qassim => "SA-05",
            Region::Hail => "SA-06",
            Region::Tabuk => "SA-07",
            Region::NorthernBorders => "SA-08",
            Region::Jazan => "SA-09",
            Region::Najran => "SA-10",
            Region::AlBahah => "SA-11",
            Region::AlJawf => "SA-12",
            Region::Asir => "SA-14",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Region::Riyadh => "Riyadh",
            Region::Makkah => "Makkah",
            Region::Madinah => "Madinah",
            Region::EasternProvince => "Eastern Province",
            Region::Qassim => "Qassim",
            Region::Hail => "Hail",
            Region::Tabuk => "Tabuk",
            Region::NorthernBorders => "Northern Borders",
            Region::Jazan => "Jazan",
            Region::Najran => "Najran",
            Region::AlBahah => "Al Bahah",
            Region::AlJawf => "Al Jawf",
            Region::Asir => "Asir",
        }
    }

    /// Look up a region by its external code (`SA-01`). Case-insensitive.
    pub fn from_code(code: &str) -> Option<Region> {
        let code = code.trim();
        Self::ALL
            .into_iter()
            .find(|r| r.code().eq_ignore_ascii_case(code))
    }

    /// Look up a region by display name, ignoring case, spaces, hyphens and
    /// underscores so that "eastern-province" and "Eastern Province" agree.
    pub fn from_display_name(name: &str) -> Option<Region> {
        let wanted = squash(name);
        if wanted.is_empty() {
            return None;
        }
        Self::ALL
            .into_iter()
            .find(|r| squash(r.display_name()) == wanted)
    }

    /// Accept any of the three spellings: code, enum value, or display name.
    pub fn parse_any(input: &str) -> Result<Region, UnknownRegion> {
        Self::from_code(input)
            .or_else(|| input.parse().ok())
            .or_else(|| Self::from_display_name(input))
            .ok_or_else(|| UnknownRegion(input.trim().to_owned()))
    }
}

fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

impl FromStr for Region {
    type Err = UnknownRegion;

    /// Parses the internal enum value (`EASTERN_PROVINCE`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownRegion(s.to_owned()))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
