//! ---
//! rsl_section: "01-core-functionality"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Shared primitives and utilities for the core runtime."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Radio application platform installed onto a station.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Azuracast,
    Libretime,
    /// Reserved identifier. Records may carry it but no installer exists yet.
    Icecast,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Azuracast, Platform::Libretime, Platform::Icecast];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Azuracast => "azuracast",
            Platform::Libretime => "libretime",
            Platform::Icecast => "icecast",
        }
    }

    /// Whether an installer ships for this platform.
    pub fn is_implemented(&self) -> bool {
        !matches!(self, Platform::Icecast)
    }

    /// Hostname for a station of this platform, `<platform>-<station name>`.
    pub fn hostname_for(&self, station_name: &str) -> String {
        format!("{}-{}", self.as_str(), station_name)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a platform identifier is not one of the known variants.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "azuracast" => Ok(Platform::Azuracast),
            "libretime" => Ok(Platform::Libretime),
            "icecast" => Ok(Platform::Icecast),
            other => Err(UnknownPlatform(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("AzuraCast".parse::<Platform>().unwrap(), Platform::Azuracast);
        assert_eq!(" libretime ".parse::<Platform>().unwrap(), Platform::Libretime);
        assert!("shoutcast".parse::<Platform>().is_err());
    }

    #[test]
    fn hostname_joins_platform_and_name() {
        assert_eq!(Platform::Azuracast.hostname_for("main"), "azuracast-main");
        assert!(!Platform::Icecast.is_implemented());
    }
}
