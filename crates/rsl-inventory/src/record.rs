//! ---
//! rsl_section: "03-persistence-logging"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Station record model and field validation."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use chrono::NaiveDate;
use rsl_common::{Platform, MAX_STATION_ID, MIN_STATION_ID};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Field-level validation failures for a [`StationRecord`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    /// Identifier outside `100..=999_999`.
    #[error("station id {0} is outside 100..=999999")]
    IdOutOfRange(u32),
    /// Address is not four dotted octets in `0..=255`.
    #[error("address '{0}' is not a valid IPv4 address")]
    InvalidAddress(String),
    /// Station name is not usable as a host name fragment.
    #[error("station name '{0}' must be lowercase letters, digits, or '-' and not start or end with '-'")]
    InvalidName(String),
    /// Hostname does not follow `<platform>-<name>`.
    #[error("hostname '{hostname}' is not derived from platform {platform}")]
    HostnameMismatch {
        /// Offending hostname.
        hostname: String,
        /// Platform stored in the same record.
        platform: Platform,
    },
    /// Status column holds an unknown value.
    #[error("unknown station status '{0}'")]
    UnknownStatus(String),
}

/// Operational status of a station.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum StationStatus {
    #[default]
    Active,
    Stopped,
    Error,
    Maintenance,
}

impl StationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StationStatus::Active => "active",
            StationStatus::Stopped => "stopped",
            StationStatus::Error => "error",
            StationStatus::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for StationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StationStatus {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(StationStatus::Active),
            "stopped" => Ok(StationStatus::Stopped),
            "error" => Ok(StationStatus::Error),
            "maintenance" => Ok(StationStatus::Maintenance),
            other => Err(RecordError::UnknownStatus(other.to_owned())),
        }
    }
}

/// One deployed station. The unit of truth in the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationRecord {
    pub id: u32,
    pub platform: Platform,
    pub hostname: String,
    pub address: String,
    pub description: String,
    pub created_date: NaiveDate,
    pub status: StationStatus,
}

impl StationRecord {
    /// Build a new active record with the hostname derived from platform and name.
    pub fn new(
        id: u32,
        platform: Platform,
        station_name: &str,
        address: impl Into<String>,
        description: impl Into<String>,
        created_date: NaiveDate,
    ) -> Result<Self, RecordError> {
        validate_station_name(station_name)?;
        let record = Self {
            id,
            platform,
            hostname: platform.hostname_for(station_name),
            address: address.into(),
            description: description.into(),
            created_date,
            status: StationStatus::Active,
        };
        record.validate()?;
        Ok(record)
    }

    /// Station name recovered from the hostname.
    pub fn station_name(&self) -> &str {
        self.hostname
            .strip_prefix(self.platform.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .unwrap_or(&self.hostname)
    }

    /// Structural checks over every field.
    pub fn validate(&self) -> Result<(), RecordError> {
        validate_station_id(self.id)?;
        validate_address(&self.address)?;
        let prefix = format!("{}-", self.platform.as_str());
        match self.hostname.strip_prefix(&prefix) {
            Some(name) if validate_station_name(name).is_ok() => Ok(()),
            _ => Err(RecordError::HostnameMismatch {
                hostname: self.hostname.clone(),
                platform: self.platform,
            }),
        }
    }
}

/// Identifier must lie in the global `100..=999_999` interval.
pub fn validate_station_id(id: u32) -> Result<(), RecordError> {
    if (MIN_STATION_ID..=MAX_STATION_ID).contains(&id) {
        Ok(())
    } else {
        Err(RecordError::IdOutOfRange(id))
    }
}

/// Four dotted decimal octets, each `0..=255`.
pub fn validate_address(address: &str) -> Result<(), RecordError> {
    Ipv4Addr::from_str(address)
        .map(|_| ())
        .map_err(|_| RecordError::InvalidAddress(address.to_owned()))
}

/// Station names become host name fragments, so restrict them to a DNS label alphabet.
pub fn validate_station_name(name: &str) -> Result<(), RecordError> {
    let valid = !name.is_empty()
        && name.len() <= 48
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-');
    if valid {
        Ok(())
    } else {
        Err(RecordError::InvalidName(name.to_owned()))
    }
}

/// Selects which records an inventory query returns.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum StationFilter {
    #[default]
    All,
    Platform(Platform),
}

impl StationFilter {
    pub fn matches(&self, record: &StationRecord) -> bool {
        match self {
            StationFilter::All => true,
            StationFilter::Platform(platform) => record.platform == *platform,
        }
    }
}

impl From<Option<Platform>> for StationFilter {
    fn from(platform: Option<Platform>) -> Self {
        platform.map_or(StationFilter::All, StationFilter::Platform)
    }
}
