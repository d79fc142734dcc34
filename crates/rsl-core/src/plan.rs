//! ---
//! rsl_section: "01-core-functionality"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Deployment requests, resolved station specs, and storage quotas."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use rsl_common::Platform;
use serde::Serialize;

use crate::error::LifecycleError;

const UNITS: [(char, u32); 4] = [('T', 40), ('G', 30), ('M', 20), ('K', 10)];

/// Storage quota in bytes, written as `<n>[K|M|G|T]` with binary multiples.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Quota(u64);

impl Quota {
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }
}

impl FromStr for Quota {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || LifecycleError::validation(format!("invalid quota '{s}', expected <n>[K|M|G|T]"));
        let (digits, shift) = match trimmed.chars().last() {
            Some(last) if last.is_ascii_alphabetic() => {
                let upper = last.to_ascii_uppercase();
                let shift = UNITS
                    .iter()
                    .find(|(unit, _)| *unit == upper)
                    .map(|(_, shift)| *shift)
                    .ok_or_else(invalid)?;
                (&trimmed[..trimmed.len() - 1], shift)
            }
            _ => (trimmed, 0),
        };
        let value: u64 = digits.parse().map_err(|_| invalid())?;
        if value == 0 {
            return Err(LifecycleError::validation("quota must be greater than zero"));
        }
        value
            .checked_mul(1u64 << shift)
            .map(Quota)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (unit, shift) in UNITS {
            let size = 1u64 << shift;
            if self.0 >= size && self.0 % size == 0 {
                return write!(f, "{}{}", self.0 / size, unit);
            }
        }
        write!(f, "{}", self.0)
    }
}

/// Operator request to deploy (or resume deploying) one station.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    /// Explicit id; allocated from the configured range when `None`.
    pub id: Option<u32>,
    pub name: String,
    pub platform: Platform,
    pub cores: Option<u32>,
    pub memory_mb: Option<u32>,
    pub quota: Quota,
    /// Last address octet; defaults to the id, which only works up to 255.
    pub address_suffix: Option<u32>,
    pub description: String,
    pub version: Option<String>,
    /// Accept pre-existing resources and skip completed stages.
    pub resume: bool,
}

impl DeployRequest {
    pub fn new(name: impl Into<String>, platform: Platform, quota: Quota) -> Self {
        Self {
            id: None,
            name: name.into(),
            platform,
            cores: None,
            memory_mb: None,
            quota,
            address_suffix: None,
            description: String::new(),
            version: None,
            resume: false,
        }
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_address_suffix(mut self, suffix: u32) -> Self {
        self.address_suffix = Some(suffix);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_resources(mut self, cores: u32, memory_mb: u32) -> Self {
        self.cores = Some(cores);
        self.memory_mb = Some(memory_mb);
        self
    }

    pub fn resuming(mut self) -> Self {
        self.resume = true;
        self
    }
}

/// Fully resolved deployment plan. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct StationSpec {
    pub id: u32,
    pub station_name: String,
    pub platform: Platform,
    pub cores: u32,
    pub memory_mb: u32,
    pub swap_mb: u32,
    pub quota: Quota,
    pub address_suffix: u32,
    pub hostname: String,
    pub address: String,
    pub dataset_path: String,
    pub host_path: PathBuf,
    pub mount_path: PathBuf,
    pub install_path: PathBuf,
    pub description: String,
    pub version: Option<String>,
    pub resume: bool,
}

/// Swap is sized at a quarter of memory.
pub fn swap_for(memory_mb: u32) -> u32 {
    memory_mb / 4
}
