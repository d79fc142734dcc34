//! ---
//! rsl_section: "01-core-functionality"
//! rsl_subsection: "module"
//! rsl_type: "source"
//! rsl_scope: "code"
//! rsl_description: "Station id allocation and address derivation."
//! rsl_version: "v0.0.0-prealpha"
//! rsl_owner: "tbd"
//! ---
//! Allocation is advisory. Nothing is reserved between `find_available_id`
//! and the deployment that uses it, so the deploy path re-checks both
//! collaborators at the `Validated` stage.

use std::net::Ipv4Addr;
use std::sync::Arc;

use rsl_inventory::InventoryBackend;
use tracing::debug;

use crate::collaborators::ComputeManager;
use crate::error::{LifecycleError, Result};

#[derive(Clone)]
pub struct ResourceAllocator {
    inventory: Arc<dyn InventoryBackend>,
    compute: Arc<dyn ComputeManager>,
}

impl ResourceAllocator {
    pub fn new(inventory: Arc<dyn InventoryBackend>, compute: Arc<dyn ComputeManager>) -> Self {
        Self { inventory, compute }
    }

    /// First id in `start..=end` unknown to both the compute manager and the inventory.
    pub async fn find_available_id(&self, start: u32, end: u32) -> Result<u32> {
        if start > end {
            return Err(LifecycleError::validation(format!(
                "allocation range start {start} exceeds end {end}"
            )));
        }
        let claimed = self.inventory.scan_ids()?;
        for candidate in start..=end {
            if claimed.contains(&candidate) {
                continue;
            }
            let live = self
                .compute
                .exists(candidate)
                .await
                .map_err(|err| LifecycleError::external("allocate", err))?;
            if live {
                debug!(candidate, "id held by an unregistered compute unit");
                continue;
            }
            return Ok(candidate);
        }
        Err(LifecycleError::RangeExhausted { start, end })
    }
}

/// `<prefix>.<suffix>`, rejected unless all four octets are `0..=255`.
pub fn derive_address(prefix: &str, suffix: u32) -> Result<String> {
    if suffix > 255 {
        return Err(LifecycleError::validation(format!(
            "address suffix {suffix} is not a valid octet; pass an explicit suffix in 0..=255"
        )));
    }
    let address = format!("{prefix}.{suffix}");
    address
        .parse::<Ipv4Addr>()
        .map_err(|_| LifecycleError::validation(format!("derived address '{address}' is invalid")))?;
    Ok(address)
}
