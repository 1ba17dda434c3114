//! Deterministic address planning.
//!
//! Each application owns the `10.0.{app_id}.0/24` slice of the shared VPC
//! address space and carves one /28 public subnet out of it per availability
//! zone. The listener-rule priority is derived from the same identifier so
//! that independent applications never collide on a shared listener.

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("app_id {0} does not fit the third octet (maximum is 255)")]
    AppIdOutOfRange(u32),

    #[error("zone count {0} does not fit the /24 slice (must be between 1 and 16)")]
    ZoneCountOutOfRange(u32),
}

/// The /28 stride inside an application's /24 slice. 16 addresses per zone,
/// 16 zones per application, no overlap by construction.
const ZONE_STRIDE: u32 = 16;
const MAX_ZONES: u32 = 16;
const MAX_APP_ID: u32 = 255;

/// Listener-rule priorities go in steps of 10, leaving room between
/// applications for manually managed rules.
const PRIORITY_STEP: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPlan {
    pub app_id: u32,
    pub zone_count: u32,

    /// One CIDR block per zone index, ordered.
    pub subnet_blocks: Vec<String>,

    /// Listener-rule priority on the shared ALB listener.
    pub routing_priority: u32,
}

impl AddressPlan {
    /// Computes the plan for an application. Pure and deterministic; inputs
    /// that would overflow the addressing scheme are rejected rather than
    /// truncated.
    pub fn compute(app_id: u32, zone_count: u32) -> Result<Self, Error> {
        if app_id > MAX_APP_ID {
            return Err(Error::AppIdOutOfRange(app_id));
        }
        if zone_count == 0 || zone_count > MAX_ZONES {
            return Err(Error::ZoneCountOutOfRange(zone_count));
        }

        let subnet_blocks = (0..zone_count)
            .map(|zone_index| format!("10.0.{}.{}/28", app_id, zone_index * ZONE_STRIDE))
            .collect();

        Ok(Self {
            app_id,
            zone_count,
            subnet_blocks,
            routing_priority: app_id * PRIORITY_STEP,
        })
    }
}
