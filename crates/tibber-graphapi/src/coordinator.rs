//! Poll coordinator that keeps a vehicle state snapshot fresh

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::client::TibberClient;
use crate::error::{Result, TibberClientError};
use crate::queries::{QUERY_GET_VEHICLE, QUERY_HOMES};
use crate::types::{HomesData, VehicleData, VehicleSnapshot};

/// Default seconds between polls; the host scheduler owns the cadence
pub const DEFAULT_SCAN_INTERVAL: u64 = 60;

/// Default position in the account's vehicle list
pub const DEFAULT_VEHICLE_INDEX: usize = 0;

/// Maintains the last-known-good [`VehicleSnapshot`] for one vehicle.
///
/// The home id is resolved on the first poll and cached for the
/// coordinator's lifetime. A failed refresh leaves the previous snapshot
/// in place, so snapshot readers only ever see complete data.
pub struct VehicleCoordinator {
    client: Arc<TibberClient>,
    vehicle_index: usize,
    home_id: RwLock<Option<String>>,
    snapshot: RwLock<Option<VehicleSnapshot>>,
}

impl VehicleCoordinator {
    pub fn new(client: Arc<TibberClient>, vehicle_index: usize) -> Self {
        Self {
            client,
            vehicle_index,
            home_id: RwLock::new(None),
            snapshot: RwLock::new(None),
        }
    }

    /// Fetch fresh vehicle data and replace the snapshot wholesale.
    ///
    /// Errors go back to the invoking scheduler for logging; the snapshot
    /// keeps its previous value on every failure path, including an
    /// out-of-range [`vehicle index`](TibberClientError::VehicleIndexOutOfRange),
    /// which is reported distinctly from network failures.
    pub async fn refresh(&self) -> Result<()> {
        let home_id = self.resolve_home_id().await?;

        let data: VehicleData = self
            .client
            .query(
                QUERY_GET_VEHICLE,
                serde_json::json!({ "homeId": &home_id }),
            )
            .await?;

        let vehicles = data.viewer.home.vehicles;
        let vehicle = vehicles.get(self.vehicle_index).ok_or(
            TibberClientError::VehicleIndexOutOfRange {
                index: self.vehicle_index,
                count: vehicles.len(),
            },
        )?;

        let snapshot = VehicleSnapshot {
            vehicle_id: vehicle.id.clone(),
            home_id,
            battery_level: vehicle.battery_level,
            range: vehicle.range,
            charging: vehicle.charging,
            charging_power: vehicle.charging_power,
            connected: vehicle.connected,
        };
        debug!(
            vehicle_id = %snapshot.vehicle_id,
            battery_level = snapshot.battery_level,
            charging = snapshot.charging,
            "snapshot updated"
        );
        *self.snapshot.write() = Some(snapshot);
        Ok(())
    }

    /// Last successful snapshot; `None` before the first successful poll
    pub fn snapshot(&self) -> Option<VehicleSnapshot> {
        self.snapshot.read().clone()
    }

    /// Home id resolved on the first poll, if any poll got that far
    pub fn home_id(&self) -> Option<String> {
        self.home_id.read().clone()
    }

    pub fn vehicle_index(&self) -> usize {
        self.vehicle_index
    }

    /// Re-authenticate ahead of token expiry.
    ///
    /// For the host's periodic trigger, independent of the poll cadence.
    pub async fn refresh_token(&self) -> Result<()> {
        self.client.authenticate().await
    }

    /// Resolved once and cached; re-resolution only on a new coordinator
    async fn resolve_home_id(&self) -> Result<String> {
        if let Some(id) = self.home_id.read().clone() {
            return Ok(id);
        }

        let homes: HomesData = self
            .client
            .query(QUERY_HOMES, serde_json::Value::Null)
            .await?;
        let Some(home) = homes.viewer.homes.into_iter().next() else {
            return Err(TibberClientError::NoHomesFound);
        };
        debug!(home_id = %home.id, "resolved home id");
        *self.home_id.write() = Some(home.id.clone());
        Ok(home.id)
    }
}
