//! Request and response types for the Tibber GraphQL API

use serde::{Deserialize, Serialize};

// =============================================================================
// Wire Envelope
// =============================================================================

/// Outgoing GraphQL request body
#[derive(Debug, Serialize)]
pub struct GraphqlRequest<'a> {
    pub query: &'a str,
    pub variables: &'a serde_json::Value,
}

/// Incoming GraphQL response envelope
///
/// The backend reports failures either as a non-200 status or as an `errors`
/// list inside a 200 response; both fields are optional on the wire.
#[derive(Debug, Deserialize)]
pub struct GraphqlEnvelope {
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

/// A single GraphQL-level error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(default)]
    pub path: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub extensions: Option<serde_json::Value>,
}

// =============================================================================
// Login
// =============================================================================

/// Login endpoint response; fields beyond the token are ignored
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
}

// =============================================================================
// Vehicle Data
// =============================================================================

/// `viewer { homes { id } }` payload
#[derive(Debug, Clone, Deserialize)]
pub struct HomesData {
    pub viewer: HomesViewer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomesViewer {
    pub homes: Vec<HomeRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomeRef {
    pub id: String,
}

/// `viewer { home(id:) { vehicles } }` payload
#[derive(Debug, Clone, Deserialize)]
pub struct VehicleData {
    pub viewer: VehicleViewer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleViewer {
    pub home: HomeVehicles,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomeVehicles {
    pub id: String,
    pub vehicles: Vec<Vehicle>,
}

/// Vehicle fields polled from the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: String,
    pub battery_level: f64,
    pub range: f64,
    pub connected: bool,
    pub charging: bool,
    pub charging_power: f64,
}

// =============================================================================
// State Snapshot
// =============================================================================

/// Flat state record exposed to presentation.
///
/// Replaced wholesale on every successful poll; a failed poll leaves the
/// previous snapshot in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub vehicle_id: String,
    pub home_id: String,
    /// State of charge, 0-100
    pub battery_level: f64,
    /// Remaining range in kilometers
    pub range: f64,
    pub charging: bool,
    /// Charge power in kilowatts
    pub charging_power: f64,
    pub connected: bool,
}
