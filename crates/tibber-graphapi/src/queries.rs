//! GraphQL documents for the Tibber app API
//!
//! The upstream schema has drifted across app releases; these are the
//! `viewer`-rooted shapes accepted by the current backend.

/// Resolve the account's home ids
pub const QUERY_HOMES: &str = "\
query {
    viewer {
        homes {
            id
        }
    }
}";

/// Vehicle list for one home, with the polled sensor fields
pub const QUERY_GET_VEHICLE: &str = "\
query GetVehicle($homeId: ID!) {
    viewer {
        home(id: $homeId) {
            id
            vehicles {
                id
                batteryLevel
                range
                connected
                charging
                chargingPower
            }
        }
    }
}";

/// Write vehicle settings, used for the stored battery level
pub const MUTATION_SET_VEHICLE_SOC: &str = "\
mutation SetVehicleSettings($vehicleId: String!, $homeId: String!, $settings: [SettingsItemInput!]) {
    me {
        setVehicleSettings(id: $vehicleId, homeId: $homeId, settings: $settings) {
            __typename
        }
    }
}";

/// Settings key understood by the vehicle settings mutation
pub const SETTING_BATTERY_LEVEL: &str = "offline.vehicle.batteryLevel";
