//! Tibber GraphAPI Client Library
//!
//! An authenticated session client for the Tibber app GraphQL backend.
//! Bearer tokens are cached with a local expiry, re-acquired transparently
//! when missing, expired, or rejected (one retry per request), and a poll
//! coordinator turns the vehicle query into a flat state snapshot for
//! presentation layers.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tibber_graphapi::{TibberClient, VehicleCoordinator, DEFAULT_VEHICLE_INDEX};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Arc::new(TibberClient::new("user@example.com", "secret")?);
//!     client.authenticate().await?;
//!
//!     let coordinator = VehicleCoordinator::new(client, DEFAULT_VEHICLE_INDEX);
//!     coordinator.refresh().await?;
//!     if let Some(snapshot) = coordinator.snapshot() {
//!         println!("battery at {}%", snapshot.battery_level);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module provides an in-process mock of the login and
//! GraphQL endpoints:
//!
//! ```rust,ignore
//! use tibber_graphapi::testing::MockTibberServer;
//!
//! let server = MockTibberServer::start().await?;
//! let client = server.client()?;
//! client.authenticate().await?;
//! ```

mod client;
mod coordinator;
pub mod endpoints;
mod error;
pub mod queries;
pub mod testing;
mod types;

pub use client::{ClientConfig, TibberClient};
pub use coordinator::{VehicleCoordinator, DEFAULT_SCAN_INTERVAL, DEFAULT_VEHICLE_INDEX};
pub use endpoints::Endpoints;
pub use error::{Result, TibberClientError};
pub use types::*;
