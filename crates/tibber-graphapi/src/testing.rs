//! Test utilities for tibber-graphapi
//!
//! Provides an in-process mock of the Tibber login and GraphQL endpoints
//! so integration tests can drive the client over real HTTP round trips.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::client::{ClientConfig, TibberClient};
use crate::endpoints::Endpoints;
use crate::error::Result;

/// Scriptable backend state for [`MockTibberServer`].
///
/// Bearer tokens are issued as `token-N`; a request carrying anything but
/// the most recently issued token is answered with 401, which exercises the
/// client's re-authentication path without any scripting.
#[derive(Default)]
pub struct MockTibberState {
    login_attempts: AtomicU32,
    issued_tokens: AtomicU32,
    graphql_calls: AtomicU32,
    /// Answer this many logins with 403 before succeeding again
    failing_logins: AtomicU32,
    /// Answer this many GraphQL calls with 401 regardless of token
    unauthorized_responses: AtomicU32,
    /// Answer this many GraphQL calls with a 200 `errors` payload
    error_responses: AtomicU32,
    login_delay: RwLock<Option<Duration>>,
    graphql_delay: RwLock<Option<Duration>>,
    homes: RwLock<Vec<String>>,
    vehicles: RwLock<Vec<Value>>,
    last_mutation: RwLock<Option<Value>>,
}

impl MockTibberState {
    /// State with one home and one vehicle
    pub fn new() -> Arc<Self> {
        let state = Self::default();
        *state.homes.write() = vec!["home-1".to_string()];
        *state.vehicles.write() = vec![Self::vehicle("vehicle-1", 42.0)];
        Arc::new(state)
    }

    /// Vehicle payload in the wire shape of the vehicle query
    pub fn vehicle(id: &str, battery_level: f64) -> Value {
        json!({
            "id": id,
            "batteryLevel": battery_level,
            "range": 180.0,
            "connected": true,
            "charging": false,
            "chargingPower": 0.0,
        })
    }

    pub fn login_attempts(&self) -> u32 {
        self.login_attempts.load(Ordering::SeqCst)
    }

    pub fn graphql_calls(&self) -> u32 {
        self.graphql_calls.load(Ordering::SeqCst)
    }

    pub fn fail_next_logins(&self, count: u32) {
        self.failing_logins.store(count, Ordering::SeqCst);
    }

    pub fn reject_next_requests(&self, count: u32) {
        self.unauthorized_responses.store(count, Ordering::SeqCst);
    }

    pub fn error_next_requests(&self, count: u32) {
        self.error_responses.store(count, Ordering::SeqCst);
    }

    pub fn delay_logins(&self, delay: Duration) {
        *self.login_delay.write() = Some(delay);
    }

    pub fn delay_graphql(&self, delay: Duration) {
        *self.graphql_delay.write() = Some(delay);
    }

    pub fn set_homes(&self, ids: &[&str]) {
        *self.homes.write() = ids.iter().map(|id| (*id).to_string()).collect();
    }

    pub fn set_vehicles(&self, vehicles: Vec<Value>) {
        *self.vehicles.write() = vehicles;
    }

    /// Variables of the most recent settings mutation
    pub fn last_mutation(&self) -> Option<Value> {
        self.last_mutation.read().clone()
    }

    fn current_token(&self) -> Option<String> {
        match self.issued_tokens.load(Ordering::SeqCst) {
            0 => None,
            n => Some(format!("token-{n}")),
        }
    }
}

/// A mock Tibber backend that shuts down when dropped
pub struct MockTibberServer {
    pub addr: SocketAddr,
    pub state: Arc<MockTibberState>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl MockTibberServer {
    /// Start a server with the default one-home, one-vehicle state
    pub async fn start() -> Result<Self> {
        Self::start_with_state(MockTibberState::new()).await
    }

    /// Start a server over pre-scripted state
    pub async fn start_with_state(state: Arc<MockTibberState>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let router = Router::new()
            .route("/login.credentials", post(login_handler))
            .route("/v4/gql", post(graphql_handler))
            .with_state(state.clone());

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give the server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Ok(Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Endpoint set pointing at this server
    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            login_url: format!("http://{}/login.credentials", self.addr),
            graphql_url: format!("http://{}/v4/gql", self.addr),
        }
    }

    /// Client config against this server with default timeouts
    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            endpoints: self.endpoints(),
            ..ClientConfig::default()
        }
    }

    /// Client against this server with test credentials
    pub fn client(&self) -> Result<TibberClient> {
        self.client_with_config(self.config())
    }

    /// Client against this server with custom timeouts or token lifetime
    pub fn client_with_config(&self, config: ClientConfig) -> Result<TibberClient> {
        TibberClient::with_config("tester@example.com", "hunter2", config)
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for MockTibberServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn login_handler(State(state): State<Arc<MockTibberState>>) -> Response {
    let delay = *state.login_delay.read();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    state.login_attempts.fetch_add(1, Ordering::SeqCst);
    if take_one(&state.failing_logins) {
        return (StatusCode::FORBIDDEN, "invalid credentials").into_response();
    }

    let n = state.issued_tokens.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({ "token": format!("token-{n}") })).into_response()
}

async fn graphql_handler(
    State(state): State<Arc<MockTibberState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let delay = *state.graphql_delay.read();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    state.graphql_calls.fetch_add(1, Ordering::SeqCst);
    if take_one(&state.unauthorized_responses) {
        return (StatusCode::UNAUTHORIZED, "token rejected").into_response();
    }

    let authorized = match (state.current_token(), bearer_token(&headers)) {
        (Some(current), Some(provided)) => provided == current,
        _ => false,
    };
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "invalid token").into_response();
    }

    if take_one(&state.error_responses) {
        return Json(json!({ "errors": [{ "message": "simulated failure" }] })).into_response();
    }

    let query = body.get("query").and_then(Value::as_str).unwrap_or_default();
    if query.contains("setVehicleSettings") {
        *state.last_mutation.write() = body.get("variables").cloned();
        return Json(json!({
            "data": { "me": { "setVehicleSettings": { "__typename": "Vehicle" } } }
        }))
        .into_response();
    }
    if query.contains("vehicles") {
        let home_id = state.homes.read().first().cloned().unwrap_or_default();
        let vehicles = state.vehicles.read().clone();
        return Json(json!({
            "data": { "viewer": { "home": { "id": home_id, "vehicles": vehicles } } }
        }))
        .into_response();
    }
    if query.contains("homes") {
        let homes: Vec<Value> = state
            .homes
            .read()
            .iter()
            .map(|id| json!({ "id": id }))
            .collect();
        return Json(json!({ "data": { "viewer": { "homes": homes } } })).into_response();
    }

    Json(json!({ "data": {} })).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Decrement the counter if it is non-zero, reporting whether it was
fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_token_issued_before_first_login() {
        let state = MockTibberState::new();
        assert_eq!(state.current_token(), None);
    }

    #[test]
    fn take_one_stops_at_zero() {
        let counter = AtomicU32::new(2);
        assert!(take_one(&counter));
        assert!(take_one(&counter));
        assert!(!take_one(&counter));
        assert!(!take_one(&counter));
    }
}
