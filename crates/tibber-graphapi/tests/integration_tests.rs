//! Integration tests for tibber-graphapi
//!
//! These tests spin up a mock Tibber backend and drive the client over real
//! HTTP round trips, so token caching, retries, and snapshot handling are
//! exercised end to end.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pretty_assertions::assert_eq;
use serde_json::Value;
use tibber_graphapi::queries::QUERY_HOMES;
use tibber_graphapi::testing::{MockTibberServer, MockTibberState};
use tibber_graphapi::{TibberClientError, VehicleCoordinator};

async fn start_server() -> MockTibberServer {
    MockTibberServer::start()
        .await
        .expect("Failed to start mock server")
}

// =============================================================================
// Token Lifecycle
// =============================================================================

#[tokio::test]
async fn authenticate_then_execute_reuses_fresh_token() {
    let server = start_server().await;
    let client = server.client().unwrap();

    client.authenticate().await.unwrap();
    let data = client.execute(QUERY_HOMES, Value::Null).await.unwrap();

    assert_eq!(data["viewer"]["homes"][0]["id"], "home-1");
    assert_eq!(server.state.login_attempts(), 1);
    assert_eq!(server.state.graphql_calls(), 1);
}

#[tokio::test]
async fn execute_authenticates_lazily() {
    let server = start_server().await;
    let client = server.client().unwrap();

    let data = client.execute(QUERY_HOMES, Value::Null).await.unwrap();

    assert_eq!(data["viewer"]["homes"][0]["id"], "home-1");
    assert_eq!(server.state.login_attempts(), 1);
}

#[tokio::test]
async fn expired_token_triggers_exactly_one_reauth() {
    let server = start_server().await;
    let mut config = server.config();
    config.token_lifetime = Duration::ZERO;
    let client = server.client_with_config(config).unwrap();

    client.authenticate().await.unwrap();
    assert_eq!(server.state.login_attempts(), 1);

    // Token is already expired locally, so the next call logs in once
    // before the GraphQL request.
    client.execute(QUERY_HOMES, Value::Null).await.unwrap();
    assert_eq!(server.state.login_attempts(), 2);
    assert_eq!(server.state.graphql_calls(), 1);
}

#[tokio::test]
async fn login_stores_expiry_with_configured_margin() {
    let server = start_server().await;
    let client = server.client().unwrap();

    assert_eq!(client.token_expires_at().await, None);

    let before = Utc::now();
    client.authenticate().await.unwrap();
    let after = Utc::now();

    let expires_at = client.token_expires_at().await.unwrap();
    let margin = chrono::Duration::hours(19);
    assert!(expires_at >= before + margin);
    assert!(expires_at <= after + margin);
}

#[tokio::test]
async fn failed_login_clears_session() {
    let server = start_server().await;
    let client = server.client().unwrap();

    client.authenticate().await.unwrap();
    assert!(client.token_expires_at().await.is_some());

    server.state.fail_next_logins(1);
    let err = client.authenticate().await.unwrap_err();
    assert!(matches!(
        err,
        TibberClientError::AuthenticationFailed { status: 403, .. }
    ));
    assert_eq!(client.token_expires_at().await, None);
}

#[tokio::test]
async fn failed_login_propagates_through_execute() {
    let server = start_server().await;
    let client = server.client().unwrap();

    server.state.fail_next_logins(1);
    let err = client.execute(QUERY_HOMES, Value::Null).await.unwrap_err();

    assert!(matches!(
        err,
        TibberClientError::AuthenticationFailed { status: 403, .. }
    ));
    assert_eq!(server.state.login_attempts(), 1);
    assert_eq!(server.state.graphql_calls(), 0);
}

// =============================================================================
// 401 Retry Policy
// =============================================================================

#[tokio::test]
async fn rejected_token_retried_exactly_once() {
    let server = start_server().await;
    let client = server.client().unwrap();

    client.authenticate().await.unwrap();
    server.state.reject_next_requests(1);

    let data = client.execute(QUERY_HOMES, Value::Null).await.unwrap();

    assert_eq!(data["viewer"]["homes"][0]["id"], "home-1");
    assert_eq!(server.state.login_attempts(), 2);
    assert_eq!(server.state.graphql_calls(), 2);
}

#[tokio::test]
async fn repeated_rejection_fails_without_looping() {
    let server = start_server().await;
    let client = server.client().unwrap();

    client.authenticate().await.unwrap();
    server.state.reject_next_requests(2);

    let err = client.execute(QUERY_HOMES, Value::Null).await.unwrap_err();

    assert!(matches!(
        err,
        TibberClientError::QueryFailed { status: 401, .. }
    ));
    // One retry, then give up: two GraphQL calls, one re-login.
    assert_eq!(server.state.graphql_calls(), 2);
    assert_eq!(server.state.login_attempts(), 2);
}

// =============================================================================
// GraphQL-Level Errors
// =============================================================================

#[tokio::test]
async fn graphql_errors_with_http_200_not_retried() {
    let server = start_server().await;
    let client = server.client().unwrap();

    client.authenticate().await.unwrap();
    server.state.error_next_requests(1);

    let err = client.execute(QUERY_HOMES, Value::Null).await.unwrap_err();

    match err {
        TibberClientError::GraphqlErrors(errors) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].message, "simulated failure");
        }
        other => panic!("expected GraphqlErrors, got {other:?}"),
    }
    assert_eq!(server.state.graphql_calls(), 1);
    assert_eq!(server.state.login_attempts(), 1);
}

// =============================================================================
// Timeouts
// =============================================================================

#[tokio::test]
async fn slow_graphql_response_surfaces_as_timeout() {
    let server = start_server().await;
    let mut config = server.config();
    config.query_timeout = Duration::from_millis(100);
    let client = server.client_with_config(config).unwrap();

    client.authenticate().await.unwrap();
    let expires_at = client.token_expires_at().await;

    server.state.delay_graphql(Duration::from_millis(500));
    let err = client.execute(QUERY_HOMES, Value::Null).await.unwrap_err();

    assert!(matches!(err, TibberClientError::Timeout));
    // The session survives a query timeout untouched.
    assert_eq!(client.token_expires_at().await, expires_at);
}

#[tokio::test]
async fn slow_login_surfaces_as_timeout() {
    let server = start_server().await;
    let mut config = server.config();
    config.login_timeout = Duration::from_millis(100);
    let client = server.client_with_config(config).unwrap();

    server.state.delay_logins(Duration::from_millis(500));
    let err = client.authenticate().await.unwrap_err();

    assert!(matches!(err, TibberClientError::Timeout));
    assert_eq!(client.token_expires_at().await, None);
}

// =============================================================================
// Mutation Action
// =============================================================================

#[tokio::test]
async fn set_battery_level_sends_settings_payload() {
    let server = start_server().await;
    let client = server.client().unwrap();

    client
        .set_vehicle_battery_level("vehicle-1", "home-1", 80)
        .await
        .unwrap();

    let variables = server.state.last_mutation().unwrap();
    assert_eq!(variables["vehicleId"], "vehicle-1");
    assert_eq!(variables["homeId"], "home-1");
    assert_eq!(
        variables["settings"][0]["key"],
        "offline.vehicle.batteryLevel"
    );
    assert_eq!(variables["settings"][0]["value"], 80);
}

#[tokio::test]
async fn out_of_range_battery_level_rejected_without_network() {
    let server = start_server().await;
    let client = server.client().unwrap();

    let err = client
        .set_vehicle_battery_level("vehicle-1", "home-1", 150)
        .await
        .unwrap_err();

    assert!(matches!(err, TibberClientError::InvalidBatteryLevel(150)));
    assert_eq!(server.state.login_attempts(), 0);
    assert_eq!(server.state.graphql_calls(), 0);
    assert!(server.state.last_mutation().is_none());
}

// =============================================================================
// Poll Coordinator
// =============================================================================

#[tokio::test]
async fn refresh_builds_snapshot_from_vehicle_data() {
    let server = start_server().await;
    let client = Arc::new(server.client().unwrap());
    let coordinator = VehicleCoordinator::new(client, 0);

    assert!(coordinator.snapshot().is_none());
    coordinator.refresh().await.unwrap();

    let snapshot = coordinator.snapshot().unwrap();
    assert_eq!(snapshot.vehicle_id, "vehicle-1");
    assert_eq!(snapshot.home_id, "home-1");
    assert_eq!(snapshot.battery_level, 42.0);
    assert!(snapshot.connected);
    assert!(!snapshot.charging);
}

#[tokio::test]
async fn refresh_twice_is_idempotent() {
    let server = start_server().await;
    let client = Arc::new(server.client().unwrap());
    let coordinator = VehicleCoordinator::new(client, 0);

    coordinator.refresh().await.unwrap();
    let first = coordinator.snapshot().unwrap();
    coordinator.refresh().await.unwrap();
    let second = coordinator.snapshot().unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn home_id_resolved_once_and_cached() {
    let server = start_server().await;
    let client = Arc::new(server.client().unwrap());
    let coordinator = VehicleCoordinator::new(client, 0);

    coordinator.refresh().await.unwrap();
    coordinator.refresh().await.unwrap();

    // One homes lookup plus two vehicle queries.
    assert_eq!(server.state.graphql_calls(), 3);
    assert_eq!(coordinator.home_id().as_deref(), Some("home-1"));
}

#[tokio::test]
async fn vehicle_index_out_of_range_is_distinct_failure() {
    let server = start_server().await;
    let client = Arc::new(server.client().unwrap());
    let coordinator = VehicleCoordinator::new(client, 3);

    let err = coordinator.refresh().await.unwrap_err();

    assert!(matches!(
        err,
        TibberClientError::VehicleIndexOutOfRange { index: 3, count: 1 }
    ));
    assert!(coordinator.snapshot().is_none());
}

#[tokio::test]
async fn failed_refresh_keeps_previous_snapshot() {
    let server = start_server().await;
    let client = Arc::new(server.client().unwrap());
    let coordinator = VehicleCoordinator::new(client, 0);

    coordinator.refresh().await.unwrap();
    let before = coordinator.snapshot().unwrap();

    // The backend stops returning vehicles; the index now points past the
    // end of an empty list.
    server.state.set_vehicles(vec![]);
    let err = coordinator.refresh().await.unwrap_err();
    assert!(matches!(
        err,
        TibberClientError::VehicleIndexOutOfRange { index: 0, count: 0 }
    ));

    assert_eq!(coordinator.snapshot().unwrap(), before);
}

#[tokio::test]
async fn refresh_fails_when_account_has_no_homes() {
    let state = MockTibberState::new();
    state.set_homes(&[]);
    let server = MockTibberServer::start_with_state(state).await.unwrap();
    let client = Arc::new(server.client().unwrap());
    let coordinator = VehicleCoordinator::new(client, 0);

    let err = coordinator.refresh().await.unwrap_err();
    assert!(matches!(err, TibberClientError::NoHomesFound));
    assert!(coordinator.home_id().is_none());
    assert!(coordinator.snapshot().is_none());

    // A later poll retries the lookup instead of caching the failure.
    server.state.set_homes(&["home-1"]);
    coordinator.refresh().await.unwrap();
    assert_eq!(coordinator.home_id().as_deref(), Some("home-1"));
}

#[tokio::test]
async fn refresh_token_renews_expiry() {
    let server = start_server().await;
    let client = Arc::new(server.client().unwrap());
    let coordinator = VehicleCoordinator::new(client.clone(), 0);

    coordinator.refresh().await.unwrap();
    assert_eq!(server.state.login_attempts(), 1);

    coordinator.refresh_token().await.unwrap();
    assert_eq!(server.state.login_attempts(), 2);

    // Polling continues on the renewed token.
    coordinator.refresh().await.unwrap();
    assert_eq!(server.state.login_attempts(), 2);
}

// =============================================================================
// Shared Session
// =============================================================================

#[tokio::test]
async fn concurrent_executes_share_one_authentication() {
    let server = start_server().await;
    let client = Arc::new(server.client().unwrap());

    let mut handles = Vec::new();
    for _ in 0..4 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.execute(QUERY_HOMES, Value::Null).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(server.state.login_attempts(), 1);
    assert_eq!(server.state.graphql_calls(), 4);
}
