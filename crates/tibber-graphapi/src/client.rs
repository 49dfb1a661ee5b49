//! Authenticated session client for the Tibber GraphQL API

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::endpoints::Endpoints;
use crate::error::{Result, TibberClientError};
use crate::queries::{MUTATION_SET_VEHICLE_SOC, SETTING_BATTERY_LEVEL};
use crate::types::{GraphqlEnvelope, GraphqlRequest, LoginResponse};

/// Default login request timeout
const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(10);
/// Default GraphQL request timeout
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(15);
/// Vendor JWTs live roughly 20 hours; treating them as 19-hour tokens
/// re-authenticates before the server starts rejecting them.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(19 * 3600);

/// App identity the login endpoint expects
const TIBBER_USER_AGENT: &str = "Tibber/25.20.0 (versionCode: 2520004Dalvik/2.1.0 \
    (Linux; U; Android 10; Android SDK built for x86_64 Build/QSR1.211112.011))";

/// Scopes a login token needs for the vehicle queries
const REQUIRED_TOKEN_SCOPES: [&str; 3] = ["gw-api-read", "gw-api-write", "gw-web"];

const MAX_ERROR_BODY_LEN: usize = 4096;

/// Tunables for [`TibberClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoints: Endpoints,
    /// Time bound on the login round trip
    pub login_timeout: Duration,
    /// Time bound on each GraphQL round trip
    pub query_timeout: Duration,
    /// Stored token validity; shorter than the vendor's actual lifetime
    pub token_lifetime: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
        }
    }
}

/// Account credentials, immutable for the client's lifetime
struct Credentials {
    username: String,
    password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Cached bearer token with its local expiry.
///
/// If `token` is set, `expires_at` is set and was in the future at store
/// time; the token counts as expired once `now >= expires_at`.
#[derive(Debug, Default)]
struct Session {
    token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl Session {
    fn valid_token(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.token, self.expires_at) {
            (Some(token), Some(expires_at)) if now < expires_at => Some(token),
            _ => None,
        }
    }

    fn clear(&mut self) {
        self.token = None;
        self.expires_at = None;
    }
}

/// Tibber GraphQL API client
///
/// Owns the credentials, the cached bearer token, and the HTTP transport.
/// `execute` transparently authenticates when no valid token is cached and
/// retries exactly once after a 401. The session sits behind a mutex so
/// concurrent callers observe a single in-flight authentication.
pub struct TibberClient {
    http: reqwest::Client,
    credentials: Credentials,
    config: ClientConfig,
    session: tokio::sync::Mutex<Session>,
}

impl TibberClient {
    /// Create a client against the primary Tibber endpoints
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        Self::with_config(username, password, ClientConfig::default())
    }

    /// Create a client with custom endpoints and timeouts
    pub fn with_config(
        username: impl Into<String>,
        password: impl Into<String>,
        config: ClientConfig,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .default_headers(identity_headers())
            .build()?;
        Ok(Self::with_http_client(http, username, password, config))
    }

    /// Build on an externally managed HTTP client.
    ///
    /// Lets the host share one connection pool across many clients; the
    /// transport is used per its own thread-safety contract.
    pub fn with_http_client(
        http: reqwest::Client,
        username: impl Into<String>,
        password: impl Into<String>,
        config: ClientConfig,
    ) -> Self {
        Self {
            http,
            credentials: Credentials {
                username: username.into(),
                password: password.into(),
            },
            config,
            session: tokio::sync::Mutex::new(Session::default()),
        }
    }

    /// Log in with the stored credentials and cache the bearer token.
    ///
    /// Always performs a fresh login; `execute` calls this on its own when
    /// the cached token is missing, expired, or rejected.
    pub async fn authenticate(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        self.login(&mut session).await?;
        Ok(())
    }

    /// Local expiry of the cached token, if one is cached.
    ///
    /// Hosts use this to schedule periodic re-authentication ahead of the
    /// vendor-side expiry.
    pub async fn token_expires_at(&self) -> Option<DateTime<Utc>> {
        self.session.lock().await.expires_at
    }

    /// Execute a GraphQL document and return its `data` payload.
    ///
    /// `Value::Null` variables are sent as an empty object. A 401 triggers
    /// one re-authentication and one retry of the same request; a second
    /// 401 surfaces as [`TibberClientError::QueryFailed`] without looping.
    /// GraphQL-level `errors` inside a 200 response are never retried.
    pub async fn execute(&self, query: &str, variables: Value) -> Result<Value> {
        let variables = match variables {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other,
        };

        let token = self.ensure_token().await?;
        let mut response = self.post_graphql(query, &variables, &token).await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            debug!("token rejected, re-authenticating once");
            let token = self.refresh_rejected_token(&token).await?;
            response = self.post_graphql(query, &variables, &token).await?;
        }

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            return Err(TibberClientError::query_failed(
                status.as_u16(),
                truncate_body(&body),
            ));
        }

        let envelope: GraphqlEnvelope = serde_json::from_str(&body)
            .map_err(|e| TibberClientError::ParseError(e.to_string()))?;
        if !envelope.errors.is_empty() {
            return Err(TibberClientError::GraphqlErrors(envelope.errors));
        }
        envelope.data.ok_or(TibberClientError::MissingData)
    }

    /// Execute a GraphQL document and deserialize its `data` payload
    pub async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        let data = self.execute(query, variables).await?;
        serde_json::from_value(data).map_err(|e| TibberClientError::ParseError(e.to_string()))
    }

    /// Set a vehicle's stored battery level.
    ///
    /// Levels above 100 are rejected locally; no request is made.
    pub async fn set_vehicle_battery_level(
        &self,
        vehicle_id: &str,
        home_id: &str,
        battery_level: u8,
    ) -> Result<()> {
        if battery_level > 100 {
            return Err(TibberClientError::InvalidBatteryLevel(battery_level));
        }

        let variables = serde_json::json!({
            "vehicleId": vehicle_id,
            "homeId": home_id,
            "settings": [{
                "key": SETTING_BATTERY_LEVEL,
                "value": battery_level,
            }],
        });
        self.execute(MUTATION_SET_VEHICLE_SOC, variables).await?;
        info!(vehicle_id, battery_level, "updated vehicle battery level");
        Ok(())
    }

    /// Return the cached token, logging in first when it is missing or
    /// expired. Holds the session lock across the login round trip so
    /// concurrent callers reuse one authentication.
    async fn ensure_token(&self) -> Result<String> {
        let mut session = self.session.lock().await;
        if let Some(token) = session.valid_token(Utc::now()) {
            return Ok(token.to_string());
        }
        debug!("no valid token cached, authenticating");
        self.login(&mut session).await
    }

    /// Re-authenticate after the server rejected `rejected`.
    ///
    /// Another caller may have refreshed the session while this one was
    /// waiting on the lock; in that case the fresh token is reused instead
    /// of logging in again.
    async fn refresh_rejected_token(&self, rejected: &str) -> Result<String> {
        let mut session = self.session.lock().await;
        if let Some(token) = session.valid_token(Utc::now()) {
            if token != rejected {
                return Ok(token.to_string());
            }
        }
        self.login(&mut session).await
    }

    /// Run the login round trip and commit the result to the session.
    ///
    /// The session is mutated only after a fully parsed success; any
    /// failure clears it, forcing the next caller to re-authenticate.
    async fn login(&self, session: &mut Session) -> Result<String> {
        match self.login_request().await {
            Ok(token) => {
                let expires_at = Utc::now() + self.config.token_lifetime;
                debug!(%expires_at, "authenticated");
                session.token = Some(token.clone());
                session.expires_at = Some(expires_at);
                Ok(token)
            }
            Err(err) => {
                session.clear();
                Err(err)
            }
        }
    }

    /// Login round trip; does not touch session state
    async fn login_request(&self) -> Result<String> {
        debug!(url = %self.config.endpoints.login_url, "logging in");
        let response = self
            .http
            .post(self.config.endpoints.login_url.as_str())
            .timeout(self.config.login_timeout)
            .form(&[
                ("email", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(TibberClientError::authentication_failed(
                status.as_u16(),
                truncate_body(&body),
            ));
        }

        let login: LoginResponse = serde_json::from_str(&body)
            .map_err(|e| TibberClientError::ParseError(e.to_string()))?;
        match login.token {
            Some(token) => {
                warn_on_missing_scopes(&token);
                Ok(token)
            }
            None => Err(TibberClientError::authentication_failed(
                status.as_u16(),
                "no token in login response",
            )),
        }
    }

    async fn post_graphql(
        &self,
        query: &str,
        variables: &Value,
        token: &str,
    ) -> Result<reqwest::Response> {
        self.http
            .post(self.config.endpoints.graphql_url.as_str())
            .timeout(self.config.query_timeout)
            .bearer_auth(token)
            .json(&GraphqlRequest { query, variables })
            .send()
            .await
            .map_err(map_transport_error)
    }
}

fn identity_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en"),
    );
    headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_static(TIBBER_USER_AGENT),
    );
    headers.insert(
        HeaderName::from_static("x-tibber-new-ui"),
        HeaderValue::from_static("true"),
    );
    headers
}

/// Timeouts surface as their own variant so callers can tell an
/// unreachable or slow server from one that is answering with errors.
fn map_transport_error(err: reqwest::Error) -> TibberClientError {
    if err.is_timeout() {
        TibberClientError::Timeout
    } else {
        TibberClientError::HttpError(err)
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LEN {
        return body.to_string();
    }
    let mut truncated: String = body.chars().take(MAX_ERROR_BODY_LEN).collect();
    truncated.push('…');
    truncated
}

/// Decode the JWT payload and warn when the vehicle scopes are missing.
///
/// Scope problems otherwise only show up later as opaque GraphQL errors.
/// Diagnostics only; an undecodable token is still used as-is.
fn warn_on_missing_scopes(token: &str) {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        warn!("bearer token is not a JWT, skipping scope check");
        return;
    }
    let Ok(payload) = URL_SAFE_NO_PAD.decode(parts[1]) else {
        debug!("JWT payload is not base64url, skipping scope check");
        return;
    };
    let Ok(claims) = serde_json::from_slice::<Value>(&payload) else {
        debug!("JWT payload is not JSON, skipping scope check");
        return;
    };

    let scopes: Vec<&str> = claims
        .get("scopes")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let missing: Vec<&str> = REQUIRED_TOKEN_SCOPES
        .iter()
        .copied()
        .filter(|required| !scopes.contains(required))
        .collect();
    if !missing.is_empty() {
        warn!(?missing, "token missing expected scopes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_token_expires() {
        let now = Utc::now();
        let session = Session {
            token: Some("abc".to_string()),
            expires_at: Some(now + Duration::from_secs(60)),
        };
        assert_eq!(session.valid_token(now), Some("abc"));
        assert_eq!(session.valid_token(now + Duration::from_secs(60)), None);
        assert_eq!(session.valid_token(now + Duration::from_secs(120)), None);
    }

    #[test]
    fn empty_session_has_no_token() {
        let session = Session::default();
        assert_eq!(session.valid_token(Utc::now()), None);
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let credentials = Credentials {
            username: "user@example.com".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("user@example.com"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn truncate_body_caps_long_bodies() {
        let long = "x".repeat(MAX_ERROR_BODY_LEN + 100);
        let truncated = truncate_body(&long);
        assert_eq!(truncated.chars().count(), MAX_ERROR_BODY_LEN + 1);
        assert!(truncated.ends_with('…'));
        assert_eq!(truncate_body("short"), "short");
    }

    #[test]
    fn scope_check_accepts_non_jwt_tokens() {
        // Must not panic on arbitrary token shapes
        warn_on_missing_scopes("not-a-jwt");
        warn_on_missing_scopes("a.b");
        warn_on_missing_scopes("a.!!!.c");
    }

    #[tokio::test]
    async fn battery_level_over_100_rejected_without_network() {
        let client = TibberClient::new("user@example.com", "secret").unwrap();
        let err = client
            .set_vehicle_battery_level("vehicle-1", "home-1", 150)
            .await
            .unwrap_err();
        assert!(matches!(err, TibberClientError::InvalidBatteryLevel(150)));
    }
}
