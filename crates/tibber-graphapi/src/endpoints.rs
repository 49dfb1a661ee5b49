//! Tibber endpoint set and the configuration-time login-URL probe

use std::time::Duration;

use tracing::{debug, info, warn};

/// Primary GraphQL endpoint
pub const GRAPHQL_URL: &str = "https://app.tibber.com/v4/gql";

/// Primary credential login endpoint
pub const LOGIN_URL: &str = "https://app.tibber.com/login.credentials";

/// Login URLs that have carried credential logins across app releases,
/// probed in order. The primary endpoint comes first.
pub const FALLBACK_LOGIN_URLS: &[&str] = &[
    "https://app.tibber.com/login.credentials",
    "https://api.tibber.com/v1-beta/login",
    "https://api.tibber.com/v1/login",
    "https://app.tibber.com/login",
    "https://api.tibber.com/login",
];

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Login and GraphQL URLs used by a client instance.
///
/// Constant for the client's lifetime; swap them out only by building a new
/// client (e.g. after a [`probe`](Endpoints::probe) at configuration time).
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub login_url: String,
    pub graphql_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login_url: LOGIN_URL.to_string(),
            graphql_url: GRAPHQL_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Probe the fallback login URLs and settle on the first responsive one.
    ///
    /// Configuration-time only; the steady-state request path never probes.
    /// A 404/405 still counts as responsive (the host exists, only the
    /// method differs), matching how the backend answers GET on its login
    /// routes.
    pub async fn probe(http: &reqwest::Client) -> Self {
        for candidate in FALLBACK_LOGIN_URLS {
            debug!(url = candidate, "probing login endpoint");
            match http.get(*candidate).timeout(PROBE_TIMEOUT).send().await {
                Ok(response) if matches!(response.status().as_u16(), 200 | 404 | 405) => {
                    info!(url = candidate, "login endpoint responsive");
                    return Self {
                        login_url: (*candidate).to_string(),
                        graphql_url: GRAPHQL_URL.to_string(),
                    };
                }
                Ok(response) => {
                    debug!(
                        url = candidate,
                        status = response.status().as_u16(),
                        "unexpected probe status"
                    );
                }
                Err(err) => {
                    debug!(url = candidate, error = %err, "probe failed");
                }
            }
        }

        warn!("no login endpoint responded, keeping the primary");
        Self::default()
    }
}
