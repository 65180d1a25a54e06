//! JSON fetching from package registries.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use xdeps_util::errors::DependsError;

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Build the shared reqwest client used by every registry backend.
pub fn build_client() -> Result<Client, DependsError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("xdeps/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| DependsError::Network {
            message: format!("Failed to create HTTP client: {e}"),
        })
}

/// A package registry reachable over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    pub client: Client,
    pub url: String,
}

impl HttpRegistry {
    pub fn new(client: Client, url: &str) -> Self {
        Self {
            client,
            url: url.trim_end_matches('/').to_string(),
        }
    }

    /// Absolute URL of `path` below the registry base.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.url, path.trim_start_matches('/'))
    }

    /// Fetch and decode `path`. `Ok(None)` means the registry has no such document.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, DependsError> {
        get_json(&self.client, &self.endpoint(path)).await
    }
}

/// Download a JSON document, retrying timeouts, connection failures and
/// server errors.
///
/// Returns `Ok(None)` for 404.
pub async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
) -> Result<Option<T>, DependsError> {
    let mut last_err = String::new();

    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            tokio::time::sleep(RETRY_DELAY * attempt).await;
        }

        tracing::debug!("GET {url}");
        match client.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status == reqwest::StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                if status.is_server_error() {
                    last_err = format!("HTTP {status} from {url}");
                    continue;
                }
                if !status.is_success() {
                    return Err(DependsError::Network {
                        message: format!("HTTP {status} fetching {url}"),
                    });
                }

                let doc = resp.json::<T>().await.map_err(|e| DependsError::Network {
                    message: format!("Invalid JSON from {url}: {e}"),
                })?;
                return Ok(Some(doc));
            }
            Err(e) if e.is_timeout() || e.is_connect() => {
                last_err = format!("{e}");
                continue;
            }
            Err(e) => {
                return Err(DependsError::Network {
                    message: format!("Request to {url} failed: {e}"),
                });
            }
        }
    }

    Err(DependsError::Network {
        message: format!("Failed after {MAX_RETRIES} retries for {url}: {last_err}"),
    })
}
