//! Snapshot store reached over HTTP/HTTPS.

use super::{ConfigSnapshot, SnapshotStore, SnapshotSubmission, StoreResult};
use crate::checksum::Checksum;
use crate::error::{Result, StoreError, SyncError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url, header::HeaderValue};
use std::time::Duration;

/// Authentication method for store requests.
#[derive(Clone)]
pub enum HttpAuth {
    /// No authentication
    None,
    /// Bearer token authentication
    Bearer(String),
    /// Basic authentication (username, password)
    Basic(String, String),
}

/// Snapshot store behind a REST endpoint.
///
/// Endpoints, relative to the base URL:
///
/// - `GET namespaces/{ns}/configurations/latest` answers 200 with a snapshot,
///   or 204/404 when the namespace has none. With `knownChecksum` and
///   `waitSeconds` query parameters it long-polls and answers 304/204 when
///   nothing changed.
/// - `POST namespaces/{ns}/configurations` stores a submission and answers
///   200/201 with the stored snapshot.
///
/// # Examples
///
/// ```rust,no_run
/// use fleet_sync::store::HttpSnapshotStore;
/// use std::time::Duration;
///
/// # fn example() -> fleet_sync::error::Result<()> {
/// let store = HttpSnapshotStore::builder()
///     .with_base_url("https://config.example.com/api")
///     .with_namespace("fleet-sync")
///     .with_auth_token("secret-token")
///     .with_timeout(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct HttpSnapshotStore {
    base_url: Url,
    namespace: String,
    client: Client,
    auth: HttpAuth,
    timeout: Duration,
}

impl HttpSnapshotStore {
    /// Create a new builder.
    pub fn builder() -> HttpSnapshotStoreBuilder {
        HttpSnapshotStoreBuilder::new()
    }

    /// Namespace this store reads and writes.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn url(&self, tail: &[&str]) -> StoreResult<Url> {
        let mut url = self.base_url.clone();
        let unusable = || {
            StoreError::InvalidResponse(format!("base URL '{}' cannot hold a path", self.base_url))
        };
        url.path_segments_mut()
            .map_err(|_| unusable())?
            .pop_if_empty()
            .extend(["namespaces", self.namespace.as_str(), "configurations"])
            .extend(tail);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> StoreResult<RequestBuilder> {
        Ok(match &self.auth {
            HttpAuth::None => request,
            HttpAuth::Bearer(token) => {
                let header_value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| {
                        StoreError::InvalidCredentials(format!("Invalid bearer token: {}", e))
                    })?;
                request.header("Authorization", header_value)
            }
            HttpAuth::Basic(username, password) => request.basic_auth(username, Some(password)),
        })
    }

    async fn send(&self, request: RequestBuilder) -> StoreResult<Response> {
        self.authorize(request)?.send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Timeout(self.timeout)
            } else {
                StoreError::Unavailable(format!("HTTP request failed: {}", e))
            }
        })
    }

    async fn read_snapshot(response: Response) -> StoreResult<ConfigSnapshot> {
        response
            .json::<ConfigSnapshot>()
            .await
            .map_err(|e| StoreError::InvalidResponse(format!("Failed to parse snapshot: {}", e)))
    }
}

/// Map a non-success status onto the store error taxonomy.
async fn status_error(response: Response, expected: Option<&Checksum>) -> StoreError {
    let status = response.status();
    let reason = status.canonical_reason().unwrap_or("Unknown");

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            let message = format!("store answered {}: {}", status.as_u16(), reason);
            StoreError::InvalidCredentials(message)
        }
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
            // A store may include its current latest snapshot in the body.
            let actual = response
                .json::<ConfigSnapshot>()
                .await
                .ok()
                .map(|snapshot| snapshot.checksum.into_string());
            StoreError::Conflict {
                expected: expected.map(|c| c.to_string()),
                actual,
            }
        }
        _ => StoreError::Unavailable(format!("store answered {}: {}", status.as_u16(), reason)),
    }
}

#[async_trait]
impl SnapshotStore for HttpSnapshotStore {
    async fn get_latest(&self) -> StoreResult<Option<ConfigSnapshot>> {
        let url = self.url(&["latest"])?;
        let response = self.send(self.client.get(url)).await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Self::read_snapshot(response).await.map(Some),
            _ => Err(status_error(response, None).await),
        }
    }

    async fn post_configuration(
        &self,
        submission: SnapshotSubmission,
    ) -> StoreResult<ConfigSnapshot> {
        let url = self.url(&[])?;
        let expected = submission.expected_latest.clone();
        let response = self.send(self.client.post(url).json(&submission)).await?;

        if response.status().is_success() {
            Self::read_snapshot(response).await
        } else {
            Err(status_error(response, expected.as_ref()).await)
        }
    }

    async fn wait_for_change(
        &self,
        known: &Checksum,
        timeout: Duration,
    ) -> StoreResult<Option<ConfigSnapshot>> {
        let mut url = self.url(&["latest"])?;
        url.query_pairs_mut()
            .append_pair("knownChecksum", known.as_str())
            .append_pair("waitSeconds", &timeout.as_secs().to_string());

        // The server holds the request for up to `timeout`; allow for that on top
        // of the normal request bound.
        let request = self.client.get(url).timeout(timeout + self.timeout);
        let response = self.send(request).await?;

        match response.status() {
            StatusCode::NOT_MODIFIED | StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let snapshot = Self::read_snapshot(response).await?;
                Ok((&snapshot.checksum != known).then_some(snapshot))
            }
            _ => Err(status_error(response, None).await),
        }
    }
}

/// Builder for [`HttpSnapshotStore`].
pub struct HttpSnapshotStoreBuilder {
    base_url: Option<String>,
    namespace: String,
    auth: HttpAuth,
    timeout: Duration,
}

impl HttpSnapshotStoreBuilder {
    /// Create a builder with no authentication and a 10 second timeout.
    pub fn new() -> Self {
        Self {
            base_url: None,
            namespace: crate::broadcast::DEFAULT_NAMESPACE.to_string(),
            auth: HttpAuth::None,
            timeout: Duration::from_secs(10),
        }
    }

    /// Set the store's base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the namespace to read and write.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set Bearer token authentication.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth = HttpAuth::Bearer(token.into());
        self
    }

    /// Set Basic authentication.
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.auth = HttpAuth::Basic(username.into(), password.into());
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the store.
    ///
    /// # Errors
    ///
    /// Returns an error if no base URL was set, the URL does not parse, or the
    /// HTTP client cannot be created.
    pub fn build(self) -> Result<HttpSnapshotStore> {
        let base_url = self
            .base_url
            .ok_or_else(|| SyncError::Load("Store base URL is required".to_string()))?;
        let base_url = Url::parse(&base_url)
            .map_err(|e| SyncError::Load(format!("Invalid store URL '{}': {}", base_url, e)))?;

        if self.namespace.is_empty() {
            return Err(SyncError::Load("Store namespace must not be empty".to_string()));
        }

        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| SyncError::Load(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpSnapshotStore {
            base_url,
            namespace: self.namespace,
            client,
            auth: self.auth,
            timeout: self.timeout,
        })
    }
}

impl Default for HttpSnapshotStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
