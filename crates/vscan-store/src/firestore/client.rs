//! Firestore REST API client.
//!
//! Each call is wrapped in a tracing span, timed into request metrics and
//! retried with backoff on transient failures. An expired access token
//! triggers one refresh and a resend.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, info, info_span, Instrument};

use super::error::{FirestoreError, FirestoreResult};
use super::metrics::{record_listed, record_request};
use super::retry::{self, RetryConfig};
use super::token_cache::{TokenCache, TokenSource};
use super::types::{Document, ListDocumentsResponse, Value};

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Collection holding video records
    pub collection: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
    /// `host:port` of a Firestore emulator; skips service account auth
    pub emulator_host: Option<String>,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database_id: "(default)".to_string(),
            collection: "videos".to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
            emulator_host: None,
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .map_err(|_| {
                FirestoreError::auth_error(
                    "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set to use the Firestore store",
                )
            })?;

        if project_id.is_empty() {
            return Err(FirestoreError::auth_error(
                "GCP_PROJECT_ID or FIREBASE_PROJECT_ID cannot be empty",
            ));
        }

        let connect_timeout_secs: u64 = std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            collection: std::env::var("FIRESTORE_COLLECTION")
                .unwrap_or_else(|_| "videos".to_string()),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST")
                .ok()
                .filter(|h| !h.is_empty()),
            ..Self::new(project_id)
        })
    }

    fn documents_path(&self) -> String {
        format!(
            "v1/projects/{}/databases/{}/documents",
            self.project_id, self.database_id
        )
    }
}

/// Firestore REST API client.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    tokens: Arc<TokenSource>,
}

impl FirestoreClient {
    /// Create a client for Google Cloud, or for the emulator when
    /// `emulator_host` is set.
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        match config.emulator_host.clone() {
            Some(host) => {
                info!(host = %host, "Using Firestore emulator");
                let endpoint = format!("http://{}", host);
                Self::with_endpoint(config, &endpoint, TokenSource::Static("owner".into()))
            }
            None => {
                let auth = Self::create_auth_provider()?;
                Self::with_endpoint(
                    config,
                    "https://firestore.googleapis.com",
                    TokenSource::Provider(TokenCache::new(auth)),
                )
            }
        }
    }

    /// Create a client against an explicit endpoint.
    pub fn with_endpoint(
        config: FirestoreConfig,
        endpoint: &str,
        tokens: TokenSource,
    ) -> FirestoreResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("vscan-store/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FirestoreError::Network)?;

        let base_url = format!(
            "{}/{}",
            endpoint.trim_end_matches('/'),
            config.documents_path()
        );

        Ok(Self {
            http,
            config,
            base_url,
            tokens: Arc::new(tokens),
        })
    }

    fn create_auth_provider() -> FirestoreResult<Arc<dyn TokenProvider>> {
        let service_account = CustomServiceAccount::from_env().map_err(|e| {
            FirestoreError::auth_error(format!("Failed to load service account: {}", e))
        })?;

        match service_account {
            Some(sa) => Ok(Arc::new(sa)),
            None => Err(FirestoreError::auth_error(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file.",
            )),
        }
    }

    pub async fn from_env() -> FirestoreResult<Self> {
        Self::new(FirestoreConfig::from_env()?).await
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    fn document_url(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, doc_id)
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    /// Send with a bearer token, refreshing it once on expiry.
    async fn send<F>(&self, build: F) -> FirestoreResult<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.tokens.token().await?;
        let response = build(&token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if !Self::is_access_token_expired(&body) {
            return Err(FirestoreError::from_http_status(401, body));
        }

        self.tokens.invalidate().await;
        let token = self.tokens.token().await?;
        Ok(build(&token).send().await?)
    }

    // =========================================================================
    // Document operations
    // =========================================================================

    /// Get a document; `None` if it does not exist.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> FirestoreResult<Option<Document>> {
        let url = self.document_url(collection, doc_id);
        let url = url.as_str();

        self.execute_request(
            "get_document",
            collection,
            Some(doc_id),
            retry::with_retry(&self.config.retry, "get_document", move || async move {
                let response = self.send(|token| self.http.get(url).bearer_auth(token)).await?;
                match response.status() {
                    StatusCode::OK => Ok(Some(response.json::<Document>().await?)),
                    StatusCode::NOT_FOUND => Ok(None),
                    status => Err(Self::error_from_response(status, url, response).await),
                }
            }),
        )
        .await
    }

    /// Create a document; fails with `AlreadyExists` if the ID is taken.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        let url = format!(
            "{}/{}?documentId={}",
            self.base_url,
            collection,
            urlencoding::encode(doc_id)
        );
        let url = url.as_str();
        let body = Document::new(fields);
        let body = &body;

        self.execute_request(
            "create_document",
            collection,
            Some(doc_id),
            retry::with_retry(&self.config.retry, "create_document", move || async move {
                let response = self
                    .send(|token| self.http.post(url).bearer_auth(token).json(body))
                    .await?;
                match response.status() {
                    StatusCode::OK | StatusCode::CREATED => Ok(response.json::<Document>().await?),
                    StatusCode::CONFLICT => Err(FirestoreError::AlreadyExists(format!(
                        "{}/{}",
                        collection, doc_id
                    ))),
                    status => Err(Self::error_from_response(status, url, response).await),
                }
            }),
        )
        .await
    }

    /// Patch the fields named in `update_mask` on an existing document.
    ///
    /// Mask paths may be dotted (`face_stage.status`); `fields` must hold
    /// the matching nested maps. Fails with `NotFound` if the document
    /// does not exist.
    pub async fn update_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: &[String],
    ) -> FirestoreResult<Document> {
        let mut params: Vec<String> = update_mask
            .iter()
            .map(|f| format!("updateMask.fieldPaths={}", urlencoding::encode(f)))
            .collect();
        params.push("currentDocument.exists=true".to_string());
        let url = format!("{}?{}", self.document_url(collection, doc_id), params.join("&"));
        let url = url.as_str();
        let body = Document::new(fields);
        let body = &body;

        self.execute_request(
            "update_document",
            collection,
            Some(doc_id),
            retry::with_retry(&self.config.retry, "update_document", move || async move {
                let response = self
                    .send(|token| self.http.patch(url).bearer_auth(token).json(body))
                    .await?;
                match response.status() {
                    StatusCode::OK => Ok(response.json::<Document>().await?),
                    StatusCode::NOT_FOUND => Err(FirestoreError::not_found(format!(
                        "{}/{}",
                        collection, doc_id
                    ))),
                    status => Err(Self::error_from_response(status, url, response).await),
                }
            }),
        )
        .await
    }

    /// Delete a document. Deleting a missing document succeeds.
    pub async fn delete_document(&self, collection: &str, doc_id: &str) -> FirestoreResult<()> {
        let url = self.document_url(collection, doc_id);
        let url = url.as_str();

        self.execute_request(
            "delete_document",
            collection,
            Some(doc_id),
            retry::with_retry(&self.config.retry, "delete_document", move || async move {
                let response = self
                    .send(|token| self.http.delete(url).bearer_auth(token))
                    .await?;
                match response.status() {
                    StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
                    StatusCode::NOT_FOUND => {
                        debug!("Document {}/{} already deleted", collection, doc_id);
                        Ok(())
                    }
                    status => Err(Self::error_from_response(status, url, response).await),
                }
            }),
        )
        .await
    }

    /// List one page of documents in a collection.
    pub async fn list_documents(
        &self,
        collection: &str,
        page_size: Option<u32>,
        page_token: Option<&str>,
    ) -> FirestoreResult<ListDocumentsResponse> {
        let mut params = Vec::new();
        if let Some(size) = page_size {
            params.push(format!("pageSize={}", size));
        }
        if let Some(token) = page_token {
            params.push(format!("pageToken={}", urlencoding::encode(token)));
        }
        let mut url = format!("{}/{}", self.base_url, collection);
        if !params.is_empty() {
            url = format!("{}?{}", url, params.join("&"));
        }
        let url = url.as_str();

        self.execute_request(
            "list_documents",
            collection,
            None,
            retry::with_retry(&self.config.retry, "list_documents", move || async move {
                let response = self.send(|token| self.http.get(url).bearer_auth(token)).await?;
                match response.status() {
                    StatusCode::OK => {
                        let list: ListDocumentsResponse = response.json().await?;
                        let returned = list.documents.as_ref().map(|d| d.len()).unwrap_or(0);
                        record_listed(collection, returned as u64);
                        Ok(list)
                    }
                    status => Err(Self::error_from_response(status, url, response).await),
                }
            }),
        )
        .await
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    /// Execute a request with tracing and metrics.
    async fn execute_request<T, F>(
        &self,
        operation: &str,
        collection: &str,
        doc_id: Option<&str>,
        fut: F,
    ) -> FirestoreResult<T>
    where
        F: std::future::Future<Output = FirestoreResult<T>>,
    {
        let span = match doc_id {
            Some(id) => info_span!("firestore_request", operation = %operation, collection = %collection, doc_id = %id),
            None => info_span!("firestore_request", operation = %operation, collection = %collection),
        };

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }

    async fn error_from_response(status: StatusCode, url: &str, response: Response) -> FirestoreError {
        let body = response.text().await.unwrap_or_default();
        FirestoreError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
    }
}
