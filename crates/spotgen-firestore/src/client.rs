//! Firestore REST API client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gcp_auth::TokenProvider;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::error::{FirestoreError, FirestoreResult};
use crate::types::{
    Document, Filter, Order, RunQueryRequest, RunQueryResponseItem, StructuredQuery, Value,
};

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Request timeout
    pub timeout: Duration,
    /// Emulator host for local development and tests (e.g. "http://127.0.0.1:8900")
    pub emulator_host: Option<String>,
}

impl FirestoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        Ok(Self {
            project_id: std::env::var("GCP_PROJECT_ID")
                .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
                .map_err(|_| FirestoreError::auth_error("GCP_PROJECT_ID not set"))?,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            timeout: Duration::from_secs(30),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST").ok(),
        })
    }
}

/// Firestore REST API client.
pub struct FirestoreClient {
    http: Client,
    auth: Option<Arc<dyn TokenProvider>>,
    base_url: String,
}

impl Clone for FirestoreClient {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            auth: self.auth.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

impl FirestoreClient {
    /// Create a new Firestore client. Against an emulator no credentials
    /// are loaded and requests go unauthenticated.
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        let auth = match config.emulator_host {
            Some(_) => None,
            None => Some(
                gcp_auth::provider()
                    .await
                    .map_err(|e| FirestoreError::auth_error(e.to_string()))?,
            ),
        };

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(FirestoreError::Network)?;

        let host = config
            .emulator_host
            .clone()
            .unwrap_or_else(|| "https://firestore.googleapis.com".to_string());
        let base_url = format!(
            "{}/v1/projects/{}/databases/{}/documents",
            host, config.project_id, config.database_id
        );

        Ok(Self {
            http,
            auth,
            base_url,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> FirestoreResult<Self> {
        let config = FirestoreConfig::from_env()?;
        Self::new(config).await
    }

    /// Get an access token. Emulator mode uses a fixed owner token.
    async fn get_token(&self) -> FirestoreResult<String> {
        match &self.auth {
            Some(auth) => {
                let token = auth
                    .token(&["https://www.googleapis.com/auth/datastore"])
                    .await
                    .map_err(|e| FirestoreError::auth_error(e.to_string()))?;
                Ok(token.as_str().to_string())
            }
            None => Ok("owner".to_string()),
        }
    }

    /// Build document path.
    fn document_path(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, doc_id)
    }

    /// Get a document, returning its `updateTime` token for conditional writes.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> FirestoreResult<Option<Document>> {
        let url = self.document_path(collection, doc_id);
        let token = self.get_token().await?;

        let response = self.http.get(&url).bearer_auth(&token).send().await?;

        match response.status() {
            StatusCode::OK => {
                let doc: Document = response.json().await?;
                Ok(Some(doc))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(FirestoreError::from_http_status(
                    status.as_u16(),
                    format!("GET {url} failed: {body}"),
                ))
            }
        }
    }

    /// Create a document. Fails with `AlreadyExists` when the id is taken.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        let url = format!("{}/{}?documentId={}", self.base_url, collection, doc_id);
        let token = self.get_token().await?;
        let body = Document::new(fields);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                let doc: Document = response.json().await?;
                Ok(doc)
            }
            StatusCode::CONFLICT => Err(FirestoreError::AlreadyExists(format!(
                "{collection}/{doc_id}"
            ))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(FirestoreError::from_http_status(
                    status.as_u16(),
                    format!("POST {url} failed: {body}"),
                ))
            }
        }
    }

    /// Replace a document's fields, conditioned on its `updateTime`.
    ///
    /// With `update_time = Some(ts)` the write fails with
    /// `PreconditionFailed` if any other writer touched the document since
    /// `ts` was read. This is the lost-update guard for the jobs and usage
    /// tables.
    pub async fn update_document_with_precondition(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: Option<Vec<String>>,
        update_time: Option<&str>,
    ) -> FirestoreResult<Document> {
        let mut url = self.document_path(collection, doc_id);
        let mut params: Vec<String> = Vec::new();

        if let Some(mask) = update_mask {
            params.extend(mask.iter().map(|f| format!("updateMask.fieldPaths={f}")));
        }
        if let Some(ts) = update_time {
            params.push(format!(
                "currentDocument.updateTime={}",
                urlencoding::encode(ts)
            ));
        }
        if !params.is_empty() {
            url = format!("{}?{}", url, params.join("&"));
        }

        let token = self.get_token().await?;
        let body = Document::new(fields);

        let response = self
            .http
            .patch(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let doc: Document = response.json().await?;
                Ok(doc)
            }
            StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => {
                let body = response.text().await.unwrap_or_default();
                Err(FirestoreError::PreconditionFailed(format!(
                    "PATCH {url} precondition failed: {body}"
                )))
            }
            StatusCode::NOT_FOUND => Err(FirestoreError::not_found(format!(
                "{collection}/{doc_id}"
            ))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(FirestoreError::from_http_status(
                    status.as_u16(),
                    format!("PATCH {url} failed: {body}"),
                ))
            }
        }
    }

    /// Delete a document. Idempotent.
    pub async fn delete_document(&self, collection: &str, doc_id: &str) -> FirestoreResult<()> {
        let url = self.document_path(collection, doc_id);
        let token = self.get_token().await?;

        let response = self.http.delete(&url).bearer_auth(&token).send().await?;

        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!("Document {}/{} already deleted", collection, doc_id);
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(FirestoreError::from_http_status(
                    status.as_u16(),
                    format!("DELETE {url} failed: {body}"),
                ))
            }
        }
    }

    /// Run a structured query against one collection.
    pub async fn run_query(
        &self,
        collection: &str,
        filter: Option<Filter>,
        order_by: Vec<Order>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> FirestoreResult<Vec<Document>> {
        let url = format!("{}:runQuery", self.base_url);
        let token = self.get_token().await?;

        let request = RunQueryRequest {
            structured_query: StructuredQuery {
                from: vec![crate::types::CollectionSelector {
                    collection_id: collection.to_string(),
                }],
                r#where: filter,
                order_by,
                limit,
                offset,
            },
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let items: Vec<RunQueryResponseItem> = response.json().await?;
                Ok(items.into_iter().filter_map(|i| i.document).collect())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(FirestoreError::from_http_status(
                    status.as_u16(),
                    format!("POST {url} failed: {body}"),
                ))
            }
        }
    }
}
