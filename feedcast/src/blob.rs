use crate::config::BlobConfig;
use crate::types::{BlobStore, PipelineError, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Uploads objects with `PUT {endpoint}/{bucket}/{key}` (S3-compatible
/// gateways, presigning proxies).
pub struct HttpBlobStore {
    client: Client,
    endpoint: String,
    bucket: String,
    public_host: String,
    auth_token: Option<String>,
}

impl HttpBlobStore {
    pub fn new(config: &BlobConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| PipelineError::Configuration("BLOB_ENDPOINT is not set".to_string()))?;
        url::Url::parse(&endpoint)
            .map_err(|e| PipelineError::Configuration(format!("BLOB_ENDPOINT is not a valid URL: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| PipelineError::Configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
            public_host: config.public_host.clone(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String> {
        let size = body.len();
        let mut request = self
            .client
            .put(self.object_url(key))
            .header(header::CONTENT_TYPE, content_type)
            .body(body);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::Upload(format!("PUT {} failed: {}", key, e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PipelineError::Upload(format!(
                "PUT {} returned HTTP {}: {}",
                key,
                status.as_u16(),
                detail.chars().take(200).collect::<String>()
            )));
        }

        info!("Uploaded {} ({} bytes)", key, size);
        Ok(self.public_url(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://{}/{}", self.public_host, key)
    }
}

/// Writes objects below a local directory. URLs keep the deterministic
/// `https://{bucket}/{key}` shape so stored records look the same.
pub struct FsBlobStore {
    root: PathBuf,
    bucket: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self { root: root.into(), bucket: bucket.into() }
    }

    pub fn from_config(config: &BlobConfig) -> Self {
        Self::new(config.local_dir.clone(), config.bucket.clone())
    }

    pub fn object_path(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|part| !part.is_empty() && *part != "..")
            .fold(self.root.clone(), |path, part| path.join(part))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, body: Vec<u8>, _content_type: &str) -> Result<String> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::Upload(format!("cannot create {}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| PipelineError::Upload(format!("cannot write {}: {}", path.display(), e)))?;

        debug!("Stored blob {} at {}", key, path.display());
        Ok(self.public_url(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://{}/{}", self.bucket, key)
    }
}
