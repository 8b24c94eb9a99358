use crate::config::AudioReplicationConfig;
use crate::types::{BlobStore, PipelineError, Result};
use crate::utils::{content_type_for, is_audio_file};
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Copies audio files the feed links to into the blob store, so stored
/// items stop depending on the feed's own hosting.
pub struct AudioReplicator {
    client: Client,
    blob: Arc<dyn BlobStore>,
    key_prefix: String,
}

impl AudioReplicator {
    pub fn new(blob: Arc<dyn BlobStore>, config: &AudioReplicationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_seconds))
            .build()
            .map_err(|e| PipelineError::Configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, blob, key_prefix: config.key_prefix.trim_matches('/').to_string() })
    }

    /// `{prefix}/{file name}` for a source URL. The query string is ignored.
    pub fn key_for(&self, source_url: &str) -> Result<String> {
        let parsed = Url::parse(source_url)
            .map_err(|e| PipelineError::SourceFetch(format!("invalid audio URL {}: {}", source_url, e)))?;
        let name = parsed
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
            .ok_or_else(|| PipelineError::SourceFetch(format!("audio URL {} has no file name", source_url)))?;

        if self.key_prefix.is_empty() {
            Ok(name.to_string())
        } else {
            Ok(format!("{}/{}", self.key_prefix, name))
        }
    }

    /// Download `source_url` and store it under `key_for(source_url)`.
    /// Returns the blob store's public URL.
    pub async fn replicate(&self, source_url: &str) -> Result<String> {
        let key = self.key_for(source_url)?;

        let response = self
            .client
            .get(source_url)
            .send()
            .await
            .map_err(|e| PipelineError::SourceFetch(format!("download of {} failed: {}", source_url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::SourceFetch(format!(
                "download of {} returned HTTP {}",
                source_url,
                status.as_u16()
            )));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| PipelineError::SourceFetch(format!("download of {} failed: {}", source_url, e)))?;

        let key_path = Path::new(&key);
        let content_type = if is_audio_file(key_path) { content_type_for(key_path) } else { "audio/mpeg" };
        let url = self.blob.put(&key, body.to_vec(), content_type).await?;

        info!("Replicated {} to {}", source_url, url);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NullBlobStore;

    #[async_trait]
    impl BlobStore for NullBlobStore {
        async fn put(&self, key: &str, _body: Vec<u8>, _content_type: &str) -> Result<String> {
            Ok(self.public_url(key))
        }

        fn public_url(&self, key: &str) -> String {
            format!("https://bucket/{}", key)
        }
    }

    fn replicator(prefix: &str) -> AudioReplicator {
        let config = AudioReplicationConfig { key_prefix: prefix.to_string(), ..Default::default() };
        AudioReplicator::new(Arc::new(NullBlobStore), &config).unwrap()
    }

    #[test]
    fn keys_use_the_file_name_under_the_prefix() {
        let prefixed = replicator("/perplexity_audio/");
        assert_eq!(
            prefixed.key_for("https://cdn.example/a/b/episode-1.mp3?sig=abc").unwrap(),
            "perplexity_audio/episode-1.mp3"
        );
        assert_eq!(prefixed.key_for("https://cdn.example/a/b/").unwrap(), "perplexity_audio/b");
        assert_eq!(replicator("").key_for("https://cdn.example/x.mp3").unwrap(), "x.mp3");
    }

    #[test]
    fn urls_without_a_file_name_are_rejected() {
        let keys = replicator("perplexity_audio");
        assert!(matches!(keys.key_for("https://cdn.example/"), Err(PipelineError::SourceFetch(_))));
        assert!(matches!(keys.key_for("not a url"), Err(PipelineError::SourceFetch(_))));
    }
}
