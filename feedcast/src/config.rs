use crate::types::{cutoff_from_hours, CycleConfig, FetchConfig, PipelineError, PodcastConfig, Result, TtsBackend};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// Base URL objects are PUT to. Unset means the local filesystem store.
    pub endpoint: Option<String>,
    pub bucket: String,
    pub public_host: String,
    pub auth_token: Option<String>,
    pub key_prefix: String,
    pub local_dir: PathBuf,
}

/// Copying the audio the feed publishes into our own bucket.
#[derive(Debug, Clone)]
pub struct AudioReplicationConfig {
    pub enabled: bool,
    pub key_prefix: String,
    pub download_timeout_seconds: u64,
}

impl Default for AudioReplicationConfig {
    fn default() -> Self {
        Self { enabled: true, key_prefix: "perplexity_audio".to_string(), download_timeout_seconds: 300 }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Program followed by its leading arguments.
    pub command: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

/// Everything the binary needs, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub fetch: FetchConfig,
    pub feed_default_limit: usize,
    pub blob: BlobConfig,
    pub audio: AudioReplicationConfig,
    pub generator: GeneratorConfig,
    pub podcast: PodcastConfig,
    pub cycle: CycleConfig,
    pub api: ApiConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let fetch_defaults = FetchConfig::default();
        let fetch = FetchConfig {
            base_url: get("FEED_BASE_URL").unwrap_or(fetch_defaults.base_url),
            user_agent: get("FEED_USER_AGENT").unwrap_or(fetch_defaults.user_agent),
            version: get("FEED_API_VERSION").unwrap_or(fetch_defaults.version),
            topic: get("FEED_DEFAULT_TOPIC").unwrap_or(fetch_defaults.topic),
            source: get("FEED_DEFAULT_SOURCE").unwrap_or(fetch_defaults.source),
            timeout_seconds: parse_or(&get, "FEED_TIMEOUT_SECONDS", fetch_defaults.timeout_seconds)?,
            max_retries: parse_or(&get, "FEED_MAX_RETRIES", fetch_defaults.max_retries)?,
            retry_delay_seconds: parse_or(&get, "FEED_RETRY_DELAY_SECONDS", fetch_defaults.retry_delay_seconds)?,
            raw_dump_path: get("FEED_RAW_DUMP_PATH").map(PathBuf::from),
        };
        url::Url::parse(&fetch.base_url)
            .map_err(|e| PipelineError::Configuration(format!("FEED_BASE_URL is not a valid URL: {}", e)))?;

        let feed_default_limit = parse_or(&get, "FEED_DEFAULT_LIMIT", 20usize)?;
        if feed_default_limit == 0 {
            return Err(PipelineError::Configuration("FEED_DEFAULT_LIMIT must be positive".to_string()));
        }

        let bucket = get("BLOB_BUCKET").unwrap_or_else(|| "reyy-ai".to_string());
        let blob = BlobConfig {
            endpoint: get("BLOB_ENDPOINT"),
            public_host: get("BLOB_PUBLIC_HOST").unwrap_or_else(|| format!("{}.s3.amazonaws.com", bucket)),
            bucket,
            auth_token: get("BLOB_AUTH_TOKEN"),
            key_prefix: get("BLOB_KEY_PREFIX").unwrap_or_default(),
            local_dir: get("BLOB_LOCAL_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data/blobs")),
        };

        let audio_defaults = AudioReplicationConfig::default();
        let audio = AudioReplicationConfig {
            enabled: parse_or(&get, "FEED_REPLICATE_AUDIO", audio_defaults.enabled)?,
            key_prefix: get("FEED_AUDIO_KEY_PREFIX").unwrap_or(audio_defaults.key_prefix),
            download_timeout_seconds: parse_or(
                &get,
                "FEED_AUDIO_DOWNLOAD_TIMEOUT_SECONDS",
                audio_defaults.download_timeout_seconds,
            )?,
        };

        let command: Vec<String> = get("PODCAST_GENERATOR_COMMAND")
            .unwrap_or_else(|| "python3 -m podcastfy.client".to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if command.is_empty() {
            return Err(PipelineError::Configuration("PODCAST_GENERATOR_COMMAND is empty".to_string()));
        }

        let mut podcast = PodcastConfig::default();
        if let Some(model) = get("PODCAST_DEFAULT_TTS_MODEL") {
            podcast.tts_model = TtsBackend::from_str(&model)?;
        }
        let style = &mut podcast.conversation;
        style.word_count = parse_or(&get, "PODCAST_DEFAULT_WORD_COUNT", style.word_count)?;
        style.creativity = parse_or(&get, "PODCAST_DEFAULT_CREATIVITY", style.creativity)?;
        if let Some(name) = get("PODCAST_DEFAULT_NAME") {
            style.podcast_name = name;
        }
        if let Some(language) = get("PODCAST_DEFAULT_LANGUAGE") {
            style.output_language = language;
        }
        podcast.conversation.validate()?;

        let cycle_defaults = CycleConfig::default();
        let cycle = CycleConfig {
            cutoff_age: cutoff_from_hours(parse_or(
                &get,
                "PODCAST_CUTOFF_HOURS",
                cycle_defaults.cutoff_age.num_hours(),
            )?)?,
            batch_limit: parse_or(&get, "PODCAST_BATCH_LIMIT", cycle_defaults.batch_limit)?,
            max_concurrent: parse_or(&get, "PODCAST_MAX_CONCURRENT", cycle_defaults.max_concurrent)?,
            throttle: Duration::from_secs(parse_or(
                &get,
                "PODCAST_THROTTLE_SECONDS",
                cycle_defaults.throttle.as_secs(),
            )?),
            item_timeout: Duration::from_secs(parse_or(
                &get,
                "PODCAST_ITEM_TIMEOUT_SECONDS",
                cycle_defaults.item_timeout.as_secs(),
            )?),
            work_dir: get("PODCAST_WORK_DIR").map(PathBuf::from).unwrap_or(cycle_defaults.work_dir),
        };
        cycle.validate()?;

        let api = ApiConfig {
            host: get("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "API_PORT", 8000u16)?,
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            fetch,
            feed_default_limit,
            blob,
            audio,
            generator: GeneratorConfig { command },
            podcast,
            cycle,
            api,
        })
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| PipelineError::Configuration("DATABASE_URL is not set".to_string()))
    }
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| PipelineError::Configuration(format!("{}={:?} is invalid: {}", key, raw, e))),
        None => Ok(default),
    }
}
