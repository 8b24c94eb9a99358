use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{PipelineError, Result};

/// Largest page a store scan returns in one round trip. Callers wanting more
/// keep following `ScanPage::next_cursor`.
pub const MAX_SCAN_PAGE: usize = 1000;

/// A raw record as the remote feed returns it, before parsing.
pub type RawFeedRecord = serde_json::Value;

/// One scraped content record, keyed by the identifier the remote source assigns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub uuid: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    /// Short-form answer text.
    #[serde(default)]
    pub first_answer: String,
    #[serde(default)]
    pub description: String,
    /// Bullet summary, rendered into the intermediate document.
    #[serde(default)]
    pub bullet_summary_preload: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub last_query_datetime: Option<DateTime<Utc>>,
    /// Audio the feed itself publishes. Points at our bucket once replicated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    /// Where `audio_url` pointed before replication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl FeedItem {
    /// A blank URL counts as no artifact.
    pub fn has_artifact(&self) -> bool {
        self.artifact_url
            .as_deref()
            .map(|url| !url.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Filters for a store scan. Every populated field must hold (logical AND).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanFilter {
    /// Items last touched strictly before this instant, or never touched.
    pub last_query_before: Option<DateTime<Utc>>,
    /// Items last touched strictly after this instant.
    pub last_query_after: Option<DateTime<Utc>>,
    /// Items with no generated artifact yet.
    pub blank_artifact_only: bool,
}

impl ScanFilter {
    /// Items that are due for artifact generation at `cutoff`.
    pub fn eligible_for_generation(cutoff: DateTime<Utc>) -> Self {
        Self {
            last_query_before: Some(cutoff),
            last_query_after: None,
            blank_artifact_only: true,
        }
    }

    pub fn matches(&self, item: &FeedItem) -> bool {
        if let (Some(before), Some(touched)) = (self.last_query_before, item.last_query_datetime) {
            if touched >= before {
                return false;
            }
        }

        if let Some(after) = self.last_query_after {
            match item.last_query_datetime {
                Some(touched) if touched > after => {}
                _ => return false,
            }
        }

        !(self.blank_artifact_only && item.has_artifact())
    }
}

/// One page of a filtered scan. `next_cursor` is `None` once the table is exhausted.
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub items: Vec<FeedItem>,
    pub next_cursor: Option<String>,
}

/// Speech synthesis backends the generator understands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsBackend {
    Openai,
    Elevenlabs,
    #[default]
    Gemini,
    Geminimulti,
    Edge,
}

impl TtsBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            TtsBackend::Openai => "openai",
            TtsBackend::Elevenlabs => "elevenlabs",
            TtsBackend::Gemini => "gemini",
            TtsBackend::Geminimulti => "geminimulti",
            TtsBackend::Edge => "edge",
        }
    }
}

impl fmt::Display for TtsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TtsBackend {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(TtsBackend::Openai),
            "elevenlabs" => Ok(TtsBackend::Elevenlabs),
            "gemini" => Ok(TtsBackend::Gemini),
            "geminimulti" => Ok(TtsBackend::Geminimulti),
            "edge" => Ok(TtsBackend::Edge),
            other => Err(PipelineError::Configuration(format!("unknown TTS backend: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TtsVoiceConfig {
    pub question: Option<String>,
    pub answer: Option<String>,
}

/// Style settings handed to the artifact generator as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationStyleConfig {
    pub word_count: u32,
    pub conversation_style: Vec<String>,
    pub roles_person1: String,
    pub roles_person2: String,
    pub dialogue_structure: Vec<String>,
    pub podcast_name: String,
    pub podcast_tagline: String,
    pub output_language: String,
    pub engagement_techniques: Vec<String>,
    /// Temperature-like knob in `[0, 1]`.
    pub creativity: f32,
    pub user_instructions: String,
    pub max_num_chunks: u32,
    pub min_chunk_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voices: Option<TtsVoiceConfig>,
}

impl Default for ConversationStyleConfig {
    fn default() -> Self {
        Self {
            word_count: 150,
            conversation_style: strings(&["engaging", "fast-paced", "enthusiastic"]),
            roles_person1: "main summarizer".to_string(),
            roles_person2: "questioner/clarifier".to_string(),
            dialogue_structure: strings(&["Introduction", "Main Content Summary", "Conclusion"]),
            podcast_name: "Reyy AI".to_string(),
            podcast_tagline: "Your Personal Generative AI Podcasts".to_string(),
            output_language: "English".to_string(),
            engagement_techniques: strings(&["rhetorical questions", "anecdotes", "analogies", "humor"]),
            creativity: 1.0,
            user_instructions: String::new(),
            max_num_chunks: 7,
            min_chunk_size: 600,
            voices: None,
        }
    }
}

impl ConversationStyleConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.creativity) {
            return Err(PipelineError::Configuration(format!(
                "creativity must be within [0, 1], got {}",
                self.creativity
            )));
        }
        if self.word_count == 0 {
            return Err(PipelineError::Configuration("word_count must be positive".to_string()));
        }
        if self.max_num_chunks == 0 {
            return Err(PipelineError::Configuration("max_num_chunks must be positive".to_string()));
        }
        Ok(())
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodcastConfig {
    #[serde(default)]
    pub tts_model: TtsBackend,
    #[serde(default)]
    pub conversation: ConversationStyleConfig,
}

/// Everything the generator needs for one item.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub item_id: String,
    pub documents: Vec<PathBuf>,
    pub image_urls: Vec<String>,
    pub tts_model: TtsBackend,
    pub style: ConversationStyleConfig,
    /// Directory the generator may use for its own per-item files.
    pub scratch_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedArtifact {
    pub audio_path: PathBuf,
    pub transcript_path: Option<PathBuf>,
}
