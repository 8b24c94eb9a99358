/// Failure classes shared by the orchestrators and every collaborator.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Feed source error: {0}")]
    SourceFetch(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Stable label for logs and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::SourceFetch(_) => "source_fetch",
            PipelineError::Store(_) => "store",
            PipelineError::Generation(_) => "generation",
            PipelineError::Upload(_) => "upload",
            PipelineError::Configuration(_) => "configuration",
            PipelineError::Timeout { .. } => "timeout",
            PipelineError::Io(_) => "io",
            PipelineError::Serialization(_) => "serialization",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
