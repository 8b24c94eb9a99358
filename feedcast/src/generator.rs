use crate::config::GeneratorConfig;
use crate::types::{ArtifactGenerator, GeneratedArtifact, GenerationRequest, PipelineError, Result};
use crate::utils::{is_audio_file, scratch_stem};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Runs an external podcast generator (podcastfy's CLI by default) as a
/// child process and reads the produced file paths from its stdout.
pub struct CommandArtifactGenerator {
    program: String,
    leading_args: Vec<String>,
}

impl CommandArtifactGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let (program, leading_args) = config
            .command
            .split_first()
            .ok_or_else(|| PipelineError::Configuration("generator command is empty".to_string()))?;

        Ok(Self { program: program.clone(), leading_args: leading_args.to_vec() })
    }

    /// Write the style settings where the child can read them.
    async fn write_style_file(&self, request: &GenerationRequest) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&request.scratch_dir).await?;
        let path = request.scratch_dir.join(format!("{}.style.json", scratch_stem(&request.item_id)));
        let body = serde_json::to_vec_pretty(&request.style)?;
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }

    fn arguments(&self, request: &GenerationRequest, style_path: &Path) -> Vec<String> {
        let mut args = self.leading_args.clone();
        for document in &request.documents {
            args.push("--url".to_string());
            args.push(document.display().to_string());
        }
        for image in &request.image_urls {
            args.push("--image".to_string());
            args.push(image.clone());
        }
        args.push("--tts-model".to_string());
        args.push(request.tts_model.to_string());
        args.push("--conversation-config".to_string());
        args.push(style_path.display().to_string());
        args
    }
}

/// Pick the produced audio file (last audio-looking token) and transcript
/// (last `.txt` token) out of the generator's output.
pub fn parse_generator_output(stdout: &str) -> Option<GeneratedArtifact> {
    let tokens: Vec<&str> = stdout
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| c == '"' || c == '\'' || c == ',' || c == '`'))
        .collect();

    let audio_path = tokens
        .iter()
        .rev()
        .map(Path::new)
        .find(|p| is_audio_file(p))?
        .to_path_buf();
    let transcript_path = tokens
        .iter()
        .rev()
        .map(Path::new)
        .find(|p| p.extension().map(|e| e == "txt").unwrap_or(false))
        .map(Path::to_path_buf);

    Some(GeneratedArtifact { audio_path, transcript_path })
}

#[async_trait]
impl ArtifactGenerator for CommandArtifactGenerator {
    fn backend_name(&self) -> String {
        format!("command:{}", self.program)
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedArtifact> {
        let style_path = self
            .write_style_file(request)
            .await
            .map_err(|e| PipelineError::Generation(format!("cannot write style config: {}", e)))?;
        let args = self.arguments(request, &style_path);

        info!(item_id = %request.item_id, tts = %request.tts_model, "Running podcast generator");
        debug!("{} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        if let Err(e) = tokio::fs::remove_file(&style_path).await {
            warn!("Could not remove {}: {}", style_path.display(), e);
        }

        let output =
            output.map_err(|e| PipelineError::Generation(format!("failed to start {}: {}", self.program, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            tail.reverse();
            return Err(PipelineError::Generation(format!(
                "generator exited with {}: {}",
                output.status,
                tail.join(" | ")
            )));
        }

        let artifact = parse_generator_output(&stdout)
            .ok_or_else(|| PipelineError::Generation("generator did not report an audio file".to_string()))?;

        if !tokio::fs::try_exists(&artifact.audio_path).await.unwrap_or(false) {
            return Err(PipelineError::Generation(format!(
                "generator reported {} but the file does not exist",
                artifact.audio_path.display()
            )));
        }

        Ok(artifact)
    }
}
