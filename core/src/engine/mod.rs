//! Synthesis engine front.
//!
//! Builds the engine's fixed argument vocabulary, runs it under the
//! supervisor with bounded retries, and verifies the promised artifact
//! materialized. Narrator and emotion listing run through the supervisor
//! too (and count toward its cap) but are not queue-gated.

pub mod playback;

pub use playback::AudioPlayer;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::artifacts::ArtifactTracker;
use crate::config::EngineConfig;
use crate::retry::RetryPolicy;
use crate::speakers::SpeakerSource;
use crate::supervisor::{ProcessSupervisor, RunOptions};
use crate::{OratorError, Result};

/// One validated synthesis request. Emotion weights render as
/// `key=value,key=value`; a BTreeMap keeps the rendering deterministic.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    #[serde(default)]
    pub narrator: Option<String>,
    #[serde(default)]
    pub emotion: BTreeMap<String, u32>,
    #[serde(default)]
    pub speed: Option<u32>,
    #[serde(default)]
    pub pitch: Option<i32>,
}

impl SynthesisRequest {
    /// Parse a request from the JSON shape the protocol layer submits.
    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

pub struct SynthesisEngine {
    bin: PathBuf,
    synth_timeout: Duration,
    list_timeout: Duration,
    artifact_prefix: String,
    retry: RetryPolicy,
    supervisor: Arc<ProcessSupervisor>,
    artifacts: Arc<ArtifactTracker>,
}

impl SynthesisEngine {
    pub fn new(
        cfg: &EngineConfig,
        retry: RetryPolicy,
        supervisor: Arc<ProcessSupervisor>,
        artifacts: Arc<ArtifactTracker>,
    ) -> Self {
        Self {
            bin: cfg.bin.clone(),
            synth_timeout: Duration::from_millis(cfg.synth_timeout_ms),
            list_timeout: Duration::from_millis(cfg.list_timeout_ms),
            artifact_prefix: cfg.artifact_prefix.clone(),
            retry,
            supervisor,
            artifacts,
        }
    }

    /// Run one logical synthesis: mint the output path, invoke the engine
    /// with bounded retries, verify the artifact. A missing artifact counts
    /// as a failed attempt like any process failure.
    pub async fn synthesize(&self, request: &SynthesisRequest) -> Result<PathBuf> {
        let out = self.artifacts.create(&self.artifact_prefix);
        let args = build_say_args(request, &out);

        let supervisor = Arc::clone(&self.supervisor);
        let artifacts = Arc::clone(&self.artifacts);
        let bin = self.bin.clone();
        let timeout = self.synth_timeout;

        self.retry
            .run("synthesize", move |_attempt| {
                let supervisor = Arc::clone(&supervisor);
                let artifacts = Arc::clone(&artifacts);
                let bin = bin.clone();
                let args = args.clone();
                let out = out.clone();
                async move {
                    supervisor
                        .run(&bin, &args, RunOptions::with_timeout(timeout))
                        .await?;
                    artifacts.ensure_exists(&out).await?;
                    Ok(out)
                }
            })
            .await
    }

    /// Narrators the engine knows, one per stdout line.
    pub async fn list_narrators(&self) -> Result<Vec<String>> {
        let stdout = self
            .supervisor
            .run(
                &self.bin,
                &["--list-narrator".to_string()],
                RunOptions::with_timeout(self.list_timeout),
            )
            .await?;
        Ok(parse_list(&stdout))
    }

    /// Emotion names valid for one narrator.
    pub async fn list_emotions(&self, narrator: &str) -> Result<Vec<String>> {
        let args = vec!["--list-emotion".to_string(), narrator.to_string()];
        let stdout = self
            .supervisor
            .run(&self.bin, &args, RunOptions::with_timeout(self.list_timeout))
            .await?;
        Ok(parse_list(&stdout))
    }
}

#[async_trait]
impl SpeakerSource for SynthesisEngine {
    async fn fetch_speakers(&self) -> Result<HashSet<String>> {
        let narrators = self
            .list_narrators()
            .await
            .map_err(|e| OratorError::MetadataFetchFailed(e.to_string()))?;
        Ok(narrators.into_iter().collect())
    }
}

/// Assemble the engine's say invocation.
pub fn build_say_args(request: &SynthesisRequest, out: &Path) -> Vec<String> {
    let mut args = vec!["-s".to_string(), request.text.clone()];
    if let Some(narrator) = &request.narrator {
        args.push("-n".to_string());
        args.push(narrator.clone());
    }
    if !request.emotion.is_empty() {
        let expr = request
            .emotion
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        args.push("-e".to_string());
        args.push(expr);
    }
    if let Some(speed) = request.speed {
        args.push("--speed".to_string());
        args.push(speed.to_string());
    }
    if let Some(pitch) = request.pitch {
        args.push("--pitch".to_string());
        args.push(pitch.to_string());
    }
    args.push("-o".to_string());
    args.push(out.to_string_lossy().into_owned());
    args
}

fn parse_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn say_args_minimal() {
        let req = SynthesisRequest {
            text: "hello".to_string(),
            ..Default::default()
        };
        let args = build_say_args(&req, Path::new("/tmp/out.wav"));
        assert_eq!(args, vec!["-s", "hello", "-o", "/tmp/out.wav"]);
    }

    #[test]
    fn say_args_full() {
        let mut emotion = BTreeMap::new();
        emotion.insert("happy".to_string(), 50);
        emotion.insert("angry".to_string(), 20);
        let req = SynthesisRequest {
            text: "hi".to_string(),
            narrator: Some("Alice".to_string()),
            emotion,
            speed: Some(120),
            pitch: Some(-10),
        };
        let args = build_say_args(&req, Path::new("/tmp/o.wav"));
        assert_eq!(
            args,
            vec![
                "-s", "hi", "-n", "Alice", "-e", "angry=20,happy=50", "--speed", "120", "--pitch",
                "-10", "-o", "/tmp/o.wav",
            ]
        );
    }

    #[test]
    fn list_parsing_skips_blank_lines() {
        let parsed = parse_list("Alice\n\n  Bob  \n");
        assert_eq!(parsed, vec!["Alice", "Bob"]);
    }

    #[test]
    fn request_parses_from_protocol_json() {
        let req = SynthesisRequest::from_json(
            r#"{"text":"hi","narrator":"Alice","emotion":{"happy":80},"speed":110}"#,
        )
        .unwrap();
        assert_eq!(req.text, "hi");
        assert_eq!(req.narrator.as_deref(), Some("Alice"));
        assert_eq!(req.emotion.get("happy"), Some(&80));
        assert_eq!(req.speed, Some(110));
        assert_eq!(req.pitch, None);
    }
}
