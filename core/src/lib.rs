// Orator Core Library
// Serialized brokering of a single-instance speech synthesis engine

pub mod artifacts;
pub mod config;
pub mod engine;
pub mod queue;
pub mod retry;
pub mod speakers;
pub mod supervisor;

// Export core types
pub use artifacts::ArtifactTracker;
pub use config::OratorConfig;
pub use engine::{AudioPlayer, SynthesisEngine, SynthesisRequest};
pub use queue::{JobHandle, QueueStatus, RequestQueue};
pub use retry::RetryPolicy;
pub use speakers::{SpeakerCache, SpeakerSource};
pub use supervisor::{ProcessSupervisor, RunOptions};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OratorError {
    #[error("Admission rejected: {0} processes already running")]
    AdmissionRejected(usize),

    #[error("Process timed out after {0} ms")]
    ProcessTimeout(u64),

    #[error("Process exited with code {code}: {stderr}")]
    ProcessFailed { code: i32, stderr: String },

    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Synthesis failed after {attempts} attempts: {cause}")]
    SynthesisExhausted { attempts: u32, cause: Box<OratorError> },

    #[error("Expected artifact missing: {}", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("Job cancelled before it started")]
    QueueCancelled,

    #[error("Narrator list fetch failed: {0}")]
    MetadataFetchFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OratorError>;

/// Core runtime. Owns one instance of every coordination component and is
/// passed by handle to consumers; no module-level singletons.
pub struct Orator {
    pub queue: RequestQueue,
    pub supervisor: Arc<ProcessSupervisor>,
    pub artifacts: Arc<ArtifactTracker>,
    pub engine: Arc<SynthesisEngine>,
    pub narrators: SpeakerCache,
    pub player: AudioPlayer,
    tasks: Vec<JoinHandle<()>>,
}

impl Orator {
    pub fn new(config: OratorConfig) -> Self {
        let supervisor = Arc::new(ProcessSupervisor::new(&config.supervisor));
        let artifacts = Arc::new(ArtifactTracker::new(&config.artifacts));
        let retry = RetryPolicy::new(
            config.retry.max_attempts,
            Duration::from_millis(config.retry.delay_ms),
        );
        let engine = Arc::new(SynthesisEngine::new(
            &config.engine,
            retry,
            Arc::clone(&supervisor),
            Arc::clone(&artifacts),
        ));
        let narrators = SpeakerCache::new(
            Arc::clone(&engine) as Arc<dyn SpeakerSource>,
            Duration::from_millis(config.cache.ttl_ms),
        );
        let player = AudioPlayer::new(&config.playback, Arc::clone(&supervisor));

        Self {
            queue: RequestQueue::new(),
            supervisor,
            artifacts,
            engine,
            narrators,
            player,
            tasks: Vec::new(),
        }
    }

    /// Spawn the background artifact sweeper and the signal-driven cleanup.
    pub fn start(&mut self) {
        info!(target: "orator", "Starting Orator runtime");
        self.tasks.push(self.artifacts.spawn_sweeper());
        self.tasks.push(self.artifacts.spawn_signal_cleanup());
    }

    /// Stop background tasks, cancel pending jobs and reclaim artifacts.
    /// A job already mid-execution still resolves normally.
    pub async fn shutdown(&mut self) {
        info!(target: "orator", "Shutting down Orator runtime");
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.queue.clear().await;
        self.artifacts.cleanup_all().await;
        info!(target: "orator", "Orator shut down");
    }

    /// Submit one synthesis job to the serialized queue and await its
    /// artifact path. Jobs run strictly one at a time, in submission order.
    pub async fn speak(&self, request: SynthesisRequest) -> Result<PathBuf> {
        let engine = Arc::clone(&self.engine);
        let handle = self
            .queue
            .submit(move || async move { engine.synthesize(&request).await })
            .await;
        handle.wait().await
    }

    pub async fn queue_status(&self) -> QueueStatus {
        self.queue.status().await
    }

    pub async fn clear_queue(&self) -> usize {
        self.queue.clear().await
    }

    /// Narrator validity check against the cached list; not queue-gated.
    pub async fn narrator_is_valid(&self, name: Option<&str>) -> bool {
        self.narrators.is_valid(name).await
    }

    /// Delete a generated artifact once the consumer is done with it.
    pub async fn release_artifact(&self, path: &Path) {
        self.artifacts.cleanup(path).await;
    }
}
