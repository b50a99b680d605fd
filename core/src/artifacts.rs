//! Temporary artifact lifecycle tracking.
//!
//! The tracker mints unique output paths in the temp directory, verifies
//! that the engine actually produced them, and deletes them on request, on
//! staleness, or on process termination. It only ever deletes paths it
//! minted itself; externally supplied paths are never touched.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ArtifactConfig;
use crate::{OratorError, Result};

pub struct ArtifactTracker {
    temp_dir: PathBuf,
    sweep_interval: Duration,
    max_age: Duration,
    tracked: DashMap<PathBuf, Instant>,
}

impl ArtifactTracker {
    pub fn new(cfg: &ArtifactConfig) -> Self {
        Self {
            temp_dir: cfg.temp_dir.clone(),
            sweep_interval: Duration::from_millis(cfg.sweep_interval_ms),
            max_age: Duration::from_millis(cfg.max_age_ms),
            tracked: DashMap::new(),
        }
    }

    /// Mint a unique tracked path. The file itself is created by the
    /// external engine, not here.
    pub fn create(&self, prefix: &str) -> PathBuf {
        let name = format!("{}_{}_{}.wav", prefix, now_ms(), Uuid::new_v4().simple());
        let path = self.temp_dir.join(name);
        self.tracked.insert(path.clone(), Instant::now());
        debug!(target: "artifacts", path = %path.display(), "tracking artifact path");
        path
    }

    /// Verify the expected output materialized as a regular file.
    pub async fn ensure_exists(&self, path: &Path) -> Result<()> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(()),
            _ => Err(OratorError::ArtifactMissing(path.to_path_buf())),
        }
    }

    /// Delete and untrack `path` if this tracker minted it. Requests for
    /// untracked paths are ignored, as are files already gone.
    pub async fn cleanup(&self, path: &Path) {
        if self.tracked.remove(path).is_none() {
            debug!(
                target: "artifacts",
                path = %path.display(),
                "ignoring cleanup of untracked path"
            );
            return;
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(target: "artifacts", path = %path.display(), "artifact removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                target: "artifacts",
                path = %path.display(),
                error = %e,
                "failed to remove artifact"
            ),
        }
    }

    /// Best-effort parallel cleanup of every tracked path. Used on shutdown
    /// and on termination signals.
    pub async fn cleanup_all(&self) {
        let paths: Vec<PathBuf> = self.tracked.iter().map(|e| e.key().clone()).collect();
        if paths.is_empty() {
            return;
        }
        info!(target: "artifacts", count = paths.len(), "cleaning all tracked artifacts");
        join_all(paths.iter().map(|p| self.cleanup(p))).await;
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// One sweep pass: delete tracked files whose last-modified age exceeds
    /// the configured maximum, and drop entries whose file is already gone.
    /// Returns how many files were removed.
    pub async fn sweep_once(&self) -> usize {
        let paths: Vec<PathBuf> = self.tracked.iter().map(|e| e.key().clone()).collect();
        let mut removed = 0;
        for path in paths {
            let stale = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta
                    .modified()
                    .ok()
                    .and_then(|m| m.elapsed().ok())
                    .map(|age| age >= self.max_age)
                    .unwrap_or(false),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    // Engine never produced it, or someone else reclaimed it.
                    self.tracked.remove(&path);
                    continue;
                }
                Err(_) => false,
            };
            if stale {
                info!(target: "artifacts", path = %path.display(), "sweeping abandoned artifact");
                self.cleanup(&path).await;
                removed += 1;
            }
        }
        removed
    }

    /// Periodic staleness sweep.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        let period = self.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; skip the zeroth tick
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = tracker.sweep_once().await;
                if removed > 0 {
                    info!(target: "artifacts", removed, "sweep pass complete");
                }
            }
        })
    }

    /// Best-effort cleanup when the process receives SIGINT/SIGTERM.
    pub fn spawn_signal_cleanup(self: &Arc<Self>) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            wait_for_termination().await;
            info!(target: "artifacts", "termination signal; cleaning tracked artifacts");
            tracker.cleanup_all().await;
        })
    }
}

async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Timestamp in milliseconds since UNIX epoch, for artifact file names.
pub(crate) fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
