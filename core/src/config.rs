//! Runtime configuration.
//!
//! Every section has a `Default` impl that reads `ORATOR_*` environment
//! variables and falls back to fixed constants, so `OratorConfig::default()`
//! yields a working setup on a machine with the engine on `PATH`.

use std::path::{Path, PathBuf};

/// Top-level configuration for an [`crate::Orator`] runtime.
#[derive(Clone, Debug, Default)]
pub struct OratorConfig {
    pub engine: EngineConfig,
    pub supervisor: SupervisorConfig,
    pub retry: RetryConfig,
    pub artifacts: ArtifactConfig,
    pub cache: CacheConfig,
    pub playback: PlaybackConfig,
}

/// External synthesis engine invocation settings.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Engine binary. Resolved from `ORATOR_ENGINE_BIN`, then `PATH`.
    pub bin: PathBuf,
    /// Timeout for one synthesis run.
    pub synth_timeout_ms: u64,
    /// Timeout for narrator/emotion listing runs.
    pub list_timeout_ms: u64,
    /// Filename prefix for generated artifacts.
    pub artifact_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let bin = get_from_env_or_path("ORATOR_ENGINE_BIN", "voicepeak")
            .unwrap_or_else(|| PathBuf::from("voicepeak"));
        let synth_timeout_ms = std::env::var("ORATOR_SYNTH_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30_000);
        let list_timeout_ms = std::env::var("ORATOR_LIST_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(10_000);

        Self {
            bin,
            synth_timeout_ms,
            list_timeout_ms,
            artifact_prefix: "orator".to_string(),
        }
    }
}

/// Process supervision settings shared by all process types.
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Hard cap on concurrently running child processes.
    pub max_processes: usize,
    /// Grace period between the graceful and forceful kill signals.
    pub kill_grace_ms: u64,
    /// stderr lines containing this marker are dropped from failure messages.
    pub debug_marker: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        let max_processes = std::env::var("ORATOR_MAX_PROCESSES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(5);
        let debug_marker =
            std::env::var("ORATOR_DEBUG_MARKER").unwrap_or_else(|_| "[debug]".to_string());

        Self {
            max_processes,
            kill_grace_ms: 5_000,
            debug_marker,
        }
    }
}

/// Bounded-retry settings for one logical synthesis operation.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: std::env::var("ORATOR_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(5),
            delay_ms: std::env::var("ORATOR_RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1_000),
        }
    }
}

/// Temporary artifact lifecycle settings.
#[derive(Clone, Debug)]
pub struct ArtifactConfig {
    pub temp_dir: PathBuf,
    /// Period of the background staleness sweep.
    pub sweep_interval_ms: u64,
    /// Tracked files older than this are treated as abandoned.
    pub max_age_ms: u64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        let temp_dir = std::env::var("ORATOR_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());

        Self {
            temp_dir,
            sweep_interval_ms: 300_000,
            max_age_ms: 3_600_000,
        }
    }
}

/// Narrator list cache settings.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: std::env::var("ORATOR_CACHE_TTL_MS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(300_000),
        }
    }
}

/// Audio playback settings.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Explicit player binary; when unset a known player is probed on `PATH`.
    pub player_bin: Option<PathBuf>,
    pub timeout_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            player_bin: std::env::var("ORATOR_PLAYER").ok().map(PathBuf::from),
            timeout_ms: std::env::var("ORATOR_PLAY_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60_000),
        }
    }
}

pub(crate) fn get_from_env_or_path(env_key: &str, default_bin: &str) -> Option<PathBuf> {
    if let Ok(p) = std::env::var(env_key) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Some(pb);
        }
    }
    get_from_path(default_bin)
}

pub(crate) fn get_from_path(bin: &str) -> Option<PathBuf> {
    if bin.contains(std::path::MAIN_SEPARATOR) {
        let p = PathBuf::from(bin);
        return if p.exists() { Some(p) } else { None };
    }
    if let Ok(paths) = std::env::var("PATH") {
        for dir in paths.split(if cfg!(windows) { ';' } else { ':' }) {
            let candidate = Path::new(dir).join(bin);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }
    None
}
