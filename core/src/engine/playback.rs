//! Audio playback of generated artifacts.
//!
//! Playback is a separate process type: it runs under the supervisor's cap
//! but never through the synthesis queue, so audio can play while the next
//! synthesis job is running.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{get_from_path, PlaybackConfig};
use crate::supervisor::{ProcessSupervisor, RunOptions};
use crate::Result;

pub struct AudioPlayer {
    bin: Option<PathBuf>,
    timeout: Duration,
    supervisor: Arc<ProcessSupervisor>,
}

impl AudioPlayer {
    pub fn new(cfg: &PlaybackConfig, supervisor: Arc<ProcessSupervisor>) -> Self {
        let bin = cfg.player_bin.clone().or_else(detect_player);
        if let Some(ref b) = bin {
            info!(target: "playback", bin = ?b, "Detected audio player");
        }
        Self {
            bin,
            timeout: Duration::from_millis(cfg.timeout_ms),
            supervisor,
        }
    }

    /// Play a WAV file, blocking until playback ends. Without a player the
    /// file is simply kept on disk.
    pub async fn play(&self, wav: &Path) -> Result<()> {
        let Some(bin) = &self.bin else {
            info!(
                target: "playback",
                path = %wav.display(),
                "No audio player found; keeping WAV on disk"
            );
            return Ok(());
        };

        let name = bin.file_name().and_then(|s| s.to_str()).unwrap_or("");
        let mut args = Vec::new();
        if name == "ffplay" {
            args.push("-autoexit".to_string());
            args.push("-nodisp".to_string());
        }
        args.push(wav.to_string_lossy().into_owned());

        self.supervisor
            .run(bin, &args, RunOptions::with_timeout(self.timeout))
            .await?;
        Ok(())
    }
}

fn detect_player() -> Option<PathBuf> {
    ["afplay", "aplay", "paplay", "ffplay"]
        .iter()
        .find_map(|name| get_from_path(name))
}
