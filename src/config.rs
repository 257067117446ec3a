// engine tuning, read from <project>/.rowsynth/config.json when it exists

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::shared::{CONFIG_FILE, PROJECT_DIR};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_instruments: usize, // live voice chains the engine will hold, transient ones included
    pub command_queue: usize,
    pub lookahead_ms: u64, // how far ahead of the audio clock ticks get scheduled
    pub poll_interval_ms: u64,
    pub tempo_ramp_secs: f32,
    pub offline_sample_rate: u32,
    pub block_frames: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_instruments: 64,
            command_queue: 1024,
            lookahead_ms: 100,
            poll_interval_ms: 5,
            tempo_ramp_secs: 1.0,
            offline_sample_rate: 44100,
            block_frames: 256,
        }
    }
}

impl EngineConfig {
    pub fn lookahead_secs(&self) -> f64 {
        self.lookahead_ms as f64 / 1000.0
    }
}

fn config_file_path(project_dir: &Path) -> PathBuf {
    project_dir.join(PROJECT_DIR).join(CONFIG_FILE)
}

// missing file means defaults; a broken one is reported and ignored
pub fn load_config(project_dir: &Path) -> EngineConfig {
    let path = config_file_path(project_dir);
    let Ok(data) = std::fs::read_to_string(&path) else {
        return EngineConfig::default();
    };
    match serde_json::from_str(&data) {
        Ok(config) => config,
        Err(e) => {
            warn!("ignoring malformed {}: {}", path.display(), e);
            EngineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_config(dir.path()), EngineConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(PROJECT_DIR)).unwrap();
        std::fs::write(config_file_path(dir.path()), r#"{"lookahead_ms": 40}"#).unwrap();
        let config = load_config(dir.path());
        assert_eq!(config.lookahead_ms, 40);
        assert_eq!(config.max_instruments, 64);
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(PROJECT_DIR)).unwrap();
        std::fs::write(config_file_path(dir.path()), "{not json").unwrap();
        assert_eq!(load_config(dir.path()), EngineConfig::default());
    }
}
