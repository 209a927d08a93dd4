// Engine configuration - RON file with defaults for every tunable

use crate::render::SoundSource;
use crate::sequencer::pattern::{MAX_MEASURES, MIN_MEASURES};
use crate::sequencer::scheduler::{Drive, LookAhead};
use crate::sequencer::{MetronomeSettings, RestartPolicy, Tempo, TimeSignature};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Look-ahead scheduler timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How far ahead each poll commits events
    pub lookahead_ms: u64,
    /// Wall-clock time between polls
    pub poll_interval_ms: u64,
    /// Where playback restarts after a stop
    pub on_restart: RestartPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lookahead_ms: 100,
            poll_interval_ms: 25,
            on_restart: RestartPolicy::Rewind,
        }
    }
}

impl SchedulerConfig {
    pub fn lookahead(&self) -> LookAhead {
        LookAhead::new(Duration::from_millis(self.lookahead_ms))
    }

    pub fn drive(&self) -> Drive {
        Drive::Interval(Duration::from_millis(self.poll_interval_ms))
    }
}

/// Startup settings for a [`crate::DrumMachine`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub bpm: Tempo,
    pub time_signature: TimeSignature,
    pub total_measures: usize,
    pub sound_source: SoundSource,
    pub scheduler: SchedulerConfig,
    pub metronome: MetronomeSettings,
    /// Library directory; the platform data directory when unset
    pub library_path: Option<PathBuf>,
    pub notification_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bpm: Tempo::default(),
            time_signature: TimeSignature::default(),
            total_measures: 1,
            sound_source: SoundSource::default(),
            scheduler: SchedulerConfig::default(),
            metronome: MetronomeSettings::default(),
            library_path: None,
            notification_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Read and validate a RON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_ron(&raw)?;
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parse and validate RON text
    pub fn from_ron(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_ron(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_MEASURES..=MAX_MEASURES).contains(&self.total_measures) {
            return Err(ConfigError::Invalid(format!(
                "total_measures must be between {} and {}",
                MIN_MEASURES, MAX_MEASURES
            )));
        }

        if self.scheduler.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be positive".to_string(),
            ));
        }

        if self.scheduler.lookahead_ms <= self.scheduler.poll_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "lookahead_ms ({}) must exceed poll_interval_ms ({})",
                self.scheduler.lookahead_ms, self.scheduler.poll_interval_ms
            )));
        }

        if !(0.0..=1.0).contains(&self.metronome.volume) {
            return Err(ConfigError::Invalid(
                "metronome volume must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.notification_capacity == 0 {
            return Err(ConfigError::Invalid(
                "notification_capacity must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Library directory to use
    pub fn library_dir(&self) -> PathBuf {
        self.library_path
            .clone()
            .or_else(|| dirs::data_dir().map(|dir| dir.join("groovestation")))
            .unwrap_or_else(|| PathBuf::from("groovestation-library"))
    }
}
