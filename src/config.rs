use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Main configuration for the clipshop engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Frame pipeline settings
    pub engine: EngineConfig,

    /// External encoder/decoder settings
    pub encoder: EncoderConfig,

    /// Job scheduling and retention
    pub jobs: JobsConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            key: "config".to_string(),
            value: e.to_string(),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.engine.validate()?;
        self.encoder.validate()?;
        self.jobs.validate()?;
        Ok(())
    }
}

/// Frame pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frames accumulated before an effect batch is dispatched
    pub batch_size: usize,

    /// Run per-frame effects across a batch on the rayon pool
    pub parallel_effects: bool,

    /// Worker threads for the effect pool
    pub effect_threads: usize,

    /// Where staged inputs and outputs live
    pub temp_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 30,
            parallel_effects: true,
            effect_threads: num_cpus::get(),
            temp_dir: std::env::temp_dir().join("clipshop"),
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "engine.batch_size".to_string(),
                value: self.batch_size.to_string(),
            }
            .into());
        }

        if self.effect_threads == 0 {
            return Err(ConfigError::InvalidValue {
                key: "engine.effect_threads".to_string(),
                value: self.effect_threads.to_string(),
            }
            .into());
        }

        Ok(())
    }
}

/// ffmpeg/ffprobe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub ffmpeg_path: String,

    pub ffprobe_path: String,

    /// Quality setting (0-100, higher is better)
    pub quality: u8,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            quality: 85,
        }
    }
}

impl EncoderConfig {
    fn validate(&self) -> Result<()> {
        if self.quality > 100 {
            return Err(ConfigError::InvalidValue {
                key: "encoder.quality".to_string(),
                value: self.quality.to_string(),
            }
            .into());
        }

        if self.ffmpeg_path.trim().is_empty() || self.ffprobe_path.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "encoder.ffmpeg_path".to_string(),
                value: format!("{:?}/{:?}", self.ffmpeg_path, self.ffprobe_path),
            }
            .into());
        }

        Ok(())
    }

    /// Map quality onto the mpeg4 `-q:v` scale (2 = best, 31 = worst)
    pub fn qscale(&self) -> u8 {
        let quality = self.quality.min(100) as f32 / 100.0;
        (31.0 - quality * 29.0).round() as u8
    }
}

/// Job scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Upper bound on concurrently running jobs; unbounded when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<usize>,

    /// Seconds a finished job is kept before a sweep releases it
    pub retention_secs: u64,

    /// Run a background task that releases expired jobs
    pub auto_sweep: bool,

    /// Seconds between background sweeps
    pub sweep_interval_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: None,
            retention_secs: 3600,
            auto_sweep: true,
            sweep_interval_secs: 300,
        }
    }
}

impl JobsConfig {
    fn validate(&self) -> Result<()> {
        if self.max_concurrent == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "jobs.max_concurrent".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        if self.auto_sweep && self.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "jobs.sweep_interval_secs".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        Ok(())
    }
}
