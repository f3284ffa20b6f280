use std::path::Path;

use crate::config::EncoderConfig;
use crate::error::Result;
use crate::video::sink::{FfmpegSink, OutputSink, SinkSpec};
use crate::video::source::{FfmpegSource, VideoSource};

/// Pairs a decoder and an encoder implementation for the job runner
pub trait MediaBackend: Send + Sync {
    fn name(&self) -> &str;

    fn open_source(&self, path: &Path) -> Result<Box<dyn VideoSource>>;

    fn open_sink(&self, path: &Path, spec: SinkSpec) -> Result<Box<dyn OutputSink>>;
}

/// Backend driving the `ffprobe`/`ffmpeg` executables
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend {
    encoder: EncoderConfig,
}

impl FfmpegBackend {
    pub fn new(encoder: EncoderConfig) -> Self {
        Self { encoder }
    }

    /// Whether the configured ffmpeg binary can be executed
    pub fn is_available(&self) -> bool {
        std::process::Command::new(&self.encoder.ffmpeg_path)
            .arg("-version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl MediaBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn open_source(&self, path: &Path) -> Result<Box<dyn VideoSource>> {
        Ok(Box::new(FfmpegSource::open(path, &self.encoder)?))
    }

    fn open_sink(&self, path: &Path, spec: SinkSpec) -> Result<Box<dyn OutputSink>> {
        Ok(Box::new(FfmpegSink::open(path, spec, &self.encoder)?))
    }
}
