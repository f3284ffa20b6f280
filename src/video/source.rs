use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::EncoderConfig;
use crate::error::{Result, SourceError};
use crate::video::types::{Frame, VideoMetadata};

/// Sequential reader over a staged video file
pub trait VideoSource: Send {
    fn metadata(&self) -> &VideoMetadata;

    /// Decode the next frame, or `None` at end of stream
    fn read_frame(&mut self) -> Result<Option<Frame>>;
}

/// Decodes through an `ffmpeg` child process emitting raw RGB24 on stdout
pub struct FfmpegSource {
    metadata: VideoMetadata,
    child: Child,
    stdout: ChildStdout,
    frame_bytes: usize,
    frames_read: u64,
    finished: bool,
}

impl FfmpegSource {
    pub fn open<P: AsRef<Path>>(path: P, encoder: &EncoderConfig) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SourceError::OpenFailed {
                path: path.display().to_string(),
                reason: "file does not exist".to_string(),
            }
            .into());
        }

        let metadata = probe(path, encoder)?;
        info!(
            "Opened source {}: {}x{} @ {:.2} fps, {} frames ({})",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.frame_count,
            metadata.codec
        );

        let mut child = Command::new(&encoder.ffmpeg_path)
            .args(["-v", "error", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SourceError::OpenFailed {
                path: path.display().to_string(),
                reason: format!("failed to spawn {}: {}", encoder.ffmpeg_path, e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| SourceError::OpenFailed {
            path: path.display().to_string(),
            reason: "decoder stdout unavailable".to_string(),
        })?;

        let frame_bytes = metadata.width as usize * metadata.height as usize * 3;

        Ok(Self {
            metadata,
            child,
            stdout,
            frame_bytes,
            frames_read: 0,
            finished: false,
        })
    }

    fn finish_decoder(&mut self) -> Result<()> {
        self.finished = true;
        let status = self.child.wait().map_err(|e| SourceError::DecodeFailed {
            reason: format!("failed to wait for decoder: {}", e),
        })?;
        if !status.success() {
            return Err(SourceError::DecodeFailed {
                reason: format!("decoder exited with {} after {} frames", status, self.frames_read),
            }
            .into());
        }
        debug!("Decoder finished after {} frames", self.frames_read);
        Ok(())
    }
}

impl VideoSource for FfmpegSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let mut data = vec![0u8; self.frame_bytes];
        let mut filled = 0;
        while filled < data.len() {
            match self.stdout.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(SourceError::DecodeFailed {
                        reason: format!("read failed at frame {}: {}", self.frames_read, e),
                    }
                    .into())
                }
            }
        }

        if filled == 0 {
            self.finish_decoder()?;
            return Ok(None);
        }
        if filled < data.len() {
            warn!("Truncated frame {} ({} of {} bytes)", self.frames_read, filled, data.len());
            self.finish_decoder()?;
            return Ok(None);
        }

        self.frames_read += 1;
        Frame::from_rgb_bytes(self.metadata.width, self.metadata.height, data)
            .map(Some)
            .ok_or_else(|| {
                SourceError::DecodeFailed {
                    reason: "frame buffer size mismatch".to_string(),
                }
                .into()
            })
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    codec_name: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn probe(path: &Path, encoder: &EncoderConfig) -> Result<VideoMetadata> {
    let probe_err = |reason: String| SourceError::ProbeFailed {
        path: path.display().to_string(),
        reason,
    };

    let output = Command::new(&encoder.ffprobe_path)
        .args(["-v", "error", "-select_streams", "v:0", "-show_streams", "-show_format", "-of", "json"])
        .arg(path)
        .output()
        .map_err(|e| probe_err(format!("failed to run {}: {}", encoder.ffprobe_path, e)))?;

    if !output.status.success() {
        return Err(SourceError::OpenFailed {
            path: path.display().to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }

    let parsed: ProbeOutput =
        serde_json::from_slice(&output.stdout).map_err(|e| probe_err(format!("invalid ffprobe output: {}", e)))?;

    metadata_from_probe(parsed).map_err(|reason| probe_err(reason).into())
}

fn metadata_from_probe(probe: ProbeOutput) -> std::result::Result<VideoMetadata, String> {
    let stream = probe.streams.into_iter().next().ok_or("no video stream")?;

    let width = stream.width.filter(|w| *w > 0).ok_or("missing width")?;
    let height = stream.height.filter(|h| *h > 0).ok_or("missing height")?;

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .ok_or("missing frame rate")?;

    let duration = stream
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| probe.format.and_then(|f| f.duration).and_then(|d| d.parse().ok()))
        .unwrap_or(0.0);

    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or_else(|| (duration * fps).round().max(0.0) as u64);

    Ok(VideoMetadata {
        fps,
        width,
        height,
        frame_count,
        duration,
        codec: stream.codec_name.unwrap_or_else(|| "unknown".to_string()),
    })
}

/// Parse an ffprobe rational like `30000/1001`
fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = match rate.split_once('/') {
        Some((n, d)) => (n.parse::<f64>().ok()?, d.parse::<f64>().ok()?),
        None => (rate.parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("30/1"), Some(30.0));
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("25"), Some(25.0));
    }

    #[test]
    fn test_metadata_from_probe_json() {
        let json = r#"{
            "streams": [{"width": 640, "height": 360, "codec_name": "h264",
                         "avg_frame_rate": "30/1", "nb_frames": "300", "duration": "10.0"}],
            "format": {"duration": "10.02"}
        }"#;
        let probe: ProbeOutput = serde_json::from_str(json).unwrap();
        let meta = metadata_from_probe(probe).unwrap();
        assert_eq!((meta.width, meta.height, meta.frame_count), (640, 360, 300));
        assert_eq!(meta.fps, 30.0);
        assert_eq!(meta.codec, "h264");
    }

    #[test]
    fn test_frame_count_falls_back_to_duration() {
        let json = r#"{
            "streams": [{"width": 320, "height": 240, "avg_frame_rate": "0/0", "r_frame_rate": "25/1"}],
            "format": {"duration": "4.0"}
        }"#;
        let probe: ProbeOutput = serde_json::from_str(json).unwrap();
        let meta = metadata_from_probe(probe).unwrap();
        assert_eq!(meta.fps, 25.0);
        assert_eq!(meta.frame_count, 100);
    }

    #[test]
    fn test_missing_file_fails_to_open() {
        let result = FfmpegSource::open("/definitely/not/here.mp4", &EncoderConfig::default());
        assert!(matches!(
            result,
            Err(crate::error::EngineError::Source(SourceError::OpenFailed { .. }))
        ));
    }
}
