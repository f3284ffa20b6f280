//! In-process media backend: a deterministic frame generator and a capturing sink.
//!
//! Used by the test-suite and by the CLI's `--synthetic` mode to exercise the
//! full job pipeline without an ffmpeg installation.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, SinkError, SourceError};
use crate::video::backend::MediaBackend;
use crate::video::sink::{check_frame_size, EncodedVideo, OutputSink, SinkSpec};
use crate::video::source::VideoSource;
use crate::video::types::{Frame, VideoMetadata};

/// Shape of the generated clip
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticClip {
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// Frame count reported in the metadata
    pub frame_count: u64,
    /// Frames actually produced before end of stream; defaults to `frame_count`
    pub decodable_frames: Option<u64>,
}

impl Default for SyntheticClip {
    fn default() -> Self {
        Self {
            fps: 30.0,
            width: 64,
            height: 48,
            frame_count: 300,
            decodable_frames: None,
        }
    }
}

type Captures = Arc<Mutex<HashMap<PathBuf, Vec<Frame>>>>;

/// Backend producing [`SyntheticClip`] frames and recording everything written
#[derive(Clone, Default)]
pub struct SyntheticBackend {
    clip: SyntheticClip,
    fail_writes_after: Option<u64>,
    captures: Captures,
}

impl SyntheticBackend {
    pub fn new(clip: SyntheticClip) -> Self {
        Self {
            clip,
            fail_writes_after: None,
            captures: Arc::default(),
        }
    }

    /// Make every sink fail once it has accepted `frames` frames
    pub fn failing_after(mut self, frames: u64) -> Self {
        self.fail_writes_after = Some(frames);
        self
    }

    pub fn clip(&self) -> &SyntheticClip {
        &self.clip
    }

    /// Frames written to the sink at `path`, in write order
    pub fn captured(&self, path: &Path) -> Option<Vec<Frame>> {
        self.captures.lock().get(path).cloned()
    }

    /// The frame the source emits at `index`
    pub fn frame_at(&self, index: u64) -> Frame {
        SyntheticSource::render(index, self.clip.width, self.clip.height)
    }
}

impl MediaBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn open_source(&self, path: &Path) -> Result<Box<dyn VideoSource>> {
        if !path.is_file() {
            return Err(SourceError::OpenFailed {
                path: path.display().to_string(),
                reason: "file does not exist".to_string(),
            }
            .into());
        }
        Ok(Box::new(SyntheticSource::new(self.clip.clone())))
    }

    fn open_sink(&self, path: &Path, spec: SinkSpec) -> Result<Box<dyn OutputSink>> {
        let file = File::create(path).map_err(|e| SinkError::OpenFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.captures.lock().insert(path.to_path_buf(), Vec::new());

        Ok(Box::new(CaptureSink {
            spec,
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            frames_written: 0,
            fail_writes_after: self.fail_writes_after,
            captures: Arc::clone(&self.captures),
        }))
    }
}

/// Deterministic gradient source; no pixel reaches full intensity
pub struct SyntheticSource {
    metadata: VideoMetadata,
    limit: u64,
    next: u64,
}

impl SyntheticSource {
    pub fn new(clip: SyntheticClip) -> Self {
        let limit = clip.decodable_frames.unwrap_or(clip.frame_count);
        Self {
            metadata: VideoMetadata {
                fps: clip.fps,
                width: clip.width,
                height: clip.height,
                frame_count: clip.frame_count,
                duration: clip.frame_count as f64 / clip.fps,
                codec: "synthetic".to_string(),
            },
            limit,
            next: 0,
        }
    }

    pub fn render(index: u64, width: u32, height: u32) -> Frame {
        let i = index as u32;
        let image = image::ImageBuffer::from_fn(width, height, |x, y| {
            image::Rgb([
                ((x * 7 + i) % 128 + 20) as u8,
                ((y * 5 + i * 3) % 128 + 10) as u8,
                ((x + y + i) % 100 + 50) as u8,
            ])
        });
        Frame::new(image)
    }
}

impl VideoSource for SyntheticSource {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if self.next >= self.limit {
            return Ok(None);
        }
        let frame = Self::render(self.next, self.metadata.width, self.metadata.height);
        self.next += 1;
        Ok(Some(frame))
    }
}

/// Sink that writes raw RGB to disk and keeps a copy of every frame
pub struct CaptureSink {
    spec: SinkSpec,
    path: PathBuf,
    writer: BufWriter<File>,
    frames_written: u64,
    fail_writes_after: Option<u64>,
    captures: Captures,
}

impl OutputSink for CaptureSink {
    fn spec(&self) -> &SinkSpec {
        &self.spec
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        check_frame_size(&self.spec, frame)?;

        if self.fail_writes_after.is_some_and(|limit| self.frames_written >= limit) {
            return Err(SinkError::WriteFailed {
                frame: self.frames_written,
                reason: "injected write failure".to_string(),
            }
            .into());
        }

        self.writer.write_all(frame.as_rgb_bytes()).map_err(|e| SinkError::WriteFailed {
            frame: self.frames_written,
            reason: e.to_string(),
        })?;
        if let Some(frames) = self.captures.lock().get_mut(&self.path) {
            frames.push(frame.clone());
        }
        self.frames_written += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn finish(mut self: Box<Self>) -> Result<EncodedVideo> {
        self.writer.flush().map_err(|e| SinkError::FinishFailed { reason: e.to_string() })?;
        let file_size = std::fs::metadata(&self.path)?.len();
        debug!("Captured {} frames to {}", self.frames_written, self.path.display());
        Ok(EncodedVideo {
            path: self.path.clone(),
            frame_count: self.frames_written,
            file_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::types::OutputFormat;
    use tempfile::tempdir;

    #[test]
    fn test_source_respects_decodable_limit() {
        let mut source = SyntheticSource::new(SyntheticClip {
            frame_count: 10,
            decodable_frames: Some(3),
            ..SyntheticClip::default()
        });
        let mut count = 0;
        while source.read_frame().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(source.metadata().frame_count, 10);
    }

    #[test]
    fn test_capture_sink_records_frames() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.mp4");
        let backend = SyntheticBackend::new(SyntheticClip::default());
        let spec = SinkSpec { format: OutputFormat::Mp4, fps: 30.0, width: 64, height: 48 };

        let mut sink = backend.open_sink(&path, spec).unwrap();
        sink.write_frame(&backend.frame_at(0)).unwrap();
        sink.write_frame(&backend.frame_at(1)).unwrap();
        let encoded = sink.finish().unwrap();

        assert_eq!(encoded.frame_count, 2);
        assert_eq!(encoded.file_size, 2 * 64 * 48 * 3);
        assert_eq!(backend.captured(&path).unwrap()[1], backend.frame_at(1));
    }

    #[test]
    fn test_capture_sink_rejects_wrong_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.avi");
        let backend = SyntheticBackend::new(SyntheticClip::default());
        let spec = SinkSpec { format: OutputFormat::Avi, fps: 30.0, width: 32, height: 32 };

        let mut sink = backend.open_sink(&path, spec).unwrap();
        assert!(sink.write_frame(&backend.frame_at(0)).is_err());
    }

    #[test]
    fn test_open_source_requires_existing_file() {
        let backend = SyntheticBackend::default();
        assert!(backend.open_source(Path::new("/no/such/input.mp4")).is_err());
    }
}
