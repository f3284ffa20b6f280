use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;

use crate::{
    error::{Result, SinkError},
    video::{sink::OutputSink, types::Frame},
};

/// Processed frames parked on disk until they can be written last-first
///
/// Frames are stored as raw RGB24 in an anonymous file that is removed when
/// the spool is dropped. Only one frame is ever resident while replaying.
pub struct FrameSpool {
    writer: BufWriter<File>,
    dimensions: Option<(u32, u32)>,
    count: u64,
}

impl FrameSpool {
    pub fn new_in(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let file = tempfile::tempfile_in(dir)?;
        debug!("Spooling frames under {:?}", dir);
        Ok(Self {
            writer: BufWriter::new(file),
            dimensions: None,
            count: 0,
        })
    }

    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append a frame; every frame must match the first one's size
    pub fn push(&mut self, frame: &Frame) -> Result<()> {
        let (width, height) = *self.dimensions.get_or_insert(frame.dimensions());
        if frame.dimensions() != (width, height) {
            return Err(SinkError::FrameSizeMismatch {
                width,
                height,
                actual_width: frame.width(),
                actual_height: frame.height(),
            }
            .into());
        }
        self.writer.write_all(frame.as_rgb_bytes())?;
        self.count += 1;
        Ok(())
    }

    /// Write every spooled frame to `sink`, newest first
    pub fn drain_reversed(self, sink: &mut dyn OutputSink) -> Result<u64> {
        let count = self.count;
        let Some((width, height)) = self.dimensions else {
            return Ok(0);
        };
        let mut file = self.writer.into_inner().map_err(|e| e.into_error())?;
        let frame_len = width as u64 * height as u64 * 3;
        let mut buffer = vec![0u8; frame_len as usize];

        for index in (0..count).rev() {
            file.seek(SeekFrom::Start(index * frame_len))?;
            file.read_exact(&mut buffer)?;
            let frame = Frame::from_rgb_bytes(width, height, buffer).ok_or_else(|| SinkError::WriteFailed {
                frame: index,
                reason: "spooled frame is truncated".to_string(),
            })?;
            sink.write_frame(&frame)?;
            buffer = frame.into_image().into_raw();
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::sink::{EncodedVideo, SinkSpec};
    use crate::video::types::OutputFormat;
    use std::path::PathBuf;
    use tempfile::tempdir;

    struct VecSink {
        spec: SinkSpec,
        frames: Vec<Frame>,
    }

    impl OutputSink for VecSink {
        fn spec(&self) -> &SinkSpec {
            &self.spec
        }

        fn write_frame(&mut self, frame: &Frame) -> Result<()> {
            self.frames.push(frame.clone());
            Ok(())
        }

        fn frames_written(&self) -> u64 {
            self.frames.len() as u64
        }

        fn finish(self: Box<Self>) -> Result<EncodedVideo> {
            Ok(EncodedVideo { path: PathBuf::new(), frame_count: self.frames.len() as u64, file_size: 0 })
        }
    }

    fn sink() -> VecSink {
        VecSink {
            spec: SinkSpec { format: OutputFormat::Mp4, fps: 30.0, width: 3, height: 2 },
            frames: Vec::new(),
        }
    }

    #[test]
    fn test_replays_last_first() {
        let dir = tempdir().unwrap();
        let mut spool = FrameSpool::new_in(dir.path()).unwrap();
        for i in 0..40u8 {
            let mut frame = Frame::new_filled(3, 2, [i, 0, 255 - i]);
            frame.set_pixel(2, 1, [i, i, i]);
            spool.push(&frame).unwrap();
        }
        assert_eq!(spool.len(), 40);

        let mut out = sink();
        assert_eq!(spool.drain_reversed(&mut out).unwrap(), 40);
        assert_eq!(out.frames.len(), 40);
        for (position, frame) in out.frames.iter().enumerate() {
            let i = 39 - position as u8;
            assert_eq!(frame.get_pixel(0, 0), [i, 0, 255 - i]);
            assert_eq!(frame.get_pixel(2, 1), [i, i, i]);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_spool_file_is_anonymous() {
        let dir = tempdir().unwrap();
        let mut spool = FrameSpool::new_in(dir.path()).unwrap();
        spool.push(&Frame::new_black(3, 2)).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_rejects_mixed_sizes() {
        let dir = tempdir().unwrap();
        let mut spool = FrameSpool::new_in(dir.path()).unwrap();
        spool.push(&Frame::new_black(3, 2)).unwrap();
        assert!(spool.push(&Frame::new_black(2, 2)).is_err());
        assert_eq!(spool.len(), 1);
    }

    #[test]
    fn test_empty_spool_writes_nothing() {
        let dir = tempdir().unwrap();
        let spool = FrameSpool::new_in(dir.path()).unwrap();
        assert!(spool.is_empty());
        let mut out = sink();
        assert_eq!(spool.drain_reversed(&mut out).unwrap(), 0);
        assert!(out.frames.is_empty());
    }
}
