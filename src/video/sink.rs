use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use tracing::{debug, info};

use crate::config::EncoderConfig;
use crate::error::{Result, SinkError};
use crate::video::types::{Frame, OutputFormat};

/// What the sink is asked to produce
#[derive(Debug, Clone, PartialEq)]
pub struct SinkSpec {
    pub format: OutputFormat,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

/// Summary of a finalized output
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedVideo {
    pub path: PathBuf,
    pub frame_count: u64,
    pub file_size: u64,
}

/// Encoder for a single job's output. Frames are written in arrival order.
pub trait OutputSink: Send {
    fn spec(&self) -> &SinkSpec;

    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    fn frames_written(&self) -> u64;

    /// Flush and close the container
    fn finish(self: Box<Self>) -> Result<EncodedVideo>;
}

/// Check a frame against the sink's fixed output size
pub(crate) fn check_frame_size(spec: &SinkSpec, frame: &Frame) -> Result<()> {
    if frame.dimensions() != (spec.width, spec.height) {
        return Err(SinkError::FrameSizeMismatch {
            width: spec.width,
            height: spec.height,
            actual_width: frame.width(),
            actual_height: frame.height(),
        }
        .into());
    }
    Ok(())
}

/// Encodes through an `ffmpeg` child process reading raw RGB24 on stdin
pub struct FfmpegSink {
    spec: SinkSpec,
    path: PathBuf,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    /// Drains encoder diagnostics so a chatty encoder never stalls on a full pipe
    stderr: Option<JoinHandle<String>>,
    frames_written: u64,
}

/// Bytes of encoder stderr kept for error reports
const STDERR_TAIL: usize = 8 * 1024;

/// Read `stderr` to the end on its own thread, keeping only the last bytes
fn drain_stderr(mut stderr: ChildStderr) -> std::io::Result<JoinHandle<String>> {
    std::thread::Builder::new()
        .name("clipshop-encoder-stderr".to_string())
        .spawn(move || {
            let mut tail = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                match stderr.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        tail.extend_from_slice(&chunk[..n]);
                        let excess = tail.len().saturating_sub(STDERR_TAIL);
                        tail.drain(..excess);
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
            String::from_utf8_lossy(&tail).trim().to_string()
        })
}

impl FfmpegSink {
    pub fn open<P: AsRef<Path>>(path: P, spec: SinkSpec, encoder: &EncoderConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let open_err = |reason: String| SinkError::OpenFailed {
            path: path.display().to_string(),
            reason,
        };

        if spec.width == 0 || spec.height == 0 || !(spec.fps > 0.0) {
            return Err(open_err(format!("invalid output {}x{} @ {} fps", spec.width, spec.height, spec.fps)).into());
        }

        let mut child = Command::new(&encoder.ffmpeg_path)
            .args(["-y", "-v", "error", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", spec.width, spec.height)])
            .args(["-r", &format!("{:.6}", spec.fps)])
            .args(["-i", "pipe:0"])
            .args(["-c:v", spec.format.ffmpeg_codec()])
            .args(["-tag:v", spec.format.fourcc()])
            .args(["-q:v", &encoder.qscale().to_string()])
            .args(["-pix_fmt", "yuv420p"])
            .arg(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| open_err(format!("failed to spawn {}: {}", encoder.ffmpeg_path, e)))?;

        let stdin = child.stdin.take().ok_or_else(|| open_err("encoder stdin unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| open_err("encoder stderr unavailable".to_string()))
            .and_then(|stderr| drain_stderr(stderr).map_err(|e| open_err(format!("stderr reader: {}", e))));
        let stderr = match stderr {
            Ok(stderr) => stderr,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.into());
            }
        };

        info!(
            "Opened {} sink {} ({}x{} @ {:.2} fps, tag {})",
            spec.format,
            path.display(),
            spec.width,
            spec.height,
            spec.fps,
            spec.format.fourcc()
        );

        Ok(Self {
            spec,
            path,
            child: Some(child),
            stdin: Some(stdin),
            stderr: Some(stderr),
            frames_written: 0,
        })
    }
}

impl OutputSink for FfmpegSink {
    fn spec(&self) -> &SinkSpec {
        &self.spec
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        check_frame_size(&self.spec, frame)?;

        let stdin = self.stdin.as_mut().ok_or_else(|| SinkError::WriteFailed {
            frame: self.frames_written,
            reason: "encoder already closed".to_string(),
        })?;

        stdin.write_all(frame.as_rgb_bytes()).map_err(|e| SinkError::WriteFailed {
            frame: self.frames_written,
            reason: e.to_string(),
        })?;

        self.frames_written += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn finish(mut self: Box<Self>) -> Result<EncodedVideo> {
        // Closing stdin signals end of input to the encoder
        drop(self.stdin.take());

        let mut child = self.child.take().ok_or_else(|| SinkError::FinishFailed {
            reason: "encoder already finished".to_string(),
        })?;
        let status = child.wait().map_err(|e| SinkError::FinishFailed {
            reason: format!("failed to wait for encoder: {}", e),
        })?;
        let diagnostics = self
            .stderr
            .take()
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(SinkError::FinishFailed {
                reason: format!("encoder exited with {}: {}", status, diagnostics),
            }
            .into());
        }
        if !diagnostics.is_empty() {
            debug!("Encoder reported: {}", diagnostics);
        }

        let file_size = std::fs::metadata(&self.path)?.len();
        debug!("Encoder wrote {} frames ({} bytes) to {}", self.frames_written, file_size, self.path.display());

        Ok(EncodedVideo {
            path: self.path.clone(),
            frame_count: self.frames_written,
            file_size,
        })
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.wait();
        }
        if let Some(reader) = self.stderr.take() {
            let _ = reader.join();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_is_drained_while_stdin_is_written() {
        // Writes far more than a pipe buffer to stderr before reading stdin
        let mut child = Command::new("sh")
            .args(["-c", "head -c 262144 /dev/zero | tr '\\0' e >&2; echo last words >&2; cat > /dev/null"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let reader = drain_stderr(child.stderr.take().unwrap()).unwrap();

        let mut stdin = child.stdin.take().unwrap();
        stdin.write_all(&vec![7u8; 262144]).unwrap();
        drop(stdin);

        assert!(child.wait().unwrap().success());
        let tail = reader.join().unwrap();
        assert!(tail.ends_with("last words"));
        assert!(tail.len() <= STDERR_TAIL);
    }
}
