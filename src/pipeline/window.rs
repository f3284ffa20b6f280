use crate::{
    error::{Result, ValidationError},
    jobs::params::TimeWindow,
    video::{source::VideoSource, types::Frame},
};

/// Half-open frame-index range `[start_frame, end_frame)` selected by a time window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameWindow {
    pub start_frame: u64,
    pub end_frame: u64,
    /// Emit only every `stride`-th frame counted from `start_frame`
    pub stride: u64,
}

impl FrameWindow {
    /// Convert seconds to frame indices and check the range is non-empty
    pub fn resolve(window: &TimeWindow, fps: f64, frame_count: u64, stride: u64) -> Result<Self> {
        let to_frame = |seconds: f64| (seconds * fps).floor().max(0.0) as u64;

        let start_frame = to_frame(window.start);
        let end_frame = match window.end {
            Some(end) if end > 0.0 => to_frame(end).min(frame_count),
            _ => frame_count,
        };

        if start_frame >= end_frame {
            return Err(ValidationError::InvalidRange { start_frame, end_frame }.into());
        }

        Ok(Self {
            start_frame,
            end_frame,
            stride: stride.max(1),
        })
    }

    /// Frames inside the window before decimation
    pub fn len(&self) -> u64 {
        self.end_frame - self.start_frame
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, index: u64) -> bool {
        index >= self.start_frame && index < self.end_frame
    }

    /// Inside the window and on the decimation grid
    pub fn selects(&self, index: u64) -> bool {
        self.contains(index) && (index - self.start_frame) % self.stride == 0
    }

    /// Frames the window will emit
    pub fn selected_count(&self) -> u64 {
        self.len().div_ceil(self.stride)
    }

    /// Percentage of the window consumed once `index` has been read
    pub fn progress(&self, index: u64) -> u8 {
        let consumed = index.saturating_sub(self.start_frame);
        (consumed.saturating_mul(100) / self.len()).min(100) as u8
    }

    /// Stream the window out of `source`
    pub fn frames<'a>(&self, source: &'a mut dyn VideoSource) -> WindowedFrames<'a> {
        WindowedFrames {
            source,
            window: *self,
            next_index: 0,
            done: false,
        }
    }
}

/// One decoded frame position
///
/// `frame` is `None` for positions outside the window or off the stride grid:
/// they are decoded and counted but never processed.
#[derive(Debug)]
pub struct WindowItem {
    pub index: u64,
    pub frame: Option<Frame>,
}

/// Lazy, single-pass iterator over a source restricted to a [`FrameWindow`]
///
/// Stops at the window end without decoding further, at end of stream, or
/// after the first decode error.
pub struct WindowedFrames<'a> {
    source: &'a mut dyn VideoSource,
    window: FrameWindow,
    next_index: u64,
    done: bool,
}

impl Iterator for WindowedFrames<'_> {
    type Item = Result<WindowItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next_index >= self.window.end_frame {
            return None;
        }

        match self.source.read_frame() {
            Ok(Some(frame)) => {
                let index = self.next_index;
                self.next_index += 1;
                let frame = self.window.selects(index).then_some(frame);
                Some(Ok(WindowItem { index, frame }))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
