// Whole-stream retiming: speed-up resampling and slow-down synthesis

use tracing::debug;

use crate::{
    effects::traits::BatchEffect,
    error::Result,
    jobs::params::{RetimeMode, SpeedParams},
    video::types::Frame,
};

/// Guards `floor(len / factor)` against values like 89.99999999
const COUNT_EPSILON: f64 = 1e-9;

/// Output frames owed for `len` source frames at `factor`
pub fn target_count(len: u64, factor: f64) -> u64 {
    ((len as f64 / factor) + COUNT_EPSILON).floor() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sampling {
    /// Copy the nearest source frame
    Nearest,
    /// Blend the two source frames around the position
    Blend,
}

/// Maps output slots onto a source position that runs across batches
///
/// Slot `i` samples source position `i * factor`. A slot is emitted once every
/// frame it reads has arrived and its share of the source is complete, so the
/// total never depends on where batches are cut. [`Retimer::finish`] settles
/// the slots owed past the last frame, for exactly `floor(total / factor)`.
pub struct Retimer {
    factor: f64,
    sampling: Sampling,
    /// Source frames fed so far
    consumed: u64,
    /// Output slots produced so far
    emitted: u64,
    /// Last few source frames of earlier batches
    tail: Vec<Frame>,
    /// Source index of `tail[0]`
    tail_base: u64,
}

impl Retimer {
    pub fn new(factor: f64, mode: RetimeMode) -> Self {
        let sampling = if factor > 1.0 || mode == RetimeMode::Duplicate {
            Sampling::Nearest
        } else {
            Sampling::Blend
        };
        Self {
            factor,
            sampling,
            consumed: 0,
            emitted: 0,
            tail: Vec::new(),
            tail_base: 0,
        }
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    fn position(&self, slot: u64) -> f64 {
        let position = slot as f64 * self.factor;
        let nearest = position.round();
        if (position - nearest).abs() < COUNT_EPSILON {
            nearest
        } else {
            position
        }
    }

    /// Highest source index a slot at `position` reads
    fn reach(&self, position: f64) -> u64 {
        match self.sampling {
            Sampling::Nearest => position.round() as u64,
            Sampling::Blend => position.ceil() as u64,
        }
    }

    fn ready(&self, slot: u64) -> bool {
        let position = self.position(slot);
        let span_end = (slot + 1) as f64 * self.factor;
        self.reach(position) < self.consumed && span_end <= self.consumed as f64 + COUNT_EPSILON
    }

    /// Feed the next source batch and take every slot it completes
    pub fn feed(&mut self, frames: Vec<Frame>) -> Vec<Frame> {
        if frames.is_empty() {
            return Vec::new();
        }
        let base = self.consumed;
        self.consumed += frames.len() as u64;

        let mut out = Vec::new();
        while self.ready(self.emitted) {
            out.push(self.sample(self.position(self.emitted), base, &frames));
            self.emitted += 1;
        }

        // Pending slots look back at most ceil(factor) + 1 frames
        let keep = self.factor.ceil() as usize + 1;
        let mut tail = std::mem::take(&mut self.tail);
        tail.extend(frames);
        let excess = tail.len().saturating_sub(keep);
        tail.drain(..excess);
        self.tail_base = self.consumed - tail.len() as u64;
        self.tail = tail;

        out
    }

    /// Settle the slots left at end of stream by repeating the last frame
    pub fn finish(&mut self) -> Vec<Frame> {
        let Some(last) = self.tail.last().cloned() else {
            return Vec::new();
        };
        let owed = target_count(self.consumed, self.factor).saturating_sub(self.emitted);
        self.emitted += owed;
        self.tail.clear();
        (0..owed).map(|_| last.clone()).collect()
    }

    fn sample(&self, position: f64, base: u64, frames: &[Frame]) -> Frame {
        match self.sampling {
            Sampling::Nearest => self.source(position.round() as u64, base, frames).clone(),
            Sampling::Blend => {
                let lo = self.source(position.floor() as u64, base, frames);
                let t = position.fract() as f32;
                if t == 0.0 {
                    lo.clone()
                } else {
                    Frame::blend(lo, self.source(position.ceil() as u64, base, frames), t)
                }
            }
        }
    }

    fn source<'a>(&'a self, index: u64, base: u64, frames: &'a [Frame]) -> &'a Frame {
        match index.checked_sub(base) {
            Some(offset) => &frames[(offset as usize).min(frames.len() - 1)],
            None => {
                let offset = index.saturating_sub(self.tail_base) as usize;
                self.tail.get(offset).unwrap_or(&frames[0])
            }
        }
    }
}

/// Speed change and reversal over the whole stream
///
/// Integer speed-up is handled upstream by window decimation; this effect only
/// sees the residual factor left after the stride. Frames leave in forward
/// order; reversal is done by the batch processor.
pub struct RetimeEffect {
    params: SpeedParams,
    retimer: Option<Retimer>,
}

impl RetimeEffect {
    pub fn new(params: SpeedParams) -> Self {
        let residual = params.residual_factor();
        let retimer = ((residual - 1.0).abs() >= f64::EPSILON).then(|| Retimer::new(residual, params.mode));
        Self { params, retimer }
    }
}

impl BatchEffect for RetimeEffect {
    fn name(&self) -> &str {
        if self.params.is_reverse() {
            "reverse"
        } else {
            "speed"
        }
    }

    fn apply_batch(&mut self, frames: Vec<Frame>) -> Result<Vec<Frame>> {
        let Some(retimer) = self.retimer.as_mut() else {
            return Ok(frames);
        };
        let input_len = frames.len();
        let retimed = retimer.feed(frames);
        debug!(
            "Retimed batch of {} frames to {} ({} slots from {} source frames so far)",
            input_len,
            retimed.len(),
            retimer.emitted(),
            retimer.consumed()
        );
        Ok(retimed)
    }

    fn finish(&mut self) -> Result<Vec<Frame>> {
        Ok(self.retimer.as_mut().map(Retimer::finish).unwrap_or_default())
    }

    fn reverses_clip(&self) -> bool {
        self.params.is_reverse()
    }
}
