use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::debug;

use crate::{
    effects::{EffectStage, FrameEffect},
    error::Result,
    pipeline::spool::FrameSpool,
    video::{sink::OutputSink, types::Frame},
};

/// Counters reported once the stream is drained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchStats {
    pub frames_in: u64,
    pub frames_out: u64,
    pub batches: u64,
}

/// Buffers geometry output and runs the effect stage one batch at a time
///
/// Batches reach the sink in arrival order. For clip-reversing stages the
/// processed frames go to a [`FrameSpool`] on disk instead, and
/// [`BatchProcessor::finish`] replays it last-first. At most one batch is ever
/// held in memory.
pub struct BatchProcessor {
    stage: EffectStage,
    capacity: usize,
    pool: Option<Arc<ThreadPool>>,
    spool_dir: PathBuf,
    buffer: Vec<Frame>,
    spool: Option<FrameSpool>,
    stats: BatchStats,
}

impl BatchProcessor {
    pub fn new(stage: EffectStage, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            stage,
            capacity,
            pool: None,
            spool_dir: std::env::temp_dir(),
            buffer: Vec::with_capacity(capacity),
            spool: None,
            stats: BatchStats::default(),
        }
    }

    /// Fan per-frame effects out over `pool`; output order is unchanged
    pub fn with_pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Directory for the reverse spool; created on first use
    pub fn with_spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = dir.into();
        self
    }

    pub fn stage(&self) -> &EffectStage {
        &self.stage
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Frames parked on disk for reversal
    pub fn spooled(&self) -> u64 {
        self.spool.as_ref().map_or(0, FrameSpool::len)
    }

    /// Queue a frame, dispatching the batch once it is full
    pub fn push(&mut self, frame: Frame, sink: &mut dyn OutputSink) -> Result<()> {
        self.buffer.push(frame);
        self.stats.frames_in += 1;
        if self.buffer.len() >= self.capacity {
            self.flush(sink)?;
        }
        Ok(())
    }

    /// Dispatch the partial batch, collect the stage's owed frames and
    /// replay any spooled frames
    pub fn finish(mut self, sink: &mut dyn OutputSink) -> Result<BatchStats> {
        self.flush(sink)?;

        if let EffectStage::Batch(effect) = &mut self.stage {
            let owed = effect.finish()?;
            if !owed.is_empty() {
                debug!("'{}' settled {} owed frames at end of stream", effect.name(), owed.len());
                self.emit(owed, sink)?;
            }
        }

        if let Some(spool) = self.spool.take() {
            debug!("Replaying {} spooled frames last-first", spool.len());
            self.stats.frames_out += spool.drain_reversed(sink)?;
        }

        Ok(self.stats)
    }

    fn flush(&mut self, sink: &mut dyn OutputSink) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.capacity));
        let batch_len = batch.len();
        let processed = self.process(batch)?;
        self.stats.batches += 1;

        debug!(
            "Batch {} through '{}': {} frames in, {} out",
            self.stats.batches,
            self.stage.name(),
            batch_len,
            processed.len()
        );

        self.emit(processed, sink)
    }

    /// Write processed frames, or park them when the clip plays backwards
    fn emit(&mut self, frames: Vec<Frame>, sink: &mut dyn OutputSink) -> Result<()> {
        if !self.stage.reverses_clip() {
            return self.write_all(frames, sink);
        }
        let spool = match self.spool.take() {
            Some(spool) => spool,
            None => FrameSpool::new_in(&self.spool_dir)?,
        };
        let spool = self.spool.insert(spool);
        for frame in &frames {
            spool.push(frame)?;
        }
        Ok(())
    }

    fn process(&mut self, mut frames: Vec<Frame>) -> Result<Vec<Frame>> {
        match &mut self.stage {
            EffectStage::PassThrough => Ok(frames),
            EffectStage::PerFrame(effect) => {
                let effect: &dyn FrameEffect = effect.as_ref();
                match &self.pool {
                    Some(pool) => pool.install(|| apply_parallel(effect, &mut frames))?,
                    None => frames.iter_mut().try_for_each(|frame| effect.apply(frame))?,
                }
                Ok(frames)
            }
            EffectStage::Batch(effect) => effect.apply_batch(frames),
        }
    }

    fn write_all(&mut self, frames: Vec<Frame>, sink: &mut dyn OutputSink) -> Result<()> {
        for frame in &frames {
            sink.write_frame(frame)?;
            self.stats.frames_out += 1;
        }
        Ok(())
    }
}

fn apply_parallel(effect: &dyn FrameEffect, frames: &mut [Frame]) -> Result<()> {
    frames.par_iter_mut().try_for_each(|frame| effect.apply(frame))
}
