use crate::{error::Result, video::types::Frame};

/// A transform applied to each frame independently
pub trait FrameEffect: Send + Sync {
    /// Returns the registry name of this effect
    fn name(&self) -> &str;

    /// Apply the effect to a frame in-place
    ///
    /// # Arguments
    ///
    /// * `frame` - The frame to modify, already cropped and resized
    fn apply(&self, frame: &mut Frame) -> Result<()>;
}

/// A transform whose output for one frame depends on its neighbours
pub trait BatchEffect: Send + Sync {
    fn name(&self) -> &str;

    /// Transform the next ordered batch of the stream
    ///
    /// The result may be longer or shorter. Effects may carry state from one
    /// batch to the next.
    fn apply_batch(&mut self, frames: Vec<Frame>) -> Result<Vec<Frame>>;

    /// Frames still owed once the stream has ended
    fn finish(&mut self) -> Result<Vec<Frame>> {
        Ok(Vec::new())
    }

    /// Whether the whole clip must be emitted back-to-front
    ///
    /// When true, the batch processor spools processed frames to disk and
    /// replays them last-first at end of stream.
    fn reverses_clip(&self) -> bool {
        false
    }
}

/// What the batch processor does with each buffered batch
pub enum EffectStage {
    PassThrough,
    PerFrame(Box<dyn FrameEffect>),
    Batch(Box<dyn BatchEffect>),
}

impl EffectStage {
    pub fn name(&self) -> &str {
        match self {
            EffectStage::PassThrough => "passthrough",
            EffectStage::PerFrame(effect) => effect.name(),
            EffectStage::Batch(effect) => effect.name(),
        }
    }

    pub fn is_pass_through(&self) -> bool {
        matches!(self, EffectStage::PassThrough)
    }

    pub fn reverses_clip(&self) -> bool {
        match self {
            EffectStage::Batch(effect) => effect.reverses_clip(),
            _ => false,
        }
    }
}

impl std::fmt::Debug for EffectStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EffectStage::PassThrough => f.write_str("PassThrough"),
            EffectStage::PerFrame(effect) => write!(f, "PerFrame({})", effect.name()),
            EffectStage::Batch(effect) => write!(f, "Batch({})", effect.name()),
        }
    }
}
