//! # Effect Pipeline
//!
//! Named frame transforms applied after crop/resize. An action resolves to one
//! [`EffectStage`]: a per-frame effect, a whole-batch effect, or pass-through.
//!
//! ## Built-in Effects
//!
//! - **brighten / darken**: Constant gain with optional gamma and hue-preserving mode
//! - **sepia / cool / warm**: Color grades scaled by intensity
//! - **grayscale / negative**: Luminance and bitwise inversion
//! - **gaussian_blur / motion_blur / radial_blur**: Kernel size from intensity
//! - **text**: Outlined bitmap text overlay
//! - **speed**: Batch retiming and clip reversal
//!
//! ## Usage
//!
//! ```rust,no_run
//! use clipshop::effects::EffectRegistry;
//! use clipshop::jobs::params::Action;
//!
//! let registry = EffectRegistry::new();
//! let stage = registry.resolve(&Action::Grayscale);
//! assert_eq!(stage.name(), "grayscale");
//! ```

pub mod blur;
pub mod color;
pub mod font;
pub mod registry;
pub mod text;
pub mod timing;
pub mod traits;

pub use blur::BlurEffect;
pub use color::{BrightnessEffect, ColorGradeEffect, GrayscaleEffect, NegativeEffect};
pub use registry::EffectRegistry;
pub use text::TextOverlayEffect;
pub use timing::RetimeEffect;
pub use traits::{BatchEffect, EffectStage, FrameEffect};
