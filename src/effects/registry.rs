use std::collections::HashMap;

use tracing::warn;

use crate::effects::{
    BatchEffect, BlurEffect, BrightnessEffect, ColorGradeEffect, EffectStage, FrameEffect, GrayscaleEffect,
    NegativeEffect, RetimeEffect, TextOverlayEffect,
};
use crate::jobs::params::{Action, BlurKind, ColorGrade};

type EffectFactory = Box<dyn Fn(&Action) -> Option<EffectStage> + Send + Sync>;

fn per_frame<E: FrameEffect + 'static>(effect: E) -> Option<EffectStage> {
    Some(EffectStage::PerFrame(Box::new(effect)))
}

fn batch<E: BatchEffect + 'static>(effect: E) -> Option<EffectStage> {
    Some(EffectStage::Batch(Box::new(effect)))
}

/// Registry mapping action names to effect stages
///
/// Each factory receives the job's [`Action`] so it can read its parameters.
/// Anything the registry cannot resolve becomes a pass-through stage.
pub struct EffectRegistry {
    effects: HashMap<String, EffectFactory>,
}

impl EffectRegistry {
    /// Create a new registry with all built-in effects
    pub fn new() -> Self {
        let mut registry = Self {
            effects: HashMap::new(),
        };

        registry.register_builtin_effects();
        registry
    }

    fn register_builtin_effects(&mut self) {
        for name in ["brighten", "darken"] {
            self.register(name, |action| match action {
                Action::Brightness(params) => per_frame(BrightnessEffect::new(*params)),
                _ => None,
            });
        }

        for grade in [ColorGrade::Sepia, ColorGrade::Cool, ColorGrade::Warm] {
            self.register(grade.name(), |action| match action {
                Action::ColorGrade { grade, intensity } => per_frame(ColorGradeEffect::new(*grade, *intensity)),
                _ => None,
            });
        }

        self.register("grayscale", |_| per_frame(GrayscaleEffect));
        self.register("negative", |_| per_frame(NegativeEffect));

        for kind in [BlurKind::Gaussian, BlurKind::Motion, BlurKind::Radial] {
            self.register(kind.name(), |action| match action {
                Action::Blur { kind, intensity } => per_frame(BlurEffect::new(*kind, *intensity)),
                _ => None,
            });
        }

        self.register("text", |action| match action {
            Action::Text(overlay) => per_frame(TextOverlayEffect::new(overlay.clone())),
            _ => None,
        });

        self.register("speed", |action| match action {
            Action::Speed(params) => batch(RetimeEffect::new(*params)),
            _ => None,
        });
    }

    /// Register a custom effect
    ///
    /// # Arguments
    ///
    /// * `name` - Action name the effect answers to, replacing any existing entry
    /// * `factory` - Builds the stage for a job; returning `None` means pass-through
    pub fn register<N, F>(&mut self, name: N, factory: F)
    where
        N: Into<String>,
        F: Fn(&Action) -> Option<EffectStage> + Send + Sync + 'static,
    {
        self.effects.insert(name.into(), Box::new(factory));
    }

    /// Build the stage for an action
    ///
    /// Trim, crop and resize need no effect. Unknown names pass frames through
    /// unmodified rather than failing the job.
    pub fn resolve(&self, action: &Action) -> EffectStage {
        if action.is_geometry_only() {
            return EffectStage::PassThrough;
        }

        match self.effects.get(action.name()).and_then(|factory| factory(action)) {
            Some(stage) => stage,
            None => {
                warn!("No effect registered for action '{}', passing frames through", action.name());
                EffectStage::PassThrough
            }
        }
    }

    pub fn available_effects(&self) -> Vec<String> {
        self.effects.keys().cloned().collect()
    }

    pub fn has_effect(&self, name: &str) -> bool {
        self.effects.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::new()
    }
}
