// Per-pixel color transforms: brightness/gamma, color grades, grayscale, negative

use crate::{
    effects::traits::FrameEffect,
    error::Result,
    jobs::params::{BrightnessParams, ColorGrade},
    video::types::Frame,
};

const SEPIA: [[f32; 3]; 3] = [
    [0.393, 0.769, 0.189],
    [0.349, 0.686, 0.168],
    [0.272, 0.534, 0.131],
];

fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Brighten or darken by a constant factor with optional gamma correction
pub struct BrightnessEffect {
    params: BrightnessParams,
    /// Precomputed value mapping; brightness is a pure per-channel function
    lut: [u8; 256],
}

impl BrightnessEffect {
    pub fn new(params: BrightnessParams) -> Self {
        let factor = params.effective_factor();
        let mut lut = [0u8; 256];
        for (value, slot) in lut.iter_mut().enumerate() {
            let scaled = (value as f32 * factor).clamp(0.0, 255.0);
            let corrected = match params.gamma {
                Some(gamma) => (scaled / 255.0).powf(gamma) * 255.0,
                None => scaled,
            };
            *slot = clamp_u8(corrected);
        }
        Self { params, lut }
    }

    fn map(&self, value: u8) -> u8 {
        self.lut[value as usize]
    }
}

impl FrameEffect for BrightnessEffect {
    fn name(&self) -> &str {
        if self.params.darken {
            "darken"
        } else {
            "brighten"
        }
    }

    fn apply(&self, frame: &mut Frame) -> Result<()> {
        if self.params.preserve_colors {
            for pixel in frame.as_image_mut().pixels_mut() {
                let (h, s, v) = rgb_to_hsv(pixel.0);
                let v = self.map(clamp_u8(v * 255.0)) as f32 / 255.0;
                pixel.0 = hsv_to_rgb(h, s, v);
            }
        } else {
            for channel in frame.as_image_mut().iter_mut() {
                *channel = self.map(*channel);
            }
        }
        Ok(())
    }
}

/// Sepia matrix or cool/warm channel scaling, blended by intensity
pub struct ColorGradeEffect {
    grade: ColorGrade,
    intensity: f32,
}

impl ColorGradeEffect {
    pub fn new(grade: ColorGrade, intensity: f32) -> Self {
        Self { grade, intensity }
    }

    fn grade_pixel(&self, [r, g, b]: [u8; 3]) -> [u8; 3] {
        let (r, g, b) = (r as f32, g as f32, b as f32);
        let i = self.intensity;
        match self.grade {
            ColorGrade::Sepia => {
                let source = [r, g, b];
                let mut out = [0u8; 3];
                for (channel, row) in SEPIA.iter().enumerate() {
                    let toned = row[0] * r + row[1] * g + row[2] * b;
                    out[channel] = clamp_u8(source[channel] + (toned - source[channel]) * i.min(1.0));
                }
                out
            }
            ColorGrade::Cool => [clamp_u8(r * (1.0 - 0.3 * i)), clamp_u8(g), clamp_u8(b * (1.0 + 0.3 * i))],
            ColorGrade::Warm => [clamp_u8(r * (1.0 + 0.3 * i)), clamp_u8(g), clamp_u8(b * (1.0 - 0.3 * i))],
        }
    }
}

impl FrameEffect for ColorGradeEffect {
    fn name(&self) -> &str {
        self.grade.name()
    }

    fn apply(&self, frame: &mut Frame) -> Result<()> {
        for pixel in frame.as_image_mut().pixels_mut() {
            pixel.0 = self.grade_pixel(pixel.0);
        }
        Ok(())
    }
}

/// Luminance replicated into all three channels
pub struct GrayscaleEffect;

impl FrameEffect for GrayscaleEffect {
    fn name(&self) -> &str {
        "grayscale"
    }

    fn apply(&self, frame: &mut Frame) -> Result<()> {
        for pixel in frame.as_image_mut().pixels_mut() {
            let [r, g, b] = pixel.0;
            let luma = clamp_u8(0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32);
            pixel.0 = [luma; 3];
        }
        Ok(())
    }
}

pub struct NegativeEffect;

impl FrameEffect for NegativeEffect {
    fn name(&self) -> &str {
        "negative"
    }

    fn apply(&self, frame: &mut Frame) -> Result<()> {
        for channel in frame.as_image_mut().iter_mut() {
            *channel = !*channel;
        }
        Ok(())
    }
}

/// RGB bytes to (hue degrees, saturation 0-1, value 0-1)
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> (f32, f32, f32) {
    let (r, g, b) = (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let s = if max == 0.0 { 0.0 } else { delta / max };

    (h, s, max)
}

pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    [clamp_u8((r + m) * 255.0), clamp_u8((g + m) * 255.0), clamp_u8((b + m) * 255.0)]
}
