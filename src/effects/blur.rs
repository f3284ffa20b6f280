use image::imageops;

use crate::{
    effects::traits::FrameEffect,
    error::Result,
    jobs::params::BlurKind,
    video::types::Frame,
};

/// Kernel half-width ceiling; `kernel_size` never exceeds `2 * MAX_KERNEL_STEPS + 1`
pub const MAX_KERNEL_STEPS: u32 = 1000;

/// Odd kernel size for a blur intensity, never below 3
pub fn kernel_size(intensity: f32) -> u32 {
    let steps = if intensity.is_nan() {
        0
    } else {
        (intensity * 10.0).floor().clamp(0.0, MAX_KERNEL_STEPS as f32) as u32
    };
    steps.max(1) * 2 + 1
}

/// Gaussian sigma matching a kernel size the way OpenCV derives it
pub fn sigma_for_kernel(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

pub struct BlurEffect {
    kind: BlurKind,
    ksize: u32,
}

impl BlurEffect {
    pub fn new(kind: BlurKind, intensity: f32) -> Self {
        Self {
            kind,
            ksize: kernel_size(intensity),
        }
    }

    pub fn ksize(&self) -> u32 {
        self.ksize
    }

    fn gaussian(&self, frame: &Frame) -> Frame {
        Frame::new(imageops::blur(frame.as_image(), sigma_for_kernel(self.ksize)))
    }

    /// Horizontal box filter; edge pixels are replicated
    fn motion(&self, frame: &mut Frame) {
        let (width, height) = frame.dimensions();
        if width == 0 {
            return;
        }
        let radius = (self.ksize / 2) as i64;
        let last = width as i64 - 1;
        let mut row = vec![[0u8; 3]; width as usize];

        for y in 0..height {
            for x in 0..width {
                row[x as usize] = frame.get_pixel(x, y);
            }

            let mut sums = [0u64; 3];
            for dx in -radius..=radius {
                let px = row[dx.clamp(0, last) as usize];
                for c in 0..3 {
                    sums[c] += px[c] as u64;
                }
            }

            for x in 0..width as i64 {
                let out = frame.get_pixel_mut(x as u32, y);
                for c in 0..3 {
                    out[c] = ((sums[c] as f64) / self.ksize as f64).round() as u8;
                }

                let leaving = row[(x - radius).clamp(0, last) as usize];
                let entering = row[(x + radius + 1).clamp(0, last) as usize];
                for c in 0..3 {
                    sums[c] = sums[c] + entering[c] as u64 - leaving[c] as u64;
                }
            }
        }
    }

    /// Sharp centre fading into a fully blurred border
    fn radial(&self, frame: &mut Frame) {
        let blurred = self.gaussian(frame);
        let (width, height) = frame.dimensions();
        let cx = (width as f32 - 1.0) / 2.0;
        let cy = (height as f32 - 1.0) / 2.0;
        let max_dist = (cx * cx + cy * cy).sqrt().max(f32::EPSILON);

        for y in 0..height {
            for x in 0..width {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                let weight = ((dx * dx + dy * dy).sqrt() / max_dist).clamp(0.0, 1.0);

                let soft = blurred.get_pixel(x, y);
                let pixel = frame.get_pixel_mut(x, y);
                for c in 0..3 {
                    let value = pixel[c] as f32 * (1.0 - weight) + soft[c] as f32 * weight;
                    pixel[c] = value.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}

impl FrameEffect for BlurEffect {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn apply(&self, frame: &mut Frame) -> Result<()> {
        match self.kind {
            BlurKind::Gaussian => *frame = self.gaussian(frame),
            BlurKind::Motion => self.motion(frame),
            BlurKind::Radial => self.radial(frame),
        }
        Ok(())
    }
}
