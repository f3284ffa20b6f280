use image::imageops::{self, FilterType};

use crate::{
    error::{Result, ValidationError},
    jobs::params::{CropRect, OutputSize},
    video::types::Frame,
};

/// Concrete crop rectangle inside the source frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Per-job crop and resize, validated against the source dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryPlan {
    pub source: (u32, u32),
    pub crop: CropBox,
    pub output: (u32, u32),
}

impl GeometryPlan {
    /// Fill crop and output defaults and check the crop lies inside the source
    pub fn resolve(crop: &CropRect, output: &OutputSize, source_width: u32, source_height: u32) -> Result<Self> {
        let x = crop.x.unwrap_or(0);
        let y = crop.y.unwrap_or(0);
        let width = crop.width.unwrap_or(source_width.saturating_sub(x));
        let height = crop.height.unwrap_or(source_height.saturating_sub(y));

        let out_of_bounds = x as u64 + width as u64 > source_width as u64
            || y as u64 + height as u64 > source_height as u64;
        if width == 0 || height == 0 || out_of_bounds {
            return Err(ValidationError::InvalidGeometry {
                x,
                y,
                width,
                height,
                source_width,
                source_height,
            }
            .into());
        }

        let output = (output.width.unwrap_or(width), output.height.unwrap_or(height));
        if output.0 == 0 || output.1 == 0 {
            return Err(ValidationError::NonPositiveDimensions {
                field: "output".to_string(),
            }
            .into());
        }

        Ok(Self {
            source: (source_width, source_height),
            crop: CropBox { x, y, width, height },
            output,
        })
    }

    pub fn crops(&self) -> bool {
        (self.crop.width, self.crop.height) != self.source
    }

    pub fn resizes(&self) -> bool {
        (self.crop.width, self.crop.height) != self.output
    }

    pub fn is_identity(&self) -> bool {
        !self.crops() && !self.resizes()
    }

    /// Crop then resize one frame
    ///
    /// Identity steps hand the frame back untouched.
    pub fn apply(&self, frame: Frame) -> Frame {
        let frame = if self.crops() {
            let CropBox { x, y, width, height } = self.crop;
            Frame::new(imageops::crop_imm(frame.as_image(), x, y, width, height).to_image())
        } else {
            frame
        };

        if self.resizes() {
            let (width, height) = self.output;
            Frame::new(imageops::resize(frame.as_image(), width, height, FilterType::Triangle))
        } else {
            frame
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    fn crop(x: Option<u32>, y: Option<u32>, width: Option<u32>, height: Option<u32>) -> CropRect {
        CropRect { x, y, width, height }
    }

    fn size(width: Option<u32>, height: Option<u32>) -> OutputSize {
        OutputSize { width, height }
    }

    #[test]
    fn test_defaults_cover_full_frame() {
        let plan = GeometryPlan::resolve(&CropRect::default(), &OutputSize::default(), 640, 360).unwrap();
        assert_eq!(plan.crop, CropBox { x: 0, y: 0, width: 640, height: 360 });
        assert_eq!(plan.output, (640, 360));
        assert!(plan.is_identity());
    }

    #[test]
    fn test_crop_width_defaults_to_remainder() {
        let plan = GeometryPlan::resolve(&crop(Some(100), Some(60), None, None), &OutputSize::default(), 640, 360)
            .unwrap();
        assert_eq!(plan.crop, CropBox { x: 100, y: 60, width: 540, height: 300 });
        // Output falls back to the crop size
        assert_eq!(plan.output, (540, 300));
    }

    #[test]
    fn test_crop_outside_bounds_rejected() {
        for rect in [
            crop(Some(600), None, Some(100), None),
            crop(None, Some(300), None, Some(61)),
            crop(Some(640), None, None, None),
            crop(Some(u32::MAX), None, Some(2), None),
        ] {
            let err = GeometryPlan::resolve(&rect, &OutputSize::default(), 640, 360).unwrap_err();
            assert!(matches!(err, EngineError::Validation(ValidationError::InvalidGeometry { .. })));
        }
    }

    #[test]
    fn test_output_dimensions_exact_for_any_valid_crop() {
        let source = Frame::new_filled(64, 48, [9, 8, 7]);
        for (x, y, w, h) in [(0, 0, 64, 48), (10, 5, 20, 30), (63, 47, 1, 1), (0, 24, 64, 24)] {
            for (out_w, out_h) in [(32, 32), (100, 7), (1, 1), (w, h)] {
                let plan =
                    GeometryPlan::resolve(&crop(Some(x), Some(y), Some(w), Some(h)), &size(Some(out_w), Some(out_h)), 64, 48)
                        .unwrap();
                assert_eq!(plan.apply(source.clone()).dimensions(), (out_w, out_h));
            }
        }
    }

    #[test]
    fn test_crop_extracts_the_rectangle() {
        let mut source = Frame::new_black(10, 10);
        source.set_pixel(4, 3, [200, 100, 50]);
        let plan = GeometryPlan::resolve(&crop(Some(4), Some(3), Some(2), Some(2)), &OutputSize::default(), 10, 10)
            .unwrap();
        assert!(plan.crops() && !plan.resizes());

        let out = plan.apply(source);
        assert_eq!(out.dimensions(), (2, 2));
        assert_eq!(out.get_pixel(0, 0), [200, 100, 50]);
        assert_eq!(out.get_pixel(1, 1), [0, 0, 0]);
    }

    #[test]
    fn test_identity_returns_same_frame() {
        let source = Frame::new_filled(8, 8, [1, 2, 3]);
        let plan = GeometryPlan::resolve(&CropRect::default(), &OutputSize::default(), 8, 8).unwrap();
        assert_eq!(plan.apply(source.clone()), source);
    }

    #[test]
    fn test_single_side_output_override() {
        let plan = GeometryPlan::resolve(&CropRect::default(), &size(Some(320), None), 640, 360).unwrap();
        assert_eq!(plan.output, (320, 360));
    }
}
