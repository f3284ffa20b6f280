use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::video::types::OutputFormat;

/// Loose transform request, one field per form input
///
/// Everything is optional; [`TransformParams::from_request`] applies the
/// defaults and validates the combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformRequest {
    pub action: String,
    pub start_time: f64,
    /// 0 means "until the end of the clip"
    pub end_time: f64,

    pub crop_x: Option<u32>,
    pub crop_y: Option<u32>,
    pub crop_width: Option<u32>,
    pub crop_height: Option<u32>,
    pub output_width: Option<u32>,
    pub output_height: Option<u32>,
    pub output_format: String,

    pub brightness_factor: f32,
    pub gamma: Option<f32>,
    pub preserve_colors: bool,

    pub speed_factor: f64,
    /// "interpolate" (default) or "duplicate"
    pub speed_mode: Option<String>,

    pub intensity: f32,
    pub blur_intensity: f32,

    pub text: Option<String>,
    /// "center", "top" or "bottom"; ignored when explicit coordinates are given
    pub text_position: Option<String>,
    pub text_x: Option<i32>,
    pub text_y: Option<i32>,
    pub text_scale: f32,
    pub text_color: Option<[u8; 3]>,
    pub text_thickness: u32,
}

impl Default for TransformRequest {
    fn default() -> Self {
        Self {
            action: "trim".to_string(),
            start_time: 0.0,
            end_time: 0.0,
            crop_x: None,
            crop_y: None,
            crop_width: None,
            crop_height: None,
            output_width: None,
            output_height: None,
            output_format: "mp4".to_string(),
            brightness_factor: 1.0,
            gamma: None,
            preserve_colors: false,
            speed_factor: 1.0,
            speed_mode: None,
            intensity: 1.0,
            blur_intensity: 0.5,
            text: None,
            text_position: None,
            text_x: None,
            text_y: None,
            text_scale: 1.0,
            text_color: None,
            text_thickness: 1,
        }
    }
}

/// Validated, immutable transform description owned by a job
#[derive(Debug, Clone, PartialEq)]
pub struct TransformParams {
    pub action: Action,
    pub window: TimeWindow,
    pub crop: CropRect,
    pub output_size: OutputSize,
    pub format: OutputFormat,
}

/// Requested time span in seconds
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimeWindow {
    pub start: f64,
    /// `None` runs to the end of the source
    pub end: Option<f64>,
}

/// Crop rectangle; unset fields fall back to the full frame
///
/// x and y default to 0; width and height default to the remainder of the
/// source past the offset.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CropRect {
    pub x: Option<u32>,
    pub y: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Output dimensions; each unset side takes the crop's size
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OutputSize {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// The transform applied to the frames inside the window
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Window only
    Trim,
    /// Geometry only
    Crop,
    /// Geometry only
    Resize,
    Brightness(BrightnessParams),
    ColorGrade { grade: ColorGrade, intensity: f32 },
    Grayscale,
    Negative,
    Blur { kind: BlurKind, intensity: f32 },
    Text(TextOverlay),
    Speed(SpeedParams),
    /// Any other name; resolved against the effect registry, pass-through if absent
    Other(String),
}

impl Action {
    /// Registry key for this action
    pub fn name(&self) -> &str {
        match self {
            Action::Trim => "trim",
            Action::Crop => "crop",
            Action::Resize => "resize",
            Action::Brightness(p) if p.darken => "darken",
            Action::Brightness(_) => "brighten",
            Action::ColorGrade { grade, .. } => grade.name(),
            Action::Grayscale => "grayscale",
            Action::Negative => "negative",
            Action::Blur { kind, .. } => kind.name(),
            Action::Text(_) => "text",
            Action::Speed(_) => "speed",
            Action::Other(name) => name,
        }
    }

    /// Trim/crop/resize do all their work in the window and geometry stages
    pub fn is_geometry_only(&self) -> bool {
        matches!(self, Action::Trim | Action::Crop | Action::Resize)
    }

    pub fn speed(&self) -> Option<&SpeedParams> {
        match self {
            Action::Speed(speed) => Some(speed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrightnessParams {
    pub factor: f32,
    pub gamma: Option<f32>,
    /// Scale only the HSV value channel
    pub preserve_colors: bool,
    /// Divide by the factor instead of multiplying
    pub darken: bool,
}

impl BrightnessParams {
    /// Multiplier actually applied to pixel values
    pub fn effective_factor(&self) -> f32 {
        if self.darken {
            1.0 / self.factor
        } else {
            self.factor
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorGrade {
    Sepia,
    Cool,
    Warm,
}

impl ColorGrade {
    pub fn name(&self) -> &'static str {
        match self {
            ColorGrade::Sepia => "sepia",
            ColorGrade::Cool => "cool",
            ColorGrade::Warm => "warm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlurKind {
    Gaussian,
    Motion,
    Radial,
}

impl BlurKind {
    pub fn name(&self) -> &'static str {
        match self {
            BlurKind::Gaussian => "gaussian_blur",
            BlurKind::Motion => "motion_blur",
            BlurKind::Radial => "radial_blur",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextOverlay {
    pub text: String,
    pub position: TextPosition,
    pub scale: f32,
    pub color: [u8; 3],
    pub thickness: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextPosition {
    Center,
    Top,
    Bottom,
    /// Top-left corner of the text block
    At { x: i32, y: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedParams {
    /// Playback speed; negative plays backwards
    pub factor: f64,
    pub mode: RetimeMode,
}

impl SpeedParams {
    pub fn magnitude(&self) -> f64 {
        self.factor.abs()
    }

    pub fn is_reverse(&self) -> bool {
        self.factor < 0.0
    }

    /// Integer stride applied while reading the window
    pub fn decimation_stride(&self) -> u64 {
        let magnitude = self.magnitude();
        if magnitude > 1.0 {
            (magnitude.floor() as u64).max(1)
        } else {
            1
        }
    }

    /// Factor left for the per-batch resampling pass once the stride is applied
    pub fn residual_factor(&self) -> f64 {
        self.magnitude() / self.decimation_stride() as f64
    }
}

/// How slowed-down frames are synthesized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetimeMode {
    #[default]
    Interpolate,
    Duplicate,
}

/// Largest accepted `blur_intensity` (a 201-pixel kernel)
pub const MAX_BLUR_INTENSITY: f32 = 10.0;
pub const MAX_TEXT_SCALE: f32 = 20.0;
pub const MAX_TEXT_THICKNESS: u32 = 50;

fn invalid<V: ToString>(name: &str, value: V) -> ValidationError {
    ValidationError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn positive_dimension(name: &str, value: Option<u32>) -> Result<Option<u32>> {
    match value {
        Some(0) => Err(ValidationError::NonPositiveDimensions { field: name.to_string() }.into()),
        other => Ok(other),
    }
}

fn non_negative(name: &str, value: f32) -> Result<f32> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(name, value).into());
    }
    Ok(value)
}

fn at_most(name: &str, value: f32, max: f32) -> Result<f32> {
    if value > max {
        return Err(invalid(name, value).into());
    }
    Ok(value)
}

impl TransformParams {
    /// Validate a request and build the typed parameters
    pub fn from_request(request: &TransformRequest) -> Result<Self> {
        let format: OutputFormat = request.output_format.parse()?;

        if !request.start_time.is_finite() {
            return Err(invalid("start_time", request.start_time).into());
        }
        if !request.end_time.is_finite() || request.end_time < 0.0 {
            return Err(invalid("end_time", request.end_time).into());
        }
        let window = TimeWindow {
            start: request.start_time.max(0.0),
            end: (request.end_time > 0.0).then_some(request.end_time),
        };

        let crop = CropRect {
            x: request.crop_x,
            y: request.crop_y,
            width: positive_dimension("crop_width", request.crop_width)?,
            height: positive_dimension("crop_height", request.crop_height)?,
        };
        let output_size = OutputSize {
            width: positive_dimension("output_width", request.output_width)?,
            height: positive_dimension("output_height", request.output_height)?,
        };

        let action = Self::parse_action(request)?;

        Ok(Self {
            action,
            window,
            crop,
            output_size,
            format,
        })
    }

    fn parse_action(request: &TransformRequest) -> Result<Action> {
        let name = request.action.trim().to_ascii_lowercase();

        let action = match name.as_str() {
            "" | "trim" => Action::Trim,
            "crop" => Action::Crop,
            "resize" => Action::Resize,
            "brighten" | "darken" => {
                let factor = request.brightness_factor;
                if !factor.is_finite() || factor <= 0.0 {
                    return Err(invalid("brightness_factor", factor).into());
                }
                if let Some(gamma) = request.gamma {
                    if !gamma.is_finite() || gamma <= 0.0 {
                        return Err(invalid("gamma", gamma).into());
                    }
                }
                Action::Brightness(BrightnessParams {
                    factor,
                    gamma: request.gamma,
                    preserve_colors: request.preserve_colors,
                    darken: name == "darken",
                })
            }
            "sepia" | "cool" | "warm" => Action::ColorGrade {
                grade: match name.as_str() {
                    "sepia" => ColorGrade::Sepia,
                    "cool" => ColorGrade::Cool,
                    _ => ColorGrade::Warm,
                },
                intensity: non_negative("intensity", request.intensity)?,
            },
            "grayscale" | "greyscale" => Action::Grayscale,
            "negative" | "invert" => Action::Negative,
            "blur" | "gaussian_blur" | "motion_blur" | "radial_blur" => Action::Blur {
                kind: match name.as_str() {
                    "motion_blur" => BlurKind::Motion,
                    "radial_blur" => BlurKind::Radial,
                    _ => BlurKind::Gaussian,
                },
                intensity: at_most(
                    "blur_intensity",
                    non_negative("blur_intensity", request.blur_intensity)?,
                    MAX_BLUR_INTENSITY,
                )?,
            },
            "text" => Action::Text(Self::parse_text(request)?),
            "speed" | "speedup" | "slowdown" | "reverse" => {
                let raw = request.speed_factor;
                if raw == 0.0 {
                    return Err(ValidationError::ZeroSpeed.into());
                }
                if !raw.is_finite() {
                    return Err(invalid("speed_factor", raw).into());
                }
                let factor = match name.as_str() {
                    "slowdown" => 1.0 / raw,
                    "reverse" => -raw.abs(),
                    _ => raw,
                };
                let mode = match request.speed_mode.as_deref().map(str::to_ascii_lowercase).as_deref() {
                    None | Some("interpolate") => RetimeMode::Interpolate,
                    Some("duplicate") => RetimeMode::Duplicate,
                    Some(other) => return Err(invalid("speed_mode", other).into()),
                };
                Action::Speed(SpeedParams { factor, mode })
            }
            _ => Action::Other(name),
        };

        Ok(action)
    }

    fn parse_text(request: &TransformRequest) -> Result<TextOverlay> {
        let text = request
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| invalid("text", "<empty>"))?
            .to_string();

        let position = match (request.text_x, request.text_y) {
            (Some(x), Some(y)) => TextPosition::At { x, y },
            _ => match request.text_position.as_deref().map(str::to_ascii_lowercase).as_deref() {
                None | Some("center") => TextPosition::Center,
                Some("top") => TextPosition::Top,
                Some("bottom") => TextPosition::Bottom,
                Some(other) => return Err(invalid("text_position", other).into()),
            },
        };

        let scale = request.text_scale;
        if !scale.is_finite() || scale <= 0.0 || scale > MAX_TEXT_SCALE {
            return Err(invalid("text_scale", scale).into());
        }
        if request.text_thickness > MAX_TEXT_THICKNESS {
            return Err(invalid("text_thickness", request.text_thickness).into());
        }

        Ok(TextOverlay {
            text,
            position,
            scale,
            color: request.text_color.unwrap_or([255, 255, 255]),
            thickness: request.text_thickness.max(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    fn request(action: &str) -> TransformRequest {
        TransformRequest {
            action: action.to_string(),
            ..TransformRequest::default()
        }
    }

    #[test]
    fn test_defaults_build_a_trim() {
        let params = TransformParams::from_request(&TransformRequest::default()).unwrap();
        assert_eq!(params.action, Action::Trim);
        assert_eq!(params.window, TimeWindow { start: 0.0, end: None });
        assert_eq!(params.format, OutputFormat::Mp4);
    }

    #[test]
    fn test_negative_start_is_clamped() {
        let mut req = request("trim");
        req.start_time = -3.0;
        req.end_time = 2.0;
        let params = TransformParams::from_request(&req).unwrap();
        assert_eq!(params.window, TimeWindow { start: 0.0, end: Some(2.0) });
    }

    #[test]
    fn test_zero_speed_rejected() {
        let mut req = request("speed");
        req.speed_factor = 0.0;
        assert!(matches!(
            TransformParams::from_request(&req),
            Err(EngineError::Validation(ValidationError::ZeroSpeed))
        ));
    }

    #[test]
    fn test_speed_action_variants() {
        let mut req = request("slowdown");
        req.speed_factor = 2.0;
        let params = TransformParams::from_request(&req).unwrap();
        assert_eq!(params.action.speed().unwrap().factor, 0.5);

        req.action = "reverse".to_string();
        let params = TransformParams::from_request(&req).unwrap();
        assert!(params.action.speed().unwrap().is_reverse());
        assert_eq!(params.action.speed().unwrap().factor, -2.0);

        req.action = "speedup".to_string();
        req.speed_mode = Some("sideways".to_string());
        assert!(TransformParams::from_request(&req).is_err());
    }

    #[test]
    fn test_stride_and_residual() {
        let speed = SpeedParams { factor: 2.5, mode: RetimeMode::Interpolate };
        assert_eq!(speed.decimation_stride(), 2);
        assert!((speed.residual_factor() - 1.25).abs() < 1e-9);

        let slow = SpeedParams { factor: -0.5, mode: RetimeMode::Duplicate };
        assert_eq!(slow.decimation_stride(), 1);
        assert_eq!(slow.residual_factor(), 0.5);
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let mut req = request("crop");
        req.crop_width = Some(0);
        assert!(matches!(
            TransformParams::from_request(&req),
            Err(EngineError::Validation(ValidationError::NonPositiveDimensions { .. }))
        ));

        let mut req = request("resize");
        req.output_height = Some(0);
        assert!(TransformParams::from_request(&req).is_err());
    }

    #[test]
    fn test_crop_origin_zero_is_a_real_value() {
        let mut req = request("crop");
        req.crop_x = Some(0);
        req.crop_width = Some(10);
        let params = TransformParams::from_request(&req).unwrap();
        assert_eq!(params.crop.x, Some(0));
        assert_eq!(params.crop.y, None);
    }

    #[test]
    fn test_unsupported_format_rejected() {
        let mut req = request("trim");
        req.output_format = "webm".to_string();
        assert!(matches!(
            TransformParams::from_request(&req),
            Err(EngineError::Validation(ValidationError::UnsupportedFormat { .. }))
        ));
    }

    #[test]
    fn test_unknown_action_is_kept_by_name() {
        let params = TransformParams::from_request(&request("Vaporwave")).unwrap();
        assert_eq!(params.action, Action::Other("vaporwave".to_string()));
        assert_eq!(params.action.name(), "vaporwave");
    }

    #[test]
    fn test_text_requires_content() {
        assert!(TransformParams::from_request(&request("text")).is_err());

        let mut req = request("text");
        req.text = Some("Hello".to_string());
        req.text_position = Some("bottom".to_string());
        let params = TransformParams::from_request(&req).unwrap();
        match params.action {
            Action::Text(overlay) => {
                assert_eq!(overlay.position, TextPosition::Bottom);
                assert_eq!(overlay.color, [255, 255, 255]);
            }
            other => panic!("unexpected action {:?}", other),
        }
    }

    #[test]
    fn test_oversized_effect_parameters_rejected() {
        let rejected = |req: &TransformRequest, field: &str| match TransformParams::from_request(req) {
            Err(EngineError::Validation(ValidationError::InvalidParameter { name, .. })) => assert_eq!(name, field),
            other => panic!("expected {} to be rejected, got {:?}", field, other),
        };

        let mut req = request("motion_blur");
        req.blur_intensity = 1.0e6;
        rejected(&req, "blur_intensity");
        req.blur_intensity = MAX_BLUR_INTENSITY;
        assert!(TransformParams::from_request(&req).is_ok());

        let mut req = request("text");
        req.text = Some("big".to_string());
        req.text_scale = 1.0e9;
        rejected(&req, "text_scale");

        req.text_scale = 1.0;
        req.text_thickness = u32::MAX;
        rejected(&req, "text_thickness");
        req.text_thickness = MAX_TEXT_THICKNESS;
        assert!(TransformParams::from_request(&req).is_ok());
    }

    #[test]
    fn test_darken_inverts_factor() {
        let mut req = request("darken");
        req.brightness_factor = 4.0;
        let params = TransformParams::from_request(&req).unwrap();
        match params.action {
            Action::Brightness(b) => assert_eq!(b.effective_factor(), 0.25),
            other => panic!("unexpected action {:?}", other),
        }
        assert_eq!(params.action.name(), "darken");
    }
}
