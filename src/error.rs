use thiserror::Error;

/// Main error type for the clipshop engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Effect failed: {effect} - {reason}")]
    Effect { effect: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request and geometry validation errors, raised before any frame is processed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid time range: start frame {start_frame} is not before end frame {end_frame}")]
    InvalidRange { start_frame: u64, end_frame: u64 },

    #[error("Invalid crop rectangle {x},{y} {width}x{height} for {source_width}x{source_height} source")]
    InvalidGeometry {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        source_width: u32,
        source_height: u32,
    },

    #[error("Dimensions must be positive: {field}")]
    NonPositiveDimensions { field: String },

    #[error("Speed factor must not be zero")]
    ZeroSpeed,

    #[error("Unsupported output format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },
}

/// Errors opening or decoding the input video
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to open video source: {path} ({reason})")]
    OpenFailed { path: String, reason: String },

    #[error("Failed to probe video metadata: {path} ({reason})")]
    ProbeFailed { path: String, reason: String },

    #[error("Frame decoding failed: {reason}")]
    DecodeFailed { reason: String },
}

/// Errors opening or writing the output container
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to open output: {path} ({reason})")]
    OpenFailed { path: String, reason: String },

    #[error("Failed to write frame {frame}: {reason}")]
    WriteFailed { frame: u64, reason: String },

    #[error("Failed to finalize output: {reason}")]
    FinishFailed { reason: String },

    #[error("Frame size {actual_width}x{actual_height} does not match output {width}x{height}")]
    FrameSizeMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },
}

/// Job lifecycle errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("Job not found: {id}")]
    NotFound { id: String },

    #[error("Job {id} is not ready (status: {status})")]
    NotReady { id: String, status: String },

    #[error("Job already exists: {id}")]
    AlreadyExists { id: String },

    #[error("Job {id} is already {status}")]
    TerminalState { id: String, status: String },

    #[error("Time window produced no frames")]
    EmptyOutput,
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn effect<E: Into<String>, R: Into<String>>(effect: E, reason: R) -> Self {
        Self::Effect {
            effect: effect.into(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by the request itself rather than the media or the host
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Source(SourceError::OpenFailed { path, .. }) => {
                format!("Could not open video file '{}'. Please check it is a supported video.", path)
            }
            Self::Job(JobError::EmptyOutput) => {
                "The selected time range does not contain any frames.".to_string()
            }
            Self::Validation(ValidationError::UnsupportedFormat { format }) => {
                format!("Output format '{}' is not supported. Available formats: mp4, avi, mov", format)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_convert() {
        let err: EngineError = ValidationError::ZeroSpeed.into();
        assert!(err.is_validation());
        assert_eq!(err.to_string(), "Validation error: Speed factor must not be zero");
    }

    #[test]
    fn test_user_message_for_unsupported_format() {
        let err: EngineError = ValidationError::UnsupportedFormat { format: "mkv".to_string() }.into();
        assert!(err.user_message().contains("mp4, avi, mov"));
    }
}
