use thiserror::Error;

/// Main error type for the sketch-video pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Frame extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Frame filtering error: {0}")]
    Filter(#[from] FilterError),

    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Muxing error: {0}")]
    Mux(#[from] MuxError),

    #[error("Invalid request: {0}")]
    Argument(#[from] ArgumentError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Cancelled during {stage}")]
    Cancelled { stage: &'static str },

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Frame extraction errors
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Invalid media {path}: {reason}")]
    InvalidMedia { path: String, reason: String },

    #[error("No frames extracted from {path} ({requested} requested)")]
    NoFramesExtracted { path: String, requested: usize },

    #[error("Probe failed for {path}: {reason}")]
    ProbeFailed { path: String, reason: String },

    #[error("Frame grab at {timestamp:.3}s failed: {reason}")]
    GrabFailed { timestamp: f64, reason: String },
}

/// Frame filtering errors
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("No frames processed ({total} submitted)")]
    NoFramesProcessed { total: usize },

    #[error("Filter {filter} failed on frame {index}: {reason}")]
    FrameFailed {
        filter: String,
        index: usize,
        reason: String,
    },
}

/// Video encoder and pump loop errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    #[error("Encoder configuration failed: {reason}")]
    Configure { reason: String },

    #[error("Encoder pump failed: {reason}")]
    Pump { reason: String },

    #[error("Illegal encoder transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Encoder contract violated: {reason}")]
    ContractViolation { reason: String },

    #[error("Encoder stalled after {polls} idle polls")]
    Stalled { polls: u32 },

    #[error("Encoding cancelled")]
    Cancelled,
}

/// Track and container errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MuxError {
    #[error("Cannot add {role} track after the muxer has started")]
    TrackAfterStart { role: String },

    #[error("Muxer already started")]
    AlreadyStarted,

    #[error("Cannot start a muxer with no tracks")]
    NoTracks,

    #[error("Cannot write sample for track {track}: muxer not started")]
    NotStarted { track: usize },

    #[error("No video track in {path}")]
    NoVideoTrack { path: String },

    #[error("Container error: {reason}")]
    Container { reason: String },
}

/// Malformed request
#[derive(Error, Debug)]
#[error("{details}")]
pub struct ArgumentError {
    pub details: String,
}

impl ArgumentError {
    pub fn new<S: Into<String>>(details: S) -> Self {
        Self { details: details.into() }
    }
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

/// Convenience type alias for Results using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Name of the pipeline phase that produced this error
    pub fn phase(&self) -> &'static str {
        match self {
            Self::Extraction(_) => "extraction",
            Self::Filter(_) => "filtering",
            Self::Encode(_) => "encoding",
            Self::Mux(_) => "muxing",
            Self::Argument(_) => "request validation",
            Self::Config(_) => "configuration",
            Self::Cancelled { stage } => *stage,
            Self::Io(_) | Self::Image(_) | Self::Generic(_) => "processing",
        }
    }

    /// Whether the error came from the caller tripping the cancellation flag
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::Encode(EncodeError::Cancelled))
    }

    /// Get a user-friendly status message describing the failing phase
    pub fn user_message(&self) -> String {
        match self {
            Self::Extraction(ExtractionError::InvalidMedia { path, .. }) => {
                format!("Could not read video '{}'. Please check the file exists and is a supported format.", path)
            }
            Self::Extraction(ExtractionError::NoFramesExtracted { .. }) => {
                "Frame extraction failed: no frames could be decoded".to_string()
            }
            Self::Filter(FilterError::NoFramesProcessed { .. }) => {
                "Filtering failed: no frames could be processed".to_string()
            }
            Self::Cancelled { .. } | Self::Encode(EncodeError::Cancelled) => "Video processing cancelled".to_string(),
            _ => format!("Video processing failed during {}: {}", self.phase(), self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_names() {
        let err: PipelineError = EncodeError::Pump { reason: "boom".into() }.into();
        assert_eq!(err.phase(), "encoding");

        let err: PipelineError = MuxError::NoTracks.into();
        assert_eq!(err.phase(), "muxing");

        let err: PipelineError = ArgumentError::new("targetFPS must be > 0").into();
        assert_eq!(err.phase(), "request validation");
    }

    #[test]
    fn test_user_message_mentions_phase() {
        let err: PipelineError = MuxError::Container { reason: "disk full".into() }.into();
        let message = err.user_message();
        assert!(message.contains("muxing"));
        assert!(message.contains("disk full"));
    }

    #[test]
    fn test_cancelled_detection() {
        let err: PipelineError = EncodeError::Cancelled.into();
        assert!(err.is_cancelled());
        assert_eq!(err.phase(), "encoding");

        let err = PipelineError::Cancelled { stage: "filtering" };
        assert!(err.is_cancelled());
        assert_eq!(err.phase(), "filtering");
        assert_eq!(err.user_message(), "Video processing cancelled");
        assert!(!PipelineError::generic("x").is_cancelled());
    }
}
