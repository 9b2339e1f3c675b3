// ============================================================================
// ENGINE ERRORS: one error type for the render engine, export and recipes
// ============================================================================
//
// Unknown module / effect names and degenerate mask radii are NOT errors:
// the former are logged and skipped, the latter are clamped at edit time.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// No GPU adapter or device could be obtained.
    #[error("rendering resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// WGSL failed to parse or validate. `log` holds the compiler output.
    #[error("shader compile failed for '{label}':\n{log}")]
    ShaderCompileFailed { label: String, log: String },

    /// The shader compiled but the pipeline could not be created.
    #[error("program link failed for '{label}':\n{log}")]
    ProgramLinkFailed { label: String, log: String },

    #[error("no image is bound")]
    NoImage,

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("image {width}x{height} exceeds the device limit of {max}px")]
    TextureTooLarge { width: u32, height: u32, max: u32 },

    #[error("readback failed: {0}")]
    Readback(String),

    #[error("image encode/decode error: {0}")]
    Encode(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("edit recipe error: {0}")]
    Recipe(String),
}

impl From<Box<bincode::ErrorKind>> for EngineError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        EngineError::Recipe(e.to_string())
    }
}

impl EngineError {
    /// True for the two program-build failures that leave the previously
    /// bound program active.
    pub fn is_build_failure(&self) -> bool {
        matches!(
            self,
            EngineError::ShaderCompileFailed { .. } | EngineError::ProgramLinkFailed { .. }
        )
    }
}
