/// Core error types for the Storyreel pipeline.
use std::path::{Path, PathBuf};

/// A specialized Result type for Storyreel operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Top-level error type encompassing every pipeline stage.
///
/// One variant per failure class the caller can branch on. Step-level detail
/// (which frame failed, encoder stderr, ...) lives in the message only.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("bundling error: {0}")]
    Bundling(String),

    #[error("composition not found: {0}")]
    CompositionNotFound(String),

    #[error("browser launch error: {0}")]
    BrowserLaunch(String),

    #[error("navigation timeout: {0}")]
    NavigationTimeout(String),

    #[error("frame capture error: {0}")]
    FrameCapture(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("storage IO error: {context} ({path:?}): {source}")]
    StorageIo {
        context: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    /// Create a storage error for a failed filesystem operation on `path`.
    pub fn storage(
        context: impl Into<String>,
        path: impl AsRef<Path>,
        source: std::io::Error,
    ) -> Self {
        RenderError::StorageIo {
            context: context.into(),
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Stable snake_case code used on the wire and in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RenderError::InvalidRequest(_) => "invalid_request",
            RenderError::Bundling(_) => "bundling_error",
            RenderError::CompositionNotFound(_) => "composition_not_found",
            RenderError::BrowserLaunch(_) => "browser_launch_error",
            RenderError::NavigationTimeout(_) => "navigation_timeout",
            RenderError::FrameCapture(_) => "frame_capture_error",
            RenderError::Encoding(_) => "encoding_error",
            RenderError::StorageIo { .. } => "storage_io_error",
        }
    }

    /// Whether the failure was caused by the caller's input rather than the pipeline.
    pub fn is_client_error(&self) -> bool {
        matches!(self, RenderError::InvalidRequest(_))
    }
}
