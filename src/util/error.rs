//! Error types for the tile renderer.

use std::path::PathBuf;
use thiserror::Error;

/// How the tile pipeline treats a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// I/O hiccup, interrupted render or remote timeout. May be requeued.
    Transient,
    /// Bad projection, unreadable texture pack, malformed template scene,
    /// a scene that can never render, or a broken denoiser contract. Aborts the render and is never requeued.
    FatalConfiguration,
    /// Unexpected response from the render farm.
    Api,
}

/// Main error type for rendering and tile commits.
#[derive(Error, Debug)]
pub enum Error {
    /// Projection parameters that cannot produce a camera
    #[error("Invalid projection: {0}")]
    InvalidProjection(String),

    /// Texture pack missing or unreadable
    #[error("Texture pack {path} could not be loaded: {reason}")]
    TexturePack { path: PathBuf, reason: String },

    /// Template scene could not be parsed
    #[error("Invalid template scene: {0}")]
    TemplateScene(String),

    /// Configuration file or value is invalid
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Render was interrupted before it finished
    #[error("Rendering was interrupted")]
    Interrupted,

    /// Remote job did not finish in time
    #[error("Timeout after {millis} ms")]
    Timeout { millis: u64 },

    /// Render farm answered with an unexpected status
    #[error("Render farm request failed: {status} {message}")]
    ApiStatus { status: u16, message: String },

    /// Render farm answered with a body we could not understand
    #[error("Malformed render farm response: {0}")]
    ApiResponse(String),

    /// HTTP transport failure (connection, TLS, body)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Scene or geometry could not be built or serialized
    #[error("Scene error: {0}")]
    Scene(String),

    /// Denoiser buffer contract violated
    #[error("Denoise failed: {0}")]
    Denoise(String),

    /// Tile storage failure
    #[error("Tile storage error: {0}")]
    Storage(String),

    /// Image encode/decode failure
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON encode/decode failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a scene error from a string.
    pub fn scene(msg: impl Into<String>) -> Self {
        Self::Scene(msg.into())
    }

    /// Create a storage error from a string.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error from a string.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classify the failure for requeue decisions.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidProjection(_)
            | Self::TexturePack { .. }
            | Self::TemplateScene(_)
            | Self::Config(_)
            | Self::Denoise(_) => FailureKind::FatalConfiguration,
            Self::ApiStatus { .. } | Self::ApiResponse(_) => FailureKind::Api,
            Self::Interrupted
            | Self::Timeout { .. }
            | Self::Http(_)
            | Self::Scene(_)
            | Self::Storage(_)
            | Self::Image(_)
            | Self::Json(_)
            | Self::Io(_) => FailureKind::Transient,
        }
    }

    /// Whether a tile that failed with this error may be rendered again.
    pub fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::Transient
    }
}

/// Result type alias for tracemap operations.
pub type Result<T> = std::result::Result<T, Error>;
