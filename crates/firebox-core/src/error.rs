//! Unified error handling for FireBox
//!
//! Errors fall into three families that decide how the pipeline reacts:
//!
//! | Family | Variants | Pipeline reaction |
//! |--------|----------|-------------------|
//! | Skippable | `InvalidMesh`, `MissingMaterial`, `MissingLightmap` | drop the item, warn, continue |
//! | Configuration | `OutputDirectory`, `MissingBakeResource`, `InvalidConfig` | abort the export |
//! | Encoding | `Encoding` | log, leave the asset's exported path unset |

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stage an error was raised in, used when reporting a failed export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Walk,
    Merge,
    Lightmap,
    Encode,
    Serialize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Setup => "setup",
            Stage::Walk => "scene walk",
            Stage::Merge => "mesh merge",
            Stage::Lightmap => "lightmap bake",
            Stage::Encode => "asset encode",
            Stage::Serialize => "serialize",
        };
        f.write_str(name)
    }
}

/// Unified error type for all FireBox operations
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // ==================== Skippable Asset Errors ====================

    /// Mesh is empty or its attribute streams disagree
    #[error("Invalid mesh '{mesh}': {reason}")]
    InvalidMesh { mesh: String, reason: String },

    /// Renderer without a usable primary material
    #[error("Missing material on '{object}'")]
    MissingMaterial { object: String },

    /// Lightmap atlas referenced by an object could not be resolved
    #[error("Missing lightmap {index}")]
    MissingLightmap { index: i32 },

    // ==================== Configuration Errors ====================

    /// Export root could not be created
    #[error("Cannot create output directory {path}: {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Baking service lacks a required shading resource
    #[error("Missing bake resource: {name}")]
    MissingBakeResource { name: String },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // ==================== Encoding Errors ====================

    /// Image or mesh encoder failed while writing an asset
    #[error("Encoding '{asset}' failed: {message}")]
    Encoding { asset: String, message: String },

    // ==================== Format Errors ====================

    /// Image decoding/encoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// YAML configuration error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON scene description error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Scene description references something that does not exist
    #[error("Invalid reference: {reference}")]
    InvalidReference { reference: String },

    // ==================== General Errors ====================

    /// Custom error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

/// Result type using the unified Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Error::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create an invalid mesh error
    pub fn invalid_mesh(mesh: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidMesh {
            mesh: mesh.into(),
            reason: reason.into(),
        }
    }

    /// Create an encoding error
    pub fn encoding(asset: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Encoding {
            asset: asset.into(),
            message: message.to_string(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            message: message.into(),
        }
    }

    fn root(&self) -> &Error {
        match self {
            Error::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Item-level failure: drop the item and keep exporting
    pub fn is_skippable(&self) -> bool {
        matches!(
            self.root(),
            Error::InvalidMesh { .. } | Error::MissingMaterial { .. } | Error::MissingLightmap { .. }
        )
    }

    /// Setup failure that aborts the whole export
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.root(),
            Error::OutputDirectory { .. } | Error::MissingBakeResource { .. } | Error::InvalidConfig { .. }
        )
    }

    /// Encoder failure for a single asset
    pub fn is_encoding(&self) -> bool {
        matches!(self.root(), Error::Encoding { .. } | Error::Image(_))
    }

    /// Check if this is a "not found" type error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root(),
            Error::FileNotFound(_) | Error::MissingLightmap { .. } | Error::InvalidReference { .. }
        )
    }
}

/// Error raised by a whole export run, tagged with the stage that failed
#[derive(Error, Debug)]
#[error("Export failed during {stage}: {source}")]
pub struct ExportFailure {
    pub stage: Stage,
    #[source]
    pub source: Error,
}

impl ExportFailure {
    pub fn new(stage: Stage, source: Error) -> Self {
        Self { stage, source }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;

    /// Tag the error with the stage it aborted
    fn at_stage(self, stage: Stage) -> std::result::Result<T, ExportFailure>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }

    fn at_stage(self, stage: Stage) -> std::result::Result<T, ExportFailure> {
        self.map_err(|e| ExportFailure::new(stage, e))
    }
}
