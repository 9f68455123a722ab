//! FireBox Core Library
//!
//! Common types, the host scene model, export configuration, error handling
//! and the service interfaces (texture baking, mesh and image encoding) shared
//! by every FireBox component.

pub mod config;
pub mod error;
pub mod logging;
pub mod scene;
pub mod scene_file;
pub mod services;
pub mod types;

pub use error::{Error, ExportFailure, Result, ResultExt, Stage};
pub use types::*;

/// Re-export commonly used items
pub mod prelude {
    pub use crate::config::{
        ExportConfig, LightmapMode, MergePolicy, MeshFormat, ScaleClamp, TextureFormat,
    };
    pub use crate::error::{Error, ExportFailure, Result, ResultExt, Stage};
    pub use crate::scene::{
        Capability, ImageSource, LightmapAtlas, LinkPortal, Material, MeshSource, PropertyValue,
        Renderer, Scene, SceneNode, Shader, ShaderProperty, Skybox,
    };
    pub use crate::services::{ImageEncoder, MeshEncoder, TextureBaker};
    pub use crate::types::*;
}
