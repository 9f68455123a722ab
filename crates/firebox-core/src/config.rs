//! Export configuration
//!
//! Loaded from YAML (every field optional) and then overridden from the
//! command line. [`ExportConfig::validate`] must pass before an export starts.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest texture edge a bake or skybox face may use
pub const MAX_TEXTURE_RESOLUTION: u32 = 16384;

/// Output image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureFormat {
    /// JPEG (lossy, no alpha)
    #[default]
    Jpg,
    /// PNG (lossless, alpha)
    Png,
}

impl TextureFormat {
    /// File extension with the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            TextureFormat::Jpg => ".jpg",
            TextureFormat::Png => ".png",
        }
    }

    pub fn supports_alpha(&self) -> bool {
        matches!(self, TextureFormat::Png)
    }

    pub fn supports_quality(&self) -> bool {
        matches!(self, TextureFormat::Jpg)
    }
}

/// Output mesh format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshFormat {
    /// glTF JSON with a sidecar `.bin`
    #[default]
    Gltf,
    /// Binary glTF
    Glb,
}

impl MeshFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            MeshFormat::Gltf => ".gltf",
            MeshFormat::Glb => ".glb",
        }
    }
}

/// How lightmaps become exported textures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightmapMode {
    /// No lightmap processing
    None,
    /// Diffuse and lightmap composited into one image per exported mesh
    BakedMaterial,
    /// One exposure-decoded image per lightmap atlas
    #[default]
    Packed,
    /// The source HDR atlas copied verbatim
    PackedSourceExr,
    /// Lightmap only, one image per exported mesh
    Unpacked,
}

impl LightmapMode {
    /// Modes whose objects reference a shared atlas through `lmap_sca`
    pub fn uses_atlas_scale(&self) -> bool {
        matches!(self, LightmapMode::Packed | LightmapMode::PackedSourceExr)
    }
}

impl FromStr for LightmapMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "none" => Ok(LightmapMode::None),
            "baked_material" | "baked" => Ok(LightmapMode::BakedMaterial),
            "packed" => Ok(LightmapMode::Packed),
            "packed_source_exr" | "exr" => Ok(LightmapMode::PackedSourceExr),
            "unpacked" => Ok(LightmapMode::Unpacked),
            _ => Err(format!("Unknown lightmap mode: {}", s)),
        }
    }
}

impl fmt::Display for LightmapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LightmapMode::None => "none",
            LightmapMode::BakedMaterial => "baked_material",
            LightmapMode::Packed => "packed",
            LightmapMode::PackedSourceExr => "packed_source_exr",
            LightmapMode::Unpacked => "unpacked",
        };
        f.write_str(name)
    }
}

/// Which source instances end up in the same exported mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// One mesh per object, kept in object space
    #[default]
    PerObject,
    /// One world-space mesh per lightmap atlas, regardless of material
    PerLightmapId,
    /// One world-space mesh per (material, lightmap atlas) pair
    PerMaterial,
}

impl FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "per_object" | "object" => Ok(MergePolicy::PerObject),
            "per_lightmap_id" | "lightmap" => Ok(MergePolicy::PerLightmapId),
            "per_material" | "material" => Ok(MergePolicy::PerMaterial),
            _ => Err(format!("Unknown merge policy: {}", s)),
        }
    }
}

/// Range the `lmap_sca` components are clamped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleClamp {
    /// [-2, 2]
    #[default]
    Signed,
    /// [0, 1]
    Unit,
}

impl ScaleClamp {
    pub fn range(&self) -> (f32, f32) {
        match self {
            ScaleClamp::Signed => (-2.0, 2.0),
            ScaleClamp::Unit => (0.0, 1.0),
        }
    }
}

/// Everything an export run can be told
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Folder the room is written to
    pub export_path: PathBuf,
    pub texture_format: TextureFormat,
    /// JPEG quality (0-100)
    pub texture_quality: u8,
    pub mesh_format: MeshFormat,
    /// Uniform scale applied to the whole room
    pub uniform_scale: f32,
    pub lightmap_mode: LightmapMode,
    pub lightmap_max_resolution: u32,
    /// Relative exposure applied when decoding lightmaps, in f-stops
    pub lightmap_rel_fstops: f32,
    /// The host renders in linear color space
    pub linear_color_space: bool,
    pub lightmap_scale_clamp: ScaleClamp,
    pub merge_policy: MergePolicy,
    /// Export diffuse textures and colors
    pub export_materials: bool,
    /// Replace texture-less material colors with a flat 2x2 image
    pub material_colors_as_textures: bool,
    pub export_skybox: bool,
    /// Face resolution for procedural skyboxes
    pub skybox_resolution: u32,
    /// Only rewrite the document, reusing previously resolved file names
    pub html_only: bool,
    /// Re-encode source images even when their format is already acceptable
    pub force_retranscode: bool,
    pub ignore_inactive: bool,
    pub export_dynamic: bool,
    pub room_title: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            export_path: PathBuf::new(),
            texture_format: TextureFormat::Jpg,
            texture_quality: 70,
            mesh_format: MeshFormat::Gltf,
            uniform_scale: 1.0,
            lightmap_mode: LightmapMode::Packed,
            lightmap_max_resolution: 2048,
            lightmap_rel_fstops: 0.0,
            linear_color_space: true,
            lightmap_scale_clamp: ScaleClamp::Signed,
            merge_policy: MergePolicy::PerObject,
            export_materials: true,
            material_colors_as_textures: false,
            export_skybox: true,
            skybox_resolution: 1024,
            html_only: false,
            force_retranscode: false,
            ignore_inactive: true,
            export_dynamic: true,
            room_title: "Janus Unity Exporter".to_string(),
        }
    }
}

impl ExportConfig {
    /// Load from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Clamp minimums and reject settings the pipeline cannot run with
    pub fn validate(&mut self) -> Result<()> {
        if self.export_path.as_os_str().is_empty() {
            return Err(Error::invalid_config("export path is empty"));
        }
        if !self.uniform_scale.is_finite() || self.uniform_scale == 0.0 {
            return Err(Error::invalid_config(format!(
                "uniform scale must be finite and non-zero, got {}",
                self.uniform_scale
            )));
        }
        self.texture_quality = self.texture_quality.min(100);
        self.lightmap_max_resolution = self.lightmap_max_resolution.clamp(4, MAX_TEXTURE_RESOLUTION);
        self.skybox_resolution = self.skybox_resolution.clamp(4, MAX_TEXTURE_RESOLUTION);
        Ok(())
    }

    /// Whether the merged meshes carry a second UV channel for lightmaps
    pub fn needs_lightmap_uv(&self) -> bool {
        self.lightmap_mode != LightmapMode::None
    }
}
