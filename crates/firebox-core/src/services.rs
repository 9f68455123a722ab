//! Interfaces to the collaborators the exporter drives but does not implement
//!
//! - [`TextureBaker`]: renders shading into an off-screen target and hands the
//!   pixels back (the only way to get baked lightmaps out of a GPU).
//! - [`MeshEncoder`]: writes merged geometry to a mesh file.
//! - [`ImageEncoder`]: writes pixel buffers, or copies source files, to disk.
//!
//! Every call is synchronous. A baker is driven strictly as
//! acquire → clear → draw* → read back → release, one target at a time.

use std::path::Path;
use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3, Vec4};
use image::RgbaImage;

use crate::config::{MeshFormat, TextureFormat};
use crate::error::Result;
use crate::scene::{ImageSource, LightmapAtlas, MeshSource};
use crate::types::Color;

// ==================== Texture baking ====================

/// Handle to a render target owned by a [`TextureBaker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetId(pub u32);

/// Color space the target stores its texels in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Linear,
    Srgb,
}

/// Exposure correction applied when decoding an HDR lightmap
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exposure {
    /// Relative exposure in f-stops; the texel is scaled by `2^rel_fstops`
    pub rel_fstops: f32,
    /// The host renders in linear space, so the result needs gamma encoding
    pub linear: bool,
}

impl Default for Exposure {
    fn default() -> Self {
        Self {
            rel_fstops: 0.0,
            linear: true,
        }
    }
}

/// What a draw call computes per texel
#[derive(Debug, Clone)]
pub enum Shading {
    /// Decode the whole atlas, independent of any material
    Exposure {
        lightmap: Arc<LightmapAtlas>,
        exposure: Exposure,
    },
    /// Lightmap multiplied with the material's diffuse texture and color
    LightmapComposite {
        lightmap: Arc<LightmapAtlas>,
        /// Where the object's lightmap UVs sample the atlas
        lightmap_scale_offset: Vec4,
        diffuse: Option<Arc<ImageSource>>,
        color: Color,
        exposure: Exposure,
    },
    /// Lightmap contribution only
    LightmapOnly {
        lightmap: Arc<LightmapAtlas>,
        lightmap_scale_offset: Vec4,
        exposure: Exposure,
    },
    /// One face of a gradient sky
    Sky {
        forward: Vec3,
        up: Vec3,
        top: Color,
        horizon: Color,
        ground: Color,
    },
}

/// Geometry a draw call covers
#[derive(Debug, Clone)]
pub enum DrawGeometry {
    /// A quad covering the whole target
    FullTarget,
    /// One submesh of a mesh, laid out in the target by its lightmap UVs
    Mesh {
        mesh: Arc<MeshSource>,
        submesh: usize,
        world: Mat4,
        /// Scale/offset applied to the lightmap UVs to place them in the target
        target_scale_offset: Vec4,
    },
}

#[derive(Debug, Clone)]
pub struct DrawCall {
    pub geometry: DrawGeometry,
    pub shading: Shading,
}

/// Off-screen rendering service
pub trait TextureBaker {
    /// Reserve a target; fails with a configuration error when a shading
    /// resource the baker needs is unavailable
    fn acquire(&mut self, width: u32, height: u32, color_space: ColorSpace) -> Result<RenderTargetId>;

    fn clear(&mut self, target: RenderTargetId, color: Color) -> Result<()>;

    fn draw(&mut self, target: RenderTargetId, call: &DrawCall) -> Result<()>;

    /// Copy the target's pixels back; returns only after all draws finished
    fn read_back(&mut self, target: RenderTargetId) -> Result<RgbaImage>;

    fn release(&mut self, target: RenderTargetId);
}

// ==================== Mesh encoding ====================

/// Merged geometry handed to a [`MeshEncoder`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub triangles: Vec<u32>,
    /// Channel 0 is the surface UV, channel 1 (optional) the lightmap UV
    pub uvs: Vec<Vec<Vec2>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshEncodeOptions {
    pub format: MeshFormat,
    /// Write the lightmap UVs as channel 0 (the diffuse is a baked image)
    pub swap_uv_channels: bool,
}

pub trait MeshEncoder {
    /// Write `mesh` to `path`; the path already carries the format extension
    fn encode(&mut self, mesh: &MeshData, options: &MeshEncodeOptions, path: &Path) -> Result<()>;
}

// ==================== Image encoding ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageEncodeOptions {
    pub format: TextureFormat,
    /// JPEG quality (0-100)
    pub quality: u8,
    /// Keep the alpha channel; otherwise it is written fully opaque
    pub keep_alpha: bool,
}

pub trait ImageEncoder {
    /// Encode `pixels` to `path`; the path already carries the format extension
    fn encode(&mut self, pixels: &RgbaImage, options: &ImageEncodeOptions, path: &Path) -> Result<()>;

    /// Copy an already acceptable source file, overwriting `destination`
    fn copy(&mut self, source: &Path, destination: &Path) -> Result<()>;
}
