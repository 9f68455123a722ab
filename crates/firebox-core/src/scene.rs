//! Host scene model
//!
//! The exporter never owns the scene: it walks a tree of [`SceneNode`]s built
//! by the host (or by [`crate::scene_file`]) and reads shared assets through
//! `Arc`s. Two references point at the same asset exactly when the `Arc`s are
//! pointer-equal; that is the identity the asset registry deduplicates on.

use std::path::PathBuf;
use std::sync::Arc;

use glam::{Vec2, Vec3, Vec4};
use image::{Rgba32FImage, RgbaImage};

use crate::types::{Bounds, Color, Transform};

/// Scale/offset that maps an object's lightmap UVs onto the whole atlas
pub const IDENTITY_SCALE_OFFSET: Vec4 = Vec4::new(1.0, 1.0, 0.0, 0.0);

/// A scene ready for export
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub name: String,
    pub roots: Vec<SceneNode>,
    /// Lightmap atlases, looked up by [`LightmapAtlas::index`]
    pub lightmaps: Vec<Arc<LightmapAtlas>>,
    pub skybox: Option<Skybox>,
}

impl Scene {
    pub fn lightmap(&self, index: i32) -> Option<&Arc<LightmapAtlas>> {
        self.lightmaps.iter().find(|l| l.index == index)
    }
}

/// One node of the host hierarchy
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    /// Active in hierarchy
    pub active: bool,
    /// Marked static (never moves at runtime)
    pub is_static: bool,
    /// World-space transform
    pub transform: Transform,
    pub capabilities: Vec<Capability>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: true,
            is_static: true,
            transform: Transform::IDENTITY,
            capabilities: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn renderer(&self) -> Option<&Renderer> {
        self.capabilities.iter().find_map(|c| match c {
            Capability::Renderable(r) => Some(r),
            _ => None,
        })
    }

    pub fn has_collider(&self) -> bool {
        self.capabilities.iter().any(|c| matches!(c, Capability::Collidable))
    }

    /// Capability that claims the node exclusively, if any
    pub fn exclusive(&self) -> Option<&LinkPortal> {
        self.capabilities.iter().find_map(|c| match c {
            Capability::Link(link) => Some(link),
            _ => None,
        })
    }
}

/// Closed set of things a node can carry
#[derive(Debug, Clone)]
pub enum Capability {
    Renderable(Renderer),
    Collidable,
    ReflectionProbe { texture: Option<Arc<ImageSource>> },
    /// Portal to another room; claims the node for itself
    Link(LinkPortal),
}

/// Mesh renderer attached to a node
#[derive(Debug, Clone)]
pub struct Renderer {
    pub mesh: Option<Arc<MeshSource>>,
    /// One material slot per submesh
    pub materials: Vec<Option<Arc<Material>>>,
    /// Atlas index, -1 when the object is not lightmapped
    pub lightmap_index: i32,
    /// (scale.x, scale.y, offset.x, offset.y) into the atlas
    pub lightmap_scale_offset: Vec4,
    /// World-space render bounds
    pub bounds: Bounds,
}

impl Renderer {
    pub fn new(mesh: Arc<MeshSource>, material: Arc<Material>) -> Self {
        Self {
            mesh: Some(mesh),
            materials: vec![Some(material)],
            lightmap_index: -1,
            lightmap_scale_offset: IDENTITY_SCALE_OFFSET,
            bounds: Bounds::default(),
        }
    }

    pub fn with_lightmap(mut self, index: i32, scale_offset: Vec4) -> Self {
        self.lightmap_index = index;
        self.lightmap_scale_offset = scale_offset;
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn primary_material(&self) -> Option<&Arc<Material>> {
        self.materials.first().and_then(Option::as_ref)
    }

    pub fn is_lightmapped(&self) -> bool {
        self.lightmap_index >= 0
    }
}

/// Source geometry as stored by the host
#[derive(Debug, Clone, Default)]
pub struct MeshSource {
    pub name: String,
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uv0: Vec<Vec2>,
    /// Lightmap UVs; empty means the host reuses `uv0`
    pub uv1: Vec<Vec2>,
    /// Triangle indices per submesh
    pub submeshes: Vec<Vec<u32>>,
}

impl MeshSource {
    /// All submesh triangles, in submesh order
    pub fn triangles(&self) -> Vec<u32> {
        self.submeshes.iter().flatten().copied().collect()
    }

    pub fn max_index(&self) -> Option<u32> {
        self.submeshes.iter().flatten().copied().max()
    }

    /// Lightmap UV channel with the host's fallback applied
    pub fn lightmap_uvs(&self) -> &[Vec2] {
        if self.uv1.is_empty() {
            &self.uv0
        } else {
            &self.uv1
        }
    }
}

/// Material as exposed by the host's shader system
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub shader: Shader,
    pub texture_scale: Vec2,
    pub texture_offset: Vec2,
}

impl Material {
    pub fn new(name: impl Into<String>, shader: Shader) -> Self {
        Self {
            name: name.into(),
            shader,
            texture_scale: Vec2::ONE,
            texture_offset: Vec2::ZERO,
        }
    }
}

/// Shader display name plus its properties in declaration order
#[derive(Debug, Clone, Default)]
pub struct Shader {
    pub name: String,
    pub properties: Vec<ShaderProperty>,
}

#[derive(Debug, Clone)]
pub struct ShaderProperty {
    pub name: String,
    pub value: PropertyValue,
}

impl ShaderProperty {
    pub fn texture(name: impl Into<String>, texture: Option<Arc<ImageSource>>) -> Self {
        Self {
            name: name.into(),
            value: PropertyValue::Texture(texture),
        }
    }

    pub fn color(name: impl Into<String>, color: Color) -> Self {
        Self {
            name: name.into(),
            value: PropertyValue::Color(color),
        }
    }
}

#[derive(Debug, Clone)]
pub enum PropertyValue {
    Texture(Option<Arc<ImageSource>>),
    Color(Color),
    Float(f32),
    Vector(Vec4),
}

/// A 2D image known to the host
#[derive(Debug, Clone, Default)]
pub struct ImageSource {
    pub name: String,
    /// Source file, `None` for images that only exist in memory
    pub path: Option<PathBuf>,
    /// Decoded pixels, loaded from `path` on demand when absent
    pub pixels: Option<RgbaImage>,
    /// The host treats the alpha channel as transparency
    pub alpha_is_transparency: bool,
}

impl ImageSource {
    pub fn from_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn from_pixels(name: impl Into<String>, pixels: RgbaImage) -> Self {
        Self {
            name: name.into(),
            pixels: Some(pixels),
            ..Default::default()
        }
    }

    /// Pixels, decoding the source file when they were not preloaded
    pub fn load_pixels(&self) -> crate::Result<RgbaImage> {
        if let Some(pixels) = &self.pixels {
            return Ok(pixels.clone());
        }
        match &self.path {
            Some(path) => Ok(image::open(path)?.to_rgba8()),
            None => Err(crate::Error::encoding(&self.name, "neither pixels nor a source file")),
        }
    }

    /// Lowercase file extension of the source file, with the leading dot
    pub fn source_extension(&self) -> Option<String> {
        self.path
            .as_ref()
            .and_then(|p| p.extension())
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
    }
}

/// Baked high-dynamic-range lightmap atlas
#[derive(Debug, Clone)]
pub struct LightmapAtlas {
    pub index: i32,
    /// Source file (usually `Lightmap-<index>_comp_light.exr`)
    pub path: PathBuf,
    /// Decoded texels, loaded from `path` on demand when absent
    pub hdr: Option<Rgba32FImage>,
}

impl LightmapAtlas {
    pub fn new(index: i32, path: impl Into<PathBuf>) -> Self {
        Self {
            index,
            path: path.into(),
            hdr: None,
        }
    }

    pub fn load_hdr(&self) -> crate::Result<Rgba32FImage> {
        if let Some(hdr) = &self.hdr {
            return Ok(hdr.clone());
        }
        if !self.path.exists() {
            return Err(crate::Error::MissingLightmap { index: self.index });
        }
        Ok(image::open(&self.path)?.to_rgba32f())
    }

    /// Atlas size in texels, if it can be determined
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match &self.hdr {
            Some(hdr) => Some(hdr.dimensions()),
            None => image::image_dimensions(&self.path).ok(),
        }
    }

    pub fn width(&self) -> Option<u32> {
        self.dimensions().map(|(w, _)| w)
    }

    pub fn is_available(&self) -> bool {
        self.hdr.is_some() || self.path.exists()
    }

    pub fn source_extension(&self) -> String {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_else(|| ".exr".to_string())
    }
}

/// Environment box around the room
#[derive(Debug, Clone)]
pub enum Skybox {
    /// Six pre-made face images
    SixSided {
        front: Arc<ImageSource>,
        back: Arc<ImageSource>,
        left: Arc<ImageSource>,
        right: Arc<ImageSource>,
        up: Arc<ImageSource>,
        down: Arc<ImageSource>,
    },
    /// Gradient sky that has to be rendered into faces
    Procedural {
        top: Color,
        horizon: Color,
        ground: Color,
    },
}

/// Portal to another room
#[derive(Debug, Clone)]
pub struct LinkPortal {
    pub url: String,
    pub title: String,
    pub color: Color,
    pub draw_glow: bool,
    pub draw_text: bool,
    pub auto_load: bool,
}

impl Default for LinkPortal {
    fn default() -> Self {
        Self {
            url: "http://www.janusvr.com".to_string(),
            title: "JanusVR".to_string(),
            color: Color::WHITE,
            draw_glow: true,
            draw_text: true,
            auto_load: false,
        }
    }
}
