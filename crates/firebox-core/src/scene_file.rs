//! JSON scene descriptions
//!
//! A scene file lists textures, materials and meshes in named tables and
//! builds the node tree out of references into those tables, so that every
//! node naming the same mesh shares one `Arc<MeshSource>`. Relative paths are
//! resolved against the scene file's directory.
//!
//! ```json
//! {
//!   "name": "Atrium",
//!   "textures": { "Brick": { "path": "textures/brick.png" } },
//!   "materials": { "Wall": { "shader": "Standard", "properties": [
//!       { "type": "texture", "name": "_MainTex", "texture": "Brick" } ] } },
//!   "meshes": { "Quad": { "vertices": [[0,0,0],[1,0,0],[1,1,0]],
//!       "normals": [[0,0,1],[0,0,1],[0,0,1]], "submeshes": [[0,1,2]] } },
//!   "nodes": [ { "name": "Wall", "position": [0,0,5],
//!       "renderer": { "mesh": "Quad", "materials": ["Wall"] } } ]
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::{Quat, Vec2, Vec3, Vec4};
use serde::Deserialize;

use crate::error::{Error, Result, ResultExt};
use crate::scene::{
    Capability, ImageSource, LightmapAtlas, LinkPortal, Material, MeshSource, PropertyValue,
    Renderer, Scene, SceneNode, Shader, ShaderProperty, Skybox, IDENTITY_SCALE_OFFSET,
};
use crate::types::{Bounds, Color, Transform};

#[derive(Debug, Deserialize)]
struct SceneFile {
    #[serde(default)]
    name: String,
    #[serde(default)]
    textures: HashMap<String, TextureEntry>,
    #[serde(default)]
    materials: HashMap<String, MaterialEntry>,
    #[serde(default)]
    meshes: HashMap<String, MeshEntry>,
    #[serde(default)]
    lightmaps: Vec<LightmapEntry>,
    #[serde(default)]
    skybox: Option<SkyboxEntry>,
    #[serde(default)]
    nodes: Vec<NodeEntry>,
}

#[derive(Debug, Deserialize)]
struct TextureEntry {
    path: PathBuf,
    #[serde(default)]
    alpha_is_transparency: bool,
}

#[derive(Debug, Deserialize)]
struct MaterialEntry {
    #[serde(default)]
    shader: String,
    #[serde(default)]
    properties: Vec<PropertyEntry>,
    #[serde(default = "unit_scale")]
    texture_scale: [f32; 2],
    #[serde(default)]
    texture_offset: [f32; 2],
}

fn unit_scale() -> [f32; 2] {
    [1.0, 1.0]
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PropertyEntry {
    Texture { name: String, texture: Option<String> },
    Color { name: String, value: [f32; 4] },
    Float { name: String, value: f32 },
    Vector { name: String, value: [f32; 4] },
}

#[derive(Debug, Deserialize)]
struct MeshEntry {
    vertices: Vec<[f32; 3]>,
    #[serde(default)]
    normals: Vec<[f32; 3]>,
    #[serde(default)]
    uv0: Vec<[f32; 2]>,
    #[serde(default)]
    uv1: Vec<[f32; 2]>,
    submeshes: Vec<Vec<u32>>,
}

#[derive(Debug, Deserialize)]
struct LightmapEntry {
    index: i32,
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SkyboxEntry {
    SixSided {
        front: String,
        back: String,
        left: String,
        right: String,
        up: String,
        down: String,
    },
    Procedural {
        top: [f32; 4],
        horizon: [f32; 4],
        ground: [f32; 4],
    },
}

#[derive(Debug, Deserialize)]
struct NodeEntry {
    name: String,
    #[serde(default = "yes")]
    active: bool,
    #[serde(default = "yes", rename = "static")]
    is_static: bool,
    #[serde(default)]
    position: [f32; 3],
    /// Quaternion as (x, y, z, w)
    #[serde(default = "identity_rotation")]
    rotation: [f32; 4],
    #[serde(default = "unit_scale3")]
    scale: [f32; 3],
    #[serde(default)]
    renderer: Option<RendererEntry>,
    #[serde(default)]
    collider: bool,
    #[serde(default)]
    reflection_probe: Option<Option<String>>,
    #[serde(default)]
    link: Option<LinkEntry>,
    #[serde(default)]
    children: Vec<NodeEntry>,
}

fn yes() -> bool {
    true
}

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn unit_scale3() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

#[derive(Debug, Deserialize)]
struct RendererEntry {
    mesh: Option<String>,
    #[serde(default)]
    materials: Vec<Option<String>>,
    #[serde(default = "no_lightmap")]
    lightmap_index: i32,
    #[serde(default)]
    lightmap_scale_offset: Option<[f32; 4]>,
}

fn no_lightmap() -> i32 {
    -1
}

#[derive(Debug, Deserialize)]
struct LinkEntry {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    color: Option<[f32; 4]>,
    #[serde(default = "yes")]
    draw_glow: bool,
    #[serde(default = "yes")]
    draw_text: bool,
    #[serde(default)]
    auto_load: bool,
}

fn color(c: [f32; 4]) -> Color {
    Color::rgba(c[0], c[1], c[2], c[3])
}

/// Resolved asset tables shared while building nodes
struct Tables {
    textures: HashMap<String, Arc<ImageSource>>,
    materials: HashMap<String, Arc<Material>>,
    meshes: HashMap<String, Arc<MeshSource>>,
}

impl Tables {
    fn texture(&self, name: &str) -> Result<Arc<ImageSource>> {
        self.textures.get(name).cloned().ok_or_else(|| missing("texture", name))
    }
}

fn missing(kind: &str, name: &str) -> Error {
    Error::InvalidReference {
        reference: format!("{} '{}'", kind, name),
    }
}

/// Load a scene description from a JSON file
pub fn load_scene(path: impl AsRef<Path>) -> Result<Scene> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    let base = path.parent().unwrap_or(Path::new("."));
    parse_scene(&text, base).with_context(|| format!("loading {}", path.display()))
}

/// Parse a scene description; relative paths are resolved against `base`
pub fn parse_scene(json: &str, base: &Path) -> Result<Scene> {
    let file: SceneFile = serde_json::from_str(json)?;
    let resolve = |p: &Path| if p.is_absolute() { p.to_path_buf() } else { base.join(p) };

    let textures = file
        .textures
        .into_iter()
        .map(|(name, entry)| {
            let mut image = ImageSource::from_file(name.clone(), resolve(&entry.path));
            image.alpha_is_transparency = entry.alpha_is_transparency;
            (name, Arc::new(image))
        })
        .collect();

    let mut tables = Tables {
        textures,
        materials: HashMap::new(),
        meshes: HashMap::new(),
    };

    for (name, entry) in file.materials {
        let material = build_material(&name, entry, &tables)?;
        tables.materials.insert(name, Arc::new(material));
    }

    for (name, entry) in file.meshes {
        let mesh = MeshSource {
            name: name.clone(),
            vertices: entry.vertices.into_iter().map(Vec3::from).collect(),
            normals: entry.normals.into_iter().map(Vec3::from).collect(),
            uv0: entry.uv0.into_iter().map(Vec2::from).collect(),
            uv1: entry.uv1.into_iter().map(Vec2::from).collect(),
            submeshes: entry.submeshes,
        };
        tables.meshes.insert(name, Arc::new(mesh));
    }

    let lightmaps = file
        .lightmaps
        .into_iter()
        .map(|l| Arc::new(LightmapAtlas::new(l.index, resolve(&l.path))))
        .collect();

    let skybox = match file.skybox {
        Some(SkyboxEntry::SixSided { front, back, left, right, up, down }) => Some(Skybox::SixSided {
            front: tables.texture(&front)?,
            back: tables.texture(&back)?,
            left: tables.texture(&left)?,
            right: tables.texture(&right)?,
            up: tables.texture(&up)?,
            down: tables.texture(&down)?,
        }),
        Some(SkyboxEntry::Procedural { top, horizon, ground }) => Some(Skybox::Procedural {
            top: color(top),
            horizon: color(horizon),
            ground: color(ground),
        }),
        None => None,
    };

    let roots = file
        .nodes
        .into_iter()
        .map(|n| build_node(n, &tables))
        .collect::<Result<Vec<_>>>()?;

    Ok(Scene {
        name: file.name,
        roots,
        lightmaps,
        skybox,
    })
}

fn build_material(name: &str, entry: MaterialEntry, tables: &Tables) -> Result<Material> {
    let mut properties = Vec::with_capacity(entry.properties.len());
    for prop in entry.properties {
        let property = match prop {
            PropertyEntry::Texture { name, texture } => {
                let texture = texture.map(|t| tables.texture(&t)).transpose()?;
                ShaderProperty::texture(name, texture)
            }
            PropertyEntry::Color { name, value } => ShaderProperty::color(name, color(value)),
            PropertyEntry::Float { name, value } => ShaderProperty {
                name,
                value: PropertyValue::Float(value),
            },
            PropertyEntry::Vector { name, value } => ShaderProperty {
                name,
                value: PropertyValue::Vector(Vec4::from(value)),
            },
        };
        properties.push(property);
    }

    Ok(Material {
        name: name.to_string(),
        shader: Shader {
            name: entry.shader,
            properties,
        },
        texture_scale: Vec2::from(entry.texture_scale),
        texture_offset: Vec2::from(entry.texture_offset),
    })
}

fn build_node(entry: NodeEntry, tables: &Tables) -> Result<SceneNode> {
    let transform = Transform::new(
        Vec3::from(entry.position),
        Quat::from_array(entry.rotation).normalize(),
        Vec3::from(entry.scale),
    );

    let mut node = SceneNode::new(entry.name).with_transform(transform);
    node.active = entry.active;
    node.is_static = entry.is_static;

    if let Some(r) = entry.renderer {
        let mesh = r
            .mesh
            .map(|m| tables.meshes.get(&m).cloned().ok_or_else(|| missing("mesh", &m)))
            .transpose()?;
        let materials = r
            .materials
            .iter()
            .map(|m| match m {
                Some(m) => tables.materials.get(m).cloned().map(Some).ok_or_else(|| missing("material", m)),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;
        let bounds = mesh.as_deref().map(|m| world_bounds(m, &transform)).unwrap_or_default();

        node.capabilities.push(Capability::Renderable(Renderer {
            mesh,
            materials,
            lightmap_index: r.lightmap_index,
            lightmap_scale_offset: r.lightmap_scale_offset.map(Vec4::from).unwrap_or(IDENTITY_SCALE_OFFSET),
            bounds,
        }));
    }

    if entry.collider {
        node.capabilities.push(Capability::Collidable);
    }

    if let Some(probe) = entry.reflection_probe {
        let texture = probe.map(|t| tables.texture(&t)).transpose()?;
        node.capabilities.push(Capability::ReflectionProbe { texture });
    }

    if let Some(link) = entry.link {
        let defaults = LinkPortal::default();
        node.capabilities.push(Capability::Link(LinkPortal {
            url: link.url,
            title: link.title.unwrap_or(defaults.title),
            color: link.color.map(color).unwrap_or(defaults.color),
            draw_glow: link.draw_glow,
            draw_text: link.draw_text,
            auto_load: link.auto_load,
        }));
    }

    for child in entry.children {
        node.children.push(build_node(child, tables)?);
    }

    Ok(node)
}

/// World-space bounds of a mesh placed with `transform`
pub fn world_bounds(mesh: &MeshSource, transform: &Transform) -> Bounds {
    let mut bounds = Bounds::default();
    for v in &mesh.vertices {
        bounds.encapsulate_point(transform.transform_point(*v));
    }
    bounds
}
