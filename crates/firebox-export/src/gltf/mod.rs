//! glTF 2.0 mesh encoder
//!
//! Writes merged room meshes as glTF (JSON + BIN) or GLB

mod exporter;

pub use exporter::{GltfExportError, GltfMeshEncoder, GltfResult};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// glTF 2.0 root structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gltf {
    pub asset: Asset,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub scenes: Vec<Scene>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub nodes: Vec<Node>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub meshes: Vec<Mesh>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub materials: Vec<Material>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub accessors: Vec<Accessor>,
    #[serde(skip_serializing_if = "Vec::is_empty", default, rename = "bufferViews")]
    pub buffer_views: Vec<BufferView>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub buffers: Vec<Buffer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub nodes: Vec<usize>,
}

/// Room meshes are placed by the room document, so nodes carry no transform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mesh {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
}

/// Attribute names sorted so the JSON is stable between runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Primitive {
    pub attributes: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indices: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "pbrMetallicRoughness")]
    pub pbr_metallic_roughness: Option<PbrMetallicRoughness>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PbrMetallicRoughness {
    #[serde(skip_serializing_if = "Option::is_none", rename = "baseColorFactor")]
    pub base_color_factor: Option<[f32; 4]>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "metallicFactor")]
    pub metallic_factor: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "roughnessFactor")]
    pub roughness_factor: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Accessor {
    #[serde(skip_serializing_if = "Option::is_none", rename = "bufferView")]
    pub buffer_view: Option<usize>,
    #[serde(rename = "componentType")]
    pub component_type: u32,
    pub count: usize,
    #[serde(rename = "type")]
    pub accessor_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferView {
    pub buffer: usize,
    #[serde(skip_serializing_if = "Option::is_none", rename = "byteOffset")]
    pub byte_offset: Option<usize>,
    #[serde(rename = "byteLength")]
    pub byte_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<u32>,
}

/// `uri` is absent for the GLB-embedded buffer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Buffer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(rename = "byteLength")]
    pub byte_length: usize,
}

// glTF component type constants
pub const COMPONENT_TYPE_UNSIGNED_INT: u32 = 5125;
pub const COMPONENT_TYPE_FLOAT: u32 = 5126;

// glTF buffer view target constants
pub const TARGET_ARRAY_BUFFER: u32 = 34962;
pub const TARGET_ELEMENT_ARRAY_BUFFER: u32 = 34963;

// glTF primitive mode constants
pub const MODE_TRIANGLES: u32 = 4;

/// GLB container constants
pub const GLB_MAGIC: &[u8; 4] = b"glTF";
pub const GLB_VERSION: u32 = 2;
pub const GLB_CHUNK_JSON: u32 = 0x4E4F_534A;
pub const GLB_CHUNK_BIN: u32 = 0x004E_4942;
