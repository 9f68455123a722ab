//! glTF encoder implementation

use super::*;
use firebox_core::config::MeshFormat;
use firebox_core::services::{MeshData, MeshEncodeOptions, MeshEncoder};
use firebox_core::Error;
use glam::{Vec2, Vec3};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// glTF export errors
#[derive(Debug, thiserror::Error)]
pub enum GltfExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid mesh data: {0}")]
    InvalidMeshData(String),
}

pub type GltfResult<T> = Result<T, GltfExportError>;

/// Writes [`MeshData`] as glTF or GLB
#[derive(Debug, Default)]
pub struct GltfMeshEncoder {
    binary_data: Vec<u8>,
    accessors: Vec<Accessor>,
    buffer_views: Vec<BufferView>,
}

impl GltfMeshEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode one mesh; `output_path` carries the format extension
    pub fn export_mesh(&mut self, mesh: &MeshData, options: &MeshEncodeOptions, output_path: &Path) -> GltfResult<()> {
        validate(mesh)?;

        let buffer_uri = match options.format {
            MeshFormat::Gltf => Some(bin_file_name(output_path)),
            MeshFormat::Glb => None,
        };
        let gltf = self.build_gltf(mesh, options.swap_uv_channels, buffer_uri);

        match options.format {
            MeshFormat::Gltf => self.write_separate_files(&gltf, output_path)?,
            MeshFormat::Glb => self.write_glb(&gltf, output_path)?,
        }
        debug!(
            mesh = %mesh.name,
            path = %output_path.display(),
            vertices = mesh.vertices.len(),
            bytes = self.binary_data.len(),
            "wrote mesh"
        );
        Ok(())
    }

    fn build_gltf(&mut self, mesh: &MeshData, swap_uv_channels: bool, buffer_uri: Option<String>) -> Gltf {
        self.binary_data.clear();
        self.accessors.clear();
        self.buffer_views.clear();

        let mut attributes = BTreeMap::new();
        attributes.insert("POSITION".to_string(), self.add_positions(&mesh.vertices));
        if !mesh.normals.is_empty() {
            attributes.insert("NORMAL".to_string(), self.add_vec3(&mesh.normals));
        }

        let mut channels: Vec<&[Vec2]> = mesh.uvs.iter().map(Vec::as_slice).collect();
        if swap_uv_channels && channels.len() >= 2 {
            channels.swap(0, 1);
        }
        for (set, uvs) in channels.into_iter().enumerate() {
            attributes.insert(format!("TEXCOORD_{}", set), self.add_uvs(uvs));
        }

        let indices = self.add_indices(&mesh.triangles);

        let name = (!mesh.name.is_empty()).then(|| mesh.name.clone());
        Gltf {
            asset: Asset {
                version: "2.0".to_string(),
                generator: Some(format!("FireBox exporter {}", env!("CARGO_PKG_VERSION"))),
            },
            scene: Some(0),
            scenes: vec![Scene {
                name: Some("Scene".to_string()),
                nodes: vec![0],
            }],
            nodes: vec![Node {
                name: name.clone(),
                mesh: Some(0),
            }],
            meshes: vec![Mesh {
                name,
                primitives: vec![Primitive {
                    attributes,
                    indices: Some(indices),
                    material: Some(0),
                    mode: Some(MODE_TRIANGLES),
                }],
            }],
            materials: vec![Material {
                name: Some("DefaultMaterial".to_string()),
                pbr_metallic_roughness: Some(PbrMetallicRoughness {
                    base_color_factor: Some([1.0, 1.0, 1.0, 1.0]),
                    metallic_factor: Some(0.0),
                    roughness_factor: Some(1.0),
                }),
            }],
            accessors: self.accessors.clone(),
            buffer_views: self.buffer_views.clone(),
            buffers: vec![Buffer {
                uri: buffer_uri,
                byte_length: self.binary_data.len(),
            }],
        }
    }

    /// POSITION needs min/max bounds
    fn add_positions(&mut self, vertices: &[Vec3]) -> usize {
        let offset = self.binary_data.len();
        let (min, max) = vertices.iter().fold(
            (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
            |(min, max), v| (min.min(*v), max.max(*v)),
        );
        self.binary_data.extend_from_slice(bytemuck::cast_slice(vertices));
        self.add_accessor(
            offset,
            vertices.len(),
            "VEC3",
            COMPONENT_TYPE_FLOAT,
            Some((min.to_array().to_vec(), max.to_array().to_vec())),
            TARGET_ARRAY_BUFFER,
        )
    }

    fn add_vec3(&mut self, values: &[Vec3]) -> usize {
        let offset = self.binary_data.len();
        self.binary_data.extend_from_slice(bytemuck::cast_slice(values));
        self.add_accessor(offset, values.len(), "VEC3", COMPONENT_TYPE_FLOAT, None, TARGET_ARRAY_BUFFER)
    }

    fn add_uvs(&mut self, uvs: &[Vec2]) -> usize {
        let offset = self.binary_data.len();
        self.binary_data.extend_from_slice(bytemuck::cast_slice(uvs));
        self.add_accessor(offset, uvs.len(), "VEC2", COMPONENT_TYPE_FLOAT, None, TARGET_ARRAY_BUFFER)
    }

    fn add_indices(&mut self, triangles: &[u32]) -> usize {
        let offset = self.binary_data.len();
        self.binary_data.extend_from_slice(bytemuck::cast_slice(triangles));
        self.add_accessor(
            offset,
            triangles.len(),
            "SCALAR",
            COMPONENT_TYPE_UNSIGNED_INT,
            None,
            TARGET_ELEMENT_ARRAY_BUFFER,
        )
    }

    /// Add accessor and buffer view over the bytes written since `offset`
    fn add_accessor(
        &mut self,
        offset: usize,
        count: usize,
        accessor_type: &str,
        component_type: u32,
        bounds: Option<(Vec<f32>, Vec<f32>)>,
        target: u32,
    ) -> usize {
        let byte_length = self.binary_data.len() - offset;

        let buffer_view_index = self.buffer_views.len();
        self.buffer_views.push(BufferView {
            buffer: 0,
            byte_offset: Some(offset),
            byte_length,
            target: Some(target),
        });

        let (min, max) = bounds.unzip();
        let accessor_index = self.accessors.len();
        self.accessors.push(Accessor {
            buffer_view: Some(buffer_view_index),
            component_type,
            count,
            accessor_type: accessor_type.to_string(),
            max,
            min,
        });
        accessor_index
    }

    /// Write `.gltf` JSON plus the sidecar `.bin`
    fn write_separate_files(&self, gltf: &Gltf, output_path: &Path) -> GltfResult<()> {
        let json = serde_json::to_string(gltf)?;
        std::fs::write(output_path, json)?;
        std::fs::write(output_path.with_extension("bin"), &self.binary_data)?;
        Ok(())
    }

    /// Write GLB (binary glTF)
    fn write_glb(&self, gltf: &Gltf, output_path: &Path) -> GltfResult<()> {
        let json = serde_json::to_string(gltf)?;
        let json_padding = (4 - json.len() % 4) % 4;
        let bin_padding = (4 - self.binary_data.len() % 4) % 4;
        let json_chunk = json.len() + json_padding;
        let bin_chunk = self.binary_data.len() + bin_padding;
        let total_len = 12 + 8 + json_chunk + 8 + bin_chunk;

        let mut file = std::io::BufWriter::new(std::fs::File::create(output_path)?);

        file.write_all(GLB_MAGIC)?;
        file.write_all(&GLB_VERSION.to_le_bytes())?;
        file.write_all(&(total_len as u32).to_le_bytes())?;

        file.write_all(&(json_chunk as u32).to_le_bytes())?;
        file.write_all(&GLB_CHUNK_JSON.to_le_bytes())?;
        file.write_all(json.as_bytes())?;
        file.write_all(&[0x20; 3][..json_padding])?;

        file.write_all(&(bin_chunk as u32).to_le_bytes())?;
        file.write_all(&GLB_CHUNK_BIN.to_le_bytes())?;
        file.write_all(&self.binary_data)?;
        file.write_all(&[0x00; 3][..bin_padding])?;

        file.flush()?;
        Ok(())
    }
}

impl MeshEncoder for GltfMeshEncoder {
    fn encode(&mut self, mesh: &MeshData, options: &MeshEncodeOptions, path: &Path) -> firebox_core::Result<()> {
        self.export_mesh(mesh, options, path)
            .map_err(|e| Error::encoding(&mesh.name, e))
    }
}

fn bin_file_name(output_path: &Path) -> String {
    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mesh".to_string());
    format!("{}.bin", stem)
}

fn validate(mesh: &MeshData) -> GltfResult<()> {
    let count = mesh.vertices.len();
    if count == 0 {
        return Err(GltfExportError::InvalidMeshData("no vertices".to_string()));
    }
    if mesh.triangles.is_empty() || mesh.triangles.len() % 3 != 0 {
        return Err(GltfExportError::InvalidMeshData(format!(
            "{} indices do not form triangles",
            mesh.triangles.len()
        )));
    }
    if let Some(&index) = mesh.triangles.iter().find(|&&i| i as usize >= count) {
        return Err(GltfExportError::InvalidMeshData(format!(
            "index {} out of range for {} vertices",
            index, count
        )));
    }
    if !mesh.normals.is_empty() && mesh.normals.len() != count {
        return Err(GltfExportError::InvalidMeshData(format!(
            "{} normals for {} vertices",
            mesh.normals.len(),
            count
        )));
    }
    if let Some((set, uvs)) = mesh.uvs.iter().enumerate().find(|(_, uvs)| uvs.len() != count) {
        return Err(GltfExportError::InvalidMeshData(format!(
            "UV channel {} has {} entries for {} vertices",
            set,
            uvs.len(),
            count
        )));
    }
    Ok(())
}
