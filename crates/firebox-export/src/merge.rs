//! Mesh merge engine
//!
//! Groups scene objects by a [`MergePolicy`] and concatenates each group's
//! geometry into one [`MeshData`], offsetting triangle indices and remapping
//! lightmap UVs into the shared atlas.

use std::sync::Arc;

use firebox_core::config::MergePolicy;
use firebox_core::scene::MeshSource;
use firebox_core::services::MeshData;
use firebox_core::types::Transform;
use firebox_core::{Error, Result};
use glam::{Vec2, Vec3, Vec4};
use tracing::{debug, warn};

use crate::registry::GroupKey;
use crate::walker::SceneObject;

/// Scene objects that become one exported mesh
#[derive(Debug, Clone)]
pub struct MergeGroup {
    pub key: GroupKey,
    /// Indices into the walked objects, in discovery order
    pub members: Vec<usize>,
    /// Atlas shared by the members, -1 when not lightmapped
    pub lightmap_index: i32,
    /// Geometry is merged in world space with lightmap UVs remapped into the
    /// atlas; otherwise the group is one object kept in object space
    pub merged: bool,
}

impl MergeGroup {
    pub fn is_lightmapped(&self) -> bool {
        self.lightmap_index >= 0
    }

    /// Preferred mesh id
    pub fn name(&self, objects: &[SceneObject]) -> String {
        match &self.key {
            GroupKey::Object(index) => objects.get(*index).map(|o| o.name.clone()).unwrap_or_default(),
            GroupKey::Lightmap(index) => format!("Mesh{}", index),
            GroupKey::Material { material, .. } => material.name.clone(),
        }
    }

    /// First member; every group has at least one
    pub fn primary<'a>(&self, objects: &'a [SceneObject]) -> Option<&'a SceneObject> {
        self.members.first().and_then(|&i| objects.get(i))
    }
}

/// Partition objects into merge groups, ordered by first member
pub fn group_objects(objects: &[SceneObject], policy: MergePolicy) -> Vec<MergeGroup> {
    let mut groups: Vec<MergeGroup> = Vec::new();

    for (index, object) in objects.iter().enumerate() {
        let (key, merged) = match policy {
            MergePolicy::PerLightmapId if object.is_lightmapped() => {
                (GroupKey::Lightmap(object.lightmap_index), true)
            }
            MergePolicy::PerMaterial => (
                GroupKey::Material {
                    material: Arc::clone(&object.material),
                    lightmap: object.lightmap_index,
                },
                true,
            ),
            _ => (GroupKey::Object(index), false),
        };

        match groups.iter_mut().find(|g| g.key == key) {
            Some(group) => group.members.push(index),
            None => groups.push(MergeGroup {
                key,
                members: vec![index],
                lightmap_index: object.lightmap_index,
                merged,
            }),
        }
    }

    debug!(policy = ?policy, objects = objects.len(), groups = groups.len(), "grouped objects");
    groups
}

/// One contributing instance of a group
#[derive(Debug, Clone, Copy)]
pub struct MergeInstance<'a> {
    pub name: &'a str,
    pub mesh: &'a MeshSource,
    /// World transform; `None` keeps the geometry in object space
    pub transform: Option<&'a Transform>,
    /// Atlas region the lightmap UVs are remapped into
    pub lightmap_scale_offset: Option<Vec4>,
}

impl<'a> MergeInstance<'a> {
    /// Instance of `object` as the given group merges it
    pub fn of(object: &'a SceneObject, group: &MergeGroup) -> Self {
        Self {
            name: &object.name,
            mesh: &object.mesh,
            transform: group.merged.then_some(&object.transform),
            lightmap_scale_offset: (group.merged && object.is_lightmapped())
                .then_some(object.lightmap_scale_offset),
        }
    }
}

/// Result of building a group
#[derive(Debug)]
pub struct MergeOutput {
    pub mesh: MeshData,
    /// Instances that made it into the mesh
    pub merged: usize,
    /// Instances rejected as invalid
    pub skipped: Vec<Error>,
}

/// Project a lightmap UV into its atlas region
pub fn remap_lightmap_uv(uv: Vec2, scale_offset: Vec4) -> Vec2 {
    Vec2::new(uv.x * scale_offset.x + scale_offset.z, uv.y * scale_offset.y + scale_offset.w)
}

/// Reject meshes that would produce out-of-range indices
pub fn validate_mesh(name: &str, mesh: &MeshSource) -> Result<()> {
    if mesh.vertices.is_empty() {
        return Err(Error::invalid_mesh(name, "no vertices"));
    }
    let Some(max_index) = mesh.max_index() else {
        return Err(Error::invalid_mesh(name, "no triangles"));
    };
    let required = max_index as usize + 1;
    if required > mesh.vertices.len() {
        return Err(Error::invalid_mesh(
            name,
            format!("index {} out of range for {} vertices", max_index, mesh.vertices.len()),
        ));
    }
    if mesh.normals.len() < required {
        return Err(Error::invalid_mesh(
            name,
            format!("{} normals for max index {}", mesh.normals.len(), max_index),
        ));
    }
    Ok(())
}

/// Concatenate the instances into one mesh
///
/// Invalid instances are skipped with a warning; the group fails only when
/// no instance is left.
pub fn build_group(name: &str, instances: &[MergeInstance<'_>], lightmap_uv: bool) -> Result<MergeOutput> {
    let mut mesh = MeshData {
        name: name.to_string(),
        ..Default::default()
    };
    let mut uv0: Vec<Vec2> = Vec::new();
    let mut uv1: Vec<Vec2> = Vec::new();
    let mut merged = 0;
    let mut skipped = Vec::new();

    for instance in instances {
        let source = instance.mesh;
        if let Err(err) = validate_mesh(instance.name, source) {
            warn!(group = name, instance = instance.name, error = %err, "skipping invalid mesh instance");
            skipped.push(err);
            continue;
        }

        let offset = mesh.vertices.len() as u32;
        let count = source.vertices.len();

        match instance.transform {
            Some(transform) => {
                mesh.vertices.extend(source.vertices.iter().map(|v| transform.transform_point(*v)));
                mesh.normals.extend(
                    (0..count).map(|i| source.normals.get(i).map_or(Vec3::ZERO, |n| transform.transform_direction(*n))),
                );
            }
            None => {
                mesh.vertices.extend_from_slice(&source.vertices);
                mesh.normals.extend((0..count).map(|i| source.normals.get(i).copied().unwrap_or(Vec3::ZERO)));
            }
        }

        mesh.triangles.extend(source.triangles().into_iter().map(|t| t + offset));

        uv0.extend(channel(&source.uv0, count));
        if lightmap_uv {
            let lightmap = channel(source.lightmap_uvs(), count);
            match instance.lightmap_scale_offset {
                Some(so) => uv1.extend(lightmap.map(|uv| remap_lightmap_uv(uv, so))),
                None => uv1.extend(lightmap),
            }
        }

        merged += 1;
    }

    if merged == 0 {
        return Err(Error::invalid_mesh(name, "no valid instances"));
    }

    mesh.uvs.push(uv0);
    if lightmap_uv {
        mesh.uvs.push(uv1);
    }

    debug!(
        group = name,
        instances = merged,
        vertices = mesh.vertices.len(),
        triangles = mesh.triangles.len() / 3,
        "built group mesh"
    );

    Ok(MergeOutput { mesh, merged, skipped })
}

/// UV channel of exactly `count` entries; a missing or short channel is zeros
fn channel(uvs: &[Vec2], count: usize) -> impl Iterator<Item = Vec2> + '_ {
    let usable = uvs.len() == count;
    (0..count).map(move |i| if usable { uvs[i] } else { Vec2::ZERO })
}

#[cfg(test)]
mod tests {
    use super::*;
    use firebox_core::scene::{Material, Shader};
    use glam::Quat;
    use proptest::prelude::*;

    fn triangle() -> MeshSource {
        MeshSource {
            name: "Tri".into(),
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            normals: vec![Vec3::Z; 3],
            uv0: vec![Vec2::ZERO, Vec2::X, Vec2::Y],
            uv1: vec![Vec2::splat(0.5); 3],
            submeshes: vec![vec![0, 1, 2]],
        }
    }

    fn object(name: &str, lightmap: i32, material: &Arc<Material>) -> SceneObject {
        SceneObject {
            name: name.into(),
            transform: Transform::IDENTITY,
            mesh: Arc::new(triangle()),
            material: Arc::clone(material),
            materials: vec![Some(Arc::clone(material))],
            lightmap_index: lightmap,
            lightmap_scale_offset: Vec4::new(0.5, 0.5, 0.25, 0.25),
            has_collider: false,
            is_static: true,
        }
    }

    #[test]
    fn test_remap_lightmap_uv() {
        let uv = remap_lightmap_uv(Vec2::new(0.5, 0.5), Vec4::new(0.5, 0.5, 0.25, 0.25));
        assert_eq!(uv, Vec2::new(0.5, 0.5));
    }

    #[test]
    fn test_index_offsets_and_world_space() {
        let mesh = triangle();
        let moved = Transform::new(Vec3::new(10.0, 0.0, 0.0), Quat::IDENTITY, Vec3::splat(2.0));
        let instances = [
            MergeInstance { name: "A", mesh: &mesh, transform: Some(&Transform::IDENTITY), lightmap_scale_offset: None },
            MergeInstance { name: "B", mesh: &mesh, transform: Some(&moved), lightmap_scale_offset: None },
        ];

        let out = build_group("Group", &instances, false).unwrap();
        assert_eq!(out.merged, 2);
        assert_eq!(out.mesh.triangles, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(out.mesh.vertices[4], Vec3::new(12.0, 0.0, 0.0));
        assert_eq!(out.mesh.normals.len(), out.mesh.vertices.len());
        assert_eq!(out.mesh.uvs.len(), 1);
    }

    #[test]
    fn test_invalid_instance_is_skipped() {
        let good = triangle();
        let mut bad = triangle();
        bad.normals.truncate(1);
        let instances = [
            MergeInstance { name: "Bad", mesh: &bad, transform: None, lightmap_scale_offset: None },
            MergeInstance { name: "Good", mesh: &good, transform: None, lightmap_scale_offset: None },
        ];

        let out = build_group("Group", &instances, true).unwrap();
        assert_eq!(out.merged, 1);
        assert_eq!(out.skipped.len(), 1);
        assert!(out.skipped[0].is_skippable());
        assert_eq!(out.mesh.triangles, vec![0, 1, 2]);

        let err = build_group("Empty", &instances[..1], true).unwrap_err();
        assert!(err.is_skippable());
    }

    #[test]
    fn test_uv_synthesis() {
        let mut mesh = triangle();
        mesh.uv0.clear();
        mesh.uv1.clear();
        let instances = [MergeInstance { name: "A", mesh: &mesh, transform: None, lightmap_scale_offset: None }];

        let out = build_group("A", &instances, true).unwrap();
        assert_eq!(out.mesh.uvs[0], vec![Vec2::ZERO; 3]);
        assert_eq!(out.mesh.uvs[1], vec![Vec2::ZERO; 3]);
    }

    #[test]
    fn test_grouping_policies() {
        let wall = Arc::new(Material::new("Wall", Shader::default()));
        let floor = Arc::new(Material::new("Floor", Shader::default()));
        let objects = vec![
            object("A", 0, &wall),
            object("B", 0, &floor),
            object("C", -1, &wall),
            object("D", 1, &wall),
        ];

        let per_object = group_objects(&objects, MergePolicy::PerObject);
        assert_eq!(per_object.len(), 4);
        assert!(per_object.iter().all(|g| !g.merged));

        let per_lightmap = group_objects(&objects, MergePolicy::PerLightmapId);
        assert_eq!(per_lightmap.len(), 3);
        assert_eq!(per_lightmap[0].members, vec![0, 1]);
        assert_eq!(per_lightmap[0].name(&objects), "Mesh0");
        assert!(!per_lightmap[1].merged);

        let per_material = group_objects(&objects, MergePolicy::PerMaterial);
        assert_eq!(per_material.len(), 4);
        assert_eq!(per_material[0].name(&objects), "Wall");
    }

    #[test]
    fn test_instance_of_merged_group_remaps() {
        let wall = Arc::new(Material::new("Wall", Shader::default()));
        let objects = vec![object("A", 0, &wall)];
        let groups = group_objects(&objects, MergePolicy::PerLightmapId);

        let instance = MergeInstance::of(&objects[0], &groups[0]);
        let out = build_group("Mesh0", &[instance], true).unwrap();
        assert_eq!(out.mesh.uvs[1][0], Vec2::new(0.5, 0.5));
        assert!(instance.transform.is_some());
    }

    fn arb_mesh() -> impl Strategy<Value = MeshSource> {
        (1usize..24).prop_flat_map(|count| {
            prop::collection::vec(prop::collection::vec(0..count as u32, 3), 1..12).prop_map(move |tris| {
                MeshSource {
                    name: "Arb".into(),
                    vertices: (0..count).map(|i| Vec3::splat(i as f32)).collect(),
                    normals: vec![Vec3::Y; count],
                    uv0: Vec::new(),
                    uv1: Vec::new(),
                    submeshes: vec![tris.into_iter().flatten().collect()],
                }
            })
        })
    }

    proptest! {
        #[test]
        fn merged_indices_stay_in_range(meshes in prop::collection::vec(arb_mesh(), 1..6)) {
            let instances: Vec<_> = meshes
                .iter()
                .map(|m| MergeInstance { name: "Arb", mesh: m, transform: Some(&Transform::IDENTITY), lightmap_scale_offset: None })
                .collect();

            let out = build_group("Prop", &instances, true).unwrap();
            let vertex_count = out.mesh.vertices.len();
            prop_assert_eq!(vertex_count, meshes.iter().map(|m| m.vertices.len()).sum::<usize>());
            prop_assert!(out.mesh.triangles.iter().all(|&t| (t as usize) < vertex_count));
            prop_assert_eq!(out.mesh.normals.len(), vertex_count);
            prop_assert!(out.mesh.uvs.iter().all(|uv| uv.len() == vertex_count));
        }
    }
}
