//! Scene walker
//!
//! Depth-first, pre-order traversal of the host hierarchy that turns nodes
//! into flat [`SceneObject`] records and collects portals, probe counts and
//! the scene bounds.

use std::sync::Arc;

use firebox_core::config::ExportConfig;
use firebox_core::scene::{Capability, LinkPortal, Material, MeshSource, Renderer, Scene, SceneNode};
use firebox_core::types::{Bounds, Transform};
use firebox_core::{Error, Result};
use glam::Vec4;
use tracing::{debug, trace, warn};

/// Far plane never goes below this distance
pub const MIN_FAR_DISTANCE: f32 = 500.0;

/// Factor applied to the scene diagonal to get the far plane
pub const FAR_DISTANCE_FACTOR: f32 = 1.3;

/// One exportable renderer instance
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub name: String,
    pub transform: Transform,
    pub mesh: Arc<MeshSource>,
    /// Primary material (first slot); never absent on an exportable object
    pub material: Arc<Material>,
    /// All material slots, one per submesh
    pub materials: Vec<Option<Arc<Material>>>,
    pub lightmap_index: i32,
    pub lightmap_scale_offset: Vec4,
    pub has_collider: bool,
    pub is_static: bool,
}

impl SceneObject {
    pub fn is_lightmapped(&self) -> bool {
        self.lightmap_index >= 0
    }

    /// Material for `submesh`, falling back to the primary material
    pub fn submesh_material(&self, submesh: usize) -> &Arc<Material> {
        self.materials
            .get(submesh)
            .and_then(Option::as_ref)
            .unwrap_or(&self.material)
    }
}

/// Portal claimed by the link extractor
#[derive(Debug, Clone)]
pub struct LinkObject {
    pub name: String,
    pub portal: LinkPortal,
    pub transform: Transform,
}

/// Everything a walk produced
#[derive(Debug, Clone, Default)]
pub struct WalkResult {
    pub objects: Vec<SceneObject>,
    pub links: Vec<LinkObject>,
    pub reflection_probes: usize,
    /// Renderers dropped for a missing mesh or material, or by the dynamic policy
    pub skipped: usize,
    pub bounds: Bounds,
}

impl WalkResult {
    /// View far-plane distance derived from the scene bounds
    pub fn far_distance(&self) -> f32 {
        (self.bounds.diagonal() * FAR_DISTANCE_FACTOR).max(MIN_FAR_DISTANCE)
    }
}

/// Walks a scene with the inclusion policy of an [`ExportConfig`]
pub struct SceneWalker<'a> {
    config: &'a ExportConfig,
}

impl<'a> SceneWalker<'a> {
    pub fn new(config: &'a ExportConfig) -> Self {
        Self { config }
    }

    pub fn walk(&self, scene: &Scene) -> WalkResult {
        self.traverse(&scene.roots)
    }

    pub fn traverse(&self, roots: &[SceneNode]) -> WalkResult {
        let mut result = WalkResult::default();
        for root in roots {
            self.visit(root, &mut result);
        }
        debug!(
            objects = result.objects.len(),
            links = result.links.len(),
            probes = result.reflection_probes,
            skipped = result.skipped,
            "scene walk finished"
        );
        result
    }

    fn visit(&self, node: &SceneNode, result: &mut WalkResult) {
        if self.config.ignore_inactive && !node.active {
            trace!(node = %node.name, "pruned inactive subtree");
            return;
        }

        if let Some(portal) = node.exclusive() {
            result.links.push(LinkObject {
                name: node.name.clone(),
                portal: portal.clone(),
                transform: node.transform,
            });
        } else {
            self.classify(node, result);
        }

        for child in &node.children {
            self.visit(child, result);
        }
    }

    fn classify(&self, node: &SceneNode, result: &mut WalkResult) {
        for capability in &node.capabilities {
            match capability {
                Capability::Renderable(renderer) => {
                    let (mesh, material) = match renderer_parts(node, renderer) {
                        Ok(parts) => parts,
                        Err(err) => {
                            warn!(node = %node.name, error = %err, "renderer skipped");
                            result.skipped += 1;
                            continue;
                        }
                    };
                    if !node.is_static && !self.config.export_dynamic {
                        trace!(node = %node.name, "skipped dynamic object");
                        result.skipped += 1;
                        continue;
                    }

                    result.bounds.encapsulate(&renderer.bounds);
                    result.objects.push(SceneObject {
                        name: node.name.clone(),
                        transform: node.transform,
                        mesh: Arc::clone(mesh),
                        material: Arc::clone(material),
                        materials: renderer.materials.clone(),
                        lightmap_index: renderer.lightmap_index,
                        lightmap_scale_offset: renderer.lightmap_scale_offset,
                        has_collider: node.has_collider(),
                        is_static: node.is_static,
                    });
                }
                Capability::ReflectionProbe { .. } => result.reflection_probes += 1,
                Capability::Collidable | Capability::Link(_) => {}
            }
        }
    }
}

/// Mesh and primary material of a renderer, or the skippable reason it has none
fn renderer_parts<'r>(node: &SceneNode, renderer: &'r Renderer) -> Result<(&'r Arc<MeshSource>, &'r Arc<Material>)> {
    let Some(mesh) = &renderer.mesh else {
        return Err(Error::invalid_mesh(&node.name, "renderer has no mesh"));
    };
    let Some(material) = renderer.primary_material() else {
        return Err(Error::MissingMaterial {
            object: node.name.clone(),
        });
    };
    Ok((mesh, material))
}

#[cfg(test)]
mod tests {
    use super::*;
    use firebox_core::scene::{Renderer, Shader};
    use glam::Vec3;

    fn renderable(name: &str, position: Vec3) -> SceneNode {
        let mesh = Arc::new(MeshSource::default());
        let material = Arc::new(Material::new("Mat", Shader::default()));
        let bounds = Bounds::from_center_size(position, Vec3::ONE);
        SceneNode::new(name)
            .with_transform(Transform::from_position(position))
            .with_capability(Capability::Renderable(Renderer::new(mesh, material).with_bounds(bounds)))
    }

    #[test]
    fn test_preorder_and_inactive_pruning() {
        let mut hidden = renderable("Hidden", Vec3::ZERO).with_child(renderable("HiddenChild", Vec3::ZERO));
        hidden.active = false;
        let root = renderable("Root", Vec3::ZERO)
            .with_child(renderable("A", Vec3::X).with_child(renderable("A1", Vec3::Y)))
            .with_child(hidden)
            .with_child(renderable("B", Vec3::Z));

        let config = ExportConfig::default();
        let result = SceneWalker::new(&config).traverse(&[root]);
        let names: Vec<_> = result.objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["Root", "A", "A1", "B"]);
    }

    #[test]
    fn test_link_claims_node_but_children_are_visited() {
        let portal = renderable("Portal", Vec3::ZERO)
            .with_capability(Capability::Link(LinkPortal::default()))
            .with_child(renderable("Behind", Vec3::ZERO));

        let config = ExportConfig::default();
        let result = SceneWalker::new(&config).traverse(&[portal]);
        assert_eq!(result.links.len(), 1);
        assert_eq!(result.objects.len(), 1);
        assert_eq!(result.objects[0].name, "Behind");
    }

    #[test]
    fn test_missing_material_and_dynamic_policy() {
        let mut no_material = renderable("NoMat", Vec3::ZERO);
        if let Some(Capability::Renderable(r)) = no_material.capabilities.first_mut() {
            r.materials = vec![None];
        }
        let mut dynamic = renderable("Dynamic", Vec3::ZERO);
        dynamic.is_static = false;

        let mut config = ExportConfig::default();
        config.export_dynamic = false;
        let result = SceneWalker::new(&config).traverse(&[no_material, dynamic]);
        assert!(result.objects.is_empty());
        assert_eq!(result.skipped, 2);
    }

    #[test]
    fn test_renderer_parts_reports_the_missing_piece() {
        let mut renderer = Renderer::new(Arc::new(MeshSource::default()), Arc::new(Material::new("Mat", Shader::default())));
        let node = SceneNode::new("Crate");
        assert!(renderer_parts(&node, &renderer).is_ok());

        renderer.materials = vec![None];
        let err = renderer_parts(&node, &renderer).unwrap_err();
        assert!(matches!(&err, Error::MissingMaterial { object } if object == "Crate"));
        assert!(err.is_skippable());

        renderer.mesh = None;
        let err = renderer_parts(&node, &renderer).unwrap_err();
        assert!(matches!(err, Error::InvalidMesh { .. }));
    }

    #[test]
    fn test_far_distance() {
        let config = ExportConfig::default();
        let small = SceneWalker::new(&config).traverse(&[renderable("A", Vec3::ZERO)]);
        assert_eq!(small.far_distance(), 500.0);

        let big = SceneWalker::new(&config).traverse(&[
            renderable("A", Vec3::ZERO),
            renderable("B", Vec3::new(1000.0, 0.0, 0.0)),
        ]);
        assert!((big.far_distance() - 1001.0 * 1.3).abs() < 0.5);
    }

    #[test]
    fn test_probes_counted() {
        let node = SceneNode::new("Probe").with_capability(Capability::ReflectionProbe { texture: None });
        let config = ExportConfig::default();
        assert_eq!(SceneWalker::new(&config).traverse(&[node]).reflection_probes, 1);
    }
}
