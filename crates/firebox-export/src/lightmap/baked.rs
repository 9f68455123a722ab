//! Per-object strategies: every lightmapped room object gets its own image,
//! sized by the share of the atlas it covers

use firebox_core::config::LightmapMode;
use firebox_core::scene::{LightmapAtlas, IDENTITY_SCALE_OFFSET};
use firebox_core::services::{ColorSpace, DrawCall, DrawGeometry, Shading};
use firebox_core::types::Color;
use firebox_core::Result;
use image::RgbaImage;
use std::sync::Arc;
use tracing::{debug, info};

use super::{LightmapJob, LightmapOutcome, LightmapStrategy};
use crate::bake::{bake_resolution, exposure, lightmap_footprint, RenderPass};
use crate::material;

/// Diffuse and lightmap composited into the object's diffuse image
pub struct BakedMaterial;

impl LightmapStrategy for BakedMaterial {
    fn mode(&self) -> LightmapMode {
        LightmapMode::BakedMaterial
    }

    fn apply(&self, job: &mut LightmapJob<'_>) -> Result<LightmapOutcome> {
        bake_per_room(job, Composite::DiffuseAndLightmap)
    }
}

/// Lightmap contribution alone, one image per object
pub struct Unpacked;

impl LightmapStrategy for Unpacked {
    fn mode(&self) -> LightmapMode {
        LightmapMode::Unpacked
    }

    fn apply(&self, job: &mut LightmapJob<'_>) -> Result<LightmapOutcome> {
        bake_per_room(job, Composite::LightmapOnly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Composite {
    DiffuseAndLightmap,
    LightmapOnly,
}

/// Name of the image baked for a mesh
pub fn baked_image_name(mesh_id: &str) -> String {
    format!("{}_Baked", mesh_id)
}

fn bake_per_room(job: &mut LightmapJob<'_>, composite: Composite) -> Result<LightmapOutcome> {
    let mut outcome = LightmapOutcome::default();

    for (index, rooms) in job.rooms_by_atlas() {
        let atlas = match job.atlas(index) {
            Ok(atlas) => atlas,
            Err(err) => {
                outcome.skip(err, rooms.len())?;
                continue;
            }
        };

        let mut max_resolution = job.config.lightmap_max_resolution;
        if composite == Composite::DiffuseAndLightmap {
            if let Some(width) = atlas.width() {
                max_resolution = max_resolution.min(width.max(1));
            }
        }

        for room in rooms {
            let name = baked_image_name(&job.rooms[room].mesh_id);
            let pixels = if job.html_only() {
                None
            } else {
                match render_room(job, room, &atlas, max_resolution, composite) {
                    Ok(pixels) => Some(pixels),
                    Err(err) => {
                        outcome.skip(err, 1)?;
                        continue;
                    }
                }
            };

            let id = job.registry.register_generated_image(&name, pixels).id.clone();
            let target = &mut job.rooms[room];
            match composite {
                Composite::DiffuseAndLightmap => {
                    // the bake carries color and tiling
                    target.image_id = Some(id);
                    target.color = None;
                    target.tiling = None;
                }
                Composite::LightmapOnly => target.lightmap_id = Some(id),
            }
            outcome.images += 1;
        }
    }

    info!(mode = ?composite, images = outcome.images, skipped = outcome.skipped, "baked lightmaps");
    Ok(outcome)
}

fn render_room(
    job: &mut LightmapJob<'_>,
    room: usize,
    atlas: &Arc<LightmapAtlas>,
    max_resolution: u32,
    composite: Composite,
) -> Result<RgbaImage> {
    let group = &job.groups[job.rooms[room].group];
    let footprint = match group.primary(job.objects) {
        Some(object) if !group.merged => lightmap_footprint(object.lightmap_scale_offset),
        _ => 1.0,
    };
    let size = bake_resolution(footprint, max_resolution);
    let exposure = exposure(job.config);

    let mut calls = Vec::new();
    for &member in &group.members {
        let object = &job.objects[member];
        let target_scale_offset = if group.merged {
            object.lightmap_scale_offset
        } else {
            IDENTITY_SCALE_OFFSET
        };

        for submesh in 0..object.mesh.submeshes.len() {
            let shading = match composite {
                Composite::DiffuseAndLightmap => {
                    let extracted = material::extract(object.submesh_material(submesh));
                    Shading::LightmapComposite {
                        lightmap: Arc::clone(atlas),
                        lightmap_scale_offset: object.lightmap_scale_offset,
                        diffuse: extracted.texture,
                        color: extracted.color.unwrap_or(Color::WHITE),
                        exposure,
                    }
                }
                Composite::LightmapOnly => Shading::LightmapOnly {
                    lightmap: Arc::clone(atlas),
                    lightmap_scale_offset: object.lightmap_scale_offset,
                    exposure,
                },
            };
            calls.push(DrawCall {
                geometry: DrawGeometry::Mesh {
                    mesh: Arc::clone(&object.mesh),
                    submesh,
                    world: object.transform.matrix(),
                    target_scale_offset,
                },
                shading,
            });
        }
    }

    debug!(mesh = %job.rooms[room].mesh_id, size, draws = calls.len(), "baking room object");
    let mut pass = RenderPass::begin(&mut *job.baker, size, size, ColorSpace::Srgb)?;
    for call in &calls {
        pass.draw(call)?;
    }
    pass.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use firebox_core::config::{ExportConfig, MergePolicy};
    use firebox_core::scene::{Material, MeshSource, Scene, Shader};
    use firebox_core::services::{RenderTargetId, TextureBaker};
    use firebox_core::types::Transform;
    use glam::{Vec3, Vec4};
    use image::Rgba32FImage;

    use crate::merge::group_objects;
    use crate::registry::AssetRegistry;
    use crate::room::RoomObject;
    use crate::walker::SceneObject;

    #[derive(Default)]
    struct RecordingBaker {
        events: Vec<String>,
        shading: Vec<&'static str>,
    }

    impl TextureBaker for RecordingBaker {
        fn acquire(&mut self, width: u32, height: u32, _: ColorSpace) -> Result<RenderTargetId> {
            self.events.push(format!("acquire {}x{}", width, height));
            Ok(RenderTargetId(1))
        }
        fn clear(&mut self, _: RenderTargetId, _: Color) -> Result<()> {
            self.events.push("clear".into());
            Ok(())
        }
        fn draw(&mut self, _: RenderTargetId, call: &DrawCall) -> Result<()> {
            self.events.push("draw".into());
            self.shading.push(match call.shading {
                Shading::LightmapComposite { .. } => "composite",
                Shading::LightmapOnly { .. } => "lightmap",
                _ => "other",
            });
            Ok(())
        }
        fn read_back(&mut self, _: RenderTargetId) -> Result<RgbaImage> {
            self.events.push("read".into());
            Ok(RgbaImage::new(2, 2))
        }
        fn release(&mut self, _: RenderTargetId) {
            self.events.push("release".into());
        }
    }

    fn object(name: &str) -> SceneObject {
        let material = Arc::new(Material::new("Mat", Shader::default()));
        SceneObject {
            name: name.into(),
            transform: Transform::IDENTITY,
            mesh: Arc::new(MeshSource {
                vertices: vec![Vec3::ZERO; 3],
                submeshes: vec![vec![0, 1, 2], vec![2, 1, 0]],
                ..Default::default()
            }),
            material: Arc::clone(&material),
            materials: vec![Some(material)],
            lightmap_index: 0,
            lightmap_scale_offset: Vec4::new(0.5, 0.5, 0.25, 0.25),
            has_collider: false,
            is_static: true,
        }
    }

    fn run(strategy: &dyn LightmapStrategy, atlas_width: u32, html_only: bool) -> (Vec<RoomObject>, RecordingBaker) {
        let mut config = ExportConfig::default();
        config.html_only = html_only;
        let mut atlas = LightmapAtlas::new(0, "unused.exr");
        atlas.hdr = Some(Rgba32FImage::new(atlas_width, atlas_width));
        let scene = Scene {
            lightmaps: vec![Arc::new(atlas)],
            ..Default::default()
        };
        let objects = vec![object("Wall")];
        let groups = group_objects(&objects, MergePolicy::PerObject);
        let mut rooms = vec![RoomObject::new("Wall", 0, Transform::IDENTITY)];
        rooms[0].color = Some(Color::BLACK);
        let mut registry = AssetRegistry::new();
        let mut baker = RecordingBaker::default();

        let mut job = LightmapJob {
            config: &config,
            scene: &scene,
            objects: &objects,
            groups: &groups,
            rooms: &mut rooms,
            registry: &mut registry,
            baker: &mut baker,
        };
        strategy.apply(&mut job).unwrap();
        (rooms, baker)
    }

    #[test]
    fn test_baked_material_protocol_and_cap() {
        let (rooms, baker) = run(&BakedMaterial, 512, false);

        // the atlas width caps the maximum: 0.375 of 512 rounds up to 256
        assert_eq!(
            baker.events,
            ["acquire 256x256", "clear", "draw", "draw", "read", "release"]
        );
        assert_eq!(baker.shading, ["composite", "composite"]);
        assert_eq!(rooms[0].image_id.as_deref(), Some("Wall_Baked"));
        assert_eq!(rooms[0].color, None);
        assert_eq!(rooms[0].lightmap_id, None);
    }

    #[test]
    fn test_unpacked_uses_full_resolution() {
        let (rooms, baker) = run(&Unpacked, 512, false);

        assert_eq!(baker.events[0], "acquire 1024x1024");
        assert_eq!(baker.shading, ["lightmap", "lightmap"]);
        assert_eq!(rooms[0].lightmap_id.as_deref(), Some("Wall_Baked"));
        assert_eq!(rooms[0].image_id, None);
    }

    #[test]
    fn test_html_only_registers_without_rendering() {
        let (rooms, baker) = run(&Unpacked, 512, true);
        assert!(baker.events.is_empty());
        assert_eq!(rooms[0].lightmap_id.as_deref(), Some("Wall_Baked"));
    }
}
