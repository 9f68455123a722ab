//! Export session
//!
//! Runs the pipeline stages strictly in order over one scene:
//!
//! 1. setup: validate the configuration, create the export root
//! 2. walk: flatten the hierarchy into scene objects and portals
//! 3. merge: build one mesh and one room object per merge group
//! 4. lightmap: skybox faces and the configured lightmap strategy
//! 5. encode: write every registered mesh and image
//! 6. serialize: write `index.html`
//!
//! Item failures are logged and counted; configuration failures abort the
//! run with the stage they happened in.

use std::path::{Path, PathBuf};

use firebox_core::config::{ExportConfig, LightmapMode};
use firebox_core::scene::{Scene, IDENTITY_SCALE_OFFSET};
use firebox_core::services::{ImageEncoder, MeshEncodeOptions, MeshEncoder, TextureBaker};
use firebox_core::types::Transform;
use firebox_core::{Error, ExportFailure, Result, ResultExt, Stage};
use tracing::{debug, error, info, warn};

use crate::lightmap::{strategy_for, LightmapJob};
use crate::material;
use crate::merge::{build_group, group_objects, MergeGroup, MergeInstance};
use crate::registry::AssetRegistry;
use crate::room::RoomObject;
use crate::serializer::{DocumentOptions, RoomContents, RoomSerializer, DOCUMENT_NAME};
use crate::skybox::{export_skybox, SkyboxIds};
use crate::textures::export_image;
use crate::walker::{SceneObject, SceneWalker};

/// Summary of a finished export
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportReport {
    /// Room objects written to the document
    pub objects: usize,
    /// Meshes written (or resolved in html-only runs)
    pub meshes: usize,
    /// Images written (or resolved in html-only runs)
    pub images: usize,
    pub links: usize,
    pub reflection_probes: usize,
    /// Items dropped along the way
    pub skipped: usize,
    pub far_distance: f32,
    /// Path of the written room document
    pub document: PathBuf,
}

/// One export run with its collaborators
pub struct ExportSession<'a> {
    config: ExportConfig,
    baker: &'a mut dyn TextureBaker,
    mesh_encoder: &'a mut dyn MeshEncoder,
    image_encoder: &'a mut dyn ImageEncoder,
    registry: AssetRegistry,
}

impl<'a> ExportSession<'a> {
    pub fn new(
        config: ExportConfig,
        baker: &'a mut dyn TextureBaker,
        mesh_encoder: &'a mut dyn MeshEncoder,
        image_encoder: &'a mut dyn ImageEncoder,
    ) -> Self {
        Self {
            config,
            baker,
            mesh_encoder,
            image_encoder,
            registry: AssetRegistry::new(),
        }
    }

    /// Registry state after the last run
    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    /// Export `scene` into the configured export root
    pub fn run(&mut self, scene: &Scene) -> std::result::Result<ExportReport, ExportFailure> {
        self.registry = AssetRegistry::new();
        self.config.validate().at_stage(Stage::Setup)?;
        let root = self.config.export_path.clone();
        create_root(&root).at_stage(Stage::Setup)?;
        info!(
            scene = %scene.name,
            root = %root.display(),
            mode = %self.config.lightmap_mode,
            html_only = self.config.html_only,
            "starting export"
        );

        let walk = SceneWalker::new(&self.config).walk(scene);
        let mut report = ExportReport {
            links: walk.links.len(),
            reflection_probes: walk.reflection_probes,
            skipped: walk.skipped,
            far_distance: walk.far_distance(),
            ..Default::default()
        };

        let groups = group_objects(&walk.objects, self.config.merge_policy);
        let mut rooms = self.build_rooms(&walk.objects, &groups, &mut report.skipped).at_stage(Stage::Merge)?;

        let skybox = self.export_skybox(scene).at_stage(Stage::Lightmap)?;
        let outcome = {
            let strategy = strategy_for(self.config.lightmap_mode);
            let mut job = LightmapJob {
                config: &self.config,
                scene,
                objects: &walk.objects,
                groups: &groups,
                rooms: &mut rooms,
                registry: &mut self.registry,
                baker: &mut *self.baker,
            };
            strategy.apply(&mut job).at_stage(Stage::Lightmap)?
        };
        report.skipped += outcome.skipped;

        self.mark_transparent(&rooms);
        report.meshes = self.encode_meshes(&root, &rooms).at_stage(Stage::Encode)?;
        report.images = self.encode_images(&root).at_stage(Stage::Encode)?;

        let serializer = RoomSerializer::new(DocumentOptions::from_config(&self.config));
        serializer
            .write(
                &root,
                &RoomContents {
                    registry: &self.registry,
                    rooms: &rooms,
                    links: &walk.links,
                    skybox: skybox.as_ref(),
                    far_distance: report.far_distance,
                },
            )
            .at_stage(Stage::Serialize)?;

        report.objects = rooms
            .iter()
            .filter(|room| self.registry.mesh(&room.mesh_id).is_some_and(|m| m.src.is_some()))
            .count();
        report.document = root.join(DOCUMENT_NAME);
        info!(
            objects = report.objects,
            meshes = report.meshes,
            images = report.images,
            links = report.links,
            skipped = report.skipped,
            "export finished"
        );
        Ok(report)
    }

    /// Merge every group and create its room object
    fn build_rooms(&mut self, objects: &[SceneObject], groups: &[MergeGroup], skipped: &mut usize) -> Result<Vec<RoomObject>> {
        let lightmap_uv = self.config.needs_lightmap_uv();
        let mut rooms = Vec::with_capacity(groups.len());

        for (index, group) in groups.iter().enumerate() {
            let Some(primary) = group.primary(objects) else {
                continue;
            };
            let name = group.name(objects);
            let instances: Vec<_> = group
                .members
                .iter()
                .filter_map(|&member| objects.get(member))
                .map(|object| MergeInstance::of(object, group))
                .collect();

            let output = match build_group(&name, &instances, lightmap_uv) {
                Ok(output) => output,
                Err(err) if err.is_skippable() => {
                    warn!(group = %name, error = %err, "group dropped");
                    *skipped += group.members.len();
                    continue;
                }
                Err(err) => return Err(err),
            };
            *skipped += output.skipped.len();

            let mesh = self.registry.register_mesh(group.key.clone(), &name);
            mesh.geometry = Some(output.mesh);
            let mesh_id = mesh.id.clone();

            let transform = if group.merged { Transform::IDENTITY } else { primary.transform };
            let mut room = RoomObject::new(mesh_id, index, transform);
            room.has_collider = group
                .members
                .iter()
                .filter_map(|&member| objects.get(member))
                .any(|object| object.has_collider);
            if group.is_lightmapped() {
                room.lightmap_scale_offset = Some(if group.merged {
                    IDENTITY_SCALE_OFFSET
                } else {
                    primary.lightmap_scale_offset
                });
            }

            let extracted = material::extract(&primary.material);
            room.is_transparent = extracted.is_transparent;
            // the baked image replaces the diffuse of lightmapped objects
            let baked = self.config.lightmap_mode == LightmapMode::BakedMaterial && group.is_lightmapped();
            if self.config.export_materials && !baked {
                let refs = material::register(&extracted, &mut self.registry, self.config.material_colors_as_textures);
                room.image_id = refs.image_id;
                room.color = refs.color;
                room.tiling = refs.tiling;
            }

            debug!(mesh = %room.mesh_id, members = group.members.len(), merged = group.merged, "room object");
            rooms.push(room);
        }

        info!(groups = groups.len(), rooms = rooms.len(), "merged meshes");
        Ok(rooms)
    }

    fn export_skybox(&mut self, scene: &Scene) -> Result<Option<SkyboxIds>> {
        match (&scene.skybox, self.config.export_skybox) {
            (Some(skybox), true) => export_skybox(skybox, &self.config, &mut self.registry, &mut *self.baker).map(Some),
            _ => Ok(None),
        }
    }

    /// Images used by transparent materials keep their alpha
    fn mark_transparent(&mut self, rooms: &[RoomObject]) {
        for room in rooms.iter().filter(|room| room.is_transparent) {
            if let Some(image) = room.image_id.as_deref().and_then(|id| self.registry.image_mut(id)) {
                image.export_alpha = true;
            }
        }
    }

    fn encode_meshes(&mut self, root: &Path, rooms: &[RoomObject]) -> Result<usize> {
        let extension = self.config.mesh_format.extension();
        let mut written = 0;

        for mesh in self.registry.meshes_mut() {
            let Some(geometry) = &mesh.geometry else {
                continue;
            };
            let file = format!("{}{}", mesh.id, extension);
            if !self.config.html_only {
                // a baked diffuse is laid out in lightmap UV space
                let swap_uv_channels = self.config.lightmap_mode == LightmapMode::BakedMaterial
                    && rooms
                        .iter()
                        .any(|room| room.mesh_id == mesh.id && room.lightmap_scale_offset.is_some() && room.image_id.is_some());
                let options = MeshEncodeOptions {
                    format: self.config.mesh_format,
                    swap_uv_channels,
                };
                if let Err(err) = self.mesh_encoder.encode(geometry, &options, &root.join(&file)) {
                    if err.is_configuration() {
                        return Err(err);
                    }
                    error!(mesh = %mesh.id, error = %err, "mesh not written");
                    continue;
                }
            }
            mesh.src = Some(file);
            written += 1;
        }
        Ok(written)
    }

    fn encode_images(&mut self, root: &Path) -> Result<usize> {
        let mut written = 0;
        for image in self.registry.images_mut() {
            match export_image(image, &self.config, &mut *self.image_encoder, root) {
                Ok(()) => written += 1,
                Err(err) if err.is_configuration() => return Err(err),
                Err(err) => error!(image = %image.id, error = %err, "image not written"),
            }
        }
        Ok(written)
    }
}

fn create_root(root: &Path) -> Result<()> {
    std::fs::create_dir_all(root).map_err(|source| Error::OutputDirectory {
        path: root.to_path_buf(),
        source,
    })
}
