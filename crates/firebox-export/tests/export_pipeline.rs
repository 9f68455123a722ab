//! End-to-end export tests
//!
//! These run whole sessions against in-memory scenes with recording doubles
//! for the baker and encoders; only the room document hits the disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use firebox_core::prelude::*;
use firebox_core::services::{
    ColorSpace, DrawCall, ImageEncodeOptions, MeshData, MeshEncodeOptions, RenderTargetId,
};
use firebox_export::{ExportSession, SoftwareBaker};
use glam::{Quat, Vec2, Vec3, Vec4};
use image::{Rgba, Rgba32FImage, RgbaImage};
use tempfile::TempDir;

// ===== Doubles =====

#[derive(Default)]
struct RecordingBaker {
    events: Vec<String>,
    size: (u32, u32),
}

impl TextureBaker for RecordingBaker {
    fn acquire(&mut self, width: u32, height: u32, _: ColorSpace) -> Result<RenderTargetId> {
        self.events.push(format!("acquire {}x{}", width, height));
        self.size = (width, height);
        Ok(RenderTargetId(7))
    }
    fn clear(&mut self, _: RenderTargetId, color: Color) -> Result<()> {
        self.events.push(format!("clear {}", color.a));
        Ok(())
    }
    fn draw(&mut self, _: RenderTargetId, _: &DrawCall) -> Result<()> {
        self.events.push("draw".into());
        Ok(())
    }
    fn read_back(&mut self, _: RenderTargetId) -> Result<RgbaImage> {
        self.events.push("read".into());
        Ok(RgbaImage::from_pixel(self.size.0, self.size.1, Rgba([128, 128, 128, 255])))
    }
    fn release(&mut self, _: RenderTargetId) {
        self.events.push("release".into());
    }
}

#[derive(Default)]
struct RecordingMeshEncoder {
    meshes: Vec<(MeshData, MeshEncodeOptions, PathBuf)>,
}

impl MeshEncoder for RecordingMeshEncoder {
    fn encode(&mut self, mesh: &MeshData, options: &MeshEncodeOptions, path: &Path) -> Result<()> {
        self.meshes.push((mesh.clone(), *options, path.to_path_buf()));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingImageEncoder {
    encoded: Vec<PathBuf>,
    copied: Vec<(PathBuf, PathBuf)>,
    fail: bool,
}

impl RecordingImageEncoder {
    fn calls(&self) -> usize {
        self.encoded.len() + self.copied.len()
    }
}

impl ImageEncoder for RecordingImageEncoder {
    fn encode(&mut self, _: &RgbaImage, _: &ImageEncodeOptions, path: &Path) -> Result<()> {
        if self.fail {
            return Err(Error::encoding(path.display().to_string(), "disk full"));
        }
        self.encoded.push(path.to_path_buf());
        Ok(())
    }
    fn copy(&mut self, source: &Path, destination: &Path) -> Result<()> {
        if self.fail {
            return Err(Error::encoding(destination.display().to_string(), "disk full"));
        }
        self.copied.push((source.to_path_buf(), destination.to_path_buf()));
        Ok(())
    }
}

// ===== Scene helpers =====

fn triangle() -> Arc<MeshSource> {
    Arc::new(MeshSource {
        name: "Tri".into(),
        vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
        normals: vec![Vec3::Z; 3],
        uv0: vec![Vec2::ZERO, Vec2::X, Vec2::Y],
        uv1: Vec::new(),
        submeshes: vec![vec![0, 1, 2]],
    })
}

fn brick() -> Arc<Material> {
    let texture = Arc::new(ImageSource::from_pixels(
        "Brick",
        RgbaImage::from_pixel(2, 2, Rgba([180, 60, 40, 255])),
    ));
    Arc::new(Material::new(
        "BrickMat",
        Shader {
            name: "Standard".into(),
            properties: vec![ShaderProperty::texture("_MainTex", Some(texture))],
        },
    ))
}

fn node(name: &str, renderer: Renderer, transform: Transform) -> SceneNode {
    SceneNode::new(name)
        .with_transform(transform)
        .with_capability(Capability::Renderable(renderer))
}

fn lit_scene(mesh: &Arc<MeshSource>, material: &Arc<Material>) -> Scene {
    let mut atlas = LightmapAtlas::new(0, "Lightmap-0_comp_light.exr");
    atlas.hdr = Some(Rgba32FImage::from_pixel(8, 4, Rgba([0.5, 0.5, 0.5, 1.0])));
    let lit = |so: Vec4| Renderer::new(Arc::clone(mesh), Arc::clone(material)).with_lightmap(0, so);

    Scene {
        name: "Lit".into(),
        roots: vec![
            node("Floor", lit(Vec4::new(0.5, 0.5, 0.25, 0.0)), Transform::from_position(Vec3::new(2.0, 0.0, 0.0))),
            node("Wall", lit(Vec4::new(0.5, 0.5, 0.0, 0.5)), Transform::IDENTITY),
        ],
        lightmaps: vec![Arc::new(atlas)],
        skybox: None,
    }
}

fn config(dir: &TempDir, mode: LightmapMode, policy: MergePolicy) -> ExportConfig {
    ExportConfig {
        export_path: dir.path().join("room"),
        lightmap_mode: mode,
        merge_policy: policy,
        ..Default::default()
    }
}

fn read_document(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

// ===== Tests =====

#[test]
fn shared_material_is_registered_once() {
    let dir = TempDir::new().unwrap();
    let mesh = triangle();
    let material = brick();
    let scene = Scene {
        name: "Shared".into(),
        roots: vec![
            node(
                "A",
                Renderer::new(Arc::clone(&mesh), Arc::clone(&material)),
                Transform::from_position(Vec3::new(1.0, 2.0, 3.0)),
            ),
            node(
                "B",
                Renderer::new(Arc::clone(&mesh), Arc::clone(&material)),
                Transform::from_position(Vec3::new(4.0, 0.0, 0.0)),
            )
            .with_capability(Capability::Collidable),
        ],
        ..Default::default()
    };

    let mut baker = RecordingBaker::default();
    let mut meshes = RecordingMeshEncoder::default();
    let mut images = RecordingImageEncoder::default();
    let mut session = ExportSession::new(
        config(&dir, LightmapMode::None, MergePolicy::PerObject),
        &mut baker,
        &mut meshes,
        &mut images,
    );
    let report = session.run(&scene).unwrap();
    assert_eq!(session.registry().images().len(), 1);
    drop(session);

    assert_eq!(report.objects, 2);
    assert_eq!(report.meshes, 2);
    assert_eq!(report.images, 1);
    assert!(baker.events.is_empty());
    assert_eq!(images.encoded, vec![dir.path().join("room").join("Brick.jpg")]);

    let doc = read_document(&report.document);
    assert_eq!(doc.matches("<AssetImage ").count(), 1);
    assert_eq!(doc.matches("<AssetObject ").count(), 2);
    assert_eq!(doc.matches("<Object ").count(), 2);
    assert!(doc.contains("<AssetImage id=\"Brick\" src=\"Brick.jpg\" />"));
    assert!(doc.contains("<Object id=\"A\" lighting=\"true\" image_id=\"Brick\" pos=\"-1 2 3\" "));
    assert!(doc.contains("<Object id=\"B\" lighting=\"true\" image_id=\"Brick\" collision_id=\"B\" pos=\"-4 0 0\" "));
    assert!(!doc.contains("lmap_id"));
}

#[test]
fn per_lightmap_merge_remaps_uvs_into_the_atlas() {
    let dir = TempDir::new().unwrap();
    let scene = lit_scene(&triangle(), &brick());

    let mut baker = RecordingBaker::default();
    let mut meshes = RecordingMeshEncoder::default();
    let mut images = RecordingImageEncoder::default();
    let report = ExportSession::new(
        config(&dir, LightmapMode::Packed, MergePolicy::PerLightmapId),
        &mut baker,
        &mut meshes,
        &mut images,
    )
    .run(&scene)
    .unwrap();

    // one merged mesh in world space
    assert_eq!(meshes.meshes.len(), 1);
    let (mesh, options, path) = &meshes.meshes[0];
    assert_eq!(path, &dir.path().join("room").join("Mesh0.gltf"));
    assert!(!options.swap_uv_channels);
    assert_eq!(mesh.vertices.len(), 6);
    assert_eq!(mesh.vertices[1], Vec3::new(3.0, 0.0, 0.0));
    assert_eq!(mesh.triangles, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(mesh.uvs.len(), 2);
    assert_eq!(mesh.uvs[1][1], Vec2::new(0.75, 0.0));
    assert_eq!(mesh.uvs[1][5], Vec2::new(0.0, 1.0));

    // one pass over the whole atlas
    assert_eq!(baker.events, ["acquire 8x4", "clear 0", "draw", "read", "release"]);

    let doc = read_document(&report.document);
    assert!(doc.contains("<AssetImage id=\"Lightmap0\" src=\"Lightmap0.jpg\" />"));
    assert!(doc.contains("lmap_id=\"Lightmap0\" lmap_sca=\"1 1 0 0\" "));
    assert!(doc.contains("pos=\"0 0 0\" "));
}

#[test]
fn packed_source_exr_copies_the_atlas_without_baking() {
    let dir = TempDir::new().unwrap();
    let scene = lit_scene(&triangle(), &brick());

    let mut baker = RecordingBaker::default();
    let mut meshes = RecordingMeshEncoder::default();
    let mut images = RecordingImageEncoder::default();
    let report = ExportSession::new(
        config(&dir, LightmapMode::PackedSourceExr, MergePolicy::PerObject),
        &mut baker,
        &mut meshes,
        &mut images,
    )
    .run(&scene)
    .unwrap();

    assert!(baker.events.is_empty());
    assert_eq!(images.copied.len(), 1);
    assert_eq!(images.copied[0].0, PathBuf::from("Lightmap-0_comp_light.exr"));

    let doc = read_document(&report.document);
    assert!(doc.contains("<AssetImage id=\"Lightmap0\" src=\"Lightmap0.exr\" />"));
    assert!(doc.contains("<Object id=\"Floor\" lighting=\"true\" image_id=\"Brick\" lmap_id=\"Lightmap0\" lmap_sca=\"0.5 0.5 0.25 0\" pos=\"-2 0 0\" "));
    assert!(doc.contains("lmap_sca=\"0.5 0.5 0 0.5\""));
}

#[test]
fn baked_material_replaces_the_diffuse() {
    let dir = TempDir::new().unwrap();
    let scene = lit_scene(&triangle(), &brick());

    let mut baker = SoftwareBaker::new();
    let mut meshes = RecordingMeshEncoder::default();
    let mut images = RecordingImageEncoder::default();
    let mut cfg = config(&dir, LightmapMode::BakedMaterial, MergePolicy::PerObject);
    cfg.lightmap_max_resolution = 64;
    let report = ExportSession::new(cfg, &mut baker, &mut meshes, &mut images)
        .run(&scene)
        .unwrap();

    assert!(meshes.meshes.iter().all(|(_, options, _)| options.swap_uv_channels));
    let doc = read_document(&report.document);
    assert!(doc.contains("<AssetImage id=\"Floor_Baked\" src=\"Floor_Baked.jpg\" />"));
    assert!(doc.contains("<Object id=\"Floor\" lighting=\"true\" image_id=\"Floor_Baked\" pos=\"-2 0 0\" "));
    // the source diffuse is only used inside the bake
    assert!(!doc.contains("id=\"Brick\""));
    assert!(!doc.contains("lmap_id"));
}

#[test]
fn html_only_rerun_reuses_names_without_encoding() {
    let dir = TempDir::new().unwrap();
    let scene = lit_scene(&triangle(), &brick());

    let mut baker = RecordingBaker::default();
    let mut meshes = RecordingMeshEncoder::default();
    let mut images = RecordingImageEncoder::default();
    let full = ExportSession::new(
        config(&dir, LightmapMode::Packed, MergePolicy::PerObject),
        &mut baker,
        &mut meshes,
        &mut images,
    )
    .run(&scene)
    .unwrap();
    let first = read_document(&full.document);
    assert!(images.calls() > 0);

    let mut baker = RecordingBaker::default();
    let mut meshes = RecordingMeshEncoder::default();
    let mut images = RecordingImageEncoder::default();
    let mut cfg = config(&dir, LightmapMode::Packed, MergePolicy::PerObject);
    cfg.html_only = true;
    let rerun = ExportSession::new(cfg, &mut baker, &mut meshes, &mut images)
        .run(&scene)
        .unwrap();

    assert!(baker.events.is_empty());
    assert!(meshes.meshes.is_empty());
    assert_eq!(images.calls(), 0);
    assert_eq!(read_document(&rerun.document), first);
}

#[test]
fn failed_image_writes_leave_no_dangling_references() {
    let dir = TempDir::new().unwrap();
    let scene = lit_scene(&triangle(), &brick());

    let mut baker = RecordingBaker::default();
    let mut meshes = RecordingMeshEncoder::default();
    let mut images = RecordingImageEncoder {
        fail: true,
        ..Default::default()
    };
    let report = ExportSession::new(
        config(&dir, LightmapMode::Packed, MergePolicy::PerObject),
        &mut baker,
        &mut meshes,
        &mut images,
    )
    .run(&scene)
    .unwrap();

    assert_eq!(report.images, 0);
    assert_eq!(report.objects, 2);
    let doc = read_document(&report.document);
    assert!(!doc.contains("<AssetImage"));
    assert!(!doc.contains("image_id"));
    assert!(!doc.contains("lmap_id"));
}

#[test]
fn invalid_meshes_are_skipped() {
    let dir = TempDir::new().unwrap();
    let broken = Arc::new(MeshSource {
        name: "Broken".into(),
        vertices: vec![Vec3::ZERO],
        submeshes: vec![vec![0, 1, 2]],
        ..Default::default()
    });
    let material = brick();
    let scene = Scene {
        roots: vec![
            node("Good", Renderer::new(triangle(), Arc::clone(&material)), Transform::IDENTITY),
            node("Bad", Renderer::new(broken, material), Transform::IDENTITY),
        ],
        ..Default::default()
    };

    let mut baker = RecordingBaker::default();
    let mut meshes = RecordingMeshEncoder::default();
    let mut images = RecordingImageEncoder::default();
    let report = ExportSession::new(
        config(&dir, LightmapMode::None, MergePolicy::PerObject),
        &mut baker,
        &mut meshes,
        &mut images,
    )
    .run(&scene)
    .unwrap();

    assert_eq!(report.objects, 1);
    assert_eq!(report.skipped, 1);
    assert!(!read_document(&report.document).contains("Bad"));
}

#[test]
fn mirrored_objects_and_portals() {
    let dir = TempDir::new().unwrap();
    let mirrored = Transform::new(Vec3::ZERO, Quat::IDENTITY, Vec3::new(1.0, -1.0, 1.0));
    let portal = SceneNode::new("Door")
        .with_transform(Transform::new(Vec3::new(0.0, 1.0, 5.0), Quat::IDENTITY, Vec3::new(1.0, 2.0, 1.0)))
        .with_capability(Capability::Link(LinkPortal {
            url: "https://example.com/next".into(),
            title: "Next".into(),
            ..Default::default()
        }));
    let scene = Scene {
        roots: vec![node("Mirror", Renderer::new(triangle(), brick()), mirrored), portal],
        ..Default::default()
    };

    let mut baker = RecordingBaker::default();
    let mut meshes = RecordingMeshEncoder::default();
    let mut images = RecordingImageEncoder::default();
    let report = ExportSession::new(
        config(&dir, LightmapMode::None, MergePolicy::PerObject),
        &mut baker,
        &mut meshes,
        &mut images,
    )
    .run(&scene)
    .unwrap();

    assert_eq!(report.links, 1);
    let doc = read_document(&report.document);
    assert!(doc.contains("pos=\"0 0 0\" cull_face=\"front\" scale=\"1 -1 1\""));
    assert!(doc.contains("<Link url=\"https://example.com/next\" title=\"Next\" pos=\"0 0 5\" "));
    assert!(doc.find("<Object ").unwrap() < doc.find("<Link ").unwrap());
}

#[test]
fn procedural_skybox_is_rendered_and_referenced() {
    let dir = TempDir::new().unwrap();
    let scene = Scene {
        roots: vec![node("Cube", Renderer::new(triangle(), brick()), Transform::IDENTITY)],
        skybox: Some(Skybox::Procedural {
            top: Color::rgb(0.2, 0.4, 0.9),
            horizon: Color::WHITE,
            ground: Color::rgb(0.3, 0.3, 0.3),
        }),
        ..Default::default()
    };

    let mut baker = RecordingBaker::default();
    let mut meshes = RecordingMeshEncoder::default();
    let mut images = RecordingImageEncoder::default();
    let mut cfg = config(&dir, LightmapMode::None, MergePolicy::PerObject);
    cfg.skybox_resolution = 16;
    let report = ExportSession::new(cfg, &mut baker, &mut meshes, &mut images)
        .run(&scene)
        .unwrap();

    assert_eq!(baker.events.iter().filter(|e| e.starts_with("acquire 16x16")).count(), 6);
    let doc = read_document(&report.document);
    assert!(doc.contains("skybox_front_id=\"SkyBoxForward\""));
    assert!(doc.contains("skybox_down_id=\"SkyBoxDown\">"));
}

#[test]
fn uncreatable_output_directory_aborts_in_setup() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let mut cfg = config(&dir, LightmapMode::None, MergePolicy::PerObject);
    cfg.export_path = blocker.join("room");
    let mut baker = RecordingBaker::default();
    let mut meshes = RecordingMeshEncoder::default();
    let mut images = RecordingImageEncoder::default();
    let failure = ExportSession::new(cfg, &mut baker, &mut meshes, &mut images)
        .run(&Scene::default())
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Setup);
    assert!(failure.source.is_configuration());
    assert!(failure.to_string().contains("setup"));
}
