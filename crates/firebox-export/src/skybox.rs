//! Skybox export
//!
//! Six-sided skyboxes register their face images as they are. Procedural
//! skyboxes are rendered into six `SkyBox<Face>` images through the baker.

use firebox_core::config::ExportConfig;
use firebox_core::scene::Skybox;
use firebox_core::services::{ColorSpace, DrawCall, DrawGeometry, Shading, TextureBaker};
use firebox_core::types::Color;
use firebox_core::Result;
use glam::Vec3;
use tracing::{debug, warn};

use crate::bake::RenderPass;
use crate::registry::AssetRegistry;

/// Image ids of the six faces
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkyboxIds {
    pub front: String,
    pub back: String,
    pub left: String,
    pub right: String,
    pub up: String,
    pub down: String,
}

impl SkyboxIds {
    /// (attribute suffix, id) in document order
    pub fn faces(&self) -> [(&'static str, &str); 6] {
        [
            ("front", &self.front),
            ("back", &self.back),
            ("left", &self.left),
            ("right", &self.right),
            ("up", &self.up),
            ("down", &self.down),
        ]
    }
}

#[derive(Debug, Clone, Copy)]
enum Face {
    Left,
    Right,
    Forward,
    Back,
    Up,
    Down,
}

impl Face {
    /// Render order of procedural faces
    const ALL: [Face; 6] = [Face::Left, Face::Right, Face::Forward, Face::Back, Face::Up, Face::Down];

    fn name(self) -> &'static str {
        match self {
            Face::Left => "Left",
            Face::Right => "Right",
            Face::Forward => "Forward",
            Face::Back => "Back",
            Face::Up => "Up",
            Face::Down => "Down",
        }
    }

    /// (forward, up) of the face camera
    fn basis(self) -> (Vec3, Vec3) {
        match self {
            Face::Left => (Vec3::NEG_X, Vec3::Y),
            Face::Right => (Vec3::X, Vec3::Y),
            Face::Forward => (Vec3::Z, Vec3::Y),
            Face::Back => (Vec3::NEG_Z, Vec3::Y),
            Face::Up => (Vec3::Y, Vec3::NEG_Z),
            Face::Down => (Vec3::NEG_Y, Vec3::Z),
        }
    }
}

/// Register the skybox faces; procedural faces are rendered unless html-only
pub fn export_skybox(
    skybox: &Skybox,
    config: &ExportConfig,
    registry: &mut AssetRegistry,
    baker: &mut dyn TextureBaker,
) -> Result<SkyboxIds> {
    match skybox {
        Skybox::SixSided {
            front,
            back,
            left,
            right,
            up,
            down,
        } => Ok(SkyboxIds {
            front: registry.register_image(front).id.clone(),
            back: registry.register_image(back).id.clone(),
            left: registry.register_image(left).id.clone(),
            right: registry.register_image(right).id.clone(),
            up: registry.register_image(up).id.clone(),
            down: registry.register_image(down).id.clone(),
        }),
        Skybox::Procedural { top, horizon, ground } => {
            let mut ids = SkyboxIds::default();
            for face in Face::ALL {
                let name = format!("SkyBox{}", face.name());
                let pixels = if config.html_only {
                    None
                } else {
                    match render_face(face, *top, *horizon, *ground, config.skybox_resolution, baker) {
                        Ok(pixels) => Some(pixels),
                        Err(err) if err.is_configuration() => return Err(err),
                        Err(err) => {
                            warn!(face = face.name(), error = %err, "sky face not rendered");
                            None
                        }
                    }
                };
                let id = registry.register_generated_image(&name, pixels).id.clone();
                match face {
                    Face::Left => ids.left = id,
                    Face::Right => ids.right = id,
                    Face::Forward => ids.front = id,
                    Face::Back => ids.back = id,
                    Face::Up => ids.up = id,
                    Face::Down => ids.down = id,
                }
            }
            debug!(resolution = config.skybox_resolution, "procedural skybox");
            Ok(ids)
        }
    }
}

fn render_face(
    face: Face,
    top: Color,
    horizon: Color,
    ground: Color,
    resolution: u32,
    baker: &mut dyn TextureBaker,
) -> Result<image::RgbaImage> {
    let (forward, up) = face.basis();
    let mut pass = RenderPass::begin(baker, resolution, resolution, ColorSpace::Srgb)?;
    pass.draw(&DrawCall {
        geometry: DrawGeometry::FullTarget,
        shading: Shading::Sky {
            forward,
            up,
            top,
            horizon,
            ground,
        },
    })?;
    pass.finish()
}
