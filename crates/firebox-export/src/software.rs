//! CPU texture baker
//!
//! Reference implementation of the [`TextureBaker`] protocol. Lightmap draws
//! rasterize each triangle in lightmap-UV space and shade its texels with
//! nearest-neighbour samples; full-target draws evaluate the shading per
//! texel. Output is written as-is; the color space of a target is not
//! tracked.

use std::collections::HashMap;
use std::sync::Arc;

use firebox_core::scene::{ImageSource, LightmapAtlas, MeshSource};
use firebox_core::services::{ColorSpace, DrawCall, DrawGeometry, Exposure, RenderTargetId, Shading, TextureBaker};
use firebox_core::types::Color;
use firebox_core::{Error, Result};
use glam::{Vec2, Vec3, Vec4};
use image::{Rgba, Rgba32FImage, RgbaImage};
use tracing::trace;

const GAMMA: f32 = 2.2;

struct Target {
    texels: Rgba32FImage,
}

/// Bakes on the CPU
#[derive(Default)]
pub struct SoftwareBaker {
    targets: HashMap<u32, Target>,
    next_id: u32,
    lightmaps: Vec<(Arc<LightmapAtlas>, Arc<Rgba32FImage>)>,
    diffuse: Vec<(Arc<ImageSource>, Arc<RgbaImage>)>,
}

impl SoftwareBaker {
    pub fn new() -> Self {
        Self::default()
    }

    fn target(&mut self, id: RenderTargetId) -> Result<&mut Target> {
        self.targets
            .get_mut(&id.0)
            .ok_or_else(|| Error::invalid_config(format!("render target {} is not acquired", id.0)))
    }

    /// Decoded atlas, loaded once per baker
    fn lightmap(&mut self, atlas: &Arc<LightmapAtlas>) -> Result<Arc<Rgba32FImage>> {
        if let Some((_, texels)) = self.lightmaps.iter().find(|(a, _)| Arc::ptr_eq(a, atlas)) {
            return Ok(Arc::clone(texels));
        }
        let texels = Arc::new(atlas.load_hdr()?);
        self.lightmaps.push((Arc::clone(atlas), Arc::clone(&texels)));
        Ok(texels)
    }

    fn diffuse(&mut self, image: &Arc<ImageSource>) -> Result<Arc<RgbaImage>> {
        if let Some((_, pixels)) = self.diffuse.iter().find(|(i, _)| Arc::ptr_eq(i, image)) {
            return Ok(Arc::clone(pixels));
        }
        let pixels = Arc::new(image.load_pixels()?);
        self.diffuse.push((Arc::clone(image), Arc::clone(&pixels)));
        Ok(pixels)
    }

    fn draw_full_target(&mut self, target: RenderTargetId, shading: &Shading) -> Result<()> {
        let (lightmap, sky) = match shading {
            Shading::Exposure { lightmap, exposure } => (Some((self.lightmap(lightmap)?, *exposure)), None),
            Shading::Sky { forward, up, top, horizon, ground } => (None, Some((*forward, *up, *top, *horizon, *ground))),
            _ => {
                return Err(Error::MissingBakeResource {
                    name: "full-target lightmap composite".to_string(),
                })
            }
        };

        let texels = &mut self.target(target)?.texels;
        let (width, height) = texels.dimensions();
        for (x, y, texel) in texels.enumerate_pixels_mut() {
            let uv = texel_uv(x, y, width, height);
            let color = match (&lightmap, sky) {
                (Some((hdr, exposure)), _) => decode(sample_hdr(hdr, uv), *exposure),
                (None, Some((forward, up, top, horizon, ground))) => {
                    sky_color(face_direction(forward, up, uv), top, horizon, ground)
                }
                (None, None) => continue,
            };
            *texel = Rgba(color.to_array());
        }
        Ok(())
    }

    fn draw_mesh(
        &mut self,
        target: RenderTargetId,
        mesh: &MeshSource,
        submesh: usize,
        target_scale_offset: Vec4,
        shading: &Shading,
    ) -> Result<()> {
        let (lightmap, scale_offset, exposure, diffuse, tint) = match shading {
            Shading::LightmapComposite {
                lightmap,
                lightmap_scale_offset,
                diffuse,
                color,
                exposure,
            } => {
                let diffuse = diffuse.as_ref().map(|d| self.diffuse(d)).transpose()?;
                (self.lightmap(lightmap)?, *lightmap_scale_offset, *exposure, diffuse, *color)
            }
            Shading::LightmapOnly {
                lightmap,
                lightmap_scale_offset,
                exposure,
            } => (self.lightmap(lightmap)?, *lightmap_scale_offset, *exposure, None, Color::WHITE),
            _ => {
                return Err(Error::MissingBakeResource {
                    name: "mesh exposure pass".to_string(),
                })
            }
        };

        let Some(triangles) = mesh.submeshes.get(submesh) else {
            return Err(Error::invalid_mesh(&mesh.name, format!("no submesh {}", submesh)));
        };
        let lightmap_uvs = mesh.lightmap_uvs();
        let surface_uvs = &mesh.uv0;

        let texels = &mut self.target(target)?.texels;
        let (width, height) = texels.dimensions();
        let size = Vec2::new(width as f32, height as f32);

        for tri in triangles.chunks_exact(3) {
            let idx = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let Some(lm) = gather(lightmap_uvs, idx) else {
                continue;
            };
            let surface = gather(surface_uvs, idx).unwrap_or([Vec2::ZERO; 3]);

            // triangle in target pixel space, v pointing down the rows
            let corners = lm.map(|uv| {
                let t = remap(uv, target_scale_offset);
                Vec2::new(t.x, 1.0 - t.y) * size
            });
            let min = corners[0].min(corners[1]).min(corners[2]).floor().max(Vec2::ZERO);
            let max = corners[0].max(corners[1]).max(corners[2]).ceil().min(size);

            for y in min.y as u32..max.y as u32 {
                for x in min.x as u32..max.x as u32 {
                    let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                    let Some(w) = barycentric(p, corners) else {
                        continue;
                    };
                    let lm_uv = lm[0] * w.x + lm[1] * w.y + lm[2] * w.z;
                    let light = decode(sample_hdr(&lightmap, remap(lm_uv, scale_offset)), exposure);

                    let mut albedo = tint;
                    if let Some(diffuse) = &diffuse {
                        let uv = surface[0] * w.x + surface[1] * w.y + surface[2] * w.z;
                        let d = sample_ldr(diffuse, uv);
                        albedo = Color::rgba(albedo.r * d.r, albedo.g * d.g, albedo.b * d.b, albedo.a * d.a);
                    }

                    let out = Color::rgba(light.r * albedo.r, light.g * albedo.g, light.b * albedo.b, albedo.a);
                    texels.put_pixel(x, y, Rgba(out.to_array()));
                }
            }
        }
        Ok(())
    }
}

impl TextureBaker for SoftwareBaker {
    fn acquire(&mut self, width: u32, height: u32, _color_space: ColorSpace) -> Result<RenderTargetId> {
        if width == 0 || height == 0 {
            return Err(Error::invalid_config(format!("render target of {}x{}", width, height)));
        }
        self.next_id += 1;
        self.targets.insert(
            self.next_id,
            Target {
                texels: Rgba32FImage::new(width, height),
            },
        );
        trace!(target = self.next_id, width, height, "software target acquired");
        Ok(RenderTargetId(self.next_id))
    }

    fn clear(&mut self, target: RenderTargetId, color: Color) -> Result<()> {
        let texels = &mut self.target(target)?.texels;
        for texel in texels.pixels_mut() {
            *texel = Rgba(color.to_array());
        }
        Ok(())
    }

    fn draw(&mut self, target: RenderTargetId, call: &DrawCall) -> Result<()> {
        match &call.geometry {
            DrawGeometry::FullTarget => self.draw_full_target(target, &call.shading),
            DrawGeometry::Mesh {
                mesh,
                submesh,
                target_scale_offset,
                ..
            } => self.draw_mesh(target, mesh, *submesh, *target_scale_offset, &call.shading),
        }
    }

    fn read_back(&mut self, target: RenderTargetId) -> Result<RgbaImage> {
        let texels = &self.target(target)?.texels;
        let mut pixels = RgbaImage::new(texels.width(), texels.height());
        for (src, dst) in texels.pixels().zip(pixels.pixels_mut()) {
            *dst = Rgba(src.0.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8));
        }
        Ok(pixels)
    }

    fn release(&mut self, target: RenderTargetId) {
        self.targets.remove(&target.0);
    }
}

fn texel_uv(x: u32, y: u32, width: u32, height: u32) -> Vec2 {
    Vec2::new((x as f32 + 0.5) / width as f32, 1.0 - (y as f32 + 0.5) / height as f32)
}

fn remap(uv: Vec2, scale_offset: Vec4) -> Vec2 {
    Vec2::new(uv.x * scale_offset.x + scale_offset.z, uv.y * scale_offset.y + scale_offset.w)
}

fn gather(uvs: &[Vec2], idx: [usize; 3]) -> Option<[Vec2; 3]> {
    Some([*uvs.get(idx[0])?, *uvs.get(idx[1])?, *uvs.get(idx[2])?])
}

/// Barycentric weights of `p`, if it lies inside the triangle
fn barycentric(p: Vec2, [a, b, c]: [Vec2; 3]) -> Option<Vec3> {
    let area = (b - a).perp_dot(c - a);
    if area.abs() < f32::EPSILON {
        return None;
    }
    let w0 = (b - p).perp_dot(c - p) / area;
    let w1 = (c - p).perp_dot(a - p) / area;
    let w2 = 1.0 - w0 - w1;
    (w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0).then_some(Vec3::new(w0, w1, w2))
}

fn texel_coords(uv: Vec2, width: u32, height: u32) -> (u32, u32) {
    let u = uv.x.rem_euclid(1.0);
    let v = 1.0 - uv.y.rem_euclid(1.0);
    let x = ((u * width as f32) as u32).min(width.saturating_sub(1));
    let y = ((v * height as f32) as u32).min(height.saturating_sub(1));
    (x, y)
}

fn sample_hdr(image: &Rgba32FImage, uv: Vec2) -> Color {
    if image.width() == 0 || image.height() == 0 {
        return Color::BLACK;
    }
    let (x, y) = texel_coords(uv, image.width(), image.height());
    let [r, g, b, a] = image.get_pixel(x, y).0;
    Color::rgba(r, g, b, a)
}

fn sample_ldr(image: &RgbaImage, uv: Vec2) -> Color {
    if image.width() == 0 || image.height() == 0 {
        return Color::WHITE;
    }
    let (x, y) = texel_coords(uv, image.width(), image.height());
    let [r, g, b, a] = image.get_pixel(x, y).0.map(|c| c as f32 / 255.0);
    Color::rgba(r, g, b, a)
}

/// Apply exposure and, for linear hosts, gamma encoding
fn decode(hdr: Color, exposure: Exposure) -> Color {
    let scale = exposure.rel_fstops.exp2();
    let encode = |c: f32| {
        let c = (c * scale).max(0.0);
        let c = if exposure.linear { c.powf(1.0 / GAMMA) } else { c };
        c.min(1.0)
    };
    Color::rgba(encode(hdr.r), encode(hdr.g), encode(hdr.b), 1.0)
}

/// World direction through `uv` of the face looking along `forward`
fn face_direction(forward: Vec3, up: Vec3, uv: Vec2) -> Vec3 {
    let right = up.cross(forward);
    let ndc = uv * 2.0 - Vec2::ONE;
    (forward + right * ndc.x + up * ndc.y).normalize_or_zero()
}

fn sky_color(direction: Vec3, top: Color, horizon: Color, ground: Color) -> Color {
    let t = direction.y;
    let color = if t >= 0.0 {
        horizon.lerp(&top, t)
    } else {
        horizon.lerp(&ground, -t)
    };
    Color { a: 1.0, ..color }
}
