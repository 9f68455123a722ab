//! Render pass discipline and bake sizing
//!
//! A [`RenderPass`] holds the baker mutably for its whole lifetime, so only
//! one target is ever in flight. It clears the target to transparent on
//! creation and releases it on every exit path.

use firebox_core::config::ExportConfig;
use firebox_core::services::{ColorSpace, DrawCall, Exposure, RenderTargetId, TextureBaker};
use firebox_core::types::Color;
use firebox_core::Result;
use glam::Vec4;
use image::RgbaImage;
use tracing::trace;

/// Smallest per-object bake
pub const MIN_BAKE_RESOLUTION: u32 = 16;

/// One acquire → clear → draw* → read back → release cycle
pub struct RenderPass<'a> {
    baker: &'a mut dyn TextureBaker,
    target: RenderTargetId,
    released: bool,
}

impl<'a> RenderPass<'a> {
    /// Acquire a target and clear it to fully transparent
    pub fn begin(baker: &'a mut dyn TextureBaker, width: u32, height: u32, color_space: ColorSpace) -> Result<Self> {
        let target = baker.acquire(width, height, color_space)?;
        trace!(target = target.0, width, height, "render pass begin");
        let mut pass = Self {
            baker,
            target,
            released: false,
        };
        pass.baker.clear(target, Color::TRANSPARENT)?;
        Ok(pass)
    }

    pub fn draw(&mut self, call: &DrawCall) -> Result<()> {
        self.baker.draw(self.target, call)
    }

    /// Read the pixels back, then release the target
    pub fn finish(mut self) -> Result<RgbaImage> {
        let pixels = self.baker.read_back(self.target);
        self.baker.release(self.target);
        self.released = true;
        trace!(target = self.target.0, "render pass finished");
        pixels
    }
}

impl Drop for RenderPass<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.baker.release(self.target);
        }
    }
}

/// Share of the atlas an object's lightmap region spans
pub fn lightmap_footprint(scale_offset: Vec4) -> f32 {
    let width = (1.0 - scale_offset.z) * scale_offset.x;
    let height = (1.0 - scale_offset.w) * scale_offset.y;
    width.max(height)
}

/// Power-of-two resolution for a footprint, within [16, max_resolution]
pub fn bake_resolution(footprint: f32, max_resolution: u32) -> u32 {
    let texels = (max_resolution as f32 * footprint).max(1.0) as u32;
    let size = texels.max(1).checked_next_power_of_two().unwrap_or(max_resolution);
    size.max(MIN_BAKE_RESOLUTION).min(max_resolution)
}

/// Exposure correction configured for lightmap decoding
pub fn exposure(config: &ExportConfig) -> Exposure {
    Exposure {
        rel_fstops: config.lightmap_rel_fstops,
        linear: config.linear_color_space,
    }
}
