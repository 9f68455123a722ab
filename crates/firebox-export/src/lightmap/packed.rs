//! Atlas-wide strategies: one lightmap image per atlas, shared by every
//! object placed in it through `lmap_sca`

use firebox_core::config::LightmapMode;
use firebox_core::services::{ColorSpace, DrawCall, DrawGeometry, Shading};
use firebox_core::{Error, Result};
use tracing::{debug, info};

use super::{LightmapJob, LightmapOutcome, LightmapStrategy};
use crate::bake::{exposure, RenderPass};

fn atlas_image_name(index: i32) -> String {
    format!("Lightmap{}", index)
}

/// Exposure-decode each atlas into an 8-bit image
pub struct Packed;

impl LightmapStrategy for Packed {
    fn mode(&self) -> LightmapMode {
        LightmapMode::Packed
    }

    fn apply(&self, job: &mut LightmapJob<'_>) -> Result<LightmapOutcome> {
        let mut outcome = LightmapOutcome::default();

        for (index, rooms) in job.rooms_by_atlas() {
            let atlas = match job.atlas(index) {
                Ok(atlas) => atlas,
                Err(err) => {
                    outcome.skip(err, rooms.len())?;
                    continue;
                }
            };

            let pixels = if job.html_only() {
                None
            } else {
                let Some((width, height)) = atlas.dimensions() else {
                    outcome.skip(Error::MissingLightmap { index }, rooms.len())?;
                    continue;
                };
                let call = DrawCall {
                    geometry: DrawGeometry::FullTarget,
                    shading: Shading::Exposure {
                        lightmap: atlas.clone(),
                        exposure: exposure(job.config),
                    },
                };
                let baked = RenderPass::begin(&mut *job.baker, width, height, ColorSpace::Srgb).and_then(|mut pass| {
                    pass.draw(&call)?;
                    pass.finish()
                });
                match baked {
                    Ok(pixels) => Some(pixels),
                    Err(err) => {
                        outcome.skip(err, rooms.len())?;
                        continue;
                    }
                }
            };

            let id = job.registry.register_generated_image(&atlas_image_name(index), pixels).id.clone();
            debug!(atlas = index, image = %id, rooms = rooms.len(), "packed lightmap");
            for room in rooms {
                job.rooms[room].lightmap_id = Some(id.clone());
            }
            outcome.images += 1;
        }

        info!(images = outcome.images, skipped = outcome.skipped, "packed lightmaps");
        Ok(outcome)
    }
}

/// Reference the source HDR atlas files directly; nothing is rendered
pub struct PackedSourceExr;

impl LightmapStrategy for PackedSourceExr {
    fn mode(&self) -> LightmapMode {
        LightmapMode::PackedSourceExr
    }

    fn apply(&self, job: &mut LightmapJob<'_>) -> Result<LightmapOutcome> {
        let mut outcome = LightmapOutcome::default();

        for (index, rooms) in job.rooms_by_atlas() {
            let atlas = match job.atlas(index) {
                Ok(atlas) => atlas,
                Err(err) => {
                    outcome.skip(err, rooms.len())?;
                    continue;
                }
            };

            let id = job.registry.register_lightmap_file(&atlas, &atlas_image_name(index)).id.clone();
            for room in rooms {
                job.rooms[room].lightmap_id = Some(id.clone());
            }
            outcome.images += 1;
        }

        info!(images = outcome.images, skipped = outcome.skipped, "source lightmaps");
        Ok(outcome)
    }
}
