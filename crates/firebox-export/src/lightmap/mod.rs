//! Lightmap strategies
//!
//! One strategy per [`LightmapMode`], picked once when the session starts:
//!
//! | Mode | Images | Baker |
//! |------|--------|-------|
//! | `None` | none | unused |
//! | `BakedMaterial` | `<mesh>_Baked` per room object, diffuse × lightmap | one pass per object |
//! | `Packed` | `Lightmap<index>` per atlas, exposure decoded | one pass per atlas |
//! | `PackedSourceExr` | `Lightmap<index>` per atlas, source file copied | unused |
//! | `Unpacked` | `<mesh>_Baked` per room object, lightmap only | one pass per object |
//!
//! Html-only runs register the same images without rendering them.

mod baked;
mod packed;

pub use baked::{BakedMaterial, Unpacked};
pub use packed::{Packed, PackedSourceExr};

use std::sync::Arc;

use firebox_core::config::{ExportConfig, LightmapMode};
use firebox_core::scene::{LightmapAtlas, Scene};
use firebox_core::services::TextureBaker;
use firebox_core::{Error, Result};
use tracing::warn;

use crate::merge::MergeGroup;
use crate::registry::AssetRegistry;
use crate::room::RoomObject;
use crate::walker::SceneObject;

/// Everything a strategy reads and writes
pub struct LightmapJob<'a> {
    pub config: &'a ExportConfig,
    pub scene: &'a Scene,
    pub objects: &'a [SceneObject],
    pub groups: &'a [MergeGroup],
    pub rooms: &'a mut [RoomObject],
    pub registry: &'a mut AssetRegistry,
    pub baker: &'a mut dyn TextureBaker,
}

impl LightmapJob<'_> {
    /// Room objects per atlas, atlases in order of first use
    pub fn rooms_by_atlas(&self) -> Vec<(i32, Vec<usize>)> {
        let mut atlases: Vec<(i32, Vec<usize>)> = Vec::new();
        for (index, room) in self.rooms.iter().enumerate() {
            let Some(group) = self.groups.get(room.group) else {
                continue;
            };
            if !group.is_lightmapped() {
                continue;
            }
            match atlases.iter_mut().find(|(atlas, _)| *atlas == group.lightmap_index) {
                Some((_, rooms)) => rooms.push(index),
                None => atlases.push((group.lightmap_index, vec![index])),
            }
        }
        atlases
    }

    /// Atlas by index; a missing or unreadable atlas is skippable
    pub fn atlas(&self, index: i32) -> Result<Arc<LightmapAtlas>> {
        match self.scene.lightmap(index) {
            Some(atlas) if atlas.is_available() => Ok(Arc::clone(atlas)),
            _ => Err(Error::MissingLightmap { index }),
        }
    }

    pub fn html_only(&self) -> bool {
        self.config.html_only
    }
}

/// What a strategy did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LightmapOutcome {
    /// Lightmap images registered
    pub images: usize,
    /// Room objects left without a lightmap
    pub skipped: usize,
}

impl LightmapOutcome {
    /// Absorb a per-item failure; configuration errors abort instead
    pub(crate) fn skip(&mut self, err: Error, rooms: usize) -> Result<()> {
        if err.is_configuration() {
            return Err(err);
        }
        warn!(error = %err, rooms, "lightmap skipped");
        self.skipped += rooms;
        Ok(())
    }
}

/// Turns per-object lightmap references into exported images
pub trait LightmapStrategy {
    fn mode(&self) -> LightmapMode;

    fn apply(&self, job: &mut LightmapJob<'_>) -> Result<LightmapOutcome>;
}

/// No lightmap processing
pub struct NoLightmaps;

impl LightmapStrategy for NoLightmaps {
    fn mode(&self) -> LightmapMode {
        LightmapMode::None
    }

    fn apply(&self, _job: &mut LightmapJob<'_>) -> Result<LightmapOutcome> {
        Ok(LightmapOutcome::default())
    }
}

/// Strategy implementing `mode`
pub fn strategy_for(mode: LightmapMode) -> Box<dyn LightmapStrategy> {
    match mode {
        LightmapMode::None => Box::new(NoLightmaps),
        LightmapMode::BakedMaterial => Box::new(BakedMaterial),
        LightmapMode::Packed => Box::new(Packed),
        LightmapMode::PackedSourceExr => Box::new(PackedSourceExr),
        LightmapMode::Unpacked => Box::new(Unpacked),
    }
}
