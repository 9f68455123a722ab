//! Material extraction
//!
//! Picks a diffuse texture and color out of a material's shader properties by
//! a fixed, case-insensitive vocabulary of property names.

use std::sync::Arc;

use firebox_core::scene::{ImageSource, Material, PropertyValue};
use firebox_core::types::Color;
use glam::{Vec2, Vec4};

use crate::registry::AssetRegistry;

/// Lower-case property names that hold the diffuse texture
pub const MAIN_TEXTURE_NAMES: &[&str] = &["_maintex"];

/// Lower-case property names that hold the diffuse color
pub const MAIN_COLOR_NAMES: &[&str] = &["_color"];

/// Substrings of a lower-cased shader name that mark it as transparent
pub const TRANSPARENT_TOKENS: &[&str] = &["transparent"];

/// What a material contributes to an exported object
#[derive(Debug, Clone, Default)]
pub struct ExtractedMaterial {
    pub color: Option<Color>,
    pub texture: Option<Arc<ImageSource>>,
    /// (scale.x, scale.y, offset.x, offset.y), only when not identity
    pub tiling: Option<Vec4>,
    pub is_transparent: bool,
}

/// Extract diffuse texture, color, tiling and transparency
///
/// The first matching property of each kind wins; properties are visited in
/// declaration order. A texture slot left empty does not count as a match.
pub fn extract(material: &Material) -> ExtractedMaterial {
    let mut extracted = ExtractedMaterial::default();

    for property in &material.shader.properties {
        let name = property.name.to_lowercase();
        match &property.value {
            PropertyValue::Texture(Some(texture))
                if extracted.texture.is_none() && MAIN_TEXTURE_NAMES.contains(&name.as_str()) =>
            {
                extracted.texture = Some(Arc::clone(texture));
            }
            PropertyValue::Color(color)
                if extracted.color.is_none() && MAIN_COLOR_NAMES.contains(&name.as_str()) =>
            {
                extracted.color = Some(*color);
            }
            _ => {}
        }
    }

    let shader_name = material.shader.name.to_lowercase();
    extracted.is_transparent = TRANSPARENT_TOKENS.iter().any(|t| shader_name.contains(t));

    if material.texture_scale != Vec2::ONE || material.texture_offset != Vec2::ZERO {
        extracted.tiling = Some(Vec4::new(
            material.texture_scale.x,
            material.texture_scale.y,
            material.texture_offset.x,
            material.texture_offset.y,
        ));
    }

    extracted
}

/// Material references of a room object after registration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialRefs {
    pub image_id: Option<String>,
    pub color: Option<Color>,
    pub tiling: Option<Vec4>,
    pub is_transparent: bool,
}

/// Register the extracted texture, or synthesize a flat-color image for
/// texture-less materials when `colors_as_textures` is set
///
/// A synthesized image carries the color, so the color itself is cleared.
pub fn register(
    extracted: &ExtractedMaterial,
    registry: &mut AssetRegistry,
    colors_as_textures: bool,
) -> MaterialRefs {
    let mut refs = MaterialRefs {
        image_id: None,
        color: extracted.color,
        tiling: extracted.tiling,
        is_transparent: extracted.is_transparent,
    };

    match (&extracted.texture, extracted.color) {
        (Some(texture), _) => {
            refs.image_id = Some(registry.register_image(texture).id.clone());
        }
        (None, Some(color)) if colors_as_textures => {
            refs.image_id = Some(registry.register_generated_color_image(color).id.clone());
            refs.color = None;
        }
        _ => {}
    }

    refs
}
