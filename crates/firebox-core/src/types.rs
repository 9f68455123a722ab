//! Common types used across FireBox
//!
//! Math comes from `glam`; this module adds the few value types the exporter
//! passes between stages: world transforms, colors and scene bounds.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// World transform of a scene node (position, rotation, lossy scale)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Model matrix (scale, then rotation, then translation)
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Transform a point from local into world space
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * (point * self.scale)
    }

    /// Transform a direction; translation and scale do not apply
    pub fn transform_direction(&self, direction: Vec3) -> Vec3 {
        self.rotation * direction
    }

    /// Local right axis in world space
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Local up axis in world space
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Local forward axis in world space
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }
}

/// Linear RGBA color with components in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    #[serde(default = "one")]
    pub a: f32,
}

fn one() -> f32 {
    1.0
}

impl Color {
    pub const WHITE: Self = Self::rgba(1.0, 1.0, 1.0, 1.0);
    pub const BLACK: Self = Self::rgba(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Self = Self::rgba(0.0, 0.0, 0.0, 0.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::rgba(r, g, b, 1.0)
    }

    /// Uppercase `RRGGBB`; channels are truncated after scaling to 255
    pub fn to_hex_rgb(&self) -> String {
        format!(
            "{:02X}{:02X}{:02X}",
            channel_byte(self.r),
            channel_byte(self.g),
            channel_byte(self.b)
        )
    }

    /// 8-bit RGBA, truncating like [`Color::to_hex_rgb`]
    pub fn to_rgba8(&self) -> [u8; 4] {
        [
            channel_byte(self.r),
            channel_byte(self.g),
            channel_byte(self.b),
            channel_byte(self.a),
        ]
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            r: self.r + (other.r - self.r) * t,
            g: self.g + (other.g - self.g) * t,
            b: self.b + (other.b - self.b) * t,
            a: self.a + (other.a - self.a) * t,
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

fn channel_byte(value: f32) -> u8 {
    (value * 255.0).clamp(0.0, 255.0) as u8
}

/// Axis-aligned bounds; starts empty and grows by encapsulation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    extent: Option<(Vec3, Vec3)>,
}

impl Bounds {
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        Self {
            extent: Some((min.min(max), min.max(max))),
        }
    }

    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        let half = size.abs() * 0.5;
        Self::from_min_max(center - half, center + half)
    }

    pub fn is_empty(&self) -> bool {
        self.extent.is_none()
    }

    pub fn min(&self) -> Option<Vec3> {
        self.extent.map(|(min, _)| min)
    }

    pub fn max(&self) -> Option<Vec3> {
        self.extent.map(|(_, max)| max)
    }

    /// Grow to contain `other`; empty bounds are ignored
    pub fn encapsulate(&mut self, other: &Bounds) {
        let Some((omin, omax)) = other.extent else {
            return;
        };
        self.extent = Some(match self.extent {
            Some((min, max)) => (min.min(omin), max.max(omax)),
            None => (omin, omax),
        });
    }

    pub fn encapsulate_point(&mut self, point: Vec3) {
        self.encapsulate(&Bounds::from_min_max(point, point));
    }

    pub fn size(&self) -> Vec3 {
        self.extent.map(|(min, max)| max - min).unwrap_or(Vec3::ZERO)
    }

    /// Length of the bounding-box diagonal
    pub fn diagonal(&self) -> f32 {
        self.size().length()
    }
}
