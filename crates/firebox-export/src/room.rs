//! Room objects and the output coordinate convention
//!
//! The room keeps the host's Y-up axes but mirrors X: positions and the three
//! rotated basis vectors have their X component negated.

use firebox_core::types::{Color, Transform};
use glam::{Vec3, Vec4};

/// One exported mesh placed in the room
#[derive(Debug, Clone)]
pub struct RoomObject {
    pub mesh_id: String,
    /// Merge group the mesh was built from
    pub group: usize,
    pub transform: Transform,
    /// Diffuse image
    pub image_id: Option<String>,
    pub lightmap_id: Option<String>,
    /// Atlas region for `lmap_sca`
    pub lightmap_scale_offset: Option<Vec4>,
    pub color: Option<Color>,
    pub tiling: Option<Vec4>,
    pub has_collider: bool,
    pub is_transparent: bool,
}

impl RoomObject {
    pub fn new(mesh_id: impl Into<String>, group: usize, transform: Transform) -> Self {
        Self {
            mesh_id: mesh_id.into(),
            group,
            transform,
            image_id: None,
            lightmap_id: None,
            lightmap_scale_offset: None,
            color: None,
            tiling: None,
            has_collider: false,
            is_transparent: false,
        }
    }
}

/// Placement of an element in room coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomTransform {
    pub pos: Vec3,
    pub scale: Vec3,
    pub xdir: Vec3,
    pub ydir: Vec3,
    pub zdir: Vec3,
}

impl RoomTransform {
    pub fn convert(transform: &Transform, uniform_scale: f32) -> Self {
        Self::at(transform.position, transform, uniform_scale)
    }

    /// Convert with `position` standing in for the transform's own position
    pub fn at(position: Vec3, transform: &Transform, uniform_scale: f32) -> Self {
        Self {
            pos: mirror_x(position * uniform_scale),
            scale: transform.scale * uniform_scale,
            xdir: mirror_x(transform.right()),
            ydir: mirror_x(transform.up()),
            zdir: mirror_x(transform.forward()),
        }
    }

    /// Mirrored geometry needs its front faces culled
    pub fn cull_front(&self) -> bool {
        self.scale.x < 0.0 || self.scale.y < 0.0 || self.scale.z < 0.0
    }
}

fn mirror_x(v: Vec3) -> Vec3 {
    Vec3::new(-v.x, v.y, v.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn test_convert_mirrors_x() {
        let t = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        let room = RoomTransform::convert(&t, 2.0);
        assert_eq!(room.pos, Vec3::new(-2.0, 4.0, 6.0));
        assert_eq!(room.scale, Vec3::splat(2.0));
        assert_eq!(room.xdir, Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(room.zdir, Vec3::Z);
        assert!(!room.cull_front());
    }

    #[test]
    fn test_rotated_basis() {
        let t = Transform::new(Vec3::ZERO, Quat::from_rotation_y(std::f32::consts::FRAC_PI_2), Vec3::new(1.0, -1.0, 1.0));
        let room = RoomTransform::convert(&t, 1.0);
        // +Z rotated a quarter turn about Y is +X, mirrored to -X
        assert!((room.zdir - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-6);
        assert!(room.cull_front());
    }
}
