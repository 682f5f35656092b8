//! Math types shared with managed scripts
//!
//! Re-exports glam and defines the transform layout that crosses the
//! native/managed boundary by pointer.

pub use glam::*;

/// Position, rotation (euler degrees) and scale of an entity.
///
/// Layout is nine consecutive `f32`, matching the managed `Transform`
/// struct field for field.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
