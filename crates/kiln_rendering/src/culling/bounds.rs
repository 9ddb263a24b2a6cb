//! Bounding volumes understood by the culler.
//!
//! Spheres are plain [`Vec4`](kiln_shared::Vec4)s: `xyz` is the center and
//! `w` the radius.

use bytemuck::{Pod, Zeroable};
use kiln_shared::Vec3;

/// Box in center / half-extent form, the layout the batch tests consume.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct BoxBounds {
    /// Center of the box.
    pub center: Vec3,
    /// Half the size along each axis.
    pub half_extent: Vec3,
}

impl BoxBounds {
    /// Creates a box from its center and half-extents.
    #[must_use]
    pub const fn new(center: Vec3, half_extent: Vec3) -> Self {
        Self { center, half_extent }
    }
}

/// Axis-aligned bounding box in min / max form.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl Aabb {
    /// Creates a new AABB.
    #[must_use]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Returns the center of the AABB.
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Returns the half-extents of the AABB.
    #[must_use]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Center / half-extent form of the same box.
    #[must_use]
    pub fn to_box(&self) -> BoxBounds {
        BoxBounds::new(self.center(), self.half_extents())
    }
}
