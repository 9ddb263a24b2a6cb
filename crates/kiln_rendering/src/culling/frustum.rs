//! View frustum extraction.
//!
//! Planes are taken from the rows of the projection-view matrix
//! (Gribb/Hartmann) and negated so that every normal points **out** of the
//! visible volume:
//!
//! ```text
//!   plane · (p, 1)  < 0   inside
//!   plane · (p, 1)  = 0   on the plane
//!   plane · (p, 1)  > 0   outside
//! ```

use kiln_shared::{Mat4, Vec3, Vec4};

use crate::culling::{BoxBounds, Culler};

/// One of the six frustum planes, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrustumPlane {
    /// `x = -w` in clip space.
    Left = 0,
    /// `x = w` in clip space.
    Right = 1,
    /// `y = -w` in clip space.
    Bottom = 2,
    /// `y = w` in clip space.
    Top = 3,
    /// `z = -w` in clip space.
    Near = 4,
    /// `z = w` in clip space.
    Far = 5,
}

impl FrustumPlane {
    /// All planes in storage order.
    pub const ALL: [Self; 6] = [Self::Left, Self::Right, Self::Bottom, Self::Top, Self::Near, Self::Far];

    /// Index into [`Frustum::normalized_planes`].
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// View frustum: six normalized, outward-facing planes.
///
/// Each plane is a `Vec4` holding the unit normal in `xyz` and the signed
/// distance term in `w`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    /// Extracts the frustum of a projection-view matrix.
    ///
    /// The matrix is column-major (OpenGL/WGPU convention) with a
    /// `[-1, 1]` clip-space depth range.
    #[must_use]
    pub fn new(projection_view: &Mat4) -> Self {
        let mut frustum = Self { planes: [Vec4::ZERO; 6] };
        frustum.set_projection(projection_view);
        frustum
    }

    /// Recomputes all six planes from a new projection-view matrix.
    pub fn set_projection(&mut self, projection_view: &Mat4) {
        let r0 = projection_view.row(0);
        let r1 = projection_view.row(1);
        let r2 = projection_view.row(2);
        let r3 = projection_view.row(3);

        self.planes[FrustumPlane::Left.index()] = normalize(-(r3 + r0));
        self.planes[FrustumPlane::Right.index()] = normalize(-(r3 - r0));
        self.planes[FrustumPlane::Bottom.index()] = normalize(-(r3 + r1));
        self.planes[FrustumPlane::Top.index()] = normalize(-(r3 - r1));
        self.planes[FrustumPlane::Near.index()] = normalize(-(r3 + r2));
        self.planes[FrustumPlane::Far.index()] = normalize(-(r3 - r2));
    }

    /// All six planes, indexed by [`FrustumPlane::index`].
    #[inline]
    #[must_use]
    pub const fn normalized_planes(&self) -> [Vec4; 6] {
        self.planes
    }

    /// A single plane.
    #[inline]
    #[must_use]
    pub const fn normalized_plane(&self, plane: FrustumPlane) -> Vec4 {
        self.planes[plane as usize]
    }

    /// Largest signed distance from `point` to any plane.
    ///
    /// Negative when the point is inside the frustum, positive outside.
    #[must_use]
    pub fn contains(&self, point: Vec3) -> f32 {
        let p = point.extend(1.0);
        self.planes
            .iter()
            .map(|plane| plane.dot(p))
            .fold(f32::NEG_INFINITY, f32::max)
    }

    /// Conservative box test. See [`Culler::intersects_box`].
    #[must_use]
    pub fn intersects_box(&self, bounds: &BoxBounds) -> bool {
        Culler::intersects_box(self, bounds)
    }

    /// Conservative sphere test (`xyz` center, `w` radius).
    #[must_use]
    pub fn intersects_sphere(&self, sphere: Vec4) -> bool {
        Culler::intersects_sphere(self, sphere)
    }
}

impl Default for Frustum {
    /// The clip-space cube `[-1, 1]³`.
    fn default() -> Self {
        Self::new(&Mat4::IDENTITY)
    }
}

/// Scales a plane so its normal has unit length. Degenerate planes are
/// returned unchanged.
fn normalize(plane: Vec4) -> Vec4 {
    let len = plane.xyz().length();
    if len > 0.0 {
        plane * (1.0 / len)
    } else {
        plane
    }
}
