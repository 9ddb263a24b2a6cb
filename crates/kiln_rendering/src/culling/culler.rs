//! Batch visibility tests.
//!
//! Each volume is classified against every plane with
//!
//! ```text
//!   sphere:  n·c + d - r
//!   box:     n·c + d - |n|·e        (e = half extent)
//! ```
//!
//! which is the signed distance of the volume's point nearest to the inside
//! of the plane. The sign bit of that distance is ANDed across the six
//! planes: a volume is hidden as soon as it lies entirely outside one of
//! them. Near frustum corners a volume can be outside without being entirely
//! outside any single plane, so the test may report false positives but
//! never false negatives.
//!
//! The batch loops are branch-free and walk `Culler::round(count)` items, so
//! callers pad their arrays to a multiple of [`Culler::MODULO`].

use bytemuck::{Pod, Zeroable};
use kiln_shared::{Mat4, Vec3, Vec4};

use crate::culling::{Aabb, BoxBounds, Frustum};

/// Per-object visibility result, one bit per visibility test.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct VisibilityMask(pub u8);

impl VisibilityMask {
    /// No bit set.
    pub const EMPTY: Self = Self(0);

    /// Raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True if test `bit` found the object potentially visible.
    #[inline]
    #[must_use]
    pub const fn contains(self, bit: u8) -> bool {
        self.0 & (1 << bit) != 0
    }

    /// True if any test found the object potentially visible.
    #[inline]
    #[must_use]
    pub const fn is_visible(self) -> bool {
        self.0 != 0
    }
}

/// Sign bit of `v` as 0 or 1. `-0.0` counts as negative.
#[inline]
fn sign_bit(v: f32) -> u8 {
    (v.to_bits() >> 31) as u8
}

/// Stateless batch culling routines.
pub struct Culler;

impl Culler {
    /// Batch width. Array lengths handed to the batch routines are rounded up
    /// to a multiple of this.
    pub const MODULO: usize = 8;

    /// `count` rounded up to a multiple of [`Culler::MODULO`].
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the largest multiple of `MODULO` that fits in
    /// `usize`.
    #[inline]
    #[must_use]
    pub const fn round(count: usize) -> usize {
        match count.checked_next_multiple_of(Self::MODULO) {
            Some(padded) => padded,
            None => panic!("culling batch size does not fit in usize once padded"),
        }
    }

    /// Tests `count` boxes and stores the outcome in bit `bit` of each
    /// result, leaving the other bits untouched.
    ///
    /// # Panics
    ///
    /// Panics if `bit >= 8` or any slice is shorter than
    /// `Culler::round(count)`.
    pub fn intersects_boxes(
        results: &mut [VisibilityMask],
        frustum: &Frustum,
        centers: &[Vec3],
        extents: &[Vec3],
        count: usize,
        bit: u8,
    ) {
        assert!(bit < 8, "visibility bit {bit} out of range");
        let padded = Self::round(count);
        let results = &mut results[..padded];
        let centers = &centers[..padded];
        let extents = &extents[..padded];
        let planes = frustum.normalized_planes();

        let clear = !(1_u8 << bit);
        for ((result, center), extent) in results.iter_mut().zip(centers).zip(extents) {
            let mut visible = 1_u8;
            for plane in &planes {
                let n = plane.xyz();
                let distance = n.dot(*center) - n.abs().dot(*extent) + plane.w;
                visible &= sign_bit(distance);
            }
            result.0 = (result.0 & clear) | (visible << bit);
        }
    }

    /// Tests `count` spheres (`xyz` center, `w` radius). Each result is set
    /// to 1 when potentially visible, 0 otherwise.
    ///
    /// # Panics
    ///
    /// Panics if either slice is shorter than `Culler::round(count)`.
    pub fn intersects_spheres(
        results: &mut [VisibilityMask],
        frustum: &Frustum,
        spheres: &[Vec4],
        count: usize,
    ) {
        let padded = Self::round(count);
        let results = &mut results[..padded];
        let spheres = &spheres[..padded];
        let planes = frustum.normalized_planes();

        for (result, sphere) in results.iter_mut().zip(spheres) {
            let mut visible = 1_u8;
            for plane in &planes {
                let distance = plane.xyz().dot(sphere.xyz()) + plane.w - sphere.w;
                visible &= sign_bit(distance);
            }
            *result = VisibilityMask(visible);
        }
    }

    /// Single box test.
    #[must_use]
    pub fn intersects_box(frustum: &Frustum, bounds: &BoxBounds) -> bool {
        let mut results = [VisibilityMask::EMPTY; Self::MODULO];
        let mut centers = [Vec3::ZERO; Self::MODULO];
        let mut extents = [Vec3::ZERO; Self::MODULO];
        centers[0] = bounds.center;
        extents[0] = bounds.half_extent;
        Self::intersects_boxes(&mut results, frustum, &centers, &extents, 1, 0);
        results[0].contains(0)
    }

    /// Single sphere test (`xyz` center, `w` radius).
    #[must_use]
    pub fn intersects_sphere(frustum: &Frustum, sphere: Vec4) -> bool {
        let mut results = [VisibilityMask::EMPTY; Self::MODULO];
        let mut spheres = [Vec4::ZERO; Self::MODULO];
        spheres[0] = sphere;
        Self::intersects_spheres(&mut results, frustum, &spheres, 1);
        results[0].contains(0)
    }
}

/// Outcome of one [`FrustumCuller::cull_aabbs`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CullStats {
    /// Volumes tested.
    pub tested: usize,
    /// Volumes reported potentially visible.
    pub visible: usize,
    /// Volumes rejected.
    pub culled: usize,
}

impl CullStats {
    /// Fraction of tested volumes that were rejected.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cull_rate(&self) -> f32 {
        if self.tested == 0 {
            0.0
        } else {
            self.culled as f32 / self.tested as f32
        }
    }
}

/// Frustum culler for once-per-frame use.
///
/// Keeps padded scratch arrays between frames so culling a list of the same
/// size does not allocate.
///
/// # Example
///
/// ```rust,ignore
/// let mut culler = FrustumCuller::new();
/// culler.update(&(projection * view));
///
/// culler.cull_aabbs(&chunk_bounds);
/// for index in culler.visible_indices() {
///     draw(index);
/// }
/// ```
#[derive(Debug, Default)]
pub struct FrustumCuller {
    frustum: Frustum,
    centers: Vec<Vec3>,
    extents: Vec<Vec3>,
    results: Vec<VisibilityMask>,
    count: usize,
    stats: CullStats,
}

impl FrustumCuller {
    /// Creates a culler with the clip-space frustum.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the frustum from a projection-view matrix.
    pub fn update(&mut self, projection_view: &Mat4) {
        self.frustum.set_projection(projection_view);
    }

    /// Current frustum.
    #[must_use]
    pub const fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Current frustum planes in array form for GPU upload.
    #[must_use]
    pub fn planes(&self) -> [[f32; 4]; 6] {
        self.frustum.normalized_planes().map(Vec4::to_array)
    }

    /// Culls a list of boxes. Returns one mask per box, bit 0 set when the
    /// box is potentially visible.
    pub fn cull_aabbs(&mut self, aabbs: &[Aabb]) -> &[VisibilityMask] {
        let count = aabbs.len();
        let padded = Culler::round(count);

        self.centers.clear();
        self.centers.extend(aabbs.iter().map(Aabb::center));
        self.centers.resize(padded, Vec3::ZERO);
        self.extents.clear();
        self.extents.extend(aabbs.iter().map(Aabb::half_extents));
        self.extents.resize(padded, Vec3::ZERO);
        self.results.clear();
        self.results.resize(padded, VisibilityMask::EMPTY);

        Culler::intersects_boxes(&mut self.results, &self.frustum, &self.centers, &self.extents, count, 0);

        let visible = self.results[..count].iter().filter(|mask| mask.contains(0)).count();
        self.count = count;
        self.stats = CullStats { tested: count, visible, culled: count - visible };
        tracing::trace!(
            tested = self.stats.tested,
            visible = self.stats.visible,
            culled = self.stats.culled,
            "frustum cull"
        );

        &self.results[..count]
    }

    /// Indices of the boxes the last [`FrustumCuller::cull_aabbs`] call kept.
    pub fn visible_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.results[..self.count]
            .iter()
            .enumerate()
            .filter(|(_, mask)| mask.contains(0))
            .map(|(index, _)| index)
    }

    /// Statistics of the last [`FrustumCuller::cull_aabbs`] call.
    #[must_use]
    pub const fn last_stats(&self) -> CullStats {
        self.stats
    }

    /// Tests if a sphere is potentially visible.
    #[must_use]
    pub fn test_sphere(&self, center: Vec3, radius: f32) -> bool {
        Culler::intersects_sphere(&self.frustum, center.extend(radius))
    }

    /// Tests if an AABB is potentially visible.
    #[must_use]
    pub fn test_aabb(&self, aabb: &Aabb) -> bool {
        Culler::intersects_box(&self.frustum, &aabb.to_box())
    }
}
