//! Culling systems for view-dependent rendering.
//!
//! [`Frustum`] turns a projection-view matrix into six planes, [`Culler`]
//! tests batches of bounding volumes against them and [`FrustumCuller`]
//! wraps both for once-per-frame use.

mod bounds;
mod culler;
mod frustum;

pub use bounds::{Aabb, BoxBounds};
pub use culler::{CullStats, Culler, FrustumCuller, VisibilityMask};
pub use frustum::{Frustum, FrustumPlane};
