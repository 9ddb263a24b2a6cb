//! # KILN Rendering
//!
//! Visibility determination for the KILN renderer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      PER FRAME                           │
//! ├──────────────────────────────────────────────────────────┤
//! │  projection * view ──► Frustum (6 outward planes)        │
//! │                            │                             │
//! │  renderable bounds ──► Culler ──► VisibilityMask[]       │
//! │                            │                             │
//! │                    scene traversal / draw list           │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Culling is conservative: an object reported hidden is guaranteed to be
//! outside the frustum, an object reported visible may not be.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod culling;

pub use culling::{
    Aabb, BoxBounds, CullStats, Culler, Frustum, FrustumCuller, FrustumPlane, VisibilityMask,
};
