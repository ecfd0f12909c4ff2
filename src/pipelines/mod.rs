//! Render pipeline construction.
//!
//! - `basic` builds the sampler bind group layout and the render pipeline used for model meshes

pub mod basic;
