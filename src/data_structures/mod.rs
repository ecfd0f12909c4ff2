//! Model data structures.
//!
//! - `array` is the growable container every list in the crate is stored in
//! - `mesh` holds the vertex layout and drawable meshes
//! - `model` loads a whole asset file into meshes with a shared texture cache
//! - `texture` contains texture records and the wgpu texture wrapper

pub mod array;
pub mod mesh;
pub mod model;
pub mod texture;
