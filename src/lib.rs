//! flow-model
//!
//! Loads 3D models from asset files and draws them. A [`Model`] imports an
//! asset (glTF or Wavefront OBJ), walks its node tree, converts every mesh into
//! interleaved [`Vertex`] data and resolves material textures through a
//! per-model cache so each image is decoded and uploaded only once. Drawing
//! binds each mesh's textures to numbered units, points the shader's
//! `texture_<kind><n>` samplers at them and issues one indexed draw.
//!
//! High-level modules
//! - `backend`: the [`GpuBackend`] trait and its wgpu implementation
//! - `data_structures`: growable arrays, meshes, models and textures
//! - `error`: errors returned by model loading
//! - `pipelines`: render pipeline construction for model meshes
//! - `resources`: asset importers, post-processing and image decoding
//!
//! ```no_run
//! use flow_model::{AssetImporter, ImageCrateDecoder, Model, backend::wgpu_backend::WgpuBackend};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut backend = WgpuBackend::headless().await?;
//! let mut model = Model::new("assets/backpack", "backpack.obj");
//! let report = model.load(&AssetImporter, &ImageCrateDecoder, &mut backend)?;
//! log::info!("{} meshes, {} textures", report.meshes, model.textures_loaded().len());
//! model.release(&mut backend);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod data_structures;
pub mod error;
pub mod pipelines;
pub mod resources;

// Re-exports commonly used types for convenience in downstream code.
pub use backend::{GpuBackend, ShaderId, TextureId};
pub use data_structures::{
    array::GrowableArray,
    mesh::{Mesh, Vertex},
    model::{LoadFailure, LoadOptions, LoadReport, Model},
    texture::{Texture, TextureKind},
};
pub use error::LoadError;
pub use resources::{AssetImporter, Importer, PostProcess, texture::{ImageCrateDecoder, ImageDecoder}};
pub use wgpu;
