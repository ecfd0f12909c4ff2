//! Errors surfaced at the model boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Why [`Model::load`](crate::data_structures::model::Model::load) produced no meshes.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to import {path:?}: {source:#}")]
    Import {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("Scene {path:?} contains no meshes")]
    EmptyScene { path: PathBuf },
    #[error("Model {path:?} is already loaded")]
    AlreadyLoaded { path: PathBuf },
}

pub type LoadResult<T> = Result<T, LoadError>;
