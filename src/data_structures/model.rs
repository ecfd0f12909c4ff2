//! Models: every mesh of an asset file plus the textures they share.
//!
//! [`Model::load`] imports the file, walks the node tree depth first (parents
//! before children) and turns every referenced mesh into a drawable [`Mesh`].
//! Material textures go through a per-model cache keyed by path, so a texture
//! used by many meshes is decoded and uploaded once.
//!
//! Loading is best effort: a texture that fails to decode or a mesh whose GPU
//! setup fails is logged, listed in the [`LoadReport`] and skipped while the
//! rest of the model keeps loading.

use std::{
    collections::HashMap,
    mem,
    path::{Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;

use crate::{
    backend::{GpuBackend, ShaderId},
    data_structures::{
        array::GrowableArray,
        mesh::{Mesh, Vertex},
        texture::{Texture, TextureKind},
    },
    error::{LoadError, LoadResult},
    resources::{
        Importer, PostProcess, Scene, SceneMaterial, SceneMesh, texture::ImageDecoder,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadOptions {
    pub post_process: PostProcess,
    /// Upload diffuse textures in an sRGB format so sampling linearizes them.
    pub gamma_correction: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            post_process: PostProcess::DEFAULT,
            gamma_correction: false,
        }
    }
}

/// Textures loaded so far, in load order, with a path index.
#[derive(Debug, Default)]
pub struct TextureCache {
    textures: GrowableArray<Arc<Texture>>,
    by_path: HashMap<String, usize>,
}

impl TextureCache {
    pub fn get(&self, path: &str) -> Option<&Arc<Texture>> {
        self.by_path.get(path).and_then(|&idx| self.textures.get(idx))
    }

    /// Add a texture. A texture whose path is already cached is not added again.
    pub fn insert(&mut self, texture: Arc<Texture>) {
        if self.by_path.contains_key(&texture.path) {
            return;
        }
        self.by_path.insert(texture.path.clone(), self.textures.len());
        self.textures.push(texture);
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Arc<Texture>> {
        self.textures.iter()
    }
}

/// A problem that was skipped over while loading.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LoadFailure {
    #[error("Failed to create a GPU texture for {path}: {reason}")]
    TextureCreate { path: String, reason: String },
    #[error("Texture failed to load at path {path}: {reason}")]
    TextureDecode { path: String, reason: String },
    #[error("Failed to upload texture {path}: {reason}")]
    TextureUpload { path: String, reason: String },
    #[error("Failed to set up mesh {mesh}: {reason}")]
    MeshSetup { mesh: String, reason: String },
    #[error("Node {node} references mesh {index}, which doesn't exist")]
    MissingMesh { node: String, index: usize },
    #[error("Mesh {mesh} references material {index}, which doesn't exist")]
    MissingMaterial { mesh: String, index: usize },
}

/// Summary of one [`Model::load`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Meshes appended to the model.
    pub meshes: usize,
    /// Textures that were decoded and uploaded successfully.
    pub textures_uploaded: usize,
    /// Texture references answered by the cache.
    pub cache_hits: usize,
    pub failures: Vec<LoadFailure>,
}

#[derive(Debug)]
pub struct Model {
    directory: PathBuf,
    name: String,
    options: LoadOptions,
    meshes: GrowableArray<Mesh>,
    textures_loaded: TextureCache,
}

impl Model {
    /// A model for the file `directory/name`. Nothing is read before [`Model::load`].
    pub fn new(directory: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self::with_options(directory, name, LoadOptions::default())
    }

    pub fn with_options(directory: impl Into<PathBuf>, name: impl Into<String>, options: LoadOptions) -> Self {
        Self {
            directory: directory.into(),
            name: name.into(),
            options,
            meshes: GrowableArray::default(),
            textures_loaded: TextureCache::default(),
        }
    }

    /**
     * Import the asset and upload all of its meshes and textures.
     *
     * Fails if the importer fails or the scene has no meshes at all. Anything
     * that goes wrong after that is recorded in the returned report instead.
     * A model can only be loaded again after [`Model::release`].
     */
    pub fn load<I, D, B>(&mut self, importer: &I, decoder: &D, backend: &mut B) -> LoadResult<LoadReport>
    where
        I: Importer + ?Sized,
        D: ImageDecoder + ?Sized,
        B: GpuBackend + ?Sized,
    {
        let path = self.path();
        if !self.meshes.is_empty() || !self.textures_loaded.is_empty() {
            return Err(LoadError::AlreadyLoaded { path });
        }

        let scene = match importer.import(&path, self.options.post_process) {
            Ok(scene) => scene,
            Err(source) => {
                log::error!("Failed to import model {:?}: {:#}", path, source);
                return Err(LoadError::Import { path, source });
            }
        };
        if scene.meshes.is_empty() {
            log::error!("Model {:?} contains no meshes", path);
            return Err(LoadError::EmptyScene { path });
        }

        let mut report = LoadReport::default();
        // Pop order matches a recursive pre-order walk: children are pushed in reverse
        let mut worklist = vec![&scene.root];
        while let Some(node) = worklist.pop() {
            for &mesh_idx in &node.meshes {
                match scene.meshes.get(mesh_idx) {
                    Some(mesh) => self.process_mesh(mesh, &scene, decoder, backend, &mut report),
                    None => {
                        log::warn!("Node {} references missing mesh {}", node.name, mesh_idx);
                        report.failures.push(LoadFailure::MissingMesh {
                            node: node.name.clone(),
                            index: mesh_idx,
                        });
                    }
                }
            }
            worklist.extend(node.children.iter().rev());
        }

        log::info!(
            "Loaded model {:?}: {} meshes, {} textures ({} cache hits, {} problems)",
            path,
            report.meshes,
            self.textures_loaded.len(),
            report.cache_hits,
            report.failures.len()
        );
        Ok(report)
    }

    fn process_mesh<D, B>(
        &mut self,
        mesh: &SceneMesh,
        scene: &Scene,
        decoder: &D,
        backend: &mut B,
        report: &mut LoadReport,
    ) where
        D: ImageDecoder + ?Sized,
        B: GpuBackend + ?Sized,
    {
        let vertices = vertices_of(mesh);
        let indices = indices_of(mesh);

        let mut textures = GrowableArray::with_capacity(0);
        match scene.materials.get(mesh.material_index) {
            Some(material) => {
                for kind in TextureKind::ALL {
                    self.load_material_textures(material, kind, &mut textures, decoder, backend, report);
                }
            }
            None => {
                log::warn!(
                    "Mesh {} references missing material {}",
                    mesh.name,
                    mesh.material_index
                );
                report.failures.push(LoadFailure::MissingMaterial {
                    mesh: mesh.name.clone(),
                    index: mesh.material_index,
                });
            }
        }

        match Mesh::new(backend, &mesh.name, vertices, indices, textures) {
            Ok(mesh) => {
                self.meshes.push(mesh);
                report.meshes += 1;
            }
            Err(e) => {
                log::error!("{:#}", e);
                report.failures.push(LoadFailure::MeshSetup {
                    mesh: mesh.name.clone(),
                    reason: format!("{:#}", e),
                });
            }
        }
    }

    /// Append the textures of one kind to `textures`, loading those not cached yet.
    fn load_material_textures<D, B>(
        &mut self,
        material: &SceneMaterial,
        kind: TextureKind,
        textures: &mut GrowableArray<Arc<Texture>>,
        decoder: &D,
        backend: &mut B,
        report: &mut LoadReport,
    ) where
        D: ImageDecoder + ?Sized,
        B: GpuBackend + ?Sized,
    {
        for slot in material.textures(kind) {
            if let Some(texture) = self.textures_loaded.get(&slot.path) {
                textures.push(Arc::clone(texture));
                report.cache_hits += 1;
                continue;
            }

            let id = match backend.create_texture(&slot.path) {
                Ok(id) => id,
                Err(e) => {
                    log::error!("Failed to create texture {}: {:#}", slot.path, e);
                    report.failures.push(LoadFailure::TextureCreate {
                        path: slot.path.clone(),
                        reason: format!("{:#}", e),
                    });
                    continue;
                }
            };

            let decoded = match &slot.embedded {
                Some(bytes) => decoder.decode_memory(bytes),
                None => decoder.decode_file(&self.directory.join(&slot.path)),
            };
            // The texture keeps its id either way; a failed one just has no pixels
            match decoded {
                Ok(image) => {
                    let srgb = self.options.gamma_correction && kind == TextureKind::Diffuse;
                    match backend.upload_texture(id, &image, srgb) {
                        Ok(()) => report.textures_uploaded += 1,
                        Err(e) => {
                            log::warn!("Failed to upload texture {}: {:#}", slot.path, e);
                            report.failures.push(LoadFailure::TextureUpload {
                                path: slot.path.clone(),
                                reason: format!("{:#}", e),
                            });
                        }
                    }
                }
                Err(e) => {
                    log::error!("Texture failed to load at path: {} ({:#})", slot.path, e);
                    report.failures.push(LoadFailure::TextureDecode {
                        path: slot.path.clone(),
                        reason: format!("{:#}", e),
                    });
                }
            }

            let texture = Arc::new(Texture {
                id,
                kind,
                path: slot.path.clone(),
            });
            self.textures_loaded.insert(Arc::clone(&texture));
            textures.push(texture);
        }
    }

    /// Draw every mesh in load order, stopping at the first backend error.
    pub fn draw<B>(&self, backend: &mut B, shader: ShaderId) -> anyhow::Result<()>
    where
        B: GpuBackend + ?Sized,
    {
        for mesh in &self.meshes {
            mesh.draw(backend, shader)?;
        }
        Ok(())
    }

    /// Release all meshes and cached textures. The model is empty afterwards.
    pub fn release<B>(&mut self, backend: &mut B)
    where
        B: GpuBackend + ?Sized,
    {
        for mesh in mem::take(&mut self.meshes) {
            mesh.release(backend);
        }
        for texture in mem::take(&mut self.textures_loaded).iter() {
            backend.release_texture(texture.id);
        }
    }

    pub fn meshes(&self) -> &GrowableArray<Mesh> {
        &self.meshes
    }

    pub fn textures_loaded(&self) -> &TextureCache {
        &self.textures_loaded
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> LoadOptions {
        self.options
    }

    /// `directory/name`, the file handed to the importer.
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.name)
    }
}

/// Interleave the vertex streams of `mesh`. Missing streams are zero filled.
///
/// Tangents and bitangents are only used when the mesh has texture coordinates.
fn vertices_of(mesh: &SceneMesh) -> GrowableArray<Vertex> {
    let stream = |data: &Option<Vec<[f32; 3]>>, i: usize| {
        data.as_ref().and_then(|data| data.get(i)).copied().unwrap_or_default()
    };
    let mut vertices = GrowableArray::with_capacity(mesh.positions.len());
    for (i, &position) in mesh.positions.iter().enumerate() {
        let mut vertex = Vertex {
            position,
            normal: stream(&mesh.normals, i),
            ..Default::default()
        };
        if let Some(tex_coords) = &mesh.tex_coords {
            vertex.tex_coords = tex_coords.get(i).copied().unwrap_or_default();
            vertex.tangent = stream(&mesh.tangents, i);
            vertex.bitangent = stream(&mesh.bitangents, i);
        }
        if let Some(bone) = mesh.bones.as_ref().and_then(|bones| bones.get(i)) {
            vertex.bone_ids = bone.ids;
            vertex.bone_weights = bone.weights;
        }
        vertices.push(vertex);
    }
    vertices
}

fn indices_of(mesh: &SceneMesh) -> GrowableArray<u32> {
    let mut indices = GrowableArray::with_capacity(mesh.faces.len() * 3);
    for face in &mesh.faces {
        indices.extend_from_slice(face);
    }
    indices
}
