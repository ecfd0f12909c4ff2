//! This module contains all logic for loading meshes/textures/etc. from external files.
//!
//! Importers turn an asset file into a [`Scene`]: a node tree that references
//! meshes by index, the meshes themselves and their materials. The model
//! loader only ever sees this representation.

use std::{path::Path, sync::Arc};

use anyhow::{Result, bail};

use crate::data_structures::texture::TextureKind;

pub mod gltf_importer;
pub mod mesh;
pub mod obj_importer;
pub mod texture;

pub use mesh::PostProcess;

/// An imported asset: node hierarchy plus the meshes and materials it references.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub root: SceneNode,
    pub meshes: Vec<SceneMesh>,
    pub materials: Vec<SceneMaterial>,
}

impl Scene {
    /// Apply `post_process` to every mesh.
    pub fn post_process(&mut self, post_process: PostProcess) {
        for mesh in &mut self.meshes {
            post_process.apply(mesh);
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SceneNode {
    pub name: String,
    /// Indices into [`Scene::meshes`].
    pub meshes: Vec<usize>,
    pub children: Vec<SceneNode>,
}

/// Bone indices and weights of one vertex.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoneInfluence {
    pub ids: [i32; 4],
    pub weights: [f32; 4],
}

/// A mesh as delivered by an importer.
///
/// All optional per-vertex streams run parallel to `positions`.
#[derive(Clone, Debug, Default)]
pub struct SceneMesh {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    /// First UV channel.
    pub tex_coords: Option<Vec<[f32; 2]>>,
    pub tangents: Option<Vec<[f32; 3]>>,
    pub bitangents: Option<Vec<[f32; 3]>>,
    pub bones: Option<Vec<BoneInfluence>>,
    /// Vertex index tuples; triangles once triangulated.
    pub faces: Vec<Vec<u32>>,
    /// Index into [`Scene::materials`].
    pub material_index: usize,
}

/// Where a material texture comes from.
///
/// `path` is relative to the model's directory and identifies the texture in
/// the model's cache. Images embedded in the asset carry their encoded bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureSlot {
    pub path: String,
    pub embedded: Option<Arc<[u8]>>,
}

impl TextureSlot {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            embedded: None,
        }
    }

    pub fn embedded(key: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            path: key.into(),
            embedded: Some(bytes.into()),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SceneMaterial {
    pub name: String,
    textures: [Vec<TextureSlot>; 4],
}

impl SceneMaterial {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_texture(mut self, kind: TextureKind, slot: TextureSlot) -> Self {
        self.add_texture(kind, slot);
        self
    }

    pub fn add_texture(&mut self, kind: TextureKind, slot: TextureSlot) {
        self.textures[kind.index()].push(slot);
    }

    pub fn textures(&self, kind: TextureKind) -> &[TextureSlot] {
        &self.textures[kind.index()]
    }

    pub fn texture_count(&self, kind: TextureKind) -> usize {
        self.textures[kind.index()].len()
    }
}

/// Reads an asset file into a [`Scene`], applying `post_process`.
pub trait Importer {
    fn import(&self, path: &Path, post_process: PostProcess) -> Result<Scene>;
}

/// Picks the importer from the file extension: `.gltf`/`.glb` or `.obj`.
#[derive(Clone, Copy, Debug, Default)]
pub struct AssetImporter;

impl Importer for AssetImporter {
    fn import(&self, path: &Path, post_process: PostProcess) -> Result<Scene> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("gltf" | "glb") => gltf_importer::GltfImporter.import(path, post_process),
            Some("obj") => obj_importer::ObjImporter.import(path, post_process),
            _ => bail!("No importer for {:?}; supported are .gltf, .glb and .obj", path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_keeps_slots_per_kind_in_order() {
        let material = SceneMaterial::new("wood")
            .with_texture(TextureKind::Diffuse, TextureSlot::file("a.png"))
            .with_texture(TextureKind::Specular, TextureSlot::file("s.png"))
            .with_texture(TextureKind::Diffuse, TextureSlot::file("b.png"));
        let diffuse = material
            .textures(TextureKind::Diffuse)
            .iter()
            .map(|slot| slot.path.as_str())
            .collect::<Vec<_>>();
        assert_eq!(diffuse, ["a.png", "b.png"]);
        assert_eq!(material.texture_count(TextureKind::Specular), 1);
        assert_eq!(material.texture_count(TextureKind::Height), 0);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let result = AssetImporter.import(Path::new("model.fbx"), PostProcess::DEFAULT);
        assert!(result.is_err());
    }
}
