//! Wavefront OBJ import via `tobj`.
//!
//! Every OBJ object/group becomes one child node of the scene root holding one
//! mesh. MTL texture maps are mapped onto the four texture kinds:
//! `map_Kd` diffuse, `map_Ks` specular, `map_Bump`/`norm` normal and `map_Ka`
//! height (the long-standing convention for OBJ exports that store height
//! maps in the ambient slot).

use std::path::Path;

use anyhow::{Context, Result};

use crate::{
    data_structures::texture::TextureKind,
    resources::{Importer, PostProcess, Scene, SceneMaterial, SceneMesh, SceneNode, TextureSlot},
};

#[derive(Clone, Copy, Debug, Default)]
pub struct ObjImporter;

impl Importer for ObjImporter {
    fn import(&self, path: &Path, post_process: PostProcess) -> Result<Scene> {
        let (models, obj_materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                triangulate: post_process.triangulate,
                single_index: true,
                ..Default::default()
            },
        )
        .with_context(|| format!("Failed to parse OBJ file {:?}", path))?;

        let mut materials = match obj_materials {
            Ok(materials) => materials.iter().map(to_scene_material).collect::<Vec<_>>(),
            Err(e) => {
                log::warn!("OBJ file {:?} has no usable material library: {}", path, e);
                Vec::new()
            }
        };

        let mut default_material = None;
        let mut meshes = Vec::with_capacity(models.len());
        let mut children = Vec::with_capacity(models.len());
        for model in &models {
            let material_index = match model.mesh.material_id {
                Some(id) if id < materials.len() => id,
                _ => *default_material.get_or_insert_with(|| {
                    materials.push(SceneMaterial::new("DefaultMaterial"));
                    materials.len() - 1
                }),
            };
            children.push(SceneNode {
                name: model.name.clone(),
                meshes: vec![meshes.len()],
                children: Vec::new(),
            });
            meshes.push(to_scene_mesh(model, material_index));
        }

        let mut scene = Scene {
            root: SceneNode {
                name: root_name(path),
                meshes: Vec::new(),
                children,
            },
            meshes,
            materials,
        };
        scene.post_process(post_process);
        log::info!(
            "Imported {:?}: {} meshes, {} materials",
            path,
            scene.meshes.len(),
            scene.materials.len()
        );
        Ok(scene)
    }
}

pub(crate) fn root_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn to_scene_mesh(model: &tobj::Model, material_index: usize) -> SceneMesh {
    let mesh = &model.mesh;
    let positions = mesh
        .positions
        .chunks_exact(3)
        .map(|p| [p[0], p[1], p[2]])
        .collect::<Vec<_>>();
    let normals = (!mesh.normals.is_empty()).then(|| {
        mesh.normals
            .chunks_exact(3)
            .map(|n| [n[0], n[1], n[2]])
            .collect::<Vec<_>>()
    });
    let tex_coords = (!mesh.texcoords.is_empty()).then(|| {
        mesh.texcoords
            .chunks_exact(2)
            .map(|t| [t[0], t[1]])
            .collect::<Vec<_>>()
    });

    // Without arities every face is a triangle
    let faces = if mesh.face_arities.is_empty() {
        mesh.indices.chunks(3).map(<[u32]>::to_vec).collect()
    } else {
        let mut start = 0usize;
        mesh.face_arities
            .iter()
            .map(|&arity| {
                let end = (start + arity as usize).min(mesh.indices.len());
                let face = mesh.indices[start..end].to_vec();
                start = end;
                face
            })
            .collect()
    };

    SceneMesh {
        name: model.name.clone(),
        positions,
        normals,
        tex_coords,
        faces,
        material_index,
        ..Default::default()
    }
}

fn to_scene_material(material: &tobj::Material) -> SceneMaterial {
    let mut scene_material = SceneMaterial::new(material.name.clone());
    let maps = [
        (TextureKind::Diffuse, material.diffuse_texture.as_deref()),
        (TextureKind::Specular, material.specular_texture.as_deref()),
        (
            TextureKind::Normal,
            material
                .normal_texture
                .as_deref()
                .or_else(|| material.unknown_param.get("norm").map(String::as_str)),
        ),
        (TextureKind::Height, material.ambient_texture.as_deref()),
    ];
    for (kind, path) in maps {
        if let Some(path) = path.filter(|path| !path.is_empty()) {
            scene_material.add_texture(kind, TextureSlot::file(path));
        }
    }
    scene_material
}
