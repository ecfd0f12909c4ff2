//! glTF 2.0 import (`.gltf` and `.glb`).
//!
//! Every primitive of a glTF mesh becomes one [`SceneMesh`]; a node that
//! instantiates a glTF mesh references all of that mesh's primitives. The
//! nodes of the default scene hang below a synthetic root named after the file.
//! Node transforms are not applied.
//!
//! Material textures: base colour is diffuse, metallic-roughness is specular
//! and the normal texture is normal. glTF has no height slot. Images stored in
//! buffer views or base64 `data:` URIs are handed to the decoder as embedded
//! bytes; other URIs are percent-decoded into paths relative to the file.

use std::{collections::HashSet, path::Path};

use anyhow::{Context, Result};

use crate::{
    data_structures::texture::TextureKind,
    resources::{
        BoneInfluence, Importer, PostProcess, Scene, SceneMaterial, SceneMesh, SceneNode,
        TextureSlot, obj_importer::root_name,
    },
};

#[derive(Clone, Copy, Debug, Default)]
pub struct GltfImporter;

impl Importer for GltfImporter {
    fn import(&self, path: &Path, post_process: PostProcess) -> Result<Scene> {
        let gltf::Gltf { document, blob } =
            gltf::Gltf::open(path).with_context(|| format!("Failed to parse glTF file {:?}", path))?;
        let buffers = gltf::import_buffers(&document, path.parent(), blob)
            .with_context(|| format!("Failed to load the buffers of {:?}", path))?;
        let buffer_data = buffers.iter().map(|data| data.0.as_slice()).collect::<Vec<_>>();
        let file_name = root_name(path);

        let mut materials = document
            .materials()
            .map(|material| to_scene_material(&material, &buffer_data, &file_name))
            .collect::<Vec<_>>();
        let mut default_material = None;

        // glTF mesh index -> indices of the scene meshes made from its primitives
        let mut primitives_of_mesh = Vec::with_capacity(document.meshes().len());
        let mut meshes = Vec::new();
        for mesh in document.meshes() {
            let mut scene_meshes = Vec::new();
            for primitive in mesh.primitives() {
                let Some(faces) = read_faces(&primitive, &buffer_data) else {
                    log::warn!(
                        "Skipping primitive {} of mesh {:?} in {:?}: {:?} is not a triangle mode",
                        primitive.index(),
                        mesh.name(),
                        path,
                        primitive.mode()
                    );
                    continue;
                };
                let material_index = match primitive.material().index() {
                    Some(idx) => idx,
                    None => *default_material.get_or_insert_with(|| {
                        materials.push(SceneMaterial::new("DefaultMaterial"));
                        materials.len() - 1
                    }),
                };
                let name = match mesh.name() {
                    Some(name) => format!("{}.{}", name, primitive.index()),
                    None => format!("mesh{}.{}", mesh.index(), primitive.index()),
                };
                scene_meshes.push(meshes.len());
                meshes.push(to_scene_mesh(name, &primitive, &buffer_data, faces, material_index));
            }
            primitives_of_mesh.push(scene_meshes);
        }

        let roots: Vec<gltf::Node> = match document.default_scene().or_else(|| document.scenes().next()) {
            Some(scene) => scene.nodes().collect(),
            None => {
                // No scene declared: every node that isn't somebody's child is a root
                let children = document
                    .nodes()
                    .flat_map(|node| node.children().map(|child| child.index()))
                    .collect::<HashSet<_>>();
                document
                    .nodes()
                    .filter(|node| !children.contains(&node.index()))
                    .collect()
            }
        };

        let mut scene = Scene {
            root: SceneNode {
                name: file_name,
                meshes: Vec::new(),
                children: roots
                    .iter()
                    .map(|node| to_scene_node(node, &primitives_of_mesh))
                    .collect(),
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

fn to_scene_node(node: &gltf::Node, primitives_of_mesh: &[Vec<usize>]) -> SceneNode {
    SceneNode {
        name: node
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("node{}", node.index())),
        meshes: node
            .mesh()
            .and_then(|mesh| primitives_of_mesh.get(mesh.index()).cloned())
            .unwrap_or_default(),
        children: node
            .children()
            .map(|child| to_scene_node(&child, primitives_of_mesh))
            .collect(),
    }
}

/// Faces of a triangle, strip or fan primitive; `None` for points and lines.
fn read_faces(primitive: &gltf::Primitive, buffers: &[&[u8]]) -> Option<Vec<Vec<u32>>> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).copied());
    let indices = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect::<Vec<_>>(),
        None => {
            let count = reader.read_positions().map_or(0, |positions| positions.len());
            (0..count as u32).collect()
        }
    };
    let faces = match primitive.mode() {
        gltf::mesh::Mode::Triangles => indices.chunks_exact(3).map(<[u32]>::to_vec).collect(),
        gltf::mesh::Mode::TriangleStrip => indices
            .windows(3)
            .enumerate()
            .map(|(i, w)| {
                // Every other triangle of a strip is wound the other way round
                if i % 2 == 0 {
                    vec![w[0], w[1], w[2]]
                } else {
                    vec![w[1], w[0], w[2]]
                }
            })
            .collect(),
        gltf::mesh::Mode::TriangleFan => indices
            .iter()
            .skip(1)
            .collect::<Vec<_>>()
            .windows(2)
            .map(|w| vec![indices[0], *w[0], *w[1]])
            .collect(),
        _ => return None,
    };
    Some(faces)
}

fn to_scene_mesh(
    name: String,
    primitive: &gltf::Primitive,
    buffers: &[&[u8]],
    faces: Vec<Vec<u32>>,
    material_index: usize,
) -> SceneMesh {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).copied());

    let positions = reader
        .read_positions()
        .map(|positions| positions.collect::<Vec<_>>())
        .unwrap_or_default();
    let normals = reader.read_normals().map(|normals| normals.collect::<Vec<_>>());
    let tex_coords = reader
        .read_tex_coords(0)
        .map(|tex_coords| tex_coords.into_f32().collect::<Vec<_>>());

    // glTF stores tangents as vec4 where w holds the handedness of the bitangent
    let (tangents, bitangents) = match (reader.read_tangents(), &normals) {
        (Some(tangent_attribute), Some(normals)) => {
            let mut tangents = Vec::with_capacity(positions.len());
            let mut bitangents = Vec::with_capacity(positions.len());
            for (tangent, normal) in tangent_attribute.zip(normals.iter()) {
                let tangent: cgmath::Vector4<f32> = tangent.into();
                let normal: cgmath::Vector3<f32> = (*normal).into();
                let bitangent = normal.cross(tangent.truncate()) * tangent.w;
                tangents.push(tangent.truncate().into());
                bitangents.push(bitangent.into());
            }
            (Some(tangents), Some(bitangents))
        }
        _ => (None, None),
    };

    let bones = match (reader.read_joints(0), reader.read_weights(0)) {
        (Some(joints), Some(weights)) => Some(
            joints
                .into_u16()
                .zip(weights.into_f32())
                .map(|(ids, weights)| BoneInfluence {
                    ids: ids.map(i32::from),
                    weights,
                })
                .collect::<Vec<_>>(),
        ),
        _ => None,
    };

    SceneMesh {
        name,
        positions,
        normals,
        tex_coords,
        tangents,
        bitangents,
        bones,
        faces,
        material_index,
    }
}

fn to_scene_material(material: &gltf::Material, buffers: &[&[u8]], file_name: &str) -> SceneMaterial {
    let mut scene_material = SceneMaterial::new(
        material
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("material{}", material.index().unwrap_or_default())),
    );
    let pbr = material.pbr_metallic_roughness();
    let textures = [
        (TextureKind::Diffuse, pbr.base_color_texture().map(|info| info.texture())),
        (
            TextureKind::Specular,
            pbr.metallic_roughness_texture().map(|info| info.texture()),
        ),
        (TextureKind::Normal, material.normal_texture().map(|normal| normal.texture())),
    ];
    for (kind, texture) in textures {
        let Some(texture) = texture else {
            continue;
        };
        match texture_slot(&texture, buffers, file_name) {
            Some(slot) => scene_material.add_texture(kind, slot),
            None => log::warn!(
                "Texture {} of material {:?} in {} can't be loaded and is skipped",
                texture.index(),
                scene_material.name,
                file_name
            ),
        }
    }
    scene_material
}

fn texture_slot(texture: &gltf::Texture, buffers: &[&[u8]], file_name: &str) -> Option<TextureSlot> {
    let image = texture.source();
    let key = format!("{}#image{}", file_name, image.index());
    match image.source() {
        gltf::image::Source::Uri { uri, .. } => match uri.strip_prefix("data:") {
            Some(data) => decode_data_uri(data).map(|bytes| TextureSlot::embedded(key, bytes)),
            None => Some(TextureSlot::file(decode_relative_uri(uri))),
        },
        gltf::image::Source::View { view, .. } => {
            let buffer = buffers.get(view.buffer().index())?;
            let bytes = buffer.get(view.offset()..view.offset() + view.length())?;
            Some(TextureSlot::embedded(key, bytes))
        }
    }
}

/// Bytes of a `data:[<media type>];base64,<data>` URI, given what follows `data:`.
fn decode_data_uri(data: &str) -> Option<Vec<u8>> {
    let Some((_media_type, payload)) = data.split_once(";base64,") else {
        log::warn!("Only base64 data URIs are supported");
        return None;
    };
    match base64::decode(payload) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            log::warn!("Invalid base64 in data URI: {}", err);
            None
        }
    }
}

/// Relative URIs are percent-encoded, paths on disk are not.
fn decode_relative_uri(uri: &str) -> String {
    match urlencoding::decode(uri) {
        Ok(path) => path.into_owned(),
        Err(_) => uri.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_data_uri_is_decoded() {
        let bytes = decode_data_uri("image/png;base64,iVBORw0KGgo=").unwrap();

        assert_eq!(bytes, b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn data_uri_without_base64_is_rejected() {
        assert_eq!(decode_data_uri("image/png,plain"), None);
        assert_eq!(decode_data_uri("image/png;base64,!!!"), None);
    }

    #[test]
    fn relative_uri_is_percent_decoded() {
        assert_eq!(decode_relative_uri("textures/old%20wood.png"), "textures/old wood.png");
        assert_eq!(decode_relative_uri("plain.png"), "plain.png");
        // Invalid UTF-8 after decoding keeps the URI as written
        assert_eq!(decode_relative_uri("bad%FF.png"), "bad%FF.png");
    }
}
