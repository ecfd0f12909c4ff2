//! Post-processing of imported meshes.
//!
//! Importers hand raw file data over as [`SceneMesh`]es. Depending on the
//! [`PostProcess`] flags the data is triangulated, gets smooth normals and
//! tangent space generated and has its UVs flipped before it reaches the model
//! loader.

use cgmath::{InnerSpace, Vector2, Vector3, Zero};

use crate::resources::SceneMesh;

/// Post-processing steps applied by importers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PostProcess {
    /// Split polygons with more than three corners into triangle fans.
    pub triangulate: bool,
    /// Generate area-weighted vertex normals for meshes that have none.
    pub gen_smooth_normals: bool,
    /// Flip the vertical texture axis (`v = 1 - v`).
    pub flip_uvs: bool,
    /// Generate tangents and bitangents for meshes with UVs but no tangents.
    pub calc_tangent_space: bool,
}

impl PostProcess {
    /// The configuration models are loaded with: every step enabled.
    pub const DEFAULT: PostProcess = PostProcess {
        triangulate: true,
        gen_smooth_normals: true,
        flip_uvs: true,
        calc_tangent_space: true,
    };

    pub const NONE: PostProcess = PostProcess {
        triangulate: false,
        gen_smooth_normals: false,
        flip_uvs: false,
        calc_tangent_space: false,
    };

    pub fn apply(&self, mesh: &mut SceneMesh) {
        if self.triangulate {
            triangulate(mesh);
        }
        if self.gen_smooth_normals && mesh.normals.is_none() {
            generate_smooth_normals(mesh);
        }
        if self.flip_uvs {
            flip_uvs(mesh);
        }
        if self.calc_tangent_space && mesh.tangents.is_none() && mesh.tex_coords.is_some() {
            calculate_tangents(mesh);
        }
    }
}

impl Default for PostProcess {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Fan-split every face with more than three indices. Points and lines stay as they are.
pub fn triangulate(mesh: &mut SceneMesh) {
    if mesh.faces.iter().all(|face| face.len() <= 3) {
        return;
    }
    let faces = std::mem::take(&mut mesh.faces);
    for face in faces {
        if face.len() <= 3 {
            mesh.faces.push(face);
            continue;
        }
        for i in 1..face.len() - 1 {
            mesh.faces.push(vec![face[0], face[i], face[i + 1]]);
        }
    }
}

/**
 * Area-weighted vertex normals: every triangle adds its unnormalized face
 * normal (whose length is twice its area) to its corners.
 */
pub fn generate_smooth_normals(mesh: &mut SceneMesh) {
    let mut normals = vec![Vector3::<f32>::zero(); mesh.positions.len()];
    for face in mesh.faces.iter().filter(|face| face.len() == 3) {
        let Some([p0, p1, p2]) = triangle(&mesh.positions, face) else {
            continue;
        };
        let pos0: Vector3<f32> = p0.into();
        let pos1: Vector3<f32> = p1.into();
        let pos2: Vector3<f32> = p2.into();
        let face_normal = (pos1 - pos0).cross(pos2 - pos0);
        for &idx in face {
            normals[idx as usize] += face_normal;
        }
    }
    mesh.normals = Some(
        normals
            .into_iter()
            .map(|n| {
                if n.magnitude2() > 0.0 {
                    n.normalize().into()
                } else {
                    [0.0; 3]
                }
            })
            .collect(),
    );
}

pub fn flip_uvs(mesh: &mut SceneMesh) {
    if let Some(tex_coords) = &mut mesh.tex_coords {
        for uv in tex_coords.iter_mut() {
            uv[1] = 1.0 - uv[1];
        }
    }
}

/**
 * Files without tangents and bitangents need them calculated for normal maps
 * to work correctly. Every triangle contributes the same tangent/bitangent to
 * its three corners, which are averaged afterwards.
 */
pub fn calculate_tangents(mesh: &mut SceneMesh) {
    let Some(tex_coords) = &mesh.tex_coords else {
        return;
    };
    let vertex_count = mesh.positions.len();
    let mut tangents = vec![Vector3::<f32>::zero(); vertex_count];
    let mut bitangents = vec![Vector3::<f32>::zero(); vertex_count];
    let mut triangles_included = vec![0u32; vertex_count];

    for c in mesh.faces.iter().filter(|face| face.len() == 3) {
        let (Some([p0, p1, p2]), Some([t0, t1, t2])) = (triangle(&mesh.positions, c), triangle(tex_coords, c)) else {
            continue;
        };
        let pos0: Vector3<f32> = p0.into();
        let pos1: Vector3<f32> = p1.into();
        let pos2: Vector3<f32> = p2.into();

        let uv0: Vector2<f32> = t0.into();
        let uv1: Vector2<f32> = t1.into();
        let uv2: Vector2<f32> = t2.into();

        // Calculate the edges of the triangle
        let delta_pos1 = pos1 - pos0;
        let delta_pos2 = pos2 - pos0;

        // This will give us a direction to calculate the
        // tangent and bitangent
        let delta_uv1 = uv1 - uv0;
        let delta_uv2 = uv2 - uv0;

        // Solving the following system of equations will
        // give us the tangent and bitangent.
        //     delta_pos1 = delta_uv1.x * T + delta_uv1.y * B
        //     delta_pos2 = delta_uv2.x * T + delta_uv2.y * B
        let det = delta_uv1.x * delta_uv2.y - delta_uv1.y * delta_uv2.x;
        if det.abs() <= f32::EPSILON {
            // Degenerate UV mapping, the system has no solution
            continue;
        }
        let r = 1.0 / det;
        let tangent = (delta_pos1 * delta_uv2.y - delta_pos2 * delta_uv1.y) * r;
        let bitangent = (delta_pos2 * delta_uv1.x - delta_pos1 * delta_uv2.x) * r;

        // We'll use the same tangent/bitangent for each vertex in the triangle
        for &idx in c {
            tangents[idx as usize] += tangent;
            bitangents[idx as usize] += bitangent;
            // Used to average the tangents/bitangents
            triangles_included[idx as usize] += 1;
        }
    }

    // Average the tangents/bitangents
    for (i, n) in triangles_included.into_iter().enumerate() {
        if n == 0 {
            continue;
        }
        let denom = 1.0 / n as f32;
        tangents[i] *= denom;
        bitangents[i] *= denom;
    }

    mesh.tangents = Some(tangents.into_iter().map(Into::into).collect());
    mesh.bitangents = Some(bitangents.into_iter().map(Into::into).collect());
}

/// The three corners of `face` in `data`, or `None` if an index is out of range.
fn triangle<T: Copy>(data: &[T], face: &[u32]) -> Option<[T; 3]> {
    Some([
        *data.get(*face.first()? as usize)?,
        *data.get(*face.get(1)? as usize)?,
        *data.get(*face.get(2)? as usize)?,
    ])
}
