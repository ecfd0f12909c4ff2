//! Drawable meshes.
//!
//! A [`Mesh`] owns its vertices, indices and texture references together with
//! the GPU handles created for them. GPU setup happens exactly once in
//! [`Mesh::new`]; [`Mesh::release`] consumes the mesh so the handles can't be
//! released twice.

use std::{mem, sync::Arc};

use anyhow::{Context, Result};

use crate::{
    backend::{BufferId, GpuBackend, ShaderId, VertexArrayId},
    data_structures::{
        array::GrowableArray,
        texture::{Texture, TextureKind},
    },
};

/// Number of bone influences stored per vertex.
pub const MAX_BONE_INFLUENCE: usize = 4;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
    pub bone_ids: [i32; MAX_BONE_INFLUENCE],
    pub bone_weights: [f32; MAX_BONE_INFLUENCE],
}

impl Vertex {
    const ATTRIBS: [wgpu::VertexAttribute; 7] = [
        wgpu::VertexAttribute {
            offset: mem::offset_of!(Vertex, position) as wgpu::BufferAddress,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x3,
        },
        wgpu::VertexAttribute {
            offset: mem::offset_of!(Vertex, normal) as wgpu::BufferAddress,
            shader_location: 1,
            format: wgpu::VertexFormat::Float32x3,
        },
        wgpu::VertexAttribute {
            offset: mem::offset_of!(Vertex, tex_coords) as wgpu::BufferAddress,
            shader_location: 2,
            format: wgpu::VertexFormat::Float32x2,
        },
        wgpu::VertexAttribute {
            offset: mem::offset_of!(Vertex, tangent) as wgpu::BufferAddress,
            shader_location: 3,
            format: wgpu::VertexFormat::Float32x3,
        },
        wgpu::VertexAttribute {
            offset: mem::offset_of!(Vertex, bitangent) as wgpu::BufferAddress,
            shader_location: 4,
            format: wgpu::VertexFormat::Float32x3,
        },
        // Bone ids are read as integers, not normalized floats
        wgpu::VertexAttribute {
            offset: mem::offset_of!(Vertex, bone_ids) as wgpu::BufferAddress,
            shader_location: 5,
            format: wgpu::VertexFormat::Sint32x4,
        },
        wgpu::VertexAttribute {
            offset: mem::offset_of!(Vertex, bone_weights) as wgpu::BufferAddress,
            shader_location: 6,
            format: wgpu::VertexFormat::Float32x4,
        },
    ];

    /**
     * As we store vertex data directly in the GPU memory we need to tell what the bytes refer to.
     *
     * Locations: 0 position, 1 normal, 2 tex coords, 3 tangent, 4 bitangent,
     * 5 bone ids, 6 bone weights.
     */
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Sampler uniform names for textures of the given kinds, in order.
///
/// Every kind counts separately from 1, so two diffuse maps and one specular
/// map yield `texture_diffuse1`, `texture_diffuse2`, `texture_specular1`.
pub fn sampler_uniform_names<I>(kinds: I) -> Vec<String>
where
    I: IntoIterator<Item = TextureKind>,
{
    let mut counters = [0u32; TextureKind::ALL.len()];
    kinds
        .into_iter()
        .map(|kind| {
            let counter = &mut counters[kind.index()];
            *counter += 1;
            format!("{}{}", kind.uniform_prefix(), counter)
        })
        .collect()
}

#[derive(Debug)]
pub struct Mesh {
    name: String,
    vertices: GrowableArray<Vertex>,
    indices: GrowableArray<u32>,
    textures: GrowableArray<Arc<Texture>>,
    vertex_buffer: BufferId,
    index_buffer: BufferId,
    vertex_array: VertexArrayId,
}

impl Mesh {
    /// Take ownership of the mesh data and upload it: one vertex buffer, one
    /// index buffer and one vertex array using [`Vertex::desc`].
    pub fn new<B>(
        backend: &mut B,
        name: &str,
        vertices: GrowableArray<Vertex>,
        indices: GrowableArray<u32>,
        textures: GrowableArray<Arc<Texture>>,
    ) -> Result<Self>
    where
        B: GpuBackend + ?Sized,
    {
        let vertex_buffer = backend
            .create_vertex_buffer(
                &format!("{:?} Vertex Buffer", name),
                bytemuck::cast_slice(vertices.as_slice()),
            )
            .with_context(|| format!("Failed to create the vertex buffer of mesh {name}"))?;
        let index_buffer = match backend.create_index_buffer(&format!("{:?} Index Buffer", name), indices.as_slice()) {
            Ok(buffer) => buffer,
            Err(e) => {
                backend.release_buffer(vertex_buffer);
                return Err(e.context(format!("Failed to create the index buffer of mesh {name}")));
            }
        };
        let vertex_array = match backend.create_vertex_array(
            &format!("{:?} Vertex Array", name),
            vertex_buffer,
            index_buffer,
            &Vertex::desc(),
        ) {
            Ok(vertex_array) => vertex_array,
            Err(e) => {
                backend.release_buffer(vertex_buffer);
                backend.release_buffer(index_buffer);
                return Err(e.context(format!("Failed to create the vertex array of mesh {name}")));
            }
        };

        Ok(Self {
            name: name.to_string(),
            vertices,
            indices,
            textures,
            vertex_buffer,
            index_buffer,
            vertex_array,
        })
    }

    /// Bind every texture to its own unit, point the matching sampler uniform
    /// at it and draw all indices.
    ///
    /// Texture `i` goes to unit `i`; its uniform name comes from
    /// [`sampler_uniform_names`]. Samplers the shader doesn't declare are
    /// skipped. Afterwards the vertex array is unbound and unit 0 is active
    /// again; nothing else is restored.
    pub fn draw<B>(&self, backend: &mut B, shader: ShaderId) -> Result<()>
    where
        B: GpuBackend + ?Sized,
    {
        let names = sampler_uniform_names(self.textures.iter().map(|texture| texture.kind));
        for (unit, (texture, name)) in self.textures.iter().zip(names.iter()).enumerate() {
            let unit = unit as u32;
            backend.active_texture(unit);
            if let Some(location) = backend.uniform_location(shader, name) {
                backend.set_uniform_i32(shader, location, unit as i32);
            }
            backend.bind_texture(texture.id);
        }

        let index_count = u32::try_from(self.indices.len())
            .with_context(|| format!("Mesh {} has too many indices to draw", self.name))?;
        backend.bind_vertex_array(Some(self.vertex_array));
        let drawn = backend.draw_indexed(shader, index_count);
        backend.bind_vertex_array(None);
        backend.active_texture(0);
        drawn
    }

    /// Release the GPU buffers and vertex array, then drop the mesh data.
    ///
    /// Textures are shared with the model's cache and released there.
    pub fn release<B>(self, backend: &mut B)
    where
        B: GpuBackend + ?Sized,
    {
        backend.release_vertex_array(self.vertex_array);
        backend.release_buffer(self.vertex_buffer);
        backend.release_buffer(self.index_buffer);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertices(&self) -> &GrowableArray<Vertex> {
        &self.vertices
    }

    pub fn indices(&self) -> &GrowableArray<u32> {
        &self.indices
    }

    pub fn textures(&self) -> &GrowableArray<Arc<Texture>> {
        &self.textures
    }

    pub fn vertex_buffer(&self) -> BufferId {
        self.vertex_buffer
    }

    pub fn index_buffer(&self) -> BufferId {
        self.index_buffer
    }

    pub fn vertex_array(&self) -> VertexArrayId {
        self.vertex_array
    }
}
