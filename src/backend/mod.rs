//! GPU backend abstraction.
//!
//! Meshes and models talk to the GPU through the narrow [`GpuBackend`] trait,
//! which mirrors a classic bind-then-draw API: buffers and vertex arrays are
//! created once, textures are bound to numbered units, sampler uniforms are
//! pointed at those units and an indexed draw consumes whatever is bound.
//!
//! # Binding state
//!
//! The active texture unit, the texture bound to each unit and the bound vertex
//! array are global to a backend instance. [`Mesh::draw`](crate::data_structures::mesh::Mesh::draw)
//! changes all three and only resets the active unit to 0 afterwards, so
//! callers must not rely on binding state surviving a draw.
//!
//! - `wgpu_backend` holds [`WgpuBackend`](wgpu_backend::WgpuBackend), which
//!   records draws and replays them into a `wgpu::RenderPass`

use std::collections::BTreeMap;

use anyhow::Result;

use crate::resources::texture::DecodedImage;

pub mod wgpu_backend;

/// Handle of a vertex or index buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

/// Handle of a vertex array: a vertex buffer, an index buffer and an attribute layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexArrayId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Handle of a compiled and linked shader program, owned by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformLocation(pub u32);

pub trait GpuBackend {
    fn create_vertex_buffer(&mut self, label: &str, contents: &[u8]) -> Result<BufferId>;

    fn create_index_buffer(&mut self, label: &str, indices: &[u32]) -> Result<BufferId>;

    /// Describe how `vertex_buffer` is fed to the shader and which index buffer goes with it.
    fn create_vertex_array(
        &mut self,
        label: &str,
        vertex_buffer: BufferId,
        index_buffer: BufferId,
        layout: &wgpu::VertexBufferLayout<'_>,
    ) -> Result<VertexArrayId>;

    /// Create a texture object without pixel data.
    fn create_texture(&mut self, label: &str) -> Result<TextureId>;

    fn upload_texture(&mut self, texture: TextureId, image: &DecodedImage, srgb: bool) -> Result<()>;

    /// `None` if `shader` has no sampler uniform called `name`.
    fn uniform_location(&self, shader: ShaderId, name: &str) -> Option<UniformLocation>;

    fn set_uniform_i32(&mut self, shader: ShaderId, location: UniformLocation, value: i32);

    fn active_texture(&mut self, unit: u32);

    /// Bind `texture` to the active unit.
    fn bind_texture(&mut self, texture: TextureId);

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>);

    /// Draw `index_count` indices of the bound vertex array as a triangle list.
    fn draw_indexed(&mut self, shader: ShaderId, index_count: u32) -> Result<()>;

    fn release_vertex_array(&mut self, vertex_array: VertexArrayId);

    fn release_buffer(&mut self, buffer: BufferId);

    fn release_texture(&mut self, texture: TextureId);
}

/// Global binding state of a backend.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindingState {
    pub active_unit: u32,
    pub units: BTreeMap<u32, TextureId>,
    pub vertex_array: Option<VertexArrayId>,
}

impl BindingState {
    pub fn bind_texture(&mut self, texture: TextureId) {
        self.units.insert(self.active_unit, texture);
    }

    pub fn texture_at(&self, unit: u32) -> Option<TextureId> {
        self.units.get(&unit).copied()
    }

    /// Forget a released texture wherever it is still bound.
    pub fn unbind_texture(&mut self, texture: TextureId) {
        self.units.retain(|_, bound| *bound != texture);
    }
}

/// Slot storage that hands out non-zero `u32` handles. Handles are never reused.
#[derive(Debug)]
pub(crate) struct HandleTable<T> {
    slots: Vec<Option<T>>,
}

impl<T> HandleTable<T> {
    pub(crate) fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub(crate) fn insert(&mut self, value: T) -> u32 {
        self.slots.push(Some(value));
        self.slots.len() as u32
    }

    pub(crate) fn get(&self, handle: u32) -> Option<&T> {
        let idx = (handle as usize).checked_sub(1)?;
        self.slots.get(idx).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, handle: u32) -> Option<&mut T> {
        let idx = (handle as usize).checked_sub(1)?;
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    pub(crate) fn remove(&mut self, handle: u32) -> Option<T> {
        let idx = (handle as usize).checked_sub(1)?;
        self.slots.get_mut(idx).and_then(Option::take)
    }

    #[cfg(test)]
    pub(crate) fn live(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_start_at_one_and_are_not_reused() {
        let mut table = HandleTable::new();
        let a = table.insert("a");
        let b = table.insert("b");
        assert_eq!((a, b), (1, 2));
        assert_eq!(table.remove(a), Some("a"));
        assert_eq!(table.remove(a), None);
        assert_eq!(table.get(0), None);
        assert_eq!(table.insert("c"), 3);
        assert_eq!(table.live(), 2);
    }

    #[test]
    fn binding_follows_active_unit() {
        let mut state = BindingState::default();
        state.active_unit = 2;
        state.bind_texture(TextureId(5));
        assert_eq!(state.texture_at(2), Some(TextureId(5)));
        assert_eq!(state.texture_at(0), None);
        state.unbind_texture(TextureId(5));
        assert_eq!(state.texture_at(2), None);
    }
}
