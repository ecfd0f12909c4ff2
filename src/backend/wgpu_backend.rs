//! [`GpuBackend`] on top of WGPU.
//!
//! WGPU has no global binding state, so this backend keeps its own
//! [`BindingState`] and turns every `draw_indexed` into a recorded
//! [`DrawCommand`] with a bind group built from whatever textures were bound
//! at that moment. [`WgpuBackend::encode`] replays the recorded commands into
//! a render pass; [`WgpuBackend::clear_commands`] starts the next frame.
//!
//! Shaders are registered with [`WgpuBackend::register_shader`]. Each sampler
//! uniform name becomes a texture + sampler pair in bind group 0 (see
//! [`sampler_bind_group_layout`]), and its "uniform value" is the texture unit
//! it samples from, defaulting to unit 0.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow, bail};
use wgpu::util::DeviceExt;

use crate::{
    backend::{
        BindingState, BufferId, GpuBackend, HandleTable, ShaderId, TextureId, UniformLocation,
        VertexArrayId,
    },
    data_structures::texture::GpuTexture,
    pipelines::basic::{mk_model_pipeline, sampler_bind_group_layout},
    resources::texture::DecodedImage,
};

/// Everything needed to turn a shader module into a model pipeline.
pub struct ShaderDescriptor<'a> {
    pub module: wgpu::ShaderModuleDescriptor<'a>,
    /// Sampler uniform names in binding order, e.g. `["texture_diffuse1", "texture_normal1"]`.
    pub samplers: &'a [&'a str],
    pub color_format: wgpu::TextureFormat,
    pub depth_format: Option<wgpu::TextureFormat>,
    /// Caller owned layouts (camera, lights, ...) for groups 1, 2, ...
    pub extra_bind_group_layouts: &'a [&'a wgpu::BindGroupLayout],
}

struct ShaderProgram {
    pipeline: wgpu::RenderPipeline,
    sampler_layout: wgpu::BindGroupLayout,
    samplers: Vec<String>,
    units: HashMap<UniformLocation, u32>,
}

#[derive(Clone, Copy, Debug)]
struct VertexArray {
    vertex_buffer: BufferId,
    index_buffer: BufferId,
}

/// One recorded indexed draw.
#[derive(Debug)]
pub struct DrawCommand {
    pub shader: ShaderId,
    pub vertex_array: VertexArrayId,
    pub index_count: u32,
    bind_group: wgpu::BindGroup,
}

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    buffers: HandleTable<wgpu::Buffer>,
    vertex_arrays: HandleTable<VertexArray>,
    // `None` until pixel data has been uploaded
    textures: HandleTable<Option<GpuTexture>>,
    shaders: HandleTable<ShaderProgram>,
    fallback: GpuTexture,
    state: BindingState,
    commands: Vec<DrawCommand>,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let fallback = GpuTexture::create_solid(1, 1, [255, 255, 255, 255], "fallback texture", &device, &queue);
        Self {
            device,
            queue,
            buffers: HandleTable::new(),
            vertex_arrays: HandleTable::new(),
            textures: HandleTable::new(),
            shaders: HandleTable::new(),
            fallback,
            state: BindingState::default(),
            commands: Vec::new(),
        }
    }

    /// Request an adapter and device without a surface, e.g. for offscreen rendering.
    pub async fn headless() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("No suitable GPU adapter found")?;
        log::info!("Using adapter {:?}", adapter.get_info().name);
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("flow-model device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("Failed to request a GPU device")?;
        Ok(Self::new(device, queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn binding_state(&self) -> &BindingState {
        &self.state
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Build the pipeline for a shader and hand out its handle.
    pub fn register_shader(&mut self, desc: ShaderDescriptor) -> ShaderId {
        let sampler_layout = sampler_bind_group_layout(&self.device, desc.samplers.len());
        let pipeline = mk_model_pipeline(
            &self.device,
            &sampler_layout,
            desc.extra_bind_group_layouts,
            desc.color_format,
            desc.depth_format,
            desc.module,
        );
        let program = ShaderProgram {
            pipeline,
            sampler_layout,
            samplers: desc.samplers.iter().map(|name| name.to_string()).collect(),
            units: HashMap::new(),
        };
        ShaderId(self.shaders.insert(program))
    }

    pub fn release_shader(&mut self, shader: ShaderId) {
        if self.shaders.remove(shader.0).is_none() {
            log::warn!("Tried to release unknown shader {:?}", shader);
        }
    }

    /// Replay every recorded draw into `render_pass`.
    ///
    /// `extra_bind_groups` are set as groups 1, 2, ... and must match the
    /// `extra_bind_group_layouts` the shaders were registered with.
    pub fn encode(&self, render_pass: &mut wgpu::RenderPass<'_>, extra_bind_groups: &[&wgpu::BindGroup]) -> Result<()> {
        for command in &self.commands {
            let program = self
                .shaders
                .get(command.shader.0)
                .ok_or_else(|| anyhow!("Shader {:?} was released before encoding", command.shader))?;
            let vertex_array = self
                .vertex_arrays
                .get(command.vertex_array.0)
                .ok_or_else(|| anyhow!("Vertex array {:?} was released before encoding", command.vertex_array))?;
            let vertex_buffer = self
                .buffers
                .get(vertex_array.vertex_buffer.0)
                .ok_or_else(|| anyhow!("Vertex buffer {:?} was released before encoding", vertex_array.vertex_buffer))?;
            let index_buffer = self
                .buffers
                .get(vertex_array.index_buffer.0)
                .ok_or_else(|| anyhow!("Index buffer {:?} was released before encoding", vertex_array.index_buffer))?;
            if command.index_count == 0 || vertex_buffer.size() == 0 || index_buffer.size() == 0 {
                continue;
            }

            render_pass.set_pipeline(&program.pipeline);
            render_pass.set_bind_group(0, &command.bind_group, &[]);
            for (offset, group) in extra_bind_groups.iter().enumerate() {
                render_pass.set_bind_group(offset as u32 + 1, *group, &[]);
            }
            render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            render_pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..command.index_count, 0, 0..1);
        }
        Ok(())
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    fn sampled_texture(&self, unit: u32) -> &GpuTexture {
        self.state
            .texture_at(unit)
            .and_then(|id| self.textures.get(id.0))
            .and_then(Option::as_ref)
            .unwrap_or(&self.fallback)
    }
}

impl GpuBackend for WgpuBackend {
    fn create_vertex_buffer(&mut self, label: &str, contents: &[u8]) -> Result<BufferId> {
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: wgpu::BufferUsages::VERTEX,
        });
        Ok(BufferId(self.buffers.insert(buffer)))
    }

    fn create_index_buffer(&mut self, label: &str, indices: &[u32]) -> Result<BufferId> {
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Ok(BufferId(self.buffers.insert(buffer)))
    }

    fn create_vertex_array(
        &mut self,
        label: &str,
        vertex_buffer: BufferId,
        index_buffer: BufferId,
        layout: &wgpu::VertexBufferLayout<'_>,
    ) -> Result<VertexArrayId> {
        if self.buffers.get(vertex_buffer.0).is_none() || self.buffers.get(index_buffer.0).is_none() {
            bail!("Vertex array {label} references a buffer that doesn't exist.");
        }
        // Pipelines are built for `Vertex`, anything else can't be drawn by them
        let expected = crate::data_structures::mesh::Vertex::desc();
        if layout.array_stride != expected.array_stride || layout.attributes != expected.attributes {
            bail!("Vertex array {label} uses a vertex layout the model pipelines don't support.");
        }
        let vertex_array = VertexArray {
            vertex_buffer,
            index_buffer,
        };
        Ok(VertexArrayId(self.vertex_arrays.insert(vertex_array)))
    }

    fn create_texture(&mut self, label: &str) -> Result<TextureId> {
        log::debug!("Creating texture {label}");
        Ok(TextureId(self.textures.insert(None)))
    }

    fn upload_texture(&mut self, texture: TextureId, image: &DecodedImage, srgb: bool) -> Result<()> {
        let label = format!("{:?}", texture);
        let gpu_texture = GpuTexture::from_decoded(&self.device, &self.queue, image, &label, srgb)?;
        let slot = self
            .textures
            .get_mut(texture.0)
            .ok_or_else(|| anyhow!("Texture {:?} doesn't exist", texture))?;
        *slot = Some(gpu_texture);
        Ok(())
    }

    fn uniform_location(&self, shader: ShaderId, name: &str) -> Option<UniformLocation> {
        self.shaders
            .get(shader.0)?
            .samplers
            .iter()
            .position(|sampler| sampler == name)
            .map(|idx| UniformLocation(idx as u32))
    }

    fn set_uniform_i32(&mut self, shader: ShaderId, location: UniformLocation, value: i32) {
        let Some(program) = self.shaders.get_mut(shader.0) else {
            log::warn!("Tried to set a uniform on unknown shader {:?}", shader);
            return;
        };
        match u32::try_from(value) {
            Ok(unit) => {
                program.units.insert(location, unit);
            }
            Err(_) => log::warn!("Texture unit {} for {:?} is negative", value, location),
        }
    }

    fn active_texture(&mut self, unit: u32) {
        self.state.active_unit = unit;
    }

    fn bind_texture(&mut self, texture: TextureId) {
        self.state.bind_texture(texture);
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) {
        self.state.vertex_array = vertex_array;
    }

    fn draw_indexed(&mut self, shader: ShaderId, index_count: u32) -> Result<()> {
        let vertex_array = self
            .state
            .vertex_array
            .context("draw_indexed called without a bound vertex array")?;
        if self.vertex_arrays.get(vertex_array.0).is_none() {
            bail!("Vertex array {:?} doesn't exist", vertex_array);
        }
        // Empty buffers can't be bound to a render pass
        if index_count == 0 {
            log::debug!("Skipping empty draw of {:?}", vertex_array);
            return Ok(());
        }
        let program = self
            .shaders
            .get(shader.0)
            .ok_or_else(|| anyhow!("Shader {:?} doesn't exist", shader))?;

        let textures = (0..program.samplers.len())
            .map(|idx| {
                let unit = program
                    .units
                    .get(&UniformLocation(idx as u32))
                    .copied()
                    .unwrap_or(0);
                self.sampled_texture(unit)
            })
            .collect::<Vec<_>>();
        let entries = textures
            .iter()
            .enumerate()
            .flat_map(|(idx, texture)| {
                [
                    wgpu::BindGroupEntry {
                        binding: 2 * idx as u32,
                        resource: wgpu::BindingResource::TextureView(&texture.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2 * idx as u32 + 1,
                        resource: wgpu::BindingResource::Sampler(&texture.sampler),
                    },
                ]
            })
            .collect::<Vec<_>>();
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &program.sampler_layout,
            entries: &entries,
            label: Some("Model sampler_bind_group"),
        });

        self.commands.push(DrawCommand {
            shader,
            vertex_array,
            index_count,
            bind_group,
        });
        Ok(())
    }

    fn release_vertex_array(&mut self, vertex_array: VertexArrayId) {
        if self.vertex_arrays.remove(vertex_array.0).is_none() {
            log::warn!("Tried to release unknown vertex array {:?}", vertex_array);
        }
        if self.state.vertex_array == Some(vertex_array) {
            self.state.vertex_array = None;
        }
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        match self.buffers.remove(buffer.0) {
            Some(buffer) => buffer.destroy(),
            None => log::warn!("Tried to release unknown buffer {:?}", buffer),
        }
    }

    fn release_texture(&mut self, texture: TextureId) {
        match self.textures.remove(texture.0) {
            Some(Some(gpu_texture)) => gpu_texture.texture.destroy(),
            Some(None) => (),
            None => log::warn!("Tried to release unknown texture {:?}", texture),
        }
        self.state.unbind_texture(texture);
    }
}
