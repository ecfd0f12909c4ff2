#![allow(dead_code)]

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

use anyhow::{Result, bail};
use flow_model::{
    backend::{BindingState, BufferId, GpuBackend, ShaderId, TextureId, UniformLocation, VertexArrayId},
    resources::{
        Importer, PostProcess, Scene, SceneMaterial, SceneMesh, SceneNode,
        texture::{DecodedImage, ImageDecoder, PixelFormat},
    },
};

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A draw as seen by the backend: what was bound when `draw_indexed` ran.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct DrawCall {
    pub(crate) shader: ShaderId,
    pub(crate) vertex_array: VertexArrayId,
    pub(crate) index_count: u32,
    pub(crate) units: BTreeMap<u32, TextureId>,
}

/**
 * In-memory [`GpuBackend`] that records every call.
 *
 * Handles come from one counter shared by all resource kinds. Releasing a
 * handle that isn't live panics, so double releases fail the test.
 */
#[derive(Debug, Default)]
pub(crate) struct RecordingBackend {
    next_handle: u32,
    pub(crate) live_buffers: HashSet<BufferId>,
    pub(crate) live_vertex_arrays: HashSet<VertexArrayId>,
    pub(crate) live_textures: HashSet<TextureId>,
    pub(crate) created_textures: Vec<(TextureId, String)>,
    /// Uploaded textures with their sRGB flag.
    pub(crate) uploads: Vec<(TextureId, bool)>,
    pub(crate) released_buffers: Vec<BufferId>,
    pub(crate) released_vertex_arrays: Vec<VertexArrayId>,
    pub(crate) released_textures: Vec<TextureId>,
    /// Sampler uniforms every shader declares.
    pub(crate) samplers: Vec<String>,
    /// `(uniform name, value)` for every `set_uniform_i32`.
    pub(crate) uniforms: Vec<(String, i32)>,
    pub(crate) state: BindingState,
    pub(crate) draws: Vec<DrawCall>,
    pub(crate) fail_uploads: bool,
    pub(crate) fail_vertex_arrays: bool,
    pub(crate) fail_draws: bool,
}

impl RecordingBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_samplers(samplers: &[&str]) -> Self {
        Self {
            samplers: samplers.iter().map(|name| name.to_string()).collect(),
            ..Self::default()
        }
    }

    fn handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    pub(crate) fn live_resources(&self) -> usize {
        self.live_buffers.len() + self.live_vertex_arrays.len() + self.live_textures.len()
    }
}

impl GpuBackend for RecordingBackend {
    fn create_vertex_buffer(&mut self, _label: &str, _contents: &[u8]) -> Result<BufferId> {
        let id = BufferId(self.handle());
        self.live_buffers.insert(id);
        Ok(id)
    }

    fn create_index_buffer(&mut self, _label: &str, _indices: &[u32]) -> Result<BufferId> {
        let id = BufferId(self.handle());
        self.live_buffers.insert(id);
        Ok(id)
    }

    fn create_vertex_array(
        &mut self,
        label: &str,
        vertex_buffer: BufferId,
        index_buffer: BufferId,
        _layout: &flow_model::wgpu::VertexBufferLayout<'_>,
    ) -> Result<VertexArrayId> {
        if self.fail_vertex_arrays {
            bail!("No vertex arrays left for {label}");
        }
        assert!(self.live_buffers.contains(&vertex_buffer));
        assert!(self.live_buffers.contains(&index_buffer));
        let id = VertexArrayId(self.handle());
        self.live_vertex_arrays.insert(id);
        Ok(id)
    }

    fn create_texture(&mut self, label: &str) -> Result<TextureId> {
        let id = TextureId(self.handle());
        self.live_textures.insert(id);
        self.created_textures.push((id, label.to_string()));
        Ok(id)
    }

    fn upload_texture(&mut self, texture: TextureId, image: &DecodedImage, srgb: bool) -> Result<()> {
        if self.fail_uploads {
            bail!("Upload of {:?} rejected", texture);
        }
        assert!(image.is_valid());
        self.uploads.push((texture, srgb));
        Ok(())
    }

    fn uniform_location(&self, _shader: ShaderId, name: &str) -> Option<UniformLocation> {
        self.samplers
            .iter()
            .position(|sampler| sampler == name)
            .map(|idx| UniformLocation(idx as u32))
    }

    fn set_uniform_i32(&mut self, _shader: ShaderId, location: UniformLocation, value: i32) {
        let name = self.samplers[location.0 as usize].clone();
        self.uniforms.push((name, value));
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
        if self.fail_draws {
            bail!("Device lost");
        }
        let Some(vertex_array) = self.state.vertex_array else {
            bail!("No vertex array bound");
        };
        self.draws.push(DrawCall {
            shader,
            vertex_array,
            index_count,
            units: self.state.units.clone(),
        });
        Ok(())
    }

    fn release_vertex_array(&mut self, vertex_array: VertexArrayId) {
        assert!(
            self.live_vertex_arrays.remove(&vertex_array),
            "{:?} released twice",
            vertex_array
        );
        self.released_vertex_arrays.push(vertex_array);
    }

    fn release_buffer(&mut self, buffer: BufferId) {
        assert!(self.live_buffers.remove(&buffer), "{:?} released twice", buffer);
        self.released_buffers.push(buffer);
    }

    fn release_texture(&mut self, texture: TextureId) {
        assert!(self.live_textures.remove(&texture), "{:?} released twice", texture);
        self.state.unbind_texture(texture);
        self.released_textures.push(texture);
    }
}

/// Hands out a prepared scene, post-processed like a real importer would.
pub(crate) struct SceneImporter {
    scene: Scene,
    pub(crate) imported: RefCell<Vec<PathBuf>>,
}

impl SceneImporter {
    pub(crate) fn new(scene: Scene) -> Self {
        Self {
            scene,
            imported: RefCell::new(Vec::new()),
        }
    }
}

impl Importer for SceneImporter {
    fn import(&self, path: &Path, post_process: PostProcess) -> Result<Scene> {
        self.imported.borrow_mut().push(path.to_path_buf());
        let mut scene = self.scene.clone();
        scene.post_process(post_process);
        Ok(scene)
    }
}

pub(crate) struct FailingImporter;

impl Importer for FailingImporter {
    fn import(&self, path: &Path, _post_process: PostProcess) -> Result<Scene> {
        bail!("Unexpected end of file in {:?}", path)
    }
}

/// Returns a 2x2 RGBA image for every path except the ones named in `failing`.
#[derive(Default)]
pub(crate) struct CountingDecoder {
    pub(crate) failing: HashSet<String>,
    pub(crate) files: RefCell<Vec<PathBuf>>,
    pub(crate) embedded: RefCell<usize>,
}

impl CountingDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_on(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|name| name.to_string()).collect(),
            ..Self::default()
        }
    }

    fn image() -> DecodedImage {
        DecodedImage::new(vec![255; 16], 2, 2, PixelFormat::Rgba8)
    }
}

impl ImageDecoder for CountingDecoder {
    fn decode_file(&self, path: &Path) -> Result<DecodedImage> {
        self.files.borrow_mut().push(path.to_path_buf());
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.failing.contains(&name) {
            bail!("Corrupt image {:?}", path);
        }
        Ok(Self::image())
    }

    fn decode_memory(&self, _bytes: &[u8]) -> Result<DecodedImage> {
        *self.embedded.borrow_mut() += 1;
        Ok(Self::image())
    }
}

/// A unit quad made of two triangles, without normals or UVs.
pub(crate) fn quad(name: &str, material_index: usize) -> SceneMesh {
    SceneMesh {
        name: name.to_string(),
        positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]],
        faces: vec![vec![0, 1, 2], vec![0, 2, 3]],
        material_index,
        ..Default::default()
    }
}

pub(crate) fn node(name: &str, meshes: &[usize], children: Vec<SceneNode>) -> SceneNode {
    SceneNode {
        name: name.to_string(),
        meshes: meshes.to_vec(),
        children,
    }
}

pub(crate) fn scene(root: SceneNode, meshes: Vec<SceneMesh>, materials: Vec<SceneMaterial>) -> Scene {
    Scene {
        root,
        meshes,
        materials,
    }
}

pub(crate) fn fixtures() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}
