#[cfg(feature = "integration-tests")]
use std::path::Path;

#[cfg(feature = "integration-tests")]
use anyhow::Result;
#[cfg(feature = "integration-tests")]
use flow_model::{
    Model, ShaderId, TextureKind,
    backend::wgpu_backend::{ShaderDescriptor, WgpuBackend},
    resources::{
        SceneMaterial, SceneMesh, TextureSlot,
        texture::{DecodedImage, ImageDecoder, PixelFormat},
    },
    wgpu,
};

#[cfg(feature = "integration-tests")]
use crate::common::test_utils::{CountingDecoder, SceneImporter, init_logger, node, quad, scene};
#[cfg(feature = "integration-tests")]
mod common;

#[cfg(feature = "integration-tests")]
const SIZE: u32 = 64;
#[cfg(feature = "integration-tests")]
const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
#[cfg(feature = "integration-tests")]
const RED: image::Rgba<u8> = image::Rgba([255, 0, 0, 255]);
#[cfg(feature = "integration-tests")]
const WHITE: image::Rgba<u8> = image::Rgba([255, 255, 255, 255]);
#[cfg(feature = "integration-tests")]
const BLACK: image::Rgba<u8> = image::Rgba([0, 0, 0, 255]);

/// Every image decodes to one red pixel.
#[cfg(feature = "integration-tests")]
struct RedDecoder;

#[cfg(feature = "integration-tests")]
impl ImageDecoder for RedDecoder {
    fn decode_file(&self, _path: &Path) -> Result<DecodedImage> {
        Ok(DecodedImage::new(vec![255, 0, 0], 1, 1, PixelFormat::Rgb8))
    }

    fn decode_memory(&self, _bytes: &[u8]) -> Result<DecodedImage> {
        Ok(DecodedImage::new(vec![255, 0, 0], 1, 1, PixelFormat::Rgb8))
    }
}

#[cfg(feature = "integration-tests")]
fn backend_with_shader() -> (WgpuBackend, ShaderId) {
    init_logger();
    let mut backend = pollster::block_on(WgpuBackend::headless()).unwrap();
    let shader = backend.register_shader(ShaderDescriptor {
        module: wgpu::ShaderModuleDescriptor {
            label: Some("Model Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("fixtures/model.wgsl").into()),
        },
        samplers: &["texture_diffuse1"],
        color_format: FORMAT,
        depth_format: None,
        extra_bind_group_layouts: &[],
    });
    (backend, shader)
}

/// The quad covers the upper right quarter of clip space.
#[cfg(feature = "integration-tests")]
fn quad_importer(extra_meshes: Vec<SceneMesh>) -> SceneImporter {
    let mut meshes = vec![quad("quad", 0)];
    meshes.extend(extra_meshes);
    let indices = (0..meshes.len()).collect::<Vec<_>>();
    SceneImporter::new(scene(
        node("root", &indices, vec![]),
        meshes,
        vec![SceneMaterial::new("paint").with_texture(TextureKind::Diffuse, TextureSlot::file("paint.png"))],
    ))
}

/// Replay the recorded draws onto a black target and read it back.
#[cfg(feature = "integration-tests")]
fn render(backend: &WgpuBackend) -> Result<image::RgbaImage> {
    let device = backend.device();
    let size = wgpu::Extent3d {
        width: SIZE,
        height: SIZE,
        depth_or_array_layers: 1,
    };
    let target = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Test target"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());
    let u32_size = std::mem::size_of::<u32>() as u32;
    let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: None,
        size: (u32_size * SIZE * SIZE) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Test Encoder"),
    });
    {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Test Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        backend.encode(&mut render_pass, &[])?;
    }
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            aspect: wgpu::TextureAspect::All,
            texture: &target,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &output_buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(u32_size * SIZE),
                rows_per_image: Some(SIZE),
            },
        },
        size,
    );
    backend.queue().submit(std::iter::once(encoder.finish()));

    let (tx, rx) = std::sync::mpsc::channel();
    let buffer_slice = output_buffer.slice(..);
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        tx.send(result).unwrap();
    });
    device.poll(wgpu::PollType::Wait)?;
    rx.recv()??;
    let pixels = buffer_slice.get_mapped_range().to_vec();
    output_buffer.unmap();
    image::RgbaImage::from_raw(SIZE, SIZE, pixels).ok_or_else(|| anyhow::anyhow!("Readback too short"))
}

#[test]
#[cfg(feature = "integration-tests")]
fn uploaded_texture_is_sampled() {
    let (mut backend, shader) = backend_with_shader();
    let mut model = Model::new("assets", "quad.obj");
    model.load(&quad_importer(vec![]), &RedDecoder, &mut backend).unwrap();

    model.draw(&mut backend, shader).unwrap();
    let image = render(&backend).unwrap();

    assert_eq!(backend.commands().len(), 1);
    assert_eq!(*image.get_pixel(40, 24), RED);
    assert_eq!(*image.get_pixel(8, 56), BLACK);
}

#[test]
#[cfg(feature = "integration-tests")]
fn texture_without_pixels_samples_the_fallback() {
    let (mut backend, shader) = backend_with_shader();
    let mut model = Model::new("assets", "quad.obj");
    let report = model
        .load(&quad_importer(vec![]), &CountingDecoder::failing_on(&["paint.png"]), &mut backend)
        .unwrap();

    model.draw(&mut backend, shader).unwrap();
    let image = render(&backend).unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(*image.get_pixel(40, 24), WHITE);
}

#[test]
#[cfg(feature = "integration-tests")]
fn meshes_without_indices_are_not_encoded() {
    let (mut backend, shader) = backend_with_shader();
    let empty = SceneMesh {
        name: "empty".to_string(),
        material_index: 0,
        ..Default::default()
    };
    let mut model = Model::new("assets", "quad.obj");
    let report = model.load(&quad_importer(vec![empty]), &RedDecoder, &mut backend).unwrap();

    model.draw(&mut backend, shader).unwrap();
    let image = render(&backend).unwrap();

    assert_eq!(report.meshes, 2);
    assert_eq!(backend.commands().len(), 1);
    assert_eq!(backend.commands()[0].index_count, 6);
    assert_eq!(*image.get_pixel(40, 24), RED);
}

#[test]
#[cfg(feature = "integration-tests")]
fn released_model_can_no_longer_be_encoded() {
    let (mut backend, shader) = backend_with_shader();
    let mut model = Model::new("assets", "quad.obj");
    model.load(&quad_importer(vec![]), &RedDecoder, &mut backend).unwrap();
    model.draw(&mut backend, shader).unwrap();

    model.release(&mut backend);

    assert!(render(&backend).is_err());
    backend.clear_commands();
    assert_eq!(*render(&backend).unwrap().get_pixel(40, 24), BLACK);
}

#[test]
#[cfg(feature = "integration-tests")]
fn draw_with_unknown_shader_fails() {
    let (mut backend, shader) = backend_with_shader();
    let mut model = Model::new("assets", "quad.obj");
    model.load(&quad_importer(vec![]), &RedDecoder, &mut backend).unwrap();
    backend.release_shader(shader);

    assert!(model.draw(&mut backend, shader).is_err());
    assert!(backend.commands().is_empty());
    assert_eq!(backend.binding_state().vertex_array, None);
}
