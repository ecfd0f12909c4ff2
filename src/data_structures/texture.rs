//! Textures: the model-facing [`Texture`] record and the wgpu-side [`GpuTexture`].
//!
//! A [`Texture`] is what meshes hold on to. It carries the opaque GPU handle,
//! the semantic slot it was loaded for and the path it was loaded from, which
//! doubles as the key of a model's deduplication cache.
//!
//! [`GpuTexture`] wraps the WGPU objects that back a handle inside
//! [`WgpuBackend`](crate::backend::wgpu_backend::WgpuBackend).

use anyhow::*;

use crate::{backend::TextureId, resources::texture::{DecodedImage, PixelFormat}};

/// Semantic texture category, deciding which sampler uniform a texture is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureKind {
    Diffuse,
    Specular,
    Normal,
    Height,
}

impl TextureKind {
    /// Every kind, in the order a mesh's texture list is assembled.
    pub const ALL: [TextureKind; 4] = [
        TextureKind::Diffuse,
        TextureKind::Specular,
        TextureKind::Normal,
        TextureKind::Height,
    ];

    /// Sampler uniform prefix. Shaders declare `texture_diffuse1`, `texture_diffuse2`, ...
    pub fn uniform_prefix(self) -> &'static str {
        match self {
            TextureKind::Diffuse => "texture_diffuse",
            TextureKind::Specular => "texture_specular",
            TextureKind::Normal => "texture_normal",
            TextureKind::Height => "texture_height",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            TextureKind::Diffuse => 0,
            TextureKind::Specular => 1,
            TextureKind::Normal => 2,
            TextureKind::Height => 3,
        }
    }
}

/// A loaded texture as referenced by meshes.
///
/// `id` stays valid even when decoding failed; in that case it names a texture
/// that was created on the GPU but never received pixel data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Texture {
    pub id: TextureId,
    pub kind: TextureKind,
    pub path: String,
}

/// A GPU texture with its view and sampler.
#[derive(Clone, Debug)]
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl GpuTexture {
    /// Create a `width` x `height` texture filled with one RGBA colour.
    ///
    /// Used for sampler slots that have no texture bound, so shaders don't
    /// need variants for optional maps.
    pub fn create_solid(
        width: u32,
        height: u32,
        rgba: [u8; 4],
        label: &str,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> GpuTexture {
        let data: Vec<u8> = rgba
            .iter()
            .cycle()
            .take(width as usize * height as usize * 4)
            .copied()
            .collect();
        Self::from_rgba(device, queue, &data, width, height, wgpu::TextureFormat::Rgba8Unorm, label)
    }

    /// Upload a decoded image.
    ///
    /// Single channel images become `R8Unorm`, RGB images are expanded to RGBA
    /// since wgpu has no 24 bit colour format. `srgb` selects the sRGB variant
    /// for colour data.
    pub fn from_decoded(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image: &DecodedImage,
        label: &str,
        srgb: bool,
    ) -> Result<Self> {
        if image.width == 0 || image.height == 0 {
            bail!("Image {label} has no pixels ({}x{}).", image.width, image.height);
        }
        if !image.is_valid() {
            bail!(
                "Image {label} holds {} bytes, expected {} for {}x{} {:?}.",
                image.pixels.len(),
                image.expected_len(),
                image.width,
                image.height,
                image.format
            );
        }
        let texture = match image.format {
            PixelFormat::R8 => Self::from_pixels(
                device,
                queue,
                &image.pixels,
                image.width,
                image.height,
                1,
                wgpu::TextureFormat::R8Unorm,
                label,
            ),
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => {
                let format = if srgb {
                    wgpu::TextureFormat::Rgba8UnormSrgb
                } else {
                    wgpu::TextureFormat::Rgba8Unorm
                };
                Self::from_rgba(
                    device,
                    queue,
                    &image.to_rgba8(),
                    image.width,
                    image.height,
                    format,
                    label,
                )
            }
        };
        Ok(texture)
    }

    fn from_rgba(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        rgba: &[u8],
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        label: &str,
    ) -> Self {
        Self::from_pixels(device, queue, rgba, width, height, 4, format, label)
    }

    #[allow(clippy::too_many_arguments)]
    fn from_pixels(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        pixels: &[u8],
        width: u32,
        height: u32,
        bytes_per_pixel: u32,
        format: wgpu::TextureFormat,
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_pixel * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = create_default_sampler(device);
        Self {
            texture,
            view,
            sampler,
        }
    }
}

/// Repeat-wrapping, linearly filtered sampler used for every model texture.
///
/// Uploads only have a base level, so mip levels are never blended.
pub fn default_sampler_descriptor() -> wgpu::SamplerDescriptor<'static> {
    wgpu::SamplerDescriptor {
        label: Some("model sampler"),
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    }
}

pub fn create_default_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&default_sampler_descriptor())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_does_not_blend_missing_mip_levels() {
        let desc = default_sampler_descriptor();

        assert_eq!(desc.mipmap_filter, wgpu::FilterMode::Nearest);
        assert_eq!(desc.min_filter, wgpu::FilterMode::Linear);
    }
}
