//! Image decoding for material textures.
//!
//! The model loader only needs pixels, dimensions and a channel layout, so
//! decoding sits behind the small [`ImageDecoder`] trait. [`ImageCrateDecoder`]
//! implements it with the `image` crate.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, GenericImageView};

/// Channel layout of decoded pixel data, one byte per channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    R8,
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    /// Map a decoder's channel count onto a format. Only 1, 3 and 4 are supported.
    pub fn from_channels(channels: u8) -> Option<Self> {
        match channels {
            1 => Some(PixelFormat::R8),
            3 => Some(PixelFormat::Rgb8),
            4 => Some(PixelFormat::Rgba8),
            _ => None,
        }
    }

    pub fn channels(self) -> u8 {
        match self {
            PixelFormat::R8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// Tightly packed, row-major pixel data.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl DecodedImage {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            pixels,
            width,
            height,
            format,
        }
    }

    /// Convert an `image` crate image, keeping 1/3/4 channel layouts and
    /// widening everything else (luma + alpha, 16 bit, float) to RGBA8.
    pub fn from_dynamic(img: DynamicImage) -> Self {
        let (width, height) = img.dimensions();
        match img {
            DynamicImage::ImageLuma8(buf) => Self::new(buf.into_raw(), width, height, PixelFormat::R8),
            DynamicImage::ImageRgb8(buf) => Self::new(buf.into_raw(), width, height, PixelFormat::Rgb8),
            DynamicImage::ImageRgba8(buf) => Self::new(buf.into_raw(), width, height, PixelFormat::Rgba8),
            other => match other.color().channel_count() {
                1 => Self::new(other.to_luma8().into_raw(), width, height, PixelFormat::R8),
                3 => Self::new(other.to_rgb8().into_raw(), width, height, PixelFormat::Rgb8),
                _ => Self::new(other.to_rgba8().into_raw(), width, height, PixelFormat::Rgba8),
            },
        }
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.channels() as usize
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.pixels.len() == self.expected_len()
    }

    /// Pixel data widened to RGBA8. Single channel data is replicated into RGB.
    pub fn to_rgba8(&self) -> Vec<u8> {
        match self.format {
            PixelFormat::Rgba8 => self.pixels.clone(),
            PixelFormat::Rgb8 => self
                .pixels
                .chunks_exact(3)
                .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], 255])
                .collect(),
            PixelFormat::R8 => self.pixels.iter().flat_map(|&r| [r, r, r, 255]).collect(),
        }
    }
}

/// Decodes image files (or in-memory image files) into pixels.
pub trait ImageDecoder {
    fn decode_file(&self, path: &Path) -> Result<DecodedImage>;

    /// Decode an image embedded in an asset, e.g. a glTF buffer view.
    fn decode_memory(&self, bytes: &[u8]) -> Result<DecodedImage>;
}

/// [`ImageDecoder`] backed by the `image` crate. The format is guessed from content.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageCrateDecoder;

impl ImageDecoder for ImageCrateDecoder {
    fn decode_file(&self, path: &Path) -> Result<DecodedImage> {
        log::debug!("Decoding texture {:?}", path);
        let img = image::ImageReader::open(path)
            .with_context(|| format!("Failed to open image {:?}", path))?
            .with_guessed_format()
            .with_context(|| format!("Failed to read image {:?}", path))?
            .decode()
            .map_err(|e| anyhow!("Failed to decode image {:?}: {}", path, e))?;
        Ok(DecodedImage::from_dynamic(img))
    }

    fn decode_memory(&self, bytes: &[u8]) -> Result<DecodedImage> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| anyhow!("Failed to decode embedded image: {}", e))?;
        Ok(DecodedImage::from_dynamic(img))
    }
}
