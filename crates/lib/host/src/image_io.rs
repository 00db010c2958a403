// Copyright (C) 2025 gigablaster

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use bytes::Bytes;
use image::DynamicImage;

use crate::{HostError, ResolvedPath};

/// Pixel formats the host hands to plugins. Color images decoded from 8 bit
/// sources carry the sRGB variants, data images the linear ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFormat {
    UNorm8,
    UNorm8Vec3,
    UNorm8Vec4,
    UNorm8Srgb,
    UNorm8Vec3Srgb,
    UNorm8Vec4Srgb,
    Float16,
    Float16Vec3,
    Float16Vec4,
    Float32,
    Float32Vec3,
    Float32Vec4,
    Int16,
    Int16Vec3,
    Int16Vec4,
}

impl HostFormat {
    pub fn channel_count(self) -> usize {
        match self {
            Self::UNorm8 | Self::UNorm8Srgb | Self::Float16 | Self::Float32 | Self::Int16 => 1,
            Self::UNorm8Vec3
            | Self::UNorm8Vec3Srgb
            | Self::Float16Vec3
            | Self::Float32Vec3
            | Self::Int16Vec3 => 3,
            Self::UNorm8Vec4
            | Self::UNorm8Vec4Srgb
            | Self::Float16Vec4
            | Self::Float32Vec4
            | Self::Int16Vec4 => 4,
        }
    }

    pub fn bytes_per_channel(self) -> usize {
        match self {
            Self::UNorm8
            | Self::UNorm8Vec3
            | Self::UNorm8Vec4
            | Self::UNorm8Srgb
            | Self::UNorm8Vec3Srgb
            | Self::UNorm8Vec4Srgb => 1,
            Self::Float16 | Self::Float16Vec3 | Self::Float16Vec4 => 2,
            Self::Int16 | Self::Int16Vec3 | Self::Int16Vec4 => 2,
            Self::Float32 | Self::Float32Vec3 | Self::Float32Vec4 => 4,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        self.channel_count() * self.bytes_per_channel()
    }

    pub fn is_srgb(self) -> bool {
        matches!(
            self,
            Self::UNorm8Srgb | Self::UNorm8Vec3Srgb | Self::UNorm8Vec4Srgb
        )
    }
}

/// A decoded host image: tightly packed pixels plus a format descriptor.
pub struct HostImage {
    pub width: u32,
    pub height: u32,
    pub format: HostFormat,
    pub data: Bytes,
}

impl HostImage {
    /// Decode an image file from the host asset system. 8 bit sources are
    /// assumed to carry color and map to the sRGB variants.
    pub fn open(path: &ResolvedPath) -> Result<Self, HostError> {
        let decoded = image::open(path.as_str())
            .map_err(|err| HostError::ImageLoad(path.as_str().to_owned(), err.to_string()))?;
        Self::from_decoded(path, decoded)
    }

    fn from_decoded(path: &ResolvedPath, decoded: DynamicImage) -> Result<Self, HostError> {
        let width = decoded.width();
        let height = decoded.height();
        let (format, data) = match decoded {
            DynamicImage::ImageLuma8(img) => (HostFormat::UNorm8Srgb, Bytes::from(img.into_raw())),
            DynamicImage::ImageRgb8(img) => {
                (HostFormat::UNorm8Vec3Srgb, Bytes::from(img.into_raw()))
            }
            DynamicImage::ImageRgba8(img) => {
                (HostFormat::UNorm8Vec4Srgb, Bytes::from(img.into_raw()))
            }
            DynamicImage::ImageRgb32F(img) => (
                HostFormat::Float32Vec3,
                Bytes::from(bytemuck_cast(img.into_raw())),
            ),
            DynamicImage::ImageRgba32F(img) => (
                HostFormat::Float32Vec4,
                Bytes::from(bytemuck_cast(img.into_raw())),
            ),
            DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageRgb16(_)
            | DynamicImage::ImageRgba16(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_) => {
                return Err(HostError::UnsupportedImageFormat(format!(
                    "{}: unsigned 16 bit",
                    path.as_str()
                )))
            }
            other => {
                return Err(HostError::UnsupportedImageFormat(format!(
                    "{}: {:?}",
                    path.as_str(),
                    other.color()
                )))
            }
        };
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

fn bytemuck_cast(values: Vec<f32>) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_sizes() {
        assert_eq!(HostFormat::UNorm8Vec4Srgb.bytes_per_pixel(), 4);
        assert_eq!(HostFormat::Float32Vec3.bytes_per_pixel(), 12);
        assert_eq!(HostFormat::Float16.bytes_per_pixel(), 2);
        assert_eq!(HostFormat::Int16Vec4.bytes_per_pixel(), 8);
    }

    #[test]
    fn decodes_rgba() {
        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            2,
            2,
            image::Rgba([1, 2, 3, 4]),
        ));
        let host = HostImage::from_decoded(&ResolvedPath::new("mem.png"), img).unwrap();
        assert_eq!(host.format, HostFormat::UNorm8Vec4Srgb);
        assert_eq!(host.byte_size(), 16);
        assert_eq!(&host.data[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn rejects_16_bit_unsigned() {
        let img = DynamicImage::ImageLuma16(image::ImageBuffer::new(1, 1));
        assert!(HostImage::from_decoded(&ResolvedPath::new("mem.png"), img).is_err());
    }
}
