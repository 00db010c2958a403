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

use bytes::{BufMut, Bytes, BytesMut};
use umber_engine::{ChannelOrder, PixelFormat, Texture};
use umber_host::{Asset, HostError, HostFormat};

/// Fixed size header in front of every rendered pixel buffer.
pub const ASSET_HEADER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetHeader {
    pub width: u16,
    pub height: u16,
    pub pixel_format: PixelFormat,
    pub channel_order: ChannelOrder,
    pub mip_count: u8,
    pub is_srgb: bool,
}

/// A rendered texture as served back into the host asset system: one
/// contiguous buffer of header plus packed pixels.
#[derive(Debug)]
pub struct SbsarAsset {
    buffer: Bytes,
}

impl SbsarAsset {
    pub fn from_texture(texture: &Texture, is_srgb: bool) -> Self {
        let mut buffer = BytesMut::with_capacity(ASSET_HEADER_SIZE + texture.data.len());
        buffer.put_u16_le(texture.width);
        buffer.put_u16_le(texture.height);
        buffer.put_u8(texture.format.bits());
        buffer.put_u8(texture.channel_order as u8);
        buffer.put_u8(texture.mip_count);
        buffer.put_u8(is_srgb as u8);
        buffer.extend_from_slice(&texture.data);
        Self {
            buffer: buffer.freeze(),
        }
    }

    pub fn from_buffer(buffer: Bytes) -> Self {
        Self { buffer }
    }

    pub fn header(&self) -> Result<AssetHeader, HostError> {
        if self.buffer.len() < ASSET_HEADER_SIZE {
            return Err(HostError::InvalidAsset(
                "buffer too small for texture header".to_owned(),
            ));
        }
        let b = &self.buffer;
        Ok(AssetHeader {
            width: u16::from_le_bytes([b[0], b[1]]),
            height: u16::from_le_bytes([b[2], b[3]]),
            pixel_format: PixelFormat::new(b[4]),
            channel_order: ChannelOrder::from_byte(b[5]),
            mip_count: b[6],
            is_srgb: b[7] != 0,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.buffer[ASSET_HEADER_SIZE.min(self.buffer.len())..]
    }

    pub fn byte_size(&self) -> usize {
        self.buffer.len()
    }
}

impl Asset for SbsarAsset {
    fn size(&self) -> usize {
        self.buffer.len()
    }

    fn buffer(&self) -> Bytes {
        self.buffer.clone()
    }
}

/// Host facing image view over a rendered asset buffer.
pub struct SbsarImage {
    header: AssetHeader,
    pixels: Bytes,
}

impl SbsarImage {
    pub fn decode(buffer: Bytes) -> Result<Self, HostError> {
        let asset = SbsarAsset::from_buffer(buffer);
        let header = asset.header()?;
        let expected = header.width as usize
            * header.height as usize
            * header.pixel_format.bytes_per_pixel();
        if asset.buffer.len() < ASSET_HEADER_SIZE + expected {
            return Err(HostError::InvalidAsset(
                "pixel data shorter than the header promises".to_owned(),
            ));
        }
        let pixels = asset.buffer.slice(ASSET_HEADER_SIZE..ASSET_HEADER_SIZE + expected);
        Ok(Self { header, pixels })
    }

    pub fn width(&self) -> u32 {
        self.header.width as u32
    }

    pub fn height(&self) -> u32 {
        self.header.height as u32
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.header.pixel_format.bytes_per_pixel()
    }

    pub fn is_srgb(&self) -> bool {
        self.header.is_srgb
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// The host image format this buffer reads back as.
    pub fn host_format(&self) -> Result<HostFormat, HostError> {
        let format = self.header.pixel_format;
        let srgb = self.header.is_srgb;
        let host = match (format.precision(), format.channel_count()) {
            (PixelFormat::PREC_8I, 1) if srgb => HostFormat::UNorm8Srgb,
            (PixelFormat::PREC_8I, 3) if srgb => HostFormat::UNorm8Vec3Srgb,
            (PixelFormat::PREC_8I, 4) if srgb => HostFormat::UNorm8Vec4Srgb,
            (PixelFormat::PREC_8I, 1) => HostFormat::UNorm8,
            (PixelFormat::PREC_8I, 3) => HostFormat::UNorm8Vec3,
            (PixelFormat::PREC_8I, 4) => HostFormat::UNorm8Vec4,
            (PixelFormat::PREC_16F, 1) => HostFormat::Float16,
            (PixelFormat::PREC_16F, 3) => HostFormat::Float16Vec3,
            (PixelFormat::PREC_16F, 4) => HostFormat::Float16Vec4,
            (PixelFormat::PREC_32F, 1) => HostFormat::Float32,
            (PixelFormat::PREC_32F, 3) => HostFormat::Float32Vec3,
            (PixelFormat::PREC_32F, 4) => HostFormat::Float32Vec4,
            (PixelFormat::PREC_16I, 1) => HostFormat::Int16,
            (PixelFormat::PREC_16I, 3) => HostFormat::Int16Vec3,
            (PixelFormat::PREC_16I, 4) => HostFormat::Int16Vec4,
            _ => {
                return Err(HostError::UnsupportedImageFormat(format!(
                    "pixel format {:#x}",
                    format.bits()
                )))
            }
        };
        Ok(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texture() -> Texture {
        Texture {
            width: 2,
            height: 2,
            format: PixelFormat::new(PixelFormat::PREC_8I | PixelFormat::CH_RGBA),
            channel_order: ChannelOrder::Rgba,
            mip_count: 1,
            data: Bytes::from_static(&[0u8; 16]),
        }
    }

    #[test]
    fn header_round_trip() {
        let asset = SbsarAsset::from_texture(&texture(), true);
        assert_eq!(asset.byte_size(), ASSET_HEADER_SIZE + 16);
        let header = asset.header().unwrap();
        assert_eq!(header.width, 2);
        assert_eq!(header.height, 2);
        assert!(header.is_srgb);
        assert_eq!(header.mip_count, 1);
        assert_eq!(asset.pixels().len(), 16);
    }

    #[test]
    fn image_view_maps_to_host_format() {
        let asset = SbsarAsset::from_texture(&texture(), true);
        let image = SbsarImage::decode(asset.buffer()).unwrap();
        assert_eq!(image.width(), 2);
        assert_eq!(image.bytes_per_pixel(), 4);
        assert_eq!(image.host_format().unwrap(), HostFormat::UNorm8Vec4Srgb);
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert!(SbsarImage::decode(Bytes::from_static(&[0u8; 4])).is_err());
        let mut texture = texture();
        texture.data = Bytes::from_static(&[0u8; 4]);
        // Header promises 16 bytes of pixels but only 4 are there.
        let asset = SbsarAsset::from_texture(&texture, false);
        assert!(SbsarImage::decode(asset.buffer()).is_err());
    }
}
