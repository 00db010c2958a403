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

/// Engine pixel format, packed into one byte: two precision bits, two
/// channel bits and the sRGB flag. The byte value is part of the rendered
/// asset header, so the encoding is stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelFormat(u8);

impl PixelFormat {
    pub const PREC_8I: u8 = 0x00;
    pub const PREC_16I: u8 = 0x01;
    pub const PREC_16F: u8 = 0x02;
    pub const PREC_32F: u8 = 0x03;
    const PREC_MASK: u8 = 0x03;

    pub const CH_RGBA: u8 = 0x00;
    pub const CH_RGB: u8 = 0x04;
    pub const CH_L: u8 = 0x08;
    const CH_MASK: u8 = 0x0c;

    pub const SRGB: u8 = 0x10;

    pub const fn new(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn precision(self) -> u8 {
        self.0 & Self::PREC_MASK
    }

    pub const fn channels(self) -> u8 {
        self.0 & Self::CH_MASK
    }

    pub const fn is_srgb(self) -> bool {
        self.0 & Self::SRGB != 0
    }

    pub const fn with_srgb(self, srgb: bool) -> Self {
        if srgb {
            Self(self.0 | Self::SRGB)
        } else {
            Self(self.0 & !Self::SRGB)
        }
    }

    pub const fn channel_count(self) -> usize {
        match self.channels() {
            Self::CH_RGBA => 4,
            Self::CH_RGB => 3,
            _ => 1,
        }
    }

    pub const fn bytes_per_channel(self) -> usize {
        match self.precision() {
            Self::PREC_8I => 1,
            Self::PREC_16I | Self::PREC_16F => 2,
            _ => 4,
        }
    }

    pub const fn bytes_per_pixel(self) -> usize {
        self.channel_count() * self.bytes_per_channel()
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        Self(Self::PREC_8I | Self::CH_RGBA)
    }
}

/// Channel order of an engine texture buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    #[default]
    Rgba = 0,
    Bgra = 1,
}

impl ChannelOrder {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => Self::Bgra,
            _ => Self::Rgba,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_per_pixel() {
        let f = PixelFormat::new(PixelFormat::PREC_8I | PixelFormat::CH_RGBA);
        assert_eq!(f.bytes_per_pixel(), 4);
        let f = PixelFormat::new(PixelFormat::PREC_16F | PixelFormat::CH_RGB);
        assert_eq!(f.bytes_per_pixel(), 6);
        let f = PixelFormat::new(PixelFormat::PREC_32F | PixelFormat::CH_L);
        assert_eq!(f.bytes_per_pixel(), 4);
    }

    #[test]
    fn srgb_flag() {
        let f = PixelFormat::default().with_srgb(true);
        assert!(f.is_srgb());
        assert_eq!(f.with_srgb(false).bits(), PixelFormat::default().bits());
    }
}
