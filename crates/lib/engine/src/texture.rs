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

use crate::{ChannelOrder, PixelFormat};

/// A pixel buffer in the engine's native layout.
#[derive(Debug, Clone)]
pub struct Texture {
    pub width: u16,
    pub height: u16,
    pub format: PixelFormat,
    pub channel_order: ChannelOrder,
    pub mip_count: u8,
    pub data: Bytes,
}

impl Texture {
    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// An image bound to a graph input. Content addressed by the caller and
/// never mutated after creation.
#[derive(Debug)]
pub struct InputImage {
    texture: Texture,
}

impl InputImage {
    pub fn new(texture: Texture) -> Self {
        Self { texture }
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn byte_size(&self) -> usize {
        self.texture.byte_size()
    }
}
