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

/// An opened asset. Buffers are shared, immutable and may outlive the
/// resolver that produced them.
pub trait Asset: Send + Sync {
    fn size(&self) -> usize;
    fn buffer(&self) -> Bytes;
}

pub struct InMemoryAsset {
    data: Bytes,
}

impl InMemoryAsset {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl Asset for InMemoryAsset {
    fn size(&self) -> usize {
        self.data.len()
    }

    fn buffer(&self) -> Bytes {
        self.data.clone()
    }
}
