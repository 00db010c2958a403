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

use crate::{EngineError, GraphInstance, Texture};

/// Which compute backend a loaded engine library implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineVariant {
    Ogl3,
    Sse2,
}

impl EngineVariant {
    pub fn from_library_name(name: &str) -> Option<Self> {
        if name.contains("ogl3") {
            Some(Self::Ogl3)
        } else if name.contains("sse2") {
            Some(Self::Sse2)
        } else {
            None
        }
    }

    /// OpenGL engines hand back 8 bit buffers in BGRA order.
    pub fn is_opengl(self) -> bool {
        matches!(self, Self::Ogl3)
    }
}

#[derive(Debug)]
pub enum OutputPayload {
    Image(Texture),
    Float(f32),
    Int(i32),
}

/// One recomputed output of a render pass. Outputs the engine decided were
/// unchanged simply do not appear in the update list.
#[derive(Debug)]
pub struct OutputUpdate {
    pub output_index: usize,
    pub payload: OutputPayload,
}

/// The render engine. Exactly one thread owns an engine; construction and
/// every call happen on that thread because the backing implementation may
/// hold a graphics context.
pub trait RenderEngine: Send {
    fn variant(&self) -> EngineVariant;

    /// Run one render pass over the instance's current input state.
    fn render(&mut self, instance: &mut GraphInstance) -> Result<Vec<OutputUpdate>, EngineError>;
}
