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

//! Procedural render engine capability: package descriptors, graph
//! instances with typed input cells, and the engine interface itself. The
//! compute engine is an external shared library discovered at runtime; this
//! crate only models the data that crosses that boundary.

mod error;
mod format;
mod graph;
mod inputs;
mod loader;
mod native;
mod package;
mod renderer;
mod texture;

pub use error::*;
pub use format::*;
pub use graph::*;
pub use inputs::*;
pub use loader::*;
pub use native::*;
pub use package::*;
pub use renderer::*;
pub use texture::*;
