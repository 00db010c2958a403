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

//! Facade over the pieces of the host scene-description system the plugins
//! talk to: asset resolution, image reading and generated layer data.

mod asset;
mod attrs;
mod error;
mod format_args;
mod image_io;
mod layer;
mod paths;
mod resolver;

pub use asset::*;
pub use attrs::*;
pub use error::*;
pub use format_args::*;
pub use image_io::*;
pub use layer::*;
pub use paths::*;
pub use resolver::*;
