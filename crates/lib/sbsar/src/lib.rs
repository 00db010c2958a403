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

//! Procedural material plugin: resolves packaged paths into rendered
//! textures and numeric values on demand. Packages are opened through the
//! host asset system, evaluated by a render engine owned by a dedicated
//! worker thread, and every stage is cached.

mod args;
mod asset;
mod asset_cache;
mod config;
mod error;
mod image_cache;
mod layer;
mod package_cache;
mod path;
mod render;
mod stats;
mod symbols;
mod worker;

pub use args::*;
pub use asset::*;
pub use asset_cache::*;
pub use config::*;
pub use error::*;
pub use image_cache::*;
pub use layer::*;
pub use package_cache::*;
pub use path::*;
pub use stats::*;
pub use symbols::*;
pub use worker::*;

#[cfg(test)]
pub(crate) mod test_support {
    use parking_lot::{Mutex, MutexGuard};

    // The caches and the render worker are process wide; tests that touch
    // them serialize on this lock so they do not observe each other.
    static LOCK: Mutex<()> = Mutex::new(());

    pub fn global_lock() -> MutexGuard<'static, ()> {
        LOCK.lock()
    }
}
