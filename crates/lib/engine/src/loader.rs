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

use std::{
    env,
    ffi::c_void,
    path::{Path, PathBuf},
};

use libloading::Library;
use log::{debug, info, warn};

use crate::{EngineError, EngineVariant};

/// Engine flavors we know how to drive, in preference order.
pub const ENGINE_NAMES: &[&str] = &["ogl3", "sse2"];

const LIB_BASE: &str = "umber_engine_";

pub(crate) const CREATE_CONTEXT_SYMBOL: &[u8] = b"umberEngineCreateContext\0";
pub(crate) const RELEASE_CONTEXT_SYMBOL: &[u8] = b"umberEngineReleaseContext\0";
pub(crate) const RENDER_SYMBOL: &[u8] = b"umberEngineRenderGraph\0";

pub(crate) type CreateContextFn = unsafe extern "C" fn(context: *mut *mut c_void) -> u32;
pub(crate) type ReleaseContextFn = unsafe extern "C" fn(context: *mut c_void) -> u32;

fn decorated_name(name: &str) -> String {
    format!(
        "{}{}{}{}",
        env::consts::DLL_PREFIX,
        LIB_BASE,
        name,
        env::consts::DLL_SUFFIX
    )
}

/// Directories searched before falling back to the system loader path.
fn search_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(exe) = env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            dirs.push(exe_dir.to_path_buf());
            dirs.push(exe_dir.join("..").join("lib"));
        }
    }
    dirs
}

/// Check that a candidate library exposes the context entry points and that
/// a create/release cycle succeeds.
fn validate(library: &Library) -> bool {
    unsafe {
        let create = match library.get::<CreateContextFn>(CREATE_CONTEXT_SYMBOL) {
            Ok(symbol) => symbol,
            Err(_) => return false,
        };
        let release = match library.get::<ReleaseContextFn>(RELEASE_CONTEXT_SYMBOL) {
            Ok(symbol) => symbol,
            Err(_) => return false,
        };
        let mut context: *mut c_void = std::ptr::null_mut();
        if create(&mut context) != 0 {
            return false;
        }
        release(context) == 0
    }
}

/// A discovered and validated engine library.
pub struct EngineLibrary {
    pub(crate) library: Library,
    variant: EngineVariant,
    path: PathBuf,
}

impl EngineLibrary {
    pub fn variant(&self) -> EngineVariant {
        self.variant
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Find the first usable engine library. A caller supplied name biases
    /// the search to the matching flavor.
    pub fn discover(preferred: Option<&str>) -> Result<Self, EngineError> {
        let mut candidates: Vec<&str> = Vec::new();
        if let Some(preferred) = preferred {
            if let Some(&name) = ENGINE_NAMES.iter().find(|n| preferred.contains(*n)) {
                debug!("Engine name {} requested by caller", name);
                candidates.push(name);
            }
        }
        if candidates.is_empty() {
            candidates.extend(ENGINE_NAMES);
        }

        for name in candidates {
            let file_name = decorated_name(name);
            let mut paths: Vec<PathBuf> =
                search_dirs().iter().map(|d| d.join(&file_name)).collect();
            // Bare name last so the system loader path gets a chance.
            paths.push(PathBuf::from(&file_name));
            for path in paths {
                debug!("Trying to load engine {}", path.display());
                let library = match unsafe { Library::new(&path) } {
                    Ok(library) => library,
                    Err(err) => {
                        debug!("Failed to load engine {}: {}", path.display(), err);
                        continue;
                    }
                };
                if !validate(&library) {
                    warn!("Failed to initialize engine {}", path.display());
                    continue;
                }
                info!("Using engine {}", path.display());
                let variant = EngineVariant::from_library_name(name).unwrap_or(EngineVariant::Sse2);
                return Ok(Self {
                    library,
                    variant,
                    path,
                });
            }
        }
        warn!("Failed to dynamically load a valid render engine");
        Err(EngineError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_fails_without_libraries() {
        assert!(matches!(
            EngineLibrary::discover(None),
            Err(EngineError::NotFound)
        ));
        assert!(matches!(
            EngineLibrary::discover(Some("ogl3")),
            Err(EngineError::NotFound)
        ));
    }

    #[test]
    fn variant_from_name() {
        assert_eq!(
            EngineVariant::from_library_name("umber_engine_ogl3"),
            Some(EngineVariant::Ogl3)
        );
        assert_eq!(
            EngineVariant::from_library_name("umber_engine_sse2"),
            Some(EngineVariant::Sse2)
        );
        assert_eq!(EngineVariant::from_library_name("other"), None);
    }
}
