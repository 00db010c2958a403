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

use std::{fs, path::Path, sync::Arc, sync::OnceLock};

use bytes::Bytes;
use log::debug;
use parking_lot::RwLock;

use crate::{normalize_package_path, split_package_path, Asset, HostError, InMemoryAsset};

/// A path that already went through the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPath(String);

impl ResolvedPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(normalize_package_path(&path.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Asset resolution surface of the host. The default implementation serves
/// plain files; hosts install their own resolver at startup.
pub trait AssetResolver: Send + Sync {
    fn resolve(&self, path: &str) -> Option<ResolvedPath>;
    fn open_asset(&self, path: &ResolvedPath) -> Result<Arc<dyn Asset>, HostError>;
}

#[derive(Default)]
pub struct FsResolver;

impl AssetResolver for FsResolver {
    fn resolve(&self, path: &str) -> Option<ResolvedPath> {
        let (outer, _) = split_package_path(path);
        if Path::new(outer).exists() {
            Some(ResolvedPath::new(path))
        } else {
            None
        }
    }

    fn open_asset(&self, path: &ResolvedPath) -> Result<Arc<dyn Asset>, HostError> {
        let (outer, inner) = split_package_path(path.as_str());
        if inner.is_some() {
            // Inner package assets are served by the owning format plugin.
            return Err(HostError::NotFound(path.as_str().to_owned()));
        }
        debug!("Opening asset {}", outer);
        let data = fs::read(outer)?;
        Ok(Arc::new(InMemoryAsset::new(Bytes::from(data))))
    }
}

fn registry() -> &'static RwLock<Arc<dyn AssetResolver>> {
    static REGISTRY: OnceLock<RwLock<Arc<dyn AssetResolver>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Arc::new(FsResolver) as Arc<dyn AssetResolver>))
}

/// The process-wide resolver.
pub fn resolver() -> Arc<dyn AssetResolver> {
    registry().read().clone()
}

pub fn set_resolver(resolver: Arc<dyn AssetResolver>) {
    *registry().write() = resolver;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_resolver_reads_files() {
        let dir = std::env::temp_dir().join("umber_host_resolver_test");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("asset.bin");
        std::fs::write(&file, b"payload").unwrap();

        let resolver = FsResolver;
        let resolved = resolver.resolve(file.to_str().unwrap()).unwrap();
        let asset = resolver.open_asset(&resolved).unwrap();
        assert_eq!(asset.size(), 7);
        assert_eq!(&asset.buffer()[..], b"payload");
    }

    #[test]
    fn missing_files_do_not_resolve() {
        assert!(FsResolver.resolve("/no/such/file.bin").is_none());
    }
}
