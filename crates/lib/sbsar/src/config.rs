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

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    OnceLock,
};

use log::warn;

const DEFAULT_ASSET_CACHE_SIZE: usize = 1_000_000_000;
const DEFAULT_INPUT_IMAGE_CACHE_SIZE: usize = 1_000_000_000;
const DEFAULT_PACKAGE_CACHE_SIZE: usize = 10;

/// Cache bounds, adjustable by the host at runtime.
pub struct CacheConfig {
    asset_cache_size: AtomicUsize,
    input_image_cache_size: AtomicUsize,
    package_cache_size: AtomicUsize,
}

impl CacheConfig {
    fn new() -> Self {
        Self {
            asset_cache_size: AtomicUsize::new(DEFAULT_ASSET_CACHE_SIZE),
            input_image_cache_size: AtomicUsize::new(DEFAULT_INPUT_IMAGE_CACHE_SIZE),
            package_cache_size: AtomicUsize::new(DEFAULT_PACKAGE_CACHE_SIZE),
        }
    }

    /// Asset cache bound in bytes.
    pub fn asset_cache_size(&self) -> usize {
        self.asset_cache_size.load(Ordering::Relaxed)
    }

    /// Input image cache bound in bytes.
    pub fn input_image_cache_size(&self) -> usize {
        self.input_image_cache_size.load(Ordering::Relaxed)
    }

    /// Package cache bound as a package count.
    pub fn package_cache_size(&self) -> usize {
        self.package_cache_size.load(Ordering::Relaxed)
    }

    pub fn set_asset_cache_size(&self, size: usize) {
        if size == 0 {
            warn!("Asset cache size cannot be 0");
            return;
        }
        self.asset_cache_size.store(size, Ordering::Relaxed);
    }

    pub fn set_input_image_cache_size(&self, size: usize) {
        if size == 0 {
            warn!("Input image cache size cannot be 0");
            return;
        }
        self.input_image_cache_size.store(size, Ordering::Relaxed);
    }

    pub fn set_package_cache_size(&self, size: usize) {
        if size == 0 {
            warn!("Package cache size cannot be 0");
            return;
        }
        self.package_cache_size.store(size, Ordering::Relaxed);
    }

    /// Back to the defaults.
    pub fn reset(&self) {
        self.asset_cache_size
            .store(DEFAULT_ASSET_CACHE_SIZE, Ordering::Relaxed);
        self.input_image_cache_size
            .store(DEFAULT_INPUT_IMAGE_CACHE_SIZE, Ordering::Relaxed);
        self.package_cache_size
            .store(DEFAULT_PACKAGE_CACHE_SIZE, Ordering::Relaxed);
    }
}

pub fn cache_config() -> &'static CacheConfig {
    static CONFIG: OnceLock<CacheConfig> = OnceLock::new();
    CONFIG.get_or_init(CacheConfig::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_zero_rejection() {
        let config = CacheConfig::new();
        assert_eq!(config.asset_cache_size(), 1_000_000_000);
        assert_eq!(config.input_image_cache_size(), 1_000_000_000);
        assert_eq!(config.package_cache_size(), 10);

        config.set_asset_cache_size(0);
        assert_eq!(config.asset_cache_size(), 1_000_000_000);
        config.set_asset_cache_size(1);
        assert_eq!(config.asset_cache_size(), 1);
        config.reset();
        assert_eq!(config.asset_cache_size(), 1_000_000_000);
    }
}
