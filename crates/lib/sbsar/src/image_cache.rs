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

use std::{collections::HashMap, sync::Arc, sync::OnceLock, time::Instant};

use log::{debug, error, warn};
use parking_lot::Mutex;
use umber_common::hash64;
use umber_engine::{ChannelOrder, InputImage, PixelFormat, Texture};
use umber_host::{HostFormat, HostImage, ResolvedPath};

use crate::{cache_config, update_stats};

struct ImageCacheEntry {
    image: Arc<InputImage>,
    size: usize,
    last_access: Instant,
}

#[derive(Default)]
struct InputImageCache {
    entries: HashMap<u64, ImageCacheEntry>,
    total_size: usize,
}

fn cache() -> &'static Mutex<InputImageCache> {
    static CACHE: OnceLock<Mutex<InputImageCache>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(InputImageCache::default()))
}

fn engine_format(format: HostFormat) -> PixelFormat {
    let precision = match format {
        HostFormat::Float16 | HostFormat::Float16Vec3 | HostFormat::Float16Vec4 => {
            PixelFormat::PREC_16F
        }
        HostFormat::Float32 | HostFormat::Float32Vec3 | HostFormat::Float32Vec4 => {
            PixelFormat::PREC_32F
        }
        HostFormat::Int16 | HostFormat::Int16Vec3 | HostFormat::Int16Vec4 => PixelFormat::PREC_16I,
        _ => PixelFormat::PREC_8I,
    };
    let channels = match format.channel_count() {
        1 => PixelFormat::CH_L,
        3 => PixelFormat::CH_RGB,
        _ => PixelFormat::CH_RGBA,
    };
    PixelFormat::new(precision | channels).with_srgb(format.is_srgb())
}

fn to_input_image(image: &HostImage) -> InputImage {
    InputImage::new(Texture {
        width: image.width as u16,
        height: image.height as u16,
        format: engine_format(image.format),
        channel_order: ChannelOrder::Rgba,
        mip_count: 1,
        data: image.data.clone(),
    })
}

/// Drop the oldest 10% of held bytes.
fn clean(cache: &mut InputImageCache) {
    debug!("InputImageCache: cleaning cache");
    let mut by_age: Vec<(Instant, usize)> = cache
        .entries
        .values()
        .map(|e| (e.last_access, e.size))
        .collect();
    by_age.sort_by_key(|(t, _)| *t);

    let to_delete = cache.total_size / 10;
    let mut reclaimed = 0;
    let mut cutoff = None;
    for (time, size) in by_age {
        if reclaimed >= to_delete {
            break;
        }
        reclaimed += size;
        cutoff = Some(time);
    }
    let Some(cutoff) = cutoff else { return };

    let mut deleted = 0u64;
    let mut freed = 0usize;
    cache.entries.retain(|_, entry| {
        if entry.last_access <= cutoff {
            deleted += 1;
            freed += entry.size;
            false
        } else {
            true
        }
    });
    cache.total_size -= freed.min(cache.total_size);
    update_stats(|stats| stats.input_images_deleted += deleted);
    debug!(
        "InputImageCache: done cleaning, {} images deleted for {} bytes",
        deleted, freed
    );
}

fn add_bounded(resolved_path: &ResolvedPath, bound: usize) -> u64 {
    if resolved_path.as_str().is_empty() {
        return 0;
    }
    let hash = hash64(resolved_path.as_str());
    {
        let cache = cache().lock();
        if cache.entries.contains_key(&hash) {
            return hash;
        }
    }

    // Decode outside the cache lock; image files can be large.
    let host_image = match HostImage::open(resolved_path) {
        Ok(image) => image,
        Err(err) => {
            error!("{}", err);
            return 0;
        }
    };
    let image = to_input_image(&host_image);
    let size = image.byte_size();

    let mut cache = cache().lock();
    cache.entries.insert(
        hash,
        ImageCacheEntry {
            image: Arc::new(image),
            size,
            last_access: Instant::now(),
        },
    );
    cache.total_size += size;
    update_stats(|stats| stats.input_images_created += 1);

    if cache.total_size > bound {
        clean(&mut cache);
    }
    hash
}

/// Convert a host image into the engine layout and remember it under the
/// hash of its resolved path. Returns 0 when the image cannot be used.
pub fn add_input_image(resolved_path: &ResolvedPath) -> u64 {
    add_bounded(resolved_path, cache_config().input_image_cache_size())
}

/// Fetch a previously added image.
pub fn input_image(hash: u64) -> Option<Arc<InputImage>> {
    let mut cache = cache().lock();
    match cache.entries.get_mut(&hash) {
        Some(entry) => {
            entry.last_access = Instant::now();
            Some(entry.image.clone())
        }
        None => {
            warn!("Image {:x} not found in cache", hash);
            None
        }
    }
}

pub fn clear_input_image_cache() {
    let mut cache = cache().lock();
    cache.entries.clear();
    cache.total_size = 0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::global_lock;

    fn write_test_png(name: &str, width: u32, height: u32) -> ResolvedPath {
        let dir = std::env::temp_dir().join("umber_image_cache_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([128, 64, 32, 255]));
        img.save(&path).unwrap();
        ResolvedPath::new(path.to_str().unwrap())
    }

    #[test]
    fn images_are_content_addressed_by_path() {
        let _guard = global_lock();
        clear_input_image_cache();
        let path = write_test_png("mask.png", 4, 4);

        let hash = add_input_image(&path);
        assert_ne!(hash, 0);
        assert_eq!(add_input_image(&path), hash);

        let image = input_image(hash).unwrap();
        assert_eq!(image.texture().width, 4);
        assert_eq!(image.byte_size(), 4 * 4 * 4);
        assert!(image.texture().format.is_srgb());

        assert!(input_image(0xdead_beef).is_none());
        clear_input_image_cache();
    }

    #[test]
    fn unreadable_images_hash_to_zero() {
        let _guard = global_lock();
        assert_eq!(add_input_image(&ResolvedPath::new("")), 0);
        assert_eq!(add_input_image(&ResolvedPath::new("/no/such/image.png")), 0);
    }

    #[test]
    fn eviction_drops_the_oldest_images() {
        let _guard = global_lock();
        clear_input_image_cache();
        let mut hashes = Vec::new();
        for i in 0..8 {
            let path = write_test_png(&format!("evict_{}.png", i), 8, 8);
            hashes.push(add_bounded(&path, 1024));
        }
        let cache = cache().lock();
        assert!(cache.total_size <= 1024 + 8 * 8 * 4);
        assert!(!cache.entries.contains_key(&hashes[0]));
        drop(cache);
        clear_input_image_cache();
    }

    #[test]
    fn format_mapping() {
        assert_eq!(
            engine_format(HostFormat::UNorm8Vec4Srgb).bits(),
            PixelFormat::PREC_8I | PixelFormat::CH_RGBA | PixelFormat::SRGB
        );
        assert_eq!(
            engine_format(HostFormat::Float32Vec3).bits(),
            PixelFormat::PREC_32F | PixelFormat::CH_RGB
        );
        assert_eq!(
            engine_format(HostFormat::Int16).bits(),
            PixelFormat::PREC_16I | PixelFormat::CH_L
        );
    }
}
