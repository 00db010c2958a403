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

use parking_lot::Mutex;

/// Counters over the whole cache hierarchy, mostly interesting for tests
/// and debugging sessions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub packages_created: u64,
    pub packages_deleted: u64,
    pub graph_instances_created: u64,
    pub graph_instances_deleted: u64,
    pub assets_created: u64,
    pub assets_deleted: u64,
    pub input_images_created: u64,
    pub input_images_deleted: u64,
    pub requests_sent: u64,
    pub render_calls: u64,
    pub results_found_in_cache: u64,
}

static STATS: Mutex<CacheStats> = Mutex::new(CacheStats {
    packages_created: 0,
    packages_deleted: 0,
    graph_instances_created: 0,
    graph_instances_deleted: 0,
    assets_created: 0,
    assets_deleted: 0,
    input_images_created: 0,
    input_images_deleted: 0,
    requests_sent: 0,
    render_calls: 0,
    results_found_in_cache: 0,
});

pub fn cache_stats() -> CacheStats {
    *STATS.lock()
}

pub(crate) fn update_stats(f: impl FnOnce(&mut CacheStats)) {
    f(&mut STATS.lock());
}

pub(crate) fn reset_stats() {
    *STATS.lock() = CacheStats::default();
}
