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

use std::{collections::HashMap, sync::Arc, time::Instant};

use log::{debug, warn};
use umber_common::Value;

use crate::{cache_config, update_stats, ParsedPath, SbsarAsset};

/// The outputs of one render pass: every usage maps to either a pixel
/// buffer or a numeric value. Immutable once inserted into the cache.
#[derive(Debug)]
pub struct RenderResult {
    assets: HashMap<String, Arc<SbsarAsset>>,
    numeric_values: HashMap<String, Value>,
    size: usize,
    last_access: Instant,
}

impl Default for RenderResult {
    fn default() -> Self {
        Self {
            assets: HashMap::new(),
            numeric_values: HashMap::new(),
            size: 0,
            last_access: Instant::now(),
        }
    }
}

impl RenderResult {
    pub fn add_asset(&mut self, usage: impl Into<String>, asset: Arc<SbsarAsset>) {
        self.assets.insert(usage.into(), asset);
    }

    pub fn add_numeric_value(&mut self, usage: impl Into<String>, value: Value) {
        self.numeric_values.insert(usage.into(), value);
    }

    pub fn asset(&self, usage: &str) -> Option<Arc<SbsarAsset>> {
        self.assets.get(usage).cloned()
    }

    pub fn numeric_value(&self, usage: &str) -> Option<Value> {
        self.numeric_values.get(usage).cloned()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty() && self.numeric_values.is_empty()
    }

    fn compute_size(&mut self) {
        // Outputs can share one buffer under several usages, so this can
        // overcount; eviction tolerates that.
        self.size = self.assets.values().map(|a| a.byte_size()).sum();
    }
}

fn result_key(parsed: &ParsedPath) -> String {
    format!(
        "{}{}{}",
        parsed.package_hash, parsed.graph_name, parsed.params_json
    )
}

/// Render results keyed by (package hash, graph, parameter fingerprint).
/// Byte-bounded with approximate LRU eviction in 10% batches.
#[derive(Debug, Default)]
pub struct AssetCache {
    results: HashMap<String, RenderResult>,
    total_size: usize,
}

impl AssetCache {
    pub fn has_result(&self, parsed: &ParsedPath) -> bool {
        self.results.contains_key(&result_key(parsed))
    }

    pub fn asset(&mut self, parsed: &ParsedPath) -> Option<Arc<SbsarAsset>> {
        let result = self.results.get_mut(&result_key(parsed))?;
        result.last_access = Instant::now();
        result.asset(&parsed.usage)
    }

    pub fn numeric_value(&mut self, parsed: &ParsedPath) -> Option<Value> {
        let result = self.results.get_mut(&result_key(parsed))?;
        result.last_access = Instant::now();
        result.numeric_value(&parsed.usage)
    }

    pub fn add_result(&mut self, parsed: &ParsedPath, result: RenderResult) {
        self.add_result_bounded(parsed, result, cache_config().asset_cache_size());
    }

    pub(crate) fn add_result_bounded(
        &mut self,
        parsed: &ParsedPath,
        mut result: RenderResult,
        bound: usize,
    ) {
        result.compute_size();
        if self.total_size + result.size > bound {
            self.clean();
        }
        result.last_access = Instant::now();
        let asset_count = result.asset_count() as u64;
        let size = result.size;
        if self.results.insert(result_key(parsed), result).is_some() {
            warn!("AssetCache: replacing an existing render result");
        }
        self.total_size += size;
        update_stats(|stats| stats.assets_created += asset_count);
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn clear(&mut self) {
        self.results.clear();
        self.total_size = 0;
    }

    /// Drop the oldest entries until at least 10% of the held bytes are
    /// reclaimed. Best effort: shared buffers may keep the real footprint
    /// higher than the bookkeeping says.
    fn clean(&mut self) {
        debug!("AssetCache: cleaning cache");
        let mut by_age: Vec<(Instant, usize)> = self
            .results
            .values()
            .map(|r| (r.last_access, r.size))
            .collect();
        by_age.sort_by_key(|(t, _)| *t);

        let to_delete = self.total_size / 10;
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

        let mut assets_deleted = 0u64;
        let mut freed = 0usize;
        self.results.retain(|_, result| {
            if result.last_access <= cutoff {
                assets_deleted += result.asset_count() as u64;
                freed += result.size;
                false
            } else {
                true
            }
        });
        self.total_size -= freed.min(self.total_size);
        update_stats(|stats| stats.assets_deleted += assets_deleted);
        debug!(
            "AssetCache: done cleaning, {} assets deleted for {} bytes",
            assets_deleted, freed
        );
    }
}
