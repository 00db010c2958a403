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

use log::debug;
use parking_lot::Mutex;
use umber_common::hash64_bytes;
use umber_engine::{GraphDesc, GraphInstance, InputDesc, PackageDesc};
use umber_host::{normalize_package_path, resolver, ResolvedPath};

use crate::{cache_config, update_stats, BindKind, ParsedPath, SbsarError, SbsarResult};

/// A graph instance plus the parameter fingerprint it was last rendered
/// with. Only the render worker touches the instance while applying
/// parameters; everybody else just clones the handle.
#[derive(Debug)]
pub struct GraphInstanceData {
    pub instance: GraphInstance,
    pub last_input_parameters: String,
}

pub type SharedGraphInstance = Arc<Mutex<GraphInstanceData>>;

struct PackageCacheEntry {
    package: Arc<PackageDesc>,
    content_hash: u64,
    instances: HashMap<String, SharedGraphInstance>,
    parameters: Option<Arc<Vec<InputDesc>>>,
    last_access: Instant,
}

type PackageCache = HashMap<String, PackageCacheEntry>;

fn cache() -> &'static Mutex<PackageCache> {
    static CACHE: OnceLock<Mutex<PackageCache>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(PackageCache::new()))
}

/// Graph name that selects the first graph of a package.
pub const DEFAULT_GRAPH: &str = "__default__";

/// Select a graph by name. `__default__` picks the first graph, anything
/// else is a case preserving match on the graph label.
pub fn find_graph_index(package: &PackageDesc, graph_name: &str) -> Option<usize> {
    if graph_name == DEFAULT_GRAPH {
        if package.graphs().is_empty() {
            None
        } else {
            Some(0)
        }
    } else {
        package.graphs().iter().position(|g| g.label == graph_name)
    }
}

fn find_selected_output(graph: &GraphDesc, parsed: &ParsedPath) -> Option<usize> {
    graph.outputs.iter().position(|output| match parsed.bind {
        BindKind::Identifier => output.identifier == parsed.usage,
        BindKind::Usage => output.usages.iter().any(|usage| *usage == parsed.usage),
    })
}

fn read_package(norm_path: &str) -> SbsarResult<(Arc<PackageDesc>, u64)> {
    let started = Instant::now();
    let asset = resolver()
        .open_asset(&ResolvedPath::new(norm_path))
        .map_err(|_| SbsarError::PackageOpen(norm_path.to_owned()))?;
    let buffer = asset.buffer();
    let content_hash = hash64_bytes(&buffer);
    let package = PackageDesc::read(buffer)
        .map_err(|_| SbsarError::PackageInvalid(norm_path.to_owned()))?;
    debug!(
        "PackageCache: reading {} took {} ms",
        norm_path,
        started.elapsed().as_millis()
    );
    Ok((Arc::new(package), content_hash))
}

/// Look up or load the entry for a package path, bump its access time and
/// evict the stalest entry when the cache outgrew its bound.
fn load_entry<'a>(
    cache: &'a mut PackageCache,
    package_path: &str,
) -> SbsarResult<&'a mut PackageCacheEntry> {
    // Paths come in with both slash flavors on some platforms; normalize so
    // the same package always hits the same entry.
    let norm_path = normalize_package_path(package_path);
    if !cache.contains_key(&norm_path) {
        let (package, content_hash) = read_package(&norm_path)?;
        cache.insert(
            norm_path.clone(),
            PackageCacheEntry {
                package,
                content_hash,
                instances: HashMap::new(),
                parameters: None,
                last_access: Instant::now(),
            },
        );
        update_stats(|stats| stats.packages_created += 1);
        debug!("PackageCache: added {}", norm_path);
    } else if let Some(entry) = cache.get_mut(&norm_path) {
        entry.last_access = Instant::now();
    }

    if cache.len() > cache_config().package_cache_size() {
        if let Some(oldest) = cache
            .iter()
            .filter(|(path, _)| **path != norm_path)
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(path, _)| path.clone())
        {
            debug!("PackageCache: removing oldest entry {}", oldest);
            if let Some(removed) = cache.remove(&oldest) {
                update_stats(|stats| {
                    stats.packages_deleted += 1;
                    stats.graph_instances_deleted += removed.instances.len() as u64;
                });
            }
        }
    }

    Ok(cache.get_mut(&norm_path).expect("entry just ensured"))
}

/// Open a package through the host asset system, or fetch it from the
/// cache. Returns the shared descriptor and the content hash of the package
/// bytes. The descriptor stays alive for as long as anyone holds it, even
/// across eviction.
pub fn package(package_path: &str) -> SbsarResult<(Arc<PackageDesc>, u64)> {
    let mut cache = cache().lock();
    let entry = load_entry(&mut cache, package_path)?;
    Ok((entry.package.clone(), entry.content_hash))
}

/// The concatenated input descriptors of every graph in the package,
/// computed lazily on first request.
pub fn parameter_list(package_path: &str) -> SbsarResult<Arc<Vec<InputDesc>>> {
    let mut cache = cache().lock();
    let entry = load_entry(&mut cache, package_path)?;
    if entry.parameters.is_none() {
        let parameters: Vec<InputDesc> = entry
            .package
            .graphs()
            .iter()
            .flat_map(|graph| graph.inputs.iter().cloned())
            .collect();
        entry.parameters = Some(Arc::new(parameters));
        debug!("PackageCache: added parameter list to {}", package_path);
    }
    Ok(entry.parameters.clone().expect("just computed"))
}

/// The graph instance for a (package, graph) pair, created on first touch.
/// Instances live and die with their package cache entry, but a live handle
/// keeps the instance and its descriptor alive past eviction.
pub fn graph_instance(
    package_path: &str,
    parsed: &ParsedPath,
) -> SbsarResult<SharedGraphInstance> {
    let mut cache = cache().lock();
    let entry = load_entry(&mut cache, package_path)?;
    if let Some(instance) = entry.instances.get(&parsed.graph_name) {
        return Ok(instance.clone());
    }

    let graph_index = find_graph_index(&entry.package, &parsed.graph_name)
        .ok_or_else(|| SbsarError::UnknownGraph(parsed.graph_name.clone()))?;
    let graph = entry.package.graph(graph_index);
    if find_selected_output(graph, parsed).is_none() {
        return Err(SbsarError::UnknownOutput(parsed.usage.clone()));
    }

    let instance = Arc::new(Mutex::new(GraphInstanceData {
        instance: GraphInstance::new(entry.package.clone(), graph_index),
        last_input_parameters: parsed.params_json.clone(),
    }));
    entry
        .instances
        .insert(parsed.graph_name.clone(), instance.clone());
    update_stats(|stats| stats.graph_instances_created += 1);
    Ok(instance)
}

pub fn clear_package_cache() {
    cache().lock().clear();
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use bytes::Bytes;
    use umber_engine::{
        InputType, InputValue, InputWidget, OutputDesc, PackageBuilder, PixelFormat,
    };

    use super::*;
    use crate::test_support::global_lock;

    fn write_package(name: &str, graphs: &[&str]) -> String {
        let mut builder = PackageBuilder::default();
        for graph in graphs {
            builder = builder.graph(GraphDesc {
                label: (*graph).to_owned(),
                category: String::new(),
                thumbnail: Bytes::new(),
                inputs: vec![umber_engine::InputDesc {
                    identifier: "seed".into(),
                    label: String::new(),
                    group: String::new(),
                    ty: InputType::Int,
                    widget: InputWidget::NoWidget,
                    default: InputValue::Int(0),
                    min: None,
                    max: None,
                }],
                outputs: vec![OutputDesc {
                    identifier: "basecolor".into(),
                    usages: vec!["baseColor".into()],
                    format: PixelFormat::default(),
                    numeric: None,
                }],
                presets: Vec::new(),
            });
        }
        let dir = std::env::temp_dir().join("umber_package_cache_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&builder.build()).unwrap();
        path.to_str().unwrap().to_owned()
    }

    #[test]
    fn descriptor_is_cached_and_shared() {
        let _guard = global_lock();
        clear_package_cache();
        let path = write_package("shared.sbsar", &["Wood"]);

        let (first, hash_a) = package(&path).unwrap();
        let (second, hash_b) = package(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(hash_a, hash_b);
        assert_ne!(hash_a, 0);

        let parsed = crate::parse_path("graphs/Wood/images?usage=baseColor#params={}").unwrap();
        let instance = graph_instance(&path, &parsed).unwrap();
        assert!(Arc::ptr_eq(instance.lock().instance.package(), &first));
    }

    #[test]
    fn default_graph_and_unknown_graph() {
        let _guard = global_lock();
        clear_package_cache();
        let path = write_package("default.sbsar", &["First", "Second"]);

        let parsed = crate::parse_path("graphs/__default__/images?usage=baseColor#params={}").unwrap();
        let instance = graph_instance(&path, &parsed).unwrap();
        assert_eq!(instance.lock().instance.desc().label, "First");

        let missing = crate::parse_path("graphs/Third/images?usage=baseColor#params={}").unwrap();
        assert!(matches!(
            graph_instance(&path, &missing),
            Err(SbsarError::UnknownGraph(_))
        ));

        let bad_usage = crate::parse_path("graphs/First/images?usage=normal#params={}").unwrap();
        assert!(matches!(
            graph_instance(&path, &bad_usage),
            Err(SbsarError::UnknownOutput(_))
        ));
    }

    #[test]
    fn identifier_binding_selects_outputs() {
        let _guard = global_lock();
        clear_package_cache();
        let path = write_package("ident.sbsar", &["G"]);
        let parsed =
            crate::parse_path("graphs/G/images?identifier=basecolor#params={}").unwrap();
        assert!(graph_instance(&path, &parsed).is_ok());
    }

    #[test]
    fn parameter_list_concatenates_graphs() {
        let _guard = global_lock();
        clear_package_cache();
        let path = write_package("params.sbsar", &["A", "B"]);
        let parameters = parameter_list(&path).unwrap();
        assert_eq!(parameters.len(), 2);
    }

    #[test]
    fn eviction_keeps_live_descriptors_alive() {
        let _guard = global_lock();
        clear_package_cache();
        cache_config().set_package_cache_size(2);

        let first = write_package("evict_a.sbsar", &["A"]);
        let (live, _) = package(&first).unwrap();
        for name in ["evict_b.sbsar", "evict_c.sbsar", "evict_d.sbsar"] {
            let path = write_package(name, &["G"]);
            package(&path).unwrap();
        }
        assert!(cache().lock().len() <= 2);
        // The handle still works even though the entry is long gone.
        assert_eq!(live.graphs().len(), 1);

        cache_config().reset();
        clear_package_cache();
    }

    #[test]
    fn unreadable_packages_fail() {
        let _guard = global_lock();
        clear_package_cache();
        assert!(matches!(
            package("/no/such/package.sbsar"),
            Err(SbsarError::PackageOpen(_))
        ));

        let dir = std::env::temp_dir().join("umber_package_cache_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("garbage.sbsar");
        std::fs::write(&path, b"definitely not a package").unwrap();
        assert!(matches!(
            package(path.to_str().unwrap()),
            Err(SbsarError::PackageInvalid(_))
        ));
    }
}
