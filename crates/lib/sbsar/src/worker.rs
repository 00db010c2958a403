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

use std::{collections::BTreeMap, sync::Arc, sync::OnceLock, thread, time::Duration};

use log::{debug, error, warn};
use parking_lot::{Condvar, Mutex};
use umber_common::Value;
use umber_engine::{EngineError, EngineLibrary, NativeEngine, RenderEngine};

use crate::{
    clear_input_image_cache, clear_package_cache, graph_instance, parse_path,
    render::{assemble_result, render_pass},
    reset_stats, update_stats, AssetCache, ParsedPath, RenderResult, SbsarAsset,
};

/// Requests are keyed by (package path, packaged path) so concurrent
/// identical requests coalesce into one render.
type RequestKey = (String, String);

struct WorkerShared {
    shutdown: bool,
    requests: BTreeMap<RequestKey, ParsedPath>,
    asset_cache: AssetCache,
}

struct RenderThreadState {
    shared: Mutex<WorkerShared>,
    cv: Condvar,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

fn state() -> &'static RenderThreadState {
    static STATE: OnceLock<RenderThreadState> = OnceLock::new();
    STATE.get_or_init(|| RenderThreadState {
        shared: Mutex::new(WorkerShared {
            shutdown: false,
            requests: BTreeMap::new(),
            asset_cache: AssetCache::default(),
        }),
        cv: Condvar::new(),
        thread: Mutex::new(None),
    })
}

/// Creates the engine. Runs inside the worker thread because engine
/// initialization may need a graphics context that must not move between
/// threads.
pub type EngineProvider = Box<dyn Fn() -> Result<Box<dyn RenderEngine>, EngineError> + Send + Sync>;

fn provider_slot() -> &'static Mutex<EngineProvider> {
    static PROVIDER: OnceLock<Mutex<EngineProvider>> = OnceLock::new();
    PROVIDER.get_or_init(|| {
        Mutex::new(Box::new(|| {
            let library = EngineLibrary::discover(None)?;
            Ok(Box::new(NativeEngine::new(library)?) as Box<dyn RenderEngine>)
        }))
    })
}

/// Replace how the worker obtains its engine. Takes effect the next time
/// the worker thread starts.
pub fn set_engine_provider(provider: EngineProvider) {
    *provider_slot().lock() = provider;
}

fn ensure_worker() {
    let state = state();
    let mut slot = state.thread.lock();
    if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
        return;
    }
    state.shared.lock().shutdown = false;
    match thread::Builder::new()
        .name("sbsar-render".to_owned())
        .spawn(worker_main)
    {
        Ok(handle) => *slot = Some(handle),
        Err(err) => error!("Failed to start render worker: {}", err),
    }
}

/// Render one request and publish the outcome. Failures publish an empty
/// result so waiters observe completion instead of blocking forever.
fn run_render(engine: Option<&mut dyn RenderEngine>, key: &RequestKey, parsed: &ParsedPath) {
    let publish_empty = || {
        let mut shared = state().shared.lock();
        shared.asset_cache.add_result(parsed, RenderResult::default());
    };

    let Some(engine) = engine else {
        error!("RenderThread: no engine, cannot render {}", key.1);
        publish_empty();
        return;
    };
    let instance = match graph_instance(&key.0, parsed) {
        Ok(instance) => instance,
        Err(err) => {
            error!("RenderThread: {}", err);
            publish_empty();
            return;
        }
    };

    let mut data = instance.lock();
    match render_pass(engine, &mut data, parsed) {
        Ok((updates, previous_params)) => {
            let mut shared = state().shared.lock();
            let result = assemble_result(
                &mut shared.asset_cache,
                &data.instance,
                updates,
                parsed,
                &previous_params,
            );
            shared.asset_cache.add_result(parsed, result);
        }
        Err(err) => {
            error!("RenderThread: render failed: {}", err);
            publish_empty();
        }
    }
}

fn worker_main() {
    // The engine lives and dies on this thread.
    let created = {
        let provider = provider_slot().lock();
        (*provider)()
    };
    let mut engine = match created {
        Ok(engine) => Some(engine),
        Err(err) => {
            error!("RenderThread: failed to initialize engine: {}", err);
            None
        }
    };

    let state = state();
    loop {
        let (key, parsed) = {
            let mut shared = state.shared.lock();
            loop {
                if shared.shutdown {
                    debug!("RenderThread: finishing");
                    return;
                }
                if let Some((key, parsed)) = shared
                    .requests
                    .iter()
                    .next()
                    .map(|(key, parsed)| (key.clone(), parsed.clone()))
                {
                    break (key, parsed);
                }
                debug!("RenderThread: waiting for jobs");
                state.cv.wait_for(&mut shared, Duration::from_secs(30));
                debug!("RenderThread: waking up");
            }
        };

        // The result may have been prefetched since the request was queued.
        let prefetched = state.shared.lock().asset_cache.has_result(&parsed);
        if prefetched {
            update_stats(|stats| stats.results_found_in_cache += 1);
            debug!("RenderThread: found {} in cache, skipping render", key.1);
        } else {
            update_stats(|stats| stats.render_calls += 1);
            match engine.as_mut() {
                Some(engine) => run_render(Some(engine.as_mut()), &key, &parsed),
                None => run_render(None, &key, &parsed),
            }
        }

        state.shared.lock().requests.remove(&key);
        // Give reading threads a chance to consume before the next request.
        state.cv.notify_all();
        thread::yield_now();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wanted {
    Asset,
    Numeric,
}

enum FoundResult {
    Asset(Arc<SbsarAsset>),
    Numeric(Value),
}

enum Probe {
    NotRendered,
    Found(FoundResult),
    WrongKind,
    MissingUsage,
}

fn probe(cache: &mut AssetCache, parsed: &ParsedPath, wanted: Wanted) -> Probe {
    if !cache.has_result(parsed) {
        return Probe::NotRendered;
    }
    match wanted {
        Wanted::Asset => {
            if let Some(asset) = cache.asset(parsed) {
                return Probe::Found(FoundResult::Asset(asset));
            }
            if cache.numeric_value(parsed).is_some() {
                return Probe::WrongKind;
            }
        }
        Wanted::Numeric => {
            if let Some(value) = cache.numeric_value(parsed) {
                return Probe::Found(FoundResult::Numeric(value));
            }
            if cache.asset(parsed).is_some() {
                return Probe::WrongKind;
            }
        }
    }
    Probe::MissingUsage
}

fn request_render(package_path: &str, packaged_path: &str, wanted: Wanted) -> Option<FoundResult> {
    let parsed = match parse_path(packaged_path) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!("Error parsing path {}: {}", packaged_path, err);
            return None;
        }
    };
    ensure_worker();

    let state = state();
    let mut shared = state.shared.lock();
    match probe(&mut shared.asset_cache, &parsed, wanted) {
        Probe::Found(found) => {
            update_stats(|stats| stats.results_found_in_cache += 1);
            debug!("Found result in cache {}, {}", package_path, packaged_path);
            return Some(found);
        }
        Probe::WrongKind => {
            warn!(
                "The requested result is not of the right kind: {}, {}",
                package_path, packaged_path
            );
            return None;
        }
        Probe::MissingUsage => {
            warn!(
                "The rendered result has no output for usage {}: {}, {}",
                parsed.usage, package_path, packaged_path
            );
            return None;
        }
        Probe::NotRendered => {}
    }

    update_stats(|stats| stats.requests_sent += 1);
    debug!(
        "Result not found in cache {}, {}, submitting to render thread",
        package_path, packaged_path
    );
    let key = (package_path.to_owned(), packaged_path.to_owned());
    shared.requests.entry(key).or_insert_with(|| parsed.clone());
    state.cv.notify_all();

    loop {
        state.cv.wait(&mut shared);
        match probe(&mut shared.asset_cache, &parsed, wanted) {
            Probe::Found(found) => return Some(found),
            Probe::WrongKind => {
                warn!(
                    "The requested result is not of the right kind: {}, {}",
                    package_path, packaged_path
                );
                return None;
            }
            Probe::MissingUsage => {
                warn!(
                    "The rendered result has no output for usage {}: {}, {}",
                    parsed.usage, package_path, packaged_path
                );
                return None;
            }
            Probe::NotRendered => {}
        }
    }
}

/// Resolve a packaged path to a rendered pixel asset, rendering on demand.
/// Blocks until the worker publishes the result.
pub fn render_asset(package_path: &str, packaged_path: &str) -> Option<Arc<SbsarAsset>> {
    match request_render(package_path, packaged_path, Wanted::Asset) {
        Some(FoundResult::Asset(asset)) => Some(asset),
        _ => None,
    }
}

/// Resolve a packaged path to a numeric output value.
pub fn render_numeric(package_path: &str, packaged_path: &str) -> Option<Value> {
    match request_render(package_path, packaged_path, Wanted::Numeric) {
        Some(FoundResult::Numeric(value)) => Some(value),
        _ => None,
    }
}

/// Drop all cached state: render results, input images, packages and the
/// statistics. Blocked readers are not interrupted.
pub fn clear_cache() {
    state().shared.lock().asset_cache.clear();
    clear_input_image_cache();
    clear_package_cache();
    reset_stats();
}

/// Stop the worker thread and release the engine. A later request starts a
/// fresh worker.
pub fn shutdown_render_thread() {
    let state = state();
    {
        let mut shared = state.shared.lock();
        shared.shutdown = true;
    }
    state.cv.notify_all();
    let handle = state.thread.lock().take();
    if let Some(handle) = handle {
        debug!("RenderThread: waiting for render thread to stop");
        let _ = handle.join();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Write,
        sync::atomic::{AtomicU64, Ordering},
        time::Duration,
    };

    use bytes::Bytes;
    use umber_engine::{
        ChannelOrder, EngineVariant, GraphDesc, GraphInstance, InputDesc, InputType, InputValue,
        InputWidget, NumericKind, OutputDesc, OutputPayload, OutputUpdate, PackageBuilder,
        PixelFormat, Texture,
    };

    use super::*;
    use crate::{cache_stats, test_support::global_lock};

    fn write_package(name: &str) -> String {
        let bytes = PackageBuilder::default()
            .graph(GraphDesc {
                label: "G".into(),
                category: String::new(),
                thumbnail: Bytes::new(),
                inputs: vec![InputDesc {
                    identifier: "seed".into(),
                    label: String::new(),
                    group: String::new(),
                    ty: InputType::Int,
                    widget: InputWidget::NoWidget,
                    default: InputValue::Int(0),
                    min: None,
                    max: None,
                }],
                outputs: vec![
                    OutputDesc {
                        identifier: "basecolor".into(),
                        usages: vec!["baseColor".into()],
                        format: PixelFormat::default(),
                        numeric: None,
                    },
                    OutputDesc {
                        identifier: "height_scale".into(),
                        usages: vec!["heightScale".into()],
                        format: PixelFormat::default(),
                        numeric: Some(NumericKind::Float),
                    },
                    OutputDesc {
                        identifier: "flipped".into(),
                        usages: vec!["flipped".into()],
                        format: PixelFormat::default(),
                        numeric: Some(NumericKind::Int),
                    },
                ],
                presets: Vec::new(),
            })
            .build();
        let dir = std::env::temp_dir().join("umber_worker_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&bytes).unwrap();
        path.to_str().unwrap().to_owned()
    }

    struct StubEngine {
        renders: Arc<AtomicU64>,
        delay: Duration,
        fail: bool,
    }

    impl RenderEngine for StubEngine {
        fn variant(&self) -> EngineVariant {
            EngineVariant::Sse2
        }

        fn render(
            &mut self,
            instance: &mut GraphInstance,
        ) -> Result<Vec<OutputUpdate>, umber_engine::EngineError> {
            if self.fail {
                return Err(umber_engine::EngineError::Render("stub failure".into()));
            }
            std::thread::sleep(self.delay);
            self.renders.fetch_add(1, Ordering::SeqCst);
            let seed = match instance.cell(0) {
                InputValue::Int(v) => *v as u8,
                _ => 0,
            };
            Ok(instance
                .desc()
                .outputs
                .iter()
                .enumerate()
                .map(|(index, output)| OutputUpdate {
                    output_index: index,
                    payload: if output.numeric == Some(NumericKind::Float) {
                        OutputPayload::Float(1.5)
                    } else if output.numeric == Some(NumericKind::Int) {
                        OutputPayload::Int(1)
                    } else {
                        OutputPayload::Image(Texture {
                            width: 2,
                            height: 2,
                            format: PixelFormat::default(),
                            channel_order: ChannelOrder::Rgba,
                            mip_count: 1,
                            data: Bytes::from(vec![seed; 16]),
                        })
                    },
                })
                .collect())
        }
    }

    fn install_stub(renders: Arc<AtomicU64>, delay: Duration, fail: bool) {
        shutdown_render_thread();
        clear_cache();
        set_engine_provider(Box::new(move || {
            Ok(Box::new(StubEngine {
                renders: renders.clone(),
                delay,
                fail,
            }) as Box<dyn RenderEngine>)
        }));
    }

    #[test]
    fn renders_assets_and_numeric_values() {
        let _guard = global_lock();
        let renders = Arc::new(AtomicU64::new(0));
        install_stub(renders.clone(), Duration::ZERO, false);
        let package = write_package("basic.sbsar");

        let packaged = "graphs/G/images?usage=baseColor#params={\"seed\":7}";
        let asset = render_asset(&package, packaged).unwrap();
        assert_eq!(asset.pixels(), &[7u8; 16]);

        // Second request is a pure cache hit.
        let again = render_asset(&package, packaged).unwrap();
        assert!(Arc::ptr_eq(&asset, &again));
        assert_eq!(renders.load(Ordering::SeqCst), 1);

        // Numeric outputs of the same render are already in the cache.
        let value = render_numeric(
            &package,
            "graphs/G/images?usage=heightScale#params={\"seed\":7}",
        )
        .unwrap();
        assert_eq!(value, Value::Float(1.5));
        let flipped = render_numeric(
            &package,
            "graphs/G/images?usage=flipped#params={\"seed\":7}",
        )
        .unwrap();
        assert_eq!(flipped, Value::Bool(true));
        assert_eq!(renders.load(Ordering::SeqCst), 1);

        shutdown_render_thread();
    }

    #[test]
    fn different_parameters_render_separately() {
        let _guard = global_lock();
        let renders = Arc::new(AtomicU64::new(0));
        install_stub(renders.clone(), Duration::ZERO, false);
        let package = write_package("params.sbsar");

        let a = render_asset(&package, "graphs/G/images?usage=baseColor#params={\"seed\":1}")
            .unwrap();
        let b = render_asset(&package, "graphs/G/images?usage=baseColor#params={\"seed\":2}")
            .unwrap();
        assert_eq!(renders.load(Ordering::SeqCst), 2);
        assert_ne!(a.pixels(), b.pixels());

        shutdown_render_thread();
    }

    #[test]
    fn concurrent_identical_requests_render_once() {
        let _guard = global_lock();
        let renders = Arc::new(AtomicU64::new(0));
        install_stub(renders.clone(), Duration::from_millis(50), false);
        let package = write_package("coalesce.sbsar");

        let packaged = "graphs/G/images?usage=baseColor#params={\"seed\":3}";
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let package = package.clone();
                std::thread::spawn(move || render_asset(&package, packaged))
            })
            .collect();
        for thread in threads {
            assert!(thread.join().unwrap().is_some());
        }
        assert_eq!(renders.load(Ordering::SeqCst), 1);

        shutdown_render_thread();
    }

    #[test]
    fn wrong_kind_is_reported_as_empty() {
        let _guard = global_lock();
        let renders = Arc::new(AtomicU64::new(0));
        install_stub(renders.clone(), Duration::ZERO, false);
        let package = write_package("kinds.sbsar");

        let packaged = "graphs/G/images?usage=baseColor#params={}";
        assert!(render_asset(&package, packaged).is_some());
        // baseColor is an image; asking for a numeric value cannot succeed.
        assert!(render_numeric(&package, packaged).is_none());

        shutdown_render_thread();
    }

    #[test]
    fn failures_unblock_waiters() {
        let _guard = global_lock();
        let renders = Arc::new(AtomicU64::new(0));
        install_stub(renders.clone(), Duration::ZERO, true);
        let package = write_package("fail.sbsar");

        assert!(render_asset(&package, "graphs/G/images?usage=baseColor#params={}").is_none());
        // Unknown graphs fail fast as well.
        assert!(render_asset(&package, "graphs/Missing/images?usage=baseColor#params={}")
            .is_none());
        // Parse failures short circuit before the worker is involved.
        assert!(render_asset(&package, "not/a/valid?path").is_none());

        shutdown_render_thread();
    }

    #[test]
    fn stats_count_requests_and_hits() {
        let _guard = global_lock();
        let renders = Arc::new(AtomicU64::new(0));
        install_stub(renders.clone(), Duration::ZERO, false);
        let package = write_package("stats.sbsar");

        let packaged = "graphs/G/images?usage=baseColor#params={}";
        render_asset(&package, packaged);
        render_asset(&package, packaged);
        let stats = cache_stats();
        assert_eq!(stats.requests_sent, 1);
        assert_eq!(stats.render_calls, 1);
        assert!(stats.results_found_in_cache >= 1);

        shutdown_render_thread();
    }
}
