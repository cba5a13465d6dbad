//! Asset manager
//!
//! Drives the handle core the way a loader must: vend a handle, queue the
//! fetch, deliver the raw result exactly once from `update`, and take the
//! raw object back when a handle is unloaded. Loaded objects are shared by
//! name and reference counted, so two handles to one asset fetch it once.
//!
//! # Example
//!
//! ```ignore
//! let ctx = AssetContext::with_converters(HandleConfig::default(), ConverterRegistry::with_defaults());
//! let manager = AssetManager::new(ctx, source);
//!
//! let hero = manager.load_asset::<Sprite>("hero.png");
//! manager.update(); // once per frame
//!
//! if let Some(sprite) = hero.asset() {
//!     draw(&sprite);
//! }
//! hero.unload();
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::asset::{AssetCategory, Bytes, RawAsset};
use crate::context::{AssetContext, AssetReleaser};
use crate::handle::{AssetHandle, BatchAssetHandle, Handler, HandlerState};

// ============================================================================
// Asset Source
// ============================================================================

/// Where raw objects come from.
pub trait AssetSource {
    /// Classify an asset name
    fn category(&self, name: &str) -> AssetCategory;

    /// Produce the raw object for `name`, `None` if it cannot be loaded
    fn fetch(&mut self, name: &str) -> Option<RawAsset>;
}

/// An in-memory asset source.
#[derive(Debug, Default)]
pub struct MemorySource {
    entries: FxHashMap<String, (AssetCategory, RawAsset)>,
    fetch_count: usize,
}

impl MemorySource {
    /// Create an empty source
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an engine-native object as a bundled asset
    pub fn insert_bundled<T: 'static>(&mut self, name: impl Into<String>, value: T) {
        self.entries.insert(
            name.into(),
            (AssetCategory::InternalBundledAsset, RawAsset::native(value)),
        );
    }

    /// Add a byte payload packaged with the application
    pub fn insert_raw(&mut self, name: impl Into<String>, bytes: impl Into<Bytes>) {
        self.entries.insert(
            name.into(),
            (AssetCategory::InternalRawAsset, RawAsset::bytes(bytes)),
        );
    }

    /// Add a byte payload from outside the package
    pub fn insert_external(&mut self, name: impl Into<String>, bytes: impl Into<Bytes>) {
        self.entries.insert(
            name.into(),
            (AssetCategory::ExternalRawAsset, RawAsset::bytes(bytes)),
        );
    }

    /// Remove an asset
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// Number of successful fetches so far
    #[must_use]
    pub const fn fetch_count(&self) -> usize {
        self.fetch_count
    }
}

impl AssetSource for MemorySource {
    fn category(&self, name: &str) -> AssetCategory {
        self.entries
            .get(name)
            .map(|(category, _)| *category)
            .unwrap_or_default()
    }

    fn fetch(&mut self, name: &str) -> Option<RawAsset> {
        let raw = self.entries.get(name).map(|(_, raw)| raw.clone())?;
        self.fetch_count += 1;
        Some(raw)
    }
}

// ============================================================================
// Loaded Assets
// ============================================================================

#[derive(Debug)]
struct LoadedEntry {
    asset: RawAsset,
    ref_count: usize,
}

/// Reference-counted raw objects currently held by handles.
#[derive(Debug, Default)]
pub struct LoadedAssets {
    entries: RefCell<FxHashMap<String, LoadedEntry>>,
}

impl LoadedAssets {
    /// Take another reference to an already loaded object
    fn acquire(&self, name: &str) -> Option<RawAsset> {
        let mut entries = self.entries.borrow_mut();
        let entry = entries.get_mut(name)?;
        entry.ref_count += 1;
        Some(entry.asset.clone())
    }

    fn insert(&self, name: &str, asset: RawAsset) {
        self.entries.borrow_mut().insert(
            name.to_string(),
            LoadedEntry {
                asset,
                ref_count: 1,
            },
        );
    }

    /// Drop one reference; the object is freed with the last one
    fn release(&self, name: &str) {
        let mut entries = self.entries.borrow_mut();
        let Some(entry) = entries.get_mut(name) else {
            log::warn!("Released '{name}' which is not loaded");
            return;
        };
        entry.ref_count -= 1;
        if entry.ref_count == 0 {
            entries.remove(name);
            log::debug!("Freed '{name}'");
        }
    }

    /// References held on `name`
    #[must_use]
    pub fn ref_count(&self, name: &str) -> usize {
        self.entries
            .borrow()
            .get(name)
            .map_or(0, |entry| entry.ref_count)
    }

    /// Number of distinct loaded objects
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Whether nothing is loaded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl AssetReleaser for LoadedAssets {
    fn release_asset(&self, name: &str, _asset: &RawAsset) {
        self.release(name);
    }
}

// ============================================================================
// Pending Loads
// ============================================================================

/// A vended handle waiting for its raw result.
trait PendingDelivery {
    fn is_waiting(&self) -> bool;

    fn deliver(self: Box<Self>, raw: Option<RawAsset>) -> HandlerState;
}

impl<T: Clone + 'static> PendingDelivery for AssetHandle<T> {
    fn is_waiting(&self) -> bool {
        self.state() == HandlerState::Doing
    }

    fn deliver(self: Box<Self>, raw: Option<RawAsset>) -> HandlerState {
        self.set_asset(raw)
    }
}

struct PendingLoad {
    name: String,
    handle: Box<dyn PendingDelivery>,
}

// ============================================================================
// Asset Manager
// ============================================================================

/// Vends handles and completes their loads from an [`AssetSource`].
pub struct AssetManager<S: AssetSource> {
    ctx: Rc<AssetContext>,
    source: RefCell<S>,
    loaded: Rc<LoadedAssets>,
    pending: RefCell<VecDeque<PendingLoad>>,
}

impl<S: AssetSource> AssetManager<S> {
    /// Create a manager; installs itself as the context's releaser
    pub fn new(ctx: Rc<AssetContext>, source: S) -> Self {
        let loaded = Rc::new(LoadedAssets::default());
        ctx.set_releaser(Rc::clone(&loaded) as Rc<dyn AssetReleaser>);
        Self {
            ctx,
            source: RefCell::new(source),
            loaded,
            pending: RefCell::new(VecDeque::new()),
        }
    }

    /// The context handles are created in
    #[must_use]
    pub const fn context(&self) -> &Rc<AssetContext> {
        &self.ctx
    }

    /// Borrow the source
    pub fn source(&self) -> std::cell::Ref<'_, S> {
        self.source.borrow()
    }

    /// Mutably borrow the source
    pub fn source_mut(&self) -> std::cell::RefMut<'_, S> {
        self.source.borrow_mut()
    }

    /// Currently loaded objects
    #[must_use]
    pub fn loaded(&self) -> &LoadedAssets {
        &self.loaded
    }

    /// Loads waiting for `update`
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Start loading `name` as `T`
    pub fn load_asset<T: Clone + 'static>(&self, name: &str) -> AssetHandle<T> {
        let category = self.source.borrow().category(name);
        self.enqueue(AssetHandle::create(&self.ctx, name, category))
    }

    /// Start loading `name` as `T`, calling `callback` on completion
    pub fn load_asset_with<T: Clone + 'static>(
        &self,
        name: &str,
        callback: impl FnOnce(&AssetHandle<T>) + 'static,
    ) -> AssetHandle<T> {
        let category = self.source.borrow().category(name);
        self.enqueue(AssetHandle::create_with_callback(&self.ctx, name, category, callback))
    }

    /// Start loading every name as one batch
    pub fn batch_load_asset(&self, names: &[&str]) -> BatchAssetHandle {
        self.fill_batch(BatchAssetHandle::create(&self.ctx, names.len()), names)
    }

    /// Start loading every name as one batch, calling `callback` once all completed
    pub fn batch_load_asset_with(
        &self,
        names: &[&str],
        callback: impl FnOnce(&[AssetHandle<RawAsset>]) + 'static,
    ) -> BatchAssetHandle {
        let batch = BatchAssetHandle::create_with_callback(&self.ctx, names.len(), callback);
        self.fill_batch(batch, names)
    }

    fn fill_batch(&self, batch: BatchAssetHandle, names: &[&str]) -> BatchAssetHandle {
        for name in names {
            let category = self.source.borrow().category(name);
            self.enqueue(batch.create_member(*name, category));
        }
        batch
    }

    fn enqueue<T: Clone + 'static>(&self, handle: AssetHandle<T>) -> AssetHandle<T> {
        self.pending.borrow_mut().push_back(PendingLoad {
            name: handle.name(),
            handle: Box::new(handle.clone()),
        });
        handle
    }

    fn acquire(&self, name: &str) -> Option<RawAsset> {
        if let Some(asset) = self.loaded.acquire(name) {
            return Some(asset);
        }

        let fetched = self.source.borrow_mut().fetch(name);
        match fetched {
            Some(asset) => {
                self.loaded.insert(name, asset.clone());
                Some(asset)
            }
            None => {
                log::warn!("Asset '{name}' could not be loaded");
                None
            }
        }
    }

    /// Complete every queued load. Returns how many results were delivered.
    ///
    /// Loads queued by callbacks during this call wait for the next update.
    pub fn update(&self) -> usize {
        let queued: Vec<PendingLoad> = self.pending.borrow_mut().drain(..).collect();
        let mut delivered = 0;

        for load in queued {
            if !load.handle.is_waiting() {
                log::debug!("Skipping cancelled load of '{}'", load.name);
                continue;
            }

            let raw = self.acquire(&load.name);
            let acquired = raw.is_some();
            let state = load.handle.deliver(raw);

            // A failed handle released itself without unloading
            if acquired && state == HandlerState::Failed {
                self.loaded.release(&load.name);
            }
            delivered += 1;
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use image::RgbaImage;

    use super::*;
    use crate::asset::{Sprite, Texture};
    use crate::config::HandleConfig;
    use crate::convert::ConverterRegistry;

    fn manager() -> AssetManager<MemorySource> {
        let ctx =
            AssetContext::with_converters(HandleConfig::default(), ConverterRegistry::with_defaults());
        let mut source = MemorySource::new();
        source.insert_bundled("hero.png", Texture::new(RgbaImage::new(8, 4)));
        source.insert_raw("greeting.txt", &b"hello"[..]);
        source.insert_external("stats.json", &br#"{"hp": 3}"#[..]);
        AssetManager::new(ctx, source)
    }

    #[test]
    fn test_load_completes_on_update() {
        let manager = manager();
        let sprite = manager.load_asset::<Sprite>("hero.png");
        let text = manager.load_asset::<String>("greeting.txt");

        assert_eq!(sprite.state(), HandlerState::Doing);
        assert_eq!(manager.pending_count(), 2);

        assert_eq!(manager.update(), 2);
        assert_eq!(sprite.asset().map(|s| s.rect().size.x), Some(8));
        assert_eq!(text.asset().as_deref(), Some("hello"));
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn test_shared_asset_is_fetched_once() {
        let manager = manager();
        let a = manager.load_asset::<Texture>("hero.png");
        let b = manager.load_asset::<Sprite>("hero.png");
        manager.update();

        assert_eq!(manager.source().fetch_count(), 1);
        assert_eq!(manager.loaded().ref_count("hero.png"), 2);

        a.unload();
        assert_eq!(manager.loaded().ref_count("hero.png"), 1);
        b.unload();
        assert!(manager.loaded().is_empty());
    }

    #[test]
    fn test_missing_asset_fails() {
        let manager = manager();
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        let handle = manager.load_asset_with::<Texture>("nope.png", move |h| {
            assert_eq!(h.state(), HandlerState::Failed);
            flag.set(true);
        });

        manager.update();

        assert!(fired.get());
        assert_eq!(handle.state(), HandlerState::InValid);
        assert!(manager.loaded().is_empty());
    }

    #[test]
    fn test_failed_conversion_drops_reference() {
        let manager = manager();
        let handle = manager.load_asset::<u32>("greeting.txt");
        manager.update();

        assert_eq!(handle.state(), HandlerState::InValid);
        assert_eq!(manager.loaded().ref_count("greeting.txt"), 0);
        assert_eq!(manager.context().reported_count(), 1);
    }

    #[test]
    fn test_cancelled_load_is_not_fetched() {
        let manager = manager();
        let handle = manager.load_asset::<Texture>("hero.png");
        handle.cancel();

        assert_eq!(manager.update(), 0);
        assert_eq!(manager.source().fetch_count(), 0);
    }

    #[test]
    fn test_reused_slot_gets_its_own_result() {
        let manager = manager();
        let cancelled = manager.load_asset::<String>("greeting.txt");
        cancelled.cancel();
        let reused = manager.load_asset::<String>("stats.json");

        assert_eq!(manager.update(), 1);
        assert_eq!(reused.asset().as_deref(), Some(r#"{"hp": 3}"#));
        assert_eq!(cancelled.state(), HandlerState::InValid);
    }

    #[test]
    fn test_batch_load() {
        let manager = manager();
        let names = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&names);
        let batch = manager.batch_load_asset_with(&["missing", "hero.png", "stats.json"], move |handlers| {
            sink.borrow_mut()
                .extend(handlers.iter().map(|h| (h.name(), h.state())));
        });

        assert_eq!(batch.asset_count(), 3);
        manager.update();

        assert_eq!(batch.state(), HandlerState::InValid);
        let names = names.borrow();
        assert_eq!(names.len(), 3);
        // The failed member released itself before the batch completed
        assert_eq!(names[0], (String::new(), HandlerState::InValid));
        assert_eq!(names[2], (String::from("stats.json"), HandlerState::Success));
    }

    #[test]
    fn test_batch_unload_returns_members() {
        let manager = manager();
        let batch = manager.batch_load_asset(&["hero.png", "greeting.txt"]);
        let members = batch.handlers();
        manager.update();

        assert_eq!(manager.loaded().len(), 2);
        assert!(members.iter().all(|m| m.state() == HandlerState::Success));

        // The batch is gone, the caller unloads members one by one
        for member in &members {
            member.unload();
        }
        assert!(manager.loaded().is_empty());
        assert_eq!(manager.context().reported_count(), 0);
    }

    #[test]
    fn test_block_on_loaded_handle() {
        let manager = manager();
        let handle = manager.load_asset::<serde_json::Value>("stats.json");
        manager.update();

        let stats = pollster::block_on(handle.clone().into_future()).unwrap();
        assert_eq!(stats["hp"], 3);
        handle.unload();
    }

    #[test]
    fn test_empty_batch_load() {
        let manager = manager();
        let batch = manager.batch_load_asset(&[]);
        assert_eq!(batch.state(), HandlerState::InValid);
        assert_eq!(manager.pending_count(), 0);
    }
}
