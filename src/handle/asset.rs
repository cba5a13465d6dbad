//! Typed asset handle
//!
//! Owns the raw object delivered by the loader and its typed extraction.
//! A handle that fails releases itself; a handle that succeeds belongs to the
//! caller until it is unloaded or cancelled.

use std::any::{Any, TypeId, type_name};
use std::future::IntoFuture;
use std::rc::Rc;

use super::{Continuation, HandleBase, HandleData, HandleFuture, HandleRef, Handler, HandlerState};
use crate::asset::{AssetCategory, RawAsset, Sprite, Texture};
use crate::context::AssetContext;
use crate::error::{AssetError, HandleOp};
use crate::pool::Reference;

/// Completion callback of a typed handle, fired before the continuation.
pub type AssetLoadedCallback<T> = Box<dyn FnOnce(&AssetHandle<T>)>;

pub(crate) struct AssetHandleData<T: 'static> {
    base: HandleBase,
    asset_obj: Option<RawAsset>,
    category: AssetCategory,
    asset: Option<T>,
    on_loaded: Option<AssetLoadedCallback<T>>,
}

impl<T: 'static> Default for AssetHandleData<T> {
    fn default() -> Self {
        Self {
            base: HandleBase::default(),
            asset_obj: None,
            category: AssetCategory::None,
            asset: None,
            on_loaded: None,
        }
    }
}

impl<T: 'static> Reference for AssetHandleData<T> {
    fn clear(&mut self) {
        self.base.clear();
        self.asset_obj = None;
        self.category = AssetCategory::None;
        self.asset = None;
        self.on_loaded = None;
    }
}

impl<T: 'static> HandleData for AssetHandleData<T> {
    fn kind() -> &'static str {
        "AssetHandle"
    }

    fn base(&self) -> &HandleBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut HandleBase {
        &mut self.base
    }
}

/// Handle to a single load whose result is extracted as `T`.
///
/// Requesting [`RawAsset`] yields the loaded object unchanged.
pub struct AssetHandle<T: 'static> {
    inner: HandleRef<AssetHandleData<T>>,
}

impl<T: 'static> Clone for AssetHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> AssetHandle<T> {
    /// Vend a pooled handle for a load that has begun
    #[must_use]
    pub fn create(ctx: &Rc<AssetContext>, name: impl Into<String>, category: AssetCategory) -> Self {
        Self::create_inner(ctx, name.into(), category, None)
    }

    /// Vend a pooled handle whose `callback` fires on completion
    #[must_use]
    pub fn create_with_callback(
        ctx: &Rc<AssetContext>,
        name: impl Into<String>,
        category: AssetCategory,
        callback: impl FnOnce(&Self) + 'static,
    ) -> Self {
        Self::create_inner(ctx, name.into(), category, Some(Box::new(callback)))
    }

    fn create_inner(
        ctx: &Rc<AssetContext>,
        name: String,
        category: AssetCategory,
        callback: Option<AssetLoadedCallback<T>>,
    ) -> Self {
        let inner = HandleRef::acquire(ctx, |d: &mut AssetHandleData<T>| {
            d.base.begin(name);
            d.category = category;
            d.on_loaded = callback;
        });
        Self { inner }
    }

    /// Asset category, `None` once released
    #[must_use]
    pub fn category(&self) -> AssetCategory {
        self.inner.read(|d| d.category).unwrap_or_default()
    }

    /// The untyped loaded object
    #[must_use]
    pub fn asset_obj(&self) -> Option<RawAsset> {
        self.inner.read(|d| d.asset_obj.clone()).flatten()
    }

    /// The typed result extracted when the load completed
    #[must_use]
    pub fn asset(&self) -> Option<T> {
        self.inner.read(|d| d.asset.clone()).flatten()
    }

    /// Extract the loaded object as some other type `U`
    #[must_use]
    pub fn asset_as<U: Clone + 'static>(&self) -> Option<U> {
        let (raw, category) = self.inner.read(|d| (d.asset_obj.clone(), d.category))?;
        extract::<U>(self.inner.ctx(), raw.as_ref()?, category)
    }

    /// Deliver the loader's result. Called exactly once per load.
    ///
    /// Returns the state reached. A handle cancelled while loading is already
    /// released; the result is discarded and `InValid` returned.
    pub fn set_asset(&self, loaded: Option<RawAsset>) -> HandlerState {
        let state = self.inner.state();
        if state == HandlerState::InValid {
            log::debug!("Discarding result for released {}", type_name::<Self>());
            return state;
        }
        if state != HandlerState::Doing {
            self.inner.ctx().report(AssetError::IllegalTransition {
                from: state,
                to: if loaded.is_some() {
                    HandlerState::Success
                } else {
                    HandlerState::Failed
                },
            });
            return state;
        }

        let category = self.category();
        let asset = loaded
            .as_ref()
            .and_then(|raw| extract::<T>(self.inner.ctx(), raw, category));
        let next = if asset.is_some() {
            HandlerState::Success
        } else {
            HandlerState::Failed
        };

        let callback = self
            .inner
            .write(|d| {
                d.asset_obj = loaded;
                d.asset = asset;
                d.on_loaded.take()
            })
            .flatten();
        self.inner.transition(next);

        if next == HandlerState::Failed {
            log::debug!("Load of '{}' failed", self.inner.name());
        }

        if let Some(callback) = callback {
            callback(self);
        }
        // Taken after the callback: a callback that released us clears the slot
        if let Some(continuation) = self.inner.take_continuation() {
            continuation();
        }

        if next == HandlerState::Failed && self.inner.state() == HandlerState::Failed {
            self.inner.release();
        }
        next
    }

    /// Whether both refer to the same live load
    #[must_use]
    pub fn same_handle(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }
}

impl<T: Clone + 'static> Handler for AssetHandle<T> {
    type Output = Option<T>;

    fn name(&self) -> String {
        self.inner.name()
    }

    fn state(&self) -> HandlerState {
        self.inner.state()
    }

    fn result(&self) -> Option<T> {
        self.asset()
    }

    fn on_completed(&self, continuation: Continuation) {
        self.inner.set_continuation(continuation);
    }

    /// Stop waiting for the load; a loaded object is handed back first.
    fn cancel(&self) {
        match self.inner.state() {
            HandlerState::InValid => self.inner.report_invalid(HandleOp::Cancel),
            HandlerState::Success => self.unload(),
            HandlerState::Doing | HandlerState::Failed => {
                self.inner.release();
            }
        }
    }

    fn unload(&self) {
        if !self.inner.is_live() {
            self.inner.report_invalid(HandleOp::Unload);
            return;
        }

        let loaded = self
            .inner
            .read(|d| d.asset_obj.clone().map(|obj| (d.base.name.clone(), obj)))
            .flatten();
        if let Some((name, obj)) = loaded {
            self.inner.ctx().release_asset(&name, &obj);
        }
        self.inner.release();
    }

    fn release(&self) {
        self.inner.release();
    }
}

impl<T: Clone + 'static> IntoFuture for AssetHandle<T> {
    type Output = Option<T>;
    type IntoFuture = HandleFuture<Self>;

    fn into_future(self) -> Self::IntoFuture {
        HandleFuture::new(self)
    }
}

impl<T: 'static> std::fmt::Debug for AssetHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (name, state) = self
            .inner
            .read(|d| (d.base.name.clone(), d.base.state))
            .unwrap_or_default();
        f.debug_struct("AssetHandle")
            .field("type", &type_name::<T>())
            .field("name", &name)
            .field("state", &state)
            .finish()
    }
}

// ============================================================================
// Extraction
// ============================================================================

fn cast<T: 'static, U: 'static>(value: U) -> Option<T> {
    (Box::new(value) as Box<dyn Any>)
        .downcast::<T>()
        .ok()
        .map(|value| *value)
}

/// Extract `T` from a loaded object according to its category.
///
/// Failures are reported through the context and yield `None`.
pub(crate) fn extract<T: Clone + 'static>(
    ctx: &AssetContext,
    raw: &RawAsset,
    category: AssetCategory,
) -> Option<T> {
    if let Some(untyped) = (raw as &dyn Any).downcast_ref::<T>() {
        return Some(untyped.clone());
    }

    let requested = type_name::<T>();
    let mismatch = AssetError::CategoryMismatch {
        category,
        requested,
    };

    match category {
        AssetCategory::InternalBundledAsset => {
            let Some(native) = raw.as_native() else {
                ctx.report(mismatch);
                return None;
            };

            if let Some(value) = native.downcast_ref::<T>() {
                return Some(value.clone());
            }
            if TypeId::of::<T>() == TypeId::of::<Sprite>()
                && let Some(texture) = native.downcast_ref::<Texture>()
            {
                return cast(Sprite::from_texture(texture));
            }
            if TypeId::of::<T>() == TypeId::of::<Texture>()
                && let Some(sprite) = native.downcast_ref::<Sprite>()
            {
                return cast(sprite.texture().clone());
            }

            ctx.report(mismatch);
            None
        }
        AssetCategory::InternalRawAsset | AssetCategory::ExternalRawAsset => {
            let Some(bytes) = raw.as_bytes() else {
                ctx.report(mismatch);
                return None;
            };

            if let Some(bytes) = (bytes as &dyn Any).downcast_ref::<T>() {
                return Some(bytes.clone());
            }

            let converted = ctx.converters().convert::<T>(bytes);
            match converted {
                Ok(value) => Some(value),
                Err(e) => {
                    ctx.report(e);
                    None
                }
            }
        }
        AssetCategory::None => {
            ctx.report(mismatch);
            None
        }
    }
}
