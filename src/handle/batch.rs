//! Batch handle
//!
//! Aggregates a fixed number of member loads into one completion. The batch
//! releases itself once every member has completed, but the members stay
//! owned by the caller and must be unloaded individually unless the batch
//! is cancelled or unloaded first.

use std::future::IntoFuture;
use std::rc::Rc;

use smallvec::SmallVec;

use super::{AssetHandle, Continuation, HandleBase, HandleData, HandleFuture, HandleRef, Handler, HandlerState};
use crate::asset::{AssetCategory, RawAsset};
use crate::context::AssetContext;
use crate::error::{AssetError, HandleOp};
use crate::pool::Reference;

/// Batch completion callback, receives the members in registration order.
pub type BatchLoadedCallback = Box<dyn FnOnce(&[AssetHandle<RawAsset>])>;

#[derive(Default)]
pub(crate) struct BatchData {
    base: HandleBase,
    asset_count: usize,
    loaded_count: usize,
    handlers: SmallVec<[AssetHandle<RawAsset>; 8]>,
    on_loaded: Option<BatchLoadedCallback>,
}

impl Reference for BatchData {
    fn clear(&mut self) {
        self.base.clear();
        self.asset_count = 0;
        self.loaded_count = 0;
        self.handlers.clear();
        self.on_loaded = None;
    }
}

impl HandleData for BatchData {
    fn kind() -> &'static str {
        "BatchAssetHandle"
    }

    fn base(&self) -> &HandleBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut HandleBase {
        &mut self.base
    }
}

/// Handle completing once all of its member loads have completed.
#[derive(Clone)]
pub struct BatchAssetHandle {
    inner: HandleRef<BatchData>,
}

impl BatchAssetHandle {
    /// Vend a pooled batch expecting `asset_count` members
    #[must_use]
    pub fn create(ctx: &Rc<AssetContext>, asset_count: usize) -> Self {
        Self::create_inner(ctx, asset_count, None)
    }

    /// Vend a pooled batch whose `callback` fires once all members completed
    #[must_use]
    pub fn create_with_callback(
        ctx: &Rc<AssetContext>,
        asset_count: usize,
        callback: impl FnOnce(&[AssetHandle<RawAsset>]) + 'static,
    ) -> Self {
        Self::create_inner(ctx, asset_count, Some(Box::new(callback)))
    }

    fn create_inner(
        ctx: &Rc<AssetContext>,
        asset_count: usize,
        callback: Option<BatchLoadedCallback>,
    ) -> Self {
        let inner = HandleRef::acquire(ctx, |d: &mut BatchData| {
            d.base.begin(String::new());
            d.asset_count = asset_count;
            d.on_loaded = callback;
        });
        let batch = Self { inner };

        // Nothing would ever complete an empty batch
        if asset_count == 0 && ctx.config().complete_empty_batches {
            batch.check_loaded();
        }
        batch
    }

    /// Number of members expected
    #[must_use]
    pub fn asset_count(&self) -> usize {
        self.inner.read(|d| d.asset_count).unwrap_or_default()
    }

    /// Number of member completions observed
    #[must_use]
    pub fn loaded_count(&self) -> usize {
        self.inner.read(|d| d.loaded_count).unwrap_or_default()
    }

    /// Members in registration order
    #[must_use]
    pub fn handlers(&self) -> Vec<AssetHandle<RawAsset>> {
        self.inner
            .read(|d| d.handlers.to_vec())
            .unwrap_or_default()
    }

    /// Register a member. Call exactly `asset_count` times.
    ///
    /// The member's completion callback must notify this batch; use
    /// [`member_callback`](Self::member_callback) or
    /// [`create_member`](Self::create_member).
    ///
    /// A member cancelled on its own while `Doing` never completes, so the
    /// batch then stays `Doing` until it is cancelled or unloaded itself.
    pub fn add_asset_handler(&self, handler: AssetHandle<RawAsset>) {
        if !self.inner.is_live() {
            self.inner.report_invalid(HandleOp::AddMember);
            return;
        }

        let added = self
            .inner
            .write(|d| {
                if d.handlers.len() >= d.asset_count {
                    return Err(d.asset_count);
                }
                d.handlers.push(handler);
                Ok(())
            })
            .unwrap_or(Ok(()));
        if let Err(expected) = added {
            self.inner.ctx().report(AssetError::BatchOverflow { expected });
        }
    }

    /// Completion callback that counts a member towards this batch
    ///
    /// Only members accepted by `add_asset_handler` are counted.
    #[must_use]
    pub fn member_callback(&self) -> impl FnOnce(&AssetHandle<RawAsset>) + 'static {
        let batch = self.clone();
        move |member: &AssetHandle<RawAsset>| batch.on_asset_loaded(member)
    }

    /// Vend a member handle already wired to this batch and register it
    #[must_use]
    pub fn create_member(&self, name: impl Into<String>, category: AssetCategory) -> AssetHandle<RawAsset> {
        let member = AssetHandle::create_with_callback(self.inner.ctx(), name, category, self.member_callback());
        self.add_asset_handler(member.clone());
        member
    }

    fn on_asset_loaded(&self, member: &AssetHandle<RawAsset>) {
        if !self.inner.is_live() {
            log::debug!("Member completed after its batch was released");
            return;
        }

        let registered = self
            .inner
            .read(|d| d.handlers.iter().any(|h| h.same_handle(member)))
            .unwrap_or(false);
        if !registered {
            log::debug!("Ignoring completion of unregistered member '{}'", member.name());
            return;
        }

        let counted = self
            .inner
            .write(|d| {
                if d.loaded_count >= d.asset_count {
                    return Err(d.asset_count);
                }
                d.loaded_count += 1;
                Ok(())
            })
            .unwrap_or(Ok(()));
        match counted {
            Ok(()) => {
                self.check_loaded();
            }
            Err(expected) => self.inner.ctx().report(AssetError::BatchOverflow { expected }),
        }
    }

    /// Complete the batch if every member has completed.
    ///
    /// Fires the callback, then the continuation, then releases the batch.
    /// Returns whether the batch completed.
    pub fn check_loaded(&self) -> bool {
        let ready = self
            .inner
            .read(|d| d.base.state == HandlerState::Doing && d.loaded_count == d.asset_count)
            .unwrap_or(false);
        if !ready || !self.inner.transition(HandlerState::Success) {
            return false;
        }

        let (callback, handlers) = self
            .inner
            .write(|d| (d.on_loaded.take(), d.handlers.to_vec()))
            .unwrap_or_default();
        log::debug!("Batch of {} assets loaded", handlers.len());

        if let Some(callback) = callback {
            callback(&handlers);
        }
        if let Some(continuation) = self.inner.take_continuation() {
            continuation();
        }

        // Members are not released; the caller owns them
        if self.inner.state() == HandlerState::Success {
            self.inner.release();
        }
        true
    }
}

impl Handler for BatchAssetHandle {
    type Output = Vec<AssetHandle<RawAsset>>;

    fn name(&self) -> String {
        self.inner.name()
    }

    fn state(&self) -> HandlerState {
        self.inner.state()
    }

    fn result(&self) -> Self::Output {
        self.handlers()
    }

    fn on_completed(&self, continuation: Continuation) {
        self.inner.set_continuation(continuation);
    }

    /// Cancel every live member, then release the batch.
    fn cancel(&self) {
        if !self.inner.is_live() {
            self.inner.report_invalid(HandleOp::Cancel);
            return;
        }

        for handler in self.handlers() {
            if handler.is_valid() {
                handler.cancel();
            }
        }
        self.inner.release();
    }

    /// Unload every live member, then release the batch.
    fn unload(&self) {
        if !self.inner.is_live() {
            self.inner.report_invalid(HandleOp::Unload);
            return;
        }

        for handler in self.handlers() {
            if handler.is_valid() {
                handler.unload();
            }
        }
        self.inner.release();
    }

    fn release(&self) {
        self.inner.release();
    }
}

impl IntoFuture for BatchAssetHandle {
    type Output = Vec<AssetHandle<RawAsset>>;
    type IntoFuture = HandleFuture<Self>;

    fn into_future(self) -> Self::IntoFuture {
        HandleFuture::new(self)
    }
}

impl std::fmt::Debug for BatchAssetHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (state, loaded, expected) = self
            .inner
            .read(|d| (d.base.state, d.loaded_count, d.asset_count))
            .unwrap_or_default();
        f.debug_struct("BatchAssetHandle")
            .field("state", &state)
            .field("loaded", &loaded)
            .field("expected", &expected)
            .finish()
    }
}
