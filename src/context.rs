//! Shared context injected into every handle
//!
//! Replaces a process-wide pool: whichever subsystem vends handles owns an
//! `Rc<AssetContext>` and passes it to the factories.

use std::cell::{Cell, Ref, RefCell};
use std::collections::VecDeque;
use std::fmt::Display;
use std::rc::Rc;

use crate::asset::RawAsset;
use crate::config::HandleConfig;
use crate::convert::ConverterRegistry;
use crate::error::{AssetError, HandleOp};
use crate::pool::ReferencePool;

/// Receives loaded objects back when a handle is unloaded.
pub trait AssetReleaser {
    /// Hand `asset`, loaded under `name`, back to the subsystem owning its memory.
    fn release_asset(&self, name: &str, asset: &RawAsset);
}

impl<F: Fn(&str, &RawAsset)> AssetReleaser for F {
    fn release_asset(&self, name: &str, asset: &RawAsset) {
        self(name, asset);
    }
}

/// Pool, converters, release hook and diagnostics shared by all handles.
pub struct AssetContext {
    config: HandleConfig,
    pool: ReferencePool,
    converters: RefCell<ConverterRegistry>,
    releaser: RefCell<Option<Rc<dyn AssetReleaser>>>,
    diagnostics: RefCell<VecDeque<AssetError>>,
    reported: Cell<usize>,
}

impl AssetContext {
    /// Create a context with an empty converter registry
    #[must_use]
    pub fn new(config: HandleConfig) -> Rc<Self> {
        Self::with_converters(config, ConverterRegistry::new())
    }

    /// Create a context with the given converters
    #[must_use]
    pub fn with_converters(config: HandleConfig, converters: ConverterRegistry) -> Rc<Self> {
        Rc::new(Self {
            pool: ReferencePool::new(config.max_pooled_per_kind),
            converters: RefCell::new(converters),
            releaser: RefCell::new(None),
            diagnostics: RefCell::new(VecDeque::with_capacity(config.diagnostic_capacity)),
            reported: Cell::new(0),
            config,
        })
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &HandleConfig {
        &self.config
    }

    /// The handle pool
    #[must_use]
    pub const fn pool(&self) -> &ReferencePool {
        &self.pool
    }

    /// Registered converters
    #[must_use]
    pub fn converters(&self) -> Ref<'_, ConverterRegistry> {
        self.converters.borrow()
    }

    /// Register the raw asset converter for `T`
    pub fn register_converter<T, E, F>(&self, converter: F)
    where
        T: 'static,
        E: Display,
        F: Fn(&[u8]) -> Result<T, E> + 'static,
    {
        self.converters.borrow_mut().register(converter);
    }

    /// Install the hook that receives unloaded objects
    pub fn set_releaser(&self, releaser: Rc<dyn AssetReleaser>) {
        *self.releaser.borrow_mut() = Some(releaser);
    }

    /// Hand a loaded object back to its owner
    pub fn release_asset(&self, name: &str, asset: &RawAsset) {
        // Cloned out so the hook may touch the context itself
        let releaser = self.releaser.borrow().clone();
        match releaser {
            Some(releaser) => releaser.release_asset(name, asset),
            None => log::debug!("No releaser installed, dropping '{name}'"),
        }
    }

    /// Log an error and keep it in the diagnostics history
    pub fn report(&self, error: AssetError) {
        match &error {
            AssetError::InvalidHandle {
                operation: HandleOp::Cancel,
                ..
            } => log::warn!("{error}"),
            _ => log::error!("{error}"),
        }

        self.reported.set(self.reported.get() + 1);

        let capacity = self.config.diagnostic_capacity;
        if capacity == 0 {
            return;
        }
        let mut diagnostics = self.diagnostics.borrow_mut();
        if diagnostics.len() >= capacity {
            diagnostics.pop_front();
        }
        diagnostics.push_back(error);
    }

    /// Total number of errors reported, including ones evicted from history
    #[must_use]
    pub fn reported_count(&self) -> usize {
        self.reported.get()
    }

    /// Recent errors, oldest first
    #[must_use]
    pub fn diagnostics(&self) -> Vec<AssetError> {
        self.diagnostics.borrow().iter().cloned().collect()
    }

    /// Drain the recent errors
    pub fn take_diagnostics(&self) -> Vec<AssetError> {
        self.diagnostics.borrow_mut().drain(..).collect()
    }
}

impl std::fmt::Debug for AssetContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetContext")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("converters", &*self.converters.borrow())
            .field("reported", &self.reported.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_keeps_bounded_history() {
        let ctx = AssetContext::new(HandleConfig::default().with_diagnostic_capacity(2));

        for expected in 1..=3 {
            ctx.report(AssetError::BatchOverflow { expected });
        }

        assert_eq!(ctx.reported_count(), 3);
        assert_eq!(
            ctx.diagnostics(),
            vec![
                AssetError::BatchOverflow { expected: 2 },
                AssetError::BatchOverflow { expected: 3 },
            ]
        );
        assert_eq!(ctx.take_diagnostics().len(), 2);
        assert!(ctx.diagnostics().is_empty());
    }

    #[test]
    fn test_zero_capacity_only_counts() {
        let ctx = AssetContext::new(HandleConfig::default().with_diagnostic_capacity(0));
        ctx.report(AssetError::MissingConverter { requested: "u8" });
        assert_eq!(ctx.reported_count(), 1);
        assert!(ctx.diagnostics().is_empty());
    }

    #[test]
    fn test_releaser_receives_asset() {
        let ctx = AssetContext::new(HandleConfig::default());
        let released = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&released);
        ctx.set_releaser(Rc::new(move |name: &str, _asset: &RawAsset| {
            sink.borrow_mut().push(name.to_string());
        }));

        ctx.release_asset("hero.png", &RawAsset::bytes(vec![0_u8]));
        assert_eq!(*released.borrow(), vec!["hero.png".to_string()]);
    }

    #[test]
    fn test_register_converter() {
        let ctx = AssetContext::new(HandleConfig::default());
        ctx.register_converter(|bytes: &[u8]| -> Result<usize, String> { Ok(bytes.len()) });
        assert!(ctx.converters().contains::<usize>());
    }
}
