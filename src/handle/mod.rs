//! Handle lifecycle
//!
//! Every handle kind shares one state machine:
//!
//! ```text
//!            create                set_asset / check_loaded
//! InValid ----------> Doing ------------------------------> Success | Failed
//!    ^                                                            |
//!    +----------------------- release -------------------------- +
//! ```
//!
//! Handles are thin references to a pooled slot. Each slot carries a
//! generation that is bumped on release, so a clone kept past `release`
//! reads as `InValid` instead of observing whichever load reuses the slot.

mod asset;
mod awaiter;
mod batch;

pub use asset::{AssetHandle, AssetLoadedCallback};
pub use awaiter::{Awaiter, HandleFuture};
pub use batch::{BatchAssetHandle, BatchLoadedCallback};

use std::cell::RefCell;
use std::rc::Rc;

use crate::context::AssetContext;
use crate::error::{AssetError, HandleOp};
use crate::pool::Reference;

/// Zero-argument continuation resumed when a handle reaches a terminal state.
pub type Continuation = Box<dyn FnOnce()>;

// ============================================================================
// Handler State
// ============================================================================

/// Lifecycle state of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HandlerState {
    /// Pooled, released, or never vended
    #[default]
    InValid,
    /// Load in flight
    Doing,
    /// Result available
    Success,
    /// Load failed, no result
    Failed,
}

impl HandlerState {
    /// Whether this is `Success` or `Failed`
    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Doing, Self::Success | Self::Failed) | (_, Self::InValid)
        )
    }
}

// ============================================================================
// Handle Base
// ============================================================================

/// Fields shared by every handle kind.
#[derive(Default)]
pub(crate) struct HandleBase {
    name: String,
    state: HandlerState,
    continuation: Option<Continuation>,
    /// Slot identity, survives `clear`
    generation: u32,
}

impl HandleBase {
    /// Vend the slot for a new load.
    fn begin(&mut self, name: String) {
        self.name = name;
        self.state = HandlerState::Doing;
    }

    fn transition(&mut self, next: HandlerState) -> Result<(), AssetError> {
        if !self.state.can_transition_to(next) {
            return Err(AssetError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    fn clear(&mut self) {
        self.name.clear();
        self.state = HandlerState::InValid;
        self.continuation = None;
    }
}

/// Pooled payload of a concrete handle kind.
pub(crate) trait HandleData: Reference {
    /// Kind name used in diagnostics
    fn kind() -> &'static str;

    fn base(&self) -> &HandleBase;

    fn base_mut(&mut self) -> &mut HandleBase;
}

// ============================================================================
// Handle Reference
// ============================================================================

/// A generation-checked reference to a pooled handle slot.
pub(crate) struct HandleRef<D: HandleData> {
    slot: Rc<RefCell<D>>,
    generation: u32,
    ctx: Rc<AssetContext>,
}

impl<D: HandleData> Clone for HandleRef<D> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
            generation: self.generation,
            ctx: Rc::clone(&self.ctx),
        }
    }
}

impl<D: HandleData> HandleRef<D> {
    /// Take a slot from the pool and initialise it.
    fn acquire(ctx: &Rc<AssetContext>, init: impl FnOnce(&mut D)) -> Self {
        let slot: Rc<RefCell<D>> = ctx.pool().get();
        let generation = {
            let mut data = slot.borrow_mut();
            init(&mut data);
            data.base().generation
        };
        Self {
            slot,
            generation,
            ctx: Rc::clone(ctx),
        }
    }

    fn ctx(&self) -> &Rc<AssetContext> {
        &self.ctx
    }

    fn is_current(data: &D, generation: u32) -> bool {
        data.base().generation == generation
    }

    fn state(&self) -> HandlerState {
        let data = self.slot.borrow();
        if Self::is_current(&data, self.generation) {
            data.base().state
        } else {
            HandlerState::InValid
        }
    }

    fn is_live(&self) -> bool {
        self.state() != HandlerState::InValid
    }

    /// Read the slot, `None` if this reference is stale.
    fn read<R>(&self, f: impl FnOnce(&D) -> R) -> Option<R> {
        let data = self.slot.borrow();
        Self::is_current(&data, self.generation).then(|| f(&data))
    }

    /// Mutate the slot, `None` if this reference is stale.
    fn write<R>(&self, f: impl FnOnce(&mut D) -> R) -> Option<R> {
        let mut data = self.slot.borrow_mut();
        if Self::is_current(&data, self.generation) {
            Some(f(&mut data))
        } else {
            None
        }
    }

    fn name(&self) -> String {
        self.read(|d| d.base().name.clone()).unwrap_or_default()
    }

    /// Move to `next`, reporting illegal transitions.
    fn transition(&self, next: HandlerState) -> bool {
        match self.write(|d| d.base_mut().transition(next)) {
            Some(Ok(())) => true,
            Some(Err(e)) => {
                self.ctx.report(e);
                false
            }
            None => false,
        }
    }

    fn set_continuation(&self, continuation: Continuation) {
        if !self.is_live() {
            self.report_invalid(HandleOp::OnCompleted);
            return;
        }
        // Single slot: a previous continuation is dropped uncalled
        self.write(|d| d.base_mut().continuation = Some(continuation));
    }

    fn take_continuation(&self) -> Option<Continuation> {
        self.write(|d| d.base_mut().continuation.take()).flatten()
    }

    fn report_invalid(&self, operation: HandleOp) {
        self.ctx.report(AssetError::InvalidHandle {
            operation,
            kind: D::kind(),
        });
    }

    /// Clear the slot and return it to the pool.
    fn release(&self) -> bool {
        if !self.is_live() {
            self.report_invalid(HandleOp::Release);
            return false;
        }
        self.write(|d| {
            let base = d.base_mut();
            base.generation = base.generation.wrapping_add(1);
        });
        self.ctx.pool().release(Rc::clone(&self.slot));
        true
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.slot, &other.slot) && self.generation == other.generation
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// Lifecycle contract shared by every handle kind.
///
/// Misuse on an `InValid` handle (double cancel, double unload, use after
/// release) is reported through the context and otherwise ignored.
pub trait Handler: Clone {
    /// Value produced when the handle completes
    type Output: Default;

    /// Name of the requested resource
    fn name(&self) -> String;

    /// Current state; `InValid` once released, also through stale clones
    fn state(&self) -> HandlerState;

    /// The completed result, or the default if there is none
    fn result(&self) -> Self::Output;

    /// Store the continuation resumed on completion.
    ///
    /// There is one slot: registering again replaces the previous
    /// continuation, which is then never called.
    fn on_completed(&self, continuation: Continuation);

    /// Abandon the handle and everything it owns, then release it
    fn cancel(&self);

    /// Hand loaded resources back to their owner, then release the handle
    fn unload(&self);

    /// Reset the handle and return it to the pool
    fn release(&self);

    /// Whether the handle is not `InValid`
    fn is_valid(&self) -> bool {
        self.state() != HandlerState::InValid
    }

    /// Whether the handle reached `Success` or `Failed`
    fn is_done(&self) -> bool {
        self.state().is_done()
    }

    /// Poll-once awaiter over this handle
    fn get_awaiter(&self) -> Awaiter<Self> {
        Awaiter::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use HandlerState::*;

        assert!(Doing.can_transition_to(Success));
        assert!(Doing.can_transition_to(Failed));
        for state in [InValid, Doing, Success, Failed] {
            assert!(state.can_transition_to(InValid));
        }

        assert!(!InValid.can_transition_to(Success));
        assert!(!Success.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Success));
        assert!(!Success.can_transition_to(Doing));
        assert!(!Doing.can_transition_to(Doing));
    }

    #[test]
    fn test_base_transition_rejects_regression() {
        let mut base = HandleBase::default();
        base.begin(String::from("a"));
        assert!(base.transition(HandlerState::Success).is_ok());

        let err = base.transition(HandlerState::Failed).unwrap_err();
        assert_eq!(
            err,
            AssetError::IllegalTransition {
                from: HandlerState::Success,
                to: HandlerState::Failed,
            }
        );
        assert_eq!(base.state, HandlerState::Success);
    }

    #[test]
    fn test_base_clear_is_idempotent() {
        let mut base = HandleBase::default();
        base.begin(String::from("a"));
        base.continuation = Some(Box::new(|| {}));
        base.generation = 3;

        base.clear();
        base.clear();

        assert!(base.name.is_empty());
        assert_eq!(base.state, HandlerState::InValid);
        assert!(base.continuation.is_none());
        assert_eq!(base.generation, 3);
    }
}
