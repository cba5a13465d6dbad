//! Diagnostics reported by the handle core
//!
//! Nothing here is ever returned from a handle operation. Handles report
//! through [`AssetContext::report`](crate::context::AssetContext::report),
//! which logs the error and keeps a short history for inspection.

use crate::asset::AssetCategory;
use crate::handle::HandlerState;

/// The lifecycle operation that was attempted on a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleOp {
    /// `cancel()`
    Cancel,
    /// `unload()`
    Unload,
    /// `release()`
    Release,
    /// `add_asset_handler()` / member completion on a batch
    AddMember,
    /// `on_completed()`
    OnCompleted,
}

impl std::fmt::Display for HandleOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Cancel => "cancel",
            Self::Unload => "unload",
            Self::Release => "release",
            Self::AddMember => "add_member",
            Self::OnCompleted => "on_completed",
        };
        f.write_str(name)
    }
}

/// Errors observed by the handle core.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetError {
    /// An operation was attempted on an `InValid` (pooled or stale) handle
    InvalidHandle {
        /// What was attempted
        operation: HandleOp,
        /// Handle kind, e.g. `AssetHandle<Texture>`
        kind: &'static str,
    },
    /// A state change outside `Doing -> {Success, Failed}` / `any -> InValid`
    IllegalTransition {
        /// State before the attempted transition
        from: HandlerState,
        /// Requested state
        to: HandlerState,
    },
    /// The requested type cannot be produced from an asset of this category
    CategoryMismatch {
        /// Category of the loaded object
        category: AssetCategory,
        /// Requested result type
        requested: &'static str,
    },
    /// No converter is registered for the requested type
    MissingConverter {
        /// Requested result type
        requested: &'static str,
    },
    /// A registered converter rejected the payload
    Conversion {
        /// Requested result type
        requested: &'static str,
        /// Converter's own error message
        reason: String,
    },
    /// More member completions arrived than the batch expects
    BatchOverflow {
        /// Member count fixed at creation
        expected: usize,
    },
    /// Configuration could not be parsed
    Config(String),
    /// IO error while reading configuration
    Io(String),
}

impl AssetError {
    /// Whether this is a caller bug rather than a load or conversion problem.
    #[must_use]
    pub const fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::InvalidHandle { .. } | Self::IllegalTransition { .. } | Self::BatchOverflow { .. }
        )
    }
}

impl std::fmt::Display for AssetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidHandle { operation, kind } => {
                write!(f, "{operation} called on invalid {kind}")
            }
            Self::IllegalTransition { from, to } => {
                write!(f, "Illegal handle transition: {from:?} -> {to:?}")
            }
            Self::CategoryMismatch {
                category,
                requested,
            } => write!(f, "Asset category is {category:?} but requested type is {requested}"),
            Self::MissingConverter { requested } => {
                write!(f, "No raw asset converter registered for {requested}")
            }
            Self::Conversion { requested, reason } => {
                write!(f, "Conversion to {requested} failed: {reason}")
            }
            Self::BatchOverflow { expected } => {
                write!(f, "Batch expected {expected} assets but received more completions")
            }
            Self::Config(e) => write!(f, "Config error: {e}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for AssetError {}
