//! Asset handle runtime
//!
//! This crate provides:
//! - Pooled, generation-checked handles for in-flight asset loads
//! - Typed asset handles with category based result conversion
//! - Batch handles that complete once all members have completed
//! - A poll-once awaiter and a `Future` adapter over any handle
//! - An in-memory asset manager driving loads through `update`

pub mod asset;
pub mod config;
pub mod context;
pub mod convert;
pub mod error;
pub mod handle;
pub mod manager;
pub mod pool;

// Re-exports for convenience
pub use glam;
pub use image;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::asset::{AssetCategory, Bytes, NativeAsset, PixelRect, RawAsset, Sprite, Texture};
    pub use crate::config::HandleConfig;
    pub use crate::context::{AssetContext, AssetReleaser};
    pub use crate::convert::ConverterRegistry;
    pub use crate::error::{AssetError, HandleOp};
    pub use crate::handle::{AssetHandle, Awaiter, BatchAssetHandle, HandleFuture, Handler, HandlerState};
    pub use crate::manager::{AssetManager, AssetSource, MemorySource};
    pub use glam::{UVec2, Vec2};
}
