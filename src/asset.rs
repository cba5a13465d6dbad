//! Loaded object model
//!
//! The loader hands handles an untyped [`RawAsset`]: either an engine-native
//! object produced by the packaging system or a raw byte payload. Typed
//! extraction turns it into whatever the caller asked for.

use std::any::Any;
use std::rc::Rc;

use glam::{UVec2, Vec2};
use image::{DynamicImage, RgbaImage};

/// Raw byte payload shared between the loader cache and handles.
pub type Bytes = Rc<[u8]>;

/// Where an asset comes from, which decides how it can be extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AssetCategory {
    /// Unclassified
    #[default]
    None,
    /// Engine-native object produced by the packaging system
    InternalBundledAsset,
    /// Raw bytes from inside the package
    InternalRawAsset,
    /// Raw bytes from outside the package
    ExternalRawAsset,
}

impl AssetCategory {
    /// Whether assets of this category are byte payloads.
    #[must_use]
    pub const fn is_raw(self) -> bool {
        matches!(self, Self::InternalRawAsset | Self::ExternalRawAsset)
    }
}

// ============================================================================
// Native Objects
// ============================================================================

/// A type-erased engine-native object.
#[derive(Clone)]
pub struct NativeAsset {
    value: Rc<dyn Any>,
    type_name: &'static str,
}

impl NativeAsset {
    /// Wrap a native object
    pub fn new<T: 'static>(value: T) -> Self {
        Self {
            value: Rc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Borrow the object as `T` if that is its concrete type
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Whether the object is a `T`
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Concrete type name, for diagnostics
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether both wrap the same allocation
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.value, &other.value)
    }
}

impl std::fmt::Debug for NativeAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("NativeAsset").field(&self.type_name).finish()
    }
}

/// The untyped result of a load.
///
/// Requesting `RawAsset` itself from a handle always returns the loaded
/// object unchanged, whatever its category.
#[derive(Debug, Clone)]
pub enum RawAsset {
    /// Engine-native object
    Native(NativeAsset),
    /// Byte payload
    Bytes(Bytes),
}

impl RawAsset {
    /// Wrap a native object
    pub fn native<T: 'static>(value: T) -> Self {
        Self::Native(NativeAsset::new(value))
    }

    /// Wrap a byte payload
    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        Self::Bytes(bytes.into())
    }

    /// The native object, if this is one
    #[must_use]
    pub const fn as_native(&self) -> Option<&NativeAsset> {
        match self {
            Self::Native(native) => Some(native),
            Self::Bytes(_) => None,
        }
    }

    /// The byte payload, if this is one
    #[must_use]
    pub const fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::Native(_) => None,
        }
    }

    /// Whether both refer to the same loaded object
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Native(a), Self::Native(b)) => a.ptr_eq(b),
            (Self::Bytes(a), Self::Bytes(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

// ============================================================================
// Images
// ============================================================================

/// A full RGBA image buffer.
#[derive(Debug, Clone)]
pub struct Texture {
    image: Rc<RgbaImage>,
}

impl Texture {
    /// Wrap an RGBA buffer
    #[must_use]
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image: Rc::new(image),
        }
    }

    /// Convert any decoded image to RGBA
    #[must_use]
    pub fn from_image(image: &DynamicImage) -> Self {
        Self::new(image.to_rgba8())
    }

    /// Decode an encoded image (PNG, JPEG)
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be decoded as an image
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, image::ImageError> {
        image::load_from_memory(bytes).map(|img| Self::from_image(&img))
    }

    /// Pixel width
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Pixel height
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Width and height
    #[must_use]
    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width(), self.height())
    }

    /// The backing buffer
    #[must_use]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Whether both share one backing buffer
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.image, &other.image)
    }
}

/// Pixel-space rectangle with a top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelRect {
    /// Top-left corner
    pub origin: UVec2,
    /// Width and height
    pub size: UVec2,
}

impl PixelRect {
    /// Create a rectangle
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            origin: UVec2::new(x, y),
            size: UVec2::new(width, height),
        }
    }
}

/// A lightweight view over a region of a [`Texture`].
#[derive(Debug, Clone)]
pub struct Sprite {
    texture: Texture,
    rect: PixelRect,
    pivot: Vec2,
}

impl Sprite {
    /// Create a view over `rect` of `texture`
    #[must_use]
    pub const fn new(texture: Texture, rect: PixelRect, pivot: Vec2) -> Self {
        Self {
            texture,
            rect,
            pivot,
        }
    }

    /// A view covering the whole texture, pivot at the origin
    #[must_use]
    pub fn from_texture(texture: &Texture) -> Self {
        let size = texture.size();
        Self::new(
            texture.clone(),
            PixelRect::new(0, 0, size.x, size.y),
            Vec2::ZERO,
        )
    }

    /// The texture this view reads from
    #[must_use]
    pub const fn texture(&self) -> &Texture {
        &self.texture
    }

    /// Region of the texture
    #[must_use]
    pub const fn rect(&self) -> PixelRect {
        self.rect
    }

    /// Pivot point
    #[must_use]
    pub const fn pivot(&self) -> Vec2 {
        self.pivot
    }
}
