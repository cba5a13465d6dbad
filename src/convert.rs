//! Raw asset converters
//!
//! Raw assets arrive as bytes. Any other requested type is produced by a
//! converter registered for that type.

use std::any::{Any, TypeId, type_name};
use std::fmt::Display;

use rustc_hash::FxHashMap;

use crate::asset::Texture;
use crate::error::AssetError;

type ErasedConverter = Box<dyn Fn(&[u8]) -> Result<Box<dyn Any>, String>>;

struct Entry {
    convert: ErasedConverter,
    type_name: &'static str,
}

/// Maps a requested result type to a `bytes -> T` function.
#[derive(Default)]
pub struct ConverterRegistry {
    converters: FxHashMap<TypeId, Entry>,
}

impl ConverterRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with converters for `String`, `serde_json::Value` and `Texture`
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(|bytes| String::from_utf8(bytes.to_vec()));
        registry.register(|bytes| serde_json::from_slice::<serde_json::Value>(bytes));
        registry.register(Texture::from_bytes);
        registry
    }

    /// Register the converter for `T`, replacing any previous one
    pub fn register<T, E, F>(&mut self, converter: F)
    where
        T: 'static,
        E: Display,
        F: Fn(&[u8]) -> Result<T, E> + 'static,
    {
        let convert: ErasedConverter = Box::new(move |bytes| {
            converter(bytes)
                .map(|value| Box::new(value) as Box<dyn Any>)
                .map_err(|e| e.to_string())
        });
        self.converters.insert(
            TypeId::of::<T>(),
            Entry {
                convert,
                type_name: type_name::<T>(),
            },
        );
    }

    /// Whether a converter for `T` is registered
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.converters.contains_key(&TypeId::of::<T>())
    }

    /// Remove the converter for `T`
    pub fn unregister<T: 'static>(&mut self) -> bool {
        self.converters.remove(&TypeId::of::<T>()).is_some()
    }

    /// Registered type names, for diagnostics
    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.converters.values().map(|entry| entry.type_name)
    }

    /// Convert `bytes` into `T` with the registered converter
    ///
    /// # Errors
    ///
    /// Returns an error if no converter is registered for `T` or the
    /// converter rejects the payload
    pub fn convert<T: 'static>(&self, bytes: &[u8]) -> Result<T, AssetError> {
        let requested = type_name::<T>();
        let entry = self
            .converters
            .get(&TypeId::of::<T>())
            .ok_or(AssetError::MissingConverter { requested })?;

        let value = (entry.convert)(bytes)
            .map_err(|reason| AssetError::Conversion { requested, reason })?;

        // Entries are keyed by the TypeId of the value they box
        value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| AssetError::Conversion {
                requested,
                reason: String::from("converter produced a different type"),
            })
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.type_names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Level(u32);

    #[test]
    fn test_custom_converter() {
        let mut registry = ConverterRegistry::new();
        registry.register(|bytes: &[u8]| -> Result<Level, String> {
            bytes
                .first()
                .map(|b| Level(u32::from(*b)))
                .ok_or_else(|| String::from("empty"))
        });

        assert!(registry.contains::<Level>());
        assert_eq!(registry.convert::<Level>(&[3]).unwrap(), Level(3));

        let err = registry.convert::<Level>(&[]).unwrap_err();
        assert!(matches!(err, AssetError::Conversion { reason, .. } if reason == "empty"));
    }

    #[test]
    fn test_missing_converter() {
        let registry = ConverterRegistry::new();
        let err = registry.convert::<Level>(b"x").unwrap_err();
        assert!(matches!(err, AssetError::MissingConverter { .. }));
    }

    #[test]
    fn test_default_converters() {
        let registry = ConverterRegistry::with_defaults();

        assert_eq!(registry.convert::<String>(b"hello").unwrap(), "hello");

        let json = registry
            .convert::<serde_json::Value>(br#"{"hp": 10}"#)
            .unwrap();
        assert_eq!(json["hp"], 10);

        assert!(registry.convert::<String>(&[0xff, 0xfe]).is_err());
        assert!(registry.convert::<Texture>(b"not an image").is_err());
    }

    #[test]
    fn test_unregister() {
        let mut registry = ConverterRegistry::with_defaults();
        assert!(registry.unregister::<String>());
        assert!(!registry.contains::<String>());
        assert!(!registry.unregister::<String>());
    }
}
