//! Reference Pool for Handle Reuse
//!
//! Handles are vended for every single load request, so they are recycled
//! instead of allocated fresh. A released instance is cleared through its
//! [`Reference`] contract and parked on a per-kind free list until the next
//! `get` of the same kind.
//!
//! # Design Principles
//!
//! - **Keyed by type**: one free list per concrete kind, looked up by `TypeId`
//! - **Reset on release**: instances are cleared when they come back, never on `get`
//! - **No ownership tracking**: releasing a foreign or already released
//!   instance is not detected here; handles guard against it with generations
//!
//! # Example
//!
//! ```ignore
//! let pool = ReferencePool::new(1024);
//!
//! let slot: Rc<RefCell<AssetHandleData<Texture>>> = pool.get();
//! // ... use it ...
//! pool.release(slot); // cleared and parked for the next get
//! ```

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

// ============================================================================
// Reference Contract
// ============================================================================

/// A poolable instance.
///
/// `clear` must put every field back to its default, must be idempotent and
/// must not panic regardless of the current contents.
pub trait Reference: Default + 'static {
    /// Reset all fields to their defaults.
    fn clear(&mut self);
}

/// Shared slots are pooled as a unit; clearing resets the inner value.
impl<R: Reference> Reference for Rc<RefCell<R>> {
    fn clear(&mut self) {
        self.borrow_mut().clear();
    }
}

// ============================================================================
// Pool Statistics
// ============================================================================

/// Allocation counters for one pooled kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances constructed because the free list was empty
    pub created: usize,
    /// Instances handed out from the free list
    pub reused: usize,
    /// Instances returned through `release`
    pub released: usize,
    /// Released instances dropped because the free list was full
    pub dropped: usize,
}

// ============================================================================
// Typed Pool
// ============================================================================

/// A free list of cleared instances of one kind.
///
/// | Operation | Time Complexity |
/// |-----------|-----------------|
/// | `get`     | O(1) amortized  |
/// | `release` | O(1) + `clear`  |
#[derive(Debug)]
pub struct Pool<K: Reference> {
    /// Cleared instances ready for reuse
    free: Vec<K>,
    /// Free list cap
    max_free: usize,
    /// Allocation counters
    stats: PoolStats,
}

impl<K: Reference> Pool<K> {
    /// Create an empty pool with an unbounded free list.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_free(usize::MAX)
    }

    /// Create an empty pool that keeps at most `max_free` released instances.
    #[must_use]
    pub fn with_max_free(max_free: usize) -> Self {
        Self {
            free: Vec::new(),
            max_free,
            stats: PoolStats::default(),
        }
    }

    /// Take a released instance, or construct a new one if none is free.
    pub fn get(&mut self) -> K {
        match self.free.pop() {
            Some(item) => {
                self.stats.reused += 1;
                item
            }
            None => {
                self.stats.created += 1;
                K::default()
            }
        }
    }

    /// Clear an instance and return it to the free list.
    pub fn release(&mut self, mut item: K) {
        item.clear();
        self.recycle(item);
    }

    /// Park an instance that has already been cleared.
    fn recycle(&mut self, item: K) {
        self.stats.released += 1;
        if self.free.len() < self.max_free {
            self.free.push(item);
        } else {
            self.stats.dropped += 1;
        }
    }

    /// Number of instances waiting for reuse.
    #[must_use]
    #[inline]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Allocation counters.
    #[must_use]
    #[inline]
    pub const fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Drop every free instance. Counters are kept.
    pub fn shrink(&mut self) {
        self.free.clear();
    }
}

impl<K: Reference> Default for Pool<K> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Reference Pool
// ============================================================================

/// Pools for every kind, keyed by `TypeId`.
///
/// Mutations go through a `RefCell`, so `get`/`release` must be serialized on
/// the single execution context that owns the handles.
pub struct ReferencePool {
    /// Type-erased `Pool<K>` per kind
    pools: RefCell<FxHashMap<TypeId, Box<dyn Any>>>,
    /// Free list cap applied to every kind
    max_free_per_kind: usize,
}

impl ReferencePool {
    /// Create a reference pool; each kind keeps at most `max_free_per_kind` free instances.
    #[must_use]
    pub fn new(max_free_per_kind: usize) -> Self {
        Self {
            pools: RefCell::new(FxHashMap::default()),
            max_free_per_kind,
        }
    }

    fn with_pool<K: Reference, R>(&self, f: impl FnOnce(&mut Pool<K>) -> R) -> R {
        let mut pools = self.pools.borrow_mut();
        let pool = pools
            .entry(TypeId::of::<K>())
            .or_insert_with(|| Box::new(Pool::<K>::with_max_free(self.max_free_per_kind)))
            .downcast_mut::<Pool<K>>()
            .expect("Type mismatch in reference pool");
        f(pool)
    }

    /// Take a released instance of kind `K`, or construct one.
    pub fn get<K: Reference>(&self) -> K {
        self.with_pool(Pool::<K>::get)
    }

    /// Clear an instance and return it to its kind's free list.
    pub fn release<K: Reference>(&self, mut item: K) {
        // Cleared outside the map borrow: dropping captured callbacks must not
        // observe the pool mid-mutation.
        item.clear();
        self.with_pool(|pool: &mut Pool<K>| pool.recycle(item));
    }

    /// Number of free instances of kind `K`.
    #[must_use]
    pub fn free_count<K: Reference>(&self) -> usize {
        self.pools
            .borrow()
            .get(&TypeId::of::<K>())
            .and_then(|pool| pool.downcast_ref::<Pool<K>>())
            .map_or(0, Pool::free_count)
    }

    /// Allocation counters for kind `K`.
    #[must_use]
    pub fn stats<K: Reference>(&self) -> PoolStats {
        self.pools
            .borrow()
            .get(&TypeId::of::<K>())
            .and_then(|pool| pool.downcast_ref::<Pool<K>>())
            .map(Pool::stats)
            .unwrap_or_default()
    }

    /// Number of kinds that have been pooled so far.
    #[must_use]
    pub fn kind_count(&self) -> usize {
        self.pools.borrow().len()
    }
}

impl Default for ReferencePool {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

impl std::fmt::Debug for ReferencePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferencePool")
            .field("kinds", &self.kind_count())
            .field("max_free_per_kind", &self.max_free_per_kind)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct TestObject {
        name: String,
        value: i32,
    }

    impl Reference for TestObject {
        fn clear(&mut self) {
            self.name.clear();
            self.value = 0;
        }
    }

    #[derive(Debug, Default)]
    struct OtherObject(u8);

    impl Reference for OtherObject {
        fn clear(&mut self) {
            self.0 = 0;
        }
    }

    #[test]
    fn test_pool_get_constructs_when_empty() {
        let mut pool: Pool<TestObject> = Pool::new();
        let obj = pool.get();
        assert_eq!(obj.value, 0);
        assert_eq!(pool.stats().created, 1);
        assert_eq!(pool.stats().reused, 0);
    }

    #[test]
    fn test_pool_release_clears_fields() {
        let mut pool: Pool<TestObject> = Pool::new();

        let mut obj = pool.get();
        obj.name.push_str("x");
        obj.value = 7;
        pool.release(obj);

        let reused = pool.get();
        assert!(reused.name.is_empty(), "No field leakage across reuse");
        assert_eq!(reused.value, 0);
        assert_eq!(pool.stats().reused, 1);
    }

    #[test]
    fn test_pool_cap_drops_extra() {
        let mut pool: Pool<TestObject> = Pool::with_max_free(1);

        let a = pool.get();
        let b = pool.get();
        pool.release(a);
        pool.release(b);

        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.stats().dropped, 1);
        assert_eq!(pool.stats().released, 2);
    }

    #[test]
    fn test_pool_shrink() {
        let mut pool: Pool<TestObject> = Pool::new();
        let obj = pool.get();
        pool.release(obj);
        pool.shrink();
        assert_eq!(pool.free_count(), 0);
        assert_eq!(pool.stats().released, 1);
    }

    #[test]
    fn test_reference_pool_kinds_are_isolated() {
        let pool = ReferencePool::default();

        let obj: TestObject = pool.get();
        pool.release(obj);

        assert_eq!(pool.free_count::<TestObject>(), 1);
        assert_eq!(pool.free_count::<OtherObject>(), 0);

        let _other: OtherObject = pool.get();
        assert_eq!(pool.stats::<OtherObject>().created, 1);
        assert_eq!(pool.kind_count(), 2);
    }

    #[test]
    fn test_reference_pool_shared_slots() {
        let pool = ReferencePool::default();

        let slot: Rc<RefCell<TestObject>> = pool.get();
        slot.borrow_mut().value = 42;
        let kept = Rc::clone(&slot);
        pool.release(slot);

        // The instance is cleared in place, so every clone sees the reset
        assert_eq!(kept.borrow().value, 0);

        let again: Rc<RefCell<TestObject>> = pool.get();
        assert!(Rc::ptr_eq(&kept, &again));
    }
}
