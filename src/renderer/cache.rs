//! Reference-counted, budget-bounded GPU resource cache.
//!
//! The cache owns the storage; callers hold lightweight `Handle`s. An entry
//! is only evictable while its reference count is zero, so budget pressure
//! can never unmap a live resource — a scene that genuinely needs more than
//! the budget simply exceeds the soft limit.

use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;

use log::debug;

/// Typed index into a `ResourceCache`. Invalidated by eviction; `get` on a
/// stale handle returns `None` and callers fall back to placeholders.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Handle<T>(u32, PhantomData<T>);

impl<T> Copy for Handle<T> {}
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Handle<T> {
    pub fn new(idx: u32) -> Self {
        Handle(idx, PhantomData)
    }

    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheLimits {
    pub max_bytes: u64,
    pub max_entries: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_bytes: u64::MAX,
            max_entries: usize::MAX,
        }
    }
}

struct Entry<K, T> {
    key: K,
    resource: T,
    bytes: u64,
    refs: u32,
    last_used: u64,
}

pub struct ResourceCache<K, T> {
    slots: Vec<Option<Entry<K, T>>>,
    free: Vec<u32>,
    lookup: HashMap<K, u32>,
    limits: CacheLimits,
    resident_bytes: u64,
    resident_count: usize,
    clock: u64,
}

impl<K: Hash + Eq + Clone, T> Default for ResourceCache<K, T> {
    fn default() -> Self {
        Self::new(CacheLimits::default())
    }
}

impl<K: Hash + Eq + Clone, T> ResourceCache<K, T> {
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            lookup: HashMap::new(),
            limits,
            resident_bytes: 0,
            resident_count: 0,
            clock: 0,
        }
    }

    pub fn set_limits(&mut self, limits: CacheLimits) {
        self.limits = limits;
        self.evict_over_budget();
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    pub fn resident_bytes(&self) -> u64 {
        self.resident_bytes
    }

    pub fn resident_count(&self) -> usize {
        self.resident_count
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Acquire the resource under `key`, loading it on a miss. Increments the
    /// reference count either way. Eviction runs afterwards, so a single
    /// over-budget resident is permitted but cold entries are flushed.
    pub fn acquire_with<E>(
        &mut self,
        key: K,
        load: impl FnOnce() -> Result<(T, u64), E>,
    ) -> Result<Handle<T>, E> {
        if let Some(&idx) = self.lookup.get(&key) {
            let now = self.tick();
            let entry = self.slots[idx as usize]
                .as_mut()
                .expect("lookup points at an occupied slot");
            entry.refs += 1;
            entry.last_used = now;
            return Ok(Handle::new(idx));
        }

        let (resource, bytes) = load()?;
        let now = self.tick();
        let entry = Entry {
            key: key.clone(),
            resource,
            bytes,
            refs: 1,
            last_used: now,
        };

        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx as usize] = Some(entry);
                idx
            }
            None => {
                self.slots.push(Some(entry));
                (self.slots.len() - 1) as u32
            }
        };
        self.lookup.insert(key, idx);
        self.resident_bytes += bytes;
        self.resident_count += 1;
        self.evict_over_budget();
        Ok(Handle::new(idx))
    }

    /// Look up a live resource and mark it used.
    pub fn get(&mut self, handle: Handle<T>) -> Option<&T> {
        let now = self.tick();
        let entry = self.slots.get_mut(handle.idx())?.as_mut()?;
        entry.last_used = now;
        Some(&entry.resource)
    }

    /// Look up without touching the LRU clock.
    pub fn peek(&self, handle: Handle<T>) -> Option<&T> {
        self.slots.get(handle.idx())?.as_ref().map(|e| &e.resource)
    }

    pub fn handle_for(&self, key: &K) -> Option<Handle<T>> {
        self.lookup.get(key).map(|&idx| Handle::new(idx))
    }

    pub fn refs(&self, handle: Handle<T>) -> u32 {
        self.slots
            .get(handle.idx())
            .and_then(Option::as_ref)
            .map_or(0, |e| e.refs)
    }

    /// Take an additional reference on an already-acquired resource.
    pub fn retain(&mut self, handle: Handle<T>) {
        if let Some(entry) = self.slots.get_mut(handle.idx()).and_then(Option::as_mut) {
            entry.refs += 1;
        }
    }

    /// Drop one reference. The entry stays resident but becomes evictable
    /// once the count reaches zero.
    pub fn release(&mut self, handle: Handle<T>) {
        if let Some(entry) = self.slots.get_mut(handle.idx()).and_then(Option::as_mut) {
            entry.refs = entry.refs.saturating_sub(1);
        }
        self.evict_over_budget();
    }

    /// Hot-swap the resource stored under `key`, keeping its reference count.
    /// Used when an asynchronous decode completes and the placeholder is
    /// replaced. Byte accounting is updated for the new payload.
    pub fn replace(&mut self, key: &K, resource: T, bytes: u64) -> bool {
        let Some(&idx) = self.lookup.get(key) else {
            return false;
        };
        let now = self.tick();
        let entry = self.slots[idx as usize]
            .as_mut()
            .expect("lookup points at an occupied slot");
        self.resident_bytes = self.resident_bytes - entry.bytes + bytes;
        entry.resource = resource;
        entry.bytes = bytes;
        entry.last_used = now;
        self.evict_over_budget();
        true
    }

    fn over_budget(&self) -> bool {
        self.resident_bytes > self.limits.max_bytes
            || self.resident_count > self.limits.max_entries
    }

    fn evict_over_budget(&mut self) {
        while self.over_budget() {
            let victim = self
                .slots
                .iter()
                .enumerate()
                .filter_map(|(idx, slot)| slot.as_ref().map(|e| (idx, e)))
                .filter(|(_, e)| e.refs == 0)
                .min_by_key(|(_, e)| e.last_used)
                .map(|(idx, _)| idx);

            let Some(idx) = victim else {
                // Every resident is pinned; the soft limit stays exceeded.
                break;
            };

            let entry = self.slots[idx].take().expect("victim slot is occupied");
            self.lookup.remove(&entry.key);
            self.free.push(idx as u32);
            self.resident_bytes -= entry.bytes;
            self.resident_count -= 1;
            debug!("Evicted cache entry ({} bytes)", entry.bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn acquire(cache: &mut ResourceCache<&'static str, u32>, key: &'static str, bytes: u64) -> Handle<u32> {
        cache
            .acquire_with(key, || Ok::<_, Infallible>((0u32, bytes)))
            .unwrap()
    }

    #[test]
    fn acquire_shares_and_refcounts() {
        let mut cache = ResourceCache::default();
        let a = acquire(&mut cache, "tex", 100);
        let b = acquire(&mut cache, "tex", 100);
        assert_eq!(a, b);
        assert_eq!(cache.refs(a), 2);
        assert_eq!(cache.resident_count(), 1);
    }

    #[test]
    fn zero_ref_lru_entries_are_evicted_under_pressure() {
        let mut cache = ResourceCache::new(CacheLimits {
            max_bytes: 250,
            max_entries: usize::MAX,
        });
        let a = acquire(&mut cache, "a", 100);
        let b = acquire(&mut cache, "b", 100);
        cache.release(a);
        // a is the least recently used zero-ref entry; a third acquire pushes
        // the cache over budget and flushes it.
        let _c = acquire(&mut cache, "c", 100);
        assert!(cache.peek(a).is_none());
        assert!(cache.peek(b).is_some());
        assert!(cache.resident_bytes() <= 250);
    }

    #[test]
    fn pinned_entries_survive_any_budget() {
        let mut cache = ResourceCache::new(CacheLimits {
            max_bytes: 50,
            max_entries: 1,
        });
        let a = acquire(&mut cache, "a", 100);
        let b = acquire(&mut cache, "b", 100);
        // Both over byte and count budget, but both are referenced.
        assert!(cache.peek(a).is_some());
        assert!(cache.peek(b).is_some());
        assert_eq!(cache.resident_count(), 2);
    }

    #[test]
    fn replace_updates_byte_accounting() {
        let mut cache = ResourceCache::default();
        let a = acquire(&mut cache, "a", 10);
        assert!(cache.replace(&"a", 7u32, 90));
        assert_eq!(cache.resident_bytes(), 90);
        assert_eq!(cache.peek(a), Some(&7));
        assert_eq!(cache.refs(a), 1);
    }

    #[test]
    fn stale_handle_returns_none_after_eviction() {
        let mut cache = ResourceCache::new(CacheLimits {
            max_bytes: 100,
            max_entries: usize::MAX,
        });
        let a = acquire(&mut cache, "a", 80);
        cache.release(a);
        let _b = acquire(&mut cache, "b", 80);
        assert!(cache.get(a).is_none());
    }
}
