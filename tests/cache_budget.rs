//! Budget scenarios for the resource cache, driven through its public API
//! the way the renderer drives it: acquire on use, release on unload,
//! replace when an async decode lands.

use std::convert::Infallible;

use radiance::renderer::{CacheLimits, ResourceCache};

const MB: u64 = 1024 * 1024;

type Cache = ResourceCache<&'static str, u32>;

fn acquire(cache: &mut Cache, key: &'static str, bytes: u64) -> radiance::renderer::Handle<u32> {
    cache
        .acquire_with(key, || Ok::<_, Infallible>((0, bytes)))
        .unwrap()
}

#[test]
fn ten_megabytes_fit_a_five_megabyte_budget_while_referenced() {
    let mut cache = Cache::new(CacheLimits {
        max_bytes: 5 * MB,
        max_entries: usize::MAX,
    });

    let big = acquire(&mut cache, "hero_texture", 10 * MB);
    // A live resource is never unmapped; the soft limit is simply exceeded.
    assert!(cache.peek(big).is_some());
    assert_eq!(cache.resident_bytes(), 10 * MB);

    // Once the last reference is gone, budget pressure flushes it.
    cache.release(big);
    assert!(cache.peek(big).is_none());
    assert_eq!(cache.resident_bytes(), 0);
}

#[test]
fn releasing_references_lets_the_cache_shrink_back_under_budget() {
    let mut cache = Cache::new(CacheLimits {
        max_bytes: 5 * MB,
        max_entries: usize::MAX,
    });

    let a = acquire(&mut cache, "a", 3 * MB);
    let b = acquire(&mut cache, "b", 3 * MB);
    let c = acquire(&mut cache, "c", 3 * MB);
    assert_eq!(cache.resident_bytes(), 9 * MB);

    // Dropping a reference re-checks the budget right away. After the first
    // release the cache still holds 6 MB against a 5 MB budget, so the
    // second released entry is flushed too; only the pinned entry stays.
    cache.release(a);
    assert!(cache.peek(a).is_none());
    cache.release(b);
    assert!(cache.peek(b).is_none());
    assert!(cache.peek(c).is_some());
    assert_eq!(cache.resident_bytes(), 3 * MB);
}

#[test]
fn eviction_prefers_the_least_recently_used_entry() {
    let mut cache = Cache::new(CacheLimits::default());
    let a = acquire(&mut cache, "a", MB);
    let b = acquire(&mut cache, "b", MB);
    let c = acquire(&mut cache, "c", MB);
    cache.release(a);
    cache.release(b);
    cache.release(c);

    // Touch a so b becomes the coldest entry.
    assert!(cache.get(a).is_some());

    cache.set_limits(CacheLimits {
        max_bytes: 2 * MB,
        max_entries: usize::MAX,
    });
    assert!(cache.peek(a).is_some());
    assert!(cache.peek(b).is_none());
    assert!(cache.peek(c).is_some());
}

#[test]
fn decode_hot_swap_keeps_the_handle_and_reference_count() {
    let mut cache = Cache::new(CacheLimits::default());
    // The loader first parks a tiny placeholder under the texture's key.
    let handle = acquire(&mut cache, "streamed", 4096);
    cache.retain(handle);
    assert_eq!(cache.refs(handle), 2);

    // The decoded payload replaces it in place.
    assert!(cache.replace(&"streamed", 42, 8 * MB));
    assert_eq!(cache.peek(handle), Some(&42));
    assert_eq!(cache.refs(handle), 2);
    assert_eq!(cache.resident_bytes(), 8 * MB);

    // Replacing an unknown key is a no-op.
    assert!(!cache.replace(&"missing", 0, 1));
}

#[test]
fn entry_count_budget_is_enforced_like_the_byte_budget() {
    let mut cache = Cache::new(CacheLimits {
        max_bytes: u64::MAX,
        max_entries: 2,
    });
    let a = acquire(&mut cache, "a", 1);
    cache.release(a);
    let _b = acquire(&mut cache, "b", 1);
    let _c = acquire(&mut cache, "c", 1);
    assert_eq!(cache.resident_count(), 2);
    assert!(cache.peek(a).is_none());
}
