//! The evaluation context and its bounded string cache.
//!
//! Short strings produced during evaluation (concatenation, template
//! binders) are interned so repeated values share one allocation. The
//! cache is owned by the [`EvalCtx`] that threads through `eval` -- it is
//! not module-global state -- and it is bounded: once full, the oldest
//! entry is evicted first-in-first-out.

use std::collections::VecDeque;
use std::rc::Rc;

use rustc_hash::FxHashMap;

/// Strings longer than this bypass the cache entirely.
const SHORT_STR_LIMIT: usize = 64;

/// Default number of cached strings.
const DEFAULT_CAPACITY: usize = 512;

/// A bounded FIFO-evicting intern table for short strings.
#[derive(Debug)]
pub struct StrCache {
    capacity: usize,
    map: FxHashMap<String, Rc<str>>,
    queue: VecDeque<String>,
}

impl StrCache {
    pub fn new(capacity: usize) -> Self {
        StrCache {
            capacity: capacity.max(1),
            map: FxHashMap::default(),
            queue: VecDeque::new(),
        }
    }

    /// Return a shared copy of `s`, inserting it if absent. Long strings
    /// are allocated fresh and never cached.
    pub fn intern(&mut self, s: &str) -> Rc<str> {
        if s.len() > SHORT_STR_LIMIT {
            return Rc::from(s);
        }
        if let Some(cached) = self.map.get(s) {
            return Rc::clone(cached);
        }
        if self.queue.len() >= self.capacity {
            if let Some(oldest) = self.queue.pop_front() {
                self.map.remove(&oldest);
            }
        }
        let shared: Rc<str> = Rc::from(s);
        self.map.insert(s.to_string(), Rc::clone(&shared));
        self.queue.push_back(s.to_string());
        shared
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for StrCache {
    fn default() -> Self {
        StrCache::new(DEFAULT_CAPACITY)
    }
}

/// Mutable state owned by one evaluation run.
#[derive(Debug, Default)]
pub struct EvalCtx {
    pub strings: StrCache,
}

impl EvalCtx {
    pub fn new() -> Self {
        EvalCtx::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interned_strings_are_shared() {
        let mut cache = StrCache::new(8);
        let a = cache.intern("hello");
        let b = cache.intern("hello");
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn eviction_is_fifo() {
        let mut cache = StrCache::new(2);
        let first = cache.intern("a");
        cache.intern("b");
        cache.intern("c"); // evicts "a"
        assert_eq!(cache.len(), 2);
        let again = cache.intern("a"); // re-inserted, new allocation
        assert!(!Rc::ptr_eq(&first, &again));
    }

    #[test]
    fn long_strings_bypass_the_cache() {
        let mut cache = StrCache::new(8);
        let long = "x".repeat(SHORT_STR_LIMIT + 1);
        let a = cache.intern(&long);
        let b = cache.intern(&long);
        assert!(!Rc::ptr_eq(&a, &b));
        assert!(cache.is_empty());
    }
}
