//! Thread-local cache of sticky-compiled regex patterns
//!
//! Patterns are compiled once per thread and reused across parses. Every
//! pattern is compiled in sticky form: wrapped as `\A(?s:pattern)` so it
//! matches only at the start of the haystack slice it is handed, never
//! scanning forward. The `(?s)` group gives dot-matches-newline; Unicode
//! matching is the `regex` crate default. Together these are the Rust
//! rendition of the JavaScript `suy` flag set used by compiled artifacts.
//!
//! The cache key is the raw pattern source, not the wrapped form.
//!
//! # Cache statistics
//!
//! ```
//! use pegcore::regex_cache::{clear_cache, get_or_compile, stats};
//!
//! clear_cache();
//! let _ = get_or_compile("[0-9]+"); // miss (compile)
//! let _ = get_or_compile("[0-9]+"); // hit (cached)
//! let s = stats();
//! assert_eq!(s.hits, 1);
//! assert_eq!(s.misses, 1);
//! ```

use hashbrown::HashMap;
use regex::Regex;
use std::cell::RefCell;

/// Cache statistics for monitoring
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: usize,
    /// Number of cache misses (compilations)
    pub misses: usize,
    /// Number of patterns currently cached
    pub size: usize,
}

thread_local! {
    static STICKY_CACHE: RefCell<HashMap<String, Regex>> = RefCell::new(HashMap::new());

    static CACHE_STATS: RefCell<CacheStats> =
        const { RefCell::new(CacheStats { hits: 0, misses: 0, size: 0 }) };
}

/// Get or compile a pattern in sticky form.
///
/// Returns `None` if the pattern is not a valid regex. Invalid patterns
/// are not cached; every lookup re-attempts compilation and counts as a
/// miss.
#[inline]
pub fn get_or_compile(pattern: &str) -> Option<Regex> {
    STICKY_CACHE.with(|cache| {
        if let Some(regex) = cache.borrow().get(pattern) {
            CACHE_STATS.with(|stats| {
                stats.borrow_mut().hits += 1;
            });
            return Some(regex.clone());
        }

        let compiled = Regex::new(&format!(r"\A(?s:{})", pattern));
        CACHE_STATS.with(|stats| {
            stats.borrow_mut().misses += 1;
        });

        match compiled {
            Ok(regex) => {
                cache
                    .borrow_mut()
                    .insert(pattern.to_owned(), regex.clone());
                CACHE_STATS.with(|stats| {
                    stats.borrow_mut().size = cache.borrow().len();
                });
                Some(regex)
            }
            Err(_) => None,
        }
    })
}

/// Clear the cache and reset statistics.
pub fn clear_cache() {
    STICKY_CACHE.with(|cache| cache.borrow_mut().clear());
    CACHE_STATS.with(|stats| {
        *stats.borrow_mut() = CacheStats::default();
    });
}

/// Number of patterns cached on the current thread.
pub fn cache_size() -> usize {
    STICKY_CACHE.with(|cache| cache.borrow().len())
}

/// Hit/miss counts and current size for the current thread.
pub fn stats() -> CacheStats {
    CACHE_STATS.with(|stats| {
        let mut s = *stats.borrow();
        s.size = cache_size();
        s
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_compilation() {
        clear_cache();

        let r1 = get_or_compile("[0-9]+");
        assert!(r1.is_some());
        assert_eq!(cache_size(), 1);

        let r2 = get_or_compile("[0-9]+");
        assert!(r2.is_some());
        assert_eq!(cache_size(), 1);

        let r3 = get_or_compile("[a-z]+");
        assert!(r3.is_some());
        assert_eq!(cache_size(), 2);
    }

    #[test]
    fn test_invalid_pattern() {
        clear_cache();

        assert!(get_or_compile("[invalid").is_none());
        assert_eq!(cache_size(), 0);
    }

    #[test]
    fn test_sticky_matching() {
        clear_cache();

        let r = get_or_compile("[a-z]+").unwrap();

        // Anchored at the start of the haystack slice
        let m = r.find("hello rest").unwrap();
        assert_eq!(m.start(), 0);
        assert_eq!(m.as_str(), "hello");

        // Never scans forward
        assert!(r.find("123abc").is_none());
    }

    #[test]
    fn test_dot_matches_newline() {
        clear_cache();

        let r = get_or_compile(".+").unwrap();
        let m = r.find("a\nb").unwrap();
        assert_eq!(m.as_str(), "a\nb");
    }

    #[test]
    fn test_stats() {
        clear_cache();

        let s = stats();
        assert_eq!(s.hits, 0);
        assert_eq!(s.misses, 0);

        let _ = get_or_compile("[0-9]+");
        let _ = get_or_compile("[0-9]+");
        let s = stats();
        assert_eq!(s.hits, 1);
        assert_eq!(s.misses, 1);
        assert_eq!(s.size, 1);
    }
}
