//! Per-request caching policy
//!
//! The empty set is the default: a cached result is returned instead of making a
//! request; otherwise a request is made and its result cached.

use std::ops::{BitOr, BitOrAssign};

/// Bitset of caching flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CacheOptions(u8);

impl CacheOptions {
    /// Do not cache the result of this request, if one is made.
    pub const DO_NOT_CACHE_RESULT: CacheOptions = CacheOptions(1 << 0);
    /// Remove the cached value for this request.
    pub const REMOVE_EXISTING_CACHE: CacheOptions = CacheOptions(1 << 1);
    /// Ignore a cached result and make a request.
    pub const DO_NOT_RETURN_CACHED_RESULT: CacheOptions = CacheOptions(1 << 2);
    /// Return a cached result, then make a request anyway and return its result if it differs.
    pub const REQUEST_EVEN_IF_CACHED: CacheOptions = CacheOptions(1 << 3);

    /// No caching at all, and drop whatever is cached for this request
    pub const DISABLE_CACHE: CacheOptions = CacheOptions(
        Self::DO_NOT_CACHE_RESULT.0 | Self::REMOVE_EXISTING_CACHE.0 | Self::DO_NOT_RETURN_CACHED_RESULT.0,
    );
    /// Skip the cache for this request but leave it untouched
    pub const IGNORE_CACHE: CacheOptions =
        CacheOptions(Self::DO_NOT_CACHE_RESULT.0 | Self::DO_NOT_RETURN_CACHED_RESULT.0);

    pub const fn empty() -> Self {
        CacheOptions(0)
    }

    pub const fn contains(&self, other: CacheOptions) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: CacheOptions) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: CacheOptions) {
        self.0 &= !other.0;
    }

    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Fetched values go into the cache
    pub(crate) fn stores_result(&self) -> bool {
        !self.contains(Self::DO_NOT_CACHE_RESULT) && !self.contains(Self::REMOVE_EXISTING_CACHE)
    }
}

impl BitOr for CacheOptions {
    type Output = CacheOptions;

    fn bitor(self, rhs: CacheOptions) -> CacheOptions {
        CacheOptions(self.0 | rhs.0)
    }
}

impl BitOrAssign for CacheOptions {
    fn bitor_assign(&mut self, rhs: CacheOptions) {
        self.0 |= rhs.0;
    }
}
