//! Store configuration.

use std::fmt;

/// How a store reaches its data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StoreMode {
    /// Every operation goes straight to the remote.
    Network,
    /// Every operation works on the local cache; the remote is only
    /// touched by push, pull and sync.
    Sync,
    /// Remote first, cache when the remote is unreachable.
    #[default]
    Auto,
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreMode::Network => "network",
            StoreMode::Sync => "sync",
            StoreMode::Auto => "auto",
        };
        f.write_str(name)
    }
}

/// Configuration of one collection handle.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Access mode.
    pub mode: StoreMode,
    /// Pull only what changed since the last pull of the same query.
    pub delta_set_fetching: bool,
    /// AUTO reads write the remote result back into the cache.
    pub refresh_cache_on_read: bool,
}

impl StoreConfig {
    /// Creates a configuration for `mode`.
    pub fn new(mode: StoreMode) -> Self {
        Self {
            mode,
            delta_set_fetching: false,
            refresh_cache_on_read: true,
        }
    }

    /// NETWORK store.
    pub fn network() -> Self {
        Self::new(StoreMode::Network)
    }

    /// SYNC store.
    pub fn sync() -> Self {
        Self::new(StoreMode::Sync)
    }

    /// AUTO store.
    pub fn auto() -> Self {
        Self::new(StoreMode::Auto)
    }

    /// Enables or disables delta-set fetching.
    pub fn with_delta_set_fetching(mut self, enabled: bool) -> Self {
        self.delta_set_fetching = enabled;
        self
    }

    /// Enables or disables cache refresh on AUTO reads.
    pub fn with_cache_refresh(mut self, enabled: bool) -> Self {
        self.refresh_cache_on_read = enabled;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(StoreMode::default())
    }
}
