//! Per-key fetch throttling.
//!
//! Every throttled fetch in the stores goes through [`evaluate`], either
//! directly or via [`ThrottleWindow::try_acquire`]. Forcing a refresh writes
//! 0 for the key with [`ThrottleWindow::force`] and then runs the same check;
//! there is no bypass flag.

use std::collections::HashMap;
use std::hash::Hash;

/// What a guarded store fetch did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The network call ran and its result was applied.
    Fetched,
    /// Skipped: the key was fetched within its window.
    Throttled,
    /// Skipped: another fetch of the same store is in flight.
    Busy,
    /// The network call ran and failed; see the store's `last_error`.
    Failed,
}

/// Outcome of a throttle check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleDecision<K: Eq + Hash> {
    /// Whether the guarded fetch may run.
    pub proceed: bool,
    /// The timestamp map after the check. When `proceed` is true the key is
    /// stamped with `now_ms`, so an overlapping call for the same key is
    /// coalesced into this one.
    pub updated: HashMap<K, u64>,
}

/// Decide whether a fetch for `key` may run at `now_ms`.
///
/// A fetch is skipped when `now_ms - last_fetch[key] < min_interval_ms`. A
/// missing key counts as 0.
#[must_use]
pub fn evaluate<K>(
    key: &K,
    now_ms: u64,
    last_fetch: &HashMap<K, u64>,
    min_interval_ms: u64,
) -> ThrottleDecision<K>
where
    K: Eq + Hash + Clone,
{
    let last = last_fetch.get(key).copied().unwrap_or(0);
    let proceed = now_ms.saturating_sub(last) >= min_interval_ms;

    let mut updated = last_fetch.clone();
    if proceed {
        updated.insert(key.clone(), now_ms);
    }

    ThrottleDecision { proceed, updated }
}

/// Last-fetch timestamps for a set of keys sharing one minimum interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleWindow<K: Eq + Hash> {
    last_fetch: HashMap<K, u64>,
    min_interval_ms: u64,
}

impl<K> ThrottleWindow<K>
where
    K: Eq + Hash + Clone,
{
    #[must_use]
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            last_fetch: HashMap::new(),
            min_interval_ms,
        }
    }

    #[must_use]
    pub fn min_interval_ms(&self) -> u64 {
        self.min_interval_ms
    }

    /// Run the throttle check for `key` and keep the updated map.
    pub fn try_acquire(&mut self, key: &K, now_ms: u64) -> bool {
        let decision = evaluate(key, now_ms, &self.last_fetch, self.min_interval_ms);
        self.last_fetch = decision.updated;
        decision.proceed
    }

    /// Reset `key` to 0 so the next check proceeds.
    pub fn force(&mut self, key: &K) {
        self.last_fetch.insert(key.clone(), 0);
    }

    /// Reset every key seen so far.
    pub fn force_all(&mut self) {
        for stamp in self.last_fetch.values_mut() {
            *stamp = 0;
        }
    }

    /// Overwrite the stamp for `key`, e.g. with the time a response landed.
    pub fn record(&mut self, key: &K, now_ms: u64) {
        self.last_fetch.insert(key.clone(), now_ms);
    }

    /// Stamp `key` with the time a response landed, but only if it still
    /// holds `started`, the stamp `try_acquire` wrote when the fetch began.
    ///
    /// Returns `false` when the key was forced (or re-acquired) while the
    /// fetch was in flight. The key is then left alone, so the next check
    /// refetches instead of serving the older response for a full window.
    pub fn settle(&mut self, key: &K, started: u64, landed: u64) -> bool {
        if self.last_fetch(key) != started {
            return false;
        }
        self.record(key, landed);
        true
    }

    /// Last-fetch timestamp for `key`, 0 if never fetched or forced.
    #[must_use]
    pub fn last_fetch(&self, key: &K) -> u64 {
        self.last_fetch.get(key).copied().unwrap_or(0)
    }
}
