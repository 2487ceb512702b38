/*!
De-duplication state for alerts
*/

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::core::detection_engine::Severity;

/// Identity of an alert for suppression purposes.
///
/// Channel and signal power are not part of the key, so changing readings from
/// the same access point stay suppressed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub severity: Severity,
    /// Matched vendor prefix, empty when the prefix did not hit
    pub prefix: String,
    pub name: String,
}

/// Last emission time per [`DedupKey`], kept for the whole run.
///
/// Entries are only ever overwritten, never evicted. Owned by one poll loop; a
/// parallel evaluator would have to guard [`SuppressionState::should_emit`] as a
/// single critical section per key.
#[derive(Debug, Clone)]
pub struct SuppressionState {
    window: Duration,
    last_emitted: HashMap<DedupKey, DateTime<Utc>>,
}

impl SuppressionState {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_emitted: HashMap::new(),
        }
    }

    /// Decide whether an alert with `key` may surface at `now`, recording it if so.
    pub fn should_emit(&mut self, key: DedupKey, now: DateTime<Utc>) -> bool {
        if let Some(previous) = self.last_emitted.get(&key) {
            // A clock that stepped backwards counts as no time elapsed
            let elapsed = (now - *previous).to_std().unwrap_or_default();
            if elapsed < self.window {
                debug!("Suppressing {:?} ({}s since last alert)", key, elapsed.as_secs());
                return false;
            }
        }
        self.last_emitted.insert(key, now);
        true
    }

    /// Number of distinct keys seen so far
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.last_emitted.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.last_emitted.is_empty()
    }
}
