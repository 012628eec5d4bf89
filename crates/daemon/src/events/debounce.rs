// Event coalescer for the filesystem watcher.
//
// Raw OS notifications arrive in bursts; repeated notifications for the same
// (workspace, path, type) within the debounce window collapse into a single
// publish. A periodic sweep flushes keys whose last-seen time has aged past
// the window.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use atelier_common::types::EventType;

/// Default debounce window.
const DEFAULT_DEBOUNCE_MS: u64 = 200;
/// Minimum allowed debounce window.
const MIN_DEBOUNCE_MS: u64 = 50;
/// Maximum allowed debounce window.
const MAX_DEBOUNCE_MS: u64 = 2_000;

/// A normalized watcher observation waiting out its debounce window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    pub workspace_id: String,
    pub path: String,
    pub event_type: EventType,
    pub is_dir: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ChangeKey {
    workspace_id: String,
    path: String,
    event_type: EventType,
}

struct PendingState {
    is_dir: bool,
    last_seen: Instant,
}

/// Configuration for the coalescer.
#[derive(Debug, Clone)]
pub struct DebounceConfig {
    pub window: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self { window: Duration::from_millis(DEFAULT_DEBOUNCE_MS) }
    }
}

impl DebounceConfig {
    /// Window in milliseconds, clamped to [50, 2000].
    pub fn with_millis(ms: u64) -> Self {
        let clamped = ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS);
        Self { window: Duration::from_millis(clamped) }
    }
}

/// Coalesces watcher observations per (workspace, path, type) key.
///
/// Call `record()` for each classified observation, then `drain_ready()`
/// from the sweep task to collect keys whose window has elapsed.
pub struct Debouncer {
    config: DebounceConfig,
    pending: HashMap<ChangeKey, PendingState>,
}

impl Debouncer {
    pub fn new(config: DebounceConfig) -> Self {
        Self { config, pending: HashMap::new() }
    }

    /// Record an observation; a repeat of the same key resets its timer.
    pub fn record(&mut self, change: PendingChange) {
        self.record_at(change, Instant::now());
    }

    fn record_at(&mut self, change: PendingChange, now: Instant) {
        let key = ChangeKey {
            workspace_id: change.workspace_id,
            path: change.path,
            event_type: change.event_type,
        };
        self.pending.insert(key, PendingState { is_dir: change.is_dir, last_seen: now });
    }

    /// Drain every key whose debounce window has elapsed.
    pub fn drain_ready(&mut self) -> Vec<PendingChange> {
        self.drain_ready_at(Instant::now())
    }

    fn drain_ready_at(&mut self, now: Instant) -> Vec<PendingChange> {
        let window = self.config.window;
        let mut ready = Vec::new();

        self.pending.retain(|key, state| {
            if now.duration_since(state.last_seen) >= window {
                ready.push(PendingChange {
                    workspace_id: key.workspace_id.clone(),
                    path: key.path.clone(),
                    event_type: key.event_type,
                    is_dir: state.is_dir,
                });
                false
            } else {
                true
            }
        });

        ready
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
