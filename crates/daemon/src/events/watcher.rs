// Filesystem watcher: raw OS notifications → classify → debounce → hub.
//
// Watches the workspaces root plus each top-level workspace directory
// (non-recursively), adding watches for newly observed directories on a
// best-effort basis. Changes made through the managed API are also seen here;
// consumers tell them apart by the `fswatch` actor on watcher-originated
// events.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use atelier_common::path::is_protected_name;
use atelier_common::types::{Actor, EventType, WorkspaceEvent};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use super::debounce::{DebounceConfig, Debouncer, PendingChange};
use super::hub::EventHub;

/// Capacity for the raw event channel between the notify callback and the
/// consumer task.
const EVENT_CHANNEL_CAPACITY: usize = 512;

/// How often the sweep flushes debounced changes.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Simplified change kind extracted from a raw OS notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Created,
    Modified,
    Removed,
}

/// A raw observation for a single path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    pub kind: RawKind,
    pub path: PathBuf,
}

/// Running watcher. Stopping (or dropping) the handle terminates the
/// background task and releases the OS watches.
pub struct WatcherHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// Signal shutdown and wait for the background task to finish.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Start watching `root` for changes and publish normalized events into `hub`.
pub fn start(
    root: &Path,
    hub: EventHub,
    debounce: DebounceConfig,
    sweep_interval: Duration,
) -> Result<WatcherHandle> {
    let root = root
        .canonicalize()
        .with_context(|| format!("failed to canonicalize watch root: {}", root.display()))?;

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for raw in translate_event(&event) {
                if tx.blocking_send(raw).is_err() {
                    // Receiver dropped; the watcher is shutting down.
                    debug!("raw event channel closed, stopping dispatch");
                    return;
                }
            }
        }
        Err(e) => {
            // Watch errors are logged, never propagated; the affected watch
            // is not retried.
            error!(error = %e, "filesystem watcher error");
        }
    })
    .context("failed to create filesystem watcher")?;

    let mut watched: HashSet<PathBuf> = HashSet::new();
    ensure_watched(&mut watcher, &mut watched, &root);
    if let Ok(entries) = std::fs::read_dir(&root) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                ensure_watched(&mut watcher, &mut watched, &path);
            }
        }
    }

    debug!(root = %root.display(), watches = watched.len(), "filesystem watcher started");

    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
    let task = tokio::spawn(consume_events(
        watcher,
        watched,
        root,
        rx,
        hub,
        Debouncer::new(debounce),
        sweep_interval,
        shutdown_rx,
    ));

    Ok(WatcherHandle { shutdown_tx, task: Some(task) })
}

#[allow(clippy::too_many_arguments)]
async fn consume_events(
    mut watcher: RecommendedWatcher,
    mut watched: HashSet<PathBuf>,
    root: PathBuf,
    mut rx: mpsc::Receiver<RawChange>,
    hub: EventHub,
    mut debouncer: Debouncer,
    sweep_interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut sweep = tokio::time::interval(sweep_interval);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            raw = rx.recv() => {
                let Some(raw) = raw else { break };
                handle_raw(&mut watcher, &mut watched, &root, raw, &mut debouncer);
            }
            _ = sweep.tick() => {
                for change in debouncer.drain_ready() {
                    publish_change(&hub, change);
                }
            }
            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }

    // Dropping the watcher here releases the OS watch handles.
    drop(watcher);
    debug!("filesystem watcher stopped");
}

fn handle_raw(
    watcher: &mut RecommendedWatcher,
    watched: &mut HashSet<PathBuf>,
    root: &Path,
    raw: RawChange,
    debouncer: &mut Debouncer,
) {
    // Newly created directories get a watch of their own (best-effort; deeply
    // nested directories are only picked up when their creation is observed).
    if raw.kind == RawKind::Created && raw.path.is_dir() {
        ensure_watched(watcher, watched, &raw.path);
    }

    let Some((workspace_id, rel_path)) = split_path(root, &raw.path) else {
        // Outside any workspace subtree, or the workspace directory itself.
        return;
    };

    // Version-control internals are never surfaced.
    if rel_path.rsplit('/').next().map(is_protected_name).unwrap_or(false) {
        return;
    }

    let Some((event_type, is_dir)) = classify(&raw) else {
        trace!(path = %raw.path.display(), "ignoring unclassifiable raw event");
        return;
    };

    debouncer.record(PendingChange { workspace_id, path: rel_path, event_type, is_dir });
}

fn publish_change(hub: &EventHub, change: PendingChange) {
    let event = WorkspaceEvent::new(change.event_type, change.path, change.is_dir)
        .with_actor(Actor::fswatch());
    hub.publish(&change.workspace_id, event);
}

/// Idempotently add a non-recursive watch; failure is logged, not fatal.
fn ensure_watched(watcher: &mut RecommendedWatcher, watched: &mut HashSet<PathBuf>, dir: &Path) {
    if watched.contains(dir) {
        return;
    }
    match watcher.watch(dir, RecursiveMode::NonRecursive) {
        Ok(()) => {
            watched.insert(dir.to_path_buf());
            debug!(dir = %dir.display(), "watching directory");
        }
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "failed to add watch");
        }
    }
}

/// Translate a `notify::Event` into zero or more raw changes.
///
/// Renames are not correlated: the old name surfaces as a removal and the new
/// name, when present, as a creation.
pub fn translate_event(event: &Event) -> Vec<RawChange> {
    use notify::event::{ModifyKind, RenameMode};

    let kinds: Vec<RawKind> = match &event.kind {
        EventKind::Create(_) => vec![RawKind::Created; event.paths.len()],
        EventKind::Remove(_) => vec![RawKind::Removed; event.paths.len()],
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => vec![RawKind::Removed; event.paths.len()],
            RenameMode::To => vec![RawKind::Created; event.paths.len()],
            // Both: [from, to] in path order.
            _ if event.paths.len() == 2 => vec![RawKind::Removed, RawKind::Created],
            _ => vec![RawKind::Removed; event.paths.len()],
        },
        // Data, metadata (permissions) and unknown modifications all surface
        // as updates.
        EventKind::Modify(_) => vec![RawKind::Modified; event.paths.len()],
        // Access, Other and Any are not actionable.
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .zip(kinds)
        .map(|(path, kind)| RawChange { kind, path: path.clone() })
        .collect()
}

/// Map an absolute changed path to `(workspace_id, workspace-relative path)`.
///
/// Returns `None` for paths outside the root and for the workspace directory
/// itself (empty relative path).
pub fn split_path(root: &Path, abs: &Path) -> Option<(String, String)> {
    let rel = abs.strip_prefix(root).ok()?;
    let mut components = rel.iter();
    let workspace_id = components.next()?.to_string_lossy().into_owned();
    let rel_path = components
        .map(|c| c.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    if rel_path.is_empty() {
        return None;
    }
    Some((workspace_id, rel_path))
}

/// Classify a raw change into an event type, statting for directory-ness at
/// classification time (a removed path can no longer be statted and is
/// reported as a file).
fn classify(raw: &RawChange) -> Option<(EventType, bool)> {
    let is_dir = std::fs::metadata(&raw.path).map(|m| m.is_dir()).unwrap_or(false);
    match raw.kind {
        RawKind::Created => {
            Some(if is_dir { (EventType::DirCreated, true) } else { (EventType::FileCreated, false) })
        }
        RawKind::Removed => {
            Some(if is_dir { (EventType::DirDeleted, true) } else { (EventType::FileDeleted, false) })
        }
        RawKind::Modified => {
            // Directory content modifications are reported via their children.
            if is_dir {
                None
            } else {
                Some((EventType::FileUpdated, false))
            }
        }
    }
}
