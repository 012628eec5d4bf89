// Core domain types shared across the Atelier crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A workspace: a sandboxed directory tree backed by its own git repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Workspace {
    /// The slug identifying the workspace (also its directory name).
    pub id: String,
    /// Absolute path of the workspace root.
    pub path: String,
}

/// One commit in a workspace's history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub commit: String,
    pub author: String,
    /// RFC 3339 commit date.
    pub date: String,
    pub message: String,
}

/// Normalized change-notification type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventType {
    #[serde(rename = "file.created")]
    FileCreated,
    #[serde(rename = "file.updated")]
    FileUpdated,
    #[serde(rename = "file.deleted")]
    FileDeleted,
    #[serde(rename = "file.moved")]
    FileMoved,
    #[serde(rename = "dir.created")]
    DirCreated,
    #[serde(rename = "dir.deleted")]
    DirDeleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::FileCreated => "file.created",
            EventType::FileUpdated => "file.updated",
            EventType::FileDeleted => "file.deleted",
            EventType::FileMoved => "file.moved",
            EventType::DirCreated => "dir.created",
            EventType::DirDeleted => "dir.deleted",
        }
    }
}

/// Who caused an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    /// REST API caller.
    Api,
    /// Filesystem watcher (change made outside the managed API).
    Fswatch,
    /// Interactive user.
    User,
}

/// Identifies the source of an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub kind: ActorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Actor {
    pub fn api() -> Self {
        Actor { kind: ActorKind::Api, id: None, display: None }
    }

    pub fn fswatch() -> Self {
        Actor { kind: ActorKind::Fswatch, id: None, display: None }
    }
}

/// The normalized change notification delivered to subscribers.
///
/// `id` is assigned by the event hub: monotonically increasing and unique
/// within a workspace (not globally).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceEvent {
    #[serde(default)]
    pub id: u64,
    /// RFC 3339 timestamp, filled by the hub if empty.
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub workspace_id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Workspace-relative path.
    pub path: String,
    /// Previous path for moves/renames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_path: Option<String>,
    pub is_dir: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// RFC 3339 mtime, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<Actor>,
    /// Workspace HEAD after the mutation, for API-originated events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl WorkspaceEvent {
    /// A bare event with only the fields every publisher must supply.
    /// The hub assigns `id`, `ts` and `workspace_id` on publish.
    pub fn new(event_type: EventType, path: impl Into<String>, is_dir: bool) -> Self {
        WorkspaceEvent {
            id: 0,
            ts: String::new(),
            workspace_id: String::new(),
            event_type,
            path: path.into(),
            prev_path: None,
            is_dir,
            size: None,
            mtime: None,
            actor: None,
            commit: None,
            correlation_id: None,
        }
    }

    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_prev_path(mut self, prev: impl Into<String>) -> Self {
        self.prev_path = Some(prev.into());
        self
    }
}

/// Current time as the RFC 3339 string used on the wire.
pub fn now_rfc3339() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
