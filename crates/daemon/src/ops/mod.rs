// Operation layer: every externally reachable action on a workspace.
//
// Each operation validates input, resolves paths through the sandbox,
// applies the change, commits it, and publishes exactly one event carrying
// the resulting commit. Reads commit nothing and publish nothing.

pub mod fs;
pub mod history;

use atelier_common::error::{OpError, OpResult};
use atelier_common::types::{Actor, Workspace, WorkspaceEvent};
use sha2::{Digest, Sha256};

use crate::events::EventHub;
use crate::workspace::Manager;

/// Author recorded on commits made on behalf of API callers.
pub const API_AUTHOR: &str = "api-client";

/// Shared handle the transport layer dispatches into.
#[derive(Clone)]
pub struct Ops {
    manager: Manager,
    hub: EventHub,
}

impl Ops {
    pub fn new(manager: Manager, hub: EventHub) -> Self {
        Self { manager, hub }
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Create a workspace from a display name.
    pub fn create_workspace(&self, name: &str) -> OpResult<Workspace> {
        if name.trim().is_empty() {
            return Err(OpError::invalid_input("'name' is required"));
        }
        let (id, path) = self.manager.create(name)?;
        Ok(Workspace { id, path: path.to_string_lossy().into_owned() })
    }

    pub fn list_workspaces(&self) -> OpResult<Vec<Workspace>> {
        self.manager.list()
    }

    /// Publish a mutation event attributed to the API caller.
    fn publish(&self, workspace_id: &str, event: WorkspaceEvent) {
        self.hub.publish(workspace_id, event.with_actor(Actor::api()));
    }
}

/// Hex-encoded SHA-256 of file content, used as the optimistic-concurrency
/// etag.
pub fn content_etag(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
