// Workspace lifecycle and the path sandbox.
//
// The manager is the sole authority for creating and enumerating workspaces;
// every other component resolves paths through it. The repository inside each
// workspace belongs to the version store and is never touched directly here
// beyond the existence probe.

use std::path::{Path, PathBuf};

use atelier_common::error::{OpError, OpResult};
use atelier_common::path::{clean_relative, PathError, KEEP_FILE};
use atelier_common::slug::slugify;
use atelier_common::types::Workspace;
use chrono::Utc;
use tracing::{info, warn};

use crate::store::{is_repo, GitStore};

/// Author recorded on workspace-creation commits.
const SYSTEM_AUTHOR: &str = "system";

/// Owns the workspaces root directory and all workspace lifecycle operations.
#[derive(Debug, Clone)]
pub struct Manager {
    root: PathBuf,
}

impl Manager {
    /// Create a manager rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> OpResult<Self> {
        let root = root.into();
        if root.as_os_str().is_empty() {
            return Err(OpError::invalid_input("workspaces root path cannot be empty"));
        }
        std::fs::create_dir_all(&root)
            .map_err(|e| OpError::internal(format!("failed to create workspaces root: {e}")))?;
        let root = root
            .canonicalize()
            .map_err(|e| OpError::internal(format!("failed to canonicalize workspaces root: {e}")))?;
        Ok(Self { root })
    }

    /// Absolute root directory under which every workspace lives.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a new workspace from a human-readable name.
    ///
    /// Returns the slug and the absolute workspace path. When the slug is
    /// already taken, a timestamp suffix disambiguates it. The initial commit
    /// is best-effort: failure is logged but the workspace still exists.
    pub fn create(&self, name: &str) -> OpResult<(String, PathBuf)> {
        let mut slug = slugify(name);
        if slug.is_empty() {
            return Err(OpError::invalid_input("name does not produce a usable slug"));
        }

        let mut path = self.root.join(&slug);
        if path.exists() {
            warn!(slug = %slug, "workspace slug already exists, disambiguating");
            slug = format!("{slug}-{}", Utc::now().format("%Y%m%d%H%M%S"));
            path = self.root.join(&slug);
        }

        std::fs::create_dir_all(&path)
            .map_err(|e| OpError::internal(format!("failed to create workspace directory: {e}")))?;

        let store = GitStore::new(&path);
        store.init()?;

        // Placeholder so the otherwise-empty tree has something to commit.
        std::fs::write(path.join(KEEP_FILE), b"")
            .map_err(|e| OpError::internal(format!("failed to create {KEEP_FILE}: {e}")))?;

        info!(workspace_id = %slug, path = %path.display(), "created workspace");

        if let Err(error) = store.commit_all("Initial commit", SYSTEM_AUTHOR) {
            // Non-fatal: the workspace is usable without its initial commit.
            warn!(workspace_id = %slug, error = %error, "initial commit failed");
        }

        Ok((slug, path))
    }

    /// Enumerate workspaces: immediate subdirectories of the root containing
    /// an initialized repository. Anything else is silently excluded.
    pub fn list(&self) -> OpResult<Vec<Workspace>> {
        let entries = std::fs::read_dir(&self.root)
            .map_err(|e| OpError::internal(format!("failed to read workspaces root: {e}")))?;

        let mut workspaces = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() && is_repo(&path) {
                workspaces.push(Workspace {
                    id: entry.file_name().to_string_lossy().into_owned(),
                    path: path.to_string_lossy().into_owned(),
                });
            }
        }
        workspaces.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(workspaces)
    }

    /// Absolute root of one workspace, verifying it exists.
    pub fn workspace_root(&self, workspace_id: &str) -> OpResult<PathBuf> {
        validate_workspace_id(workspace_id)?;
        let root = self.root.join(workspace_id);
        if !root.is_dir() {
            return Err(OpError::not_found(format!("workspace '{workspace_id}' not found")));
        }
        Ok(root)
    }

    /// Resolve a workspace-relative path to an absolute path inside the
    /// workspace, rejecting escapes.
    pub fn resolve(&self, workspace_id: &str, relative: &str) -> OpResult<PathBuf> {
        let workspace_root = self.workspace_root(workspace_id)?;

        let cleaned = clean_relative(relative).map_err(|e| match e {
            PathError::Absolute | PathError::NullByte => OpError::InvalidInput(e.to_string()),
            PathError::Escapes => OpError::OutOfBounds(e.to_string()),
        })?;

        let abs = if cleaned.is_empty() { workspace_root.clone() } else { workspace_root.join(&cleaned) };

        // Defense in depth: the lexical cleaner already rejects traversal,
        // but the joined result must still sit under the workspace root.
        if !abs.starts_with(&workspace_root) {
            return Err(OpError::OutOfBounds("path escapes workspace boundaries".into()));
        }
        Ok(abs)
    }

    /// Version store scoped to one workspace.
    pub fn store(&self, workspace_id: &str) -> OpResult<GitStore> {
        let root = self.workspace_root(workspace_id)?;
        Ok(GitStore::new(root))
    }
}

fn validate_workspace_id(workspace_id: &str) -> OpResult<()> {
    if workspace_id.is_empty() {
        return Err(OpError::invalid_input("'workspaceId' is required"));
    }
    let single_clean_segment = !workspace_id.contains('/')
        && !workspace_id.contains('\\')
        && workspace_id != "."
        && workspace_id != "..";
    if !single_clean_segment {
        return Err(OpError::invalid_input("invalid workspace id"));
    }
    Ok(())
}
