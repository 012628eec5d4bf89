// Filesystem operations. Mutations follow the same shape: validate, resolve
// through the sandbox, check preconditions, apply, commit, publish one event.
//
// Precondition protocol: `ifMatchFileEtag` compares against the SHA-256 of
// the file's current content, `ifMatchWorkspaceHead` against the repository
// HEAD. Either mismatch is a CONFLICT. A write or edit whose result equals
// the current content short-circuits: nothing written, no commit, no event.

use std::path::Path;

use atelier_common::error::{OpError, OpResult};
use atelier_common::path::{is_protected_name, is_protected_path, KEEP_FILE};
use atelier_common::types::{EventType, WorkspaceEvent};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use tracing::warn;
use walkdir::WalkDir;

use super::{content_etag, Ops, API_AUTHOR};

/// Largest file `read_media_file` will load.
const MAX_MEDIA_BYTES: usize = 10 * 1024 * 1024;

// ── Requests / responses ───────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteFileRequest {
    pub workspace_id: String,
    pub path: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub if_match_file_etag: Option<String>,
    #[serde(default)]
    pub if_match_workspace_head: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WriteFileResponse {
    pub path: String,
    pub bytes_written: usize,
    pub overwritten: bool,
    pub commit: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadTextFileRequest {
    pub workspace_id: String,
    pub path: String,
    #[serde(default)]
    pub head: Option<usize>,
    #[serde(default)]
    pub tail: Option<usize>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadTextFileResponse {
    pub content: String,
    pub total_lines: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tail: Option<usize>,
    pub etag: String,
    pub mtime: String,
    pub workspace_head: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEdit {
    pub old_text: String,
    pub new_text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditFileRequest {
    pub workspace_id: String,
    pub path: String,
    pub edits: Vec<FileEdit>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub if_match_file_etag: Option<String>,
    #[serde(default)]
    pub if_match_workspace_head: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum EditFileResponse {
    DryRun(EditFileDryRun),
    Applied(EditFileApplied),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EditFileDryRun {
    pub dry_run: bool,
    pub matches: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EditFileApplied {
    pub dry_run: bool,
    pub path: String,
    pub changes: usize,
    pub bytes_written: usize,
    pub commit: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDirectoryRequest {
    pub workspace_id: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateDirectoryResponse {
    pub path: String,
    pub created: bool,
    pub commit: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDirectoryRequest {
    pub workspace_id: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ListDirectoryResponse {
    pub entries: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDirectoryWithSizesRequest {
    pub workspace_id: String,
    #[serde(default)]
    pub path: String,
    /// "name" (default) or "size".
    #[serde(default)]
    pub sort_by: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub size: u64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TotalsInfo {
    pub files: usize,
    pub directories: usize,
    pub combined_size: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ListDirectoryWithSizesResponse {
    pub entries: Vec<EntryInfo>,
    pub totals: TotalsInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovePathRequest {
    pub workspace_id: String,
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MovePathResponse {
    pub source: String,
    pub destination: String,
    pub commit: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePathRequest {
    pub workspace_id: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeletePathResponse {
    pub path: String,
    pub commit: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilesRequest {
    pub workspace_id: String,
    #[serde(default)]
    pub path: String,
    pub pattern: String,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SearchFilesResponse {
    pub matches: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryTreeRequest {
    pub workspace_id: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TreeNode {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DirectoryTreeResponse {
    pub tree: Vec<TreeNode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfoRequest {
    pub workspace_id: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileInfoResponse {
    pub size: u64,
    pub mtime: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub readonly: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadMediaFileRequest {
    pub workspace_id: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadMediaFileResponse {
    pub mime_type: String,
    pub base64: String,
    pub size: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadMultipleFilesRequest {
    pub workspace_id: String,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileReadResult {
    pub path: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReadMultipleFilesResponse {
    pub results: Vec<FileReadResult>,
}

// ── Operations ─────────────────────────────────────────────────────

impl Ops {
    pub fn write_file(&self, req: &WriteFileRequest) -> OpResult<WriteFileResponse> {
        if req.workspace_id.is_empty() || req.path.is_empty() {
            return Err(OpError::invalid_input("'workspaceId' and 'path' are required"));
        }
        if is_protected_path(&req.path) {
            return Err(OpError::not_found("file not found"));
        }
        let abs = self.manager().resolve(&req.workspace_id, &req.path)?;

        let existing = match std::fs::read(&abs) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(OpError::internal(format!("failed to read file: {e}"))),
        };
        let overwritten = existing.is_some();
        let current_etag = existing.as_deref().map(content_etag);

        if let (Some(expected), Some(current)) =
            (nonempty(req.if_match_file_etag.as_deref()), current_etag.as_deref())
        {
            if current != expected {
                return Err(OpError::Conflict("file etag mismatch".into()));
            }
        }
        self.check_workspace_head(&req.workspace_id, req.if_match_workspace_head.as_deref())?;

        // Identical content: nothing written, no commit, no event.
        if let Some(current) = current_etag.as_deref() {
            if content_etag(req.content.as_bytes()) == current {
                return Ok(WriteFileResponse {
                    path: req.path.clone(),
                    bytes_written: 0,
                    overwritten,
                    commit: String::new(),
                });
            }
        }

        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OpError::internal(format!("failed to create parent directories: {e}")))?;
        }
        std::fs::write(&abs, req.content.as_bytes())
            .map_err(|e| OpError::internal(format!("failed to write file: {e}")))?;

        let commit = self
            .manager()
            .store(&req.workspace_id)?
            .commit_all(&format!("Write {}", req.path), API_AUTHOR)?;

        let event_type = if overwritten { EventType::FileUpdated } else { EventType::FileCreated };
        self.publish(
            &req.workspace_id,
            WorkspaceEvent::new(event_type, req.path.clone(), false).with_commit(commit.clone()),
        );

        Ok(WriteFileResponse {
            path: req.path.clone(),
            bytes_written: req.content.len(),
            overwritten,
            commit,
        })
    }

    pub fn read_text_file(&self, req: &ReadTextFileRequest) -> OpResult<ReadTextFileResponse> {
        if req.workspace_id.is_empty() || req.path.is_empty() {
            return Err(OpError::invalid_input("'workspaceId' and 'path' are required"));
        }
        if req.head.is_some() && req.tail.is_some() {
            return Err(OpError::invalid_input("cannot specify both 'head' and 'tail'"));
        }
        if is_protected_path(&req.path) {
            return Err(OpError::not_found("file not found"));
        }
        let abs = self.manager().resolve(&req.workspace_id, &req.path)?;

        let bytes = match std::fs::read(&abs) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OpError::not_found("file not found"));
            }
            Err(e) => return Err(OpError::internal(format!("failed to read file: {e}"))),
        };
        let etag = content_etag(&bytes);
        let mtime = std::fs::metadata(&abs).map(|m| rfc3339_mtime(&m)).unwrap_or_default();
        let workspace_head = self.manager().store(&req.workspace_id)?.head()?;

        let content = String::from_utf8_lossy(&bytes).into_owned();
        let lines: Vec<&str> = content.split('\n').collect();
        let total_lines = lines.len();

        let (content, head, tail) = if let Some(h) = req.head {
            let h = h.min(total_lines);
            (lines[..h].join("\n"), Some(h), None)
        } else if let Some(t) = req.tail {
            let t = t.min(total_lines);
            (lines[total_lines - t..].join("\n"), None, Some(t))
        } else {
            (content, None, None)
        };

        Ok(ReadTextFileResponse { content, total_lines, head, tail, etag, mtime, workspace_head })
    }

    pub fn edit_file(&self, req: &EditFileRequest) -> OpResult<EditFileResponse> {
        if req.workspace_id.is_empty() || req.path.is_empty() || req.edits.is_empty() {
            return Err(OpError::invalid_input("'workspaceId', 'path', and 'edits' are required"));
        }
        if req.edits.iter().any(|e| e.old_text.is_empty()) {
            return Err(OpError::invalid_input("edit 'oldText' cannot be empty"));
        }
        if is_protected_path(&req.path) {
            return Err(OpError::not_found("file not found"));
        }
        let abs = self.manager().resolve(&req.workspace_id, &req.path)?;

        let original_bytes =
            std::fs::read(&abs).map_err(|_| OpError::not_found("file not found"))?;
        let original = String::from_utf8(original_bytes)
            .map_err(|_| OpError::Unsupported("file is not valid UTF-8".into()))?;

        if let Some(expected) = nonempty(req.if_match_file_etag.as_deref()) {
            if content_etag(original.as_bytes()) != expected {
                return Err(OpError::Conflict("file etag mismatch".into()));
            }
        }
        self.check_workspace_head(&req.workspace_id, req.if_match_workspace_head.as_deref())?;

        // Replacements apply sequentially, each replacing every occurrence.
        // Matches are counted before each replacement since a newText may
        // contain a later oldText.
        let mut new_content = original.clone();
        let mut matches = 0;
        for edit in &req.edits {
            matches += new_content.matches(edit.old_text.as_str()).count();
            new_content = new_content.replace(&edit.old_text, &edit.new_text);
        }

        if new_content == original {
            return Ok(EditFileResponse::Applied(EditFileApplied {
                dry_run: false,
                path: req.path.clone(),
                changes: 0,
                bytes_written: 0,
                commit: String::new(),
            }));
        }

        if req.dry_run {
            return Ok(EditFileResponse::DryRun(EditFileDryRun { dry_run: true, matches }));
        }

        std::fs::write(&abs, new_content.as_bytes())
            .map_err(|e| OpError::internal(format!("failed to write edited file: {e}")))?;
        let commit = self
            .manager()
            .store(&req.workspace_id)?
            .commit_all(&format!("Edit {}", req.path), API_AUTHOR)?;

        self.publish(
            &req.workspace_id,
            WorkspaceEvent::new(EventType::FileUpdated, req.path.clone(), false)
                .with_commit(commit.clone()),
        );

        Ok(EditFileResponse::Applied(EditFileApplied {
            dry_run: false,
            path: req.path.clone(),
            changes: req.edits.len(),
            bytes_written: new_content.len(),
            commit,
        }))
    }

    /// Idempotent: when the directory and its `.gitkeep` already exist,
    /// nothing is committed and no event is published.
    pub fn create_directory(&self, req: &CreateDirectoryRequest) -> OpResult<CreateDirectoryResponse> {
        if req.workspace_id.is_empty() || req.path.is_empty() {
            return Err(OpError::invalid_input("'workspaceId' and 'path' are required"));
        }
        if is_protected_path(&req.path) {
            return Err(OpError::not_found("file not found"));
        }
        let abs = self.manager().resolve(&req.workspace_id, &req.path)?;

        let created = !abs.exists();
        std::fs::create_dir_all(&abs)
            .map_err(|e| OpError::internal(format!("failed to create directory: {e}")))?;

        // Placeholder so the directory survives a commit while empty.
        let keep = abs.join(KEEP_FILE);
        let mut keep_created = false;
        if !keep.exists() {
            match std::fs::write(&keep, b"") {
                Ok(()) => keep_created = true,
                Err(e) => warn!(path = %keep.display(), error = %e, "failed to create placeholder"),
            }
        }

        if !created && !keep_created {
            return Ok(CreateDirectoryResponse {
                path: req.path.clone(),
                created: false,
                commit: String::new(),
            });
        }

        let commit = self
            .manager()
            .store(&req.workspace_id)?
            .commit_all(&format!("Create {}", req.path), API_AUTHOR)?;

        if created {
            self.publish(
                &req.workspace_id,
                WorkspaceEvent::new(EventType::DirCreated, req.path.clone(), true)
                    .with_commit(commit.clone()),
            );
        }

        Ok(CreateDirectoryResponse { path: req.path.clone(), created, commit })
    }

    pub fn list_directory(&self, req: &ListDirectoryRequest) -> OpResult<ListDirectoryResponse> {
        if req.workspace_id.is_empty() {
            return Err(OpError::invalid_input("'workspaceId' is required"));
        }
        let abs = self.manager().resolve(&req.workspace_id, &req.path)?;

        let mut named: Vec<(String, bool)> = Vec::new();
        for entry in read_dir_entries(&abs)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_protected_name(&name) {
                continue;
            }
            named.push((name, entry.path().is_dir()));
        }
        named.sort_by(|a, b| a.0.cmp(&b.0));

        let entries = named
            .into_iter()
            .map(|(name, is_dir)| {
                let prefix = if is_dir { "[DIR]" } else { "[FILE]" };
                format!("{prefix} {name}")
            })
            .collect();
        Ok(ListDirectoryResponse { entries })
    }

    pub fn list_directory_with_sizes(
        &self,
        req: &ListDirectoryWithSizesRequest,
    ) -> OpResult<ListDirectoryWithSizesResponse> {
        if req.workspace_id.is_empty() {
            return Err(OpError::invalid_input("'workspaceId' is required"));
        }
        let abs = self.manager().resolve(&req.workspace_id, &req.path)?;

        let mut entries = Vec::new();
        let mut totals = TotalsInfo::default();
        for entry in read_dir_entries(&abs)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_protected_name(&name) {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            if meta.is_dir() {
                totals.directories += 1;
                entries.push(EntryInfo { name, entry_type: "directory".into(), size: 0 });
            } else {
                totals.files += 1;
                totals.combined_size += meta.len();
                entries.push(EntryInfo { name, entry_type: "file".into(), size: meta.len() });
            }
        }

        if req.sort_by == "size" {
            entries.sort_by(|a, b| b.size.cmp(&a.size));
        } else {
            entries.sort_by(|a, b| a.name.cmp(&b.name));
        }
        Ok(ListDirectoryWithSizesResponse { entries, totals })
    }

    pub fn move_path(&self, req: &MovePathRequest) -> OpResult<MovePathResponse> {
        if req.workspace_id.is_empty() || req.source.is_empty() || req.destination.is_empty() {
            return Err(OpError::invalid_input(
                "'workspaceId', 'source', and 'destination' are required",
            ));
        }
        if is_protected_path(&req.source) || is_protected_path(&req.destination) {
            return Err(OpError::not_found("file not found"));
        }
        let src = self.manager().resolve(&req.workspace_id, &req.source)?;
        let dst = self.manager().resolve(&req.workspace_id, &req.destination)?;

        let src_meta = std::fs::metadata(&src)
            .map_err(|_| OpError::not_found("source not found"))?;
        if dst.exists() {
            return Err(OpError::AlreadyExists("destination already exists".into()));
        }
        let is_dir = src_meta.is_dir();

        std::fs::rename(&src, &dst)
            .map_err(|e| OpError::internal(format!("move failed: {e}")))?;
        let commit = self
            .manager()
            .store(&req.workspace_id)?
            .commit_all(&format!("Move {} to {}", req.source, req.destination), API_AUTHOR)?;

        self.publish(
            &req.workspace_id,
            WorkspaceEvent::new(EventType::FileMoved, req.destination.clone(), is_dir)
                .with_prev_path(req.source.clone())
                .with_commit(commit.clone()),
        );

        Ok(MovePathResponse {
            source: req.source.clone(),
            destination: req.destination.clone(),
            commit,
        })
    }

    pub fn delete_path(&self, req: &DeletePathRequest) -> OpResult<DeletePathResponse> {
        if req.workspace_id.is_empty() || req.path.is_empty() {
            return Err(OpError::invalid_input("'workspaceId' and 'path' are required"));
        }
        if is_protected_path(&req.path) {
            return Err(OpError::not_found("file not found"));
        }
        let abs = self.manager().resolve(&req.workspace_id, &req.path)?;
        if abs == self.manager().workspace_root(&req.workspace_id)? {
            return Err(OpError::invalid_input("cannot delete the workspace root"));
        }

        let meta = std::fs::metadata(&abs).map_err(|_| OpError::not_found("file not found"))?;
        let is_dir = meta.is_dir();
        let removal = if is_dir { std::fs::remove_dir_all(&abs) } else { std::fs::remove_file(&abs) };
        removal.map_err(|e| OpError::internal(format!("failed to delete: {e}")))?;

        let commit = self
            .manager()
            .store(&req.workspace_id)?
            .commit_all(&format!("Delete {}", req.path), API_AUTHOR)?;

        let event_type = if is_dir { EventType::DirDeleted } else { EventType::FileDeleted };
        self.publish(
            &req.workspace_id,
            WorkspaceEvent::new(event_type, req.path.clone(), is_dir).with_commit(commit.clone()),
        );

        Ok(DeletePathResponse { path: req.path.clone(), commit })
    }

    /// Glob match on file names under `path`, recursively. Matches are
    /// workspace-relative; protected entries never appear.
    pub fn search_files(&self, req: &SearchFilesRequest) -> OpResult<SearchFilesResponse> {
        if req.workspace_id.is_empty() || req.pattern.is_empty() {
            return Err(OpError::invalid_input("'workspaceId' and 'pattern' are required"));
        }
        let start = self.manager().resolve(&req.workspace_id, &req.path)?;
        let workspace_root = self.manager().workspace_root(&req.workspace_id)?;

        let pattern = compile_glob(&req.pattern)?;
        let excludes = req
            .exclude_patterns
            .iter()
            .map(|p| compile_glob(p))
            .collect::<OpResult<Vec<_>>>()?;

        let mut matches = Vec::new();
        let walker = WalkDir::new(&start).sort_by_file_name().into_iter().filter_entry(|e| {
            !(e.file_type().is_dir() && is_protected_name(&e.file_name().to_string_lossy()))
        });
        for entry in walker {
            let entry =
                entry.map_err(|e| OpError::internal(format!("search failed: {e}")))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_protected_name(&name) || !pattern.is_match(&name) {
                continue;
            }
            if excludes.iter().any(|m| m.is_match(&name)) {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&workspace_root) {
                matches.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(SearchFilesResponse { matches })
    }

    pub fn directory_tree(&self, req: &DirectoryTreeRequest) -> OpResult<DirectoryTreeResponse> {
        if req.workspace_id.is_empty() {
            return Err(OpError::invalid_input("'workspaceId' is required"));
        }
        let start = self.manager().resolve(&req.workspace_id, &req.path)?;
        let excludes = req
            .exclude_patterns
            .iter()
            .map(|p| compile_glob(p))
            .collect::<OpResult<Vec<_>>>()?;

        Ok(DirectoryTreeResponse { tree: build_tree(&start, &excludes)? })
    }

    pub fn file_info(&self, req: &FileInfoRequest) -> OpResult<FileInfoResponse> {
        if req.workspace_id.is_empty() || req.path.is_empty() {
            return Err(OpError::invalid_input("'workspaceId' and 'path' are required"));
        }
        if is_protected_path(&req.path) {
            return Err(OpError::not_found("file or directory not found"));
        }
        let abs = self.manager().resolve(&req.workspace_id, &req.path)?;

        let meta = match std::fs::metadata(&abs) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OpError::not_found("file or directory not found"));
            }
            Err(e) => return Err(OpError::internal(format!("failed to stat: {e}"))),
        };

        Ok(FileInfoResponse {
            size: meta.len(),
            mtime: rfc3339_mtime(&meta),
            file_type: if meta.is_dir() { "directory".into() } else { "file".into() },
            readonly: meta.permissions().readonly(),
        })
    }

    pub fn read_media_file(&self, req: &ReadMediaFileRequest) -> OpResult<ReadMediaFileResponse> {
        if req.workspace_id.is_empty() || req.path.is_empty() {
            return Err(OpError::invalid_input("'workspaceId' and 'path' are required"));
        }
        if is_protected_path(&req.path) {
            return Err(OpError::not_found("file not found"));
        }
        let abs = self.manager().resolve(&req.workspace_id, &req.path)?;

        let content = match std::fs::read(&abs) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OpError::not_found("file not found"));
            }
            Err(e) => return Err(OpError::internal(format!("failed to read media file: {e}"))),
        };
        if content.len() > MAX_MEDIA_BYTES {
            return Err(OpError::Unsupported("media file too large (max 10 MiB)".into()));
        }

        Ok(ReadMediaFileResponse {
            mime_type: mime_for_extension(&req.path).into(),
            base64: BASE64.encode(&content),
            size: content.len() as u64,
        })
    }

    /// Per-path results; one bad path never fails the batch.
    pub fn read_multiple_files(
        &self,
        req: &ReadMultipleFilesRequest,
    ) -> OpResult<ReadMultipleFilesResponse> {
        if req.workspace_id.is_empty() || req.paths.is_empty() {
            return Err(OpError::invalid_input("'workspaceId' and 'paths' are required"));
        }

        let mut results = Vec::with_capacity(req.paths.len());
        for path in &req.paths {
            results.push(self.read_one(&req.workspace_id, path));
        }
        Ok(ReadMultipleFilesResponse { results })
    }

    fn read_one(&self, workspace_id: &str, path: &str) -> FileReadResult {
        let failure = |error: String| FileReadResult {
            path: path.to_string(),
            ok: false,
            content: None,
            error: Some(error),
        };

        if is_protected_path(path) {
            return failure(OpError::not_found("file not found").to_string());
        }
        let abs = match self.manager().resolve(workspace_id, path) {
            Ok(abs) => abs,
            Err(e) => return failure(e.to_string()),
        };
        match std::fs::read(&abs) {
            Ok(bytes) => FileReadResult {
                path: path.to_string(),
                ok: true,
                content: Some(String::from_utf8_lossy(&bytes).into_owned()),
                error: None,
            },
            Err(e) => failure(OpError::from(e).to_string()),
        }
    }

    fn check_workspace_head(&self, workspace_id: &str, expected: Option<&str>) -> OpResult<()> {
        let Some(expected) = nonempty(expected) else {
            return Ok(());
        };
        let head = self.manager().store(workspace_id)?.head()?;
        if head != expected {
            return Err(OpError::Conflict("workspace head mismatch".into()));
        }
        Ok(())
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn nonempty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn read_dir_entries(dir: &Path) -> OpResult<Vec<std::fs::DirEntry>> {
    let iter = match std::fs::read_dir(dir) {
        Ok(iter) => iter,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(OpError::not_found("directory not found"));
        }
        Err(e) => return Err(OpError::internal(format!("failed to list directory: {e}"))),
    };
    Ok(iter.flatten().collect())
}

fn compile_glob(pattern: &str) -> OpResult<GlobMatcher> {
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| OpError::invalid_input(format!("invalid pattern '{pattern}': {e}")))
}

fn build_tree(dir: &Path, excludes: &[GlobMatcher]) -> OpResult<Vec<TreeNode>> {
    let mut entries = read_dir_entries(dir)?;
    entries.sort_by_key(|e| e.file_name());

    let mut tree = Vec::new();
    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_protected_name(&name) || excludes.iter().any(|m| m.is_match(&name)) {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            tree.push(TreeNode {
                name,
                node_type: "directory".into(),
                children: Some(build_tree(&path, excludes)?),
            });
        } else {
            tree.push(TreeNode { name, node_type: "file".into(), children: None });
        }
    }
    Ok(tree)
}

fn rfc3339_mtime(meta: &std::fs::Metadata) -> String {
    meta.modified()
        .ok()
        .map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

/// Extension-based MIME lookup; unknown extensions fall back to
/// application/octet-stream.
fn mime_for_extension(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "text/javascript",
        "json" => "application/json",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventHub;
    use crate::workspace::Manager;
    use atelier_common::types::ActorKind;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Ops, String) {
        let tmp = TempDir::new().unwrap();
        let manager = Manager::new(tmp.path().join("workspaces")).unwrap();
        let ops = Ops::new(manager, EventHub::default());
        let ws = ops.create_workspace("Demo").unwrap().id;
        (tmp, ops, ws)
    }

    fn write_req(ws: &str, path: &str, content: &str) -> WriteFileRequest {
        WriteFileRequest {
            workspace_id: ws.into(),
            path: path.into(),
            content: content.into(),
            if_match_file_etag: None,
            if_match_workspace_head: None,
        }
    }

    #[test]
    fn write_creates_file_and_commits() {
        let (_tmp, ops, ws) = setup();

        let resp = ops.write_file(&write_req(&ws, "notes/a.txt", "hello")).unwrap();
        assert_eq!(resp.bytes_written, 5);
        assert!(!resp.overwritten);
        assert!(!resp.commit.is_empty());

        let abs = ops.manager().resolve(&ws, "notes/a.txt").unwrap();
        assert_eq!(std::fs::read_to_string(abs).unwrap(), "hello");
    }

    #[test]
    fn write_publishes_created_event_with_commit_and_actor() {
        let (_tmp, ops, ws) = setup();
        let (mut rx, _sub) = ops.hub().subscribe(&ws, 0, 8);

        let resp = ops.write_file(&write_req(&ws, "a.txt", "x")).unwrap();

        let event = rx.try_recv().expect("event should be published");
        assert_eq!(event.event_type, EventType::FileCreated);
        assert_eq!(event.path, "a.txt");
        assert_eq!(event.commit.as_deref(), Some(resp.commit.as_str()));
        assert_eq!(event.actor.as_ref().map(|a| a.kind), Some(ActorKind::Api));
    }

    #[test]
    fn overwrite_publishes_updated_event() {
        let (_tmp, ops, ws) = setup();
        ops.write_file(&write_req(&ws, "a.txt", "one")).unwrap();

        // since_id = u64::MAX skips the replay; only the live event arrives.
        let (mut rx, _sub) = ops.hub().subscribe(&ws, u64::MAX, 8);
        let resp = ops.write_file(&write_req(&ws, "a.txt", "two")).unwrap();
        assert!(resp.overwritten);

        let event = rx.try_recv().expect("event should be published");
        assert_eq!(event.event_type, EventType::FileUpdated);
    }

    #[test]
    fn rewrite_of_identical_content_is_a_noop() {
        let (_tmp, ops, ws) = setup();
        let (mut rx, _sub) = ops.hub().subscribe(&ws, 0, 8);

        ops.write_file(&write_req(&ws, "a.txt", "same")).unwrap();
        assert!(rx.try_recv().is_some());

        let resp = ops.write_file(&write_req(&ws, "a.txt", "same")).unwrap();
        assert_eq!(resp.bytes_written, 0);
        assert_eq!(resp.commit, "");
        assert!(resp.overwritten);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn write_with_stale_etag_conflicts() {
        let (_tmp, ops, ws) = setup();
        ops.write_file(&write_req(&ws, "a.txt", "v1")).unwrap();

        let mut req = write_req(&ws, "a.txt", "v2");
        req.if_match_file_etag = Some("0".repeat(64));
        assert_eq!(ops.write_file(&req).unwrap_err().kind(), "CONFLICT");

        // File untouched.
        let read = ops
            .read_text_file(&ReadTextFileRequest {
                workspace_id: ws.clone(),
                path: "a.txt".into(),
                head: None,
                tail: None,
            })
            .unwrap();
        assert_eq!(read.content, "v1");
    }

    #[test]
    fn write_with_matching_etag_succeeds() {
        let (_tmp, ops, ws) = setup();
        ops.write_file(&write_req(&ws, "a.txt", "v1")).unwrap();

        let mut req = write_req(&ws, "a.txt", "v2");
        req.if_match_file_etag = Some(content_etag(b"v1"));
        assert!(ops.write_file(&req).is_ok());
    }

    #[test]
    fn write_with_stale_workspace_head_conflicts() {
        let (_tmp, ops, ws) = setup();
        ops.write_file(&write_req(&ws, "a.txt", "v1")).unwrap();

        let mut req = write_req(&ws, "b.txt", "new");
        req.if_match_workspace_head = Some("deadbeef".into());
        assert_eq!(ops.write_file(&req).unwrap_err().kind(), "CONFLICT");
    }

    #[test]
    fn write_with_current_head_succeeds() {
        let (_tmp, ops, ws) = setup();
        let first = ops.write_file(&write_req(&ws, "a.txt", "v1")).unwrap();

        let mut req = write_req(&ws, "b.txt", "new");
        req.if_match_workspace_head = Some(first.commit);
        assert!(ops.write_file(&req).is_ok());
    }

    #[test]
    fn protected_paths_read_as_not_found() {
        let (_tmp, ops, ws) = setup();
        assert_eq!(
            ops.write_file(&write_req(&ws, ".git/config", "x")).unwrap_err().kind(),
            "NOT_FOUND"
        );
        assert_eq!(
            ops.write_file(&write_req(&ws, ".gitkeep", "x")).unwrap_err().kind(),
            "NOT_FOUND"
        );
        assert_eq!(
            ops.delete_path(&DeletePathRequest { workspace_id: ws.clone(), path: ".gitkeep".into() })
                .unwrap_err()
                .kind(),
            "NOT_FOUND"
        );
    }

    #[test]
    fn read_reports_etag_head_and_lines() {
        let (_tmp, ops, ws) = setup();
        let written = ops.write_file(&write_req(&ws, "a.txt", "l1\nl2\nl3")).unwrap();

        let resp = ops
            .read_text_file(&ReadTextFileRequest {
                workspace_id: ws.clone(),
                path: "a.txt".into(),
                head: None,
                tail: None,
            })
            .unwrap();
        assert_eq!(resp.content, "l1\nl2\nl3");
        assert_eq!(resp.total_lines, 3);
        assert_eq!(resp.etag, content_etag(b"l1\nl2\nl3"));
        assert_eq!(resp.workspace_head, written.commit);
        assert!(!resp.mtime.is_empty());
    }

    #[test]
    fn read_head_and_tail_slice_lines() {
        let (_tmp, ops, ws) = setup();
        ops.write_file(&write_req(&ws, "a.txt", "l1\nl2\nl3\nl4")).unwrap();

        let head = ops
            .read_text_file(&ReadTextFileRequest {
                workspace_id: ws.clone(),
                path: "a.txt".into(),
                head: Some(2),
                tail: None,
            })
            .unwrap();
        assert_eq!(head.content, "l1\nl2");
        assert_eq!(head.head, Some(2));

        let tail = ops
            .read_text_file(&ReadTextFileRequest {
                workspace_id: ws.clone(),
                path: "a.txt".into(),
                head: None,
                tail: Some(2),
            })
            .unwrap();
        assert_eq!(tail.content, "l3\nl4");

        let both = ops.read_text_file(&ReadTextFileRequest {
            workspace_id: ws.clone(),
            path: "a.txt".into(),
            head: Some(1),
            tail: Some(1),
        });
        assert_eq!(both.unwrap_err().kind(), "INVALID_INPUT");
    }

    #[test]
    fn read_missing_file_is_not_found() {
        let (_tmp, ops, ws) = setup();
        let err = ops
            .read_text_file(&ReadTextFileRequest {
                workspace_id: ws,
                path: "nope.txt".into(),
                head: None,
                tail: None,
            })
            .unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");
    }

    #[test]
    fn edit_applies_replacements_and_commits() {
        let (_tmp, ops, ws) = setup();
        ops.write_file(&write_req(&ws, "a.txt", "foo bar foo")).unwrap();

        let resp = ops
            .edit_file(&EditFileRequest {
                workspace_id: ws.clone(),
                path: "a.txt".into(),
                edits: vec![FileEdit { old_text: "foo".into(), new_text: "baz".into() }],
                dry_run: false,
                if_match_file_etag: None,
                if_match_workspace_head: None,
            })
            .unwrap();

        let EditFileResponse::Applied(applied) = resp else { panic!("expected applied") };
        assert_eq!(applied.changes, 1);
        assert!(!applied.commit.is_empty());

        let abs = ops.manager().resolve(&ws, "a.txt").unwrap();
        assert_eq!(std::fs::read_to_string(abs).unwrap(), "baz bar baz");
    }

    #[test]
    fn edit_dry_run_counts_matches_without_writing() {
        let (_tmp, ops, ws) = setup();
        ops.write_file(&write_req(&ws, "a.txt", "foo bar foo")).unwrap();

        let resp = ops
            .edit_file(&EditFileRequest {
                workspace_id: ws.clone(),
                path: "a.txt".into(),
                edits: vec![FileEdit { old_text: "foo".into(), new_text: "baz".into() }],
                dry_run: true,
                if_match_file_etag: None,
                if_match_workspace_head: None,
            })
            .unwrap();

        let EditFileResponse::DryRun(dry) = resp else { panic!("expected dry run") };
        assert!(dry.dry_run);
        assert_eq!(dry.matches, 2);

        let abs = ops.manager().resolve(&ws, "a.txt").unwrap();
        assert_eq!(std::fs::read_to_string(abs).unwrap(), "foo bar foo");
    }

    #[test]
    fn edit_without_effect_short_circuits() {
        let (_tmp, ops, ws) = setup();
        ops.write_file(&write_req(&ws, "a.txt", "unchanged")).unwrap();
        let (mut rx, _sub) = ops.hub().subscribe(&ws, u64::MAX, 8);

        let resp = ops
            .edit_file(&EditFileRequest {
                workspace_id: ws.clone(),
                path: "a.txt".into(),
                edits: vec![FileEdit { old_text: "absent".into(), new_text: "x".into() }],
                dry_run: false,
                if_match_file_etag: None,
                if_match_workspace_head: None,
            })
            .unwrap();

        let EditFileResponse::Applied(applied) = resp else { panic!("expected applied") };
        assert_eq!(applied.changes, 0);
        assert_eq!(applied.bytes_written, 0);
        assert_eq!(applied.commit, "");
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn edit_with_stale_etag_conflicts() {
        let (_tmp, ops, ws) = setup();
        ops.write_file(&write_req(&ws, "a.txt", "v1")).unwrap();

        let err = ops
            .edit_file(&EditFileRequest {
                workspace_id: ws,
                path: "a.txt".into(),
                edits: vec![FileEdit { old_text: "v1".into(), new_text: "v2".into() }],
                dry_run: false,
                if_match_file_etag: Some("0".repeat(64)),
                if_match_workspace_head: None,
            })
            .unwrap_err();
        assert_eq!(err.kind(), "CONFLICT");
    }

    #[test]
    fn create_directory_is_idempotent() {
        let (_tmp, ops, ws) = setup();
        let req = CreateDirectoryRequest { workspace_id: ws.clone(), path: "docs/img".into() };

        let first = ops.create_directory(&req).unwrap();
        assert!(first.created);
        assert!(!first.commit.is_empty());

        let second = ops.create_directory(&req).unwrap();
        assert!(!second.created);
        assert_eq!(second.commit, "");

        let abs = ops.manager().resolve(&ws, "docs/img").unwrap();
        assert!(abs.join(KEEP_FILE).is_file());
    }

    #[test]
    fn create_directory_publishes_dir_created() {
        let (_tmp, ops, ws) = setup();
        let (mut rx, _sub) = ops.hub().subscribe(&ws, 0, 8);

        ops.create_directory(&CreateDirectoryRequest {
            workspace_id: ws,
            path: "docs".into(),
        })
        .unwrap();

        let event = rx.try_recv().expect("event should be published");
        assert_eq!(event.event_type, EventType::DirCreated);
        assert!(event.is_dir);
    }

    #[test]
    fn list_directory_sorts_and_filters_protected() {
        let (_tmp, ops, ws) = setup();
        ops.write_file(&write_req(&ws, "b.txt", "x")).unwrap();
        ops.write_file(&write_req(&ws, "a.txt", "x")).unwrap();
        ops.create_directory(&CreateDirectoryRequest { workspace_id: ws.clone(), path: "docs".into() })
            .unwrap();

        let resp = ops
            .list_directory(&ListDirectoryRequest { workspace_id: ws, path: String::new() })
            .unwrap();
        assert_eq!(resp.entries, vec!["[FILE] a.txt", "[FILE] b.txt", "[DIR] docs"]);
    }

    #[test]
    fn list_with_sizes_totals_and_sorts_by_size() {
        let (_tmp, ops, ws) = setup();
        ops.write_file(&write_req(&ws, "small.txt", "x")).unwrap();
        ops.write_file(&write_req(&ws, "big.txt", "xxxxxxxx")).unwrap();
        ops.create_directory(&CreateDirectoryRequest { workspace_id: ws.clone(), path: "docs".into() })
            .unwrap();

        let resp = ops
            .list_directory_with_sizes(&ListDirectoryWithSizesRequest {
                workspace_id: ws,
                path: String::new(),
                sort_by: "size".into(),
            })
            .unwrap();
        assert_eq!(resp.totals.files, 2);
        assert_eq!(resp.totals.directories, 1);
        assert_eq!(resp.totals.combined_size, 9);
        assert_eq!(resp.entries[0].name, "big.txt");
    }

    #[test]
    fn move_path_renames_and_reports_prev_path() {
        let (_tmp, ops, ws) = setup();
        ops.write_file(&write_req(&ws, "old.txt", "content")).unwrap();
        let (mut rx, _sub) = ops.hub().subscribe(&ws, u64::MAX, 8);

        let resp = ops
            .move_path(&MovePathRequest {
                workspace_id: ws.clone(),
                source: "old.txt".into(),
                destination: "new.txt".into(),
            })
            .unwrap();
        assert!(!resp.commit.is_empty());

        let event = rx.try_recv().expect("event should be published");
        assert_eq!(event.event_type, EventType::FileMoved);
        assert_eq!(event.path, "new.txt");
        assert_eq!(event.prev_path.as_deref(), Some("old.txt"));

        assert!(ops.manager().resolve(&ws, "new.txt").unwrap().is_file());
        assert!(!ops.manager().resolve(&ws, "old.txt").unwrap().exists());
    }

    #[test]
    fn move_to_existing_destination_already_exists() {
        let (_tmp, ops, ws) = setup();
        ops.write_file(&write_req(&ws, "a.txt", "a")).unwrap();
        ops.write_file(&write_req(&ws, "b.txt", "b")).unwrap();

        let err = ops
            .move_path(&MovePathRequest {
                workspace_id: ws,
                source: "a.txt".into(),
                destination: "b.txt".into(),
            })
            .unwrap_err();
        assert_eq!(err.kind(), "ALREADY_EXISTS");
    }

    #[test]
    fn move_of_missing_source_is_not_found() {
        let (_tmp, ops, ws) = setup();
        let err = ops
            .move_path(&MovePathRequest {
                workspace_id: ws,
                source: "ghost.txt".into(),
                destination: "new.txt".into(),
            })
            .unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");
    }

    #[test]
    fn delete_file_publishes_file_deleted() {
        let (_tmp, ops, ws) = setup();
        ops.write_file(&write_req(&ws, "a.txt", "x")).unwrap();
        let (mut rx, _sub) = ops.hub().subscribe(&ws, u64::MAX, 8);

        let resp = ops
            .delete_path(&DeletePathRequest { workspace_id: ws.clone(), path: "a.txt".into() })
            .unwrap();
        assert!(!resp.commit.is_empty());

        let event = rx.try_recv().expect("event should be published");
        assert_eq!(event.event_type, EventType::FileDeleted);
        assert!(!ops.manager().resolve(&ws, "a.txt").unwrap().exists());
    }

    #[test]
    fn delete_directory_publishes_dir_deleted() {
        let (_tmp, ops, ws) = setup();
        ops.create_directory(&CreateDirectoryRequest { workspace_id: ws.clone(), path: "docs".into() })
            .unwrap();
        let (mut rx, _sub) = ops.hub().subscribe(&ws, u64::MAX, 8);

        ops.delete_path(&DeletePathRequest { workspace_id: ws, path: "docs".into() }).unwrap();
        let event = rx.try_recv().expect("event should be published");
        assert_eq!(event.event_type, EventType::DirDeleted);
        assert!(event.is_dir);
    }

    #[test]
    fn delete_of_workspace_root_is_rejected() {
        let (_tmp, ops, ws) = setup();
        let err = ops
            .delete_path(&DeletePathRequest { workspace_id: ws, path: ".".into() })
            .unwrap_err();
        assert_eq!(err.kind(), "INVALID_INPUT");
    }

    #[test]
    fn search_matches_glob_and_honors_excludes() {
        let (_tmp, ops, ws) = setup();
        ops.write_file(&write_req(&ws, "notes/alpha.md", "x")).unwrap();
        ops.write_file(&write_req(&ws, "notes/beta.md", "x")).unwrap();
        ops.write_file(&write_req(&ws, "notes/gamma.txt", "x")).unwrap();

        let resp = ops
            .search_files(&SearchFilesRequest {
                workspace_id: ws,
                path: String::new(),
                pattern: "*.md".into(),
                exclude_patterns: vec!["beta*".into()],
            })
            .unwrap();
        assert_eq!(resp.matches, vec!["notes/alpha.md"]);
    }

    #[test]
    fn search_never_returns_protected_entries() {
        let (_tmp, ops, ws) = setup();
        ops.write_file(&write_req(&ws, "a.txt", "x")).unwrap();

        let resp = ops
            .search_files(&SearchFilesRequest {
                workspace_id: ws,
                path: String::new(),
                pattern: "*".into(),
                exclude_patterns: vec![],
            })
            .unwrap();
        assert!(resp.matches.iter().all(|m| !m.contains(".git")));
        assert!(resp.matches.contains(&"a.txt".to_string()));
    }

    #[test]
    fn invalid_search_pattern_is_invalid_input() {
        let (_tmp, ops, ws) = setup();
        let err = ops
            .search_files(&SearchFilesRequest {
                workspace_id: ws,
                path: String::new(),
                pattern: "[".into(),
                exclude_patterns: vec![],
            })
            .unwrap_err();
        assert_eq!(err.kind(), "INVALID_INPUT");
    }

    #[test]
    fn directory_tree_nests_and_excludes() {
        let (_tmp, ops, ws) = setup();
        ops.write_file(&write_req(&ws, "docs/a.md", "x")).unwrap();
        ops.write_file(&write_req(&ws, "docs/skip.log", "x")).unwrap();
        ops.write_file(&write_req(&ws, "top.txt", "x")).unwrap();

        let resp = ops
            .directory_tree(&DirectoryTreeRequest {
                workspace_id: ws,
                path: String::new(),
                exclude_patterns: vec!["*.log".into()],
            })
            .unwrap();

        let docs = resp.tree.iter().find(|n| n.name == "docs").expect("docs dir in tree");
        assert_eq!(docs.node_type, "directory");
        let children = docs.children.as_ref().unwrap();
        assert!(children.iter().any(|n| n.name == "a.md"));
        assert!(!children.iter().any(|n| n.name == "skip.log"));
        assert!(resp.tree.iter().all(|n| n.name != ".git" && n.name != ".gitkeep"));
    }

    #[test]
    fn file_info_reports_metadata() {
        let (_tmp, ops, ws) = setup();
        ops.write_file(&write_req(&ws, "a.txt", "12345")).unwrap();

        let info = ops
            .file_info(&FileInfoRequest { workspace_id: ws.clone(), path: "a.txt".into() })
            .unwrap();
        assert_eq!(info.size, 5);
        assert_eq!(info.file_type, "file");
        assert!(!info.mtime.is_empty());

        let missing =
            ops.file_info(&FileInfoRequest { workspace_id: ws, path: "nope".into() });
        assert_eq!(missing.unwrap_err().kind(), "NOT_FOUND");
    }

    #[test]
    fn read_media_file_encodes_base64() {
        let (_tmp, ops, ws) = setup();
        ops.write_file(&write_req(&ws, "img/pixel.png", "not-a-real-png")).unwrap();

        let resp = ops
            .read_media_file(&ReadMediaFileRequest {
                workspace_id: ws,
                path: "img/pixel.png".into(),
            })
            .unwrap();
        assert_eq!(resp.mime_type, "image/png");
        assert_eq!(resp.size, 14);
        assert_eq!(BASE64.decode(resp.base64).unwrap(), b"not-a-real-png");
    }

    #[test]
    fn oversized_media_file_is_unsupported() {
        let (_tmp, ops, ws) = setup();
        let abs = ops.manager().resolve(&ws, "big.bin").unwrap();
        std::fs::write(&abs, vec![0u8; MAX_MEDIA_BYTES + 1]).unwrap();

        let err = ops
            .read_media_file(&ReadMediaFileRequest { workspace_id: ws, path: "big.bin".into() })
            .unwrap_err();
        assert_eq!(err.kind(), "UNSUPPORTED");
    }

    #[test]
    fn read_multiple_mixes_successes_and_failures() {
        let (_tmp, ops, ws) = setup();
        ops.write_file(&write_req(&ws, "ok.txt", "fine")).unwrap();

        let resp = ops
            .read_multiple_files(&ReadMultipleFilesRequest {
                workspace_id: ws,
                paths: vec!["ok.txt".into(), "missing.txt".into(), ".gitkeep".into()],
            })
            .unwrap();
        assert_eq!(resp.results.len(), 3);
        assert!(resp.results[0].ok);
        assert_eq!(resp.results[0].content.as_deref(), Some("fine"));
        assert!(!resp.results[1].ok);
        assert!(resp.results[1].error.as_deref().unwrap().contains("NOT_FOUND"));
        assert!(!resp.results[2].ok);
    }

    #[test]
    fn mime_lookup_by_extension() {
        assert_eq!(mime_for_extension("a/b.PNG"), "image/png");
        assert_eq!(mime_for_extension("doc.pdf"), "application/pdf");
        assert_eq!(mime_for_extension("noext"), "application/octet-stream");
        assert_eq!(mime_for_extension("data.json"), "application/json");
    }
}
