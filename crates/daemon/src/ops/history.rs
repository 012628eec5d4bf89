// Version history reads. Both operations go straight to the version store;
// nothing here mutates the working tree.

use atelier_common::error::{OpError, OpResult};
use atelier_common::path::{clean_relative, is_protected_path, PathError};
use atelier_common::types::CommitInfo;
use serde::{Deserialize, Serialize};

use super::Ops;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitHistoryRequest {
    pub workspace_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CommitHistoryResponse {
    pub log: Vec<CommitInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadFileAtCommitRequest {
    pub workspace_id: String,
    pub commit: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadFileAtCommitResponse {
    pub path: String,
    pub commit: String,
    pub content: String,
}

impl Ops {
    pub fn commit_history(&self, req: &CommitHistoryRequest) -> OpResult<CommitHistoryResponse> {
        if req.workspace_id.is_empty() {
            return Err(OpError::invalid_input("'workspaceId' is required"));
        }
        let limit = req.limit.filter(|l| *l > 0);
        let log = self.manager().store(&req.workspace_id)?.log(limit)?;
        Ok(CommitHistoryResponse { log })
    }

    /// File content as it was at a given commit. The path is sandbox-checked
    /// even though the read goes through the store, so history access obeys
    /// the same boundaries as live reads.
    pub fn read_file_at_commit(
        &self,
        req: &ReadFileAtCommitRequest,
    ) -> OpResult<ReadFileAtCommitResponse> {
        if req.workspace_id.is_empty() || req.commit.is_empty() || req.path.is_empty() {
            return Err(OpError::invalid_input(
                "'workspaceId', 'commit', and 'path' are required",
            ));
        }
        if is_protected_path(&req.path) {
            return Err(OpError::not_found("file not found"));
        }
        let cleaned = clean_relative(&req.path).map_err(|e| match e {
            PathError::Absolute | PathError::NullByte => OpError::InvalidInput(e.to_string()),
            PathError::Escapes => OpError::OutOfBounds(e.to_string()),
        })?;
        if cleaned.is_empty() {
            return Err(OpError::invalid_input("'path' must name a file"));
        }

        let bytes = self.manager().store(&req.workspace_id)?.show_at(&req.commit, &cleaned)?;
        Ok(ReadFileAtCommitResponse {
            path: cleaned,
            commit: req.commit.clone(),
            content: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventHub;
    use crate::ops::fs::WriteFileRequest;
    use crate::workspace::Manager;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Ops, String) {
        let tmp = TempDir::new().unwrap();
        let manager = Manager::new(tmp.path().join("workspaces")).unwrap();
        let ops = Ops::new(manager, EventHub::default());
        let ws = ops.create_workspace("History").unwrap().id;
        (tmp, ops, ws)
    }

    fn write(ops: &Ops, ws: &str, path: &str, content: &str) -> String {
        ops.write_file(&WriteFileRequest {
            workspace_id: ws.into(),
            path: path.into(),
            content: content.into(),
            if_match_file_etag: None,
            if_match_workspace_head: None,
        })
        .unwrap()
        .commit
    }

    #[test]
    fn history_lists_commits_most_recent_first() {
        let (_tmp, ops, ws) = setup();
        let first = write(&ops, &ws, "a.txt", "one");
        let second = write(&ops, &ws, "a.txt", "two");

        let resp = ops
            .commit_history(&CommitHistoryRequest { workspace_id: ws, limit: None })
            .unwrap();
        // Initial workspace commit plus the two writes.
        assert_eq!(resp.log.len(), 3);
        assert_eq!(resp.log[0].commit, second);
        assert_eq!(resp.log[1].commit, first);
        assert_eq!(resp.log[0].message, "Write a.txt");
    }

    #[test]
    fn history_honors_limit() {
        let (_tmp, ops, ws) = setup();
        write(&ops, &ws, "a.txt", "one");
        write(&ops, &ws, "a.txt", "two");

        let resp = ops
            .commit_history(&CommitHistoryRequest { workspace_id: ws, limit: Some(1) })
            .unwrap();
        assert_eq!(resp.log.len(), 1);
    }

    #[test]
    fn read_at_commit_returns_old_content() {
        let (_tmp, ops, ws) = setup();
        let first = write(&ops, &ws, "a.txt", "old");
        write(&ops, &ws, "a.txt", "new");

        let resp = ops
            .read_file_at_commit(&ReadFileAtCommitRequest {
                workspace_id: ws,
                commit: first,
                path: "a.txt".into(),
            })
            .unwrap();
        assert_eq!(resp.content, "old");
    }

    #[test]
    fn read_at_commit_missing_path_is_not_found() {
        let (_tmp, ops, ws) = setup();
        let commit = write(&ops, &ws, "a.txt", "x");

        let err = ops
            .read_file_at_commit(&ReadFileAtCommitRequest {
                workspace_id: ws,
                commit,
                path: "ghost.txt".into(),
            })
            .unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");
    }

    #[test]
    fn read_at_unknown_commit_is_not_found() {
        let (_tmp, ops, ws) = setup();
        write(&ops, &ws, "a.txt", "x");

        let err = ops
            .read_file_at_commit(&ReadFileAtCommitRequest {
                workspace_id: ws,
                commit: "0000000000000000000000000000000000000000".into(),
                path: "a.txt".into(),
            })
            .unwrap_err();
        assert_eq!(err.kind(), "NOT_FOUND");
    }

    #[test]
    fn read_at_commit_rejects_escaping_paths() {
        let (_tmp, ops, ws) = setup();
        let commit = write(&ops, &ws, "a.txt", "x");

        let err = ops
            .read_file_at_commit(&ReadFileAtCommitRequest {
                workspace_id: ws,
                commit,
                path: "../elsewhere".into(),
            })
            .unwrap_err();
        assert_eq!(err.kind(), "OUT_OF_BOUNDS");
    }
}
