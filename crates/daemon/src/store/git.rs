// Git CLI adapter. The backend is treated as a black box: init, stage-all +
// commit, HEAD, log, and file content as of a commit. Commits are serialized
// by git's own index lock; this layer adds no application-level locking.

use std::path::{Path, PathBuf};
use std::process::Command;

use atelier_common::error::{OpError, OpResult};
use atelier_common::types::CommitInfo;
use tracing::debug;

/// Author email recorded on engine-made commits.
const COMMIT_EMAIL: &str = "atelier@localhost";

/// Default number of log entries when the caller does not specify a limit.
pub const DEFAULT_LOG_LIMIT: usize = 20;

/// Unit separator between fields in `git log` output.
const FIELD_SEP: char = '\u{1f}';
/// Record separator between commits in `git log` output.
const RECORD_SEP: char = '\u{1e}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// Seam for running git. Tests substitute a mock to verify argument
/// construction and to exercise failure handling without a repository.
pub trait CommandExecutor: Send + Sync {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl CommandExecutor for ProcessCommandExecutor {
    fn execute(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error> {
        let output = Command::new(program).args(args).current_dir(cwd).output()?;
        Ok(CommandResult {
            success: output.status.success(),
            code: output.status.code(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Outcome of a failed git invocation, kept for error classification.
#[derive(Debug)]
struct GitFailure {
    command: String,
    stderr: String,
}

impl GitFailure {
    fn into_internal(self) -> OpError {
        OpError::Internal(format!("`{}` failed: {}", self.command, self.stderr.trim()))
    }
}

/// Version store for a single workspace repository.
#[derive(Debug, Clone)]
pub struct GitStore<E = ProcessCommandExecutor> {
    repo_path: PathBuf,
    executor: E,
}

impl GitStore<ProcessCommandExecutor> {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self { repo_path: repo_path.into(), executor: ProcessCommandExecutor }
    }
}

/// True if `path` contains an initialized repository.
pub fn is_repo(path: &Path) -> bool {
    path.join(atelier_common::path::VCS_DIR).is_dir()
}

impl<E: CommandExecutor> GitStore<E> {
    pub fn with_executor(repo_path: impl Into<PathBuf>, executor: E) -> Self {
        Self { repo_path: repo_path.into(), executor }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Initialize an empty repository at the store's path.
    pub fn init(&self) -> OpResult<()> {
        self.run(vec!["init".into(), "-q".into()]).map_err(GitFailure::into_internal)?;
        Ok(())
    }

    /// Stage all working-tree changes and commit them, returning the new
    /// commit hash. Fails when the backend call fails, including when there
    /// is nothing to commit; callers short-circuit detected no-ops instead.
    pub fn commit_all(&self, message: &str, author: &str) -> OpResult<String> {
        self.run(vec!["add".into(), "-A".into()]).map_err(GitFailure::into_internal)?;
        self.run(vec![
            "-c".into(),
            format!("user.name={author}"),
            "-c".into(),
            format!("user.email={COMMIT_EMAIL}"),
            "commit".into(),
            "-q".into(),
            "-m".into(),
            message.to_string(),
        ])
        .map_err(GitFailure::into_internal)?;

        let head = self.head()?;
        debug!(commit = %head, "committed workspace changes");
        Ok(head)
    }

    /// Current HEAD commit hash, or an empty string when the repository has
    /// no commits yet.
    pub fn head(&self) -> OpResult<String> {
        match self.run(vec!["rev-parse".into(), "HEAD".into()]) {
            Ok(out) => Ok(String::from_utf8_lossy(&out.stdout).trim().to_string()),
            // Unborn HEAD is not an error: the repo simply has no commits.
            Err(_) => Ok(String::new()),
        }
    }

    /// Commit log, most recent first, bounded to `limit`.
    pub fn log(&self, limit: Option<usize>) -> OpResult<Vec<CommitInfo>> {
        let limit = limit.unwrap_or(DEFAULT_LOG_LIMIT);
        let format = format!("%H{FIELD_SEP}%an <%ae>{FIELD_SEP}%aI{FIELD_SEP}%s{RECORD_SEP}");
        let result = self.run(vec![
            "log".into(),
            format!("--max-count={limit}"),
            format!("--pretty=format:{format}"),
        ]);
        let out = match result {
            Ok(out) => out,
            Err(failure) if failure.stderr.contains("does not have any commits") => {
                return Ok(Vec::new());
            }
            Err(failure) => return Err(failure.into_internal()),
        };

        let text = String::from_utf8_lossy(&out.stdout);
        Ok(parse_log(&text))
    }

    /// File content as of a commit. `NotFound` when the path did not exist at
    /// that commit or the commit is unknown.
    pub fn show_at(&self, commit: &str, rel_path: &str) -> OpResult<Vec<u8>> {
        match self.run(vec!["show".into(), format!("{commit}:{rel_path}")]) {
            Ok(out) => Ok(out.stdout),
            Err(failure) if is_missing_object(&failure.stderr) => {
                Err(OpError::not_found("file not found at commit"))
            }
            Err(failure) => Err(failure.into_internal()),
        }
    }

    fn run(&self, args: Vec<String>) -> Result<CommandResult, GitFailure> {
        let command = format!("git {}", args.join(" "));
        let result =
            self.executor.execute("git", &args, &self.repo_path).map_err(|error| GitFailure {
                command: command.clone(),
                stderr: error.to_string(),
            })?;

        if result.success {
            return Ok(result);
        }

        let stderr = if result.stderr.trim().is_empty() {
            String::from_utf8_lossy(&result.stdout).into_owned()
        } else {
            result.stderr
        };
        Err(GitFailure { command, stderr })
    }
}

fn is_missing_object(stderr: &str) -> bool {
    stderr.contains("does not exist")
        || stderr.contains("exists on disk, but not in")
        || stderr.contains("invalid object name")
        || stderr.contains("bad revision")
}

fn parse_log(text: &str) -> Vec<CommitInfo> {
    text.split(RECORD_SEP)
        .filter_map(|record| {
            let record = record.trim_matches(|c| c == '\n' || c == '\r');
            if record.is_empty() {
                return None;
            }
            let mut fields = record.split(FIELD_SEP);
            Some(CommitInfo {
                commit: fields.next()?.to_string(),
                author: fields.next()?.to_string(),
                date: fields.next()?.to_string(),
                message: fields.next().unwrap_or_default().to_string(),
            })
        })
        .collect()
}
