// Version store: thin adapter over the git CLI, one instance per workspace repo.

pub mod git;

pub use git::{is_repo, CommandExecutor, GitStore, ProcessCommandExecutor};
