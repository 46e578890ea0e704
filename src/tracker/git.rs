use anyhow::{Context, Result};
use git2::{ErrorCode, Repository};
use std::path::Path;

/// Source of the checked-out branch name.
///
/// Health checks take this as a parameter so they can run against a fake
/// branch in tests and degrade gracefully outside a repository.
pub trait BranchProbe {
    /// Current branch, `None` when HEAD is detached.
    fn current_branch(&self, root: &Path) -> Result<Option<String>>;
}

/// Read-only view of the project's git repository.
pub struct GitTracker {
    repo: Repository,
}

impl GitTracker {
    /// Open the repository containing `project_dir`.
    pub fn discover(project_dir: &Path) -> Result<Self> {
        let repo = Repository::discover(project_dir).context("Failed to open git repository")?;
        Ok(Self { repo })
    }

    /// Name of the checked-out branch.
    ///
    /// Works on unborn branches (fresh `git init`) by reading the symbolic
    /// HEAD target; returns `None` for a detached HEAD.
    pub fn current_branch(&self) -> Result<Option<String>> {
        match self.repo.head() {
            Ok(head) if head.is_branch() => Ok(head.shorthand().map(str::to_string)),
            Ok(_) => Ok(None),
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                let head = self
                    .repo
                    .find_reference("HEAD")
                    .context("Failed to read HEAD")?;
                Ok(head
                    .symbolic_target()
                    .and_then(|t| t.strip_prefix("refs/heads/"))
                    .map(str::to_string))
            }
            Err(e) => Err(e).context("Failed to resolve HEAD"),
        }
    }

    /// Get current HEAD SHA (returns None for unborn branches)
    pub fn head_sha(&self) -> Option<String> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
            .map(|c| c.id().to_string())
    }
}

/// [`BranchProbe`] backed by the repository at the project root.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitBranchProbe;

impl BranchProbe for GitBranchProbe {
    fn current_branch(&self, root: &Path) -> Result<Option<String>> {
        GitTracker::discover(root)?.current_branch()
    }
}

/// Fixed answer, for callers that already know the branch.
#[derive(Debug, Clone)]
pub struct StaticBranch(pub Option<String>);

impl BranchProbe for StaticBranch {
    fn current_branch(&self, _root: &Path) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}
