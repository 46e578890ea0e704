pub mod git;

pub use git::{BranchProbe, GitBranchProbe, GitTracker, StaticBranch};
