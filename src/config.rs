//! Project configuration read from `.specflow/config.toml`.
//!
//! Settings are layered file → environment → CLI. A missing file yields the
//! defaults; an unreadable or malformed one is an error.
//!
//! ```toml
//! [project]
//! name = "my-project"
//!
//! [vcs]
//! trunk_branches = ["main", "master"]
//!
//! [templates]
//! system_dir = "~/shared/specflow-templates"
//!
//! [state]
//! lock = false
//!
//! [specs]
//! prefix_width = 4
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::paths::{CONFIG_FILE, ProjectPaths, resolve_paths};
use crate::state::StateStore;
use crate::util::PHASE_NUMBER_WIDTH;

/// Environment override for the system template directory.
pub const TEMPLATES_ENV: &str = "SPECFLOW_TEMPLATES";
/// Environment override enabling advisory state locking.
pub const LOCK_ENV: &str = "SPECFLOW_LOCK";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Project name (defaults to the root directory name)
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcsSection {
    /// Branches where being checked out is normal between phases
    #[serde(default = "default_trunk_branches")]
    pub trunk_branches: Vec<String>,
}

fn default_trunk_branches() -> Vec<String> {
    vec!["main".to_string(), "master".to_string()]
}

impl Default for VcsSection {
    fn default() -> Self {
        Self {
            trunk_branches: default_trunk_branches(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplatesSection {
    /// Shared template source the project copies are compared against
    #[serde(default)]
    pub system_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSection {
    /// Take an exclusive lock on `.specflow/state.lock` around writes
    #[serde(default)]
    pub lock: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecsSection {
    /// Digits in a feature directory prefix (`0010-name`)
    #[serde(default = "default_prefix_width")]
    pub prefix_width: usize,
}

fn default_prefix_width() -> usize {
    PHASE_NUMBER_WIDTH
}

impl Default for SpecsSection {
    fn default() -> Self {
        Self {
            prefix_width: default_prefix_width(),
        }
    }
}

/// The complete config.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecflowToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub vcs: VcsSection,
    #[serde(default)]
    pub templates: TemplatesSection,
    #[serde(default)]
    pub state: StateSection,
    #[serde(default)]
    pub specs: SpecsSection,
}

impl SpecflowToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config.toml")
    }

    /// Load `<ops_dir>/config.toml`, or defaults when it does not exist.
    pub fn load_or_default(ops_dir: &Path) -> Result<Self> {
        let config_path = ops_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.vcs.trunk_branches.is_empty() {
            warnings.push(
                "vcs.trunk_branches is empty: every branch outside a phase will be reported as drift"
                    .to_string(),
            );
        }
        for branch in &self.vcs.trunk_branches {
            if branch.trim().is_empty() || branch.contains(char::is_whitespace) {
                warnings.push(format!("Invalid trunk branch name '{}'", branch));
            }
        }

        if !(3..=8).contains(&self.specs.prefix_width) {
            warnings.push(format!(
                "specs.prefix_width {} is outside the supported range 3..=8",
                self.specs.prefix_width
            ));
        }

        if let Some(dir) = &self.templates.system_dir
            && dir.trim().is_empty()
        {
            warnings.push("templates.system_dir is set but empty".to_string());
        }

        if let Some(name) = &self.project.name
            && name.trim().is_empty()
        {
            warnings.push("project.name is set but empty".to_string());
        }

        warnings
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}

fn expand_home(raw: &str, home: Option<&Path>) -> PathBuf {
    match (raw.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(raw),
    }
}

/// Pick the system template directory: environment, then file, then
/// `<data dir>/specflow/templates`.
fn resolve_templates_dir(
    env: Option<String>,
    file: Option<&str>,
    home: Option<PathBuf>,
    data: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(raw) = env.as_deref().or(file) {
        return Some(expand_home(raw, home.as_deref()));
    }
    data.map(|d| d.join("specflow").join("templates"))
}

/// Resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct SpecflowConfig {
    pub paths: ProjectPaths,
    pub toml: SpecflowToml,
    /// CLI override: force state locking on
    pub cli_lock: bool,
}

impl SpecflowConfig {
    /// Load configuration for the project at `root`.
    pub fn load(root: &Path) -> Result<Self> {
        let paths = resolve_paths(root);
        let toml = SpecflowToml::load_or_default(&paths.ops_dir)?;
        Ok(Self {
            paths,
            toml,
            cli_lock: false,
        })
    }

    /// Configuration with defaults only (used before a project exists).
    pub fn defaults(root: &Path) -> Self {
        Self {
            paths: resolve_paths(root),
            toml: SpecflowToml::default(),
            cli_lock: false,
        }
    }

    pub fn with_cli_lock(mut self, lock: bool) -> Self {
        self.cli_lock = lock;
        self
    }

    /// Project name (file → root directory name).
    pub fn project_name(&self) -> String {
        self.toml
            .project
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| {
                self.paths
                    .root
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "project".to_string())
    }

    pub fn trunk_branches(&self) -> &[String] {
        &self.toml.vcs.trunk_branches
    }

    pub fn prefix_width(&self) -> usize {
        self.toml.specs.prefix_width
    }

    /// System template directory (env → file → `<data dir>/specflow/templates`).
    pub fn templates_dir(&self) -> Option<PathBuf> {
        resolve_templates_dir(
            env_var(TEMPLATES_ENV),
            self.toml.templates.system_dir.as_deref(),
            dirs::home_dir(),
            dirs::data_dir(),
        )
    }

    /// Whether writes take the advisory lock (CLI → env → file).
    pub fn lock_enabled(&self) -> bool {
        if self.cli_lock {
            return true;
        }
        if let Ok(value) = std::env::var(LOCK_ENV) {
            return env_flag(&value);
        }
        self.toml.state.lock
    }

    /// Store for the current-layout state document, locked if configured.
    pub fn state_store(&self) -> StateStore {
        let store = StateStore::new(&self.paths.state);
        if self.lock_enabled() {
            store.with_lock(&self.paths.lock)
        } else {
            store
        }
    }

    /// Validate configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
