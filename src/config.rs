use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::store::Store;

const FILENAME: &str = "projector.toml";

pub const DEFAULT_BASE_PATH: &str = "~/.amplifier/projector";

const DEFAULT_INJECTION_TEMPLATE: &str =
    "<system-reminder source=\"hooks-projector\">\n{{ context }}\n</system-reminder>";

/// Expand a leading `~` in a configured path.
pub fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Wrapper template for the injected context block: either an inline
/// Jinja2 string or a path to a template file (relative to the base dir).
///
/// ```toml
/// [injection_template]
/// inline = "<project-context>\n{{ context }}\n</project-context>"
///
/// # or
///
/// [injection_template]
/// file = "injection.tmpl"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum InjectionTemplate {
    Inline(String),
    File(String),
}

impl Default for InjectionTemplate {
    fn default() -> Self {
        InjectionTemplate::Inline(DEFAULT_INJECTION_TEMPLATE.into())
    }
}

/// Which sessions the hooks act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SessionFilter {
    /// Skip sub-agent sessions (those with a parent).
    #[default]
    RootOnly,
    /// Act on every session.
    All,
}

impl From<String> for SessionFilter {
    fn from(value: String) -> Self {
        if value == "root_only" {
            SessionFilter::RootOnly
        } else {
            SessionFilter::All
        }
    }
}

impl From<SessionFilter> for String {
    fn from(value: SessionFilter) -> Self {
        match value {
            SessionFilter::RootOnly => "root_only".into(),
            SessionFilter::All => "all".into(),
        }
    }
}

/// Settings stored in `<base>/projector.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory the config was loaded from; other paths default beneath it.
    #[serde(skip)]
    pub base_path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategies_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects_path: Option<String>,

    #[serde(default)]
    pub session_filter: SessionFilter,

    #[serde(default = "default_max_recent_outcomes")]
    pub max_recent_outcomes: usize,

    #[serde(default)]
    pub injection_template: InjectionTemplate,
}

fn default_max_recent_outcomes() -> usize {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_path: expand(DEFAULT_BASE_PATH),
            strategies_path: None,
            projects_path: None,
            session_filter: SessionFilter::default(),
            max_recent_outcomes: default_max_recent_outcomes(),
            injection_template: InjectionTemplate::default(),
        }
    }
}

impl Config {
    /// Load `projector.toml` from `base`. A missing file yields defaults;
    /// missing keys in an existing file are filled in via serde.
    pub fn load(base: &Path) -> Result<Self> {
        let path = base.join(FILENAME);
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => toml::from_str::<Config>(&contents)
                .with_context(|| format!("parsing {}", path.display()))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        config.base_path = base.to_path_buf();
        Ok(config)
    }

    /// Defaults rooted at `base`, for when the config file can't be used.
    pub fn defaults_at(base: &Path) -> Self {
        Self {
            base_path: base.to_path_buf(),
            ..Default::default()
        }
    }

    pub fn strategies_dir(&self) -> PathBuf {
        match &self.strategies_path {
            Some(p) => expand(p),
            None => self.base_path.join("strategies"),
        }
    }

    pub fn projects_dir(&self) -> PathBuf {
        match &self.projects_path {
            Some(p) => expand(p),
            None => self.base_path.join("projects"),
        }
    }

    pub fn store(&self) -> Store {
        Store::new(self.strategies_dir(), self.projects_dir())
    }

    /// Resolve the injection wrapper template to a string.
    pub fn load_injection_template(&self) -> Result<String> {
        match &self.injection_template {
            InjectionTemplate::Inline(s) => Ok(s.clone()),
            InjectionTemplate::File(filename) => {
                let path = self.base_path.join(filename);
                fs::read_to_string(&path)
                    .with_context(|| format!("reading template {}", path.display()))
            }
        }
    }
}
