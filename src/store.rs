use crate::records::{Outcome, Project, Strategy, Task, TaskFile};
use crate::safety::is_safe;
use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const PROJECT_FILE: &str = "project.yaml";
const TASKS_FILE: &str = "tasks.yaml";
const OUTCOMES_FILE: &str = "outcomes.jsonl";

// ---------------------------------------------------------------
// File-level helpers
// ---------------------------------------------------------------

/// Read and deserialize a YAML file, distinguishing "absent" from "broken".
///
/// A missing or blank file is `Ok(None)`. A file that exists but can't be
/// read or doesn't have the expected shape is an error.
pub fn load_structured<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    if contents.trim().is_empty() {
        return Ok(None);
    }
    serde_yaml::from_str(&contents)
        .map(Some)
        .with_context(|| format!("parsing {}", path.display()))
}

/// Lenient [`load_structured`]: a malformed file behaves as if absent.
pub fn read_structured<T: DeserializeOwned>(path: &Path) -> Option<T> {
    match load_structured(path) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %format!("{e:#}"), "unreadable file");
            None
        }
    }
}

/// Serialize `value` as YAML to `path`, creating parent directories.
pub fn write_structured<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let yaml = serde_yaml::to_string(value).context("serializing YAML")?;
    fs::write(path, yaml).with_context(|| format!("writing {}", path.display()))
}

/// Append `value` as one line of compact JSON, creating parent directories.
pub fn append_record<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut line = serde_json::to_string(value).context("serializing record")?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("appending to {}", path.display()))
}

/// Parse every non-blank line of a JSONL file, skipping lines that don't parse.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "failed to read records");
            return Vec::new();
        }
    };
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

/// Entries of `dir`, sorted lexicographically. Missing directories are empty.
pub fn list_children(dir: &Path) -> Vec<PathBuf> {
    let mut children: Vec<PathBuf> = match fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => return Vec::new(),
    };
    children.sort();
    children
}

/// Keep only the last `n` items, preserving order.
pub fn tail<T>(mut items: Vec<T>, n: usize) -> Vec<T> {
    let skip = items.len().saturating_sub(n);
    items.drain(..skip);
    items
}

// ---------------------------------------------------------------
// Store
// ---------------------------------------------------------------

/// A project loaded from disk together with where it lives.
#[derive(Debug, Clone)]
pub struct ProjectEntry {
    /// Directory name under the projects root; the project's identity.
    pub slug: String,
    pub dir: PathBuf,
    pub project: Project,
}

/// Typed access to the strategy and project trees.
///
/// Every path is checked against its root before it is touched. A read that
/// fails the check is treated as a missing resource; a write that fails it is
/// an error.
#[derive(Debug, Clone)]
pub struct Store {
    strategies: PathBuf,
    projects: PathBuf,
}

impl Store {
    pub fn new(strategies: impl Into<PathBuf>, projects: impl Into<PathBuf>) -> Self {
        Self {
            strategies: strategies.into(),
            projects: projects.into(),
        }
    }

    pub fn strategies_dir(&self) -> &Path {
        &self.strategies
    }

    pub fn projects_dir(&self) -> &Path {
        &self.projects
    }

    // ---------------------------------------------------------------
    // Private path helpers
    // ---------------------------------------------------------------

    fn strategy_path(&self, name: &str) -> PathBuf {
        self.strategies.join(format!("{name}.yaml"))
    }

    fn project_dir(&self, slug: &str) -> PathBuf {
        self.projects.join(slug)
    }

    fn readable(&self, path: &Path, root: &Path) -> bool {
        path.exists() && is_safe(path, root)
    }

    fn ensure_writable(&self, path: &Path, root: &Path) -> Result<()> {
        if !is_safe(path, root) {
            bail!("refusing to write outside {}: {}", root.display(), path.display());
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Strategies
    // ---------------------------------------------------------------

    /// Every readable strategy as `(file stem, strategy)`, in stem order.
    /// A strategy without a `name` field takes its stem.
    pub fn strategies(&self) -> Vec<(String, Strategy)> {
        list_children(&self.strategies)
            .into_iter()
            .filter(|p| p.extension().is_some_and(|ext| ext == "yaml") && p.is_file())
            .filter(|p| is_safe(p, &self.strategies))
            .filter_map(|p| {
                let stem = p.file_stem()?.to_str()?.to_string();
                let mut strategy: Strategy = read_structured(&p)?;
                if strategy.name.is_empty() {
                    strategy.name = stem.clone();
                }
                Some((stem, strategy))
            })
            .collect()
    }

    pub fn strategy(&self, name: &str) -> Option<Strategy> {
        let path = self.strategy_path(name);
        if !self.readable(&path, &self.strategies) {
            return None;
        }
        read_structured(&path)
    }

    #[cfg(test)]
    pub fn save_strategy(&self, name: &str, strategy: &Strategy) -> Result<()> {
        let path = self.strategy_path(name);
        self.ensure_writable(&path, &self.strategies)?;
        write_structured(&path, strategy)
    }

    /// The strategy file as an untyped mapping, exactly as stored.
    pub fn strategy_document(&self, name: &str) -> Option<Map<String, Value>> {
        let path = self.strategy_path(name);
        if !self.readable(&path, &self.strategies) {
            return None;
        }
        read_structured(&path)
    }

    pub fn save_strategy_document(&self, name: &str, doc: &Map<String, Value>) -> Result<()> {
        let path = self.strategy_path(name);
        self.ensure_writable(&path, &self.strategies)?;
        write_structured(&path, doc)
    }

    // ---------------------------------------------------------------
    // Projects
    // ---------------------------------------------------------------

    /// Every project directory holding a readable `project.yaml`, in slug order.
    pub fn projects(&self) -> Vec<ProjectEntry> {
        list_children(&self.projects)
            .into_iter()
            .filter(|dir| dir.is_dir() && self.readable(&dir.join(PROJECT_FILE), &self.projects))
            .filter_map(|dir| {
                let slug = dir.file_name()?.to_str()?.to_string();
                let project = read_structured(&dir.join(PROJECT_FILE))?;
                Some(ProjectEntry { slug, dir, project })
            })
            .collect()
    }

    pub fn project_exists(&self, slug: &str) -> bool {
        self.readable(&self.project_dir(slug).join(PROJECT_FILE), &self.projects)
    }

    #[cfg(test)]
    pub fn project(&self, slug: &str) -> Option<Project> {
        let path = self.project_dir(slug).join(PROJECT_FILE);
        if !self.readable(&path, &self.projects) {
            return None;
        }
        read_structured(&path)
    }

    #[cfg(test)]
    pub fn save_project(&self, slug: &str, project: &Project) -> Result<()> {
        let path = self.project_dir(slug).join(PROJECT_FILE);
        self.ensure_writable(&path, &self.projects)?;
        write_structured(&path, project)
    }

    /// `project.yaml` as an untyped mapping, exactly as stored.
    pub fn project_document(&self, slug: &str) -> Option<Map<String, Value>> {
        let path = self.project_dir(slug).join(PROJECT_FILE);
        if !self.readable(&path, &self.projects) {
            return None;
        }
        read_structured(&path)
    }

    pub fn save_project_document(&self, slug: &str, doc: &Map<String, Value>) -> Result<()> {
        let path = self.project_dir(slug).join(PROJECT_FILE);
        self.ensure_writable(&path, &self.projects)?;
        write_structured(&path, doc)
    }

    // ---------------------------------------------------------------
    // Tasks
    // ---------------------------------------------------------------

    /// All tasks of a project in file order, for display. Entries that aren't
    /// mappings are skipped.
    pub fn tasks(&self, slug: &str) -> Vec<Task> {
        let path = self.project_dir(slug).join(TASKS_FILE);
        if !self.readable(&path, &self.projects) {
            return Vec::new();
        }
        read_structured::<TaskFile>(&path)
            .map(|file| {
                file.tasks
                    .into_iter()
                    .filter_map(|v| serde_json::from_value(v).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every entry of `tasks.yaml` as stored, whatever its shape. This is the
    /// input for read-modify-write: a file that exists but doesn't parse is
    /// an error, so it is never replaced by a shorter list.
    pub fn task_entries(&self, slug: &str) -> Result<Vec<Value>> {
        let path = self.project_dir(slug).join(TASKS_FILE);
        if !self.readable(&path, &self.projects) {
            return Ok(Vec::new());
        }
        Ok(load_structured::<TaskFile>(&path)?
            .map(|file| file.tasks)
            .unwrap_or_default())
    }

    /// Replace a project's task list. Read-modify-write with no locking:
    /// concurrent writers to the same project can lose updates.
    pub fn save_task_entries(&self, slug: &str, tasks: Vec<Value>) -> Result<()> {
        let path = self.project_dir(slug).join(TASKS_FILE);
        self.ensure_writable(&path, &self.projects)?;
        write_structured(&path, &TaskFile { tasks })
    }

    #[cfg(test)]
    pub fn save_tasks(&self, slug: &str, tasks: &[Task]) -> Result<()> {
        let tasks = tasks
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .context("serializing tasks")?;
        self.save_task_entries(slug, tasks)
    }

    // ---------------------------------------------------------------
    // Outcomes
    // ---------------------------------------------------------------

    /// Outcomes in file (chronological) order, optionally only the last `last`.
    pub fn outcomes(&self, slug: &str, last: Option<usize>) -> Vec<Outcome> {
        let path = self.project_dir(slug).join(OUTCOMES_FILE);
        if !self.readable(&path, &self.projects) {
            return Vec::new();
        }
        let outcomes = read_records(&path);
        match last {
            Some(n) => tail(outcomes, n),
            None => outcomes,
        }
    }

    pub fn append_outcome(&self, slug: &str, outcome: &Outcome) -> Result<()> {
        let path = self.project_dir(slug).join(OUTCOMES_FILE);
        self.ensure_writable(&path, &self.projects)?;
        append_record(&path, outcome)
    }
}
