//! CRUD over projects, strategies, tasks and outcomes for external callers.
//!
//! Every call goes through [`ProjectorTool::execute`] and comes back as a
//! [`ToolResult`]. Successful operations and caller mistakes the operation
//! itself detects ("Project not found", missing `title`, ...) both produce a
//! successful result whose `output` is a JSON envelope `{"ok": ..}`. Bad
//! names, malformed input and unexpected failures produce `success: false`.

mod ids;

pub use ids::{next_task_id, project_prefix};

use crate::records::{now_iso, scalar_text, Outcome, Project, Strategy, Task};
use crate::safety::{safe_name, NameError};
use crate::store::Store;
use crate::types::{ToolInput, ToolResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub const NAME: &str = "projector";

pub const DESCRIPTION: &str = "Manage projects, strategies, tasks, and session outcomes for the \
    Projector system. Supports CRUD on projects and strategies, task tracking, outcome logging, \
    and cross-project status queries.";

const RECENT_OUTCOMES_IN_PROJECT: usize = 20;

// ===================================================================
// Operations
// ===================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListProjects,
    GetProject,
    UpdateProject,
    CreateProject,
    ListStrategies,
    GetStrategy,
    SetStrategy,
    ToggleStrategy,
    AddTask,
    UpdateTask,
    ListTasks,
    LogOutcome,
    GetStatus,
}

impl Operation {
    pub const ALL: [Operation; 13] = [
        Operation::ListProjects,
        Operation::GetProject,
        Operation::UpdateProject,
        Operation::CreateProject,
        Operation::ListStrategies,
        Operation::GetStrategy,
        Operation::SetStrategy,
        Operation::ToggleStrategy,
        Operation::AddTask,
        Operation::UpdateTask,
        Operation::ListTasks,
        Operation::LogOutcome,
        Operation::GetStatus,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::ListProjects => "list_projects",
            Operation::GetProject => "get_project",
            Operation::UpdateProject => "update_project",
            Operation::CreateProject => "create_project",
            Operation::ListStrategies => "list_strategies",
            Operation::GetStrategy => "get_strategy",
            Operation::SetStrategy => "set_strategy",
            Operation::ToggleStrategy => "toggle_strategy",
            Operation::AddTask => "add_task",
            Operation::UpdateTask => "update_task",
            Operation::ListTasks => "list_tasks",
            Operation::LogOutcome => "log_outcome",
            Operation::GetStatus => "get_status",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ===================================================================
// Errors
// ===================================================================

#[derive(Debug, Error)]
pub enum ToolError {
    /// Name failed sanitization; nothing was touched.
    #[error(transparent)]
    InvalidName(#[from] NameError),
    /// Input doesn't have the shape the operation needs.
    #[error("{0}")]
    InvalidInput(String),
    /// The operation ran and declined; reported inside an `ok: false` envelope.
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

type OpResult = Result<Value, ToolError>;

fn rejected(message: impl Into<String>) -> ToolError {
    ToolError::Rejected(message.into())
}

// ===================================================================
// Envelopes and field helpers
// ===================================================================

fn ok_envelope(result: Value) -> Result<String, ToolError> {
    serde_json::to_string_pretty(&json!({"ok": true, "result": result}))
        .map_err(|e| ToolError::Unexpected(e.into()))
}

fn err_envelope(message: &str) -> String {
    json!({"ok": false, "error": message}).to_string()
}

fn value<T: Serialize>(record: &T) -> Result<Value, ToolError> {
    serde_json::to_value(record).map_err(|e| ToolError::Unexpected(e.into()))
}

fn to_map<T: Serialize>(record: &T) -> Result<Map<String, Value>, ToolError> {
    match value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(ToolError::Unexpected(anyhow::anyhow!(
            "record serialized to a non-object: {other}"
        ))),
    }
}

/// Check that `map` still reads as a `T`. The map itself is what gets stored,
/// so keys and values the typed record doesn't model survive untouched.
fn validate<T: DeserializeOwned>(map: &Map<String, Value>, what: &str) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(map.clone()))
        .map_err(|e| ToolError::InvalidInput(format!("Invalid {what} data: {e}")))
}

/// Text of a field in an untyped document; absent reads as empty.
fn text_of(doc: &Map<String, Value>, key: &str) -> String {
    doc.get(key).cloned().map(scalar_text).unwrap_or_default()
}

/// Python-style truthiness, for "is this required field really there".
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

fn field(data: &Map<String, Value>, key: &str, default: Value) -> Value {
    data.get(key).cloned().unwrap_or(default)
}

/// Append the keys of `data` not already present (fixed fields win).
fn merge_extras(map: &mut Map<String, Value>, data: &Map<String, Value>) {
    for (key, val) in data {
        if !map.contains_key(key) {
            map.insert(key.clone(), val.clone());
        }
    }
}

/// Overwrite every key of `data` except the protected ones.
fn merge_update(map: &mut Map<String, Value>, data: &Map<String, Value>, protected: &[&str]) {
    for (key, val) in data {
        if !protected.contains(&key.as_str()) {
            map.insert(key.clone(), val.clone());
        }
    }
}

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() { default } else { value }
}

// ===================================================================
// Tool
// ===================================================================

pub struct ProjectorTool {
    store: Store,
}

impl ProjectorTool {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// JSON Schema describing the tool's input.
    pub fn input_schema() -> Value {
        let operations: Vec<&str> = Operation::ALL.iter().map(|op| op.as_str()).collect();
        json!({
            "type": "object",
            "required": ["operation"],
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": operations,
                    "description": "The operation to perform."
                },
                "project": {
                    "type": "string",
                    "description": "Project name (for project-specific operations)."
                },
                "strategy": {
                    "type": "string",
                    "description": "Strategy name (for strategy-specific operations)."
                },
                "data": {
                    "type": "object",
                    "description": "Payload for create/update/log operations."
                },
                "query": {
                    "type": "string",
                    "description": "Optional query or filter for status/list operations."
                }
            }
        })
    }

    /// Validate the operation, run it, and wrap the result.
    pub fn execute(&self, input: &Value) -> ToolResult {
        let op_name = match input.get("operation").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => name,
            _ => return ToolResult::failed("Missing required parameter: operation"),
        };
        let Some(op) = Operation::parse(op_name) else {
            let valid: Vec<&str> = Operation::ALL.iter().map(|op| op.as_str()).collect();
            return ToolResult::failed(format!(
                "Unknown operation: {op_name:?}. Valid: {}",
                valid.join(", ")
            ));
        };
        let args: ToolInput = match serde_json::from_value(input.clone()) {
            Ok(args) => args,
            Err(e) => return ToolResult::failed(format!("Invalid input for {op}: {e}")),
        };

        let outcome = self.dispatch(op, &args).and_then(ok_envelope);
        match outcome {
            Ok(envelope) => ToolResult::ok(envelope),
            Err(ToolError::Rejected(message)) => ToolResult::ok(err_envelope(&message)),
            Err(e @ (ToolError::InvalidName(_) | ToolError::InvalidInput(_))) => {
                ToolResult::failed(e.to_string())
            }
            Err(ToolError::Unexpected(e)) => {
                tracing::warn!(operation = %op, error = %format!("{e:#}"), "tool operation failed");
                ToolResult::failed(format!("Unexpected error in {op}: {e:#}"))
            }
        }
    }

    fn dispatch(&self, op: Operation, args: &ToolInput) -> OpResult {
        match op {
            Operation::ListProjects => self.list_projects(),
            Operation::GetProject => self.get_project(args),
            Operation::UpdateProject => self.update_project(args),
            Operation::CreateProject => self.create_project(args),
            Operation::ListStrategies => self.list_strategies(),
            Operation::GetStrategy => self.get_strategy(args),
            Operation::SetStrategy => self.set_strategy(args),
            Operation::ToggleStrategy => self.toggle_strategy(args),
            Operation::AddTask => self.add_task(args),
            Operation::UpdateTask => self.update_task(args),
            Operation::ListTasks => self.list_tasks(args),
            Operation::LogOutcome => self.log_outcome(args),
            Operation::GetStatus => self.get_status(),
        }
    }

    fn project_slug(args: &ToolInput) -> Result<String, ToolError> {
        Ok(safe_name(args.project.as_deref().unwrap_or(""))?)
    }

    fn strategy_name(args: &ToolInput) -> Result<String, ToolError> {
        Ok(safe_name(args.strategy.as_deref().unwrap_or(""))?)
    }

    fn require_project(&self, slug: &str) -> Result<Map<String, Value>, ToolError> {
        self.store
            .project_document(slug)
            .ok_or_else(|| rejected(format!("Project not found: {slug}")))
    }

    // ---------------------------------------------------------------
    // Projects
    // ---------------------------------------------------------------

    fn list_projects(&self) -> OpResult {
        let projects: Vec<Value> = self
            .store
            .projects()
            .into_iter()
            .map(|entry| {
                json!({
                    "name": entry.slug,
                    "title": or_default(&entry.project.title, &entry.slug),
                    "status": or_default(&entry.project.status, "unknown"),
                    "updated": entry.project.updated,
                })
            })
            .collect();
        Ok(Value::Array(projects))
    }

    fn get_project(&self, args: &ToolInput) -> OpResult {
        let slug = Self::project_slug(args)?;
        let project = self.require_project(&slug)?;
        let outcomes = self.store.outcomes(&slug, Some(RECENT_OUTCOMES_IN_PROJECT));
        let tasks = self.store.task_entries(&slug).unwrap_or_else(|e| {
            tracing::debug!(project = %slug, error = %format!("{e:#}"), "tasks unreadable");
            Vec::new()
        });
        Ok(json!({
            "project": project,
            "recent_outcomes": value(&outcomes)?,
            "tasks": tasks,
        }))
    }

    fn create_project(&self, args: &ToolInput) -> OpResult {
        let slug = Self::project_slug(args)?;
        let data = args.data.clone().unwrap_or_default();
        if self.store.project_exists(&slug) {
            return Err(rejected(format!("Project already exists: {slug}")));
        }

        let now = now_iso();
        let mut map = Map::new();
        map.insert("name".into(), json!(slug));
        map.insert("title".into(), field(&data, "title", json!(slug)));
        map.insert("status".into(), field(&data, "status", json!("active")));
        map.insert("description".into(), field(&data, "description", json!("")));
        map.insert("relationships".into(), field(&data, "relationships", json!([])));
        map.insert("notes".into(), field(&data, "notes", json!("")));
        map.insert("created".into(), json!(now));
        map.insert("updated".into(), json!(now));
        merge_extras(&mut map, &data);

        validate::<Project>(&map, "project")?;
        self.store.save_project_document(&slug, &map)?;
        Ok(json!({"created": slug, "project": map}))
    }

    fn update_project(&self, args: &ToolInput) -> OpResult {
        let slug = Self::project_slug(args)?;
        let data = args.data.clone().unwrap_or_default();
        if data.is_empty() {
            return Err(rejected("No data provided for update"));
        }
        let mut map = self.require_project(&slug)?;
        merge_update(&mut map, &data, &["name", "created"]);
        map.insert("updated".into(), json!(now_iso()));

        validate::<Project>(&map, "project")?;
        self.store.save_project_document(&slug, &map)?;
        Ok(json!({"updated": slug, "project": map}))
    }

    // ---------------------------------------------------------------
    // Strategies
    // ---------------------------------------------------------------

    fn list_strategies(&self) -> OpResult {
        let strategies: Vec<Value> = self
            .store
            .strategies()
            .into_iter()
            .map(|(stem, strategy)| {
                json!({
                    "name": stem,
                    "title": or_default(&strategy.title, &stem),
                    "active": strategy.is_active(),
                    "updated": strategy.updated,
                })
            })
            .collect();
        Ok(Value::Array(strategies))
    }

    fn get_strategy(&self, args: &ToolInput) -> OpResult {
        let name = Self::strategy_name(args)?;
        let strategy = self
            .store
            .strategy(&name)
            .ok_or_else(|| rejected(format!("Strategy not found: {name}")))?;
        value(&strategy)
    }

    fn set_strategy(&self, args: &ToolInput) -> OpResult {
        let name = Self::strategy_name(args)?;
        let data = args.data.clone().unwrap_or_default();
        if data.is_empty() {
            return Err(rejected("No data provided for strategy"));
        }

        // An unreadable file is replaced, like a missing one.
        let existing = self.store.strategy_document(&name);
        let action = if existing.is_some() { "updated" } else { "created" };
        let now = now_iso();
        let mut map = existing.unwrap_or_default();
        for (key, default) in [
            ("title", json!(name)),
            ("active", json!(true)),
            ("description", json!("")),
            ("guidelines", json!([])),
            ("created", json!(now)),
        ] {
            map.entry(key).or_insert(default);
        }
        map.insert("name".into(), json!(name));
        merge_update(&mut map, &data, &["name", "created"]);
        map.insert("updated".into(), json!(now));

        validate::<Strategy>(&map, "strategy")?;
        self.store.save_strategy_document(&name, &map)?;
        Ok(json!({"action": action, "strategy": map}))
    }

    fn toggle_strategy(&self, args: &ToolInput) -> OpResult {
        let name = Self::strategy_name(args)?;
        let mut map = self
            .store
            .strategy_document(&name)
            .ok_or_else(|| rejected(format!("Strategy not found: {name}")))?;

        // No `active` key counts as active.
        let was_active = match map.get("active") {
            None | Some(Value::Null) => true,
            other => truthy(other),
        };
        map.insert("active".into(), json!(!was_active));
        map.insert("updated".into(), json!(now_iso()));
        self.store.save_strategy_document(&name, &map)?;
        Ok(json!({
            "name": name,
            "active": !was_active,
            "changed_from": was_active,
        }))
    }

    // ---------------------------------------------------------------
    // Tasks
    // ---------------------------------------------------------------

    fn add_task(&self, args: &ToolInput) -> OpResult {
        let slug = Self::project_slug(args)?;
        let data = args.data.clone().unwrap_or_default();
        self.require_project(&slug)?;
        if !truthy(data.get("title")) {
            return Err(rejected("Task requires a 'title' in data"));
        }

        let mut entries = self.store.task_entries(&slug)?;
        let id = next_task_id(
            entries.iter().filter_map(|e| e.get("id")?.as_str()),
            &project_prefix(&slug),
        );
        let now = now_iso();
        let mut map = Map::new();
        map.insert("id".into(), json!(id));
        map.insert("title".into(), field(&data, "title", json!("")));
        map.insert("status".into(), field(&data, "status", json!("todo")));
        map.insert("priority".into(), field(&data, "priority", json!("normal")));
        map.insert("notes".into(), field(&data, "notes", json!("")));
        map.insert("created".into(), json!(now));
        map.insert("updated".into(), json!(now));
        merge_extras(&mut map, &data);

        validate::<Task>(&map, "task")?;
        entries.push(Value::Object(map.clone()));
        self.store.save_task_entries(&slug, entries)?;
        Ok(json!({"added": map}))
    }

    fn update_task(&self, args: &ToolInput) -> OpResult {
        let slug = Self::project_slug(args)?;
        let data = args.data.clone().unwrap_or_default();
        let task_id = match data.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return Err(rejected("Task update requires 'id' in data")),
        };
        self.require_project(&slug)?;

        let mut entries = self.store.task_entries(&slug)?;
        let found = entries
            .iter_mut()
            .filter_map(Value::as_object_mut)
            .find(|t| t.get("id").and_then(Value::as_str) == Some(task_id.as_str()));
        let Some(task) = found else {
            return Err(rejected(format!("Task not found: {task_id}")));
        };

        let mut map = task.clone();
        merge_update(&mut map, &data, &["id", "created"]);
        map.insert("updated".into(), json!(now_iso()));
        validate::<Task>(&map, "task")?;

        *task = map.clone();
        self.store.save_task_entries(&slug, entries)?;
        Ok(json!({"updated": map}))
    }

    fn list_tasks(&self, args: &ToolInput) -> OpResult {
        let mut tagged: Vec<Map<String, Value>> = Vec::new();
        let mut add_from = |slug: &str| {
            let entries = self.store.task_entries(slug).unwrap_or_else(|e| {
                tracing::debug!(project = %slug, error = %format!("{e:#}"), "tasks unreadable");
                Vec::new()
            });
            for entry in entries {
                if let Value::Object(mut task) = entry {
                    task.insert("project".into(), json!(slug));
                    tagged.push(task);
                }
            }
        };

        match args.project.as_deref().filter(|p| !p.is_empty()) {
            Some(project) => {
                let slug = safe_name(project)?;
                self.require_project(&slug)?;
                add_from(&slug);
            }
            None => {
                for entry in self.store.projects() {
                    add_from(&entry.slug);
                }
            }
        }

        if let Some(query) = args.query.as_deref().filter(|q| !q.is_empty()) {
            let q = query.to_lowercase();
            tagged.retain(|t| {
                text_of(t, "status").to_lowercase().contains(&q)
                    || text_of(t, "title").to_lowercase().contains(&q)
            });
        }
        Ok(json!(tagged))
    }

    // ---------------------------------------------------------------
    // Outcomes
    // ---------------------------------------------------------------

    fn log_outcome(&self, args: &ToolInput) -> OpResult {
        let slug = Self::project_slug(args)?;
        let data = args.data.clone().unwrap_or_default();
        self.require_project(&slug)?;
        if !truthy(data.get("summary")) {
            return Err(rejected("Outcome requires a 'summary' in data"));
        }

        let mut map = Map::new();
        map.insert("timestamp".into(), json!(now_iso()));
        map.insert("session_id".into(), field(&data, "session_id", json!("")));
        map.insert("project".into(), json!(slug));
        map.insert("summary".into(), field(&data, "summary", json!("")));
        map.insert("tags".into(), field(&data, "tags", json!([])));
        map.insert("details".into(), field(&data, "details", json!("")));

        let outcome: Outcome = validate(&map, "outcome")?;
        self.store.append_outcome(&slug, &outcome)?;
        Ok(json!({"logged": value(&outcome)?}))
    }

    // ---------------------------------------------------------------
    // Status
    // ---------------------------------------------------------------

    fn get_status(&self) -> OpResult {
        let mut projects = Vec::new();
        let mut attention = Vec::new();
        let mut recent_outcomes = Vec::new();

        for entry in self.store.projects() {
            let slug = entry.slug.as_str();
            let project = &entry.project;
            let tasks = self.store.tasks(slug);
            let outcomes = self.store.outcomes(slug, None);

            let mut task_counts: BTreeMap<&str, usize> = BTreeMap::new();
            for task in &tasks {
                *task_counts.entry(or_default(&task.status, "unknown")).or_default() += 1;
            }

            projects.push(json!({
                "name": slug,
                "title": or_default(&project.title, slug),
                "status": or_default(&project.status, "unknown"),
                "task_counts": task_counts,
                "outcome_count": outcomes.len(),
                "updated": project.updated,
            }));

            if project.status == "active" && tasks.is_empty() {
                attention.push(json!({
                    "project": slug,
                    "signal": "active_no_tasks",
                    "message": format!("Project '{slug}' is active but has no tasks."),
                }));
            }

            let blocked: Vec<&str> = tasks
                .iter()
                .filter(|t| t.status == "blocked")
                .map(|t| t.id.as_str())
                .collect();
            if !blocked.is_empty() {
                attention.push(json!({
                    "project": slug,
                    "signal": "blocked_tasks",
                    "message": format!(
                        "Project '{slug}' has {} blocked task(s): {}.",
                        blocked.len(),
                        blocked.join(", ")
                    ),
                }));
            }

            if let Some(latest) = outcomes.last() {
                let mut tagged = to_map(latest)?;
                tagged.insert("project".into(), json!(slug));
                recent_outcomes.push(Value::Object(tagged));
            }
        }

        let mut active = 0;
        let mut inactive = 0;
        let mut list = Vec::new();
        for (stem, strategy) in self.store.strategies() {
            if strategy.is_active() {
                active += 1;
            } else {
                inactive += 1;
            }
            list.push(json!({"name": stem, "active": strategy.is_active()}));
        }

        recent_outcomes.sort_by(|a, b| {
            let ts = |v: &Value| v["timestamp"].as_str().unwrap_or("").to_string();
            ts(b).cmp(&ts(a))
        });

        Ok(json!({
            "timestamp": now_iso(),
            "projects": projects,
            "strategies": {"active": active, "inactive": inactive, "list": list},
            "attention": attention,
            "recent_outcomes": recent_outcomes,
        }))
    }
}

#[cfg(test)]
mod tests;
