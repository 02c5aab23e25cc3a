use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Current UTC time as RFC 3339 with second precision.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Treat an explicit YAML/JSON `null` like a missing key.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Render a scalar as text. Collections come back as compact JSON.
pub fn scalar_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Accept any value for a text field, so a hand-edited `priority: 1` or
/// `title: 2024` doesn't make the whole record unreadable.
pub fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(scalar_text(Value::deserialize(deserializer)?))
}

/// Like [`text`], but keeps "absent or null" distinct from empty.
pub fn opt_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        other => Some(scalar_text(other)),
    })
}

/// A list field; a lone value becomes a one-element list.
fn list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Value>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    })
}

fn text_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(list(deserializer)?
        .into_iter()
        .map(scalar_text)
        .filter(|s| !s.is_empty())
        .collect())
}

/// A named block of standing instructions.
/// Stored as `strategies/<name>.yaml`; the file stem is its identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    #[serde(default, deserialize_with = "text")]
    pub name: String,
    #[serde(default, deserialize_with = "text")]
    pub title: String,
    /// Absent means "active" for listing and toggling, but only an explicit
    /// `true` puts the strategy into injected context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, deserialize_with = "text")]
    pub description: String,
    #[serde(default, deserialize_with = "list")]
    pub guidelines: Vec<Value>,
    /// Text injected into the agent's context while the strategy is active.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "String::is_empty")]
    pub injection: String,
    #[serde(default, deserialize_with = "text")]
    pub created: String,
    #[serde(default, deserialize_with = "text")]
    pub updated: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Strategy {
    pub fn is_active(&self) -> bool {
        self.active.unwrap_or(true)
    }

    /// Only explicitly active strategies with something to say reach the
    /// context block.
    pub fn is_surfaced(&self) -> bool {
        self.active == Some(true) && !self.injection.trim().is_empty()
    }
}

/// A tracked codebase. Stored as `projects/<slug>/project.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default, deserialize_with = "text")]
    pub name: String,
    #[serde(default, deserialize_with = "text")]
    pub title: String,
    #[serde(default, deserialize_with = "text")]
    pub status: String,
    #[serde(default, deserialize_with = "text")]
    pub description: String,
    #[serde(default, deserialize_with = "list")]
    pub relationships: Vec<Value>,
    #[serde(default, deserialize_with = "text")]
    pub notes: String,
    /// Remote-URL or path fragments used to detect the project from a
    /// working directory.
    #[serde(default, deserialize_with = "text_list", skip_serializing_if = "Vec::is_empty")]
    pub repos: Vec<String>,
    #[serde(default, deserialize_with = "text")]
    pub created: String,
    #[serde(default, deserialize_with = "text")]
    pub updated: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of `projects/<slug>/tasks.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default, deserialize_with = "text")]
    pub id: String,
    #[serde(default, deserialize_with = "text")]
    pub title: String,
    #[serde(default, deserialize_with = "text")]
    pub status: String,
    #[serde(default, deserialize_with = "text")]
    pub priority: String,
    #[serde(default, deserialize_with = "text")]
    pub notes: String,
    #[serde(default, deserialize_with = "text")]
    pub created: String,
    #[serde(default, deserialize_with = "text")]
    pub updated: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn is_done(&self) -> bool {
        self.status == "done"
    }
}

/// On-disk shape of `tasks.yaml`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TaskFile {
    #[serde(default, deserialize_with = "nullable")]
    pub tasks: Vec<Value>,
}

/// One line of `projects/<slug>/outcomes.jsonl`. Append-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    #[serde(default, deserialize_with = "text")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "text")]
    pub session_id: String,
    #[serde(default, deserialize_with = "text")]
    pub project: String,
    #[serde(default, deserialize_with = "text")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks_completed: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks_created: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
