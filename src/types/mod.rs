use crate::records::opt_text;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ===================================================================
// Hook event envelope (one JSON object per stdin line)
// ===================================================================

pub const PROVIDER_REQUEST: &str = "provider:request";
pub const SESSION_END: &str = "session:end";

/// A lifecycle event delivered by the host.
#[derive(Debug, Clone, Deserialize)]
pub struct HookEvent {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

// ===================================================================
// Event data
// ===================================================================

/// Fields of `provider:request` the projector looks at.
///
/// Text fields accept any JSON value; a non-string `parent_id` still marks
/// the request as coming from a child session.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RequestData {
    #[serde(deserialize_with = "opt_text")]
    pub parent_id: Option<String>,
}

/// Fields of `session:end` used for outcome capture.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionEndData {
    #[serde(deserialize_with = "opt_text")]
    pub working_dir: Option<String>,
    #[serde(deserialize_with = "opt_text")]
    pub session_id: Option<String>,
    #[serde(deserialize_with = "opt_text")]
    pub parent_id: Option<String>,
    #[serde(deserialize_with = "opt_text")]
    pub summary: Option<String>,
    #[serde(deserialize_with = "opt_text")]
    pub title: Option<String>,
    #[serde(deserialize_with = "opt_text")]
    pub topic: Option<String>,
    /// Recorded as given; absent means an empty list.
    pub tasks_completed: Value,
    pub tasks_created: Value,
}

// ===================================================================
// Hook result (written to stdout, one JSON object per event)
// ===================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookAction {
    #[default]
    Continue,
    InjectContext,
}

/// What a hook handler asks the host to do.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookResult {
    pub action: HookAction,

    /// Text attached to the next request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_injection: Option<String>,

    /// Role the injected text is attributed to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_injection_role: Option<String>,

    /// If `true`, the injection applies to the next request only and is not
    /// stored in the conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ephemeral: Option<bool>,

    /// If `true`, the host doesn't echo the injection to the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppress_output: Option<bool>,
}

impl HookResult {
    pub fn proceed() -> Self {
        Self::default()
    }

    /// An ephemeral, user-role injection hidden from the transcript view.
    pub fn inject(text: String) -> Self {
        Self {
            action: HookAction::InjectContext,
            context_injection: Some(text),
            context_injection_role: Some("user".into()),
            ephemeral: Some(true),
            suppress_output: Some(true),
        }
    }
}

// ===================================================================
// Tool protocol
// ===================================================================

/// Arguments of a tool call, after `operation` has been validated.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolInput {
    pub operation: String,
    pub project: Option<String>,
    pub strategy: Option<String>,
    pub data: Option<Map<String, Value>>,
    pub query: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolErrorBody {
    pub message: String,
}

/// Outcome of one tool call. `output` is itself a JSON envelope
/// `{"ok": bool, "result" | "error": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolErrorBody>,
}

impl ToolResult {
    pub fn ok(output: String) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(ToolErrorBody {
                message: message.into(),
            }),
        }
    }
}
