//! Lifecycle hooks that bridge the store into a live agent session.
//!
//! `provider:request` attaches active strategies and the detected project's
//! state to the next request as ephemeral user-role context. The block is
//! built on the first qualifying request and reused for the rest of the
//! session. `session:end` appends a best-effort outcome record to the
//! detected project's log.
//!
//! Neither handler ever fails: problems are logged and the host is told to
//! continue.

use crate::config::{Config, SessionFilter};
use crate::context::build_context;
use crate::records::{now_iso, Outcome};
use crate::resolver::detect_project;
use crate::store::Store;
use crate::types::{HookResult, RequestData, SessionEndData, PROVIDER_REQUEST, SESSION_END};
use anyhow::{Context, Result};
use minijinja::{context, Environment};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

pub const HOOK_PRIORITY: i32 = 50;

/// Callback invoked with an event's data payload.
pub type HookHandler = Box<dyn FnMut(&Value) -> HookResult>;

/// Handler registration offered by the host, keyed by event name.
pub trait HookRegistry {
    fn register(&mut self, event: &str, priority: i32, name: &str, handler: HookHandler);
}

/// Session facts the host exposes at mount time.
#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    pub session_id: Option<String>,
    pub working_dir: Option<String>,
    /// Set for sub-agent sessions.
    pub parent_id: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Deserialize event data, treating an absent payload as all defaults.
fn parse_data<T: DeserializeOwned + Default>(data: &Value) -> Result<T> {
    if data.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(data.clone()).context("parsing event data")
}

/// Build a minimal summary from the session's title and topic.
pub fn derive_summary(title: Option<&str>, topic: Option<&str>) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    if let Some(title) = title.filter(|t| !t.is_empty()) {
        parts.push(title);
    }
    if let Some(topic) = topic.filter(|t| !t.is_empty()) {
        if Some(topic) != title {
            parts.push(topic);
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" - "))
    }
}

fn task_list(value: &Value) -> Value {
    if value.is_null() {
        Value::Array(Vec::new())
    } else {
        value.clone()
    }
}

/// Assemble the outcome record for a finished session (pure).
pub fn build_outcome(
    data: &SessionEndData,
    session: &SessionInfo,
    project: &str,
    timestamp: String,
) -> Outcome {
    let session_id = non_empty(&data.session_id)
        .or_else(|| non_empty(&session.session_id))
        .unwrap_or("")
        .to_string();

    let summary = match non_empty(&data.summary) {
        Some(s) => s.to_string(),
        None => derive_summary(data.title.as_deref(), data.topic.as_deref()).unwrap_or_else(
            || {
                if session_id.is_empty() {
                    "(no summary)".to_string()
                } else {
                    let short: String = session_id.chars().take(8).collect();
                    format!("Session {short}...")
                }
            },
        ),
    };

    Outcome {
        timestamp,
        session_id,
        project: project.to_string(),
        summary,
        tasks_completed: Some(task_list(&data.tasks_completed)),
        tasks_created: Some(task_list(&data.tasks_created)),
        ..Default::default()
    }
}

pub struct ProjectorHook {
    store: Store,
    filter: SessionFilter,
    max_recent_outcomes: usize,
    template: String,
    session: SessionInfo,
    /// Built on the first qualifying request; an empty string means
    /// "nothing to inject" and is cached too.
    cached_injection: Option<String>,
}

impl ProjectorHook {
    pub fn new(config: &Config, session: SessionInfo) -> Self {
        let template = config.load_injection_template().unwrap_or_else(|e| {
            tracing::warn!(error = %format!("{e:#}"), "falling back to default injection template");
            Config::defaults_at(&config.base_path)
                .load_injection_template()
                .unwrap_or_default()
        });
        Self {
            store: config.store(),
            filter: config.session_filter,
            max_recent_outcomes: config.max_recent_outcomes,
            template,
            session,
            cached_injection: None,
        }
    }

    /// Root sessions have no parent, either from the mount-time session
    /// facts or from the event itself.
    fn is_root_session(&self, event_parent: &Option<String>) -> bool {
        if self.filter != SessionFilter::RootOnly {
            return true;
        }
        non_empty(&self.session.parent_id).is_none() && non_empty(event_parent).is_none()
    }

    fn working_dir(&self) -> &str {
        non_empty(&self.session.working_dir).unwrap_or("")
    }

    fn render_injection(&self, context_text: &str) -> Result<String> {
        let env = Environment::new();
        let tmpl = env
            .template_from_str(&self.template)
            .context("parsing injection template")?;
        tmpl.render(context! { context => context_text })
            .context("rendering injection template")
    }

    // ---------------------------------------------------------------
    // Event handlers
    // ---------------------------------------------------------------

    pub fn on_provider_request(&mut self, data: &Value) -> HookResult {
        let request: RequestData = match parse_data(data) {
            Ok(request) => request,
            // Without readable data there is no telling whether this is a
            // child session, so the root-only filter skips it.
            Err(e) if self.filter == SessionFilter::RootOnly => {
                tracing::debug!(error = %format!("{e:#}"), "projector: unusable provider:request data");
                return HookResult::proceed();
            }
            Err(_) => RequestData::default(),
        };
        if !self.is_root_session(&request.parent_id) {
            return HookResult::proceed();
        }

        if self.cached_injection.is_none() {
            let built = build_context(&self.store, self.working_dir(), self.max_recent_outcomes);
            let injection = if built.is_empty() {
                String::new()
            } else {
                self.render_injection(&built).unwrap_or_else(|e| {
                    tracing::warn!(error = %format!("{e:#}"), "projector: injection render failed");
                    String::new()
                })
            };
            self.cached_injection = Some(injection);
        }

        match self.cached_injection.as_deref() {
            Some(text) if !text.is_empty() => HookResult::inject(text.to_string()),
            _ => HookResult::proceed(),
        }
    }

    pub fn on_session_end(&self, data: &Value) -> HookResult {
        let end: SessionEndData = match parse_data(data) {
            Ok(end) => end,
            Err(e) => {
                tracing::debug!(error = %format!("{e:#}"), "projector: unusable session:end data");
                return HookResult::proceed();
            }
        };
        if !self.is_root_session(&end.parent_id) {
            return HookResult::proceed();
        }
        if let Err(e) = self.capture_outcome(&end) {
            tracing::warn!(error = %format!("{e:#}"), "projector: outcome capture failed");
        }
        HookResult::proceed()
    }

    fn capture_outcome(&self, end: &SessionEndData) -> Result<()> {
        let working_dir = non_empty(&end.working_dir).unwrap_or(self.working_dir());
        let Some(entry) = detect_project(&self.store, working_dir) else {
            tracing::debug!(working_dir = %working_dir, "projector: no project for session, outcome skipped");
            return Ok(());
        };
        let outcome = build_outcome(end, &self.session, &entry.slug, now_iso());
        self.store.append_outcome(&entry.slug, &outcome)
    }
}

/// Register the projector's handlers with the host.
pub fn mount(registry: &mut dyn HookRegistry, config: &Config, session: SessionInfo) {
    let hook = Rc::new(RefCell::new(ProjectorHook::new(config, session)));

    let on_request = Rc::clone(&hook);
    registry.register(
        PROVIDER_REQUEST,
        HOOK_PRIORITY,
        "hooks-projector",
        Box::new(move |data| on_request.borrow_mut().on_provider_request(data)),
    );

    let on_end = Rc::clone(&hook);
    registry.register(
        SESSION_END,
        HOOK_PRIORITY,
        "hooks-projector-end",
        Box::new(move |data| on_end.borrow().on_session_end(data)),
    );
}
