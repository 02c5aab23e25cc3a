use crate::records::{Outcome, Project, Strategy, Task};
use crate::resolver::detect_project;
use crate::store::Store;

// ===================================================================
// Input: everything read from disk, gathered before rendering
// ===================================================================

/// State of the project detected for the working directory.
#[derive(Debug, Clone, Default)]
pub struct ProjectState {
    pub slug: String,
    pub project: Project,
    /// Most recent outcomes, oldest first.
    pub outcomes: Vec<Outcome>,
    /// Tasks whose status isn't `done`, in file order.
    pub active_tasks: Vec<Task>,
}

#[derive(Debug, Clone, Default)]
pub struct ContextInputs {
    /// Surfaced strategies (active, with injection text), in stem order.
    pub strategies: Vec<Strategy>,
    pub project: Option<ProjectState>,
}

/// Read strategies and the detected project's state from the store.
pub fn gather(store: &Store, working_dir: &str, max_recent_outcomes: usize) -> ContextInputs {
    let strategies = store
        .strategies()
        .into_iter()
        .map(|(_, strategy)| strategy)
        .filter(Strategy::is_surfaced)
        .collect();

    let project = detect_project(store, working_dir).map(|entry| ProjectState {
        outcomes: store.outcomes(&entry.slug, Some(max_recent_outcomes)),
        active_tasks: store
            .tasks(&entry.slug)
            .into_iter()
            .filter(|t| !t.is_done())
            .collect(),
        slug: entry.slug,
        project: entry.project,
    });

    ContextInputs { strategies, project }
}

// ===================================================================
// Rendering (pure)
// ===================================================================

fn render_strategies(strategies: &[Strategy]) -> Option<String> {
    if strategies.is_empty() {
        return None;
    }
    let mut lines = vec!["## Active Strategies".to_string(), String::new()];
    for strategy in strategies {
        let name = if strategy.name.is_empty() {
            "Unnamed"
        } else {
            strategy.name.as_str()
        };
        lines.push(format!("### {name}"));
        lines.push(strategy.injection.trim().to_string());
        lines.push(String::new());
    }
    Some(lines.join("\n"))
}

fn render_project(state: &ProjectState) -> String {
    let project = &state.project;
    let title = if project.title.is_empty() {
        state.slug.as_str()
    } else {
        project.title.as_str()
    };
    let mut lines = vec![format!("## Current Project: {title}"), String::new()];

    let description = project.description.trim();
    if !description.is_empty() {
        lines.push(description.to_string());
        lines.push(String::new());
    }

    let notes = project.notes.trim();
    if !notes.is_empty() {
        lines.push(format!("**Notes:** {notes}"));
        lines.push(String::new());
    }

    lines.join("\n")
}

fn render_outcomes(outcomes: &[Outcome]) -> Option<String> {
    if outcomes.is_empty() {
        return None;
    }
    let mut lines = vec!["## Recent Session Outcomes".to_string(), String::new()];
    for outcome in outcomes {
        let timestamp = if outcome.timestamp.is_empty() {
            "?"
        } else {
            outcome.timestamp.as_str()
        };
        let summary = if outcome.summary.is_empty() {
            "(no summary)"
        } else {
            outcome.summary.as_str()
        };
        lines.push(format!("- **{timestamp}**: {summary}"));
    }
    lines.push(String::new());
    Some(lines.join("\n"))
}

fn task_title(task: &Task) -> &str {
    if !task.title.is_empty() {
        return &task.title;
    }
    task.extra
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("(untitled)")
}

fn render_tasks(tasks: &[Task]) -> Option<String> {
    if tasks.is_empty() {
        return None;
    }
    let mut lines = vec!["## Active Tasks".to_string(), String::new()];
    for task in tasks {
        let title = task_title(task);
        if task.status.is_empty() {
            lines.push(format!("- {title}"));
        } else {
            lines.push(format!("- {title} [{}]", task.status));
        }
    }
    lines.push(String::new());
    Some(lines.join("\n"))
}

/// Render the context block. An empty string means "inject nothing".
pub fn render(inputs: &ContextInputs) -> String {
    let mut sections: Vec<String> = Vec::new();
    sections.extend(render_strategies(&inputs.strategies));
    if let Some(state) = &inputs.project {
        sections.push(render_project(state));
        sections.extend(render_outcomes(&state.outcomes));
        sections.extend(render_tasks(&state.active_tasks));
    }
    sections.join("\n").trim().to_string()
}

/// Gather and render in one step.
pub fn build_context(store: &Store, working_dir: &str, max_recent_outcomes: usize) -> String {
    render(&gather(store, working_dir, max_recent_outcomes))
}
