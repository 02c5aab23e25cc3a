use super::*;
use serde_json::json;
use std::fs;

// ===================================================================
// Test helpers
// ===================================================================

fn tool() -> (tempfile::TempDir, ProjectorTool) {
    let root = tempfile::tempdir().unwrap();
    let store = Store::new(root.path().join("strategies"), root.path().join("projects"));
    (root, ProjectorTool::new(store))
}

/// Run an operation that is expected to come back `ok: true` and return its
/// `result`.
fn call(tool: &ProjectorTool, input: Value) -> Value {
    let result = tool.execute(&input);
    assert!(result.success, "call failed: {:?}", result.error);
    let envelope: Value = serde_json::from_str(result.output.as_deref().unwrap()).unwrap();
    assert_eq!(envelope["ok"], true, "rejected: {envelope}");
    envelope["result"].clone()
}

/// Run an operation that is expected to be rejected and return the message.
fn rejection(tool: &ProjectorTool, input: Value) -> String {
    let result = tool.execute(&input);
    assert!(result.success, "expected a rejection, got failure: {:?}", result.error);
    let envelope: Value = serde_json::from_str(result.output.as_deref().unwrap()).unwrap();
    assert_eq!(envelope["ok"], false);
    envelope["error"].as_str().unwrap().to_string()
}

fn failure(tool: &ProjectorTool, input: Value) -> String {
    let result = tool.execute(&input);
    assert!(!result.success);
    result.error.unwrap().message
}

// ===================================================================
// Dispatch
// ===================================================================

#[test]
fn operation_names_round_trip() {
    for op in Operation::ALL {
        assert_eq!(Operation::parse(op.as_str()), Some(op));
    }
    assert_eq!(Operation::parse("drop_tables"), None);
}

#[test]
fn schema_lists_every_operation() {
    let schema = ProjectorTool::input_schema();
    let ops = schema["properties"]["operation"]["enum"].as_array().unwrap();
    assert_eq!(ops.len(), 13);
    assert_eq!(schema["required"], json!(["operation"]));
}

#[test]
fn missing_operation_fails() {
    let (_root, tool) = tool();
    assert_eq!(
        failure(&tool, json!({})),
        "Missing required parameter: operation"
    );
    assert_eq!(
        failure(&tool, json!({"operation": ""})),
        "Missing required parameter: operation"
    );
}

#[test]
fn unknown_operation_lists_valid_ones() {
    let (_root, tool) = tool();
    let message = failure(&tool, json!({"operation": "explode"}));
    assert!(message.starts_with("Unknown operation: \"explode\". Valid: list_projects"));
    assert!(message.contains("get_status"));
}

#[test]
fn malformed_arguments_fail() {
    let (_root, tool) = tool();
    let message = failure(&tool, json!({"operation": "create_project", "project": 7}));
    assert!(message.starts_with("Invalid input for create_project"));
}

#[test]
fn envelopes_are_pretty_on_success_and_compact_on_rejection() {
    let (_root, tool) = tool();
    let ok = tool.execute(&json!({"operation": "list_projects"}));
    assert_eq!(ok.output.as_deref(), Some("{\n  \"ok\": true,\n  \"result\": []\n}"));

    let rejected = tool.execute(&json!({"operation": "get_project", "project": "ghost"}));
    assert_eq!(
        rejected.output.as_deref(),
        Some(r#"{"ok":false,"error":"Project not found: ghost"}"#)
    );
}

// ===================================================================
// Projects
// ===================================================================

#[test]
fn create_then_list_and_get_project() {
    let (_root, tool) = tool();
    let created = call(
        &tool,
        json!({
            "operation": "create_project",
            "project": "My Big Project",
            "data": {"description": "Big.", "owner": "ops"}
        }),
    );
    assert_eq!(created["created"], "my-big-project");
    let project = &created["project"];
    assert_eq!(project["name"], "my-big-project");
    assert_eq!(project["title"], "my-big-project");
    assert_eq!(project["status"], "active");
    assert_eq!(project["owner"], "ops");
    assert_eq!(project["created"], project["updated"]);

    let listed = call(&tool, json!({"operation": "list_projects"}));
    assert_eq!(listed[0]["name"], "my-big-project");
    assert_eq!(listed[0]["status"], "active");

    let got = call(&tool, json!({"operation": "get_project", "project": "my-big-project"}));
    assert_eq!(got["project"]["description"], "Big.");
    assert_eq!(got["recent_outcomes"], json!([]));
    assert_eq!(got["tasks"], json!([]));
}

#[test]
fn duplicate_project_is_rejected() {
    let (_root, tool) = tool();
    call(&tool, json!({"operation": "create_project", "project": "alpha"}));
    assert_eq!(
        rejection(&tool, json!({"operation": "create_project", "project": "Alpha"})),
        "Project already exists: alpha"
    );
}

#[test]
fn update_project_protects_identity_fields() {
    let (_root, tool) = tool();
    let created = call(&tool, json!({"operation": "create_project", "project": "alpha"}));
    let updated = call(
        &tool,
        json!({
            "operation": "update_project",
            "project": "alpha",
            "data": {"name": "hijack", "created": "1970", "status": "paused", "lead": "kim"}
        }),
    );
    let project = &updated["project"];
    assert_eq!(updated["updated"], "alpha");
    assert_eq!(project["name"], "alpha");
    assert_eq!(project["created"], created["project"]["created"]);
    assert_eq!(project["status"], "paused");
    assert_eq!(project["lead"], "kim");
}

#[test]
fn update_project_rejections() {
    let (_root, tool) = tool();
    assert_eq!(
        rejection(&tool, json!({"operation": "update_project", "project": "alpha", "data": {}})),
        "No data provided for update"
    );
    assert_eq!(
        rejection(
            &tool,
            json!({"operation": "update_project", "project": "alpha", "data": {"status": "x"}})
        ),
        "Project not found: alpha"
    );
}

#[test]
fn traversal_names_fail_without_writing() {
    let (root, tool) = tool();
    let message = failure(
        &tool,
        json!({"operation": "create_project", "project": "../escape", "data": {"title": "x"}}),
    );
    assert!(message.contains(".."), "{message}");
    assert!(!root.path().join("projects").exists());
    assert!(!root.path().join("escape").exists());

    let message = failure(&tool, json!({"operation": "get_project", "project": "a/b"}));
    assert!(message.contains("a/b"), "{message}");
    failure(&tool, json!({"operation": "get_strategy", "strategy": "  "}));
    failure(&tool, json!({"operation": "get_strategy", "strategy": "!!!"}));
}

// ===================================================================
// Strategies
// ===================================================================

#[test]
fn set_strategy_creates_then_updates_keeping_injection() {
    let (_root, tool) = tool();
    let created = call(
        &tool,
        json!({
            "operation": "set_strategy",
            "strategy": "Careful Mode",
            "data": {"injection": "Double-check everything.", "owner": "me"}
        }),
    );
    assert_eq!(created["action"], "created");
    assert_eq!(created["strategy"]["name"], "careful-mode");
    assert_eq!(created["strategy"]["active"], true);

    let updated = call(
        &tool,
        json!({
            "operation": "set_strategy",
            "strategy": "careful-mode",
            "data": {"description": "Slower, safer."}
        }),
    );
    assert_eq!(updated["action"], "updated");
    let strategy = &updated["strategy"];
    assert_eq!(strategy["description"], "Slower, safer.");
    assert_eq!(strategy["injection"], "Double-check everything.");
    assert_eq!(strategy["owner"], "me");
    assert_eq!(strategy["created"], created["strategy"]["created"]);
}

#[test]
fn set_strategy_without_data_is_rejected() {
    let (_root, tool) = tool();
    assert_eq!(
        rejection(&tool, json!({"operation": "set_strategy", "strategy": "x"})),
        "No data provided for strategy"
    );
}

#[test]
fn set_strategy_with_wrongly_typed_field_fails() {
    let (_root, tool) = tool();
    let message = failure(
        &tool,
        json!({"operation": "set_strategy", "strategy": "x", "data": {"active": "sometimes"}}),
    );
    assert!(message.starts_with("Invalid strategy data"), "{message}");
}

#[test]
fn toggle_twice_restores_state() {
    let (_root, tool) = tool();
    call(
        &tool,
        json!({"operation": "set_strategy", "strategy": "focus", "data": {"title": "Focus"}}),
    );
    let first = call(&tool, json!({"operation": "toggle_strategy", "strategy": "focus"}));
    assert_eq!(first, json!({"name": "focus", "active": false, "changed_from": true}));
    let second = call(&tool, json!({"operation": "toggle_strategy", "strategy": "focus"}));
    assert_eq!(second, json!({"name": "focus", "active": true, "changed_from": false}));

    let got = call(&tool, json!({"operation": "get_strategy", "strategy": "focus"}));
    assert_eq!(got["active"], true);
    assert_eq!(got["title"], "Focus");
}

#[test]
fn list_strategies_uses_file_stems() {
    let (root, tool) = tool();
    let dir = root.path().join("strategies");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("zeta.yaml"), "name: ignored\nactive: false\n").unwrap();
    fs::write(dir.join("alpha.yaml"), "title: Alpha\n").unwrap();

    let listed = call(&tool, json!({"operation": "list_strategies"}));
    assert_eq!(listed[0]["name"], "alpha");
    assert_eq!(listed[0]["title"], "Alpha");
    assert_eq!(listed[0]["active"], true);
    assert_eq!(listed[1]["name"], "zeta");
    assert_eq!(listed[1]["title"], "zeta");
    assert_eq!(listed[1]["active"], false);
}

#[test]
fn missing_strategy_is_rejected() {
    let (_root, tool) = tool();
    assert_eq!(
        rejection(&tool, json!({"operation": "toggle_strategy", "strategy": "nope"})),
        "Strategy not found: nope"
    );
}

// ===================================================================
// Tasks and outcomes
// ===================================================================

#[test]
fn full_project_lifecycle() {
    let (_root, tool) = tool();
    call(&tool, json!({"operation": "create_project", "project": "my-big-project"}));

    let first = call(
        &tool,
        json!({"operation": "add_task", "project": "my-big-project", "data": {"title": "Design"}}),
    );
    assert_eq!(first["added"]["id"], "MBP-001");
    assert_eq!(first["added"]["status"], "todo");
    assert_eq!(first["added"]["priority"], "normal");

    let second = call(
        &tool,
        json!({
            "operation": "add_task",
            "project": "my-big-project",
            "data": {"title": "Build", "priority": "high"}
        }),
    );
    assert_eq!(second["added"]["id"], "MBP-002");

    let updated = call(
        &tool,
        json!({
            "operation": "update_task",
            "project": "my-big-project",
            "data": {"id": "MBP-001", "status": "done", "created": "never"}
        }),
    );
    assert_eq!(updated["updated"]["status"], "done");
    assert_eq!(updated["updated"]["created"], first["added"]["created"]);

    let logged = call(
        &tool,
        json!({
            "operation": "log_outcome",
            "project": "my-big-project",
            "data": {"summary": "Finished design", "tags": ["design"]}
        }),
    );
    assert_eq!(logged["logged"]["project"], "my-big-project");
    assert_eq!(logged["logged"]["session_id"], "");
    assert_eq!(logged["logged"]["tags"], json!(["design"]));
    assert_eq!(logged["logged"]["details"], "");

    let got = call(&tool, json!({"operation": "get_project", "project": "my-big-project"}));
    assert_eq!(got["tasks"].as_array().unwrap().len(), 2);
    assert_eq!(got["recent_outcomes"][0]["summary"], "Finished design");
}

#[test]
fn task_rejections() {
    let (_root, tool) = tool();
    assert_eq!(
        rejection(&tool, json!({"operation": "add_task", "project": "ghost", "data": {"title": "t"}})),
        "Project not found: ghost"
    );
    call(&tool, json!({"operation": "create_project", "project": "real"}));
    assert_eq!(
        rejection(&tool, json!({"operation": "add_task", "project": "real", "data": {"title": ""}})),
        "Task requires a 'title' in data"
    );
    assert_eq!(
        rejection(&tool, json!({"operation": "update_task", "project": "real", "data": {}})),
        "Task update requires 'id' in data"
    );
    assert_eq!(
        rejection(
            &tool,
            json!({"operation": "update_task", "project": "real", "data": {"id": "REA-404"}})
        ),
        "Task not found: REA-404"
    );
    assert_eq!(
        rejection(&tool, json!({"operation": "log_outcome", "project": "real", "data": {}})),
        "Outcome requires a 'summary' in data"
    );
}

#[test]
fn list_tasks_tags_projects_and_filters() {
    let (_root, tool) = tool();
    for project in ["beta", "alpha"] {
        call(&tool, json!({"operation": "create_project", "project": project}));
    }
    call(
        &tool,
        json!({"operation": "add_task", "project": "beta", "data": {"title": "Write docs"}}),
    );
    call(
        &tool,
        json!({
            "operation": "add_task",
            "project": "alpha",
            "data": {"title": "Fix login", "status": "blocked"}
        }),
    );

    let all = call(&tool, json!({"operation": "list_tasks"}));
    let projects: Vec<&str> = all
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["project"].as_str().unwrap())
        .collect();
    assert_eq!(projects, ["alpha", "beta"]);

    let blocked = call(&tool, json!({"operation": "list_tasks", "query": "BLOCK"}));
    assert_eq!(blocked.as_array().unwrap().len(), 1);
    assert_eq!(blocked[0]["title"], "Fix login");

    let by_title = call(&tool, json!({"operation": "list_tasks", "query": "docs"}));
    assert_eq!(by_title[0]["project"], "beta");

    let one = call(&tool, json!({"operation": "list_tasks", "project": "beta"}));
    assert_eq!(one.as_array().unwrap().len(), 1);

    assert_eq!(
        rejection(&tool, json!({"operation": "list_tasks", "project": "gamma"})),
        "Project not found: gamma"
    );
}

/// Project `pp` (task prefix `PP`) with a hand-edited task list.
fn hand_edited(root: &std::path::Path) -> std::path::PathBuf {
    let dir = root.join("projects/pp");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("project.yaml"), "name: pp\ntitle: 2024\n").unwrap();
    fs::write(
        dir.join("tasks.yaml"),
        "tasks:\n- id: PP-005\n  title: hand edited\n  status: todo\n  priority: 1\n",
    )
    .unwrap();
    dir.join("tasks.yaml")
}

fn stored_tasks(path: &std::path::Path) -> Vec<Value> {
    let doc: Value = serde_yaml::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    doc["tasks"].as_array().unwrap().clone()
}

#[test]
fn add_task_keeps_hand_edited_entries() {
    let (root, tool) = tool();
    let path = hand_edited(root.path());

    let added = call(
        &tool,
        json!({"operation": "add_task", "project": "pp", "data": {"title": "New"}}),
    );
    assert_eq!(added["added"]["id"], "PP-006");

    let tasks = stored_tasks(&path);
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0]["id"], "PP-005");
    assert_eq!(tasks[0]["priority"], 1);
    assert_eq!(tasks[1]["id"], "PP-006");
}

#[test]
fn update_task_touches_only_its_entry() {
    let (root, tool) = tool();
    let path = hand_edited(root.path());
    call(&tool, json!({"operation": "add_task", "project": "pp", "data": {"title": "New"}}));

    let updated = call(
        &tool,
        json!({"operation": "update_task", "project": "pp", "data": {"id": "PP-005", "status": "done"}}),
    );
    assert_eq!(updated["updated"]["status"], "done");
    assert_eq!(updated["updated"]["priority"], 1);

    let tasks = stored_tasks(&path);
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0]["status"], "done");
    assert_eq!(tasks[0]["priority"], 1);
    assert_eq!(tasks[1]["title"], "New");
}

#[test]
fn unparseable_task_file_is_never_overwritten() {
    let (root, tool) = tool();
    let path = hand_edited(root.path());
    fs::write(&path, "tasks: [unclosed\n").unwrap();

    let message = failure(
        &tool,
        json!({"operation": "add_task", "project": "pp", "data": {"title": "New"}}),
    );
    assert!(message.starts_with("Unexpected error in add_task"), "{message}");
    assert_eq!(fs::read_to_string(&path).unwrap(), "tasks: [unclosed\n");
}

#[test]
fn loosely_typed_records_stay_visible() {
    let (root, tool) = tool();
    hand_edited(root.path());

    let listed = call(&tool, json!({"operation": "list_projects"}));
    assert_eq!(listed[0]["name"], "pp");
    assert_eq!(listed[0]["title"], "2024");

    let tasks = call(&tool, json!({"operation": "list_tasks", "project": "pp"}));
    assert_eq!(tasks[0]["id"], "PP-005");

    let status = call(&tool, json!({"operation": "get_status"}));
    assert_eq!(status["projects"][0]["task_counts"], json!({"todo": 1}));
}

#[test]
fn toggle_without_active_key_deactivates() {
    let (root, tool) = tool();
    let dir = root.path().join("strategies");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("implicit.yaml"), "injection: Be brief.\nowner: me\n").unwrap();

    let toggled = call(&tool, json!({"operation": "toggle_strategy", "strategy": "implicit"}));
    assert_eq!(toggled, json!({"name": "implicit", "active": false, "changed_from": true}));

    let stored = fs::read_to_string(dir.join("implicit.yaml")).unwrap();
    assert!(stored.contains("active: false"), "{stored}");
    assert!(stored.contains("owner: me"), "{stored}");
}

// ===================================================================
// Status
// ===================================================================

#[test]
fn status_reports_counts_and_attention() {
    let (root, tool) = tool();
    call(&tool, json!({"operation": "create_project", "project": "idle"}));
    call(&tool, json!({"operation": "create_project", "project": "stuck"}));
    for (title, status) in [("A", "blocked"), ("B", "blocked"), ("C", "todo")] {
        call(
            &tool,
            json!({
                "operation": "add_task",
                "project": "stuck",
                "data": {"title": title, "status": status}
            }),
        );
    }
    call(
        &tool,
        json!({"operation": "set_strategy", "strategy": "on", "data": {"title": "On"}}),
    );
    call(
        &tool,
        json!({"operation": "set_strategy", "strategy": "off", "data": {"active": false}}),
    );

    // Outcomes with fixed timestamps so ordering is deterministic.
    let write_outcome = |slug: &str, ts: &str| {
        let path = root.path().join("projects").join(slug).join("outcomes.jsonl");
        let line = json!({"timestamp": ts, "session_id": "", "project": slug, "summary": ts});
        fs::write(path, format!("{line}\n")).unwrap();
    };
    write_outcome("idle", "2026-01-01T00:00:00+00:00");
    write_outcome("stuck", "2026-03-01T00:00:00+00:00");

    let status = call(&tool, json!({"operation": "get_status"}));

    let projects = status["projects"].as_array().unwrap();
    assert_eq!(projects[0]["name"], "idle");
    assert_eq!(projects[0]["task_counts"], json!({}));
    assert_eq!(projects[0]["outcome_count"], 1);
    assert_eq!(projects[1]["task_counts"], json!({"blocked": 2, "todo": 1}));

    assert_eq!(status["strategies"]["active"], 1);
    assert_eq!(status["strategies"]["inactive"], 1);
    assert_eq!(
        status["strategies"]["list"],
        json!([{"name": "off", "active": false}, {"name": "on", "active": true}])
    );

    let attention = status["attention"].as_array().unwrap();
    assert_eq!(attention.len(), 2);
    assert_eq!(attention[0]["signal"], "active_no_tasks");
    assert_eq!(attention[0]["project"], "idle");
    assert_eq!(attention[1]["signal"], "blocked_tasks");
    assert_eq!(
        attention[1]["message"],
        "Project 'stuck' has 2 blocked task(s): STU-001, STU-002."
    );

    let recent = status["recent_outcomes"].as_array().unwrap();
    assert_eq!(recent[0]["project"], "stuck");
    assert_eq!(recent[1]["project"], "idle");
}

#[test]
fn status_of_empty_store() {
    let (_root, tool) = tool();
    let status = call(&tool, json!({"operation": "get_status"}));
    assert_eq!(status["projects"], json!([]));
    assert_eq!(status["attention"], json!([]));
    assert_eq!(status["strategies"]["list"], json!([]));
}
