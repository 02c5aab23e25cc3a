#![allow(dead_code)]

use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// Run the binary with `args` against `base`, feeding `stdin`. Returns
/// `(exit code, stdout, stderr)`.
pub fn run_cli(base: &Path, args: &[&str], stdin: &str) -> (i32, String, String) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_projector"))
        .arg("--base-path")
        .arg(base)
        .args(args)
        .env_remove("PROJECTOR_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn binary");

    child
        .stdin
        .as_mut()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();

    let output = child.wait_with_output().unwrap();
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

/// Run one tool call and return the parsed `ToolResult`.
pub fn run_tool(base: &Path, input: &Value) -> Value {
    let (code, stdout, stderr) = run_cli(base, &["tool"], &input.to_string());
    assert_eq!(code, 0, "stderr: {stderr}");
    serde_json::from_str(stdout.trim()).unwrap()
}

/// Run one tool call that must succeed and return the envelope's `result`.
pub fn tool_ok(base: &Path, input: &Value) -> Value {
    let result = run_tool(base, input);
    assert_eq!(result["success"], true, "{result}");
    let envelope: Value = serde_json::from_str(result["output"].as_str().unwrap()).unwrap();
    assert_eq!(envelope["ok"], true, "{envelope}");
    envelope["result"].clone()
}

/// A fresh session id, shaped like the ones hosts hand out.
pub fn session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Create a git repo at `dir` with an `origin` remote.
pub fn git_repo_with_origin(dir: &Path, url: &str) {
    fs::create_dir_all(dir).unwrap();
    let repo = git2::Repository::init(dir).unwrap();
    repo.remote("origin", url).unwrap();
}

/// Seed a project directory with a `project.yaml`.
pub fn write_project(base: &Path, slug: &str, yaml: &str) {
    let dir = base.join("projects").join(slug);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("project.yaml"), yaml).unwrap();
}

/// Seed a strategy file.
pub fn write_strategy(base: &Path, name: &str, yaml: &str) {
    let dir = base.join("strategies");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{name}.yaml")), yaml).unwrap();
}

/// Parsed lines of a project's outcome log (empty if there is none).
pub fn outcome_lines(base: &Path, slug: &str) -> Vec<Value> {
    let path = base.join("projects").join(slug).join("outcomes.jsonl");
    match fs::read_to_string(path) {
        Ok(s) => s.lines().map(|l| serde_json::from_str(l).unwrap()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Build a newline-delimited hook event stream.
pub fn event_stream(events: &[Value]) -> String {
    events.iter().map(|e| format!("{e}\n")).collect()
}
