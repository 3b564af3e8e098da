/// End-to-end tests driving the trellis binary against a temporary database
use anyhow::Result;
use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const PROJECT: &str = "harbor-view";

struct Workspace {
    home: TempDir,
    db: PathBuf,
    tasks: PathBuf,
}

impl Workspace {
    fn new() -> Result<Self> {
        let home = TempDir::new()?;
        let db = home.path().join("trellis.db");
        let tasks = home.path().join("tasks.json");
        fs::write(
            &tasks,
            r#"[
                {"id": "T1", "name": "Site survey", "status": "Completed"},
                {"id": "T2", "name": "Excavation", "description": "Dig to footing depth"},
                {"id": "T3", "name": "Foundation pour", "priority": "High"},
                {"id": "T4", "name": "Framing", "status": "In Progress"}
            ]"#,
        )?;
        Ok(Workspace { home, db, tasks })
    }

    fn command(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("trellis");
        cmd.env("HOME", self.home.path())
            .env("NO_COLOR", "1")
            .env("CLICOLOR", "0")
            .env_remove("RUST_LOG")
            .env_remove("TRELLIS_DB_PATH")
            .arg("--db")
            .arg(&self.db);
        cmd
    }

    fn tasks_arg(&self) -> String {
        self.tasks.to_string_lossy().to_string()
    }

    fn link(&self, from: &str, to: &str, condition: Option<&str>) -> Result<String> {
        let tasks = self.tasks_arg();
        let mut cmd = self.command();
        cmd.args(["deps", "link", "-p", PROJECT, "-t", &tasks, "--from", from, "--to", to]);
        if let Some(condition) = condition {
            cmd.args(["--condition", condition]);
        }
        let output = cmd.output()?;
        assert!(output.status.success(), "link failed: {:?}", output);
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn json(&self, args: &[&str]) -> Result<Value> {
        let output = self.command().args(args).output()?;
        assert!(output.status.success(), "command failed: {:?}", output);
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

fn names(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn init_creates_config_and_database() -> Result<()> {
    let ws = Workspace::new()?;

    let output = ws.command().arg("init").output()?;
    assert!(output.status.success(), "init failed: {:?}", output);

    assert!(ws.db.exists(), "database should exist at {}", ws.db.display());
    let config = ws.home.path().join(".trellis").join("config.toml");
    assert!(config.exists(), "config should exist at {}", config.display());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Migrations: 2"), "got: {stdout}");
    Ok(())
}

#[test]
fn config_loading_is_logged() -> Result<()> {
    let ws = Workspace::new()?;

    let output = ws.command().arg("init").output()?;
    assert!(output.status.success(), "init failed: {:?}", output);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Config file not found"), "got: {stderr}");

    // Second run finds the file written by init
    let output = ws.command().arg("init").output()?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Loading config from"), "got: {stderr}");
    Ok(())
}

#[test]
fn link_analyze_and_unlink_flow() -> Result<()> {
    let ws = Workspace::new()?;
    let tasks = ws.tasks_arg();

    ws.command().arg("init").assert().success();

    let first = ws.link("T1", "T2", None)?;
    assert!(
        first.contains("Task workflow saved with 1 task dependencies."),
        "got: {first}"
    );
    ws.link("T2", "T3", Some("soil report approved"))?;
    ws.link("T3", "T4", None)?;
    ws.link("T1", "T4", None)?;

    let analysis = ws.json(&["analyze", "-p", PROJECT, "-t", &tasks, "--format", "json"])?;
    assert_eq!(analysis["project"], PROJECT);
    assert_eq!(names(&analysis["critical_path"]), ["T1", "T2", "T3", "T4"]);
    assert_eq!(analysis["statistics"]["edge_count"], 4);
    assert_eq!(analysis["statistics"]["conditional_edge_count"], 1);
    assert_eq!(analysis["parallel_groups"].as_array().map(Vec::len), Some(4));

    let listed = ws.json(&["deps", "list", "-p", PROJECT, "--format", "json"])?;
    let rows = listed.as_array().cloned().unwrap_or_default();
    assert_eq!(rows.len(), 4);
    let conditional: Vec<&Value> = rows.iter().filter(|r| r["kind"] == "conditional").collect();
    assert_eq!(conditional.len(), 1);
    assert_eq!(conditional[0]["condition"], "soil report approved");

    let output = ws
        .command()
        .args(["deps", "unlink", "-p", PROJECT, "-t", &tasks, "--from", "T2", "--to", "T3"])
        .output()?;
    assert!(output.status.success(), "unlink failed: {:?}", output);

    let analysis = ws.json(&["analyze", "-p", PROJECT, "-t", &tasks, "--format", "json"])?;
    assert_eq!(analysis["statistics"]["edge_count"], 3);
    // T1 -> T2 and T3 -> T4 tie; the earlier root wins
    assert_eq!(names(&analysis["critical_path"]), ["T1", "T2"]);
    Ok(())
}

#[test]
fn layout_places_nodes_by_depth() -> Result<()> {
    let ws = Workspace::new()?;
    let tasks = ws.tasks_arg();

    ws.link("T1", "T2", None)?;
    ws.link("T2", "T3", None)?;

    let views = ws.json(&["layout", "-p", PROJECT, "-t", &tasks, "--auto", "--format", "json"])?;
    let views = views.as_array().cloned().unwrap_or_default();
    assert_eq!(views.len(), 4);

    let x_of = |id: &str| {
        views
            .iter()
            .find(|v| v["task_id"] == id)
            .and_then(|v| v["position"]["x"].as_f64())
    };
    assert_eq!(x_of("T1"), Some(100.0));
    assert_eq!(x_of("T2"), Some(380.0));
    assert_eq!(x_of("T3"), Some(660.0));
    // Unconnected tasks sit at the first level
    assert_eq!(x_of("T4"), Some(100.0));

    let critical: Vec<&Value> = views.iter().filter(|v| v["critical"] == true).collect();
    assert_eq!(critical.len(), 3);
    Ok(())
}

#[test]
fn rejects_unknown_tasks_and_missing_dependencies() -> Result<()> {
    let ws = Workspace::new()?;
    let tasks = ws.tasks_arg();

    let output = ws
        .command()
        .args(["deps", "link", "-p", PROJECT, "-t", &tasks, "--from", "T1", "--to", "T9"])
        .output()?;
    assert!(!output.status.success(), "linking an unknown task should fail");

    let output = ws
        .command()
        .args(["deps", "link", "-p", PROJECT, "-t", &tasks, "--from", "T1", "--to", "T1"])
        .output()?;
    assert!(!output.status.success(), "self dependency should fail");

    let output = ws
        .command()
        .args(["deps", "unlink", "-p", PROJECT, "-t", &tasks, "--from", "T1", "--to", "T2"])
        .output()?;
    assert!(!output.status.success(), "unlinking a missing dependency should fail");

    let listed = ws.json(&["deps", "list", "-p", PROJECT, "--format", "json"])?;
    assert_eq!(listed.as_array().map(Vec::len), Some(0));
    Ok(())
}

#[test]
fn projects_are_isolated() -> Result<()> {
    let ws = Workspace::new()?;
    let tasks = ws.tasks_arg();
    ws.link("T1", "T2", None)?;

    let other = ws.json(&["analyze", "-p", "other-site", "-t", &tasks, "--format", "json"])?;
    assert_eq!(other["statistics"]["edge_count"], 0);
    assert_eq!(names(&other["critical_path"]).len(), 1);
    Ok(())
}
