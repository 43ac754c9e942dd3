use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use serde_json::Value;
use tempfile::TempDir;

const CONFIG: &str = "\
alert_interval_secs: 30
local_users:
  - email: ana@fazenda.com
    password: gerente123
    name: Ana
    role: manager
  - email: joao@fazenda.com
    password: campo123
    name: João
    role: worker
";

fn rebanho_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_rebanho"));
    cmd.current_dir(dir)
        .env_remove("REBANHO_REMOTE_URL")
        .env_remove("REBANHO_REMOTE_KEY")
        .env("RUST_LOG", "off");
    cmd
}

fn run(dir: &Path, args: &[&str]) -> Output {
    rebanho_cmd(dir).args(args).output().unwrap()
}

fn run_with_stdin(dir: &Path, args: &[&str], input: &str) -> Output {
    let mut child = rebanho_cmd(dir)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn json(output: &Output) -> Value {
    assert!(output.status.success(), "command failed: {}", stderr(output));
    serde_json::from_slice(&output.stdout).unwrap()
}

fn login(dir: &Path, email: &str, password: &str) -> Output {
    run_with_stdin(dir, &["login", email, "--password-stdin"], &format!("{}\n", password))
}

/// Initialized project with local users, signed in as `email`.
fn project(email: &str, password: &str) -> TempDir {
    let tmp = TempDir::new().unwrap();
    assert!(run(tmp.path(), &["init"]).status.success());
    std::fs::write(tmp.path().join(".rebanho/config.yaml"), CONFIG).unwrap();

    let output = login(tmp.path(), email, password);
    assert!(output.status.success(), "login failed: {}", stderr(&output));
    tmp
}

#[test]
fn test_init_creates_rebanho_directory() {
    let tmp = TempDir::new().unwrap();
    let output = run(tmp.path(), &["init"]);

    assert!(output.status.success());
    assert!(tmp.path().join(".rebanho").exists());
    assert!(tmp.path().join(".rebanho/rebanho.db").exists());
    assert!(tmp.path().join(".rebanho/config.yaml").exists());
    assert!(stdout(&output).contains("local"));
}

#[test]
fn test_init_twice_fails() {
    let tmp = TempDir::new().unwrap();
    run(tmp.path(), &["init"]);

    let output = run(tmp.path(), &["init"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Already initialized"));
}

#[test]
fn test_commands_without_init_fail() {
    let tmp = TempDir::new().unwrap();
    let output = run(tmp.path(), &["tasks", "list"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Not in a rebanho project"));
}

#[test]
fn test_commands_require_login() {
    let tmp = TempDir::new().unwrap();
    run(tmp.path(), &["init"]);

    let output = run(tmp.path(), &["tasks", "list"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Not signed in"));
}

#[test]
fn test_wrong_password_is_reported() {
    let tmp = TempDir::new().unwrap();
    run(tmp.path(), &["init"]);
    std::fs::write(tmp.path().join(".rebanho/config.yaml"), CONFIG).unwrap();

    let output = login(tmp.path(), "ana@fazenda.com", "errada");
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Email ou senha incorretos."));
}

#[test]
fn test_weekly_task_workflow() {
    let tmp = project("joao@fazenda.com", "campo123");
    let dir = tmp.path();

    let created = json(&run(
        dir,
        &[
            "tasks",
            "add",
            "Dip bath",
            "--category=sanidade",
            "--date=2025-03-10",
            "--repeat=weekly",
            "--weekday=1,3,5",
            "--animal=OV-1,OV-2",
            "--json",
        ],
    ));
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["animal_ids"].as_array().unwrap().len(), 2);

    let completion = json(&run(dir, &["tasks", "complete", &id[..8], "--notes=ok", "--json"]));
    assert_eq!(completion["completed"]["status"], "done");
    assert_eq!(completion["completed"]["executed_by"], "João");
    assert_eq!(completion["next"]["planned_date"], "2025-03-12");
    assert_eq!(completion["next"]["recurrence"]["count"], 1);

    let pending = json(&run(dir, &["tasks", "list", "--pending", "--json"]));
    let pending = pending.as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["title"], "Dip bath");

    let all = json(&run(dir, &["tasks", "list", "--json"]));
    assert_eq!(all.as_array().unwrap().len(), 2);

    let output = run(dir, &["tasks", "complete", &id, "--json"]);
    assert!(!output.status.success());
}

#[test]
fn test_task_edit_and_delete() {
    let tmp = project("ana@fazenda.com", "gerente123");
    let dir = tmp.path();

    let created = json(&run(dir, &["tasks", "add", "Pesagem", "--date=10/03/2025", "--json"]));
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["planned_date"], "2025-03-10");

    let edited = json(&run(
        dir,
        &["tasks", "edit", &id, "--date=2025-03-14", "--group=Matrizes", "--json"],
    ));
    assert_eq!(edited["planned_date"], "2025-03-14");
    assert_eq!(edited["group"], "Matrizes");
    assert_eq!(edited["edited_by_manager"], true);

    let output = run(dir, &["tasks", "delete", &id]);
    assert!(!output.status.success(), "non-interactive delete needs --force");

    let output = run(dir, &["tasks", "delete", &id, "--force"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Deleted task"));

    let all = json(&run(dir, &["tasks", "list", "--json"]));
    assert!(all.as_array().unwrap().is_empty());
}

#[test]
fn test_notice_workflow() {
    let tmp = project("joao@fazenda.com", "campo123");
    let dir = tmp.path();

    let output = run(dir, &["notices", "post", "Portão quebrado", "-m", "Não usar o curral 2"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Apenas gerentes"));

    assert!(login(dir, "ana@fazenda.com", "gerente123").status.success());
    let notice = json(&run(
        dir,
        &["notices", "post", "Portão quebrado", "-m", "Não usar o curral 2", "--priority=urgent", "--json"],
    ));
    let id = notice["id"].as_str().unwrap().to_string();

    assert!(login(dir, "joao@fazenda.com", "campo123").status.success());
    let unconfirmed = json(&run(dir, &["notices", "list", "--unconfirmed", "--json"]));
    assert_eq!(unconfirmed.as_array().unwrap().len(), 1);

    let output = run(dir, &["notices", "confirm", &id[..8]]);
    assert!(stdout(&output).contains("Confirmed notice"));
    let output = run(dir, &["notices", "confirm", &id[..8]]);
    assert!(stdout(&output).contains("Already confirmed"));

    let notices = json(&run(dir, &["notices", "list", "--json"]));
    let confirmations = notices[0]["confirmations"].as_array().unwrap();
    assert_eq!(confirmations.len(), 1);
    assert_eq!(confirmations[0]["user"], "joao@fazenda.com");

    let unconfirmed = json(&run(dir, &["notices", "list", "--unconfirmed", "--json"]));
    assert!(unconfirmed.as_array().unwrap().is_empty());
}

#[test]
fn test_knowledge_and_radar() {
    let tmp = project("ana@fazenda.com", "gerente123");
    let dir = tmp.path();

    let entry = json(&run_with_stdin(
        dir,
        &["knowledge", "add", "Famacha", "--category=sanidade", "--stdin", "--json"],
        "Avaliar a coloração da mucosa ocular.\n",
    ));
    assert_eq!(entry["content"], "Avaliar a coloração da mucosa ocular.");
    assert_eq!(entry["author"], "Ana");

    let listed = json(&run(dir, &["knowledge", "list", "--category=SANIDADE", "--json"]));
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let analysis = json(&run(
        dir,
        &["radar", "add", "Matrizes março", "--group=Matrizes", "-s", "famacha=2", "-s", "escore=3", "--json"],
    ));
    assert_eq!(analysis["status"], "pending");
    let id = analysis["id"].as_str().unwrap().to_string();

    let output = run(dir, &["radar", "execute", &id]);
    assert!(stdout(&output).contains("Marked executed"));
    let output = run(dir, &["radar", "execute", &id]);
    assert!(stdout(&output).contains("Already executed"));

    let analyses = json(&run(dir, &["radar", "list", "--json"]));
    assert_eq!(analyses[0]["status"], "executed");
    assert_eq!(analyses[0]["scores"]["escore"], 3.0);
}

#[test]
fn test_status_and_logout() {
    let tmp = project("ana@fazenda.com", "gerente123");
    let dir = tmp.path();

    let status = json(&run(dir, &["status", "--json"]));
    assert_eq!(status["mode"], "local");
    assert_eq!(status["user"], "Ana");
    assert_eq!(status["role"], "manager");
    assert_eq!(status["pending_tasks"], 0);

    let output = run(dir, &["logout"]);
    assert!(stdout(&output).contains("Signed out."));

    let status = json(&run(dir, &["status", "--json"]));
    assert!(status["user"].is_null());
}

#[test]
fn test_data_survives_logout() {
    let tmp = project("ana@fazenda.com", "gerente123");
    let dir = tmp.path();
    json(&run(dir, &["knowledge", "add", "Tosquia", "--content=Em outubro", "--json"]));

    run(dir, &["logout"]);
    assert!(login(dir, "ana@fazenda.com", "gerente123").status.success());

    let listed = json(&run(dir, &["knowledge", "list", "--json"]));
    assert_eq!(listed.as_array().unwrap().len(), 1);
}
