//! End-to-end tests for the `squad` binary against a fake agent CLI.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use squad_test_utils::{FakeCli, agent_message, echo_json, thread_started};

struct Workspace {
    fake: FakeCli,
    _dir: tempfile::TempDir,
    config: PathBuf,
    project: PathBuf,
}

impl Workspace {
    /// A config with the default roster and an agent CLI running `script_body`.
    ///
    /// Commands run inside `project`, which becomes the project root.
    fn new(script_body: &str) -> Self {
        let fake = FakeCli::new(script_body);
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("project");
        std::fs::create_dir_all(&project).unwrap();
        let project = project.canonicalize().unwrap();
        let config = dir.path().join("squad").join("config.toml");

        let ws = Self {
            fake,
            _dir: dir,
            config,
            project,
        };
        let init = ws.run(&["init"]);
        assert!(init.status.success(), "init failed: {}", stderr(&init));
        ws
    }

    fn run(&self, args: &[&str]) -> Output {
        squad(&self.config, args)
            .current_dir(&self.project)
            .env("SQUAD_PROGRAM", self.fake.script_path())
            .output()
            .expect("failed to run squad")
    }
}

fn squad(config: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_squad"));
    cmd.arg("--config")
        .arg(config)
        .args(args)
        .env_remove("SQUAD_CONFIG")
        .env_remove("SQUAD_PROGRAM")
        .env_remove("SQUAD_TIMEOUT_SEC");
    cmd
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn dispatch_prints_results_and_saves_session() {
    let ws = Workspace::new(&format!(
        "{}\n{}",
        echo_json(&thread_started("sess-be-1")),
        echo_json(&agent_message("endpoint added")),
    ));

    let out = ws.run(&["dispatch", "add an endpoint", "--to", "be"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("== BE (Backend Agent) DONE [pid "), "stdout: {text}");
    assert!(text.contains("endpoint added"));
    assert!(text.contains("launching CLI: "));

    let config = std::fs::read_to_string(&ws.config).unwrap();
    assert!(config.contains("session_id = \"sess-be-1\""), "config: {config}");

    let agents = ws.run(&["agents"]);
    let listing = stdout(&agents);
    assert!(listing.contains("sess-be-1"));
    assert!(listing.contains("pm-pending"));
}

#[test]
fn failed_agent_sets_exit_code_and_error_log() {
    let ws = Workspace::new("echo 'bad things' >&2\nexit 2");

    let out = ws.run(&["dispatch", "do it", "--to", "qa"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stdout(&out).contains("non-zero exit code: 2"));

    let logs = ws.run(&["logs", "--level", "all"]);
    assert!(stdout(&logs).contains("CLI> bad things"));

    let errors = ws.run(&["logs", "--level", "error"]);
    let errors = stdout(&errors);
    assert!(!errors.contains("CLI> bad things"), "errors: {errors}");
    assert!(errors.contains("qa FAILED agent CLI exited with non-zero exit code: 2"), "errors: {errors}");
}

#[test]
fn path_question_is_answered_with_project_root() {
    let ws = Workspace::new(&echo_json(&agent_message("somewhere")));

    let out = ws.run(&["dispatch", "what directory are you in?", "--to", "pm", "--json"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let results: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(
        results[0]["content"],
        format!("current working directory is: {}", ws.project.display())
    );
    assert_eq!(results[0]["status"], "DONE");
}

#[test]
fn disabled_agents_are_not_dispatched() {
    let ws = Workspace::new(&echo_json(&agent_message("ok")));

    for id in ["pm", "fe", "be", "qa"] {
        let out = ws.run(&["disable", id]);
        assert!(out.status.success(), "stderr: {}", stderr(&out));
    }

    let out = ws.run(&["dispatch", "anyone there?"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("target is stopped"));

    let listing = stdout(&ws.run(&["agents"]));
    assert!(
        listing.lines().any(|l| l.starts_with("fe ") && l.contains("STOPPED")),
        "listing: {listing}"
    );

    ws.run(&["enable", "fe"]);
    let listing = stdout(&ws.run(&["agents"]));
    assert!(
        listing.lines().any(|l| l.starts_with("fe ") && l.contains("IDLE")),
        "listing: {listing}"
    );
    let out = ws.run(&["dispatch", "anyone there?"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("== FE (Frontend Agent) DONE [pid "));
}

#[test]
fn completions_are_generated() {
    let dir = tempfile::tempdir().unwrap();
    let out = squad(&dir.path().join("config.toml"), &["completions", "bash"])
        .output()
        .expect("failed to run squad");
    assert!(out.status.success());
    assert!(stdout(&out).contains("squad"));
}
