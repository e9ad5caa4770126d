// End-to-end tests for the `storyforge` binary.
// Run with: cargo test -p storyforge-cli --test cli_tests
//
// Every test points the binary at its own temp data dir and a config path
// that does not exist, so the user's real preferences are never touched.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const USER: &str = "ada@example.com";

fn storyforge(data_dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_storyforge"));
    cmd.env("STORYFORGE_PREFS_DIR", data_dir)
        .env_remove("STORYFORGE_USER")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(data_dir.join("absent.toml"));
    cmd
}

fn run(data_dir: &Path, args: &[&str]) -> Output {
    storyforge(data_dir).args(args).output().expect("run storyforge")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn show_json(data_dir: &Path) -> serde_json::Value {
    let output = run(data_dir, &["-u", USER, "show", "--json"]);
    assert!(output.status.success(), "show failed: {}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).expect("show --json prints JSON")
}

#[test]
fn show_json_prints_defaults_for_new_user() {
    let temp_dir = TempDir::new().unwrap();
    let prefs = show_json(temp_dir.path());

    assert_eq!(prefs["plan"]["type"], "freelance");
    assert_eq!(prefs["plan"]["features"], serde_json::json!(["local-storage", "up-to-1-book"]));
    assert_eq!(prefs["loginCount"], 1);
    assert_eq!(prefs["fontFamily"], "Georgia");

    // First load persisted a record file
    let files: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);
}

#[test]
fn set_is_visible_to_next_run() {
    let temp_dir = TempDir::new().unwrap();

    let output = run(temp_dir.path(), &["-u", USER, "set", "theme", "dark"]);
    assert!(output.status.success());
    let output = run(temp_dir.path(), &["-u", USER, "set", "wordCountGoal", "2500"]);
    assert!(output.status.success());

    let prefs = show_json(temp_dir.path());
    assert_eq!(prefs["theme"], "dark");
    assert_eq!(prefs["wordCountGoal"], 2500);
}

#[test]
fn user_can_come_from_environment() {
    let temp_dir = TempDir::new().unwrap();
    let output = storyforge(temp_dir.path())
        .env("STORYFORGE_USER", USER)
        .args(["recent", "book", "b1"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), "b1");

    assert_eq!(show_json(temp_dir.path())["recentBooks"], serde_json::json!(["b1"]));
}

#[test]
fn mutation_without_user_is_usage_error() {
    let temp_dir = TempDir::new().unwrap();
    let output = run(temp_dir.path(), &["set", "theme", "dark"]);

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--user"));
}

#[test]
fn clear_without_yes_is_refused() {
    let temp_dir = TempDir::new().unwrap();
    run(temp_dir.path(), &["-u", USER, "set", "theme", "dark"]);

    let output = run(temp_dir.path(), &["-u", USER, "clear"]);
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(show_json(temp_dir.path())["theme"], "dark");

    let output = run(temp_dir.path(), &["-u", USER, "clear", "--yes"]);
    assert!(output.status.success());
    assert_eq!(show_json(temp_dir.path())["theme"], "system");
}

#[test]
fn import_rejects_incomplete_backup() {
    let temp_dir = TempDir::new().unwrap();
    run(temp_dir.path(), &["-u", USER, "set", "theme", "dark"]);

    let backup = temp_dir.path().join("backup.json");
    fs::write(&backup, r#"{"theme": "light"}"#).unwrap();
    let output = run(temp_dir.path(), &["-u", USER, "import", backup.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(4));
    assert_eq!(show_json(temp_dir.path())["theme"], "dark");
}

#[test]
fn export_import_moves_record_between_users() {
    let temp_dir = TempDir::new().unwrap();
    let backup = temp_dir.path().join("backup.json");
    run(temp_dir.path(), &["-u", USER, "set", "fontFamily", "Courier Prime"]);

    let output = run(temp_dir.path(), &["-u", USER, "export", "-o", backup.to_str().unwrap()]);
    assert!(output.status.success());

    let output = run(temp_dir.path(), &["-u", "grace@example.com", "import", backup.to_str().unwrap()]);
    assert!(output.status.success());

    let output = run(temp_dir.path(), &["-u", "grace@example.com", "show", "--json"]);
    let prefs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(prefs["fontFamily"], "Courier Prime");
}

#[test]
fn upgrade_sets_one_year_term() {
    let temp_dir = TempDir::new().unwrap();
    let output = run(temp_dir.path(), &["-u", USER, "upgrade"]);
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("professional until "));

    let prefs = show_json(temp_dir.path());
    assert_eq!(prefs["plan"]["type"], "professional");
    assert!(prefs["plan"]["endDate"].is_string());
}

#[test]
fn sqlite_backend_from_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("prefs.toml");
    fs::write(&config, "backend = \"sqlite\"\n").unwrap();

    let with_config = |args: &[&str]| {
        Command::new(env!("CARGO_BIN_EXE_storyforge"))
            .env("STORYFORGE_PREFS_DIR", temp_dir.path())
            .env_remove("STORYFORGE_USER")
            .env_remove("RUST_LOG")
            .arg("--config")
            .arg(&config)
            .args(args)
            .output()
            .unwrap()
    };

    assert!(with_config(&["-u", USER, "beta", "enable", "outline-view"]).status.success());
    let output = with_config(&["-u", USER, "beta", "check", "outline-view"]);
    assert_eq!(stdout(&output).trim(), "outline-view: enabled");
    assert!(temp_dir.path().join("prefs.db").exists());
}

#[test]
fn invalid_config_is_reported_and_defaults_used() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("bad.toml");
    fs::write(&config, "backend = [").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_storyforge"))
        .env("STORYFORGE_PREFS_DIR", temp_dir.path())
        .env_remove("STORYFORGE_USER")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(&config)
        .args(["-u", USER, "age"])
        .output()
        .unwrap();

    assert!(output.status.success());
    // Brand-new account: under a day old, rounded up at most to 1
    assert!(matches!(stdout(&output).trim(), "0" | "1"));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("bad.toml"), "stderr was: {stderr}");
    assert!(stderr.contains("using default config"), "stderr was: {stderr}");
    // Not a terminal, so no colour codes
    assert!(!stderr.contains('\x1b'), "stderr was: {stderr:?}");
}
