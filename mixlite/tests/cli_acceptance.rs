use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_data).expect("failed to create XDG_DATA_HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn store_path(&self) -> PathBuf {
        self.xdg_data.join("mixlite/queue.db")
    }

    fn write_config(&self, contents: &str) {
        let dir = self.xdg_config.join("mixlite");
        fs::create_dir_all(&dir).expect("failed to create config dir");
        fs::write(dir.join("config.toml"), contents).expect("failed to write config");
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("mixlite"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute mixlite: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "mixlite {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

fn run_ok(env: &CliTestEnv, args: &[&str]) -> String {
    let output = run_bin(env, args);
    assert_success(args, &output);
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn status_reports_defaults_without_config() {
    let env = CliTestEnv::new();

    let stdout = run_ok(&env, &["status"]);

    assert!(stdout.contains("Token:           <not set>"), "got:\n{stdout}");
    assert!(stdout.contains("https://api.mixpanel.com/track"));
    assert!(stdout.contains("Queue Capacity:  100"));
    assert!(stdout.contains("Pending:         0"));
}

#[test]
fn offline_track_is_queued_listed_and_cleared() {
    let env = CliTestEnv::new();

    let args = [
        "--offline",
        "--token",
        "test-token",
        "track",
        "signup",
        "--data",
        r#"{"plan": "pro"}"#,
    ];
    let stdout = run_ok(&env, &args);
    assert!(
        stdout.contains("Offline: 1 transaction(s) remain queued."),
        "got:\n{stdout}"
    );
    assert!(
        env.store_path().exists(),
        "queue store should exist at {}",
        env.store_path().display()
    );

    let stdout = run_ok(&env, &["pending"]);
    assert!(stdout.contains("Pending transactions: 1"), "got:\n{stdout}");
    assert!(stdout.contains("event    signup"));

    let stdout = run_ok(&env, &["pending", "--json"]);
    let queued: serde_json::Value = serde_json::from_str(&stdout).expect("pending --json parses");
    let first = &queued[0];
    assert_eq!(first["event"], "signup");
    assert_eq!(first["properties"]["plan"], "pro");
    assert_eq!(first["properties"]["token"], "test-token");
    assert_eq!(first["properties"]["offline"], true);
    assert!(first["_id"].is_string());

    let stdout = run_ok(&env, &["clear"]);
    assert!(stdout.contains("Cleared 1 pending transaction(s)."));

    let stdout = run_ok(&env, &["pending"]);
    assert!(stdout.contains("No pending transactions."));
}

#[test]
fn queue_capacity_from_config_evicts_oldest() {
    let env = CliTestEnv::new();
    env.write_config(
        r#"
[client]
token = "config-token"
queue_capacity = 2
"#,
    );

    for event in ["first", "second", "third"] {
        run_ok(&env, &["--offline", "track", event]);
    }

    let stdout = run_ok(&env, &["pending"]);
    assert!(stdout.contains("Pending transactions: 2"), "got:\n{stdout}");
    assert!(!stdout.contains("first"));
    assert!(stdout.contains("second"));
    assert!(stdout.contains("third"));
}

#[test]
fn identify_and_profile_set_are_queued_offline() {
    let env = CliTestEnv::new();

    run_ok(&env, &["--offline", "--token", "t", "identify", "user-42"]);
    run_ok(
        &env,
        &["--offline", "--token", "t", "set", "--data", r#"{"$email": "a@example.com"}"#],
    );

    let stdout = run_ok(&env, &["pending", "--json"]);
    let queued: serde_json::Value = serde_json::from_str(&stdout).expect("pending --json parses");
    let items = queued.as_array().expect("array");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["event"], "$identify");
    assert_eq!(items[0]["properties"]["distinct_id"], "user-42");
    assert_eq!(items[1]["$token"], "t");
    assert_eq!(items[1]["$set"]["$email"], "a@example.com");
}

#[test]
fn track_without_token_fails() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["--offline", "track", "signup"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no project token"), "got:\n{stderr}");
}

#[test]
fn track_rejects_non_object_data() {
    let env = CliTestEnv::new();

    let output = run_bin(
        &env,
        &["--offline", "--token", "t", "track", "signup", "--data", "[1, 2]"],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--data must be a JSON object"), "got:\n{stderr}");

    let stdout = run_ok(&env, &["pending"]);
    assert!(stdout.contains("No pending transactions."));
}

#[test]
fn flush_with_empty_queue_is_a_no_op() {
    let env = CliTestEnv::new();

    let stdout = run_ok(&env, &["--offline", "flush"]);
    assert!(stdout.contains("Nothing to flush."));
}
