//! CLI integration tests.
//!
//! Tests:
//! - Help and version output
//! - add / check / list / remove / clear round trip against a temp data dir
//! - watch exits cleanly on SIGINT
//! - watch picks up bookmarks added by another process

use std::process::{Command, Output};
use std::time::Duration;

const BIN: &str = env!("CARGO_BIN_EXE_bookmarks");

fn run(data_dir: &std::path::Path, args: &[&str]) -> Output {
    let output = Command::new(BIN)
        .arg("--data-dir")
        .arg(data_dir)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// CLI --help output should show expected options.
#[test]
fn test_cli_help_output() {
    let output = Command::new(BIN)
        .arg("--help")
        .output()
        .expect("failed to run");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(
        stdout.contains("--data-dir"),
        "help should mention --data-dir option"
    );
    assert!(
        stdout.contains("--log-level"),
        "help should mention --log-level option"
    );
    for command in ["add", "remove", "list", "check", "clear", "watch"] {
        assert!(stdout.contains(command), "help should list {command}");
    }
}

/// CLI --version should show version.
#[test]
fn test_cli_version_output() {
    let output = Command::new(BIN)
        .arg("--version")
        .output()
        .expect("failed to run");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains(env!("CARGO_PKG_VERSION")),
        "version output should contain version number: {}",
        stdout
    );
}

#[test]
fn test_cli_round_trip() {
    let temp_dir = tempfile::TempDir::new().expect("failed to create temp dir");
    let dir = temp_dir.path();

    run(
        dir,
        &["add", "https://x/g/thread/1", "--board", "g", "--thread", "1", "--title", "first", "--timestamp", "100"],
    );
    run(
        dir,
        &["add", "https://x/a/thread/2", "--board", "a", "--thread", "2", "--title", "second", "--timestamp", "200"],
    );

    assert_eq!(stdout(&run(dir, &["check", "https://x/g/thread/1"])), "true");
    assert_eq!(stdout(&run(dir, &["check", "https://x/none"])), "false");

    let listed = run(dir, &["list", "--json"]);
    let rows: serde_json::Value = serde_json::from_slice(&listed.stdout).unwrap();
    let urls: Vec<&str> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["url"].as_str().unwrap())
        .collect();
    assert_eq!(urls, vec!["https://x/a/thread/2", "https://x/g/thread/1"]);

    let listed = run(dir, &["list", "--sort", "oldest", "--json"]);
    let rows: serde_json::Value = serde_json::from_slice(&listed.stdout).unwrap();
    assert_eq!(rows[0]["boardId"], "g");

    run(dir, &["remove", "https://x/g/thread/1"]);
    assert_eq!(stdout(&run(dir, &["check", "https://x/g/thread/1"])), "false");

    run(dir, &["clear"]);
    assert_eq!(stdout(&run(dir, &["list"])), "No bookmarks yet");
}

/// watch prints the current list and stops on SIGINT.
#[cfg(unix)]
#[tokio::test]
async fn test_watch_stops_on_sigint() {
    use std::process::Stdio;
    use tokio::process::Command as TokioCommand;
    use tokio::time::timeout;

    let temp_dir = tempfile::TempDir::new().expect("failed to create temp dir");

    let mut child = TokioCommand::new(BIN)
        .arg("--data-dir")
        .arg(temp_dir.path())
        .arg("watch")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn watch");

    // Wait a bit for the first snapshot
    tokio::time::sleep(Duration::from_secs(1)).await;

    let pid = child.id().expect("no pid");
    let _ = std::process::Command::new("kill")
        .args(["-INT", &pid.to_string()])
        .status();

    match timeout(Duration::from_secs(5), child.wait()).await {
        Ok(Ok(status)) => assert!(status.success(), "watch should exit cleanly: {status}"),
        Ok(Err(e)) => panic!("failed to wait for child: {}", e),
        Err(_) => {
            child.kill().await.expect("failed to kill");
            panic!("watch did not respond to SIGINT within timeout");
        }
    }
}

/// watch prints a new snapshot when another process adds a bookmark.
#[cfg(unix)]
#[tokio::test]
async fn test_watch_sees_other_process_writes() {
    use std::process::Stdio;
    use tokio::io::{AsyncBufReadExt, BufReader, Lines};
    use tokio::process::{ChildStdout, Command as TokioCommand};
    use tokio::time::timeout;

    async fn next_snapshot(lines: &mut Lines<BufReader<ChildStdout>>) -> Vec<String> {
        let mut snapshot = Vec::new();
        loop {
            let line = timeout(Duration::from_secs(5), lines.next_line())
                .await
                .expect("timed out waiting for snapshot")
                .expect("failed to read stdout")
                .expect("watch exited early");
            if line == "---" {
                return snapshot;
            }
            snapshot.push(line);
        }
    }

    let temp_dir = tempfile::TempDir::new().expect("failed to create temp dir");
    let dir = temp_dir.path().to_path_buf();

    let mut child = TokioCommand::new(BIN)
        .arg("--data-dir")
        .arg(&dir)
        .args(["--poll-interval-ms", "50", "watch"])
        .env_remove("RUST_LOG")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn watch");
    let mut lines = BufReader::new(child.stdout.take().expect("no stdout")).lines();

    assert_eq!(next_snapshot(&mut lines).await, vec!["No bookmarks yet"]);

    let add_dir = dir.clone();
    tokio::task::spawn_blocking(move || {
        run(
            &add_dir,
            &["add", "https://x/g/thread/1", "--board", "g", "--thread", "1", "--title", "first", "--timestamp", "100"],
        )
    })
    .await
    .unwrap();

    let snapshot = next_snapshot(&mut lines).await;
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot[0].contains("https://x/g/thread/1"), "{snapshot:?}");

    let pid = child.id().expect("no pid");
    let _ = std::process::Command::new("kill")
        .args(["-INT", &pid.to_string()])
        .status();
    let status = timeout(Duration::from_secs(5), child.wait())
        .await
        .expect("watch did not exit")
        .expect("failed to wait for child");
    assert!(status.success(), "watch should exit cleanly: {status}");
}
