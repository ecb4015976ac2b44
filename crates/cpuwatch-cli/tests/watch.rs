use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("cpuwatch-cli-{}-{}", std::process::id(), name))
}

#[test]
fn watch_json_reports_each_poll() {
    let pid = std::process::id();

    let mut cmd = cargo_bin_cmd!("cpuwatch");
    cmd.arg("--log-level")
        .arg("error")
        .arg("watch")
        .arg("--pid")
        .arg(pid.to_string())
        .arg("--above")
        .arg("100000")
        .arg("--times")
        .arg("1/2")
        .arg("--interval")
        .arg("10ms")
        .arg("--max-polls")
        .arg("2")
        .arg("--json");

    let output = cmd.output().expect("watch should run");
    assert!(
        output.status.success(),
        "expected success, stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf-8");
    let reports: Vec<Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be json"))
        .collect();
    assert_eq!(reports.len(), 2);

    for (i, report) in reports.iter().enumerate() {
        assert!(report["schema_id"]
            .as_str()
            .unwrap()
            .contains("poll-report.schema.json"));
        assert_eq!(report["poll"].as_u64(), Some(i as u64 + 1));
        assert_eq!(report["pid"].as_u64(), Some(pid as u64));
        assert_eq!(report["triggered"].as_bool(), Some(false));
        assert_eq!(report["root_present"].as_bool(), Some(true));
        assert!(report["message"]
            .as_str()
            .unwrap()
            .starts_with("cpu within bounds ["));
    }
    assert_eq!(reports[1]["history"].as_array().unwrap().len(), 2);
}

#[test]
fn watch_text_output() {
    let mut cmd = cargo_bin_cmd!("cpuwatch");
    cmd.arg("--log-level")
        .arg("error")
        .arg("watch")
        .arg("--pid")
        .arg(std::process::id().to_string())
        .arg("--above")
        .arg("100000")
        .arg("--interval")
        .arg("10ms")
        .arg("--max-polls")
        .arg("1");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("ok"))
        .stdout(predicate::str::contains("cpu within bounds"));
}

#[test]
fn watch_requires_above() {
    let mut cmd = cargo_bin_cmd!("cpuwatch");
    cmd.arg("watch").arg("--pid").arg("1").arg("--max-polls").arg("1");

    cmd.assert()
        .code(2)
        .stderr(predicate::str::contains("above"));
}

#[test]
fn watch_requires_pid_source() {
    let mut cmd = cargo_bin_cmd!("cpuwatch");
    cmd.arg("watch").arg("--above").arg("50").arg("--max-polls").arg("1");

    cmd.assert()
        .code(2)
        .stderr(predicate::str::contains("pid_file"));
}

#[test]
fn watch_rejects_bad_times() {
    let mut cmd = cargo_bin_cmd!("cpuwatch");
    cmd.arg("watch")
        .arg("--pid")
        .arg("1")
        .arg("--above")
        .arg("50")
        .arg("--times")
        .arg("4/3");

    cmd.assert()
        .code(2)
        .stderr(predicate::str::contains("cannot exceed window"));
}

#[test]
fn watch_unusable_pid_file_keeps_polling() {
    let path = temp_path("garbage.pid");
    fs::write(&path, "nope\n").unwrap();

    let mut cmd = cargo_bin_cmd!("cpuwatch");
    cmd.arg("--log-level")
        .arg("error")
        .arg("watch")
        .arg("--pid-file")
        .arg(&path)
        .arg("--above")
        .arg("10")
        .arg("--interval")
        .arg("10ms")
        .arg("--max-polls")
        .arg("2");

    let output = cmd.output().expect("watch should run");
    fs::remove_file(&path).ok();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(
        stdout.matches("cpu sample unavailable").count(),
        2,
        "stdout={stdout}"
    );
}

#[test]
fn watch_config_file_with_flag_override() {
    let path = temp_path("config.json");
    fs::write(
        &path,
        r#"{ "above": 0.5, "times": [1, 3], "interval": "10ms" }"#,
    )
    .unwrap();

    let mut cmd = cargo_bin_cmd!("cpuwatch");
    cmd.arg("--log-level")
        .arg("error")
        .arg("watch")
        .arg("--config")
        .arg(&path)
        .arg("--pid")
        .arg(std::process::id().to_string())
        .arg("--above")
        .arg("100000")
        .arg("--max-polls")
        .arg("1")
        .arg("--json");

    let output = cmd.output().expect("watch should run");
    fs::remove_file(&path).ok();

    assert!(
        output.status.success(),
        "stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: Value = serde_json::from_str(String::from_utf8(output.stdout).unwrap().trim())
        .expect("report should be json");
    assert_eq!(report["triggered"].as_bool(), Some(false));
}

#[test]
fn watch_config_unknown_field_is_error() {
    let path = temp_path("bad-config.json");
    fs::write(&path, r#"{ "above": 10, "threshold": 5 }"#).unwrap();

    let mut cmd = cargo_bin_cmd!("cpuwatch");
    cmd.arg("watch")
        .arg("--config")
        .arg(&path)
        .arg("--pid")
        .arg("1")
        .arg("--json");

    let output = cmd.output().expect("watch should run");
    fs::remove_file(&path).ok();

    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8(output.stdout).unwrap();
    let parsed: Value = serde_json::from_str(stdout.trim()).expect("error report should be json");
    assert_eq!(parsed["error_code"].as_i64(), Some(2));
}

#[test]
#[cfg(unix)]
fn watch_exit_on_trigger_with_busy_child() {
    use std::process::{Command, Stdio};
    use std::thread;
    use std::time::Duration;

    let mut busy = Command::new("sh")
        .arg("-c")
        .arg("while :; do :; done")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn busy loop");
    thread::sleep(Duration::from_millis(300));

    let mut cmd = cargo_bin_cmd!("cpuwatch");
    cmd.arg("--log-level")
        .arg("error")
        .arg("watch")
        .arg("--pid")
        .arg(busy.id().to_string())
        .arg("--above")
        .arg("1")
        .arg("--interval")
        .arg("10ms")
        .arg("--max-polls")
        .arg("20")
        .arg("--exit-on-trigger");

    let output = cmd.output().expect("watch should run");
    let _ = busy.kill();
    let _ = busy.wait();

    assert_eq!(
        output.status.code(),
        Some(3),
        "stdout={}",
        String::from_utf8_lossy(&output.stdout)
    );
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("TRIGGERED"));
    assert!(stdout.contains("cpu out of bounds [*"));
}
