// Drives the compiled binary. Each invocation is a fresh process, so the
// workout has to come back from the snapshot file every time.

use assert_cmd::Command;
use tempfile::TempDir;

fn liftlog(state: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("liftlog").unwrap();
    cmd.arg("--state-dir").arg(state.path()).env_remove("LIFTLOG_LOG");
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "command failed: {output:?}");
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn workout_persists_across_processes() {
    let state = tempfile::tempdir().unwrap();

    liftlog(&state).arg("start").assert().success();
    liftlog(&state)
        .args(["add", "ex1", "Bench Press"])
        .assert()
        .success();
    liftlog(&state)
        .args(["set", "ex1", "0", "weight", "60"])
        .assert()
        .success();
    liftlog(&state)
        .args(["set", "ex1", "0", "reps", "10"])
        .assert()
        .success();
    liftlog(&state).args(["add-set", "ex1"]).assert().success();
    liftlog(&state)
        .args(["set", "ex1", "1", "weight", "65"])
        .assert()
        .success();

    let json = stdout_of(liftlog(&state).args(["status", "--json"]));
    let status: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(status["active"], true);
    assert!(status["startedAt"].is_i64());
    assert_eq!(status["entries"][0]["exerciseName"], "Bench Press");
    assert_eq!(status["entries"][0]["sets"][1]["weight"], 65.0);
    assert_eq!(status["entries"][0]["sets"][1]["reps"], 10);

    liftlog(&state).args(["remove-set", "ex1", "0"]).assert().success();
    let text = stdout_of(liftlog(&state).arg("status"));
    assert!(text.contains("  0: 65 x 10\n"));

    liftlog(&state).arg("finish").assert().success();
    assert!(!state.path().join("activeWorkout.json").exists());
    assert_eq!(
        stdout_of(liftlog(&state).arg("status")),
        "no active workout\n"
    );
}

#[test]
fn rejected_mutation_exits_nonzero() {
    let state = tempfile::tempdir().unwrap();
    liftlog(&state).arg("start").assert().success();

    let output = liftlog(&state)
        .args(["add-set", "nope"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("nope"));
}

#[test]
fn corrupt_snapshot_is_ignored() {
    let state = tempfile::tempdir().unwrap();
    std::fs::write(state.path().join("activeWorkout.json"), "{{{{").unwrap();

    assert_eq!(
        stdout_of(liftlog(&state).arg("status")),
        "no active workout\n"
    );
    liftlog(&state).arg("start").assert().success();
    let json = stdout_of(liftlog(&state).args(["status", "--json"]));
    assert!(json.contains("\"active\": true"));
}

#[test]
fn export_writes_csv() {
    let state = tempfile::tempdir().unwrap();
    liftlog(&state).arg("start").assert().success();
    liftlog(&state)
        .args(["add", "dl", "Deadlift", "--weight", "140", "--reps", "3"])
        .assert()
        .success();
    liftlog(&state).arg("finish").assert().success();

    let csv_path = state.path().join("out.csv");
    liftlog(&state)
        .arg("export")
        .arg(&csv_path)
        .assert()
        .success();

    let csv = std::fs::read_to_string(csv_path).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("workout_id,started_at,exercise_id,exercise_name,set_number,weight,reps")
    );
    assert!(lines.next().unwrap().ends_with(",dl,Deadlift,1,140.0,3"));
}

#[test]
fn negative_value_reaches_the_tracker() {
    let state = tempfile::tempdir().unwrap();
    liftlog(&state).arg("start").assert().success();
    liftlog(&state)
        .args(["add", "ex1", "Bench Press"])
        .assert()
        .success();

    let output = liftlog(&state)
        .args(["set", "ex1", "0", "weight", "-5"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid weight -5"));
}
