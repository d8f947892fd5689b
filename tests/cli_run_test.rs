use std::process::{Command, Output};
use tempfile::TempDir;

const CASE: &str = r#"
[objects.inlet]
type = "file"
path = "inlet.txt"
read = "if-modified"

[objects.offset]
type = "constant"
value = 1.5

[objects.total]
type = "sum"
inputs = ["inlet", "offset"]

[objects.doubled]
type = "scale"
input = "total"
factor = 2
"#;

fn livedir(dir: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_livedir"))
        .args(args)
        .current_dir(dir.path())
        .env_remove("LIVEDIR_ABORT")
        .output()
        .expect("Failed to run livedir")
}

fn case_dir(case: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("case.toml"), case).unwrap();
    std::fs::write(dir.path().join("inlet.txt"), "2.5\n").unwrap();
    dir
}

#[test]
fn test_run_prints_every_quantity() {
    let dir = case_dir(CASE);
    let output = livedir(&dir, &["run", "case.toml"]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(
        lines,
        ["inlet = 2.5", "offset = 1.5", "total = 4", "doubled = 8"]
    );
}

#[test]
fn test_unknown_type_exits_with_failure() {
    let dir = case_dir("[objects.x]\ntype = \"sclae\"\ninput = \"y\"\n");
    let output = livedir(&dir, &["run", "case.toml"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("LIVEDIR FATAL IO ERROR"), "{stderr}");
    assert!(stderr.contains("Unknown quantity type sclae"), "{stderr}");
    assert!(stderr.contains("scale"), "{stderr}");
}

#[test]
fn test_unwind_mode_also_exits_with_failure() {
    let dir = case_dir("[objects.x]\ntype = \"constant\"\n");
    let output = Command::new(env!("CARGO_BIN_EXE_livedir"))
        .args(["run", "case.toml"])
        .current_dir(dir.path())
        .env("LIVEDIR_ERRORS__FATAL_MODE", "unwind")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Entry 'value' not found"), "{stderr}");
}

#[test]
fn test_types_lists_builtin_kinds() {
    let dir = TempDir::new().unwrap();
    let output = livedir(&dir, &["types"]);

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    for kind in ["constant", "file", "scale", "sum"] {
        assert!(stdout.contains(kind));
    }
}

#[test]
fn test_watch_stops_after_ticks() {
    let dir = case_dir(CASE);
    let output = livedir(
        &dir,
        &["watch", "case.toml", "--interval-ms", "10", "--ticks", "2"],
    );

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("doubled = 8"));
}

#[test]
fn test_simulate_healthy_group() {
    let dir = TempDir::new().unwrap();
    let output = livedir(&dir, &["simulate", "--ranks", "3"]);

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.matches("group total = 15").count(), 3, "{stdout}");
}

#[test]
fn test_simulate_failing_rank_stops_every_rank() {
    let dir = TempDir::new().unwrap();
    let output = livedir(&dir, &["simulate", "--ranks", "3", "--fail-rank", "1"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    for rank in 0..3 {
        assert!(
            stderr.contains(&format!("rank {rank} exited with status 1")),
            "{stderr}"
        );
    }
    // Only the failing rank reports the error itself.
    assert_eq!(stderr.matches("Unknown quantity type konstant").count(), 1);
}
