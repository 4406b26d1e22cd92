use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use tempfile::TempDir;

// A runtime binary that cannot be spawned leaves the controller unavailable;
// one-shot commands must then exit with code 3.
#[test]
fn cli_exits_with_3_when_runtime_unavailable() {
    let temp_dir = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("dockhand").unwrap();
    cmd.current_dir(temp_dir.path())
        .arg("status")
        .arg("--docker-path")
        .arg("/nonexistent/path/to/docker")
        .env_remove("DOCKHAND_RUNTIME");

    cmd.assert()
        .failure()
        .code(3)
        .stdout(predicate::str::contains("Docker daemon is not available."))
        .stderr(predicate::str::contains("Runtime unavailable"));
}

#[test]
fn update_data_does_not_write_when_runtime_unavailable() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    std::fs::create_dir(&data_dir).unwrap();
    std::fs::write(
        temp_dir.path().join("dockhand.toml"),
        format!("host_data_dir = {:?}\n", data_dir.to_str().unwrap()),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("dockhand").unwrap();
    cmd.current_dir(temp_dir.path())
        .args(["update-data", "--filename", "dsl.txt", "--content", "x"])
        .args(["--docker-path", "/nonexistent/path/to/docker"]);

    cmd.assert().failure().code(3);
    assert!(!data_dir.join("dsl.txt").exists());
}
