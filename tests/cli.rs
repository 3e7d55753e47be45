use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::io::Write;

fn vmdeck() -> assert_cmd::Command {
    cargo_bin_cmd!("vmdeck").into()
}

/// Config pointing both connections at libvirt's built-in test driver, which
/// needs no daemon and always holds a running persistent domain `test` and an
/// active network `default`.
fn write_test_config(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let config_path = dir.path().join("vmdeck.toml");
    let mut f = std::fs::File::create(&config_path).unwrap();
    write!(
        f,
        r#"
[connections]
system = "test:///default"
session = "test:///default"

[helpers]
clone = "vmdeck-test-missing-clone"
cpu_edit = "vmdeck-test-missing-xml"
"#
    )
    .unwrap();
    config_path
}

#[test]
fn help_works() {
    vmdeck()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Manage libvirt virtual machines"))
        .stdout(predicate::str::contains("force-shutdown"))
        .stdout(predicate::str::contains("network"));
}

#[test]
fn missing_config_shows_error() {
    vmdeck()
        .args(["--config", "/nonexistent/vmdeck.toml", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn validation_rejects_unknown_busy_policy() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("vmdeck.toml");
    std::fs::write(&config_path, "[dispatch]\nbusy = \"whenever\"\n").unwrap();

    vmdeck()
        .args(["--config", config_path.to_str().unwrap(), "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("dispatch.busy must be"));
}

#[test]
fn validation_rejects_empty_uri() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("vmdeck.toml");
    std::fs::write(&config_path, "[connections]\nsystem = \"\"\n").unwrap();

    vmdeck()
        .args(["--config", config_path.to_str().unwrap(), "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("connections.system must not be empty"));
}

#[test]
fn list_shows_test_domain() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_test_config(&dir);

    vmdeck()
        .args(["--config", config_path.to_str().unwrap(), "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("test"))
        .stdout(predicate::str::contains("running"));
}

#[test]
fn actions_for_running_domain() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_test_config(&dir);

    vmdeck()
        .args(["--config", config_path.to_str().unwrap(), "actions", "test"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pause"))
        .stdout(predicate::str::contains("force-shutdown"))
        .stdout(predicate::str::contains("edit-cpu-type (disabled:"))
        .stdout(predicate::str::contains("  resume").not());
}

#[test]
fn actions_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_test_config(&dir);

    vmdeck()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "--output",
            "json",
            "actions",
            "test",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\":\"test\""));
}

#[test]
fn unknown_vm_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_test_config(&dir);

    vmdeck()
        .args(["--config", config_path.to_str().unwrap(), "pause", "no-such-vm"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn ineligible_action_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_test_config(&dir);

    vmdeck()
        .args(["--config", config_path.to_str().unwrap(), "resume", "test"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not available"));
}

#[test]
fn delete_without_confirmation_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_test_config(&dir);

    vmdeck()
        .args(["--config", config_path.to_str().unwrap(), "delete", "test"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("pass --yes"));
}

#[test]
fn network_list_shows_default() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_test_config(&dir);

    vmdeck()
        .args(["--config", config_path.to_str().unwrap(), "network", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("default"))
        .stdout(predicate::str::contains("active"));
}
