//! Smoke tests for the orchestration commands: validate, status, clean,
//! init, hook, schema, completion.
use crate::utils::Dv;
use predicates::prelude::*;

#[test]
fn help_runs_at_all() {
    let dv = Dv::new();
    dv.cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("dirvana"));
}

#[test]
fn validate_accepts_a_wellformed_file() {
    let dv = Dv::new();
    let dir = dv.write_config("", "aliases:\n  ll: ls -la\n");

    dv.cmd()
        .arg("validate")
        .arg(dir.join(".dirvana.yml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("OK"));
}

#[test]
fn validate_rejects_bad_identifiers() {
    let dv = Dv::new();
    let dir = dv.write_config("", "aliases:\n  9lives: echo meow\n");

    dv.cmd()
        .arg("validate")
        .arg(dir.join(".dirvana.yml"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("VALIDATION_ERROR"));
}

#[test]
fn validate_rejects_alias_function_conflicts() {
    let dv = Dv::new();
    let dir = dv.write_config(
        "",
        "aliases:\n  deploy: make deploy\nfunctions:\n  deploy: make deploy \"$@\"\n",
    );

    dv.cmd()
        .arg("validate")
        .arg(dir.join(".dirvana.yml"))
        .assert()
        .failure();
}

#[test]
fn validate_propagates_parse_errors_for_named_files() {
    let dv = Dv::new();
    let file = dv.cwd().join(".dirvana.yml");
    std::fs::write(&file, "aliases: [broken").unwrap();

    dv.cmd().arg("validate").arg(&file).assert().failure();
}

#[test]
fn status_reports_the_directory_state() {
    let dv = Dv::new();
    dv.write_config("", "aliases:\n  ll: ls -la\n");
    dv.allow(dv.cwd());

    dv.cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Authorized: yes"))
        .stdout(predicate::str::contains("1 alias(es)"));
}

#[test]
fn status_flags_unauthorized_directories() {
    let dv = Dv::new();
    dv.write_config("", "aliases:\n  ll: ls -la\n");

    dv.cmd()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Authorized: no"));
}

#[test]
fn clean_clears_the_caches() {
    let dv = Dv::new();
    dv.write_config("", "aliases:\n  ll: ls -la\n");
    dv.allow(dv.cwd());
    dv.export_in(dv.cwd());

    let cache_file = dv
        .test_fs
        .app_root
        .path()
        .join("cache")
        .join("cache.json");
    assert!(std::fs::read_to_string(&cache_file)
        .unwrap()
        .contains("alias ll"));

    dv.cmd().arg("clean").assert().success();
    assert_eq!(std::fs::read_to_string(&cache_file).unwrap().trim(), "{}");
}

#[test]
fn init_writes_a_starter_config_once() {
    let dv = Dv::new();

    dv.cmd()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));
    assert!(dv.cwd().join(".dirvana.yml").is_file());

    dv.cmd()
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn hook_prints_shell_specific_snippets() {
    let dv = Dv::new();

    dv.cmd()
        .args(["hook", "--shell", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PROMPT_COMMAND"))
        .stdout(predicate::str::contains("DIRVANA_PREV_DIR"));

    dv.cmd()
        .args(["hook", "--shell", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("add-zsh-hook chpwd"));

    dv.cmd()
        .args(["hook", "--shell", "fish"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--on-variable PWD"));
}

#[test]
fn schema_prints_the_config_description() {
    let dv = Dv::new();

    dv.cmd()
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains(".dirvana.yml"))
        .stdout(predicate::str::contains("sha256sum"));
}

#[test]
fn completion_bridge_is_printed_per_shell() {
    let dv = Dv::new();

    dv.cmd()
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("_dirvana_complete"))
        .stdout(predicate::str::contains("dirvana complete"));

    dv.cmd()
        .args(["completion", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("compadd"));
}

#[test]
fn export_cache_speeds_up_the_second_run() {
    // Not a timing assertion, just that the cached entry round-trips and the
    // second export emits identical output.
    let dv = Dv::new();
    dv.write_config("", "aliases:\n  ll: ls -la\nenv:\n  A: one\n");
    dv.allow(dv.cwd());

    let first = dv.export_in(dv.cwd());
    let second = dv.export_in(dv.cwd());
    assert_eq!(first, second);
}
