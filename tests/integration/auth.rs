//! Authorization lifecycle through the CLI: allow, revoke, list, and the
//! shell-approval notice.
use crate::utils::Dv;
use predicates::prelude::*;

#[test]
fn allow_then_list_then_revoke() {
    let dv = Dv::new();
    dv.write_config("", "aliases:\n  ll: ls -la\n");

    dv.cmd()
        .arg("allow")
        .assert()
        .success()
        .stdout(predicate::str::contains("Authorized"));

    dv.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            dv.cwd().canonicalize().unwrap().display().to_string(),
        ));

    dv.cmd()
        .arg("revoke")
        .assert()
        .success()
        .stdout(predicate::str::contains("Revoked"));

    dv.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No authorized directories."));
}

#[test]
fn allow_persists_across_invocations_in_the_v2_file() {
    let dv = Dv::new();
    dv.cmd().arg("allow").assert().success();

    let auth_v2 = dv
        .test_fs
        .app_root
        .path()
        .join("config")
        .join("auth_v2.json");
    let contents = std::fs::read_to_string(&auth_v2).unwrap();
    assert!(contents.contains("\"_version\": 2"));
    assert!(contents.contains("\"allowed\": true"));
}

#[test]
fn allow_announces_unapproved_shell_commands() {
    let dv = Dv::new();
    dv.write_config("", "env:\n  STAMP:\n    sh: date +%s\n");

    dv.cmd()
        .arg("allow")
        .assert()
        .success()
        .stdout(predicate::str::contains("STAMP = $(date +%s)"))
        .stdout(predicate::str::contains("--auto-approve-shell"));
}

#[test]
fn auto_approve_shell_reports_the_approval() {
    let dv = Dv::new();
    dv.write_config("", "env:\n  STAMP:\n    sh: date +%s\n");

    dv.cmd()
        .args(["allow", "--auto-approve-shell"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Approved 1 shell command(s)"));

    dv.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("[shell commands approved]"));
}

#[test]
fn editing_shell_commands_invalidates_approval() {
    let dv = Dv::new();
    dv.write_config("", "env:\n  STAMP:\n    sh: date\n");
    dv.allow_with_shell(dv.cwd());

    let stdout = dv.export_in(dv.cwd());
    assert!(stdout.contains("export STAMP=\"$(date)\"\n"));

    // Change the command: the approval hash no longer matches, so the env
    // var is withheld until re-approved. The sleep steps past the cache's
    // fast-TTL window so the edit is noticed.
    dv.write_config("", "env:\n  STAMP:\n    sh: uptime\n");
    std::thread::sleep(std::time::Duration::from_millis(2100));
    let stdout = dv.export_in(dv.cwd());
    assert!(!stdout.contains("STAMP"));

    dv.allow_with_shell(dv.cwd());
    let stdout = dv.export_in(dv.cwd());
    assert!(stdout.contains("export STAMP=\"$(uptime)\"\n"));
}

#[test]
fn templated_shell_commands_hash_their_declared_form() {
    let dv = Dv::new();
    dv.write_config("", "env:\n  ROOT_LS:\n    sh: \"ls {{ .DIRVANA_DIR }}\"\n");
    dv.allow_with_shell(dv.cwd());

    // Approval recorded the declared template, so the expanded command is
    // emitted right away (expansion varies per entry, the hash must not).
    let cwd = dv.cwd().canonicalize().unwrap();
    let stdout = dv.export_in(dv.cwd());
    assert!(stdout.contains(&format!("export ROOT_LS=\"$(ls {})\"\n", cwd.display())));

    // Editing the declared template invalidates the approval like any other
    // command edit.
    dv.write_config("", "env:\n  ROOT_LS:\n    sh: \"ls -a {{ .DIRVANA_DIR }}\"\n");
    std::thread::sleep(std::time::Duration::from_millis(2100));
    let stdout = dv.export_in(dv.cwd());
    assert!(!stdout.contains("ROOT_LS"));

    dv.allow_with_shell(dv.cwd());
    let stdout = dv.export_in(dv.cwd());
    assert!(stdout.contains(&format!("export ROOT_LS=\"$(ls -a {})\"\n", cwd.display())));
}
