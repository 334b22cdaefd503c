//! End-to-end `export` scenarios: alias emission, template expansion,
//! hierarchy gates, and context cleanup.
use crate::utils::Dv;
use predicates::prelude::*;

#[test]
fn simple_alias_emission() {
    let dv = Dv::new();
    dv.write_config("", "aliases:\n  ll: ls -la\n");
    dv.allow(dv.cwd());

    let stdout = dv.export_in(dv.cwd());
    assert!(stdout.contains("alias ll='ls -la'\n"));

    // No definitions beyond the single alias (plus its completion binding)
    assert_eq!(stdout.matches("alias ").count(), 1);
    assert!(!stdout.contains("export "));
}

#[test]
fn template_expands_dirvana_dir() {
    let dv = Dv::new();
    dv.write_config("", "env:\n  PROJECT_ROOT: \"{{.DIRVANA_DIR}}\"\n");
    dv.allow(dv.cwd());

    let stdout = dv.export_in(dv.cwd());
    let expected = format!(
        "export PROJECT_ROOT='{}'\n",
        canonical_display(dv.cwd())
    );
    assert!(
        stdout.contains(&expected),
        "missing {expected:?} in {stdout:?}"
    );
}

#[test]
fn local_only_discards_parent_definitions() {
    let dv = Dv::new();
    let parent = dv.write_config("", "aliases:\n  x: parent\n");
    let child = dv.write_config("b", "local_only: true\naliases:\n  y: child\n");
    dv.allow(&parent);
    dv.allow(&child);

    let stdout = dv.export_in(&child);
    assert!(stdout.contains("alias y='child'"));
    assert!(!stdout.contains("alias x="));
}

#[test]
fn hierarchy_merges_parent_and_child() {
    let dv = Dv::new();
    let parent = dv.write_config("", "aliases:\n  a: from-parent\n  shared: parent-wins\n");
    let child = dv.write_config("sub", "aliases:\n  b: from-child\n  shared: child-wins\n");
    dv.allow(&parent);
    dv.allow(&child);

    let stdout = dv.export_in(&child);
    assert!(stdout.contains("alias a='from-parent'"));
    assert!(stdout.contains("alias b='from-child'"));
    assert!(stdout.contains("alias shared='child-wins'"));
    assert!(!stdout.contains("parent-wins"));
}

#[test]
fn unauthorized_directory_emits_nothing() {
    let dv = Dv::new();
    dv.write_config("", "aliases:\n  ll: ls -la\n");
    // never allowed

    dv.cmd()
        .arg("export")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn empty_directory_emits_nothing() {
    let dv = Dv::new();

    dv.cmd()
        .arg("export")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn conditional_alias_is_emitted_as_guarded_function() {
    let dv = Dv::new();
    dv.write_config(
        "",
        concat!(
            "aliases:\n",
            "  dc:\n",
            "    command: docker compose\n",
            "    when:\n",
            "      file: docker-compose.yml\n",
            "    else: echo 'no compose file here'\n",
        ),
    );
    dv.allow(dv.cwd());

    let stdout = dv.export_in(dv.cwd());
    assert!(stdout.contains("dc() { if [ -f 'docker-compose.yml' ]; then docker compose \"$@\";"));
    assert!(stdout.contains("else echo 'no compose file here'; fi; }"));
}

#[test]
fn functions_and_static_env_are_emitted() {
    let dv = Dv::new();
    dv.write_config(
        "",
        "functions:\n  greet: echo \"hi $1\"\nenv:\n  COLOR: blue\n",
    );
    dv.allow(dv.cwd());

    let stdout = dv.export_in(dv.cwd());
    assert!(stdout.contains("greet() {\necho \"hi $1\"\n}\n"));
    assert!(stdout.contains("export COLOR='blue'\n"));
}

#[test]
fn leaving_a_subtree_emits_cleanup() {
    let dv = Dv::new();
    let parent = dv.write_config("", "aliases:\n  stay: parent\n");
    let child = dv.write_config("deep", "aliases:\n  gone: child\nenv:\n  CHILD_VAR: x\n");
    dv.allow(&parent);
    dv.allow(&child);

    // Populate the cache for the child, as the hook would have.
    dv.export_in(&child);

    // Move up: child's names get unset, parent's survive.
    let output = dv
        .cmd_in(&parent)
        .args(["export", "--prev"])
        .arg(&child)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();

    assert!(stdout.contains("unalias gone 2>/dev/null || true\n"));
    assert!(stdout.contains("unset CHILD_VAR 2>/dev/null || true\n"));
    assert!(!stdout.contains("unalias stay"));
    assert!(stdout.contains("alias stay='parent'"));
}

#[test]
fn moving_deeper_emits_no_cleanup() {
    let dv = Dv::new();
    let parent = dv.write_config("", "aliases:\n  tool: parent\n");
    let child = dv.write_config("nested", "aliases:\n  extra: child\n");
    dv.allow(&parent);
    dv.allow(&child);

    dv.export_in(&parent);

    let output = dv
        .cmd_in(&child)
        .args(["export", "--prev"])
        .arg(&parent)
        .output()
        .unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();

    assert!(!stdout.contains("unalias"));
    assert!(stdout.contains("alias tool='parent'"));
    assert!(stdout.contains("alias extra='child'"));
}

#[test]
fn shell_env_requires_approval_before_emission() {
    let dv = Dv::new();
    dv.write_config(
        "",
        "aliases:\n  ok: echo fine\nenv:\n  STAMP:\n    sh: date +%s\n",
    );

    // Plain allow: the alias flows, the captured env var is withheld.
    dv.allow(dv.cwd());
    let stdout = dv.export_in(dv.cwd());
    assert!(stdout.contains("alias ok='echo fine'"));
    assert!(!stdout.contains("STAMP"));

    // Approving the shell commands unlocks it.
    dv.allow_with_shell(dv.cwd());
    let stdout = dv.export_in(dv.cwd());
    assert!(stdout.contains("export STAMP=\"$(date +%s)\"\n"));
}

#[test]
fn templated_shell_env_is_emitted_once_approved() {
    // The approval hash covers the declared command text; the emitted
    // command is the expanded one. A templated `sh` must therefore flow
    // immediately after approval, not be re-gated against its expansion.
    let dv = Dv::new();
    dv.write_config("", "env:\n  MARKER:\n    sh: \"echo {{ .DIRVANA_DIR }}\"\n");

    dv.allow_with_shell(dv.cwd());
    let stdout = dv.export_in(dv.cwd());
    let expected = format!(
        "export MARKER=\"$(echo {})\"\n",
        canonical_display(dv.cwd())
    );
    assert!(
        stdout.contains(&expected),
        "missing {expected:?} in {stdout:?}"
    );
}

/// Displays a path the way `std::env::current_dir` will report it inside the
/// child process (symlinks resolved), so assertions match on macOS too.
fn canonical_display(path: &std::path::Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}
