//! End-to-end `complete` scenarios driven through stub tools on PATH.
use crate::utils::Dv;
use predicates::prelude::*;

/// A stub speaking the Cobra `__complete` protocol with a FilterFileExt
/// directive: the engine must synthesize filesystem suggestions itself.
const COBRA_FILE_EXT_STUB: &str = "#!/bin/bash
if [ \"$1\" = \"__complete\" ]; then
  printf 'json\\nyaml\\n:8\\n'
fi
";

/// A stub speaking the Cobra protocol with plain subcommand values.
const COBRA_SUBCOMMANDS_STUB: &str = "#!/bin/bash
if [ \"$1\" = \"__complete\" ]; then
  printf 'get\\tGet things\\napply\\tApply things\\ngut\\t\\n:4\\n'
fi
";

/// A stub that only answers the COMP_LINE environment protocol.
const ENV_STUB: &str = "#!/bin/bash
if [ -n \"$COMP_LINE\" ]; then
  printf 'alpha\\nbeta\\n'
fi
";

#[test]
fn cobra_filter_file_ext_lists_matching_files_and_dirs() {
    let dv = Dv::new();
    let path = dv.install_stub_tool("stubtool", COBRA_FILE_EXT_STUB);

    std::fs::write(dv.cwd().join("file.json"), "{}").unwrap();
    std::fs::write(dv.cwd().join("file.yaml"), "").unwrap();
    std::fs::write(dv.cwd().join("file.txt"), "").unwrap();
    std::fs::create_dir(dv.cwd().join("sub")).unwrap();

    let output = dv
        .cmd()
        .env("PATH", &path)
        .args(["complete", "stubtool", ""])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();

    assert!(stdout.contains("file.json"));
    assert!(stdout.contains("file.yaml"));
    assert!(stdout.contains("sub/"));
    assert!(!stdout.contains("file.txt"));
}

#[test]
fn cobra_values_are_prefix_filtered() {
    let dv = Dv::new();
    let path = dv.install_stub_tool("stubtool", COBRA_SUBCOMMANDS_STUB);

    let output = dv
        .cmd()
        .env("PATH", &path)
        .args(["complete", "stubtool", "g"])
        .output()
        .unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();

    assert!(stdout.contains("get\tGet things"));
    assert!(stdout.contains("gut"));
    assert!(!stdout.contains("apply"));
}

#[test]
fn detection_race_is_cached_for_subsequent_calls() {
    let dv = Dv::new();
    let path = dv.install_stub_tool("envtool", ENV_STUB);

    dv.cmd()
        .env("PATH", &path)
        .args(["complete", "envtool", ""])
        .assert()
        .success()
        .stdout(predicate::str::contains("alpha"));

    // The winner is recorded in the detection cache file.
    let detection = dv
        .test_fs
        .app_root
        .path()
        .join("cache")
        .join("completion-detection.json");
    let contents = std::fs::read_to_string(&detection).unwrap();
    assert!(contents.contains("envtool"));
    assert!(contents.contains("Env"));

    // Second call is served from the cached detection.
    dv.cmd()
        .env("PATH", &path)
        .args(["complete", "envtool", "b"])
        .assert()
        .success()
        .stdout("beta\n");
}

#[test]
fn aliases_complete_through_their_underlying_tool() {
    let dv = Dv::new();
    let path = dv.install_stub_tool("stubtool", COBRA_SUBCOMMANDS_STUB);

    dv.write_config("", "aliases:\n  st: stubtool --verbose\n");
    dv.allow(dv.cwd());
    dv.export_in(dv.cwd());

    let output = dv
        .cmd()
        .env("PATH", &path)
        .args(["complete", "st", "ap"])
        .output()
        .unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("apply"));
}

#[test]
fn functions_yield_no_suggestions() {
    let dv = Dv::new();
    dv.write_config("", "functions:\n  deploy: make deploy \"$@\"\n");
    dv.allow(dv.cwd());
    dv.export_in(dv.cwd());

    dv.cmd()
        .args(["complete", "deploy", ""])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn unknown_tool_completes_to_nothing_but_exits_zero() {
    let dv = Dv::new();

    dv.cmd()
        .args(["complete", "tool-that-does-not-exist-anywhere", ""])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}
