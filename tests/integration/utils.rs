//! Utility functions to help run our CLI as part of a test
use assert_cmd::Command;
use assert_fs::TempDir;
use std::path::{Path, PathBuf};

/// Isolated filesystem structure for running the command: a fake app root
/// (config + cache + auth re-rooted via the hidden `--app-dir`) and a working
/// directory tree to put config files in.
pub(crate) struct TestFs {
    pub(crate) app_root: TempDir,
    pub(crate) cwd: TempDir,
}

impl TestFs {
    fn new() -> Self {
        let app_root = TempDir::with_prefix("dirvana-app-").unwrap();
        let cwd = TempDir::with_prefix("dirvana-cwd-").unwrap();
        Self { app_root, cwd }
    }
}

/// Represents the `dirvana` binary for use in tests, pinned to an isolated
/// filesystem so host config and auth files can never leak in.
pub(crate) struct Dv {
    pub(crate) test_fs: TestFs,
}

impl Dv {
    pub(crate) fn new() -> Self {
        Self {
            test_fs: TestFs::new(),
        }
    }

    /// A command running in the test working directory.
    pub(crate) fn cmd(&self) -> Command {
        self.cmd_in(self.test_fs.cwd.path())
    }

    /// A command running in an arbitrary directory (which must outlive the
    /// invocation).
    pub(crate) fn cmd_in(&self, dir: &Path) -> Command {
        let mut cmd = Command::cargo_bin("dirvana").unwrap();
        cmd.current_dir(dir)
            .env("DIRVANA_APP_DIR", self.test_fs.app_root.path())
            .env("DIRVANA_SHELL", "bash")
            .env_remove("DIRVANA_PREV_DIR")
            .env_remove("DIRVANA_LOG")
            .env_remove("DIRVANA_LOG_LEVEL")
            .env_remove("DIRVANA_DEV");
        cmd
    }

    pub(crate) fn cwd(&self) -> &Path {
        self.test_fs.cwd.path()
    }

    /// Create `rel` under the test cwd (empty `rel` is the cwd itself) and
    /// write a `.dirvana.yml` there.
    pub(crate) fn write_config(&self, rel: &str, contents: &str) -> PathBuf {
        let dir = if rel.is_empty() {
            self.cwd().to_path_buf()
        } else {
            self.cwd().join(rel)
        };
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(".dirvana.yml"), contents).unwrap();
        dir
    }

    /// Authorize a directory through the real `allow` subcommand.
    pub(crate) fn allow(&self, dir: &Path) {
        self.cmd_in(dir).arg("allow").assert().success();
    }

    pub(crate) fn allow_with_shell(&self, dir: &Path) {
        self.cmd_in(dir)
            .args(["allow", "--auto-approve-shell"])
            .assert()
            .success();
    }

    /// Run `export` in `dir` and return captured stdout.
    pub(crate) fn export_in(&self, dir: &Path) -> String {
        let output = self.cmd_in(dir).arg("export").output().unwrap();
        assert!(output.status.success(), "export failed: {output:?}");
        String::from_utf8(output.stdout).unwrap()
    }

    /// Create an executable stub tool under the app root and return the
    /// value to use as `PATH` so the stub is found first.
    pub(crate) fn install_stub_tool(&self, name: &str, script: &str) -> String {
        let bin_dir = self.test_fs.app_root.path().join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();

        let path = bin_dir.join(name);
        std::fs::write(&path, script).unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let host_path = std::env::var("PATH").unwrap_or_default();
        format!("{}:{host_path}", bin_dir.display())
    }
}
