use crate::{Result, error};
use etcetera::{BaseStrategy, choose_base_strategy};
use snafu::ResultExt;
use std::path::{Path, PathBuf};

/// Well-known file locations for everything dirvana persists.
///
/// Layout:
/// - `<config>/dirvana/global.yml` - the global config file
/// - `<config>/dirvana/auth.json` - legacy v1 authorization store
/// - `<config>/dirvana/auth_v2.json` - v2 authorization store (all writes)
/// - `<cache>/dirvana/cache.json` - export cache
/// - `<cache>/dirvana/completion-detection.json` - tool -> strategy detections
/// - `<cache>/dirvana/completion-registry-v1.yml` (+ `.hash`) - registry catalog
/// - `<cache>/dirvana/completion-scripts/bash/<tool>` - downloaded scripts
///
/// `<config>` follows `$XDG_CONFIG_HOME` (default `~/.config`) and `<cache>`
/// `$XDG_CACHE_HOME` (default `~/.cache`). The whole tree can be rerooted with
/// the hidden `--app-dir` flag, which the test suites use for isolation.
#[derive(Debug, Clone)]
pub struct Paths {
    config_dir: PathBuf,
    cache_dir: PathBuf,
}

/// Version tag baked into the registry cache filename so a future catalog
/// format can coexist with the old one on disk.
const REGISTRY_VERSION: &str = "v1";

impl Paths {
    /// Resolve the directory layout, honoring the test override if given.
    pub fn new(app_dir: Option<&Path>) -> Result<Self> {
        if let Some(app_dir) = app_dir {
            return Ok(Self {
                config_dir: app_dir.join("config"),
                cache_dir: app_dir.join("cache"),
            });
        }

        let strategy = choose_base_strategy().map_err(|e| error::Error::Io {
            path: PathBuf::from("~"),
            source: std::io::Error::other(e.to_string()),
        })?;

        Ok(Self {
            config_dir: strategy.config_dir().join("dirvana"),
            cache_dir: strategy.cache_dir().join("dirvana"),
        })
    }

    pub fn global_config(&self) -> PathBuf {
        self.config_dir.join("global.yml")
    }

    /// The legacy (v1) authorization store path. See [`crate::auth::AuthStore`]
    /// for the v1/v2 negotiation rules.
    pub fn auth_file(&self) -> PathBuf {
        self.config_dir.join("auth.json")
    }

    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir.join("cache.json")
    }

    pub fn detection_file(&self) -> PathBuf {
        self.cache_dir.join("completion-detection.json")
    }

    pub fn registry_file(&self) -> PathBuf {
        self.cache_dir
            .join(format!("completion-registry-{REGISTRY_VERSION}.yml"))
    }

    pub fn registry_hash_file(&self) -> PathBuf {
        self.cache_dir
            .join(format!("completion-registry-{REGISTRY_VERSION}.yml.hash"))
    }

    /// Directory for downloaded completion scripts. Scripts for every shell
    /// land under `bash/` because the bash runner serves all shells.
    pub fn scripts_dir(&self) -> PathBuf {
        self.cache_dir.join("completion-scripts").join("bash")
    }

    pub fn script_path(&self, tool: &str) -> PathBuf {
        self.scripts_dir().join(tool)
    }
}

/// Write `contents` to `path` atomically: write to a temp file in the same
/// directory, then rename over the destination. A partial write can never be
/// observed at `path`.
pub(crate) fn write_atomic(path: &Path, contents: &[u8], mode: FileMode) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).with_context(|_| error::IoSnafu {
        path: parent.to_path_buf(),
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).with_context(|_| error::IoSnafu {
        path: parent.to_path_buf(),
    })?;

    use std::io::Write;
    tmp.write_all(contents).with_context(|_| error::IoSnafu {
        path: path.to_path_buf(),
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(match mode {
            FileMode::Private => 0o600,
            FileMode::Shared => 0o644,
        });
        tmp.as_file()
            .set_permissions(perms)
            .with_context(|_| error::IoSnafu {
                path: path.to_path_buf(),
            })?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    tmp.persist(path).map_err(|e| error::Error::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    Ok(())
}

/// Permissions for persisted files: the auth store is `Private` (0600),
/// everything else `Shared` (0644).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileMode {
    Private,
    Shared,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_dir_override_reroots_everything() {
        let temp = tempfile::tempdir().unwrap();
        let paths = Paths::new(Some(temp.path())).unwrap();

        assert!(paths.global_config().starts_with(temp.path()));
        assert!(paths.auth_file().starts_with(temp.path()));
        assert!(paths.cache_file().starts_with(temp.path()));
        assert!(paths.script_path("kubectl").starts_with(temp.path()));
    }

    #[test]
    fn script_paths_are_bash_rooted() {
        let temp = tempfile::tempdir().unwrap();
        let paths = Paths::new(Some(temp.path())).unwrap();

        let script = paths.script_path("helm");
        assert!(script.ends_with("completion-scripts/bash/helm"));
    }

    #[test]
    fn write_atomic_replaces_contents() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("nested").join("file.json");

        write_atomic(&target, b"first", FileMode::Shared).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"first");

        write_atomic(&target, b"second", FileMode::Shared).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"second");
    }

    #[cfg(unix)]
    #[test]
    fn private_mode_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("auth.json");

        write_atomic(&target, b"{}", FileMode::Private).unwrap();
        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
