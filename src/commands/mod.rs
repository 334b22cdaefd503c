pub(crate) mod auth_cmds;
pub(crate) mod complete;
pub(crate) mod export;
pub(crate) mod maintenance;
pub(crate) mod shell_integration;

use crate::{Result, error};
use std::path::{Path, PathBuf};

/// Resolve an optional user-supplied directory argument: default to the
/// current directory, expand `~`, and anchor relative paths to the cwd.
pub(crate) fn dir_or_cwd(dir: Option<&Path>) -> Result<PathBuf> {
    let cwd = current_dir()?;

    let Some(dir) = dir else {
        return Ok(cwd);
    };

    let expanded = shellexpand::tilde(&dir.to_string_lossy()).into_owned();
    let expanded = PathBuf::from(expanded);

    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(cwd.join(expanded))
    }
}

pub(crate) fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().map_err(|source| error::Error::Io {
        path: PathBuf::from("."),
        source,
    })
}
