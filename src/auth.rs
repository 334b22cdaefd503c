use crate::{
    Result, error,
    paths::{FileMode, write_atomic},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use snafu::ResultExt;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::RwLock,
};

/// Authorization record for one directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirAuth {
    pub allowed: bool,
    pub allowed_at: DateTime<Utc>,

    /// Hash of the approved `env.*.sh` command set; empty until the first
    /// shell approval.
    #[serde(default)]
    pub shell_commands_hash: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell_approved_at: Option<DateTime<Utc>>,
}

/// On-disk v2 format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct AuthFileV2 {
    #[serde(rename = "_version")]
    version: u32,

    directories: BTreeMap<String, DirAuth>,
}

const AUTH_FORMAT_VERSION: u32 = 2;

/// Persistent store of which directories the user trusts.
///
/// Two formats exist on disk. The legacy v1 file is a bare JSON array of
/// directory paths; v2 is `{"_version": 2, "directories": {...}}` in a
/// sibling file with `_v2` inserted before the extension. The v2 file is
/// preferred when present; otherwise v1 is read and upgraded in memory
/// (allowed, no shell approval) without touching the original file. All
/// writes go to the v2 path -- a pure reader never rewrites the user's
/// auth file.
///
/// Single-process concurrency only: the CLI is invoked serially per shell,
/// so an in-process reader-writer lock is all the protection the map needs.
#[derive(Debug)]
pub struct AuthStore {
    v2_path: PathBuf,
    inner: RwLock<BTreeMap<String, DirAuth>>,
}

impl AuthStore {
    /// Open the store rooted at the configured (v1) path.
    pub fn open(auth_path: &Path) -> Result<Self> {
        let v2_path = v2_sibling(auth_path);

        let directories = if v2_path.is_file() {
            let contents = std::fs::read_to_string(&v2_path).with_context(|_| {
                error::AuthStoreIoSnafu {
                    path: v2_path.clone(),
                }
            })?;
            let file: AuthFileV2 =
                serde_json::from_str(&contents).with_context(|_| error::AuthStoreFormatSnafu {
                    path: v2_path.clone(),
                })?;
            file.directories
        } else if auth_path.is_file() {
            let contents = std::fs::read_to_string(auth_path).with_context(|_| {
                error::AuthStoreIoSnafu {
                    path: auth_path.to_path_buf(),
                }
            })?;
            let v1: Vec<String> =
                serde_json::from_str(&contents).with_context(|_| error::AuthStoreFormatSnafu {
                    path: auth_path.to_path_buf(),
                })?;

            tracing::debug!(
                count = v1.len(),
                "loaded legacy v1 auth file; upgrading in memory"
            );

            v1.into_iter()
                .map(|dir| {
                    (
                        normalize_dir(Path::new(&dir)),
                        DirAuth {
                            allowed: true,
                            allowed_at: Utc::now(),
                            shell_commands_hash: String::new(),
                            shell_approved_at: None,
                        },
                    )
                })
                .collect()
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            v2_path,
            inner: RwLock::new(directories),
        })
    }

    pub fn is_allowed(&self, dir: &Path) -> bool {
        let key = normalize_dir(dir);
        self.inner
            .read()
            .expect("auth lock poisoned")
            .get(&key)
            .is_some_and(|auth| auth.allowed)
    }

    pub fn get_auth(&self, dir: &Path) -> Option<DirAuth> {
        let key = normalize_dir(dir);
        self.inner
            .read()
            .expect("auth lock poisoned")
            .get(&key)
            .cloned()
    }

    /// Trust a directory. Calling this repeatedly keeps a single entry; an
    /// existing shell approval is preserved.
    pub fn allow(&self, dir: &Path) -> Result<()> {
        let key = normalize_dir(dir);
        {
            let mut map = self.inner.write().expect("auth lock poisoned");
            map.entry(key)
                .and_modify(|auth| {
                    auth.allowed = true;
                    auth.allowed_at = Utc::now();
                })
                .or_insert_with(|| DirAuth {
                    allowed: true,
                    allowed_at: Utc::now(),
                    shell_commands_hash: String::new(),
                    shell_approved_at: None,
                });
        }
        self.persist()
    }

    /// Remove every trace of a directory, including any shell approval.
    pub fn revoke(&self, dir: &Path) -> Result<()> {
        let key = normalize_dir(dir);
        {
            let mut map = self.inner.write().expect("auth lock poisoned");
            map.remove(&key);
        }
        self.persist()
    }

    pub fn list(&self) -> Vec<(String, DirAuth)> {
        self.inner
            .read()
            .expect("auth lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn clear(&self) -> Result<()> {
        self.inner.write().expect("auth lock poisoned").clear();
        self.persist()
    }

    /// True when the directory is allowed, the config declares at least one
    /// shell env command, and the stored hash does not match the declared
    /// set. Any addition, removal, or edit of an `env.*.sh` value flips this
    /// back to true.
    pub fn requires_shell_approval(
        &self,
        dir: &Path,
        shell_cmds: &BTreeMap<String, String>,
    ) -> bool {
        if shell_cmds.is_empty() {
            return false;
        }
        let Some(auth) = self.get_auth(dir) else {
            return false;
        };
        auth.allowed && auth.shell_commands_hash != hash_shell_commands(shell_cmds)
    }

    /// Record approval of the given shell command set. The directory must
    /// already be allowed.
    pub fn approve_shell_commands(
        &self,
        dir: &Path,
        shell_cmds: &BTreeMap<String, String>,
    ) -> Result<()> {
        let key = normalize_dir(dir);
        {
            let mut map = self.inner.write().expect("auth lock poisoned");
            let auth = map
                .get_mut(&key)
                .filter(|auth| auth.allowed)
                .ok_or_else(|| error::Error::DirectoryNotAuthorized {
                    path: dir.to_path_buf(),
                })?;
            auth.shell_commands_hash = hash_shell_commands(shell_cmds);
            auth.shell_approved_at = Some(Utc::now());
        }
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let file = {
            let map = self.inner.read().expect("auth lock poisoned");
            AuthFileV2 {
                version: AUTH_FORMAT_VERSION,
                directories: map.clone(),
            }
        };

        let json = serde_json::to_string_pretty(&file).with_context(|_| {
            error::AuthStoreFormatSnafu {
                path: self.v2_path.clone(),
            }
        })?;

        write_atomic(&self.v2_path, json.as_bytes(), FileMode::Private).map_err(|e| {
            error::Error::AuthStoreIo {
                path: self.v2_path.clone(),
                source: std::io::Error::other(e.to_string()),
            }
        })
    }
}

/// Normalize a directory key: lexical clean, no trailing separator.
pub(crate) fn normalize_dir(dir: &Path) -> String {
    crate::template::clean_path(&dir.to_string_lossy())
}

/// SHA-256 over the sorted-by-key `k=v` lines of the declared shell commands.
pub(crate) fn hash_shell_commands(shell_cmds: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (name, cmd) in shell_cmds {
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(cmd.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Derive the v2 sibling path: `auth.json` -> `auth_v2.json`.
fn v2_sibling(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "auth".to_string());
    let name = match path.extension() {
        Some(ext) => format!("{stem}_v2.{}", ext.to_string_lossy()),
        None => format!("{stem}_v2"),
    };
    path.with_file_name(name)
}
