use crate::{
    Result,
    auth::AuthStore,
    config::{AliasValue, ConfigFile, EnvValue},
    error,
    paths::Paths,
    template::{self, TemplateContext},
};
use sha2::{Digest, Sha256};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// A merged config entry together with the directory whose config file
/// contributed it. The directory feeds `DIRVANA_DIR` during template
/// expansion, so an alias inherited from a parent directory still resolves
/// paths relative to the parent.
#[derive(Debug, Clone, PartialEq)]
pub struct Sourced<T> {
    pub value: T,
    pub dir: PathBuf,
}

/// The outcome of folding the active config chain, rightmost-strong.
#[derive(Debug, Clone, Default)]
pub struct MergedConfig {
    pub aliases: BTreeMap<String, Sourced<AliasValue>>,
    pub functions: BTreeMap<String, Sourced<String>>,
    pub env: BTreeMap<String, Sourced<EnvValue>>,
    pub local_only: bool,
    pub ignore_global: bool,
}

impl MergedConfig {
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty() && self.functions.is_empty() && self.env.is_empty()
    }

    /// alias/function name -> command, with functions stored as sentinels.
    pub fn command_map(&self) -> BTreeMap<String, String> {
        let mut map: BTreeMap<String, String> = self
            .aliases
            .iter()
            .map(|(name, alias)| (name.clone(), alias.value.command().to_string()))
            .collect();
        for name in self.functions.keys() {
            map.insert(name.clone(), crate::cache::CacheEntry::function_sentinel(name));
        }
        map
    }

    /// alias -> tool whose completion serves it. Explicit `completion:` tool
    /// inheritance wins; otherwise the first word of the alias command.
    /// Aliases with `completion: false` are absent.
    pub fn completion_map(&self) -> BTreeMap<String, String> {
        use crate::config::CompletionSpec;

        let mut map = BTreeMap::new();
        for (name, alias) in &self.aliases {
            let tool = match alias.value.completion() {
                Some(CompletionSpec::Toggle(false)) => continue,
                Some(CompletionSpec::Inherit(tool)) => tool.clone(),
                Some(CompletionSpec::PerShell { .. }) => continue,
                Some(CompletionSpec::Toggle(true)) | None => {
                    match alias.value.command().split_whitespace().next() {
                        Some(word) => word.to_string(),
                        None => continue,
                    }
                }
            };
            map.insert(name.clone(), tool);
        }
        map
    }

}

/// One parsed file in the candidate chain.
#[derive(Debug, Clone)]
struct LoadedConfig {
    dir: PathBuf,
    file: PathBuf,
    config: ConfigFile,
}

/// The fully resolved hierarchy for a working directory.
#[derive(Debug, Clone)]
pub struct ResolvedHierarchy {
    pub merged: MergedConfig,

    /// Directories whose configs were authorized and actually merged, in
    /// root-to-leaf order. Skipped directories and everything cut off by a
    /// `local_only` anchor are absent.
    pub chain: Vec<PathBuf>,

    /// The contributing config files, in chain order.
    pub files: Vec<PathBuf>,

    pub hierarchy_hash: String,
}

/// Resolves the active config chain for a directory: discovery, authorization
/// gating, gate folding, merge, and template expansion.
pub struct Resolver<'a> {
    auth: &'a AuthStore,
    paths: &'a Paths,
}

impl<'a> Resolver<'a> {
    pub fn new(auth: &'a AuthStore, paths: &'a Paths) -> Self {
        Self { auth, paths }
    }

    /// Resolve the merged config and active chain for `cwd`.
    ///
    /// Missing directories and missing files yield empty results. Files that
    /// fail to parse are logged and skipped: the hierarchy walk gathers as
    /// much as possible. Name conflicts in the merged result are an error.
    pub fn resolve(&self, cwd: &Path) -> Result<ResolvedHierarchy> {
        let loaded = self.load_chain(cwd)?;

        let hierarchy_hash = hash_files(loaded.iter().map(|c| c.file.as_path()))?;
        let chain = loaded.iter().map(|c| c.dir.clone()).collect();
        let files = loaded.iter().map(|c| c.file.clone()).collect();

        let mut merged = merge(&loaded)?;
        expand_templates(&mut merged, cwd);

        Ok(ResolvedHierarchy {
            merged,
            chain,
            files,
            hierarchy_hash,
        })
    }

    /// Recompute only the composite hash of the active chain, for cache
    /// validation. Reads every file in the chain.
    pub fn hierarchy_hash_for(&self, cwd: &Path) -> Result<String> {
        let loaded = self.load_chain(cwd)?;
        hash_files(loaded.iter().map(|c| c.file.as_path()))
    }

    /// Directories between `cwd` and the root that carry a config file the
    /// auth store does not (yet) allow.
    pub fn unauthorized_dirs(&self, cwd: &Path) -> Vec<PathBuf> {
        self.local_candidates(cwd)
            .into_iter()
            .filter(|(dir, _)| !self.auth.is_allowed(dir))
            .map(|(dir, _)| dir)
            .collect()
    }

    /// Discover, authorize, parse, and apply the `ignore_global` /
    /// `local_only` gates. The result is the final merge input, root to leaf.
    fn load_chain(&self, cwd: &Path) -> Result<Vec<LoadedConfig>> {
        let mut chain: Vec<LoadedConfig> = Vec::new();

        // The global file is never authorization-gated.
        let global_file = self.paths.global_config();
        if global_file.is_file() {
            match ConfigFile::load(&global_file) {
                Ok(config) => chain.push(LoadedConfig {
                    dir: global_file
                        .parent()
                        .unwrap_or_else(|| Path::new("/"))
                        .to_path_buf(),
                    file: global_file,
                    config,
                }),
                Err(e) => {
                    tracing::warn!(
                        path = %global_file.display(),
                        error = %e,
                        "skipping unparseable global config"
                    );
                }
            }
        }
        let has_global = !chain.is_empty();

        let mut first_local = true;
        for (dir, file) in self.local_candidates(cwd) {
            if !self.auth.is_allowed(&dir) {
                tracing::debug!(dir = %dir.display(), "skipping unauthorized config directory");
                continue;
            }

            let config = match ConfigFile::load(&file) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %file.display(), error = %e, "skipping unparseable config");
                    continue;
                }
            };

            if first_local && config.ignore_global && has_global {
                tracing::debug!(dir = %dir.display(), "ignore_global set; dropping global config");
                chain.retain(|c| c.file != self.paths.global_config());
            }
            first_local = false;

            // A local_only file anchors the chain: everything merged before
            // it is discarded, deeper files still apply.
            if config.local_only {
                chain.clear();
            }

            chain.push(LoadedConfig { dir, file, config });
        }

        Ok(chain)
    }

    /// Candidate `(dir, config-file)` pairs from root to `cwd`, before any
    /// gating.
    fn local_candidates(&self, cwd: &Path) -> Vec<(PathBuf, PathBuf)> {
        let mut candidates: Vec<(PathBuf, PathBuf)> = cwd
            .ancestors()
            .filter_map(|dir| ConfigFile::find_in(dir).map(|file| (dir.to_path_buf(), file)))
            .collect();
        candidates.reverse();
        candidates
    }
}

/// Fold the chain rightmost-strong into a [`MergedConfig`].
fn merge(chain: &[LoadedConfig]) -> Result<MergedConfig> {
    let mut merged = MergedConfig::default();

    for loaded in chain {
        for (name, alias) in &loaded.config.aliases {
            merged.aliases.insert(
                name.clone(),
                Sourced {
                    value: alias.clone(),
                    dir: loaded.dir.clone(),
                },
            );
        }
        for (name, body) in &loaded.config.functions {
            merged.functions.insert(
                name.clone(),
                Sourced {
                    value: body.clone(),
                    dir: loaded.dir.clone(),
                },
            );
        }
        for (name, env) in &loaded.config.env {
            merged.env.insert(
                name.clone(),
                Sourced {
                    value: env.clone(),
                    dir: loaded.dir.clone(),
                },
            );
        }

        merged.local_only = merged.local_only || loaded.config.local_only;
        merged.ignore_global = merged.ignore_global || loaded.config.ignore_global;
    }

    // A name that is both an alias and a function has no coherent emission.
    for (name, func) in &merged.functions {
        if merged.aliases.contains_key(name) {
            return error::MergedNameConflictSnafu {
                name: name.clone(),
                path: func.dir.clone(),
            }
            .fail();
        }
    }

    Ok(merged)
}

/// Expand templates in every string-valued field. Failures keep the original
/// string; see [`crate::template`].
fn expand_templates(merged: &mut MergedConfig, cwd: &Path) {
    let ctx_for = |dir: &Path| TemplateContext {
        dirvana_dir: dir.to_path_buf(),
        user_working_dir: cwd.to_path_buf(),
    };

    for alias in merged.aliases.values_mut() {
        let ctx = ctx_for(&alias.dir);
        match &mut alias.value {
            AliasValue::Simple(cmd) => *cmd = template::expand(cmd, &ctx),
            AliasValue::Detailed(obj) => {
                obj.command = template::expand(&obj.command, &ctx);
                if let Some(else_) = &mut obj.else_ {
                    *else_ = template::expand(else_, &ctx);
                }
                if let Some(when) = &mut obj.when {
                    when.map_paths(&|path| template::expand(path, &ctx));
                }
            }
        }
    }

    for func in merged.functions.values_mut() {
        let ctx = ctx_for(&func.dir);
        func.value = template::expand(&func.value, &ctx);
    }

    for env in merged.env.values_mut() {
        let ctx = ctx_for(&env.dir);
        match &mut env.value {
            EnvValue::Static(value) | EnvValue::Literal { value } => {
                *value = template::expand(value, &ctx);
            }
            EnvValue::Shell { sh } => *sh = template::expand(sh, &ctx),
        }
    }
}

/// Colon-joined SHA-256 of each file's bytes, in order. Changing any byte of
/// any file in the chain changes the composite.
fn hash_files<'f>(files: impl Iterator<Item = &'f Path>) -> Result<String> {
    let digests = files
        .map(|file| {
            let bytes = std::fs::read(file).map_err(|source| error::Error::Io {
                path: file.to_path_buf(),
                source,
            })?;
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            Ok(format!("{:x}", hasher.finalize()))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(digests.join(":"))
}
