use crate::{
    APP_VERSION, Dirvana, Result,
    cache::{CacheEntry, CacheStore},
    cleanup,
    config::{ConfigFile, EnvValue},
    resolver::{MergedConfig, Resolver},
    shell::{self, Shell},
};
use chrono::Utc;
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
};

/// The `export` hot path: resolve (or reuse) the merged config for the
/// current directory, emit cleanup for whatever the previous directory left
/// behind, then emit the new definitions.
///
/// Everything written to stdout is `eval`-ed by the host shell; on any state
/// where emitting would be wrong (unauthorized leaf directory) this prints
/// nothing and exits 0, which the hook tolerates.
pub(crate) fn run(app: &Dirvana, prev: Option<&Path>) -> Result<()> {
    let cwd = super::current_dir()?;
    let shell = Shell::detect();

    // Leaf gate: a config right here that the user has not trusted means no
    // output at all, not a partial merge.
    if ConfigFile::find_in(&cwd).is_some() && !app.auth().is_allowed(&cwd) {
        tracing::debug!(
            dir = %cwd.display(),
            "directory has a config but is not authorized; emitting nothing"
        );
        return Ok(());
    }

    let resolver = Resolver::new(app.auth(), app.paths());
    let entry = cached_or_fresh_entry(app, &resolver, &cwd, shell)?;

    let mut output = String::new();

    if let Some(prev_dir) = prev.filter(|p| *p != cwd.as_path()) {
        if let Some(prev_entry) = app.cache().get(prev_dir) {
            let curr_commands = entry.merged_command_map.clone().unwrap_or_default();
            let curr_env: BTreeSet<String> = entry.env_names.iter().cloned().collect();
            let plan = cleanup::plan(&prev_entry, &entry.chain, &curr_commands, &curr_env);
            output.push_str(&cleanup::emit(&plan, shell));
        }
    }

    output.push_str(&entry.shell_code);
    print!("{output}");
    Ok(())
}

/// The shared cache path used by both `export` and `complete`: fast TTL
/// check first, hash revalidation second, full resolve as the fallback.
pub(crate) fn cached_or_fresh_entry(
    app: &Dirvana,
    resolver: &Resolver<'_>,
    cwd: &Path,
    shell: Shell,
) -> Result<CacheEntry> {
    if let Some(entry) = app.cache().get(cwd) {
        let shell_matches = entry.shell == shell.to_string();
        if shell_matches
            && (CacheStore::is_valid_fast(&entry, APP_VERSION)
                || app.cache().validate_full(&entry, cwd, resolver, APP_VERSION))
        {
            return Ok(entry);
        }
    }

    build_entry(app, resolver, cwd, shell)
}

fn build_entry(
    app: &Dirvana,
    resolver: &Resolver<'_>,
    cwd: &Path,
    shell: Shell,
) -> Result<CacheEntry> {
    let resolved = resolver.resolve(cwd)?;
    let mut merged = resolved.merged;

    withhold_unapproved_shell_env(app, &mut merged);

    let entry = CacheEntry {
        path: cwd.to_path_buf(),
        timestamp: Utc::now(),
        app_version: APP_VERSION.to_string(),
        hierarchy_hash: resolved.hierarchy_hash,
        merged_command_map: Some(merged.command_map()),
        merged_completion_map: merged.completion_map(),
        local_only: merged.local_only,
        chain: resolved.chain,
        env_names: merged.env.keys().cloned().collect(),
        shell_code: shell::emit_export(&merged, shell),
        shell: shell.to_string(),
    };

    // An empty hierarchy has nothing worth caching (and no hash to validate
    // against); everything else persists for the next invocation.
    if !entry.hierarchy_hash.is_empty() {
        if let Err(e) = app.cache().set(entry.clone()) {
            tracing::warn!(error = %e, "failed to persist export cache");
        }
    }

    Ok(entry)
}

/// Shell-approval gate: `env.*.sh` entries from a directory whose declared
/// command set is not (or no longer) approved are withheld from emission.
/// The rest of the directory's config still applies.
///
/// The merged values are already template-expanded, but the approval hash
/// covers the raw declared set, so the check re-reads each contributing
/// directory's file the same way `allow` does.
fn withhold_unapproved_shell_env(app: &Dirvana, merged: &mut MergedConfig) {
    let mut names_by_dir: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
    for (name, env) in &merged.env {
        if matches!(env.value, EnvValue::Shell { .. }) {
            names_by_dir
                .entry(env.dir.clone())
                .or_default()
                .push(name.clone());
        }
    }

    for (dir, names) in names_by_dir {
        let declared = ConfigFile::declared_shell_commands(&dir);
        if app.auth().requires_shell_approval(&dir, &declared) {
            tracing::warn!(
                dir = %dir.display(),
                count = names.len(),
                "shell env commands await approval; run `dirvana allow --auto-approve-shell`"
            );
            for name in &names {
                merged.env.remove(name);
            }
        }
    }
}
