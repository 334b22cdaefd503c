use crate::{
    APP_VERSION, Dirvana, Result,
    cache::CacheStore,
    completion::detection::DetectionCache,
    config::ConfigFile,
    error,
    resolver::Resolver,
    shell::Shell,
};
use snafu::ResultExt;
use std::path::Path;

/// Validate one file, or the whole active hierarchy for the current
/// directory. Unlike the hierarchy walk, an explicitly named file propagates
/// its parse error instead of being skipped.
pub(crate) fn validate(app: &Dirvana, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            if !path.is_file() {
                return error::NotFoundSnafu {
                    resource: format!("config file '{}'", path.display()),
                }
                .fail();
            }
            let config = ConfigFile::load(path)?;
            report_problems(path, config.validate())?;
            println!("{}: OK", path.display());
        }
        None => {
            let cwd = super::current_dir()?;
            let resolver = Resolver::new(app.auth(), app.paths());
            let resolved = resolver.resolve(&cwd)?;

            if resolved.files.is_empty() {
                println!("No config files in the hierarchy of {}", cwd.display());
                return Ok(());
            }

            for file in &resolved.files {
                let config = ConfigFile::load(file)?;
                report_problems(file, config.validate())?;
                println!("{}: OK", file.display());
            }
        }
    }
    Ok(())
}

fn report_problems(path: &Path, problems: Vec<error::Error>) -> Result<()> {
    if problems.is_empty() {
        return Ok(());
    }
    for problem in &problems {
        eprintln!("{}: [{}] {}", path.display(), problem.code(), problem);
    }
    Err(problems.into_iter().next().expect("problems is non-empty"))
}

/// Plain-text snapshot of everything dirvana knows about the current
/// directory.
pub(crate) fn status(app: &Dirvana) -> Result<()> {
    let cwd = super::current_dir()?;
    let shell = Shell::detect();

    println!("Directory: {}", cwd.display());
    println!("Shell:     {shell}");

    let config = ConfigFile::find_in(&cwd);
    match &config {
        Some(file) => println!("Config:    {}", file.display()),
        None => println!("Config:    (none in this directory)"),
    }

    let allowed = app.auth().is_allowed(&cwd);
    println!("Authorized: {}", if allowed { "yes" } else { "no" });

    if let Some(auth) = app.auth().get_auth(&cwd) {
        if !auth.shell_commands_hash.is_empty() {
            println!("Shell commands: approved");
        }
    }

    let resolver = Resolver::new(app.auth(), app.paths());
    match resolver.resolve(&cwd) {
        Ok(resolved) => {
            println!("Active chain ({} dir(s)):", resolved.chain.len());
            for dir in &resolved.chain {
                println!("  {}", dir.display());
            }
            println!(
                "Definitions: {} alias(es), {} function(s), {} env var(s)",
                resolved.merged.aliases.len(),
                resolved.merged.functions.len(),
                resolved.merged.env.len()
            );
        }
        Err(e) => println!("Hierarchy: error: {e}"),
    }

    let unauthorized = resolver.unauthorized_dirs(&cwd);
    if !unauthorized.is_empty() {
        println!("Skipped (not authorized):");
        for dir in unauthorized {
            println!("  {}", dir.display());
        }
    }

    match app.cache().get(&cwd) {
        Some(entry) if CacheStore::is_valid_fast(&entry, APP_VERSION) => {
            println!("Cache: fresh");
        }
        Some(entry) if app.cache().validate_full(&entry, &cwd, &resolver, APP_VERSION) => {
            println!("Cache: valid");
        }
        Some(_) => println!("Cache: stale"),
        None => println!("Cache: none"),
    }

    Ok(())
}

pub(crate) fn clean(app: &Dirvana) -> Result<()> {
    app.cache().clear_all()?;
    DetectionCache::open(app.paths().detection_file()).clear_all()?;
    println!("Cleared the export cache and completion detections.");
    Ok(())
}

const STARTER_CONFIG: &str = "\
# dirvana config for this directory.
# Run `dirvana allow` here to activate it, `dirvana schema` for the format.

aliases:
  # ll: ls -la

functions: {}

env:
  # PROJECT_ROOT: \"{{ .DIRVANA_DIR }}\"
";

pub(crate) fn init() -> Result<()> {
    let cwd = super::current_dir()?;

    if let Some(existing) = ConfigFile::find_in(&cwd) {
        return error::AlreadyExistsSnafu {
            resource: format!("config file '{}'", existing.display()),
        }
        .fail();
    }

    let target = cwd.join(".dirvana.yml");
    std::fs::write(&target, STARTER_CONFIG).with_context(|_| error::IoSnafu {
        path: target.clone(),
    })?;

    println!("Created {}", target.display());
    println!("Edit it, then run `dirvana allow` to activate.");
    Ok(())
}

pub(crate) fn edit(app: &Dirvana, global: bool) -> Result<()> {
    let cwd = super::current_dir()?;

    let target = if global {
        app.paths().global_config()
    } else {
        ConfigFile::find_in(&cwd).unwrap_or_else(|| cwd.join(".dirvana.yml"))
    };

    if !target.exists() {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).with_context(|_| error::IoSnafu {
                path: parent.to_path_buf(),
            })?;
        }
        std::fs::write(&target, STARTER_CONFIG).with_context(|_| error::IoSnafu {
            path: target.clone(),
        })?;
    }

    let editor = std::env::var("VISUAL")
        .or_else(|_| std::env::var("EDITOR"))
        .unwrap_or_else(|_| "vi".to_string());

    let status = std::process::Command::new(&editor)
        .arg(&target)
        .status()
        .with_context(|_| error::CommandSpawnSnafu {
            command: editor.clone(),
        })?;

    if !status.success() {
        return error::EditorFailedSnafu { command: editor }.fail();
    }

    // Surface problems right away and drop stale cached definitions.
    let config = ConfigFile::load(&target)?;
    for problem in config.validate() {
        eprintln!("{}: [{}] {}", target.display(), problem.code(), problem);
    }

    let owner = target.parent().unwrap_or(&cwd);
    if let Err(e) = app.cache().clear_hierarchy(owner) {
        tracing::warn!(error = %e, "failed to invalidate cache after edit");
    }

    Ok(())
}
