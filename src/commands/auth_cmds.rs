use crate::{Dirvana, Result, config::ConfigFile};
use std::path::Path;

pub(crate) fn allow(app: &Dirvana, dir: Option<&Path>, auto_approve_shell: bool) -> Result<()> {
    let dir = super::dir_or_cwd(dir)?;

    app.auth().allow(&dir)?;
    if let Err(e) = app.cache().clear_hierarchy(&dir) {
        tracing::warn!(error = %e, "failed to invalidate cache after allow");
    }
    println!("Authorized {}", dir.display());

    let shell_cmds = ConfigFile::declared_shell_commands(&dir);
    if shell_cmds.is_empty() {
        return Ok(());
    }

    if auto_approve_shell {
        app.auth().approve_shell_commands(&dir, &shell_cmds)?;
        println!("Approved {} shell command(s)", shell_cmds.len());
    } else if app.auth().requires_shell_approval(&dir, &shell_cmds) {
        println!("This config captures env vars from shell commands:");
        for (name, cmd) in &shell_cmds {
            println!("  {name} = $({cmd})");
        }
        println!("They stay inactive until approved: re-run with --auto-approve-shell");
    }

    Ok(())
}

pub(crate) fn revoke(app: &Dirvana, dir: Option<&Path>) -> Result<()> {
    let dir = super::dir_or_cwd(dir)?;

    app.auth().revoke(&dir)?;
    if let Err(e) = app.cache().clear_hierarchy(&dir) {
        tracing::warn!(error = %e, "failed to invalidate cache after revoke");
    }

    println!("Revoked {}", dir.display());
    Ok(())
}

pub(crate) fn list(app: &Dirvana) -> Result<()> {
    let entries = app.auth().list();
    if entries.is_empty() {
        println!("No authorized directories.");
        return Ok(());
    }

    for (dir, auth) in entries {
        let shell_state = if auth.shell_commands_hash.is_empty() {
            ""
        } else {
            "  [shell commands approved]"
        };
        println!("{dir}{shell_state}");
    }
    Ok(())
}
