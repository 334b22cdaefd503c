use crate::{cache::CacheEntry, shell::Shell};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

/// Names that must be undefined before emitting new definitions, derived
/// from the previous directory's cached entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupPlan {
    /// Directories active before but not now.
    pub departed: Vec<PathBuf>,
    pub aliases: Vec<String>,
    pub functions: Vec<String>,
    pub env: Vec<String>,
}

impl CleanupPlan {
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty() && self.functions.is_empty() && self.env.is_empty()
    }
}

/// Diff the previous active chain against the current one and collect every
/// name the departed configs contributed that the new merge no longer
/// defines.
///
/// Moving deeper into the previous subtree leaves the previous chain as a
/// prefix of the current one, so nothing departs and the plan is empty.
/// Names that departed configs contributed but the new merge redefines are
/// left alone: the fresh definition overwrites them anyway.
pub fn plan(
    prev_entry: &CacheEntry,
    curr_chain: &[PathBuf],
    curr_commands: &std::collections::BTreeMap<String, String>,
    curr_env: &BTreeSet<String>,
) -> CleanupPlan {
    let curr: BTreeSet<&Path> = curr_chain.iter().map(PathBuf::as_path).collect();
    let departed: Vec<PathBuf> = prev_entry
        .chain
        .iter()
        .filter(|dir| !curr.contains(dir.as_path()))
        .cloned()
        .collect();

    if departed.is_empty() {
        return CleanupPlan::default();
    }

    let mut plan = CleanupPlan {
        departed,
        ..Default::default()
    };

    if let Some(prev_commands) = &prev_entry.merged_command_map {
        for (name, command) in prev_commands {
            if curr_commands.contains_key(name) {
                continue;
            }
            if CacheEntry::is_function(command) {
                plan.functions.push(name.clone());
            } else {
                plan.aliases.push(name.clone());
            }
        }
    }

    for name in &prev_entry.env_names {
        if !curr_env.contains(name) {
            plan.env.push(name.clone());
        }
    }

    plan
}

/// Render the plan as shell code. Every line is guarded so undefining a name
/// that is already gone cannot fail the hook.
pub fn emit(plan: &CleanupPlan, shell: Shell) -> String {
    if plan.is_empty() {
        return String::new();
    }

    let mut out = String::new();

    for name in &plan.aliases {
        match shell {
            Shell::Fish => out.push_str(&format!("functions -e {name} 2>/dev/null\n")),
            Shell::PowerShell => {
                out.push_str(&format!("Remove-Item -ErrorAction Ignore Function:{name}\n"));
            }
            _ => {
                out.push_str(&format!("unalias {name} 2>/dev/null || true\n"));
                emit_unbind_completion(&mut out, name, shell);
            }
        }
    }

    for name in &plan.functions {
        match shell {
            Shell::Fish => out.push_str(&format!("functions -e {name} 2>/dev/null\n")),
            Shell::PowerShell => {
                out.push_str(&format!("Remove-Item -ErrorAction Ignore Function:{name}\n"));
            }
            _ => out.push_str(&format!("unset -f {name} 2>/dev/null || true\n")),
        }
    }

    for name in &plan.env {
        match shell {
            Shell::Fish => out.push_str(&format!("set -e {name} 2>/dev/null\n")),
            Shell::PowerShell => {
                out.push_str(&format!("Remove-Item -ErrorAction Ignore Env:{name}\n"));
            }
            _ => out.push_str(&format!("unset {name} 2>/dev/null || true\n")),
        }
    }

    out
}

fn emit_unbind_completion(out: &mut String, name: &str, shell: Shell) {
    match shell {
        Shell::Bash => out.push_str(&format!("complete -r {name} 2>/dev/null || true\n")),
        Shell::Zsh => out.push_str(&format!("compdef -d {name} 2>/dev/null || true\n")),
        Shell::Fish | Shell::PowerShell => {}
    }
}
