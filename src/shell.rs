use crate::{
    condition::shell_word,
    config::{AliasObject, AliasValue, CompletionSpec, EnvValue},
    resolver::MergedConfig,
};
use std::path::Path;

/// Shell families dirvana can emit code for.
///
/// bash and zsh share the POSIX emission path; fish and PowerShell get their
/// own dialects for the constructs that differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, clap::ValueEnum)]
#[strum(serialize_all = "lowercase")]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    #[strum(serialize = "powershell", serialize = "pwsh")]
    #[value(name = "powershell", alias = "pwsh")]
    PowerShell,
}

impl Shell {
    /// Detect the active shell: `DIRVANA_SHELL` wins, then the basename of
    /// `$SHELL`, then bash.
    pub fn detect() -> Self {
        if let Ok(name) = std::env::var("DIRVANA_SHELL") {
            if let Ok(shell) = name.trim().to_lowercase().parse() {
                return shell;
            }
            tracing::warn!(value = name, "unrecognized DIRVANA_SHELL; falling back to $SHELL");
        }

        std::env::var("SHELL")
            .ok()
            .and_then(|path| {
                Path::new(&path)
                    .file_name()
                    .and_then(|name| name.to_str())
                    .and_then(|name| name.parse().ok())
            })
            .unwrap_or(Shell::Bash)
    }

    fn is_posix(self) -> bool {
        matches!(self, Shell::Bash | Shell::Zsh)
    }
}

/// Render the merged config as shell code for the host shell to evaluate.
///
/// Ordering: env vars first (alias bodies may reference them), then
/// functions, then aliases, then completion bindings. An alias whose
/// condition cannot be lowered is skipped with a warning rather than
/// aborting the whole export.
pub fn emit_export(merged: &MergedConfig, shell: Shell) -> String {
    let mut out = String::new();

    for (name, env) in &merged.env {
        emit_env(&mut out, name, &env.value, shell);
    }

    for (name, func) in &merged.functions {
        emit_function(&mut out, name, &func.value, shell);
    }

    for (name, alias) in &merged.aliases {
        match &alias.value {
            AliasValue::Simple(cmd) => emit_alias(&mut out, name, cmd, shell),
            AliasValue::Detailed(obj) if obj.when.is_none() => {
                emit_alias(&mut out, name, &obj.command, shell);
            }
            AliasValue::Detailed(obj) => emit_conditional_alias(&mut out, name, obj, shell),
        }
    }

    for (name, alias) in &merged.aliases {
        emit_completion_binding(&mut out, name, alias.value.completion(), shell);
    }

    out
}

fn emit_env(out: &mut String, name: &str, value: &EnvValue, shell: Shell) {
    match (value, shell) {
        (EnvValue::Static(v) | EnvValue::Literal { value: v }, Shell::Fish) => {
            out.push_str(&format!("set -gx {name} {}\n", shell_word(v)));
        }
        (EnvValue::Static(v) | EnvValue::Literal { value: v }, Shell::PowerShell) => {
            out.push_str(&format!("$env:{name} = {}\n", shell_word(v)));
        }
        (EnvValue::Static(v) | EnvValue::Literal { value: v }, _) => {
            out.push_str(&format!("export {name}={}\n", shell_word(v)));
        }
        (EnvValue::Shell { sh }, Shell::Fish) => {
            out.push_str(&format!("set -gx {name} ({sh})\n"));
        }
        (EnvValue::Shell { sh }, Shell::PowerShell) => {
            out.push_str(&format!("$env:{name} = $({sh})\n"));
        }
        (EnvValue::Shell { sh }, _) => {
            out.push_str(&format!("export {name}=\"$({sh})\"\n"));
        }
    }
}

fn emit_function(out: &mut String, name: &str, body: &str, shell: Shell) {
    match shell {
        Shell::Fish => {
            out.push_str(&format!("function {name}\n{body}\nend\n"));
        }
        Shell::PowerShell => {
            out.push_str(&format!("function {name} {{\n{body}\n}}\n"));
        }
        _ => {
            out.push_str(&format!("{name}() {{\n{body}\n}}\n"));
        }
    }
}

fn emit_alias(out: &mut String, name: &str, command: &str, shell: Shell) {
    match shell {
        Shell::Fish => {
            out.push_str(&format!("alias {name} {}\n", shell_word(command)));
        }
        Shell::PowerShell => {
            // Set-Alias only maps to commands, not command lines; a function
            // keeps arguments working.
            out.push_str(&format!("function {name} {{ {command} @args }}\n"));
        }
        _ => {
            out.push_str(&format!("alias {name}={}\n", shell_word(command)));
        }
    }
}

/// A conditional alias becomes a function so the `if` re-evaluates on every
/// invocation and arguments still land on the command.
fn emit_conditional_alias(out: &mut String, name: &str, obj: &AliasObject, shell: Shell) {
    let Some(when) = &obj.when else {
        emit_alias(out, name, &obj.command, shell);
        return;
    };

    let tests = match when.to_shell_test(name) {
        Ok(tests) => tests,
        Err(e) => {
            tracing::warn!(alias = name, error = %e, "skipping alias with unrepresentable condition");
            return;
        }
    };

    if !shell.is_posix() {
        // Conditions lower to POSIX test syntax only; other shells get the
        // unconditional command.
        emit_alias(out, name, &obj.command, shell);
        return;
    }

    let fallback = match &obj.else_ {
        Some(else_cmd) => else_cmd.clone(),
        None => format!(
            "echo {} >&2; return 1",
            shell_word(&format!("dirvana: {name}: condition not met"))
        ),
    };

    out.push_str(&format!(
        "{name}() {{ if {tests}; then {command} \"$@\"; else {fallback}; fi; }}\n",
        command = obj.command,
    ));
}

fn emit_completion_binding(
    out: &mut String,
    name: &str,
    spec: Option<&CompletionSpec>,
    shell: Shell,
) {
    match (spec, shell) {
        (Some(CompletionSpec::Toggle(false)), _) => {}

        (Some(CompletionSpec::Inherit(tool)), Shell::Zsh) => {
            out.push_str(&format!("compdef {name}={tool}\n"));
        }
        (Some(CompletionSpec::Inherit(tool)), Shell::Bash) => {
            // Copy the source tool's completion spec onto the alias, guarded
            // so a missing completion is not fatal.
            out.push_str(&format!(
                "if complete -p {tool} >/dev/null 2>&1; then eval \"$(complete -p {tool} | sed 's/ {tool}$/ {name}/')\"; fi\n"
            ));
        }
        (Some(CompletionSpec::Inherit(_)), _) => {}

        (Some(CompletionSpec::PerShell { bash, .. }), Shell::Bash) => {
            if let Some(code) = bash {
                out.push_str(code);
                if !code.ends_with('\n') {
                    out.push('\n');
                }
            }
        }
        (Some(CompletionSpec::PerShell { zsh, .. }), Shell::Zsh) => {
            if let Some(code) = zsh {
                out.push_str(code);
                if !code.ends_with('\n') {
                    out.push('\n');
                }
            }
        }
        (Some(CompletionSpec::PerShell { .. }), _) => {}

        // Default: route the alias through the dirvana completion bridge when
        // the bridge is loaded (see `dirvana completion SHELL`).
        (Some(CompletionSpec::Toggle(true)) | None, Shell::Bash) => {
            out.push_str(&format!(
                "if declare -F _dirvana_complete >/dev/null 2>&1; then complete -o default -F _dirvana_complete {name}; fi\n"
            ));
        }
        (Some(CompletionSpec::Toggle(true)) | None, Shell::Zsh) => {
            out.push_str(&format!(
                "if (( $+functions[_dirvana] )); then compdef _dirvana {name}; fi\n"
            ));
        }
        (Some(CompletionSpec::Toggle(true)) | None, _) => {}
    }
}
