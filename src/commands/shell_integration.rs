use crate::{Result, error, shell::Shell};
use snafu::ResultExt;
use std::path::PathBuf;

/// The cd-hook for each shell family. The hook re-exports on every prompt
/// where the directory changed, honors `DIRVANA_ENABLED=false` entirely at
/// the shell level, and threads the previous directory through
/// `DIRVANA_PREV_DIR` for context cleanup.
fn hook_script(shell: Shell) -> &'static str {
    match shell {
        Shell::Bash => {
            r#"_dirvana_hook() {
  [ "${DIRVANA_ENABLED:-true}" = "false" ] && return 0
  if [ "$PWD" != "${DIRVANA_PREV_DIR:-}" ]; then
    eval "$(DIRVANA_SHELL=bash dirvana export --prev "${DIRVANA_PREV_DIR:-}")"
    DIRVANA_PREV_DIR="$PWD"
  fi
}
if [[ ";${PROMPT_COMMAND:-};" != *";_dirvana_hook;"* ]]; then
  PROMPT_COMMAND="_dirvana_hook${PROMPT_COMMAND:+;$PROMPT_COMMAND}"
fi
"#
        }
        Shell::Zsh => {
            r#"_dirvana_hook() {
  [[ "${DIRVANA_ENABLED:-true}" == "false" ]] && return 0
  eval "$(DIRVANA_SHELL=zsh dirvana export --prev "${DIRVANA_PREV_DIR:-}")"
  DIRVANA_PREV_DIR="$PWD"
}
autoload -U add-zsh-hook
add-zsh-hook chpwd _dirvana_hook
_dirvana_hook
"#
        }
        Shell::Fish => {
            r#"function _dirvana_hook --on-variable PWD
  test "$DIRVANA_ENABLED" = "false"; and return
  DIRVANA_SHELL=fish dirvana export --prev "$DIRVANA_PREV_DIR" | source
  set -g DIRVANA_PREV_DIR $PWD
end
_dirvana_hook
"#
        }
        Shell::PowerShell => {
            r#"function Invoke-DirvanaHook {
  if ($env:DIRVANA_ENABLED -eq "false") { return }
  if ($PWD.Path -ne $env:DIRVANA_PREV_DIR) {
    $env:DIRVANA_SHELL = "powershell"
    dirvana export --prev "$env:DIRVANA_PREV_DIR" | Out-String | Invoke-Expression
    $env:DIRVANA_PREV_DIR = $PWD.Path
  }
}
$function:prompt = { Invoke-DirvanaHook; "PS $($PWD.Path)> " }
"#
        }
    }
}

/// Tab-completion bridge: a shell function that forwards completion requests
/// for managed aliases to `dirvana complete` and splices the answers back.
fn completion_bridge(shell: Shell) -> &'static str {
    match shell {
        Shell::Bash => {
            r#"_dirvana_complete() {
  local tool=${COMP_WORDS[0]}
  local words=("${COMP_WORDS[@]:1:COMP_CWORD}")
  local IFS=$'\n'
  COMPREPLY=($(dirvana complete "$tool" "${words[@]}" 2>/dev/null | cut -f1))
}
"#
        }
        Shell::Zsh => {
            r#"_dirvana() {
  local -a pairs values
  pairs=("${(f)$(dirvana complete "${words[1]}" "${(@)words[2,-1]}" 2>/dev/null)}")
  values=()
  local pair
  for pair in $pairs; do
    values+=("${pair%%$'\t'*}")
  done
  (( ${#values} )) && compadd -a values
}
"#
        }
        Shell::Fish => {
            r#"function __dirvana_complete
  set -l words (commandline -opc)
  dirvana complete $words[1] $words[2..-1] (commandline -ct) 2>/dev/null | cut -f1
end
"#
        }
        Shell::PowerShell => "# Completion bridging is not available for PowerShell yet.\n",
    }
}

pub(crate) fn hook(shell: Option<Shell>) -> Result<()> {
    let shell = shell.unwrap_or_else(Shell::detect);
    print!("{}", hook_script(shell));
    Ok(())
}

pub(crate) fn completion(shell: Shell) -> Result<()> {
    print!("{}", completion_bridge(shell));
    Ok(())
}

/// Append the hook line to the shell's RC file, once.
pub(crate) fn setup(shell: Option<Shell>) -> Result<()> {
    let shell = shell.unwrap_or_else(Shell::detect);

    let Some(rc_path) = rc_file(shell) else {
        println!("No RC file convention for {shell}; add this to your profile instead:");
        println!("  eval \"$(dirvana hook --shell {shell})\"");
        return Ok(());
    };

    let hook_line = match shell {
        Shell::Fish => format!("dirvana hook --shell {shell} | source"),
        _ => format!("command -v dirvana >/dev/null 2>&1 && eval \"$(dirvana hook --shell {shell})\""),
    };

    let existing = std::fs::read_to_string(&rc_path).unwrap_or_default();
    if existing.contains("dirvana hook") {
        println!("Hook already installed in {}", rc_path.display());
        return Ok(());
    }

    if let Some(parent) = rc_path.parent() {
        std::fs::create_dir_all(parent).with_context(|_| error::IoSnafu {
            path: parent.to_path_buf(),
        })?;
    }

    let mut contents = existing;
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str("\n# dirvana: directory-scoped shell environments\n");
    contents.push_str(&hook_line);
    contents.push('\n');

    std::fs::write(&rc_path, contents).with_context(|_| error::IoSnafu {
        path: rc_path.clone(),
    })?;

    println!("Installed the {shell} hook in {}", rc_path.display());
    println!("Restart your shell or source the file to activate it.");
    Ok(())
}

fn rc_file(shell: Shell) -> Option<PathBuf> {
    let home = etcetera::home_dir().ok()?;
    match shell {
        Shell::Bash => Some(home.join(".bashrc")),
        Shell::Zsh => {
            let zdotdir = std::env::var_os("ZDOTDIR")
                .map(PathBuf::from)
                .unwrap_or(home);
            Some(zdotdir.join(".zshrc"))
        }
        Shell::Fish => Some(home.join(".config").join("fish").join("config.fish")),
        Shell::PowerShell => None,
    }
}

/// Human- and machine-readable description of the config format.
pub(crate) fn schema() -> Result<()> {
    let schema = serde_json::json!({
        "filenames": crate::config::CONFIG_FILENAMES,
        "formats": ["yaml", "toml", "json"],
        "fields": {
            "aliases": {
                "type": "map of name -> string | object",
                "name_pattern": "[A-Za-z_][A-Za-z0-9_-]*",
                "object": {
                    "command": "string (required, non-empty)",
                    "when": "condition: {file|dir|var|command} atoms, {all|any} composites",
                    "else": "string, runs when the condition fails",
                    "completion": "string (inherit a tool) | false (disable) | {bash, zsh} (verbatim)"
                }
            },
            "functions": {
                "type": "map of name -> body string",
                "name_pattern": "[A-Za-z_][A-Za-z0-9_-]*"
            },
            "env": {
                "type": "map of name -> string | {sh: command} | {value: string}",
                "name_pattern": "[A-Za-z_][A-Za-z0-9_]*",
                "note": "{sh: ...} entries require shell approval (`dirvana allow --auto-approve-shell`)"
            },
            "local_only": "bool: discard every config above this one",
            "ignore_global": "bool: on the first local file, discard the global config"
        },
        "templates": {
            "syntax": "Go-style {{ ... }} actions",
            "variables": ["DIRVANA_DIR", "USER_WORKING_DIR"],
            "functions": ["base", "dir", "clean", "ext", "upper", "lower", "replace", "trunc", "sha256sum"],
            "control_flow": ["if", "else", "end"]
        }
    });

    println!(
        "{}",
        serde_json::to_string_pretty(&schema).context(error::CacheSerializeSnafu)?
    );
    Ok(())
}
