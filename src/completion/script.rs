use crate::{
    Result,
    completion::{Strategy, Suggestion, registry::RegistryClient},
    condition::shell_word,
    error, exec,
    paths::Paths,
    shell::Shell,
};
use async_trait::async_trait;
use snafu::ResultExt;
use std::path::PathBuf;

/// Locations probed for an installed bash completion script, before the
/// download cache.
const SYSTEM_COMPLETION_DIRS: &[&str] = &[
    "/usr/share/bash-completion/completions",
    "/usr/local/share/bash-completion/completions",
    "/etc/bash_completion.d",
    "/usr/local/etc/bash_completion.d",
    "/opt/homebrew/etc/bash_completion.d",
];

/// Paths tried for the bash-completion framework itself; the first hit is
/// sourced before the tool's script so helpers like `_init_completion` exist.
const BASH_COMPLETION_FRAMEWORKS: &[&str] = &[
    "/usr/share/bash-completion/bash_completion",
    "/etc/bash_completion",
    "/usr/local/etc/bash_completion",
    "/opt/homebrew/etc/profile.d/bash_completion.sh",
];

/// Completion by sourcing the tool's bash completion script in a constructed
/// bash program and reading `COMPREPLY`. Scripts come from the system
/// locations or, failing that, the completion registry.
pub struct ScriptStrategy {
    paths: Paths,
    registry: RegistryClient,
}

#[async_trait]
impl Strategy for ScriptStrategy {
    fn name(&self) -> &'static str {
        "Script"
    }

    async fn supports(&self, tool: &str, _args: &[String]) -> bool {
        if self.find_local_script(tool).is_some() {
            return true;
        }

        // Registry lookup does blocking I/O (and possibly network).
        let registry = self.registry.clone();
        let tool = tool.to_string();
        tokio::task::spawn_blocking(move || {
            registry
                .load()
                .map(|catalog| catalog.tools.contains_key(&tool))
                .unwrap_or(false)
        })
        .await
        .unwrap_or(false)
    }

    async fn complete(&self, tool: &str, args: &[String]) -> Result<Vec<Suggestion>> {
        let script = match self.find_local_script(tool) {
            Some(path) => path,
            None => {
                let registry = self.registry.clone();
                let tool_owned = tool.to_string();
                tokio::task::spawn_blocking(move || {
                    registry.ensure_script(&tool_owned, Shell::Bash)
                })
                .await
                .context(error::TokioJoinSnafu)??
            }
        };

        let program = build_program(tool, args, &script);
        let output = exec::run_capturing(
            "bash",
            &["-c".to_string(), program],
            &[],
            exec::DEFAULT_COMMAND_TIMEOUT,
        )
        .await?;

        Ok(output
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(|line| Suggestion {
                value: line.to_string(),
                description: String::new(),
            })
            .collect())
    }
}

impl ScriptStrategy {
    pub fn new(paths: Paths, registry: RegistryClient) -> Self {
        Self { paths, registry }
    }

    fn find_local_script(&self, tool: &str) -> Option<PathBuf> {
        SYSTEM_COMPLETION_DIRS
            .iter()
            .map(|dir| PathBuf::from(dir).join(tool))
            .chain(std::iter::once(self.paths.script_path(tool)))
            .find(|candidate| candidate.is_file())
    }
}

/// Construct the bash program that drives the completion function.
///
/// Every interpolated value is single-quote-escaped. The completion
/// environment mirrors what bash-completion sets up: `COMP_WORDS`,
/// `COMP_CWORD`, `COMP_LINE`, `COMP_POINT`, plus the `words`/`cword`/`cur`/
/// `prev` convenience variables. Whichever of `__TOOL_main`, `_TOOL`,
/// `__TOOL` is defined gets invoked, and `COMPREPLY` is printed one element
/// per line.
fn build_program(tool: &str, args: &[String], script: &std::path::Path) -> String {
    let mut words: Vec<String> = Vec::with_capacity(args.len() + 1);
    words.push(tool.to_string());
    words.extend_from_slice(args);
    if args.is_empty() {
        words.push(String::new());
    }

    let comp_line = words.join(" ");
    let comp_point = comp_line.len();
    let cword = words.len() - 1;
    let cur = words.last().cloned().unwrap_or_default();
    let prev = words
        .get(words.len().saturating_sub(2))
        .cloned()
        .unwrap_or_default();

    let quoted_words: Vec<String> = words.iter().map(|w| shell_word(w)).collect();
    let fn_base = sanitize_fn_name(tool);

    format!(
        r#"for __dv_fw in {frameworks}; do
  if [ -f "$__dv_fw" ]; then . "$__dv_fw" 2>/dev/null; break; fi
done
. {script} 2>/dev/null || exit 0
COMP_WORDS=({words})
COMP_CWORD={cword}
COMP_LINE={comp_line}
COMP_POINT={comp_point}
words=("${{COMP_WORDS[@]}}")
cword=$COMP_CWORD
cur={cur}
prev={prev}
if declare -F __{fn_base}_main >/dev/null 2>&1; then __{fn_base}_main
elif declare -F _{fn_base} >/dev/null 2>&1; then _{fn_base}
elif declare -F __{fn_base} >/dev/null 2>&1; then __{fn_base}
else exit 0
fi
if [ ${{#COMPREPLY[@]}} -gt 0 ]; then printf '%s\n' "${{COMPREPLY[@]}}"; fi
"#,
        frameworks = BASH_COMPLETION_FRAMEWORKS
            .iter()
            .map(|p| shell_word(p))
            .collect::<Vec<_>>()
            .join(" "),
        script = shell_word(&script.to_string_lossy()),
        words = quoted_words.join(" "),
        comp_line = shell_word(&comp_line),
        cur = shell_word(&cur),
        prev = shell_word(&prev),
    )
}

/// Bash function names cannot carry most punctuation; completion scripts
/// conventionally use underscores (e.g. `_docker_compose`).
fn sanitize_fn_name(tool: &str) -> String {
    tool.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
