use crate::{
    Result,
    completion::{Strategy, Suggestion},
    exec,
};
use async_trait::async_trait;
use std::path::Path;

// Cobra's ShellCompDirective bits, mirrored from its completion protocol.
const DIRECTIVE_ERROR: u32 = 1;
#[allow(dead_code)]
const DIRECTIVE_NO_SPACE: u32 = 2;
#[allow(dead_code)]
const DIRECTIVE_NO_FILE_COMP: u32 = 4;
const DIRECTIVE_FILTER_FILE_EXT: u32 = 8;
const DIRECTIVE_FILTER_DIRS: u32 = 16;
#[allow(dead_code)]
const DIRECTIVE_KEEP_ORDER: u32 = 32;

/// Completion via Cobra's hidden `__complete` subcommand, spoken by most Go
/// CLIs (kubectl, helm, gh, ...). The tool prints `value\tdescription` lines
/// followed by a `:N` directive bitmask.
pub struct CobraStrategy;

#[async_trait]
impl Strategy for CobraStrategy {
    fn name(&self) -> &'static str {
        "Cobra"
    }

    async fn supports(&self, tool: &str, args: &[String]) -> bool {
        if which::which(tool).is_err() {
            return false;
        }

        match self.invoke(tool, args).await {
            Ok(output) => parse_output(&output).is_some(),
            Err(_) => false,
        }
    }

    async fn complete(&self, tool: &str, args: &[String]) -> Result<Vec<Suggestion>> {
        let output = self.invoke(tool, args).await?;

        let Some((values, directive)) = parse_output(&output) else {
            return Ok(Vec::new());
        };

        if directive & DIRECTIVE_ERROR != 0 {
            return Ok(Vec::new());
        }

        // The filesystem filter directives reinterpret the returned values.
        let last_arg = args.last().map(String::as_str).unwrap_or("");
        if directive & DIRECTIVE_FILTER_FILE_EXT != 0 {
            let extensions: Vec<String> = values.into_iter().map(|(v, _)| v).collect();
            let (search_dir, prefix) = split_search_target(last_arg);
            return Ok(filter_file_ext(Path::new(&search_dir), &prefix, &extensions));
        }
        if directive & DIRECTIVE_FILTER_DIRS != 0 {
            let (search_dir, prefix) = split_search_target(last_arg);
            return Ok(filter_dirs(Path::new(&search_dir), &prefix));
        }

        Ok(values
            .into_iter()
            .map(|(value, description)| Suggestion { value, description })
            .collect())
    }
}

impl CobraStrategy {
    async fn invoke(&self, tool: &str, args: &[String]) -> Result<String> {
        // Cobra expects the word under the cursor as the final argument, even
        // when it is empty.
        let mut complete_args = Vec::with_capacity(args.len() + 2);
        complete_args.push("__complete".to_string());
        complete_args.extend_from_slice(args);
        if args.is_empty() {
            complete_args.push(String::new());
        }

        exec::run_capturing(tool, &complete_args, &[], exec::DEFAULT_COMMAND_TIMEOUT).await
    }
}

/// Parse Cobra output into `(values, directive)`. Returns `None` when the
/// output carries no `:N` directive line, which is the probe signal that the
/// tool does not speak this protocol.
fn parse_output(output: &str) -> Option<(Vec<(String, String)>, u32)> {
    let lines: Vec<&str> = output.lines().collect();

    let directive_idx = lines.iter().rposition(|line| {
        let trimmed = line.trim();
        trimmed
            .strip_prefix(':')
            .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
    })?;

    let directive: u32 = lines[directive_idx].trim()[1..].parse().ok()?;

    let values = lines[..directive_idx]
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| match line.split_once('\t') {
            Some((value, description)) => (value.to_string(), description.to_string()),
            None => (line.to_string(), String::new()),
        })
        .collect();

    Some((values, directive))
}

/// Where to look and what to match: a trailing `/` means the whole arg is the
/// search directory; otherwise the dirname is searched and the basename
/// becomes a prefix filter. An empty arg searches the current directory.
fn split_search_target(last_arg: &str) -> (String, String) {
    if last_arg.is_empty() {
        return (".".to_string(), String::new());
    }
    if last_arg.ends_with('/') {
        return (last_arg.to_string(), String::new());
    }

    let path = Path::new(last_arg);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_string_lossy().into_owned(),
        _ => ".".to_string(),
    };
    let prefix = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    (dir, prefix)
}

/// `FilterFileExt`: files whose extension matches one of the declared
/// extensions (with or without a leading dot), plus subdirectories with a
/// trailing `/`. Hidden entries are skipped. A nonexistent search directory
/// yields no suggestions.
fn filter_file_ext(search_dir: &Path, prefix: &str, extensions: &[String]) -> Vec<Suggestion> {
    let wanted: Vec<&str> = extensions
        .iter()
        .map(|ext| ext.strip_prefix('.').unwrap_or(ext))
        .collect();

    list_entries(search_dir, prefix, |name, is_dir| {
        if is_dir {
            return true;
        }
        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| wanted.contains(&ext))
    })
}

/// `FilterDirs`: subdirectories only, trailing `/`, hidden skipped.
fn filter_dirs(search_dir: &Path, prefix: &str) -> Vec<Suggestion> {
    list_entries(search_dir, prefix, |_, is_dir| is_dir)
}

fn list_entries<F>(search_dir: &Path, prefix: &str, keep: F) -> Vec<Suggestion>
where
    F: Fn(&str, bool) -> bool,
{
    let Ok(entries) = std::fs::read_dir(search_dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                return None;
            }
            if !prefix.is_empty() && !name.starts_with(prefix) {
                return None;
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !keep(&name, is_dir) {
                return None;
            }
            Some(if is_dir { format!("{name}/") } else { name })
        })
        .collect();
    names.sort();

    names
        .into_iter()
        .map(|value| Suggestion {
            value,
            description: String::new(),
        })
        .collect()
}
