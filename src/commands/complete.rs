use crate::{
    Dirvana, Result,
    cache::CacheEntry,
    completion::{self, CompletionEngine},
    resolver::Resolver,
    shell::Shell,
};
use std::{collections::BTreeMap, io::Write};

/// The `complete` hot path: map the alias back to its underlying tool, ask
/// the engine for suggestions, prefix-filter by the partial word, print.
///
/// This always exits 0 once it has an answer, even an empty one; a silent
/// completion is better than an error mid-keystroke.
pub(crate) fn run(app: &Dirvana, tool: &str, args: &[String]) -> Result<()> {
    let cwd = super::current_dir()?;
    let resolver = Resolver::new(app.auth(), app.paths());

    // Same cache path as export: repeated keystrokes hit the fast TTL.
    let entry = super::export::cached_or_fresh_entry(app, &resolver, &cwd, Shell::detect())?;

    let command_map = entry.merged_command_map.clone().unwrap_or_default();
    let Some(underlying) = resolve_tool(tool, &command_map, &entry.merged_completion_map) else {
        // Functions have no underlying tool to probe.
        return Ok(());
    };

    let engine = CompletionEngine::new(app.paths(), app.dev_mode());
    let result = engine.complete(&underlying, args)?;

    let prefix = args.last().cloned().unwrap_or_default();
    let suggestions = completion::filter(result.suggestions, &prefix);

    tracing::debug!(
        alias = tool,
        tool = %underlying,
        source = %result.source,
        count = suggestions.len(),
        "completion served"
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for suggestion in &suggestions {
        if suggestion.description.is_empty() {
            let _ = writeln!(out, "{}", suggestion.value);
        } else {
            let _ = writeln!(out, "{}\t{}", suggestion.value, suggestion.description);
        }
    }

    Ok(())
}

/// Map an alias name to the tool whose completion protocol should serve it.
/// Unknown names complete as themselves (the hook may be bound to a real
/// tool, not just managed aliases).
fn resolve_tool(
    alias: &str,
    commands: &BTreeMap<String, String>,
    completions: &BTreeMap<String, String>,
) -> Option<String> {
    if let Some(tool) = completions.get(alias) {
        return Some(tool.clone());
    }

    match commands.get(alias) {
        Some(command) if CacheEntry::is_function(command) => None,
        Some(command) => command.split_whitespace().next().map(str::to_string),
        None => Some(alias.to_string()),
    }
}
