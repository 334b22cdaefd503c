use crate::{
    Result,
    completion::{Strategy, Suggestion},
    exec,
};
use async_trait::async_trait;

/// Completion via a `--generate-shell-completion` flag, the convention used
/// by urfave/cli tools. The tool prints one candidate per line.
pub struct FlagStrategy;

#[async_trait]
impl Strategy for FlagStrategy {
    fn name(&self) -> &'static str {
        "Flag"
    }

    async fn supports(&self, tool: &str, args: &[String]) -> bool {
        if which::which(tool).is_err() {
            return false;
        }

        match self.invoke(tool, args).await {
            Ok(output) => looks_like_candidates(&output),
            Err(_) => false,
        }
    }

    async fn complete(&self, tool: &str, args: &[String]) -> Result<Vec<Suggestion>> {
        let output = self.invoke(tool, args).await?;
        Ok(parse_lines(&output))
    }
}

impl FlagStrategy {
    async fn invoke(&self, tool: &str, args: &[String]) -> Result<String> {
        let mut flag_args = args.to_vec();
        flag_args.push("--generate-shell-completion".to_string());
        exec::run_capturing(tool, &flag_args, &[], exec::DEFAULT_COMMAND_TIMEOUT).await
    }
}

/// Probe heuristic: non-empty output where at least one line is a single
/// bare token. Help screens are prose and fail this.
fn looks_like_candidates(output: &str) -> bool {
    if output.trim().is_empty() {
        return false;
    }
    output
        .lines()
        .any(|line| line.split_whitespace().count() == 1)
}

/// One suggestion per line; a second whitespace-delimited field, when
/// present, is treated as a description.
pub(crate) fn parse_lines(output: &str) -> Vec<Suggestion> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(char::is_whitespace) {
            Some((value, description)) => Suggestion {
                value: value.to_string(),
                description: description.trim().to_string(),
            },
            None => Suggestion {
                value: line.to_string(),
                description: String::new(),
            },
        })
        .collect()
}
