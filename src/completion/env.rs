use crate::{
    Result,
    completion::{Strategy, Suggestion},
    exec,
};
use async_trait::async_trait;

/// Completion via the bash completion environment protocol: the tool is run
/// with `COMP_LINE`/`COMP_POINT` set and prints candidates itself (the
/// mechanism behind `complete -C`, used by the AWS CLI among others).
pub struct EnvStrategy;

#[async_trait]
impl Strategy for EnvStrategy {
    fn name(&self) -> &'static str {
        "Env"
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
        Ok(super::flag::parse_lines(&output))
    }
}

impl EnvStrategy {
    async fn invoke(&self, tool: &str, args: &[String]) -> Result<String> {
        let comp_line = comp_line(tool, args);
        let envs = vec![
            ("COMP_LINE".to_string(), comp_line.clone()),
            ("COMP_POINT".to_string(), comp_line.len().to_string()),
        ];

        exec::run_capturing(tool, &[], &envs, exec::DEFAULT_COMMAND_TIMEOUT).await
    }
}

/// The simulated command line: tool name plus the words so far. A trailing
/// empty word keeps the trailing space, which is how shells ask for "the
/// next word".
fn comp_line(tool: &str, args: &[String]) -> String {
    let mut line = tool.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Probe heuristic: non-empty output, every non-empty line has at most two
/// whitespace tokens, and nothing that smells like an error or usage dump
/// (`:` or the substring `Usage`).
fn looks_like_candidates(output: &str) -> bool {
    if output.trim().is_empty() {
        return false;
    }

    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .all(|line| {
            line.split_whitespace().count() <= 2 && !line.contains(':') && !line.contains("Usage")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn comp_line_includes_trailing_empty_word() {
        assert_eq!(comp_line("aws", &args(&["s3", ""])), "aws s3 ");
        assert_eq!(comp_line("aws", &args(&[])), "aws");
    }

    #[test]
    fn candidate_lines_pass_the_probe() {
        assert!(looks_like_candidates("s3\nec2\nlambda\n"));
        assert!(looks_like_candidates("cp local\nmv remote\n"));
    }

    #[test]
    fn error_shaped_output_fails_the_probe() {
        assert!(!looks_like_candidates("error: unknown command\n"));
        assert!(!looks_like_candidates("Usage of mytool\n"));
        assert!(!looks_like_candidates("one two three tokens here\n"));
        assert!(!looks_like_candidates(""));
    }
}
