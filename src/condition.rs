use crate::{Result, error};
use serde::{Deserialize, Serialize};

/// A condition attached to an alias via `when:`.
///
/// Atomic fields (`file`, `dir`, `var`, `command`) and composite fields
/// (`all`, `any`) may be combined on one object; everything present on a
/// single object is AND-ed together. The core never evaluates conditions --
/// they are lowered to a shell test expression embedded in the emitted alias
/// body, so the test re-runs on every invocation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Condition {
    /// True when the path is an existing regular file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// True when the path is an existing directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    /// True when the environment variable is set and non-empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub var: Option<String>,

    /// True when the named command is on PATH.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// All nested conditions must hold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all: Option<Vec<Condition>>,

    /// At least one nested condition must hold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub any: Option<Vec<Condition>>,
}

impl Condition {
    pub fn is_empty(&self) -> bool {
        self.file.is_none()
            && self.dir.is_none()
            && self.var.is_none()
            && self.command.is_none()
            && self.all.is_none()
            && self.any.is_none()
    }

    /// Lower this condition to a POSIX shell test expression.
    ///
    /// The returned string is a command list suitable for `if <expr>; then`.
    /// Path and name operands are single-quote-escaped; the `var` operand is
    /// validated instead since it lands inside `${...}`.
    pub fn to_shell_test(&self, alias: &str) -> Result<String> {
        if self.is_empty() {
            return error::ConditionUnrepresentableSnafu {
                alias: alias.to_string(),
                reason: "condition object has no fields".to_string(),
            }
            .fail();
        }

        let mut terms = Vec::new();

        if let Some(file) = &self.file {
            terms.push(format!("[ -f {} ]", shell_word(file)));
        }
        if let Some(dir) = &self.dir {
            terms.push(format!("[ -d {} ]", shell_word(dir)));
        }
        if let Some(var) = &self.var {
            if !crate::config::is_valid_env_name(var) {
                return error::ConditionUnrepresentableSnafu {
                    alias: alias.to_string(),
                    reason: format!("'{var}' is not a valid variable name"),
                }
                .fail();
            }
            terms.push(format!("[ -n \"${{{var}}}\" ]"));
        }
        if let Some(command) = &self.command {
            terms.push(format!(
                "command -v {} >/dev/null 2>&1",
                shell_word(command)
            ));
        }

        if let Some(all) = &self.all {
            let nested = all
                .iter()
                .map(|c| c.to_shell_test(alias))
                .collect::<Result<Vec<_>>>()?;
            if nested.is_empty() {
                return error::ConditionUnrepresentableSnafu {
                    alias: alias.to_string(),
                    reason: "'all' has no members".to_string(),
                }
                .fail();
            }
            terms.push(format!("{{ {}; }}", nested.join(" && ")));
        }

        if let Some(any) = &self.any {
            let nested = any
                .iter()
                .map(|c| c.to_shell_test(alias))
                .collect::<Result<Vec<_>>>()?;
            if nested.is_empty() {
                return error::ConditionUnrepresentableSnafu {
                    alias: alias.to_string(),
                    reason: "'any' has no members".to_string(),
                }
                .fail();
            }
            terms.push(format!("{{ {}; }}", nested.join(" || ")));
        }

        Ok(terms.join(" && "))
    }

    /// Visit every path-valued string in this condition tree, for template
    /// expansion of `file:`/`dir:` operands.
    pub fn map_paths<F>(&mut self, f: &F)
    where
        F: Fn(&str) -> String,
    {
        if let Some(file) = &mut self.file {
            *file = f(file);
        }
        if let Some(dir) = &mut self.dir {
            *dir = f(dir);
        }
        for nested in self.all.iter_mut().flatten() {
            nested.map_paths(f);
        }
        for nested in self.any.iter_mut().flatten() {
            nested.map_paths(f);
        }
    }
}

/// Quote a single word for safe embedding in shell code: wrap in single
/// quotes, escaping embedded single quotes as `'\''`.
pub(crate) fn shell_word(word: &str) -> String {
    format!("'{}'", word.replace('\'', "'\\''"))
}
