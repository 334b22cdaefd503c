use crate::{Result, condition::Condition, error};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Recognized config filenames, in priority order. The first match found in a
/// directory is that directory's config; any others are ignored.
pub const CONFIG_FILENAMES: [&str; 4] = [
    ".dirvana.yml",
    ".dirvana.yaml",
    ".dirvana.toml",
    ".dirvana.json",
];

/// A single parsed per-directory (or global) config file.
///
/// Name-keyed collections use [`BTreeMap`] so merged output and emitted shell
/// code are deterministic regardless of declaration order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigFile {
    #[serde(deserialize_with = "null_as_empty_map")]
    pub aliases: BTreeMap<String, AliasValue>,

    #[serde(deserialize_with = "null_as_empty_map")]
    pub functions: BTreeMap<String, String>,

    #[serde(deserialize_with = "null_as_empty_map")]
    pub env: BTreeMap<String, EnvValue>,

    /// When true, this file discards everything merged before it and stops
    /// the merge after it.
    pub local_only: bool,

    /// When true on the first authorized local file, the global config is
    /// discarded from the merge.
    pub ignore_global: bool,
}

/// An alias is either a plain command string or a detailed object with
/// conditions and completion overrides.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AliasValue {
    Simple(String),
    Detailed(AliasObject),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AliasObject {
    pub command: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Condition>,

    /// Command to run when `when` evaluates false. Without it, the emitted
    /// alias prints a short error instead.
    #[serde(default, rename = "else", skip_serializing_if = "Option::is_none")]
    pub else_: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<CompletionSpec>,
}

/// Completion override for an alias.
///
/// Untagged variant order matters: a bare bool must be tried before the
/// string form, and the string form before the per-shell map.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CompletionSpec {
    /// `completion: false` disables completion for the alias. (`true` is
    /// accepted and means the default behavior.)
    Toggle(bool),
    /// Inherit the named tool's completion.
    Inherit(String),
    /// Verbatim per-shell completion code.
    PerShell {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bash: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        zsh: Option<String>,
    },
}

/// An environment variable is a static string, a shell command to capture, or
/// the explicit `{value: …}` form.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EnvValue {
    Static(String),
    Shell { sh: String },
    Literal { value: String },
}

impl AliasValue {
    pub fn command(&self) -> &str {
        match self {
            Self::Simple(cmd) => cmd,
            Self::Detailed(obj) => &obj.command,
        }
    }

    pub fn completion(&self) -> Option<&CompletionSpec> {
        match self {
            Self::Simple(_) => None,
            Self::Detailed(obj) => obj.completion.as_ref(),
        }
    }
}

impl EnvValue {
    /// The shell command for `{sh: …}` entries, if this is one.
    pub fn shell_command(&self) -> Option<&str> {
        match self {
            Self::Shell { sh } => Some(sh),
            Self::Static(_) | Self::Literal { .. } => None,
        }
    }
}

impl ConfigFile {
    /// Find the config file for a single directory, if any.
    pub fn find_in(dir: &Path) -> Option<PathBuf> {
        CONFIG_FILENAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    /// Parse a config file, selecting the format by extension.
    pub fn load(path: &Path) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Json, Toml, Yaml},
        };

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let figment = match ext {
            "yml" | "yaml" => Figment::from(Yaml::file(path)),
            "toml" => Figment::from(Toml::file(path)),
            "json" => Figment::from(Json::file(path)),
            _ => {
                return error::ConfigUnsupportedExtensionSnafu {
                    path: path.to_path_buf(),
                }
                .fail();
            }
        };

        figment.extract().map_err(|e| error::Error::ConfigParse {
            path: path.to_path_buf(),
            source: Box::new(e),
        })
    }

    /// Collect every validation problem in this file. An empty result means
    /// the file is well-formed.
    pub fn validate(&self) -> Vec<error::Error> {
        let mut problems = Vec::new();

        for (name, alias) in &self.aliases {
            if !is_valid_name(name) {
                problems.push(error::Error::InvalidIdentifier {
                    name: name.clone(),
                    field: "aliases".to_string(),
                });
            }
            if alias.command().trim().is_empty() {
                problems.push(error::Error::EmptyAliasCommand {
                    alias: name.clone(),
                });
            }
        }

        for (name, body) in &self.functions {
            if !is_valid_name(name) {
                problems.push(error::Error::InvalidIdentifier {
                    name: name.clone(),
                    field: "functions".to_string(),
                });
            }
            if body.trim().is_empty() {
                problems.push(error::Error::EmptyFunctionBody { name: name.clone() });
            }
            if self.aliases.contains_key(name) {
                problems.push(error::Error::AliasFunctionConflict { name: name.clone() });
            }
        }

        for name in self.env.keys() {
            if !is_valid_env_name(name) {
                problems.push(error::Error::InvalidIdentifier {
                    name: name.clone(),
                    field: "env".to_string(),
                });
            }
        }

        problems
    }

    /// The `{name: sh-command}` pairs this file declares, used for the
    /// shell-approval hash.
    pub fn shell_commands(&self) -> BTreeMap<String, String> {
        self.env
            .iter()
            .filter_map(|(name, value)| {
                value
                    .shell_command()
                    .map(|cmd| (name.clone(), cmd.to_string()))
            })
            .collect()
    }

    /// The raw `{name: sh-command}` set declared by the config file in `dir`.
    ///
    /// This is the form the shell-approval hash covers: the declared text,
    /// before any template expansion. Both the `allow` approval and the
    /// export-time gate must hash this same set or a templated command would
    /// never match its own approval. An unreadable file yields an empty set.
    pub fn declared_shell_commands(dir: &Path) -> BTreeMap<String, String> {
        let Some(file) = Self::find_in(dir) else {
            return BTreeMap::new();
        };
        match Self::load(&file) {
            Ok(config) => config.shell_commands(),
            Err(e) => {
                tracing::warn!(
                    path = %file.display(),
                    error = %e,
                    "cannot read config for shell approval"
                );
                BTreeMap::new()
            }
        }
    }
}

/// YAML renders a section whose entries are all commented out as `null`;
/// treat that the same as an absent section.
fn null_as_empty_map<'de, D, V>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, V>, D::Error>
where
    D: serde::Deserializer<'de>,
    V: serde::Deserialize<'de>,
{
    let opt: Option<BTreeMap<String, V>> = serde::Deserialize::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// Alias and function names: `[A-Za-z_][A-Za-z0-9_-]*`.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Environment variable names: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
