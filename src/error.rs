use snafu::prelude::*;
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    // Authorization errors
    #[snafu(display("Directory '{}' is not authorized; run `dirvana allow {}`", path.display(), path.display()))]
    DirectoryNotAuthorized { path: PathBuf },

    #[snafu(display("Failed to read or write the authorization store at '{}': {source}", path.display()))]
    AuthStoreIo { path: PathBuf, source: std::io::Error },

    #[snafu(display("The authorization store at '{}' is not valid JSON: {source}", path.display()))]
    AuthStoreFormat { path: PathBuf, source: serde_json::Error },

    #[snafu(display(
        "Shell commands in '{}' have not been approved; re-run `dirvana allow` to review them",
        path.display()
    ))]
    ShellApprovalRequired { path: PathBuf },

    // Configuration errors
    #[snafu(display("Failed to parse config file '{}': {source}", path.display()))]
    ConfigParse {
        path: PathBuf,
        source: Box<figment::Error>,
    },

    #[snafu(display("Config file '{}' has an unsupported extension", path.display()))]
    ConfigUnsupportedExtension { path: PathBuf },

    #[snafu(display("'{name}' is declared as both an alias and a function in '{}'", path.display()))]
    MergedNameConflict { name: String, path: PathBuf },

    #[snafu(display("Failed to parse completion registry from '{origin}': {source}"))]
    RegistryParse {
        origin: String,
        source: serde_yaml::Error,
    },

    // Cache errors
    #[snafu(display("Cache I/O error at '{}': {source}", path.display()))]
    CacheIo { path: PathBuf, source: std::io::Error },

    #[snafu(display("Failed to serialize cache contents: {source}"))]
    CacheSerialize { source: serde_json::Error },

    // Execution errors
    #[snafu(display("Failed to spawn '{command}': {source}"))]
    CommandSpawn { command: String, source: std::io::Error },

    #[snafu(display("Command '{command}' exceeded the {timeout:?} deadline"))]
    CommandTimeout { command: String, timeout: Duration },

    #[snafu(display("I/O error while running '{command}': {source}"))]
    CommandIo { command: String, source: std::io::Error },

    #[snafu(display("Editor '{command}' exited unsuccessfully"))]
    EditorFailed { command: String },

    #[snafu(display("Tokio runtime error: {source}"))]
    TokioRuntime { source: std::io::Error },

    #[snafu(display("Tokio task join error: {source}"))]
    TokioJoin { source: tokio::task::JoinError },

    #[snafu(display("HTTP request to '{url}' failed: {source}"))]
    HttpRequest { url: String, source: reqwest::Error },

    #[snafu(display("HTTP request to '{url}' returned status {status}"))]
    HttpStatus { url: String, status: u16 },

    #[snafu(display("Refusing download from '{url}': response exceeds the {cap}-byte cap"))]
    DownloadTooLarge { url: String, cap: u64 },

    #[snafu(display("I/O error at '{}': {source}", path.display()))]
    Io { path: PathBuf, source: std::io::Error },

    // Validation errors
    #[snafu(display("'{name}' is not a valid identifier for {field}"))]
    InvalidIdentifier { name: String, field: String },

    #[snafu(display("Alias '{alias}' has an empty command"))]
    EmptyAliasCommand { alias: String },

    #[snafu(display("Function '{name}' has an empty body"))]
    EmptyFunctionBody { name: String },

    #[snafu(display("'{name}' is declared as both an alias and a function"))]
    AliasFunctionConflict { name: String },

    #[snafu(display("Registry URL '{url}' is not valid: only http and https with a host are accepted"))]
    InvalidRegistryUrl { url: String },

    #[snafu(display(
        "Completion script for '{resource}' does not match its declared SHA-256 (expected {expected}, got {actual})"
    ))]
    ScriptHashMismatch {
        resource: String,
        expected: String,
        actual: String,
    },

    // Inventory errors
    #[snafu(display("{resource} not found"))]
    NotFound { resource: String },

    #[snafu(display("{resource} already exists"))]
    AlreadyExists { resource: String },

    // Condition errors
    #[snafu(display("Condition on alias '{alias}' cannot be rendered as a shell test: {reason}"))]
    ConditionUnrepresentable { alias: String, reason: String },
}

impl Error {
    /// Stable machine-readable code for this error, suitable for scripting
    /// against diagnostics output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DirectoryNotAuthorized { .. }
            | Self::AuthStoreIo { .. }
            | Self::AuthStoreFormat { .. } => "AUTH_ERROR",

            Self::ShellApprovalRequired { .. } => "SHELL_APPROVAL_ERROR",

            Self::ConfigParse { .. }
            | Self::ConfigUnsupportedExtension { .. }
            | Self::MergedNameConflict { .. }
            | Self::RegistryParse { .. } => "CONFIG_ERROR",

            Self::CacheIo { .. } | Self::CacheSerialize { .. } => "CACHE_ERROR",

            Self::CommandSpawn { .. }
            | Self::CommandTimeout { .. }
            | Self::CommandIo { .. }
            | Self::EditorFailed { .. }
            | Self::TokioRuntime { .. }
            | Self::TokioJoin { .. }
            | Self::HttpRequest { .. }
            | Self::HttpStatus { .. }
            | Self::DownloadTooLarge { .. }
            | Self::Io { .. } => "EXEC_ERROR",

            Self::InvalidIdentifier { .. }
            | Self::EmptyAliasCommand { .. }
            | Self::EmptyFunctionBody { .. }
            | Self::AliasFunctionConflict { .. }
            | Self::InvalidRegistryUrl { .. }
            | Self::ScriptHashMismatch { .. } => "VALIDATION_ERROR",

            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",

            Self::ConditionUnrepresentable { .. } => "CONDITION_ERROR",
        }
    }

    /// True for the timeout subcase of execution errors, which completion
    /// strategies treat differently from hard spawn failures.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::CommandTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
