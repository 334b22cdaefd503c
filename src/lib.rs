pub mod auth;
pub mod cache;
pub mod cleanup;
pub mod cli;
pub(crate) mod commands;
pub mod completion;
pub mod condition;
pub mod config;
pub mod error;
pub(crate) mod exec;
pub(crate) mod logging;
pub mod paths;
pub mod resolver;
pub mod shell;
pub mod template;

use auth::AuthStore;
use cache::CacheStore;
use clap::Parser;
pub use cli::CliArgs;
use cli::Command;
use error::Result;
use paths::Paths;

/// Re-export of [`snafu::Report`] so `main.rs` can name the error-report type
/// without taking an explicit snafu dep.
pub use snafu::Report as SnafuReport;

/// Version string stamped into cache entries; a mismatch invalidates them.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Instance of the engine that powers the `dirvana` tool.
///
/// This is packaged this way so that `main.rs` is as minimal as possible:
/// integration tests and alternative frontends construct the engine the same
/// way the binary does.
pub struct Dirvana {
    paths: Paths,
    auth: AuthStore,
    cache: CacheStore,
    dev_mode: bool,
}

impl Dirvana {
    /// Create a new instance from parsed CLI args.
    pub fn new_from_cli_args(args: &CliArgs) -> Result<Self> {
        let paths = Paths::new(args.app_dir.as_deref())?;
        let auth = AuthStore::open(&paths.auth_file())?;
        let cache = CacheStore::open(paths.cache_file());

        Ok(Self {
            paths,
            auth,
            cache,
            dev_mode: args.dev,
        })
    }

    pub fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Export { prev } => commands::export::run(self, prev.as_deref()),
            Command::Complete { tool, args } => commands::complete::run(self, &tool, &args),
            Command::Allow {
                dir,
                auto_approve_shell,
            } => commands::auth_cmds::allow(self, dir.as_deref(), auto_approve_shell),
            Command::Revoke { dir } => commands::auth_cmds::revoke(self, dir.as_deref()),
            Command::List => commands::auth_cmds::list(self),
            Command::Validate { path } => commands::maintenance::validate(self, path.as_deref()),
            Command::Status => commands::maintenance::status(self),
            Command::Clean => commands::maintenance::clean(self),
            Command::Init => commands::maintenance::init(),
            Command::Edit { global } => commands::maintenance::edit(self, global),
            Command::Setup { shell } => commands::shell_integration::setup(shell),
            Command::Hook { shell } => commands::shell_integration::hook(shell),
            Command::Schema => commands::shell_integration::schema(),
            Command::Completion { shell } => commands::shell_integration::completion(shell),
        }
    }

    pub(crate) fn paths(&self) -> &Paths {
        &self.paths
    }

    pub(crate) fn auth(&self) -> &AuthStore {
        &self.auth
    }

    pub(crate) fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub(crate) fn dev_mode(&self) -> bool {
        self.dev_mode
    }
}

/// Main entry point for the `dirvana` engine, meant to be called from
/// `main.rs`.
#[snafu::report]
pub fn dirvana_main() -> Result<()> {
    let args = CliArgs::parse();
    logging::init(&args);

    let app = Dirvana::new_from_cli_args(&args)?;
    app.run(args.command)
}
