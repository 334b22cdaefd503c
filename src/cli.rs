use crate::shell::Shell;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dirvana")]
#[command(about = "Directory-scoped aliases, functions, env vars, and tab completion")]
#[command(version)]
pub struct CliArgs {
    /// Use verbose output (-vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Re-root every config/cache/auth file under this directory.
    ///
    /// Primarily for the test suites; end users should not need it.
    #[arg(long, hide = true, global = true, env = "DIRVANA_APP_DIR")]
    pub app_dir: Option<PathBuf>,

    /// Prefer a local registry checkout over the network.
    #[arg(long, hide = true, global = true, env = "DIRVANA_DEV")]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Emit shell definitions for the current directory (called by the hook)
    Export {
        /// The previously active directory, for context cleanup
        #[arg(long, env = "DIRVANA_PREV_DIR")]
        prev: Option<PathBuf>,
    },

    /// Print completion suggestions for a managed alias (called by the hook)
    Complete {
        /// The alias or tool being completed
        tool: String,

        /// The words typed after it, including the partial word
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Trust the config files in a directory
    Allow {
        /// Directory to trust (defaults to the current directory)
        dir: Option<PathBuf>,

        /// Also approve the shell commands the config declares
        #[arg(long)]
        auto_approve_shell: bool,
    },

    /// Withdraw trust from a directory
    Revoke {
        /// Directory to revoke (defaults to the current directory)
        dir: Option<PathBuf>,
    },

    /// List authorized directories
    List,

    /// Validate a config file, or the whole hierarchy for the current directory
    Validate { path: Option<PathBuf> },

    /// Show authorization, cache, and hierarchy state for the current directory
    Status,

    /// Clear the export cache and completion detections
    Clean,

    /// Create a starter config file in the current directory
    Init,

    /// Open the nearest config file in $EDITOR
    Edit {
        /// Edit the global config instead
        #[arg(long)]
        global: bool,
    },

    /// Install the shell hook into the shell's RC file
    Setup {
        #[arg(long)]
        shell: Option<Shell>,
    },

    /// Print the shell hook snippet
    Hook {
        #[arg(long)]
        shell: Option<Shell>,
    },

    /// Print a JSON description of the config file format
    Schema,

    /// Print the tab-completion bridge for a shell
    Completion { shell: Shell },
}
