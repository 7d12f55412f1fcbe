mod activate;
mod commands;
mod error;
mod install;
mod model;
mod paths;
mod pointer;
mod rename;
mod resolve;
mod store;
#[cfg(test)]
mod testing;
mod util;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::commands::{Ctx, InitArgs};
use crate::paths::PathSet;

#[derive(Debug, Parser)]
#[command(
    name = "codexenv",
    version,
    about = "Switch between named Codex CLI configuration homes"
)]
struct Cli {
    /// Override CODEXENV_ROOT (default: $CODEXENV_ROOT or ~/.codexenv).
    #[arg(long, global = true)]
    root: Option<String>,

    /// Override CODEXENV_CODEX_HOME, the link location (default: ~/.codex).
    #[arg(long, global = true)]
    codex_home: Option<String>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress status lines and non-error logs.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create an environment, make it the global default and link it.
    Init {
        /// Environment name.
        #[arg(default_value = commands::DEFAULT_ENV)]
        name: String,

        /// Install codex with npm first (skipped if already on PATH).
        #[arg(long)]
        npm_install: bool,

        /// npm executable to use.
        #[arg(long)]
        npm_binary: Option<String>,

        /// Package to install.
        #[arg(long)]
        npm_package: Option<String>,

        /// Install even if codex is already on PATH.
        #[arg(long)]
        force_npm: bool,
    },

    /// List environments.
    #[command(alias = "ls")]
    List {
        #[arg(long)]
        json: bool,
    },

    /// Create a new, empty environment.
    Create {
        name: String,

        /// Also make it the global default and link it.
        #[arg(long)]
        activate: bool,
    },

    /// Delete an environment and everything in it.
    #[command(alias = "rm")]
    Delete {
        name: String,

        /// Delete even if it is the global default or the linked environment.
        #[arg(long)]
        force: bool,
    },

    /// Rename an environment, updating the global default and link if they used it.
    #[command(alias = "mv")]
    Rename { old: String, new: String },

    /// Show or set the global default environment.
    Global {
        name: Option<String>,

        #[arg(long, conflicts_with = "name")]
        unset: bool,
    },

    /// Show or set the local override for a directory tree.
    Local {
        name: Option<String>,

        #[arg(long, conflicts_with = "name")]
        unset: bool,

        /// Directory for the marker (default: current directory).
        #[arg(long)]
        dir: Option<String>,
    },

    /// Print the effective environment and where it was set.
    Current {
        #[arg(long)]
        json: bool,
    },

    /// Link the effective environment as the codex home.
    Sync,

    /// Print the directory of an environment (default: the effective one).
    Path { name: Option<String> },

    /// Show paths, pointers and the state of the codex home link.
    Status {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("codexenv: {e:#}");
            let code = error::exit_code(&e);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn init_logging(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::WARN,
        (false, 1) => tracing::Level::INFO,
        (false, 2) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let paths = PathSet::resolve(cli.root.as_deref(), cli.codex_home.as_deref())?;
    let mut stdout = std::io::stdout().lock();
    let mut ctx = Ctx {
        paths,
        quiet: cli.quiet,
        out: &mut stdout,
    };

    match cli.cmd {
        Command::Init {
            name,
            npm_install,
            npm_binary,
            npm_package,
            force_npm,
        } => commands::init(
            &mut ctx,
            InitArgs {
                name: Some(name),
                npm_install,
                npm_binary,
                npm_package,
                force_npm,
            },
        ),
        Command::List { json } => commands::list(&mut ctx, json),
        Command::Create { name, activate } => commands::create(&mut ctx, &name, activate),
        Command::Delete { name, force } => commands::delete(&mut ctx, &name, force),
        Command::Rename { old, new } => commands::rename(&mut ctx, &old, &new),
        Command::Global { name, unset } => commands::global(&mut ctx, name.as_deref(), unset),
        Command::Local { name, unset, dir } => {
            commands::local(&mut ctx, name.as_deref(), unset, dir.as_deref())
        }
        Command::Current { json } => commands::current(&mut ctx, json),
        Command::Sync => commands::sync(&mut ctx),
        Command::Path { name } => commands::path(&mut ctx, name.as_deref()),
        Command::Status { json } => commands::status(&mut ctx, json),
    }
}
