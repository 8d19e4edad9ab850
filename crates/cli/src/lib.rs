mod pipe;
mod resolve;
mod serve;
pub mod server;

use clap::{Args, Parser, Subcommand};
use outsync_core::config::Settings;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "outsync",
    version,
    about = "Turns Roblox output into clickable links to workspace files",
    long_about = "Outsync receives log output from a running Roblox session, rewrites the \
                  instance paths it mentions into links to the workspace files they came from \
                  and prints the result."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone, Debug)]
pub struct WorkspaceArgs {
    /// Workspace root. Defaults to the current directory.
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Settings file. Defaults to `.outsync.json` under the root.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl WorkspaceArgs {
    pub fn root(&self) -> PathBuf {
        self.root
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    pub fn settings(&self) -> outsync_core::Result<Settings> {
        match &self.config {
            Some(path) => Settings::load(path),
            None => Settings::discover(&self.root()),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Listen for Roblox output and print it with resolved file links
    #[command(
        long_about = "Indexes the workspace, watches it for changes and starts the HTTP listener \
                            the Roblox plugin posts its output to. Stops on Ctrl+C."
    )]
    Serve {
        #[command(flatten)]
        workspace: WorkspaceArgs,

        /// Port to listen on (overrides the settings file)
        #[arg(long)]
        port: Option<u16>,

        /// Write each context as a terminal stream with CRLF line endings
        #[arg(long)]
        terminal: bool,
    },
    /// Resolve instance paths to workspace files
    Resolve {
        /// Dot-separated instance paths, e.g. ServerScriptService.Main
        #[arg(value_name = "INSTANCE_PATH", required = true)]
        paths: Vec<String>,

        #[command(flatten)]
        workspace: WorkspaceArgs,
    },
    /// Rewrite output read from stdin and print it to stdout
    Pipe {
        #[command(flatten)]
        workspace: WorkspaceArgs,
    },
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (component, to_stderr) = match &cli.command {
        Commands::Serve { .. } => ("serve", true),
        Commands::Resolve { .. } => ("resolve", false),
        Commands::Pipe { .. } => ("pipe", false),
    };
    let _guard = outsync_core::logging::init_logging(component, to_stderr);

    let rt = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Serve {
            workspace,
            port,
            terminal,
        } => {
            let mut settings = workspace.settings()?;
            if let Some(port) = port {
                settings.port = port;
            }
            rt.block_on(serve::run(workspace.root(), settings, terminal))
        }
        Commands::Resolve { paths, workspace } => {
            let settings = workspace.settings()?;
            rt.block_on(resolve::run(workspace.root(), settings, paths))
        }
        Commands::Pipe { workspace } => {
            let settings = workspace.settings()?;
            rt.block_on(pipe::run(workspace.root(), settings))
        }
    }
}
