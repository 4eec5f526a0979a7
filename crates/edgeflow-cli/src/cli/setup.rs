use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "edgeflow",
    bin_name = "edgeflow",
    version,
    disable_help_subcommand = true
)]
#[command(about = "Run incremental listing and tailing passes of an edge dataflow agent", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ./edgeflow.toml, then the user config directory)
    #[arg(short, long, global = true, value_name = "FILE", help_heading = "Options")]
    pub config: Option<PathBuf>,

    /// Debug output on stderr
    #[arg(short, long, global = true, help_heading = "Options")]
    pub verbose: bool,

    /// Only errors on stderr
    #[arg(short, long, global = true, help_heading = "Options")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one listing pass over the configured input directory
    List,

    /// Run one tailing pass over the configured file(s)
    Tail,

    /// Inspect or clear persisted component state
    State {
        #[command(subcommand)]
        action: StateAction,
    },

    /// Content repository information
    Repo {
        #[command(subcommand)]
        action: RepoAction,
    },

    /// Print the resolved configuration as JSON
    Config {
        /// Print a commented TOML template instead
        #[arg(long)]
        template: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum StateAction {
    /// Print the stored state map
    Show { component: Component },
    /// Delete the stored state; the next pass starts from scratch
    Clear { component: Component },
}

#[derive(Subcommand, Debug)]
pub enum RepoAction {
    /// Entry count and size of the configured repository
    Stats,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Component {
    ListFile,
    TailFile,
}

impl Component {
    /// Name of the component's state document.
    pub fn state_name(self) -> &'static str {
        match self {
            Component::ListFile => "list-file",
            Component::TailFile => "tail-file",
        }
    }
}
