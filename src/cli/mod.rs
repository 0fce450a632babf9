pub mod build;
pub mod completions;
pub mod preprocess;
mod project;

use clap::{Parser, Subcommand};

pub use project::ProjectArgs;

/// wt - style-sheet preprocessor with sprite support
#[derive(Parser, Debug)]
#[command(name = "wt")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Show debug output (overridden by WT_LOG)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Preprocess and compile style sheets to CSS
    Build(build::BuildArgs),

    /// Print the preprocessed buffer or its line map
    Preprocess(preprocess::PreprocessArgs),

    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}
