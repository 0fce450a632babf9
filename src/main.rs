use clap::Parser;
use miette::Result;
use tracing_subscriber::EnvFilter;
use wt::cli::{Cli, Commands};
use wt::output::Printer;

/// Environment variable holding a tracing filter, e.g. `WT_LOG=wt=trace`.
const LOG_ENV: &str = "WT_LOG";

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "wt=debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let printer = Printer::new().quiet(cli.quiet).verbose_output(cli.verbose);

    match cli.command {
        Commands::Build(args) => {
            wt::cli::build::run(args, &printer)?;
        }
        Commands::Preprocess(args) => wt::cli::preprocess::run(args, &printer)?,
        Commands::Completions(args) => wt::cli::completions::run(args)?,
    }

    Ok(())
}
