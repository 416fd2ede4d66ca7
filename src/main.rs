mod cli;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cli::build::BuildArgs;
use cli::cache::CacheCommand;
use cli::check::CheckArgs;
use cli::run::RunArgs;

#[derive(Parser)]
#[command(
    name = "tessera",
    version,
    about = "Tessera stencil compiler: one definition, every backend."
)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace). RUST_LOG wins if set
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Build cache directory (overrides tessera.toml and TESSERA_CACHE_DIR)
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse and analyze stencils, print their halos
    Check(CheckArgs),
    /// Generate and compile stencils into the build cache
    Build(BuildArgs),
    /// Build one stencil and run it on freshly allocated storages
    Run(RunArgs),
    /// Inspect or clear the build cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tessera={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = cli::load_config(cli.cache_dir);

    match cli.command {
        Command::Check(args) => cli::check::cmd_check(args),
        Command::Build(args) => cli::build::cmd_build(args, &config),
        Command::Run(args) => cli::run::cmd_run(args, &config),
        Command::Cache { command } => cli::cache::cmd_cache(command, &config),
    }
}
