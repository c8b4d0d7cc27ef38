use clap::Parser;

use pylet::cli::args::{Cli, Commands};
use pylet::cli::commands;
use pylet::config::loader::load_config;
use pylet::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global_opts.verbose);

    let config = load_config(cli.global_opts.config.as_deref())?;
    let format = cli.global_opts.format;

    match cli.command {
        Commands::Exec(args) => {
            commands::exec(args, config, format).await?;
        }
        Commands::Run(args) => {
            commands::run(args, config, format).await?;
        }
        Commands::Check(args) => {
            commands::check(args, config, format).await?;
        }
        Commands::Builtins => {
            commands::builtins(format).await?;
        }
        Commands::Init(args) => {
            commands::init(args).await?;
        }
        Commands::Config(args) => {
            commands::config(args, config).await?;
        }
    }

    Ok(())
}

fn init_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so they never interleave with program output.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
