use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(name = "pylet")]
#[clap(version, about = "Sandboxed execution of a restricted Python dialect")]
#[clap(propagate_version = true)]
pub struct Cli {
    #[clap(flatten)]
    pub global_opts: GlobalOpts,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct GlobalOpts {
    /// Configuration file path
    #[clap(short, long, global = true, env = "PYLET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[clap(long, global = true, default_value = "text", value_enum)]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute inline source text
    Exec(ExecArgs),

    /// Execute a source file (use - for stdin)
    Run(RunArgs),

    /// Check that source parses, without running it
    Check(CheckArgs),

    /// List the names a sandboxed program may call
    Builtins,

    /// Initialize a new pylet configuration
    Init(InitArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

// ============================================================================
// Execution Commands
// ============================================================================

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Source text to execute
    pub code: String,

    #[clap(flatten)]
    pub limits: LimitArgs,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path of the source file, or - to read stdin
    pub path: PathBuf,

    #[clap(flatten)]
    pub limits: LimitArgs,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path of the source file, or - to read stdin
    pub path: PathBuf,
}

/// Per-invocation overrides of the `[sandbox]` configuration.
#[derive(Args, Debug, Default)]
pub struct LimitArgs {
    /// Abort execution after this many seconds
    #[clap(long)]
    pub timeout: Option<u64>,

    /// Maximum depth of nested function calls
    #[clap(long)]
    pub max_recursion_depth: Option<usize>,
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Force overwrite existing configuration
    #[clap(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[clap(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Show configuration file path
    Path,
}

// ============================================================================
// Common Types
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_exec_with_limits() {
        let cli = Cli::try_parse_from([
            "pylet",
            "--format",
            "json",
            "exec",
            "print(1)",
            "--timeout",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.global_opts.format, OutputFormat::Json);
        match cli.command {
            Commands::Exec(args) => {
                assert_eq!(args.code, "print(1)");
                assert_eq!(args.limits.timeout, Some(3));
                assert_eq!(args.limits.max_recursion_depth, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_run_from_stdin() {
        let cli = Cli::try_parse_from(["pylet", "-vv", "run", "-"]).unwrap();
        assert_eq!(cli.global_opts.verbose, 2);
        assert!(matches!(cli.command, Commands::Run(ref args) if args.path == PathBuf::from("-")));
    }

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
