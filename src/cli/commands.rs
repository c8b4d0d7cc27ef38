use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Local};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::cli::args::{
    CheckArgs, ConfigAction, ConfigArgs, ExecArgs, InitArgs, LimitArgs, OutputFormat, RunArgs,
};
use crate::config::loader::{get_config_path, save_config};
use crate::config::types::{PyletConfig, SandboxConfig};
use crate::error::{PyletError, Result};
use crate::sandbox::{Capabilities, ExecutionResult, Sandbox};

// ============================================================================
// Execution Commands
// ============================================================================

/// Execute inline source text
pub async fn exec(args: ExecArgs, config: PyletConfig, format: OutputFormat) -> Result<()> {
    info!(source_len = args.code.len(), "Executing inline source");

    let sandbox_config = apply_limits(&config.sandbox, &args.limits);
    let execution = execute_source(args.code, sandbox_config).await?;
    output_execution(&execution, format)
}

/// Execute a source file or stdin
pub async fn run(args: RunArgs, config: PyletConfig, format: OutputFormat) -> Result<()> {
    info!(path = %args.path.display(), "Executing source file");

    let source = read_source(&args.path).await?;
    let sandbox_config = apply_limits(&config.sandbox, &args.limits);
    let execution = execute_source(source, sandbox_config).await?;
    output_execution(&execution, format)
}

/// Parse without executing
pub async fn check(args: CheckArgs, config: PyletConfig, format: OutputFormat) -> Result<()> {
    info!(path = %args.path.display(), "Checking source file");

    let source = read_source(&args.path).await?;
    let sandbox_config = config.sandbox;
    let outcome =
        tokio::task::spawn_blocking(move || Sandbox::new(sandbox_config).check(&source)).await?;

    match format {
        OutputFormat::Text => match outcome {
            Ok(()) => println!("OK"),
            Err(fault) => {
                println!("Error: {}", fault.message);
                std::process::exit(1);
            }
        },
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "valid": outcome.is_ok(),
                    "error": outcome.err(),
                })
            );
        }
    }
    Ok(())
}

/// List the capability allowlist
pub async fn builtins(format: OutputFormat) -> Result<()> {
    let capabilities = Capabilities::standard();
    let entries: Vec<_> = capabilities
        .names()
        .into_iter()
        .filter_map(|name| capabilities.resolve(name))
        .collect();

    match format {
        OutputFormat::Text => {
            println!("{:<12} CATEGORY", "NAME");
            println!("{}", "-".repeat(26));
            for builtin in entries {
                println!("{:<12} {}", builtin.name(), builtin.category());
            }
        }
        OutputFormat::Json => {
            let json_entries: Vec<_> = entries
                .iter()
                .map(|builtin| {
                    serde_json::json!({
                        "name": builtin.name(),
                        "category": builtin.category(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json_entries)?);
        }
    }
    Ok(())
}

// ============================================================================
// Config Commands
// ============================================================================

pub async fn init(args: InitArgs) -> Result<()> {
    let config_path = get_config_path();

    if config_path.exists() && !args.force {
        println!("Configuration already exists at: {}", config_path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    save_config(&PyletConfig::default(), &config_path)?;

    println!("Created configuration at: {}", config_path.display());
    println!("\nQuick start:");
    println!("  # Run a snippet");
    println!("  pylet exec \"print(sum(range(10)))\"");
    println!();
    println!("  # Run a file with a time limit");
    println!("  pylet run script.py --timeout 5");
    println!();
    println!("  # See what sandboxed code may call");
    println!("  pylet builtins");

    Ok(())
}

pub async fn config(args: ConfigArgs, config: PyletConfig) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let toml_str =
                toml::to_string_pretty(&config).map_err(|e| PyletError::Config(e.to_string()))?;
            println!("{}", toml_str);
        }
        ConfigAction::Path => {
            println!("{}", get_config_path().display());
        }
    }
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

struct Execution {
    result: ExecutionResult,
    started_at: DateTime<Local>,
    duration_ms: u64,
}

fn apply_limits(config: &SandboxConfig, limits: &LimitArgs) -> SandboxConfig {
    let mut config = config.clone();
    if let Some(timeout) = limits.timeout {
        config = config.with_timeout(timeout);
    }
    if let Some(depth) = limits.max_recursion_depth {
        config = config.with_max_recursion_depth(depth);
    }
    config
}

/// Runs the synchronous boundary off the async runtime.
async fn execute_source(source: String, sandbox_config: SandboxConfig) -> Result<Execution> {
    let started_at = Local::now();
    let started = Instant::now();

    let result = tokio::task::spawn_blocking(move || {
        let mut sandbox = Sandbox::new(sandbox_config);
        sandbox.execute(&source)
    })
    .await?;

    Ok(Execution {
        result,
        started_at,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}

async fn read_source(path: &Path) -> Result<String> {
    let display = path.display().to_string();
    let bytes = if display == "-" {
        let mut buffer = Vec::new();
        tokio::io::stdin().read_to_end(&mut buffer).await?;
        buffer
    } else {
        if !path.exists() {
            return Err(PyletError::SourceNotFound { path: display });
        }
        tokio::fs::read(path).await?
    };
    debug!(bytes = bytes.len(), "Read source");

    String::from_utf8(bytes).map_err(|_| PyletError::SourceEncoding { path: display })
}

fn output_execution(execution: &Execution, format: OutputFormat) -> Result<()> {
    let result = &execution.result;
    match format {
        OutputFormat::Text => {
            match result {
                ExecutionResult::Success(output) => print!("{}", output),
                _ => println!("{}", result.text()),
            }
            if result.is_failure() {
                std::process::exit(1);
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "kind": result.kind(),
                    "text": result.text(),
                    "started_at": execution.started_at.to_rfc3339(),
                    "duration_ms": execution.duration_ms,
                })
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_limits_overrides_only_given_values() {
        let base = SandboxConfig::default();
        let limits = LimitArgs {
            timeout: Some(4),
            max_recursion_depth: None,
        };
        let applied = apply_limits(&base, &limits);
        assert_eq!(applied.timeout_seconds, Some(4));
        assert_eq!(applied.max_recursion_depth, base.max_recursion_depth);
    }

    #[tokio::test]
    async fn test_read_source_reports_missing_file() {
        let err = read_source(Path::new("/definitely/not/here.py"))
            .await
            .unwrap_err();
        assert!(matches!(err, PyletError::SourceNotFound { .. }));
    }

    #[tokio::test]
    async fn test_read_source_rejects_invalid_utf8() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.py");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        let err = read_source(&path).await.unwrap_err();
        assert!(matches!(err, PyletError::SourceEncoding { .. }));
    }

    #[tokio::test]
    async fn test_execute_source_runs_off_runtime() {
        let execution = execute_source("print(2 + 3)".to_string(), SandboxConfig::default())
            .await
            .unwrap();
        assert_eq!(execution.result, ExecutionResult::Success("5\n".to_string()));
    }
}
