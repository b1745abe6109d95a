use anyhow::{Context as _, Result};
use clap::Parser;
use std::{io::IsTerminal, path::Path, process::ExitCode};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use modgraph::{
    cli::{self, Args},
    executor, generate_build_file, ninja, Config, ModuleRegistry,
};

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .without_time()
        .init();
}

fn run(args: &Args) -> Result<ExitCode> {
    let config_path = match &args.config {
        Some(p) => Some(
            p.canonicalize()
                .with_context(|| format!("--config was provided but file does not exist: {}", p.display()))?,
        ),
        None => None,
    };
    let config = Config::locate(&args.root, config_path.as_deref())?;
    let registry = ModuleRegistry::default();

    let regen = regenerate_command(&config, config_path.as_deref());
    let report = generate_build_file(&config, &registry, regen)?;

    for e in &report.errors {
        error!("{e}");
    }

    if !args.dry_run && !args.regenerate {
        if let Err(err) = executor::run(&config, &report.build_file, &args.executor_args) {
            error!("{err}");
            error!("Error invoking {} build. See logs above.", config.executor);
            return Ok(ExitCode::FAILURE);
        }
    }

    if report.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else if args.regenerate {
        // The executor aborts on a failed regeneration, which would stop
        // healthy modules from building too.
        warn!("{} module(s) had errors and were skipped", report.errors.len());
        Ok(ExitCode::SUCCESS)
    } else {
        error!("{} module(s) had errors and were skipped", report.errors.len());
        Ok(ExitCode::FAILURE)
    }
}

/// Command line the executor runs to rebuild the build file in place.
fn regenerate_command(config: &Config, config_path: Option<&Path>) -> Option<String> {
    let exe = std::env::current_exe().ok()?;
    let mut words = vec![quote_posix_single(&exe.to_string_lossy())];
    words.extend(
        cli::regenerate_args(&config.root, config_path)
            .iter()
            .map(|w| quote_posix_single(w)),
    );
    Some(ninja::escape_value(&words.join(" ")))
}

fn quote_posix_single(s: &str) -> String {
    let mut out = String::from("'");
    for ch in s.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}
