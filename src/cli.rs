use clap::Parser;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "modgraph", version, about)]
pub struct Args {
    /// Generate the build file but don't start the build
    #[arg(long = "dry-run", default_value_t = false)]
    pub dry_run: bool,

    /// Display debugging logs
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Rewrite the build file from inside the executor. Implies --dry-run;
    /// module errors are logged but do not fail the run.
    #[arg(long, hide = true, default_value_t = false)]
    pub regenerate: bool,

    /// Project root holding the module files
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Path to a config file (overrides MODGRAPH_CONFIG and <root>/modgraph.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Arguments passed through to the executor (targets, -j, ...)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub executor_args: Vec<String>,
}

/// Arguments that make a later run regenerate the same build file.
pub fn regenerate_args(root: &Path, config: Option<&Path>) -> Vec<String> {
    let mut out = vec![
        "--regenerate".to_string(),
        "--root".to_string(),
        root.to_string_lossy().into_owned(),
    ];
    if let Some(c) = config {
        out.push("--config".to_string());
        out.push(c.to_string_lossy().into_owned());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_passthrough() {
        let args = Args::parse_from(["modgraph", "--dry-run", "-v", "--", "-j4", "out/bin/app"]);
        assert!(args.dry_run);
        assert!(args.verbose);
        assert!(!args.regenerate);
        assert_eq!(args.executor_args, vec!["-j4", "out/bin/app"]);
        assert_eq!(args.root, PathBuf::from("."));
    }

    #[test]
    fn regenerate_args_keep_the_config() {
        assert_eq!(
            regenerate_args(Path::new("/src"), Some(Path::new("/src/ci.toml"))),
            vec!["--regenerate", "--root", "/src", "--config", "/src/ci.toml"]
        );
        assert_eq!(
            regenerate_args(Path::new("/src"), None),
            vec!["--regenerate", "--root", "/src"]
        );
    }
}
