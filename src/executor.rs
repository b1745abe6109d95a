use std::{
    path::Path,
    process::{Command, Stdio},
};
use tracing::{debug, info};

use crate::{config::Config, error::GraphError};

/// Run the configured executor on `build_file` from the project root,
/// forwarding `extra_args` and the terminal.
pub fn run(config: &Config, build_file: &Path, extra_args: &[String]) -> Result<(), GraphError> {
    info!("Starting the build now");
    debug!(
        "{} -f {} {}",
        config.executor,
        build_file.display(),
        extra_args.join(" ")
    );

    let status = Command::new(&config.executor)
        .arg("-f")
        .arg(build_file)
        .args(extra_args)
        .current_dir(&config.root)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .map_err(|e| GraphError::ExecutorInvocation {
            executor: config.executor.clone(),
            reason: e.to_string(),
        })?;

    if !status.success() {
        return Err(GraphError::ExecutorInvocation {
            executor: config.executor.clone(),
            reason: match status.code() {
                Some(code) => format!("exited with status {code}"),
                None => "terminated by signal".to_string(),
            },
        });
    }

    Ok(())
}
