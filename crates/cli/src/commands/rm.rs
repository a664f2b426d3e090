//! rm command - Delete an object and confirm it is gone

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use super::{load_config, report, resolve};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Remove the object behind a descriptor
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Descriptor file (JSON)
    pub descriptor: PathBuf,
}

#[derive(Debug, Serialize)]
struct RmOutput {
    location: String,
    deleted: bool,
}

/// Execute the rm command
///
/// Removing an object that does not exist succeeds.
pub async fn execute(args: RmArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    match run(&args).await {
        Ok(location) => {
            if formatter.is_json() {
                formatter.json(&RmOutput {
                    location,
                    deleted: true,
                });
            } else {
                formatter.success(&format!("Removed {}", formatter.style_url(&location)));
            }
            ExitCode::Success
        }
        Err(e) => report(&formatter, &e),
    }
}

async fn run(args: &RmArgs) -> anyhow::Result<String> {
    let config = load_config()?;
    let resolved = resolve(&args.descriptor, &config).await?;
    resolved.client.delete(resolved.descriptor.path()).await?;
    Ok(resolved.descriptor.location())
}
