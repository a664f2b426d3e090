//! stat command - Show object metadata

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use super::{load_config, report, resolve};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Show metadata of the object behind a descriptor
#[derive(Args, Debug)]
pub struct StatArgs {
    /// Descriptor file (JSON)
    pub descriptor: PathBuf,
}

#[derive(Debug, Serialize)]
struct StatOutput {
    location: String,
    size_bytes: u64,
    size_human: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
}

/// Execute the stat command
pub async fn execute(args: StatArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let output = match run(&args, &formatter).await {
        Ok(output) => output,
        Err(e) => return report(&formatter, &e),
    };

    if formatter.is_json() {
        formatter.json(&output);
        return ExitCode::Success;
    }

    formatter.field("Location:", &formatter.style_url(&output.location));
    formatter.field(
        "Size:",
        &format!(
            "{} ({} bytes)",
            formatter.style_size(&output.size_human),
            output.size_bytes
        ),
    );
    if let Some(modified) = &output.last_modified {
        formatter.field("Modified:", &formatter.style_date(modified));
    }
    if let Some(etag) = &output.etag {
        formatter.field("ETag:", etag);
    }
    if let Some(content_type) = &output.content_type {
        formatter.field("Content-Type:", content_type);
    }
    ExitCode::Success
}

async fn run(args: &StatArgs, formatter: &Formatter) -> anyhow::Result<StatOutput> {
    let config = load_config()?;
    let resolved = resolve(&args.descriptor, &config).await?;
    let stat = resolved.client.stat(resolved.descriptor.path()).await?;

    Ok(StatOutput {
        location: resolved.descriptor.location(),
        size_bytes: stat.content_length,
        size_human: formatter.format_size(stat.content_length),
        last_modified: stat.last_modified.map(|t| t.to_string()),
        etag: stat.etag,
        content_type: stat.content_type,
    })
}
