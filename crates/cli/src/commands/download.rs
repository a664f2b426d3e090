//! download command - Fetch the object behind a descriptor to a local file

use std::path::PathBuf;

use clap::Args;
use stowage_core::{is_retryable_error, retry_with_backoff};

use super::cp::{TransferOutput, retry_policy};
use super::{TransferSession, load_config, report, resolve};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Download an object to the local filesystem
#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Source descriptor file (JSON)
    pub source: PathBuf,

    /// Where to save the object; parent directories are created
    pub local_path: PathBuf,

    /// Bytes per chunk (default: transfer.chunk_size from the config)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Maximum attempts (default: retry.max_attempts from the config)
    #[arg(long)]
    pub attempts: Option<u32>,
}

/// Execute the download command
pub async fn execute(args: DownloadArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    match run(&args, &formatter).await {
        Ok(output) => {
            output.print(&formatter);
            ExitCode::Success
        }
        Err(e) => report(&formatter, &e),
    }
}

async fn run(args: &DownloadArgs, formatter: &Formatter) -> anyhow::Result<TransferOutput> {
    let config = load_config()?;
    let source = resolve(&args.source, &config).await?;

    let from = source.descriptor.location();
    let chunk_size = args.chunk_size.unwrap_or(config.transfer.chunk_size);
    let policy = retry_policy(&config.retry, args.attempts);

    let session = TransferSession::new(chunk_size, formatter, from.clone());
    let engine = &session.engine;
    let mut attempts = 0;
    let result = retry_with_backoff(
        &policy,
        || {
            attempts += 1;
            engine.download(
                source.client.as_ref(),
                source.descriptor.path(),
                &args.local_path,
            )
        },
        is_retryable_error,
    )
    .await;
    session.finish();

    let outcome = result?;
    let to = args.local_path.display().to_string();
    Ok(TransferOutput::new(formatter, from, to, outcome, attempts))
}
