//! cp command - Copy an object between two descriptors
//!
//! Source and destination may live on different backends or use different
//! credentials. The whole transfer is retried per `[retry]` in the config
//! when it fails transiently or arrives incomplete.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use stowage_core::{CopyOutcome, RetryConfig, is_retryable_error, retry_with_backoff};

use super::{TransferSession, load_config, report, resolve};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Copy an object between two storage descriptors
#[derive(Args, Debug)]
pub struct CpArgs {
    /// Source descriptor file (JSON)
    pub source: PathBuf,

    /// Destination descriptor file (JSON)
    pub destination: PathBuf,

    /// Bytes per chunk (default: transfer.chunk_size from the config)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Maximum attempts (default: retry.max_attempts from the config)
    #[arg(long)]
    pub attempts: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TransferOutput {
    pub source: String,
    pub destination: String,
    pub bytes: u64,
    pub bytes_human: String,
    pub chunks: u64,
    pub attempts: u32,
}

impl TransferOutput {
    pub(crate) fn new(
        formatter: &Formatter,
        source: String,
        destination: String,
        outcome: CopyOutcome,
        attempts: u32,
    ) -> Self {
        Self {
            source,
            destination,
            bytes: outcome.bytes,
            bytes_human: formatter.format_size(outcome.bytes),
            chunks: outcome.chunks,
            attempts,
        }
    }

    pub(crate) fn print(&self, formatter: &Formatter) {
        if formatter.is_json() {
            formatter.json(self);
            return;
        }
        if self.attempts > 1 {
            formatter.warning(&format!("Succeeded after {} attempts", self.attempts));
        }
        formatter.success(&format!(
            "{} -> {} ({})",
            formatter.style_url(&self.source),
            formatter.style_url(&self.destination),
            formatter.style_size(&self.bytes_human)
        ));
    }
}

/// Retry policy with an optional attempt override
pub(crate) fn retry_policy(config: &RetryConfig, attempts: Option<u32>) -> RetryConfig {
    let mut policy = config.clone();
    if let Some(attempts) = attempts {
        policy.max_attempts = attempts.max(1);
    }
    policy
}

/// Execute the cp command
pub async fn execute(args: CpArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    match run(&args, &formatter).await {
        Ok(output) => {
            output.print(&formatter);
            ExitCode::Success
        }
        Err(e) => report(&formatter, &e),
    }
}

async fn run(args: &CpArgs, formatter: &Formatter) -> anyhow::Result<TransferOutput> {
    let config = load_config()?;
    let source = resolve(&args.source, &config).await?;
    let destination = resolve(&args.destination, &config).await?;

    let from = source.descriptor.location();
    let to = destination.descriptor.location();
    let chunk_size = args.chunk_size.unwrap_or(config.transfer.chunk_size);
    let policy = retry_policy(&config.retry, args.attempts);

    let session = TransferSession::new(chunk_size, formatter, from.clone());
    let engine = &session.engine;
    let mut attempts = 0;
    let result = retry_with_backoff(
        &policy,
        || {
            attempts += 1;
            engine.copy(
                source.client.as_ref(),
                source.descriptor.path(),
                destination.client.as_ref(),
                destination.descriptor.path(),
            )
        },
        is_retryable_error,
    )
    .await;
    session.finish();

    let outcome = result?;
    Ok(TransferOutput::new(formatter, from, to, outcome, attempts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_override() {
        let base = RetryConfig::default();
        assert_eq!(retry_policy(&base, None), base);
        assert_eq!(retry_policy(&base, Some(5)).max_attempts, 5);
        assert_eq!(retry_policy(&base, Some(0)).max_attempts, 1);
    }
}
