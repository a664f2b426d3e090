//! Command implementations
//!
//! Each command parses its own arguments, runs against the library and
//! reports through the shared [`Formatter`]. Failures are converted to an
//! [`ExitCode`] here, at the edge of the binary.

use std::path::Path;

use anyhow::Context;
use clap::Subcommand;
use stowage_core::{
    Config, ConfigManager, JsonStorageDescriptor, StorageClient, StorageDescriptor, TransferEngine,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, TransferProgress};

pub mod cp;
pub mod download;
pub mod rm;
pub mod secret;
pub mod share;
pub mod stat;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Encrypt a secret into an envelope for use in a descriptor
    Encrypt(secret::EncryptArgs),

    /// Decrypt an envelope back to its plaintext
    Decrypt(secret::DecryptArgs),

    /// Copy an object between two descriptors, possibly on different backends
    Cp(cp::CpArgs),

    /// Download the object behind a descriptor to a local file
    Download(download::DownloadArgs),

    /// Show object metadata
    Stat(stat::StatArgs),

    /// Remove an object and verify it is gone
    Rm(rm::RmArgs),

    /// Generate a time-limited download URL
    Share(share::ShareArgs),
}

/// Dispatch a parsed command
pub async fn execute(command: Commands, output_config: OutputConfig) -> ExitCode {
    match command {
        Commands::Encrypt(args) => secret::execute_encrypt(args, output_config).await,
        Commands::Decrypt(args) => secret::execute_decrypt(args, output_config).await,
        Commands::Cp(args) => cp::execute(args, output_config).await,
        Commands::Download(args) => download::execute(args, output_config).await,
        Commands::Stat(args) => stat::execute(args, output_config).await,
        Commands::Rm(args) => rm::execute(args, output_config).await,
        Commands::Share(args) => share::execute(args, output_config).await,
    }
}

/// Load the on-disk configuration (defaults when no file exists)
pub(crate) fn load_config() -> anyhow::Result<Config> {
    let manager = ConfigManager::new()?;
    let config = manager
        .load()
        .with_context(|| format!("failed to load {}", manager.config_path().display()))?;
    Ok(config)
}

/// Read a JSON descriptor file into its runtime form
pub(crate) fn read_descriptor(path: &Path) -> anyhow::Result<StorageDescriptor> {
    let contents = std::fs::read_to_string(path)
        .map_err(stowage_core::Error::from)
        .with_context(|| format!("failed to read descriptor {}", path.display()))?;
    let json = JsonStorageDescriptor::from_json_str(&contents)
        .with_context(|| format!("invalid descriptor {}", path.display()))?;
    Ok(StorageDescriptor::try_from(json)?)
}

/// A descriptor together with the client that serves it
pub(crate) struct Resolved {
    pub descriptor: StorageDescriptor,
    pub client: Box<dyn StorageClient>,
}

/// Read, decrypt and resolve a descriptor file into a ready client
pub(crate) async fn resolve(path: &Path, config: &Config) -> anyhow::Result<Resolved> {
    let mut descriptor = read_descriptor(path)?;
    if !descriptor.is_decrypted() {
        let cipher = config.secrets.load_cipher()?;
        descriptor
            .decrypt(|envelope| cipher.decrypt(envelope))
            .with_context(|| format!("failed to decrypt secret of {}", path.display()))?;
    }
    let client = stowage_s3::create_client(&descriptor).await?;
    Ok(Resolved { descriptor, client })
}

/// Exit code for the first library error found in the cause chain
pub(crate) fn exit_code_for(error: &anyhow::Error) -> ExitCode {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<stowage_core::Error>())
        .and_then(|e| ExitCode::from_i32(e.exit_code()))
        .unwrap_or(ExitCode::GeneralError)
}

/// Print `error` and return its exit code
pub(crate) fn report(formatter: &Formatter, error: &anyhow::Error) -> ExitCode {
    formatter.error(&format!("{error:#}"));
    exit_code_for(error)
}

/// Engine, progress bar and Ctrl-C handler for one command's transfer
pub(crate) struct TransferSession {
    pub engine: TransferEngine,
    progress: TransferProgress,
    ctrl_c: JoinHandle<()>,
}

impl TransferSession {
    pub fn new(chunk_size: usize, formatter: &Formatter, message: String) -> Self {
        let token = CancellationToken::new();
        let ctrl_c = {
            let token = token.clone();
            tokio::spawn(async move {
                if forward_interrupts(tokio::signal::ctrl_c, token).await {
                    tracing::warn!("Second interrupt received, exiting without cleanup");
                    std::process::exit(ExitCode::IncompleteTransfer.as_i32());
                }
            })
        };

        let progress = TransferProgress::new(formatter, message);
        let engine = TransferEngine::new(chunk_size)
            .with_cancellation(token)
            .with_progress(progress.callback());

        Self {
            engine,
            progress,
            ctrl_c,
        }
    }

    pub fn finish(self) {
        self.progress.finish();
        self.ctrl_c.abort();
    }
}

/// Cancel `token` on the first interrupt and return true on a second one
///
/// Cancellation only takes effect at the next chunk boundary, so a stalled
/// read needs the second interrupt to end the process.
async fn forward_interrupts<F, Fut>(mut interrupt: F, token: CancellationToken) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<()>>,
{
    if interrupt().await.is_err() {
        return false;
    }
    tracing::warn!("Interrupt received, cancelling transfer (press Ctrl-C again to exit now)");
    token.cancel();
    interrupt().await.is_ok()
}
