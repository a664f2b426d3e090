//! stowage-core: storage-agnostic transfer library
//!
//! This crate provides:
//! - An authenticated codec for credentials stored at rest
//! - Storage descriptors in their wire (JSON) and runtime forms
//! - Capability traits every storage backend implements
//! - A local filesystem backend
//! - A chunked transfer engine that moves objects between any two backends
//! - Retry helpers and on-disk configuration
//!
//! Nothing here depends on a cloud SDK; backend adapters live in their own
//! crates and plug in through [`StorageClient`].

pub mod cipher;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod fs;
pub mod retry;
pub mod secret;
pub mod traits;
pub mod transfer;

pub use cipher::SecretCipher;
pub use config::{Config, ConfigManager, RetryConfig, SecretSettings, TransferSettings};
pub use descriptor::{
    JsonStorageDescriptor, LocalJsonStorageDescriptor, LocalStorageDescriptor,
    S3JsonStorageDescriptor, S3StorageDescriptor, S3StorageDescriptorBuilder, StorageDescriptor,
    StorageScheme,
};
pub use error::{Error, Result};
pub use fs::LocalFsClient;
pub use retry::{is_retryable_error, retry_with_backoff};
pub use secret::Secret;
pub use traits::{ObjectReader, ObjectStat, ObjectWriter, StorageClient, ensure_deleted};
pub use transfer::{CopyOutcome, DEFAULT_CHUNK_SIZE, ProgressFn, TemporaryDownload, TransferEngine};
