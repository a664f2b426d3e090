//! stowage-s3: S3 backend for stowage
//!
//! This crate implements the `StorageClient` trait from stowage-core on top
//! of aws-sdk-s3, and resolves storage descriptors into clients. Keeping the
//! SDK here leaves stowage-core independent of any cloud vendor.

pub mod client;
pub mod factory;
mod stream;

pub use client::{S3Client, S3ClientConfig};
pub use factory::create_client;
pub use stream::PART_SIZE;
