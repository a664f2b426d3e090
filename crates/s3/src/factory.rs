//! Descriptor to client resolution

use stowage_core::{Error, LocalFsClient, Result, StorageClient, StorageDescriptor};

use crate::client::{S3Client, S3ClientConfig};

/// Build a ready-to-use client for a decrypted descriptor
///
/// Fails with [`Error::NotDecrypted`] before touching any backend when the
/// descriptor still holds only its encrypted secret.
pub async fn create_client(descriptor: &StorageDescriptor) -> Result<Box<dyn StorageClient>> {
    if !descriptor.is_decrypted() {
        return Err(Error::NotDecrypted(descriptor.location()));
    }

    tracing::debug!(scheme = %descriptor.scheme(), location = %descriptor.location(), "Creating storage client");
    match descriptor {
        StorageDescriptor::S3(s3) => {
            let config = S3ClientConfig::from_descriptor(s3)?;
            Ok(Box::new(S3Client::new(config).await?))
        }
        StorageDescriptor::Local(local) => Ok(Box::new(LocalFsClient::new(local.root.clone()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use stowage_core::{LocalStorageDescriptor, S3StorageDescriptor};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_undecrypted_descriptor_is_rejected() {
        let descriptor = StorageDescriptor::S3(
            S3StorageDescriptor::builder("bucket", "key.txt", "AKIA")
                .encrypted_secret("Y3Q=_bm9uY2U=_dGFn")
                .build()
                .unwrap(),
        );

        match create_client(&descriptor).await {
            Err(Error::NotDecrypted(location)) => assert_eq!(location, "s3://bucket/key.txt"),
            Err(other) => panic!("expected NotDecrypted, got {other:?}"),
            Ok(_) => panic!("expected NotDecrypted, got a client"),
        }
    }

    #[tokio::test]
    async fn test_local_descriptor_resolves_to_filesystem() {
        let dir = TempDir::new().unwrap();
        let descriptor = StorageDescriptor::Local(LocalStorageDescriptor::new(dir.path(), "a.txt"));

        let client = create_client(&descriptor).await.unwrap();
        client
            .write(descriptor.path(), Bytes::from_static(b"local"))
            .await
            .unwrap();
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"local");
    }
}
