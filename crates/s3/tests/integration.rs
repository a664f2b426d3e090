//! Tests against a live S3-compatible server
//!
//! Run with `cargo test -p stowage-s3 --features integration` and set
//! `STOWAGE_TEST_S3_ENDPOINT`, `STOWAGE_TEST_S3_BUCKET`,
//! `STOWAGE_TEST_S3_ACCESS_KEY` and `STOWAGE_TEST_S3_SECRET_KEY`.

#![cfg(feature = "integration")]

use bytes::Bytes;
use stowage_core::{Error, LocalFsClient, StorageClient, TransferEngine};
use stowage_s3::{PART_SIZE, S3Client, S3ClientConfig};
use tempfile::TempDir;

fn env(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} must be set for integration tests"))
}

async fn client() -> S3Client {
    S3Client::new(S3ClientConfig {
        bucket: env("STOWAGE_TEST_S3_BUCKET"),
        access_key_id: env("STOWAGE_TEST_S3_ACCESS_KEY"),
        secret_access_key: env("STOWAGE_TEST_S3_SECRET_KEY").into(),
        region: std::env::var("STOWAGE_TEST_S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
        endpoint: Some(env("STOWAGE_TEST_S3_ENDPOINT")),
    })
    .await
    .unwrap()
}

fn unique(name: &str) -> String {
    format!("stowage-it/{}/{name}", jiff::Timestamp::now().as_nanosecond())
}

#[tokio::test]
async fn test_multipart_roundtrip_through_local() {
    let s3 = client().await;
    let dir = TempDir::new().unwrap();
    let local = LocalFsClient::new(dir.path());

    let size = PART_SIZE + PART_SIZE / 2 + 7;
    let data: Vec<u8> = (0..size).map(|i| (i % 253) as u8).collect();
    local.write("in.bin", Bytes::from(data.clone())).await.unwrap();

    let key = unique("big.bin");
    let engine = TransferEngine::new(3 * 1024 * 1024);
    let up = engine.copy(&local, "in.bin", &s3, &key).await.unwrap();
    assert_eq!(up.bytes, size as u64);
    assert_eq!(s3.stat(&key).await.unwrap().content_length, size as u64);

    let down = engine.copy(&s3, &key, &local, "out.bin").await.unwrap();
    assert_eq!(down.bytes, size as u64);
    assert!(std::fs::read(dir.path().join("out.bin")).unwrap() == data);

    s3.delete(&key).await.unwrap();
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let s3 = client().await;
    let key = unique("small.txt");

    s3.write(&key, Bytes::from_static(b"Hello, world!")).await.unwrap();
    assert_eq!(s3.stat(&key).await.unwrap().content_type.as_deref(), Some("text/plain"));

    s3.delete(&key).await.unwrap();
    s3.delete(&key).await.unwrap();
    assert!(matches!(s3.read(&key).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_presign_read() {
    let s3 = client().await;
    let key = unique("shared.txt");
    s3.write(&key, Bytes::from_static(b"share")).await.unwrap();

    let url = s3.presign_read(&key, 600).await.unwrap();
    assert!(url.contains("X-Amz-Signature"));

    s3.delete(&key).await.unwrap();
}
