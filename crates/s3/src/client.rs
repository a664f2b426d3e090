//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the StorageClient trait from stowage-core.

use async_trait::async_trait;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use stowage_core::descriptor::DEFAULT_REGION;
use stowage_core::{
    Error, ObjectReader, ObjectStat, ObjectWriter, Result, S3StorageDescriptor, Secret,
    StorageClient, ensure_deleted,
};

use crate::stream::{S3ObjectReader, S3ObjectWriter};

/// Connection settings for one bucket
#[derive(Debug, Clone)]
pub struct S3ClientConfig {
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: Secret,
    pub region: String,
    /// Custom endpoint for S3-compatible services; enables path-style addressing
    pub endpoint: Option<String>,
}

impl S3ClientConfig {
    /// Take connection settings from a decrypted descriptor
    pub fn from_descriptor(descriptor: &S3StorageDescriptor) -> Result<Self> {
        let secret = descriptor
            .secret()
            .ok_or_else(|| Error::NotDecrypted(descriptor.location()))?;

        Ok(Self {
            bucket: descriptor.bucket().to_string(),
            access_key_id: descriptor.access_key_id().to_string(),
            secret_access_key: secret.clone(),
            region: descriptor.region().unwrap_or(DEFAULT_REGION).to_string(),
            endpoint: descriptor.endpoint().map(str::to_string),
        })
    }
}

/// S3 client bound to a single bucket
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Client {
    /// Create a new S3 client with static credentials
    pub async fn new(config: S3ClientConfig) -> Result<Self> {
        let credentials = aws_credential_types::Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.expose().to_string(),
            None,
            None,
            "stowage-static-credentials",
        );

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.endpoint.is_some())
            .build();

        tracing::debug!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = config.endpoint.as_deref().unwrap_or("default"),
            "Created S3 client"
        );

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.bucket,
        })
    }

    fn key<'a>(&self, path: &'a str) -> &'a str {
        path.trim_start_matches('/')
    }
}

/// Format AWS SDK error into a detailed error message
pub(crate) fn format_sdk_error<E: std::fmt::Display>(error: &SdkError<E>) -> String {
    match error {
        SdkError::ServiceError(service_err) => {
            let err = service_err.err();
            let meta = service_err.raw();
            let mut msg = format!("Service error: {}", err);
            if let Some(code) = meta.headers().get("x-amz-error-code")
                && let Ok(code_str) = std::str::from_utf8(code.as_bytes())
            {
                msg.push_str(&format!(" (code: {})", code_str));
            }
            msg
        }
        SdkError::ConstructionFailure(err) => {
            format!("Request construction failed: {:?}", err)
        }
        SdkError::TimeoutError(_) => "Request timeout".to_string(),
        SdkError::DispatchFailure(err) => {
            format!("Network dispatch failure: {:?}", err)
        }
        SdkError::ResponseError(err) => {
            format!("Response error: {:?}", err)
        }
        _ => error.to_string(),
    }
}

/// Map an SDK error onto the shared error taxonomy
pub(crate) fn map_sdk_error<E>(error: &SdkError<E>, location: &str) -> Error
where
    E: ProvideErrorMetadata + std::fmt::Display,
{
    let message = format_sdk_error(error);
    match error {
        SdkError::ServiceError(service_err) => classify_service_error(
            service_err.raw().status().as_u16(),
            service_err.err().code(),
            location,
            message,
        ),
        _ => Error::Network(format!("{location}: {message}")),
    }
}

fn classify_service_error(status: u16, code: Option<&str>, location: &str, message: String) -> Error {
    match (status, code) {
        (404, _) | (_, Some("NoSuchKey" | "NotFound" | "NoSuchBucket")) => {
            Error::NotFound(location.to_string())
        }
        (401 | 403, _)
        | (_, Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch")) => {
            Error::Auth(format!("{location}: {message}"))
        }
        _ => Error::Network(format!("{location}: {message}")),
    }
}

/// Guess the content type stored with an object from its key
pub(crate) fn content_type_for(key: &str) -> String {
    mime_guess::from_path(key)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[async_trait]
impl StorageClient for S3Client {
    fn location(&self, path: &str) -> String {
        format!("s3://{}/{}", self.bucket, self.key(path))
    }

    async fn open_reader(&self, path: &str) -> Result<Box<dyn ObjectReader>> {
        let location = self.location(path);
        let response = self
            .inner
            .get_object()
            .bucket(&self.bucket)
            .key(self.key(path))
            .send()
            .await
            .map_err(|e| map_sdk_error(&e, &location))?;

        Ok(Box::new(S3ObjectReader::new(response.body, location)))
    }

    async fn open_writer(&self, path: &str) -> Result<Box<dyn ObjectWriter>> {
        let key = self.key(path);
        Ok(Box::new(S3ObjectWriter::new(
            self.inner.clone(),
            self.bucket.clone(),
            key.to_string(),
            content_type_for(key),
            self.location(path),
        )))
    }

    async fn stat(&self, path: &str) -> Result<ObjectStat> {
        let location = self.location(path);
        let response = self
            .inner
            .head_object()
            .bucket(&self.bucket)
            .key(self.key(path))
            .send()
            .await
            .map_err(|e| map_sdk_error(&e, &location))?;

        let size = response.content_length().unwrap_or(0);
        let mut stat = ObjectStat::new(u64::try_from(size).unwrap_or(0));

        if let Some(modified) = response.last_modified() {
            stat.last_modified = jiff::Timestamp::from_second(modified.secs()).ok();
        }

        if let Some(etag) = response.e_tag() {
            stat.etag = Some(etag.trim_matches('"').to_string());
        }

        if let Some(ct) = response.content_type() {
            stat.content_type = Some(ct.to_string());
        }

        Ok(stat)
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let location = self.location(path);
        let response = self
            .inner
            .get_object()
            .bucket(&self.bucket)
            .key(self.key(path))
            .send()
            .await
            .map_err(|e| map_sdk_error(&e, &location))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Network(format!("{location}: {e}")))?
            .into_bytes();

        Ok(data)
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        let location = self.location(path);
        let key = self.key(path);
        self.inner
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type_for(key))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| map_sdk_error(&e, &location))?;

        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let location = self.location(path);
        // S3 reports success for missing keys
        self.inner
            .delete_object()
            .bucket(&self.bucket)
            .key(self.key(path))
            .send()
            .await
            .map_err(|e| map_sdk_error(&e, &location))?;

        ensure_deleted(self, path).await
    }

    async fn presign_read(&self, path: &str, expires_secs: u64) -> Result<String> {
        let config = aws_sdk_s3::presigning::PresigningConfig::builder()
            .expires_in(std::time::Duration::from_secs(expires_secs))
            .build()
            .map_err(|e| Error::General(format!("presign_read config: {e}")))?;

        let request = self
            .inner
            .get_object()
            .bucket(&self.bucket)
            .key(self.key(path))
            .presigned(config)
            .await
            .map_err(|e| Error::General(format!("presign_read: {e}")))?;

        Ok(request.uri().to_string())
    }
}
