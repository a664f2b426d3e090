//! Streaming object reader and writer for S3
//!
//! The reader re-chunks a `GetObject` body to whatever size the caller asks
//! for. The writer buffers into parts and only switches to a multipart upload
//! once a full part has accumulated, so small objects cost one `PutObject`.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::{Bytes, BytesMut};
use stowage_core::{Error, ObjectReader, ObjectWriter, Result};

use crate::client::map_sdk_error;

/// Size of each multipart upload part (8 MiB, above the 5 MiB S3 minimum)
pub const PART_SIZE: usize = 8 * 1024 * 1024;

pub(crate) struct S3ObjectReader {
    body: ByteStream,
    pending: Bytes,
    location: String,
}

impl S3ObjectReader {
    pub(crate) fn new(body: ByteStream, location: String) -> Self {
        Self {
            body,
            pending: Bytes::new(),
            location,
        }
    }
}

#[async_trait]
impl ObjectReader for S3ObjectReader {
    async fn read(&mut self, max_bytes: usize) -> Result<Bytes> {
        while self.pending.is_empty() {
            match self.body.next().await {
                Some(Ok(chunk)) => self.pending = chunk,
                Some(Err(e)) => {
                    return Err(Error::Network(format!(
                        "{}: body stream failed: {e}",
                        self.location
                    )));
                }
                None => return Ok(Bytes::new()),
            }
        }

        let take = max_bytes.min(self.pending.len());
        Ok(self.pending.split_to(take))
    }
}

/// Accumulates written bytes and hands out full parts
#[derive(Debug)]
pub(crate) struct PartBuffer {
    buffer: BytesMut,
    part_size: usize,
}

impl PartBuffer {
    pub(crate) fn new(part_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            part_size,
        }
    }

    /// Append `chunk` and return every part that is now complete
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);
        let mut parts = Vec::new();
        while self.buffer.len() >= self.part_size {
            parts.push(self.buffer.split_to(self.part_size).freeze());
        }
        parts
    }

    /// Take whatever is left, possibly empty
    pub(crate) fn take_rest(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    pub(crate) fn clear(&mut self) {
        self.buffer.clear();
    }
}

pub(crate) struct S3ObjectWriter {
    client: aws_sdk_s3::Client,
    bucket: String,
    key: String,
    content_type: String,
    location: String,
    buffer: PartBuffer,
    upload_id: Option<String>,
    parts: Vec<CompletedPart>,
    finished: bool,
}

impl S3ObjectWriter {
    pub(crate) fn new(
        client: aws_sdk_s3::Client,
        bucket: String,
        key: String,
        content_type: String,
        location: String,
    ) -> Self {
        Self {
            client,
            bucket,
            key,
            content_type,
            location,
            buffer: PartBuffer::new(PART_SIZE),
            upload_id: None,
            parts: Vec::new(),
            finished: false,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finished {
            return Err(Error::General(format!("{} is already closed", self.location)));
        }
        Ok(())
    }

    async fn upload_id(&mut self) -> Result<String> {
        if let Some(id) = &self.upload_id {
            return Ok(id.clone());
        }

        let response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .content_type(&self.content_type)
            .send()
            .await
            .map_err(|e| map_sdk_error(&e, &self.location))?;

        let id = response
            .upload_id()
            .ok_or_else(|| Error::General(format!("{}: no upload id returned", self.location)))?
            .to_string();
        tracing::debug!(location = %self.location, upload_id = %id, "Started multipart upload");
        self.upload_id = Some(id.clone());
        Ok(id)
    }

    async fn upload_part(&mut self, body: Bytes) -> Result<()> {
        let upload_id = self.upload_id().await?;
        let part_number = i32::try_from(self.parts.len() + 1)
            .map_err(|_| Error::General(format!("{}: too many parts", self.location)))?;

        let response = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| map_sdk_error(&e, &self.location))?;

        self.parts.push(
            CompletedPart::builder()
                .part_number(part_number)
                .set_e_tag(response.e_tag().map(str::to_string))
                .build(),
        );
        tracing::trace!(location = %self.location, part_number, "Uploaded part");
        Ok(())
    }
}

#[async_trait]
impl ObjectWriter for S3ObjectWriter {
    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.ensure_open()?;
        for part in self.buffer.push(&chunk) {
            self.upload_part(part).await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        let rest = self.buffer.take_rest();

        let Some(upload_id) = self.upload_id.clone() else {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&self.key)
                .content_type(&self.content_type)
                .body(ByteStream::from(rest))
                .send()
                .await
                .map_err(|e| map_sdk_error(&e, &self.location))?;
            self.finished = true;
            return Ok(());
        };

        if !rest.is_empty() {
            self.upload_part(rest).await?;
        }

        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(std::mem::take(&mut self.parts)))
            .build();
        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(|e| map_sdk_error(&e, &self.location))?;

        tracing::debug!(location = %self.location, upload_id = %upload_id, "Completed multipart upload");
        self.finished = true;
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.buffer.clear();
        self.parts.clear();

        if let Some(upload_id) = self.upload_id.take() {
            self.client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(&self.key)
                .upload_id(&upload_id)
                .send()
                .await
                .map_err(|e| map_sdk_error(&e, &self.location))?;
            tracing::debug!(location = %self.location, upload_id = %upload_id, "Aborted multipart upload");
        }
        Ok(())
    }
}
