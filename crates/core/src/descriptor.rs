//! Storage descriptors
//!
//! A descriptor names where an object lives and how to authenticate to it,
//! independent of any live connection. Two forms exist:
//!
//! - [`JsonStorageDescriptor`]: the flat wire format (`scheme`, `bucket`,
//!   `key`, `awsAccessKeyId`, ...), with defaults applied.
//! - [`StorageDescriptor`]: the runtime form, which tracks whether its
//!   credential has been decrypted. Only a decrypted descriptor may be turned
//!   into a client.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::secret::Secret;

/// Region used when an S3 wire descriptor omits `region`
pub const DEFAULT_REGION: &str = "us-west-2";

/// Root used when a local wire descriptor omits `root`
pub const DEFAULT_LOCAL_ROOT: &str = "/";

/// Backend discriminator carried in the `scheme` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageScheme {
    S3,
    AzureBlob,
    Dropbox,
    Local,
}

impl StorageScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageScheme::S3 => "S3",
            StorageScheme::AzureBlob => "AzureBlob",
            StorageScheme::Dropbox => "Dropbox",
            StorageScheme::Local => "Local",
        }
    }
}

impl fmt::Display for StorageScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageScheme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "S3" => Ok(StorageScheme::S3),
            "AzureBlob" => Ok(StorageScheme::AzureBlob),
            "Dropbox" => Ok(StorageScheme::Dropbox),
            "Local" => Ok(StorageScheme::Local),
            other => Err(Error::UnsupportedScheme(other.to_string())),
        }
    }
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_local_root() -> String {
    DEFAULT_LOCAL_ROOT.to_string()
}

/// Treats an explicit `null` the same as a missing region
fn region_or_default<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_region))
}

/// S3 wire descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3JsonStorageDescriptor {
    pub bucket: String,
    pub key: String,
    pub aws_access_key_id: String,
    pub encrypted_aws_secret_access_key: String,
    #[serde(default = "default_region", deserialize_with = "region_or_default")]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Local filesystem wire descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalJsonStorageDescriptor {
    #[serde(default = "default_local_root")]
    pub root: String,
    pub key: String,
}

/// Wire-format descriptor, tagged by `scheme`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scheme")]
pub enum JsonStorageDescriptor {
    S3(S3JsonStorageDescriptor),
    Local(LocalJsonStorageDescriptor),
}

impl JsonStorageDescriptor {
    /// Validate a JSON mapping and build the matching wire descriptor
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            Error::InvalidDescriptor("descriptor must be a JSON object".to_string())
        })?;

        let scheme = object
            .get("scheme")
            .ok_or_else(|| Error::InvalidDescriptor("missing field `scheme`".to_string()))?
            .as_str()
            .ok_or_else(|| Error::InvalidDescriptor("`scheme` must be a string".to_string()))?;

        let invalid = |e: serde_json::Error| Error::InvalidDescriptor(format!("{scheme}: {e}"));

        match scheme.parse::<StorageScheme>()? {
            StorageScheme::S3 => S3JsonStorageDescriptor::deserialize(value)
                .map(JsonStorageDescriptor::S3)
                .map_err(invalid),
            StorageScheme::Local => LocalJsonStorageDescriptor::deserialize(value)
                .map(JsonStorageDescriptor::Local)
                .map_err(invalid),
            unsupported => Err(Error::UnsupportedScheme(unsupported.to_string())),
        }
    }

    /// Parse JSON text, then validate it with [`JsonStorageDescriptor::from_json`]
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_json(&value)
    }

    pub fn scheme(&self) -> StorageScheme {
        match self {
            JsonStorageDescriptor::S3(_) => StorageScheme::S3,
            JsonStorageDescriptor::Local(_) => StorageScheme::Local,
        }
    }
}

impl<'de> Deserialize<'de> for JsonStorageDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}

/// Runtime S3 descriptor
///
/// Holds the encrypted secret, the plaintext secret, or both. The plaintext
/// is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "S3DescriptorRecord")]
pub struct S3StorageDescriptor {
    bucket: String,
    path: String,
    access_key_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    encrypted_secret: Option<String>,
    #[serde(skip)]
    secret: Option<Secret>,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
}

impl S3StorageDescriptor {
    pub fn builder(
        bucket: impl Into<String>,
        path: impl Into<String>,
        access_key_id: impl Into<String>,
    ) -> S3StorageDescriptorBuilder {
        S3StorageDescriptorBuilder {
            bucket: bucket.into(),
            path: path.into(),
            access_key_id: access_key_id.into(),
            encrypted_secret: None,
            secret: None,
            region: None,
            endpoint: None,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn encrypted_secret(&self) -> Option<&str> {
        self.encrypted_secret.as_deref()
    }

    /// Plaintext secret, present only once decrypted
    pub fn secret(&self) -> Option<&Secret> {
        self.secret.as_ref()
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn is_decrypted(&self) -> bool {
        self.secret.is_some()
    }

    /// Decrypt the secret with a caller-supplied function
    ///
    /// A no-op when already decrypted. If `decrypt_fn` fails the descriptor
    /// stays undecrypted.
    pub fn decrypt<F>(&mut self, decrypt_fn: F) -> Result<()>
    where
        F: FnOnce(&str) -> Result<String>,
    {
        if self.is_decrypted() {
            return Ok(());
        }

        let encrypted = self.encrypted_secret.as_deref().ok_or_else(|| {
            Error::InvalidDescriptor(format!("{} has no encrypted secret", self.location()))
        })?;
        let plaintext = decrypt_fn(encrypted)?;
        self.secret = Some(Secret::new(plaintext));

        tracing::debug!(location = %self.location(), "Decrypted storage descriptor");
        Ok(())
    }

    pub fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.path.trim_start_matches('/'))
    }
}

/// Builder for [`S3StorageDescriptor`]; `build` enforces that at least one
/// secret form was supplied
#[derive(Debug, Clone)]
pub struct S3StorageDescriptorBuilder {
    bucket: String,
    path: String,
    access_key_id: String,
    encrypted_secret: Option<String>,
    secret: Option<Secret>,
    region: Option<String>,
    endpoint: Option<String>,
}

impl S3StorageDescriptorBuilder {
    pub fn encrypted_secret(mut self, envelope: impl Into<String>) -> Self {
        self.encrypted_secret = Some(envelope.into());
        self
    }

    pub fn secret(mut self, plaintext: impl Into<Secret>) -> Self {
        self.secret = Some(plaintext.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    fn endpoint_opt(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn build(self) -> Result<S3StorageDescriptor> {
        if self.encrypted_secret.is_none() && self.secret.is_none() {
            return Err(Error::InvalidDescriptor(format!(
                "s3://{}/{}: either an encrypted or a plaintext secret access key must be supplied",
                self.bucket, self.path
            )));
        }

        Ok(S3StorageDescriptor {
            bucket: self.bucket,
            path: self.path,
            access_key_id: self.access_key_id,
            encrypted_secret: self.encrypted_secret,
            secret: self.secret,
            region: self.region,
            endpoint: self.endpoint,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct S3DescriptorRecord {
    bucket: String,
    path: String,
    access_key_id: String,
    encrypted_secret: Option<String>,
    region: Option<String>,
    endpoint: Option<String>,
}

impl TryFrom<S3DescriptorRecord> for S3StorageDescriptor {
    type Error = Error;

    fn try_from(record: S3DescriptorRecord) -> Result<Self> {
        let mut builder =
            S3StorageDescriptor::builder(record.bucket, record.path, record.access_key_id);
        builder.encrypted_secret = record.encrypted_secret;
        builder.region = record.region;
        builder.endpoint = record.endpoint;
        builder.build()
    }
}

/// Runtime local filesystem descriptor; never carries credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalStorageDescriptor {
    pub root: PathBuf,
    pub path: String,
}

impl LocalStorageDescriptor {
    pub fn new(root: impl Into<PathBuf>, path: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            path: path.into(),
        }
    }

    pub fn location(&self) -> String {
        format!(
            "file://{}",
            self.root.join(self.path.trim_start_matches('/')).display()
        )
    }
}

/// Runtime descriptor, one variant per implemented backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme")]
pub enum StorageDescriptor {
    S3(S3StorageDescriptor),
    Local(LocalStorageDescriptor),
}

impl StorageDescriptor {
    /// Map a wire descriptor to its runtime form without decrypting anything
    pub fn from_json_descriptor(json: JsonStorageDescriptor) -> Result<Self> {
        match json {
            JsonStorageDescriptor::S3(s3) => {
                S3StorageDescriptor::builder(s3.bucket, s3.key, s3.aws_access_key_id)
                    .encrypted_secret(s3.encrypted_aws_secret_access_key)
                    .region(s3.region)
                    .endpoint_opt(s3.endpoint)
                    .build()
                    .map(StorageDescriptor::S3)
            }
            JsonStorageDescriptor::Local(local) => Ok(StorageDescriptor::Local(
                LocalStorageDescriptor::new(local.root, local.key),
            )),
        }
    }

    pub fn scheme(&self) -> StorageScheme {
        match self {
            StorageDescriptor::S3(_) => StorageScheme::S3,
            StorageDescriptor::Local(_) => StorageScheme::Local,
        }
    }

    /// Object key or path within the backend
    pub fn path(&self) -> &str {
        match self {
            StorageDescriptor::S3(d) => d.path(),
            StorageDescriptor::Local(d) => &d.path,
        }
    }

    pub fn is_decrypted(&self) -> bool {
        match self {
            StorageDescriptor::S3(d) => d.is_decrypted(),
            StorageDescriptor::Local(_) => true,
        }
    }

    pub fn decrypt<F>(&mut self, decrypt_fn: F) -> Result<()>
    where
        F: FnOnce(&str) -> Result<String>,
    {
        match self {
            StorageDescriptor::S3(d) => d.decrypt(decrypt_fn),
            StorageDescriptor::Local(_) => Ok(()),
        }
    }

    pub fn location(&self) -> String {
        match self {
            StorageDescriptor::S3(d) => d.location(),
            StorageDescriptor::Local(d) => d.location(),
        }
    }
}

impl TryFrom<JsonStorageDescriptor> for StorageDescriptor {
    type Error = Error;

    fn try_from(json: JsonStorageDescriptor) -> Result<Self> {
        Self::from_json_descriptor(json)
    }
}
