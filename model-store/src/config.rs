/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;

use aws_sdk_s3::config::Credentials;

pub(crate) mod loader;

/// Default S3-compatible endpoint (a local MinIO).
pub const DEFAULT_ENDPOINT: &str = "localhost:9000";

/// Default bucket holding all model artifacts.
pub const DEFAULT_BUCKET: &str = "models";

/// Default signing region. MinIO accepts any region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for an [`S3Storage`](crate::storage::S3Storage) backend.
///
/// Values are immutable once built; construct a new config to point somewhere else.
#[derive(Clone)]
pub struct StorageConfig {
    endpoint: String,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    use_ssl: bool,
    bucket_name: String,
    region: String,
}

impl StorageConfig {
    /// Create a new `StorageConfig` builder
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// The endpoint address as configured, e.g. `localhost:9000`
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The endpoint as a URL, with a scheme derived from [`use_ssl`](Self::use_ssl) unless the
    /// configured endpoint already carries one.
    pub fn endpoint_url(&self) -> String {
        if self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://") {
            return self.endpoint.clone();
        }
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{scheme}://{}", self.endpoint)
    }

    /// Access key id, if static credentials were configured
    pub fn access_key_id(&self) -> Option<&str> {
        self.access_key_id.as_deref()
    }

    /// Whether to connect over TLS
    pub fn use_ssl(&self) -> bool {
        self.use_ssl
    }

    /// The bucket holding all model artifacts
    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    /// The signing region
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Static credentials when both halves of the key pair are set.
    ///
    /// `None` means the default AWS credential provider chain is used instead.
    pub(crate) fn credentials(&self) -> Option<Credentials> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(id), Some(secret)) => Some(Credentials::new(
                id.clone(),
                secret.clone(),
                None,
                None,
                "model-store",
            )),
            _ => None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Builder::default().build()
    }
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "** redacted **"),
            )
            .field("use_ssl", &self.use_ssl)
            .field("bucket_name", &self.bucket_name)
            .field("region", &self.region)
            .finish()
    }
}

/// Fluent style builder for [StorageConfig]
#[derive(Clone, Default)]
pub struct Builder {
    endpoint: Option<String>,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    use_ssl: Option<bool>,
    bucket_name: Option<String>,
    region: Option<String>,
}

impl Builder {
    /// Endpoint address, with or without a scheme.
    ///
    /// Default is `localhost:9000`
    pub fn endpoint(self, endpoint: impl Into<String>) -> Self {
        self.set_endpoint(Some(endpoint.into()))
    }

    /// Static access key id. Must be paired with [`secret_access_key`](Self::secret_access_key).
    pub fn access_key_id(self, access_key_id: impl Into<String>) -> Self {
        self.set_access_key_id(Some(access_key_id.into()))
    }

    /// Static secret access key. Must be paired with [`access_key_id`](Self::access_key_id).
    pub fn secret_access_key(self, secret_access_key: impl Into<String>) -> Self {
        self.set_secret_access_key(Some(secret_access_key.into()))
    }

    /// Connect over TLS.
    ///
    /// Default is `false`
    pub fn use_ssl(self, use_ssl: bool) -> Self {
        self.set_use_ssl(Some(use_ssl))
    }

    /// Bucket holding all model artifacts. Created on first connect if absent.
    ///
    /// Default is `models`
    pub fn bucket_name(self, bucket_name: impl Into<String>) -> Self {
        self.set_bucket_name(Some(bucket_name.into()))
    }

    /// Signing region.
    ///
    /// Default is `us-east-1`
    pub fn region(self, region: impl Into<String>) -> Self {
        self.set_region(Some(region.into()))
    }

    pub(crate) fn set_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub(crate) fn set_access_key_id(mut self, access_key_id: Option<String>) -> Self {
        self.access_key_id = access_key_id;
        self
    }

    pub(crate) fn set_secret_access_key(mut self, secret_access_key: Option<String>) -> Self {
        self.secret_access_key = secret_access_key;
        self
    }

    pub(crate) fn set_use_ssl(mut self, use_ssl: Option<bool>) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    pub(crate) fn set_bucket_name(mut self, bucket_name: Option<String>) -> Self {
        self.bucket_name = bucket_name;
        self
    }

    pub(crate) fn set_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    /// Fill every unset field from `other`.
    pub(crate) fn or(self, other: Builder) -> Self {
        Builder {
            endpoint: self.endpoint.or(other.endpoint),
            access_key_id: self.access_key_id.or(other.access_key_id),
            secret_access_key: self.secret_access_key.or(other.secret_access_key),
            use_ssl: self.use_ssl.or(other.use_ssl),
            bucket_name: self.bucket_name.or(other.bucket_name),
            region: self.region.or(other.region),
        }
    }

    /// Consumes the builder and constructs a [`StorageConfig`], applying defaults for unset fields
    pub fn build(self) -> StorageConfig {
        StorageConfig {
            endpoint: self.endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned()),
            access_key_id: self.access_key_id,
            secret_access_key: self.secret_access_key,
            use_ssl: self.use_ssl.unwrap_or(false),
            bucket_name: self.bucket_name.unwrap_or_else(|| DEFAULT_BUCKET.to_owned()),
            region: self.region.unwrap_or_else(|| DEFAULT_REGION.to_owned()),
        }
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("endpoint", &self.endpoint)
            .field("bucket_name", &self.bucket_name)
            .finish_non_exhaustive()
    }
}
