/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! S3-compatible storage backend.
//!
//! Works with AWS S3, MinIO, and other S3-compatible services.
//!
//! # Example
//!
//! ```no_run
//! use model_store::storage::{ModelStorage, S3Storage};
//! use model_store::{OperationContext, StorageConfig};
//!
//! # async fn example() -> model_store::error::Result<()> {
//! let config = StorageConfig::builder()
//!     .endpoint("localhost:9000")
//!     .access_key_id("MINIOADMIN")
//!     .secret_access_key("MINIOPASSWORD")
//!     .build();
//!
//! let ctx = OperationContext::new();
//! // creates the `models` bucket if it does not exist yet
//! let storage = S3Storage::connect(&ctx, &config).await?;
//! let keys = storage.list(&ctx).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use tracing::Instrument;

use super::{validate_key, ModelStorage};
use crate::config::{StorageConfig, DEFAULT_REGION};
use crate::context::OperationContext;
use crate::error::{self, Error, Result};
use crate::io::{InputStream, ModelReader};

mod list_objects;

use list_objects::ListObjectsPaginator;

/// S3-compatible storage backend.
///
/// All models live flat in a single bucket. The bucket is created on construction if it does
/// not exist yet, so a constructed `S3Storage` always points at a usable bucket.
///
/// Cloning is cheap and clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Storage {
    /// Connect to the endpoint described by `config` and make sure its bucket exists.
    ///
    /// Fails with [`ErrorKind::Initialization`](crate::error::ErrorKind::Initialization) if the
    /// bucket can not be checked or created.
    pub async fn connect(ctx: &OperationContext, config: &StorageConfig) -> Result<Self> {
        let client = sdk_client(config).await;
        Self::from_client(ctx, client, config.bucket_name()).await
    }

    /// Use an existing S3 client and make sure `bucket` exists.
    pub async fn from_client(
        ctx: &OperationContext,
        client: aws_sdk_s3::Client,
        bucket: impl Into<String>,
    ) -> Result<Self> {
        let bucket = bucket.into();
        if bucket.is_empty() {
            return Err(error::initialization_failed("bucket name must not be empty"));
        }

        ctx.run(provision_bucket(&client, &bucket))
            .instrument(tracing::debug_span!("provision-bucket", bucket = %bucket))
            .await?;

        Ok(Self { client, bucket })
    }

    /// The underlying S3 client.
    pub fn client(&self) -> &aws_sdk_s3::Client {
        &self.client
    }

    /// The bucket holding all models.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(&self, model_id: &str, data: InputStream, size: u64) -> Result<()> {
        let content_length = i64::try_from(size).map_err(error::invalid_input)?;
        let body = data.into_byte_stream(size).await?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(model_id)
            .content_length(content_length)
            .body(body)
            .send()
            .await
            .map_err(error::from_put_object)?;
        Ok(())
    }

    async fn get_object(&self, model_id: &str) -> Result<ModelReader> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(model_id)
            .send()
            .await
            .map_err(error::from_get_object)?;
        tracing::trace!(content_length = ?resp.content_length(), "opened object body");
        Ok(ModelReader::new(resp.body.into_async_read()))
    }

    async fn delete_object(&self, model_id: &str) -> Result<()> {
        let result = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(model_id)
            .send()
            .await;
        match result.map_err(Error::from) {
            Ok(_) => Ok(()),
            // S3 answers 204 for missing keys, some lookalikes answer NoSuchKey
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn head_object(&self, model_id: &str) -> Result<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(model_id)
            .send()
            .await;
        match result.map_err(error::from_head_object) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let mut paginator = ListObjectsPaginator::new(self.client.clone(), self.bucket.clone());
        let mut keys = Vec::new();
        while let Some(page) = paginator.next_page().await {
            let page = page?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(str::to_owned),
            );
        }
        Ok(keys)
    }
}

#[async_trait]
impl ModelStorage for S3Storage {
    async fn upload(
        &self,
        ctx: &OperationContext,
        model_id: &str,
        data: InputStream,
        size: u64,
    ) -> Result<()> {
        validate_key(model_id).map_err(|e| e.with_context("upload", Some(model_id)))?;
        ctx.run(self.put_object(model_id, data, size))
            .instrument(tracing::debug_span!("put-object", key = model_id, size))
            .await
            .map_err(|e| e.with_context("upload", Some(model_id)))
    }

    async fn download(&self, ctx: &OperationContext, model_id: &str) -> Result<ModelReader> {
        validate_key(model_id).map_err(|e| e.with_context("download", Some(model_id)))?;
        ctx.run(self.get_object(model_id))
            .instrument(tracing::debug_span!("get-object", key = model_id))
            .await
            .map(|reader| reader.with_context(ctx))
            .map_err(|e| e.with_context("download", Some(model_id)))
    }

    async fn delete(&self, ctx: &OperationContext, model_id: &str) -> Result<()> {
        validate_key(model_id).map_err(|e| e.with_context("delete", Some(model_id)))?;
        ctx.run(self.delete_object(model_id))
            .instrument(tracing::debug_span!("delete-object", key = model_id))
            .await
            .map_err(|e| e.with_context("delete", Some(model_id)))
    }

    async fn list(&self, ctx: &OperationContext) -> Result<Vec<String>> {
        ctx.run(self.list_keys())
            .instrument(tracing::debug_span!("list-objects", bucket = %self.bucket))
            .await
            .map_err(|e| e.with_context("list", None))
    }

    async fn exists(&self, ctx: &OperationContext, model_id: &str) -> Result<bool> {
        validate_key(model_id).map_err(|e| e.with_context("exists", Some(model_id)))?;
        ctx.run(self.head_object(model_id))
            .instrument(tracing::debug_span!("head-object", key = model_id))
            .await
            .map_err(|e| e.with_context("exists", Some(model_id)))
    }
}

/// Build an S3 client for `config`.
///
/// Path-style addressing is forced since most self-hosted stores do not support virtual-hosted
/// buckets. Without static credentials the default AWS provider chain is used.
async fn sdk_client(config: &StorageConfig) -> aws_sdk_s3::Client {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region().to_owned()))
        .endpoint_url(config.endpoint_url());
    if let Some(credentials) = config.credentials() {
        loader = loader.credentials_provider(credentials);
    }
    let shared_config = loader.load().await;

    let s3_config = aws_sdk_s3::config::Builder::from(&shared_config)
        .force_path_style(true)
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}

/// Check for `bucket` and create it when absent.
async fn provision_bucket(client: &aws_sdk_s3::Client, bucket: &str) -> Result<()> {
    let exists = match client.head_bucket().bucket(bucket).send().await {
        Ok(_) => true,
        Err(err) => error::head_bucket_failed(err)?,
    };
    if exists {
        tracing::debug!("bucket already exists");
        return Ok(());
    }

    let mut request = client.create_bucket().bucket(bucket);
    // us-east-1 is the implicit location and S3 rejects it as an explicit constraint
    let region = client.config().region().map(|r| r.as_ref().to_owned());
    if let Some(region) = region.filter(|r| r != DEFAULT_REGION) {
        request = request.create_bucket_configuration(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region.as_str()))
                .build(),
        );
    }

    match request.send().await {
        Ok(_) => {
            tracing::info!("created bucket");
            Ok(())
        }
        Err(err) => error::create_bucket_failed(err),
    }
}
