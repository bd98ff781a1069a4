/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

use bytes::Bytes;
use tracing::Instrument;

use crate::config::StorageConfig;
use crate::context::OperationContext;
use crate::error::Result;
use crate::io::{InputStream, ModelReader};
use crate::storage::{ModelStorage, S3Storage};

/// Model store client.
///
/// A cheap-to-clone handle over any [`ModelStorage`]. Application code holds a `Client` and never
/// needs to know which backend is behind it.
#[derive(Debug, Clone)]
pub struct Client {
    pub(crate) handle: Arc<dyn ModelStorage>,
}

impl Client {
    /// Creates a new client over the given storage backend.
    pub fn new<S>(storage: S) -> Client
    where
        S: ModelStorage + 'static,
    {
        Client {
            handle: Arc::new(storage),
        }
    }

    /// Connects to the S3-compatible endpoint described by `config`, creating its bucket if
    /// needed.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # async fn example() -> model_store::error::Result<()> {
    /// use model_store::{Client, OperationContext};
    ///
    /// let config = model_store::from_env().load()?;
    /// let client = Client::connect(&OperationContext::new(), &config).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(ctx: &OperationContext, config: &StorageConfig) -> Result<Client> {
        let storage = S3Storage::connect(ctx, config).await?;
        Ok(Client::new(storage))
    }

    /// Returns the storage backend behind this client.
    pub fn storage(&self) -> &Arc<dyn ModelStorage> {
        &self.handle
    }

    /// Upload a model of exactly `size` bytes, replacing any model stored under `model_id`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use model_store::io::InputStream;
    /// use model_store::{Client, OperationContext};
    ///
    /// async fn upload_file(client: &Client, path: &std::path::Path) -> model_store::error::Result<()> {
    ///     let size = std::fs::metadata(path)?.len();
    ///     let ctx = OperationContext::new();
    ///     client
    ///         .upload_model(&ctx, "resnet-50", InputStream::from_path(path), size)
    ///         .await
    /// }
    /// ```
    pub async fn upload_model(
        &self,
        ctx: &OperationContext,
        model_id: &str,
        data: impl Into<InputStream>,
        size: u64,
    ) -> Result<()> {
        let span = tracing::debug_span!("upload-model", model_id, size);
        self.handle
            .upload(ctx, model_id, data.into(), size)
            .instrument(span)
            .await
    }

    /// Open the model stored under `model_id` for reading.
    pub async fn download_model(
        &self,
        ctx: &OperationContext,
        model_id: &str,
    ) -> Result<ModelReader> {
        let span = tracing::debug_span!("download-model", model_id);
        self.handle.download(ctx, model_id).instrument(span).await
    }

    /// Download the model stored under `model_id` into memory.
    pub async fn download_model_bytes(
        &self,
        ctx: &OperationContext,
        model_id: &str,
    ) -> Result<Bytes> {
        let reader = self.download_model(ctx, model_id).await?;
        ctx.run(reader.collect())
            .await
            .map_err(|e| e.with_context("download", Some(model_id)))
    }

    /// Remove the model stored under `model_id`. Removing a missing model succeeds.
    pub async fn delete_model(&self, ctx: &OperationContext, model_id: &str) -> Result<()> {
        let span = tracing::debug_span!("delete-model", model_id);
        self.handle.delete(ctx, model_id).instrument(span).await
    }

    /// List the keys of every stored model.
    pub async fn list_models(&self, ctx: &OperationContext) -> Result<Vec<String>> {
        let span = tracing::debug_span!("list-models");
        self.handle.list(ctx).instrument(span).await
    }

    /// Check whether a model is stored under `model_id`.
    pub async fn model_exists(&self, ctx: &OperationContext, model_id: &str) -> Result<bool> {
        let span = tracing::debug_span!("model-exists", model_id);
        self.handle.exists(ctx, model_id).instrument(span).await
    }
}

impl<S> From<Arc<S>> for Client
where
    S: ModelStorage + 'static,
{
    fn from(storage: Arc<S>) -> Self {
        Client { handle: storage }
    }
}
