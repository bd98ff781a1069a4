/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */
//! Storage backends for model artifacts.
//!
//! This module provides the [`ModelStorage`] trait, the only interface application code should
//! depend on, and its implementations:
//!
//! - [`S3Storage`]: any S3-compatible object store (AWS S3, MinIO, ...)
//! - [`InMemoryStorage`]: keeps everything in RAM, for tests
//! - [`FilesystemStorage`]: keeps models as files under a root directory, for tests and local use
//!
//! Every backend upholds the same contract, so they can be swapped behind an
//! `Arc<dyn ModelStorage>` without touching callers.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::OperationContext;
use crate::error::{self, Result};
use crate::io::{InputStream, ModelReader};

mod filesystem;
mod in_memory;
mod s3;

pub use filesystem::FilesystemStorage;
pub use in_memory::InMemoryStorage;
pub use s3::S3Storage;

/// Storage for named model artifacts.
///
/// # Contract
///
/// * Keys are non-empty strings; an empty key fails with
///   [`ErrorKind::InputInvalid`](crate::error::ErrorKind::InputInvalid).
/// * `upload` followed by `download` yields exactly the uploaded bytes, including for
///   zero-length models.
/// * `delete` succeeds whether or not the key exists.
/// * `exists` reports a missing key as `Ok(false)`; every other failure is an error.
/// * `list` returns every key or fails; it never returns a partial listing.
/// * An operation invoked with a context that is already done returns a cancellation error and
///   does not touch the backend.
///
/// Implementations hold no per-call mutable state and are safe to share between tasks.
/// Concurrent writes to the same key are resolved by the backend, not by this layer.
#[async_trait]
pub trait ModelStorage: Send + Sync + Debug {
    /// Store `data`, which must be exactly `size` bytes, under `model_id`.
    ///
    /// Returns once the backend has acknowledged the write. An existing model with the same key
    /// is replaced.
    async fn upload(
        &self,
        ctx: &OperationContext,
        model_id: &str,
        data: InputStream,
        size: u64,
    ) -> Result<()>;

    /// Open the model stored under `model_id`.
    ///
    /// Fails with [`ErrorKind::NotFound`](crate::error::ErrorKind::NotFound) if there is none.
    /// The returned reader stays bound to `ctx`: reads fail once it is cancelled or expired.
    async fn download(&self, ctx: &OperationContext, model_id: &str) -> Result<ModelReader>;

    /// Remove the model stored under `model_id`, if any.
    async fn delete(&self, ctx: &OperationContext, model_id: &str) -> Result<()>;

    /// List every key in the store, in backend order.
    async fn list(&self, ctx: &OperationContext) -> Result<Vec<String>>;

    /// Check whether a model is stored under `model_id`.
    async fn exists(&self, ctx: &OperationContext, model_id: &str) -> Result<bool>;
}

// Implement the trait for Arc<T> to allow for dynamic dispatch and cheap sharing
#[async_trait]
impl<T> ModelStorage for Arc<T>
where
    T: ModelStorage + ?Sized,
{
    async fn upload(
        &self,
        ctx: &OperationContext,
        model_id: &str,
        data: InputStream,
        size: u64,
    ) -> Result<()> {
        (**self).upload(ctx, model_id, data, size).await
    }

    async fn download(&self, ctx: &OperationContext, model_id: &str) -> Result<ModelReader> {
        (**self).download(ctx, model_id).await
    }

    async fn delete(&self, ctx: &OperationContext, model_id: &str) -> Result<()> {
        (**self).delete(ctx, model_id).await
    }

    async fn list(&self, ctx: &OperationContext) -> Result<Vec<String>> {
        (**self).list(ctx).await
    }

    async fn exists(&self, ctx: &OperationContext, model_id: &str) -> Result<bool> {
        (**self).exists(ctx, model_id).await
    }
}

pub(crate) fn validate_key(model_id: &str) -> Result<()> {
    if model_id.is_empty() {
        return Err(error::invalid_input("model id must not be empty"));
    }
    Ok(())
}
