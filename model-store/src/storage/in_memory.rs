/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! In-memory implementation of the ModelStorage trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use super::{validate_key, ModelStorage};
use crate::context::OperationContext;
use crate::error::{self, Result};
use crate::io::{InputStream, ModelReader};

/// An in-memory implementation of the ModelStorage trait.
///
/// This implementation stores all models in memory, making it suitable for testing code that
/// depends on [`ModelStorage`] without a running object store. Keys are listed in
/// lexicographic order, like S3 does.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    // key -> content
    objects: RwLock<BTreeMap<String, Bytes>>,
}

impl InMemoryStorage {
    /// Create a new, empty in-memory storage backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored models.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Returns true if no models are stored.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ModelStorage for InMemoryStorage {
    async fn upload(
        &self,
        ctx: &OperationContext,
        model_id: &str,
        data: InputStream,
        size: u64,
    ) -> Result<()> {
        let upload = async {
            validate_key(model_id)?;
            let content = data.collect(size).await?;
            // last check before the write becomes visible
            ctx.check()?;
            let mut objects = self.objects.write().await;
            objects.insert(model_id.to_owned(), content);
            Ok(())
        };
        ctx.run(upload)
            .await
            .map_err(|e| e.with_context("upload", Some(model_id)))
    }

    async fn download(&self, ctx: &OperationContext, model_id: &str) -> Result<ModelReader> {
        let download = async {
            validate_key(model_id)?;
            let objects = self.objects.read().await;
            let content = objects
                .get(model_id)
                .cloned()
                .ok_or_else(|| error::not_found(model_id))?;
            Ok(ModelReader::from(content))
        };
        ctx.run(download)
            .await
            .map(|reader| reader.with_context(ctx))
            .map_err(|e| e.with_context("download", Some(model_id)))
    }

    async fn delete(&self, ctx: &OperationContext, model_id: &str) -> Result<()> {
        let delete = async {
            validate_key(model_id)?;
            let mut objects = self.objects.write().await;
            objects.remove(model_id);
            Ok(())
        };
        ctx.run(delete)
            .await
            .map_err(|e| e.with_context("delete", Some(model_id)))
    }

    async fn list(&self, ctx: &OperationContext) -> Result<Vec<String>> {
        let list = async {
            let objects = self.objects.read().await;
            Ok(objects.keys().cloned().collect())
        };
        ctx.run(list).await.map_err(|e| e.with_context("list", None))
    }

    async fn exists(&self, ctx: &OperationContext, model_id: &str) -> Result<bool> {
        let exists = async {
            validate_key(model_id)?;
            let objects = self.objects.read().await;
            Ok(objects.contains_key(model_id))
        };
        ctx.run(exists)
            .await
            .map_err(|e| e.with_context("exists", Some(model_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_put_and_get_object() {
        let storage = InMemoryStorage::new();
        let ctx = OperationContext::new();
        let content = Bytes::from("test content");

        storage
            .upload(&ctx, "test-key", content.clone().into(), 12)
            .await
            .unwrap();

        let retrieved = storage
            .download(&ctx, "test-key")
            .await
            .unwrap()
            .collect()
            .await
            .unwrap();
        assert_eq!(retrieved, content);
    }

    #[tokio::test]
    async fn test_upload_replaces() {
        let storage = InMemoryStorage::new();
        let ctx = OperationContext::new();
        storage
            .upload(&ctx, "k", InputStream::from("one"), 3)
            .await
            .unwrap();
        storage
            .upload(&ctx, "k", InputStream::from("three"), 5)
            .await
            .unwrap();

        assert_eq!(storage.len().await, 1);
        let body = storage.download(&ctx, "k").await.unwrap();
        assert_eq!(&body.collect().await.unwrap()[..], b"three");
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let storage = InMemoryStorage::new();
        let ctx = OperationContext::new();
        for key in ["c", "a", "b"] {
            storage
                .upload(&ctx, key, InputStream::from("x"), 1)
                .await
                .unwrap();
        }
        assert_eq!(storage.list(&ctx).await.unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_nothing() {
        let storage = InMemoryStorage::new();
        let ctx = OperationContext::new();
        let err = storage
            .upload(&ctx, "k", InputStream::from("abc"), 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InputInvalid);
        assert!(storage.is_empty().await);
    }
}
