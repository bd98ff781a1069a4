/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Opt-in retries for storage operations.
//!
//! Backends never retry on their own; callers that want transient failures retried wrap a backend
//! in [`RetryingStorage`]. Only [`ErrorKind::Backend`] failures are retried. Missing models,
//! invalid input and cancellation are returned as-is.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tower::retry::budget::{Budget, TpsBudget};

use crate::context::OperationContext;
use crate::error::{self, ErrorKind, Result};
use crate::io::{InputStream, ModelReader};
use crate::storage::ModelStorage;

/// Default number of attempts per operation, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// Default pause between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Decides whether a failed attempt is retried.
///
/// Clones share the retry budget but count attempts separately, so a policy is cloned for
/// every operation.
#[derive(Debug, Clone)]
pub(crate) struct RetryPolicy {
    budget: Arc<TpsBudget>,
    remaining_attempts: usize,
}

impl RetryPolicy {
    fn new(max_attempts: usize) -> Self {
        Self {
            budget: Arc::new(TpsBudget::default()),
            remaining_attempts: max_attempts.saturating_sub(1),
        }
    }

    fn retry<T>(&mut self, result: &Result<T>) -> bool {
        match result {
            Ok(_) => {
                self.budget.deposit();
                false
            }
            Err(err) => {
                if err.kind() != &ErrorKind::Backend {
                    return false;
                }
                if self.remaining_attempts == 0 || !self.budget.withdraw() {
                    return false;
                }
                self.remaining_attempts -= 1;
                true
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

/// A [`ModelStorage`] that retries transient backend failures of the storage it wraps.
///
/// Uploads are only retried when the [`InputStream`] can be replayed (bytes or a file path).
/// Downloads retry opening the model; a failure while reading the returned
/// [`ModelReader`] is surfaced to the caller.
///
/// ```no_run
/// # async fn example() -> model_store::error::Result<()> {
/// use std::time::Duration;
/// use model_store::retry::RetryingStorage;
/// use model_store::storage::{InMemoryStorage, ModelStorage};
/// use model_store::OperationContext;
///
/// let storage = RetryingStorage::new(InMemoryStorage::new())
///     .with_max_attempts(5)
///     .with_delay(Duration::from_millis(250));
/// let ctx = OperationContext::new();
/// storage.upload(&ctx, "resnet-50", "weights".into(), 7).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RetryingStorage<S> {
    inner: S,
    policy: RetryPolicy,
    delay: Duration,
}

impl<S> RetryingStorage<S>
where
    S: ModelStorage,
{
    /// Wrap `inner` using the default attempt limit and delay.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            policy: RetryPolicy::default(),
            delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Maximum number of attempts per operation, including the first one.
    ///
    /// `0` and `1` both disable retries.
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.policy.remaining_attempts = max_attempts.saturating_sub(1);
        self
    }

    /// Pause between attempts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The wrapped storage.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn retry<T, F, Fut>(
        &self,
        ctx: &OperationContext,
        operation: &'static str,
        key: Option<&str>,
        mut attempt: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let mut policy = self.policy.clone();
        let mut attempt_number = 1;
        loop {
            let result = attempt().await;
            if !policy.retry(&result) {
                return result;
            }
            if let Err(err) = &result {
                tracing::warn!(
                    operation,
                    key,
                    attempt = attempt_number,
                    error = %err,
                    "retrying after backend error"
                );
            }
            let delay = self.delay;
            ctx.run(async move {
                tokio::time::sleep(delay).await;
                Ok(())
            })
            .await
            .map_err(|e| e.with_context(operation, key))?;
            attempt_number += 1;
        }
    }
}

#[async_trait]
impl<S> ModelStorage for RetryingStorage<S>
where
    S: ModelStorage,
{
    async fn upload(
        &self,
        ctx: &OperationContext,
        model_id: &str,
        data: InputStream,
        size: u64,
    ) -> Result<()> {
        let Some(template) = data.try_clone() else {
            tracing::debug!(model_id, "upload source can't be replayed, not retrying");
            return self.inner.upload(ctx, model_id, data, size).await;
        };

        let inner = &self.inner;
        let mut first = Some(data);
        self.retry(ctx, "upload", Some(model_id), move || {
            let data = first.take().or_else(|| template.try_clone());
            async move {
                let data = data
                    .ok_or_else(|| error::invalid_input("upload source can't be replayed"))?;
                inner.upload(ctx, model_id, data, size).await
            }
        })
        .await
    }

    async fn download(&self, ctx: &OperationContext, model_id: &str) -> Result<ModelReader> {
        self.retry(ctx, "download", Some(model_id), || {
            self.inner.download(ctx, model_id)
        })
        .await
    }

    async fn delete(&self, ctx: &OperationContext, model_id: &str) -> Result<()> {
        self.retry(ctx, "delete", Some(model_id), || {
            self.inner.delete(ctx, model_id)
        })
        .await
    }

    async fn list(&self, ctx: &OperationContext) -> Result<Vec<String>> {
        self.retry(ctx, "list", None, || self.inner.list(ctx)).await
    }

    async fn exists(&self, ctx: &OperationContext, model_id: &str) -> Result<bool> {
        self.retry(ctx, "exists", Some(model_id), || {
            self.inner.exists(ctx, model_id)
        })
        .await
    }
}
