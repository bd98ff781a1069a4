/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{self, Error};

/// Cancellation and deadline scope for a storage operation.
///
/// Every [`ModelStorage`](crate::storage::ModelStorage) operation takes a context. Cancelling the
/// context, or letting its deadline pass, aborts the in-flight backend call at its next await
/// point and the operation returns an [`ErrorKind::OperationCancelled`](crate::error::ErrorKind)
/// error. A context that is already done when an operation starts causes that operation to
/// return before it touches the backend.
///
/// Contexts are cheap to clone; clones share the same cancellation state.
///
/// ```no_run
/// use std::time::Duration;
/// use model_store::OperationContext;
///
/// let ctx = OperationContext::new().with_timeout(Duration::from_secs(30));
/// let per_request = ctx.child();
/// // cancelling the parent cancels `per_request` too
/// ctx.cancel();
/// assert!(per_request.is_done());
/// ```
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl OperationContext {
    /// Create a context with no deadline that is only done once cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that is cancelled whenever `token` is.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Set a deadline `timeout` from now. An earlier existing deadline wins.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Set an absolute deadline. An earlier existing deadline wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Derive a context that is cancelled along with this one but can also be cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel this context and all of its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The deadline, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true once the context is cancelled or past its deadline.
    pub fn is_done(&self) -> bool {
        self.check().is_err()
    }

    /// Fail fast with a cancellation error if the context is already done.
    pub fn check(&self) -> Result<(), Error> {
        if self.token.is_cancelled() {
            return Err(error::operation_cancelled());
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Err(error::deadline_exceeded()),
            _ => Ok(()),
        }
    }

    /// Resolve once the context is cancelled or its deadline passes.
    pub(crate) async fn done(&self) {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = deadline => {}
        }
    }

    /// Drive `fut` to completion unless the context finishes first.
    ///
    /// The future is not polled at all when the context is already done. When the context
    /// finishes mid-flight the future is dropped, which aborts any request it was sending.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        self.check()?;
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                tracing::debug!("context cancelled, abandoning in-flight request");
                Err(error::operation_cancelled())
            }
            _ = deadline => {
                tracing::debug!("context deadline exceeded, abandoning in-flight request");
                Err(error::deadline_exceeded())
            }
            res = fut => res,
        }
    }
}
