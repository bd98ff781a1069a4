/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;
use std::future::Future;
use std::io::Cursor;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::error::{self, Error};
use crate::OperationContext;

type DoneFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Readable body of a downloaded model, positioned at offset 0.
///
/// `ModelReader` implements [`AsyncRead`] so it can be piped anywhere Tokio I/O is accepted.
/// Use [`collect`](ModelReader::collect) to buffer the whole model in memory.
///
/// Readers returned by a backend stay bound to the context of the download: once that context is
/// cancelled or past its deadline, reads fail with an I/O error wrapping an
/// [`ErrorKind::OperationCancelled`](crate::error::ErrorKind) error.
pub struct ModelReader {
    inner: Pin<Box<dyn AsyncRead + Send>>,
    ctx: Option<OperationContext>,
    done: Option<DoneFuture>,
}

impl ModelReader {
    /// Wrap any Tokio reader.
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            inner: Box::pin(reader),
            ctx: None,
            done: None,
        }
    }

    /// Fail reads once `ctx` is cancelled or past its deadline.
    pub fn with_context(mut self, ctx: &OperationContext) -> Self {
        let watched = ctx.clone();
        self.ctx = Some(ctx.clone());
        self.done = Some(Box::pin(async move { watched.done().await }));
        self
    }

    /// Read the remaining body into memory.
    pub async fn collect(mut self) -> Result<Bytes, Error> {
        let mut buf = Vec::new();
        self.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

impl AsyncRead for ModelReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if let Some(ctx) = &this.ctx {
            if let Err(err) = ctx.check() {
                return Poll::Ready(Err(std::io::Error::other(err)));
            }
        }
        if let Some(done) = this.done.as_mut() {
            if done.as_mut().poll(cx).is_ready() {
                this.done = None;
                let err = this
                    .ctx
                    .as_ref()
                    .and_then(|ctx| ctx.check().err())
                    .unwrap_or_else(error::operation_cancelled);
                return Poll::Ready(Err(std::io::Error::other(err)));
            }
        }
        this.inner.as_mut().poll_read(cx, buf)
    }
}

impl From<Bytes> for ModelReader {
    fn from(value: Bytes) -> Self {
        Self::new(Cursor::new(value))
    }
}

impl fmt::Debug for ModelReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelReader(dyn AsyncRead)")
            .field("ctx", &self.ctx)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_collect_from_bytes() {
        let reader = ModelReader::from(Bytes::from_static(b"test model data"));
        let data = reader.collect().await.unwrap();
        assert_eq!(&data[..], b"test model data");
    }

    #[tokio::test]
    async fn test_partial_reads() {
        let mut reader = ModelReader::from(Bytes::from_static(b"abcdef"));
        let mut head = [0u8; 2];
        reader.read_exact(&mut head).await.unwrap();
        assert_eq!(&head, b"ab");
        assert_eq!(&reader.collect().await.unwrap()[..], b"cdef");
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_reads() {
        let ctx = OperationContext::new();
        let mut reader = ModelReader::from(Bytes::from_static(b"abcdef")).with_context(&ctx);
        let mut head = [0u8; 2];
        reader.read_exact(&mut head).await.unwrap();

        ctx.cancel();
        let err = reader.collect().await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_pending_read() {
        let ctx = OperationContext::new().with_timeout(Duration::from_millis(50));
        // the writer half is never written to, so the read only ends through the deadline
        let (_writer, stalled) = tokio::io::duplex(64);
        let reader = ModelReader::new(stalled).with_context(&ctx);
        let err = reader.collect().await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
