/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use aws_sdk_s3::primitives::ByteStream;
use aws_smithy_types::body::SdkBody;
use aws_smithy_types::byte_stream::Length;
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::error::{self, Error};

/// Bytes requested from a reader per body frame.
const CHUNK_SIZE: usize = 64 * 1024;

/// Source of binary data for an upload.
///
/// `InputStream` wraps a stream of data for ease of use. Uploads always carry a declared size;
/// a source that produces a different number of bytes fails the upload with
/// [`ErrorKind::InputInvalid`](crate::error::ErrorKind::InputInvalid) before anything is written.
#[derive(Debug)]
pub struct InputStream {
    pub(super) inner: RawInputStream,
}

impl InputStream {
    /// Create a new `InputStream` from a static byte slice
    pub fn from_static(bytes: &'static [u8]) -> Self {
        Self::from(Bytes::from_static(bytes))
    }

    /// Create a new `InputStream` that reads data from a given `path`.
    ///
    /// The file is not opened until the upload runs.
    ///
    /// ## Warning
    /// The contents of the file MUST not change while the upload is in progress.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let inner = RawInputStream::Fs(path.as_ref().to_path_buf());
        Self { inner }
    }

    /// Create a new `InputStream` from any Tokio reader.
    ///
    /// The reader is streamed to the backend as it is read, so it is never held in memory as a
    /// whole. Reader backed streams can only be consumed once, so they are never retried.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
    {
        let inner = RawInputStream::Dyn(Box::new(reader));
        Self { inner }
    }

    /// Exact length of the data when it is known without I/O.
    pub fn known_len(&self) -> Option<u64> {
        match &self.inner {
            RawInputStream::Buf(bytes) => Some(bytes.remaining() as u64),
            _ => None,
        }
    }

    /// Returns true if the stream can be read again from the start.
    pub fn is_replayable(&self) -> bool {
        !matches!(self.inner, RawInputStream::Dyn(_))
    }

    /// Clone the stream if it is replayable.
    pub fn try_clone(&self) -> Option<InputStream> {
        let inner = match &self.inner {
            RawInputStream::Buf(bytes) => RawInputStream::Buf(bytes.clone()),
            RawInputStream::Fs(path) => RawInputStream::Fs(path.clone()),
            RawInputStream::Dyn(_) => return None,
        };
        Some(Self { inner })
    }

    /// Read the whole stream into memory, checking it holds exactly `size` bytes.
    pub(crate) async fn collect(self, size: u64) -> Result<Bytes, Error> {
        match self.inner {
            RawInputStream::Buf(bytes) => {
                check_size(size, bytes.len() as u64)?;
                Ok(bytes)
            }
            inner => {
                let mut buf = Vec::new();
                let mut reader = Self { inner }.into_reader(size).await?;
                reader.read_to_end(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }

    /// Open the stream as a reader that fails unless it yields exactly `size` bytes.
    ///
    /// Sources whose length is known up front are checked before any byte is read.
    pub(crate) async fn into_reader(self, size: u64) -> Result<SizedReader, Error> {
        let inner: Box<dyn AsyncRead + Send + Sync + Unpin> = match self.inner {
            RawInputStream::Buf(bytes) => {
                check_size(size, bytes.len() as u64)?;
                Box::new(Cursor::new(bytes))
            }
            RawInputStream::Fs(path) => {
                let file = tokio::fs::File::open(&path).await?;
                check_size(size, file.metadata().await?.len())?;
                Box::new(file)
            }
            RawInputStream::Dyn(reader) => reader,
        };
        Ok(SizedReader {
            inner,
            declared: size,
            read: 0,
        })
    }

    /// Converts `InputStream` to a ByteStream that can be used in PutObject.
    ///
    /// Reader backed streams are sent as they are read. A length mismatch surfaces as an
    /// [`ErrorKind::InputInvalid`](crate::error::ErrorKind::InputInvalid) error from the body,
    /// which aborts the request before the extra bytes go out.
    pub(crate) async fn into_byte_stream(self, size: u64) -> Result<ByteStream, Error> {
        match self.inner {
            RawInputStream::Buf(bytes) => {
                check_size(size, bytes.len() as u64)?;
                Ok(ByteStream::from(bytes))
            }
            RawInputStream::Fs(path) => {
                let actual = tokio::fs::metadata(&path).await?.len();
                check_size(size, actual)?;
                let stream = ByteStream::read_from()
                    .path(path)
                    .length(Length::Exact(size))
                    .build()
                    .await?;
                Ok(stream)
            }
            inner @ RawInputStream::Dyn(_) => {
                let reader = Self { inner }.into_reader(size).await?;
                let body = SizedBody {
                    reader,
                    buf: BytesMut::new(),
                    done: false,
                };
                Ok(ByteStream::new(SdkBody::from_body_1_x(body)))
            }
        }
    }
}

/// Reader over an upload source that yields exactly its declared number of bytes.
///
/// Hitting end of input early, or reading past the declared size, fails the read with an
/// `InputInvalid` [`Error`] carried inside the `io::Error`.
pub(crate) struct SizedReader {
    inner: Box<dyn AsyncRead + Send + Sync + Unpin>,
    declared: u64,
    read: u64,
}

impl SizedReader {
    fn remaining(&self) -> u64 {
        self.declared.saturating_sub(self.read)
    }
}

impl AsyncRead for SizedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        let n = (buf.filled().len() - before) as u64;
        this.read += n;

        let eof = n == 0;
        if this.read > this.declared || (eof && this.read != this.declared) {
            let err = size_mismatch(this.declared, this.read);
            return Poll::Ready(Err(std::io::Error::other(err)));
        }
        Poll::Ready(Ok(()))
    }
}

impl fmt::Debug for SizedReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SizedReader")
            .field("declared", &self.declared)
            .field("read", &self.read)
            .finish_non_exhaustive()
    }
}

/// Request body streaming a [`SizedReader`] frame by frame.
struct SizedBody {
    reader: SizedReader,
    buf: BytesMut,
    done: bool,
}

impl http_body_1x::Body for SizedBody {
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body_1x::Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        this.buf.reserve(CHUNK_SIZE);
        let result = ready!(tokio_util::io::poll_read_buf(
            Pin::new(&mut this.reader),
            cx,
            &mut this.buf
        ));
        match result {
            Ok(0) => {
                this.done = true;
                Poll::Ready(None)
            }
            Ok(_) => {
                let data = this.buf.split().freeze();
                Poll::Ready(Some(Ok(http_body_1x::Frame::data(data))))
            }
            Err(err) => {
                this.done = true;
                Poll::Ready(Some(Err(err.into())))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.done
    }

    fn size_hint(&self) -> http_body_1x::SizeHint {
        http_body_1x::SizeHint::with_exact(self.reader.remaining())
    }
}

fn check_size(declared: u64, actual: u64) -> Result<(), Error> {
    if declared == actual {
        return Ok(());
    }
    Err(size_mismatch(declared, actual))
}

fn size_mismatch(declared: u64, actual: u64) -> Error {
    error::invalid_input(format!(
        "declared size of {declared} bytes does not match the {}{actual} bytes provided",
        if actual > declared { "at least " } else { "" }
    ))
}

pub(super) enum RawInputStream {
    /// In-memory buffer to read from
    Buf(Bytes),
    /// File based input
    Fs(PathBuf),
    /// User provided reader
    Dyn(Box<dyn AsyncRead + Send + Sync + Unpin>),
}

impl fmt::Debug for RawInputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawInputStream::Buf(bytes) => f.debug_tuple("Buf").field(&bytes.len()).finish(),
            RawInputStream::Fs(path) => f.debug_tuple("Fs").field(path).finish(),
            RawInputStream::Dyn(_) => f.write_str("Dyn(dyn AsyncRead)"),
        }
    }
}

impl Default for InputStream {
    fn default() -> Self {
        Self::from(Bytes::default())
    }
}

impl From<Bytes> for InputStream {
    fn from(value: Bytes) -> Self {
        Self {
            inner: RawInputStream::Buf(value),
        }
    }
}

impl From<Vec<u8>> for InputStream {
    fn from(value: Vec<u8>) -> Self {
        Self::from(Bytes::from(value))
    }
}

impl From<&'static [u8]> for InputStream {
    fn from(slice: &'static [u8]) -> InputStream {
        Self::from(Bytes::from_static(slice))
    }
}

impl From<&'static str> for InputStream {
    fn from(slice: &'static str) -> InputStream {
        Self::from(Bytes::from_static(slice.as_bytes()))
    }
}
