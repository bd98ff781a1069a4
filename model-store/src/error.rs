/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;

use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::create_bucket::CreateBucketError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_bucket::HeadBucketError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::operation::put_object::PutObjectError;

/// A boxed error that is `Send` and `Sync`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for model store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this library
///
/// NOTE: Use [`aws_smithy_types::error::display::DisplayErrorContext`] or similar to display
/// the entire error cause/source chain.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    operation: Option<&'static str>,
    key: Option<String>,
    source: BoxError,
}

/// General categories of storage errors.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The backend could not be reached or the bucket could not be provisioned while
    /// constructing a backend client.
    Initialization,

    /// The requested model does not exist.
    NotFound,

    /// Any other backend or network failure.
    Backend,

    /// The operation context was cancelled or its deadline passed.
    OperationCancelled,

    /// Operation input or configuration validation issues
    InputInvalid,

    /// Local I/O errors
    IOError,
}

impl Error {
    /// Creates a new [`Error`] from a known kind of error as well as an arbitrary error source.
    pub fn new<E>(kind: ErrorKind, err: E) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            kind,
            operation: None,
            key: None,
            source: err.into(),
        }
    }

    /// Returns the corresponding [`ErrorKind`] for this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// The storage operation that failed, if known.
    pub fn operation(&self) -> Option<&'static str> {
        self.operation
    }

    /// The model key the failed operation was working on, if any.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Returns true if this error reports a missing model.
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Returns true if this error was caused by cancellation or an expired deadline.
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::OperationCancelled
    }

    /// Attach the failing operation and key. Context already set is kept.
    pub(crate) fn with_context(mut self, operation: &'static str, key: Option<&str>) -> Self {
        self.operation.get_or_insert(operation);
        if self.key.is_none() {
            self.key = key.map(str::to_owned);
        }
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Initialization => write!(f, "failed to initialize storage backend")?,
            ErrorKind::NotFound => write!(f, "model not found")?,
            ErrorKind::Backend => write!(f, "storage backend error")?,
            ErrorKind::OperationCancelled => write!(f, "operation cancelled")?,
            ErrorKind::InputInvalid => write!(f, "invalid input")?,
            ErrorKind::IOError => write!(f, "I/O error")?,
        }
        match (self.operation, &self.key) {
            (Some(op), Some(key)) => write!(f, " ({op} `{key}`)"),
            (Some(op), None) => write!(f, " ({op})"),
            _ => Ok(()),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        // readers carry our own errors through `io::Error`
        match value.downcast::<Error>() {
            Ok(err) => err,
            Err(value) => Self::new(ErrorKind::IOError, value),
        }
    }
}

impl From<walkdir::Error> for Error {
    fn from(value: walkdir::Error) -> Self {
        Self::new(ErrorKind::IOError, value)
    }
}

impl From<aws_smithy_types::byte_stream::error::Error> for Error {
    fn from(value: aws_smithy_types::byte_stream::error::Error) -> Self {
        Self::new(ErrorKind::IOError, value)
    }
}

pub(crate) fn invalid_input<E>(err: E) -> Error
where
    E: Into<BoxError>,
{
    Error::new(ErrorKind::InputInvalid, err)
}

pub(crate) fn initialization_failed<E>(err: E) -> Error
where
    E: Into<BoxError>,
{
    Error::new(ErrorKind::Initialization, err)
}

pub(crate) fn not_found(key: &str) -> Error {
    Error::new(ErrorKind::NotFound, format!("no model stored under key `{key}`"))
}

pub(crate) fn from_kind<E>(kind: ErrorKind) -> impl FnOnce(E) -> Error
where
    E: Into<BoxError>,
{
    |err| Error::new(kind, err)
}

static CANCELLATION_ERROR: &str = "operation context was cancelled";
static DEADLINE_ERROR: &str = "operation context deadline exceeded";

pub(crate) fn operation_cancelled() -> Error {
    Error::new(ErrorKind::OperationCancelled, CANCELLATION_ERROR)
}

pub(crate) fn deadline_exceeded() -> Error {
    Error::new(ErrorKind::OperationCancelled, DEADLINE_ERROR)
}

/// S3 error codes that mean "no object under that key".
const NOT_FOUND_CODES: &[&str] = &["NotFound", "NoSuchKey"];

fn has_not_found_code<E: ProvideErrorMetadata>(err: &E) -> bool {
    err.code().is_some_and(|code| NOT_FOUND_CODES.contains(&code))
}

/// Maps SDK failures that have no modeled not-found variant.
impl<E, R> From<SdkError<E, R>> for Error
where
    E: std::error::Error + ProvideErrorMetadata + Send + Sync + 'static,
    R: Send + Sync + fmt::Debug + 'static,
{
    fn from(value: SdkError<E, R>) -> Self {
        let kind = if has_not_found_code(&value) {
            ErrorKind::NotFound
        } else {
            ErrorKind::Backend
        };
        Error::new(kind, value)
    }
}

pub(crate) fn find_source<'a, E: std::error::Error + 'static>(
    err: &'a (dyn std::error::Error + 'static),
) -> Option<&'a E> {
    let mut next = Some(err);
    while let Some(err) = next {
        if let Some(matching_err) = err.downcast_ref::<E>() {
            return Some(matching_err);
        }
        next = err.source();
    }
    None
}

/// A request body that failed its size check aborts the request; that is the caller's fault.
pub(crate) fn from_put_object<R>(err: SdkError<PutObjectError, R>) -> Error
where
    R: Send + Sync + fmt::Debug + 'static,
{
    let rejected_body = find_source::<Error>(&err)
        .is_some_and(|source| source.kind() == &ErrorKind::InputInvalid);
    if rejected_body {
        invalid_input(err)
    } else {
        err.into()
    }
}

// The modeled variants below are what the SDK produces for a 404. MinIO and other S3 lookalikes
// sometimes only send the error code, so both are checked.

pub(crate) fn from_get_object<R>(err: SdkError<GetObjectError, R>) -> Error
where
    R: Send + Sync + fmt::Debug + 'static,
{
    let missing = err
        .as_service_error()
        .is_some_and(GetObjectError::is_no_such_key);
    if missing {
        Error::new(ErrorKind::NotFound, err)
    } else {
        err.into()
    }
}

pub(crate) fn from_head_object<R>(err: SdkError<HeadObjectError, R>) -> Error
where
    R: Send + Sync + fmt::Debug + 'static,
{
    let missing = err
        .as_service_error()
        .is_some_and(HeadObjectError::is_not_found);
    if missing {
        Error::new(ErrorKind::NotFound, err)
    } else {
        err.into()
    }
}

/// Resolves a failed `HeadBucket` to "bucket absent" or an initialization error.
pub(crate) fn head_bucket_failed<R>(err: SdkError<HeadBucketError, R>) -> Result<bool>
where
    R: Send + Sync + fmt::Debug + 'static,
{
    let missing = err
        .as_service_error()
        .is_some_and(HeadBucketError::is_not_found)
        || matches!(err.code(), Some("NotFound" | "NoSuchBucket"));
    if missing {
        Ok(false)
    } else {
        Err(initialization_failed(err))
    }
}

/// Losing a creation race to ourselves is as good as winning it.
pub(crate) fn create_bucket_failed<R>(err: SdkError<CreateBucketError, R>) -> Result<()>
where
    R: Send + Sync + fmt::Debug + 'static,
{
    let ours = err
        .as_service_error()
        .is_some_and(CreateBucketError::is_bucket_already_owned_by_you);
    if ours {
        Ok(())
    } else {
        Err(initialization_failed(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = not_found("resnet").with_context("download", Some("resnet"));
        assert_eq!(err.to_string(), "model not found (download `resnet`)");
        assert!(err.is_not_found());

        let err = operation_cancelled().with_context("list", None);
        assert_eq!(err.to_string(), "operation cancelled (list)");
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_context_is_not_overwritten() {
        let err = deadline_exceeded()
            .with_context("upload", Some("a"))
            .with_context("retry", Some("b"));
        assert_eq!(err.operation(), Some("upload"));
        assert_eq!(err.key(), Some("a"));
    }

    #[test]
    fn test_io_errors_are_local() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), &ErrorKind::IOError);
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_wrapped_errors_keep_their_kind() {
        let wrapped = std::io::Error::other(deadline_exceeded());
        let err: Error = wrapped.into();
        assert!(err.is_cancelled());
    }
}
