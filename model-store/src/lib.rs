/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

/* Automatically managed default lints */
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
/* End of automatically managed default lints */
#![warn(
    missing_debug_implementations,
    missing_docs,
    rustdoc::missing_crate_level_docs,
    unreachable_pub,
    rust_2018_idioms
)]

//! Storage for machine learning model artifacts on S3-compatible object stores.
//!
//! Models are opaque binary blobs addressed by a string key and kept flat in a single bucket.
//! The crate offers five operations: upload, download, delete, list, and existence checks.
//! The bucket is provisioned when the backend is constructed.
//!
//! Application code depends on the [`ModelStorage`](crate::storage::ModelStorage) trait (or
//! the [`Client`] handle over it) so that the S3 backend can be swapped for the in-memory or
//! filesystem backends in tests.
//!
//! # Examples
//!
//! Load the configuration from the environment and connect:
//!
//! ```no_run
//! # async fn example() -> model_store::error::Result<()> {
//! use model_store::{Client, OperationContext};
//!
//! let config = model_store::from_env().load()?;
//! let ctx = OperationContext::new();
//! let client = Client::connect(&ctx, &config).await?;
//!
//! client.upload_model(&ctx, "test-model", "test model data", 15).await?;
//! let data = client.download_model_bytes(&ctx, "test-model").await?;
//! assert_eq!(&data[..], b"test model data");
//! # Ok(())
//! # }
//! ```
//!
//! Every operation takes an [`OperationContext`] which bounds it with a deadline and can be
//! cancelled from another task:
//!
//! ```no_run
//! # async fn example(client: model_store::Client) -> model_store::error::Result<()> {
//! use std::time::Duration;
//! use model_store::OperationContext;
//!
//! let ctx = OperationContext::new().with_timeout(Duration::from_secs(30));
//! let exists = client.model_exists(&ctx, "test-model").await?;
//! # Ok(())
//! # }
//! ```

/// Error types emitted by `model-store`
pub mod error;

/// Types and helpers for I/O
pub mod io;

/// Model store client
pub mod client;

/// Storage configuration
pub mod config;

pub mod storage;

pub mod retry;

mod context;

pub use self::client::Client;
pub use self::config::loader::{
    ConfigLoader, ENV_ACCESS_KEY_ID, ENV_BUCKET, ENV_ENDPOINT, ENV_REGION,
    ENV_SECRET_ACCESS_KEY, ENV_USE_SSL,
};
pub use self::config::StorageConfig;
pub use self::context::OperationContext;
pub use self::error::Error;

/// Create a config loader
pub fn from_env() -> ConfigLoader {
    ConfigLoader::default()
}
