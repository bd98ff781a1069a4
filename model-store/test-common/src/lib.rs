/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use bytes::Bytes;
use model_store::error::Error;
use model_store::io::ModelReader;
use model_store::storage::FilesystemStorage;
use uuid::Uuid;

// Generate UUID for the process to be used in tests to avoid conflicts between concurrent tests runs.
pub fn global_uuid_str() -> &'static str {
    static UUID_STR: OnceLock<String> = OnceLock::new();
    UUID_STR.get_or_init(|| Uuid::new_v4().to_string())
}

/// A model key that is unique for this process and call, so tests sharing a bucket don't collide.
pub fn unique_key(prefix: &str) -> String {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{n}", global_uuid_str())
}

/// `size` bytes of random data
pub fn rand_data(size: usize) -> Bytes {
    let mut data = vec![0; size];
    fastrand::fill(&mut data);
    Bytes::from(data)
}

/// Write `data` to a new temporary file and return it.
pub fn create_test_file(data: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, data).unwrap();
    file
}

/// Create a filesystem backend rooted in a fresh temporary directory.
///
/// The directory is removed when the returned `TempDir` is dropped.
pub async fn filesystem_storage() -> (tempfile::TempDir, FilesystemStorage) {
    let temp_dir = tempfile::tempdir().unwrap();
    let storage = FilesystemStorage::new(temp_dir.path()).await.unwrap();
    (temp_dir, storage)
}

/// drain/consume the body
pub async fn drain(body: ModelReader) -> Result<Bytes, Error> {
    body.collect().await
}
