/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Filesystem implementation of the ModelStorage trait.

use std::io;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::fs;
use walkdir::WalkDir;

use super::{validate_key, ModelStorage};
use crate::context::OperationContext;
use crate::error::{self, ErrorKind, Result};
use crate::io::{InputStream, ModelReader};

const KEY_DELIMITER: char = '/';

/// A filesystem implementation of the ModelStorage trait.
///
/// Models are stored as regular files under `<root>/objects`, with `/` in a key mapping to a
/// directory separator. Uploads are written to `<root>/staging` first and renamed into place, so
/// a model is either fully visible or not visible at all.
///
/// Staged files left behind by a process that died mid-upload are removed when a backend is
/// created over the same root.
///
/// Keys that would escape the objects directory (`..` segments, absolute paths, empty segments)
/// are rejected with [`ErrorKind::InputInvalid`]. A key can't be both a model and a prefix of
/// another model's key, e.g. `a` and `a/b`.
#[derive(Debug)]
pub struct FilesystemStorage {
    root_dir: PathBuf,
    objects_dir: PathBuf,
    staging_dir: PathBuf,
}

impl FilesystemStorage {
    /// Create a new filesystem storage backend rooted at `root_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created
    pub async fn new(root_dir: impl AsRef<Path>) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        let objects_dir = root_dir.join("objects");
        let staging_dir = root_dir.join("staging");

        fs::create_dir_all(&objects_dir)
            .await
            .map_err(error::initialization_failed)?;
        fs::create_dir_all(&staging_dir)
            .await
            .map_err(error::initialization_failed)?;
        clear_staging_dir(&staging_dir)
            .await
            .map_err(error::initialization_failed)?;

        Ok(Self {
            root_dir,
            objects_dir,
            staging_dir,
        })
    }

    /// The directory this backend was created with.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        object_key_to_path(&self.objects_dir, key)
    }

    fn staging_path(&self) -> PathBuf {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        self.staging_dir
            .join(format!("{}-{n}.partial", std::process::id()))
    }

    async fn put_object(
        &self,
        ctx: &OperationContext,
        key: &str,
        data: InputStream,
        size: u64,
    ) -> Result<()> {
        let path = self.object_path(key)?;
        let mut reader = data.into_reader(size).await?;

        let staged = StagedFile::new(self.staging_path());
        let mut file = fs::File::create(staged.path()).await?;
        tokio::io::copy(&mut reader, &mut file).await?;
        file.sync_all().await?;
        drop(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // nothing may become visible once the context is done
        ctx.check()?;
        fs::rename(staged.path(), &path).await?;
        staged.persist();
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<ModelReader> {
        let path = self.object_path(key)?;
        match fs::File::open(&path).await {
            Ok(file) => {
                if file.metadata().await?.is_dir() {
                    return Err(error::not_found(key));
                }
                Ok(ModelReader::new(file))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(error::not_found(key)),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        }
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        }

        // prune now-empty prefix directories, stopping at the first one still in use
        let mut dir = path.parent();
        while let Some(parent) = dir {
            if parent == self.objects_dir || fs::remove_dir(parent).await.is_err() {
                break;
            }
            dir = parent.parent();
        }
        Ok(())
    }

    async fn head_object(&self, key: &str) -> Result<bool> {
        let path = self.object_path(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let objects_dir = self.objects_dir.clone();
        tokio::task::spawn_blocking(move || list_directory_contents(&objects_dir))
            .await
            .map_err(error::from_kind(ErrorKind::IOError))?
    }
}

fn list_directory_contents(objects_dir: &Path) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    for entry in WalkDir::new(objects_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(objects_dir)
            .map_err(error::from_kind(ErrorKind::IOError))?;
        let relative = relative.to_str().ok_or_else(|| {
            error::Error::new(
                ErrorKind::IOError,
                format!("{} is not valid utf-8", relative.display()),
            )
        })?;
        keys.push(path_to_object_key(relative));
    }
    // S3 lists in key order; walkdir orders per directory level
    keys.sort();
    Ok(keys)
}

#[async_trait]
impl ModelStorage for FilesystemStorage {
    async fn upload(
        &self,
        ctx: &OperationContext,
        model_id: &str,
        data: InputStream,
        size: u64,
    ) -> Result<()> {
        let upload = async {
            validate_key(model_id)?;
            self.put_object(ctx, model_id, data, size).await
        };
        ctx.run(upload)
            .await
            .map_err(|e| e.with_context("upload", Some(model_id)))
    }

    async fn download(&self, ctx: &OperationContext, model_id: &str) -> Result<ModelReader> {
        let download = async {
            validate_key(model_id)?;
            self.get_object(model_id).await
        };
        ctx.run(download)
            .await
            .map(|reader| reader.with_context(ctx))
            .map_err(|e| e.with_context("download", Some(model_id)))
    }

    async fn delete(&self, ctx: &OperationContext, model_id: &str) -> Result<()> {
        let delete = async {
            validate_key(model_id)?;
            self.delete_object(model_id).await
        };
        ctx.run(delete)
            .await
            .map_err(|e| e.with_context("delete", Some(model_id)))
    }

    async fn list(&self, ctx: &OperationContext) -> Result<Vec<String>> {
        ctx.run(self.list_keys())
            .await
            .map_err(|e| e.with_context("list", None))
    }

    async fn exists(&self, ctx: &OperationContext, model_id: &str) -> Result<bool> {
        let exists = async {
            validate_key(model_id)?;
            self.head_object(model_id).await
        };
        ctx.run(exists)
            .await
            .map_err(|e| e.with_context("exists", Some(model_id)))
    }
}

/// Map an object key onto a path under `base_dir`, rejecting keys that would leave it.
/// Removes its staged file on drop, unless the file was renamed into place.
///
/// Dropping covers both failed writes and writes abandoned when the context ends.
#[derive(Debug)]
struct StagedFile {
    path: PathBuf,
    persisted: bool,
}

impl StagedFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            persisted: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn persist(mut self) {
        self.persisted = true;
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.persisted {
            // the file may not have been created yet
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

async fn clear_staging_dir(staging_dir: &Path) -> io::Result<()> {
    let mut entries = fs::read_dir(staging_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "partial") {
            tracing::debug!(path = %path.display(), "removing leftover staged upload");
            fs::remove_file(&path).await?;
        }
    }
    Ok(())
}

fn object_key_to_path(base_dir: impl AsRef<Path>, key: &str) -> Result<PathBuf> {
    let mut path = base_dir.as_ref().to_path_buf();
    for segment in key.split(KEY_DELIMITER) {
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) if part == segment => path.push(part),
            _ => {
                return Err(error::invalid_input(format!(
                    "model id `{key}` can't be stored on a filesystem"
                )))
            }
        }
    }
    Ok(path)
}

fn path_to_object_key(relative: &str) -> String {
    if MAIN_SEPARATOR == KEY_DELIMITER {
        relative.to_owned()
    } else {
        relative.replace(MAIN_SEPARATOR, "/")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[test]
    fn test_object_path_formation() {
        let temp_dir = tempdir().unwrap();
        let base_dir = temp_dir.path().join("objects");

        let path = object_key_to_path(&base_dir, "simple-key").unwrap();
        assert_eq!(path, base_dir.join("simple-key"));

        let path = object_key_to_path(&base_dir, "llm/v2/weights.bin").unwrap();
        assert_eq!(path, base_dir.join("llm").join("v2").join("weights.bin"));
    }

    #[test]
    fn test_escaping_keys_rejected() {
        let base_dir = Path::new("/tmp/objects");
        for key in ["../etc/passwd", "/abs", "a//b", "a/./b", "trailing/", "."] {
            let err = object_key_to_path(base_dir, key).unwrap_err();
            assert_eq!(err.kind(), &ErrorKind::InputInvalid, "key {key:?}");
        }
    }

    #[tokio::test]
    async fn test_nested_keys_roundtrip_and_prune() {
        let temp_dir = tempdir().unwrap();
        let storage = FilesystemStorage::new(temp_dir.path()).await.unwrap();
        let ctx = OperationContext::new();

        storage
            .upload(&ctx, "llm/v2/weights.bin", InputStream::from("w"), 1)
            .await
            .unwrap();
        storage
            .upload(&ctx, "llm/v1", InputStream::from("old"), 3)
            .await
            .unwrap();
        assert_eq!(
            storage.list(&ctx).await.unwrap(),
            vec!["llm/v1", "llm/v2/weights.bin"]
        );

        storage.delete(&ctx, "llm/v2/weights.bin").await.unwrap();
        assert!(!temp_dir.path().join("objects/llm/v2").exists());
        assert!(temp_dir.path().join("objects/llm").exists());
        assert_eq!(storage.list(&ctx).await.unwrap(), vec!["llm/v1"]);
    }

    #[tokio::test]
    async fn test_prefix_is_not_a_model() {
        let temp_dir = tempdir().unwrap();
        let storage = FilesystemStorage::new(temp_dir.path()).await.unwrap();
        let ctx = OperationContext::new();
        storage
            .upload(&ctx, "dir/model", InputStream::from("x"), 1)
            .await
            .unwrap();

        assert!(!storage.exists(&ctx, "dir").await.unwrap());
        let err = storage.download(&ctx, "dir").await.unwrap_err();
        assert!(err.is_not_found());
        storage.delete(&ctx, "dir").await.unwrap();
        assert!(storage.exists(&ctx, "dir/model").await.unwrap());
    }

    #[tokio::test]
    async fn test_size_mismatch_leaves_no_trace() {
        let temp_dir = tempdir().unwrap();
        let storage = FilesystemStorage::new(temp_dir.path()).await.unwrap();
        let ctx = OperationContext::new();

        let err = storage
            .upload(&ctx, "m", Bytes::from_static(b"abc").into(), 2)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InputInvalid);
        assert!(storage.list(&ctx).await.unwrap().is_empty());
        let staged = std::fs::read_dir(temp_dir.path().join("staging")).unwrap();
        assert_eq!(staged.count(), 0);
    }

    fn staged_files(root: &Path) -> usize {
        std::fs::read_dir(root.join("staging")).unwrap().count()
    }

    #[tokio::test]
    async fn test_reader_size_mismatch_leaves_no_trace() {
        let temp_dir = tempdir().unwrap();
        let storage = FilesystemStorage::new(temp_dir.path()).await.unwrap();
        let ctx = OperationContext::new();

        let reader = std::io::Cursor::new(b"0123456789".to_vec());
        let err = storage
            .upload(&ctx, "m", InputStream::from_reader(reader), 4)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InputInvalid);
        assert!(!storage.exists(&ctx, "m").await.unwrap());
        assert_eq!(staged_files(temp_dir.path()), 0);
    }

    #[tokio::test]
    async fn test_abandoned_upload_removes_staged_file() {
        let temp_dir = tempdir().unwrap();
        let storage = FilesystemStorage::new(temp_dir.path()).await.unwrap();
        let ctx = OperationContext::new().with_timeout(Duration::from_millis(100));

        // a few bytes arrive, then the source stalls until the deadline ends the upload
        let (mut writer, stalled) = tokio::io::duplex(64);
        writer.write_all(b"abc").await.unwrap();
        let err = storage
            .upload(&ctx, "stalled", InputStream::from_reader(stalled), 10)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(staged_files(temp_dir.path()), 0);
        drop(writer);
    }

    #[tokio::test]
    async fn test_new_clears_leftover_staged_files() {
        let temp_dir = tempdir().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("staging")).unwrap();
        std::fs::write(temp_dir.path().join("staging/4242-0.partial"), b"half").unwrap();

        FilesystemStorage::new(temp_dir.path()).await.unwrap();
        assert_eq!(staged_files(temp_dir.path()), 0);
    }

    #[tokio::test]
    async fn test_reopen_sees_existing_models() {
        let temp_dir = tempdir().unwrap();
        let ctx = OperationContext::new();
        {
            let storage = FilesystemStorage::new(temp_dir.path()).await.unwrap();
            storage
                .upload(&ctx, "persisted", InputStream::from("data"), 4)
                .await
                .unwrap();
        }
        let storage = FilesystemStorage::new(temp_dir.path()).await.unwrap();
        assert_eq!(storage.root_dir(), temp_dir.path());
        let body = storage.download(&ctx, "persisted").await.unwrap();
        assert_eq!(&body.collect().await.unwrap()[..], b"data");
    }
}
