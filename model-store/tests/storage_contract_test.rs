/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

//! Behaviour every storage backend has to share, run against each local backend.

use std::sync::Arc;
use std::time::Duration;

use model_store::error::ErrorKind;
use model_store::io::InputStream;
use model_store::retry::RetryingStorage;
use model_store::storage::{InMemoryStorage, ModelStorage};
use model_store::OperationContext;
use test_common::{create_test_file, drain, filesystem_storage, rand_data};

async fn test_roundtrip<S: ModelStorage>(storage: &S) {
    let ctx = OperationContext::new();

    storage
        .upload(&ctx, "text", InputStream::from("test model data"), 15)
        .await
        .unwrap();
    let body = storage.download(&ctx, "text").await.unwrap();
    assert_eq!(&drain(body).await.unwrap()[..], b"test model data");

    let data = rand_data(1024 * 1024 + 7);
    storage
        .upload(&ctx, "random", data.clone().into(), data.len() as u64)
        .await
        .unwrap();
    let body = storage.download(&ctx, "random").await.unwrap();
    assert_eq!(drain(body).await.unwrap(), data);
}

async fn test_zero_length_roundtrip<S: ModelStorage>(storage: &S) {
    let ctx = OperationContext::new();

    storage
        .upload(&ctx, "empty", InputStream::default(), 0)
        .await
        .unwrap();
    assert!(storage.exists(&ctx, "empty").await.unwrap());
    let body = storage.download(&ctx, "empty").await.unwrap();
    assert!(drain(body).await.unwrap().is_empty());
}

async fn test_upload_from_path<S: ModelStorage>(storage: &S) {
    let ctx = OperationContext::new();
    let data = rand_data(4096);
    let file = create_test_file(&data);

    storage
        .upload(&ctx, "from-file", InputStream::from_path(file.path()), 4096)
        .await
        .unwrap();
    let body = storage.download(&ctx, "from-file").await.unwrap();
    assert_eq!(drain(body).await.unwrap(), data);

    // the file is shorter than declared
    let err = storage
        .upload(&ctx, "short", InputStream::from_path(file.path()), 5000)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::InputInvalid);
    assert!(!storage.exists(&ctx, "short").await.unwrap());
}

async fn test_upload_from_reader<S: ModelStorage>(storage: &S) {
    let ctx = OperationContext::new();
    let data = rand_data(300 * 1024);

    let reader = std::io::Cursor::new(data.to_vec());
    storage
        .upload(
            &ctx,
            "from-reader",
            InputStream::from_reader(reader),
            data.len() as u64,
        )
        .await
        .unwrap();
    let body = storage.download(&ctx, "from-reader").await.unwrap();
    assert_eq!(drain(body).await.unwrap(), data);

    for (key, declared) in [("longer", 4), ("shorter", 64)] {
        let reader = std::io::Cursor::new(b"0123456789".to_vec());
        let err = storage
            .upload(&ctx, key, InputStream::from_reader(reader), declared)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InputInvalid, "{key}");
        assert!(!storage.exists(&ctx, key).await.unwrap());
    }
}

async fn test_idempotent_delete<S: ModelStorage>(storage: &S) {
    let ctx = OperationContext::new();
    storage
        .upload(&ctx, "doomed", InputStream::from("x"), 1)
        .await
        .unwrap();

    storage.delete(&ctx, "doomed").await.unwrap();
    storage.delete(&ctx, "doomed").await.unwrap();
    storage.delete(&ctx, "never-uploaded").await.unwrap();
}

async fn test_existence_consistency<S: ModelStorage>(storage: &S) {
    let ctx = OperationContext::new();

    assert!(!storage.exists(&ctx, "model").await.unwrap());
    storage
        .upload(&ctx, "model", InputStream::from("v1"), 2)
        .await
        .unwrap();
    assert!(storage.exists(&ctx, "model").await.unwrap());
    storage.delete(&ctx, "model").await.unwrap();
    assert!(!storage.exists(&ctx, "model").await.unwrap());

    let err = storage.download(&ctx, "model").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.operation(), Some("download"));
    assert_eq!(err.key(), Some("model"));
}

async fn test_list_completeness<S: ModelStorage>(storage: &S) {
    let ctx = OperationContext::new();
    assert!(storage.list(&ctx).await.unwrap().is_empty());

    for key in ["a", "b", "c"] {
        storage
            .upload(&ctx, key, InputStream::from("data"), 4)
            .await
            .unwrap();
    }
    storage.delete(&ctx, "b").await.unwrap();

    let mut keys = storage.list(&ctx).await.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["a", "c"]);
}

async fn test_empty_key_rejected<S: ModelStorage>(storage: &S) {
    let ctx = OperationContext::new();

    let err = storage
        .upload(&ctx, "", InputStream::from("x"), 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::InputInvalid);
    let err = storage.download(&ctx, "").await.unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::InputInvalid);
    let err = storage.exists(&ctx, "").await.unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::InputInvalid);
    let err = storage.delete(&ctx, "").await.unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::InputInvalid);
}

async fn test_cancelled_context_does_not_mutate<S: ModelStorage>(storage: &S) {
    let live = OperationContext::new();
    storage
        .upload(&live, "kept", InputStream::from("data"), 4)
        .await
        .unwrap();

    let cancelled = OperationContext::new();
    cancelled.cancel();
    let expired = OperationContext::new().with_timeout(Duration::ZERO);

    for ctx in [&cancelled, &expired] {
        let err = storage
            .upload(ctx, "new", InputStream::from("data"), 4)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        let err = storage.delete(ctx, "kept").await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(storage.list(ctx).await.unwrap_err().is_cancelled());
        assert!(storage.exists(ctx, "kept").await.unwrap_err().is_cancelled());
        assert!(storage.download(ctx, "kept").await.unwrap_err().is_cancelled());
    }

    assert!(!storage.exists(&live, "new").await.unwrap());
    assert!(storage.exists(&live, "kept").await.unwrap());
}

async fn test_download_follows_context<S: ModelStorage>(storage: &S) {
    let live = OperationContext::new();
    storage
        .upload(&live, "bound", InputStream::from("test model data"), 15)
        .await
        .unwrap();

    let ctx = live.child();
    let body = storage.download(&ctx, "bound").await.unwrap();
    ctx.cancel();
    assert!(drain(body).await.unwrap_err().is_cancelled());

    let body = storage.download(&live, "bound").await.unwrap();
    assert_eq!(&drain(body).await.unwrap()[..], b"test model data");
}

async fn test_scenario<S: ModelStorage>(storage: &S) {
    let ctx = OperationContext::new().with_timeout(Duration::from_secs(30));
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let key = format!("test-model-{ts}");

    storage
        .upload(&ctx, &key, InputStream::from("test model data"), 15)
        .await
        .unwrap();
    assert!(storage.exists(&ctx, &key).await.unwrap());
    let body = storage.download(&ctx, &key).await.unwrap();
    assert_eq!(&drain(body).await.unwrap()[..], b"test model data");
    assert!(storage.list(&ctx).await.unwrap().contains(&key));
    storage.delete(&ctx, &key).await.unwrap();
    assert!(!storage.exists(&ctx, &key).await.unwrap());
}

async fn test_shared_between_tasks<S: ModelStorage + 'static>(storage: Arc<S>) {
    let mut tasks = Vec::new();
    for i in 0..16 {
        let storage = storage.clone();
        tasks.push(tokio::spawn(async move {
            let ctx = OperationContext::new();
            let key = format!("model-{i:02}");
            let data = rand_data(128 + i);
            storage
                .upload(&ctx, &key, data.clone().into(), data.len() as u64)
                .await
                .unwrap();
            let body = storage.download(&ctx, &key).await.unwrap();
            assert_eq!(drain(body).await.unwrap(), data);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let keys = storage.list(&OperationContext::new()).await.unwrap();
    assert_eq!(keys.len(), 16);
}

macro_rules! contract_tests {
    ($name:ident, $storage:expr) => {
        mod $name {
            use super::*;

            #[tokio::test]
            async fn roundtrip() {
                let (_guard, storage) = $storage;
                test_roundtrip(&storage).await;
            }

            #[tokio::test]
            async fn zero_length_roundtrip() {
                let (_guard, storage) = $storage;
                test_zero_length_roundtrip(&storage).await;
            }

            #[tokio::test]
            async fn upload_from_path() {
                let (_guard, storage) = $storage;
                test_upload_from_path(&storage).await;
            }

            #[tokio::test]
            async fn upload_from_reader() {
                let (_guard, storage) = $storage;
                test_upload_from_reader(&storage).await;
            }

            #[tokio::test]
            async fn idempotent_delete() {
                let (_guard, storage) = $storage;
                test_idempotent_delete(&storage).await;
            }

            #[tokio::test]
            async fn existence_consistency() {
                let (_guard, storage) = $storage;
                test_existence_consistency(&storage).await;
            }

            #[tokio::test]
            async fn list_completeness() {
                let (_guard, storage) = $storage;
                test_list_completeness(&storage).await;
            }

            #[tokio::test]
            async fn empty_key_rejected() {
                let (_guard, storage) = $storage;
                test_empty_key_rejected(&storage).await;
            }

            #[tokio::test]
            async fn cancelled_context_does_not_mutate() {
                let (_guard, storage) = $storage;
                test_cancelled_context_does_not_mutate(&storage).await;
            }

            #[tokio::test]
            async fn download_follows_context() {
                let (_guard, storage) = $storage;
                test_download_follows_context(&storage).await;
            }

            #[tokio::test]
            async fn scenario() {
                let (_guard, storage) = $storage;
                test_scenario(&storage).await;
            }

            #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
            async fn shared_between_tasks() {
                let (_guard, storage) = $storage;
                test_shared_between_tasks(Arc::new(storage)).await;
            }
        }
    };
}

contract_tests!(in_memory, ((), InMemoryStorage::new()));
contract_tests!(filesystem, filesystem_storage().await);
contract_tests!(
    retrying_in_memory,
    ((), RetryingStorage::new(InMemoryStorage::new()))
);
contract_tests!(
    dyn_filesystem,
    {
        let (guard, storage) = filesystem_storage().await;
        let storage: Arc<dyn ModelStorage> = Arc::new(storage);
        (guard, storage)
    }
);
