//! Integration tests for artifact-cache

mod initialize_tests {
    use artifact_cache::store::BackendKind;
    use artifact_cache::{CacheError, Config, ErrorKind, RemoteArtifactCache};
    use tempfile::TempDir;

    fn local_config(root: &std::path::Path, bucket: &str) -> Config {
        let mut config = Config::default();
        config.cache.backend = BackendKind::Local;
        config.cache.bucket = bucket.to_string();
        config.local.root = root.to_path_buf();
        config
    }

    #[tokio::test]
    async fn valid_config_is_ready() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("builds")).unwrap();

        let cache = RemoteArtifactCache::initialize(&local_config(temp.path(), "builds"))
            .await
            .unwrap();
        assert_eq!(cache.bucket(), "builds");
        assert!(!cache.is_closed());
    }

    #[tokio::test]
    async fn missing_credential_file_fails() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("builds")).unwrap();

        let mut config = local_config(temp.path(), "builds");
        config.cache.credentials = temp.path().join("key.json").display().to_string();

        let err = RemoteArtifactCache::initialize(&config).await.err().unwrap();
        assert!(matches!(err, CacheError::CredentialLoad { .. }));
        assert_eq!(err.kind(), ErrorKind::Initialization);
    }

    #[tokio::test]
    async fn missing_bucket_fails() {
        let temp = TempDir::new().unwrap();

        let err = RemoteArtifactCache::initialize(&local_config(temp.path(), "builds"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CacheError::BucketUnavailable { ref bucket } if bucket == "builds"));
        assert!(err.hint().is_some());
    }

    #[tokio::test]
    async fn unreachable_root_fails() {
        let temp = TempDir::new().unwrap();
        let config = local_config(&temp.path().join("not-mounted"), "builds");

        let err = RemoteArtifactCache::initialize(&config).await.err().unwrap();
        assert!(matches!(err, CacheError::BucketUnreachable { .. }));
    }

    #[tokio::test]
    async fn memory_backend_initializes() {
        let mut config = Config::default();
        config.cache.backend = BackendKind::Memory;
        config.cache.bucket = "scratch".to_string();

        assert!(RemoteArtifactCache::initialize(&config).await.is_ok());
    }
}

mod protocol_tests {
    use artifact_cache::store::LocalBlobStore;
    use artifact_cache::{CacheKey, CacheService, RemoteArtifactCache, RetentionPolicy};
    use proptest::prelude::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn local_cache() -> (RemoteArtifactCache, TempDir) {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("builds")).unwrap();
        let store = Arc::new(LocalBlobStore::new(temp.path()));
        let cache = RemoteArtifactCache::connect(store, "builds", RetentionPolicy::Disabled)
            .await
            .unwrap();
        (cache, temp)
    }

    async fn load(cache: &dyn CacheService, key: &CacheKey) -> (bool, Vec<u8>) {
        let mut out = Vec::new();
        let found = cache.load(key, &mut out).await.unwrap();
        (found, out)
    }

    #[tokio::test]
    async fn roundtrip_preserves_bytes() {
        let (cache, _temp) = local_cache().await;
        let content: Vec<u8> = (0u8..=255).cycle().take(70_000).collect();
        let key = CacheKey::digest(&content);

        cache.store(&key, &mut content.as_slice()).await.unwrap();
        assert_eq!(load(&cache, &key).await, (true, content));
    }

    #[tokio::test]
    async fn roundtrip_empty_entry() {
        let (cache, _temp) = local_cache().await;
        let key = CacheKey::new("empty-output").unwrap();

        cache.store(&key, &mut &b""[..]).await.unwrap();
        assert_eq!(load(&cache, &key).await, (true, Vec::new()));
    }

    #[tokio::test]
    async fn miss_is_clean() {
        let (cache, _temp) = local_cache().await;
        let key = CacheKey::new("never-stored").unwrap();
        assert_eq!(load(&cache, &key).await, (false, Vec::new()));
    }

    #[tokio::test]
    async fn overwrite_last_write_wins() {
        let (cache, _temp) = local_cache().await;
        let key = CacheKey::new("same-key").unwrap();

        cache.store(&key, &mut &b"first build"[..]).await.unwrap();
        cache.store(&key, &mut &b"second build"[..]).await.unwrap();
        assert_eq!(load(&cache, &key).await, (true, b"second build".to_vec()));
    }

    #[tokio::test]
    async fn entry_collected_by_store_is_a_miss() {
        let (cache, temp) = local_cache().await;
        let key = CacheKey::new("collected").unwrap();

        cache.store(&key, &mut &b"x"[..]).await.unwrap();
        std::fs::remove_file(temp.path().join("builds").join("collected")).unwrap();

        assert_eq!(load(&cache, &key).await, (false, Vec::new()));
    }

    #[tokio::test]
    async fn corrupt_retention_marker_still_delivers() {
        let (cache, temp) = local_cache().await;
        let key = CacheKey::new("k1").unwrap();

        cache.store(&key, &mut &b"payload"[..]).await.unwrap();
        let meta_dir = temp.path().join("builds").join(".meta");
        std::fs::create_dir_all(&meta_dir).unwrap();
        std::fs::write(meta_dir.join("k1.json"), "{").unwrap();

        assert_eq!(load(&cache, &key).await, (true, b"payload".to_vec()));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn any_bytes_roundtrip(content in proptest::collection::vec(any::<u8>(), 0..16_384)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let key = CacheKey::digest(&content);

            let loaded = runtime.block_on(async {
                let (cache, _temp) = local_cache().await;
                cache.store(&key, &mut content.as_slice()).await.unwrap();
                load(&cache, &key).await
            });

            prop_assert_eq!(loaded, (true, content));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers() {
        let (cache, _temp) = local_cache().await;
        let cache = Arc::new(cache);

        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let key = CacheKey::new(format!("task-{}", i % 4)).unwrap();
                let body = format!("output of {}", i % 4);
                cache.store(&key, &mut body.as_bytes()).await.unwrap();
                let (found, content) = load(&*cache, &key).await;
                assert!(found);
                assert_eq!(content, body.as_bytes());
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }
}

mod retention_tests {
    use artifact_cache::store::memory::Fault;
    use artifact_cache::store::InMemoryBlobStore;
    use artifact_cache::{CacheKey, CacheService, FixedClock, RemoteArtifactCache, RetentionPolicy};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Arc;

    const BUCKET: &str = "builds";
    const REFRESH_AFTER: i64 = 7 * 24 * 3600;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 6, 0, 0).unwrap()
    }

    async fn cache_with(
        refresh_after: i64,
        last_refreshed: DateTime<Utc>,
    ) -> (RemoteArtifactCache, Arc<InMemoryBlobStore>, CacheKey) {
        let store = Arc::new(InMemoryBlobStore::with_bucket(BUCKET));
        let key = CacheKey::new("4b227777d4dd1fc61c6f884f48641d02").unwrap();
        store.insert_object(
            BUCKET,
            key.as_str(),
            b"artifact".to_vec(),
            last_refreshed - Duration::days(1),
            Some(last_refreshed),
        );

        let cache = RemoteArtifactCache::connect(
            store.clone(),
            BUCKET,
            RetentionPolicy::from_seconds(refresh_after),
        )
        .await
        .unwrap()
        .with_clock(Arc::new(FixedClock::new(t0())));
        (cache, store, key)
    }

    #[tokio::test]
    async fn stale_marker_triggers_update() {
        let last = t0() - Duration::seconds(REFRESH_AFTER + 1);
        let (cache, store, key) = cache_with(REFRESH_AFTER, last).await;

        let mut out = Vec::new();
        assert!(cache.load(&key, &mut out).await.unwrap());

        assert_eq!(store.custom_time_updates(), 1);
        let meta = store.metadata(BUCKET, key.as_str()).unwrap();
        assert_eq!(meta.custom_time, Some(t0()));
    }

    #[tokio::test]
    async fn recent_marker_is_untouched() {
        let last = t0() - Duration::seconds(REFRESH_AFTER - 1);
        let (cache, store, key) = cache_with(REFRESH_AFTER, last).await;

        let mut out = Vec::new();
        assert!(cache.load(&key, &mut out).await.unwrap());

        assert_eq!(store.custom_time_updates(), 0);
        let meta = store.metadata(BUCKET, key.as_str()).unwrap();
        assert_eq!(meta.custom_time, Some(last));
    }

    #[tokio::test]
    async fn zero_interval_never_updates() {
        let last = t0() - Duration::days(3650);
        let (cache, store, key) = cache_with(0, last).await;

        let mut out = Vec::new();
        assert!(cache.load(&key, &mut out).await.unwrap());
        assert_eq!(store.custom_time_updates(), 0);
    }

    #[tokio::test]
    async fn refresh_failure_still_delivers() {
        let last = t0() - Duration::days(30);
        let (cache, store, key) = cache_with(REFRESH_AFTER, last).await;
        store.fail_custom_time(Fault::transport("503 Service Unavailable"));

        let mut out = Vec::new();
        assert!(cache.load(&key, &mut out).await.unwrap());
        assert_eq!(out, b"artifact");
    }

    #[tokio::test]
    async fn not_found_in_error_message_is_a_miss() {
        let (cache, store, key) = cache_with(0, t0()).await;
        store.fail_gets(Fault::transport(
            "HTTP status client error (404 Not Found) for url (https://storage.googleapis.com/...)",
        ));

        let mut out = Vec::new();
        assert!(!cache.load(&key, &mut out).await.unwrap());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn other_error_in_message_is_a_load_error() {
        let (cache, store, key) = cache_with(0, t0()).await;
        store.fail_gets(Fault::transport("HTTP status server error (502 Bad Gateway)"));

        let mut out = Vec::new();
        let err = cache.load(&key, &mut out).await.unwrap_err();
        assert_eq!(err.kind(), artifact_cache::ErrorKind::Load);
    }
}
