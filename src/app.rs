//! Application wiring: builds the blob store once at start-up and holds the
//! state every request handler shares.

use crate::compress::CompressionSettings;
use crate::config::{Config, StoreBackend};
use crate::store::{BlobStore, MemoryBlobStore, S3BlobStore};
use crate::{Error, Result};
use std::sync::Arc;
use tokio_retry::{strategy::FixedInterval, RetryIf};
use tracing::{info, warn};

const ENSURE_RETRY_INTERVAL_MS: u64 = 2000;
const ENSURE_RETRIES: usize = 3;

/// Request-independent state. Cloning is cheap; the store is shared.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BlobStore>,
    pub container: Arc<str>,
    pub compression: CompressionSettings,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Build state around an existing store.
    ///
    /// This is primarily useful for integration tests that inject
    /// [`MemoryBlobStore`].
    pub fn with_store(store: Arc<dyn BlobStore>, config: &Config) -> Self {
        Self {
            store,
            container: config.container.as_str().into(),
            compression: config.compression,
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    /// Construct the configured store and make sure the container exists.
    pub async fn new(config: &Config) -> Result<Self> {
        let store: Arc<dyn BlobStore> = match config.store_backend {
            StoreBackend::Memory => {
                info!("Using in-memory blob store; uploads are lost on restart");
                Arc::new(MemoryBlobStore::new())
            }
            StoreBackend::S3 => Arc::new(S3BlobStore::new(&config.s3).await),
        };

        let state = Self::with_store(store, config);
        state.ensure_container().await?;
        Ok(state)
    }

    /// Create the container if needed, retrying while the store is unreachable.
    pub async fn ensure_container(&self) -> Result<()> {
        let retry_strategy =
            FixedInterval::from_millis(ENSURE_RETRY_INTERVAL_MS).take(ENSURE_RETRIES);

        #[allow(deprecated)]
        let ensured = RetryIf::spawn(
            retry_strategy,
            move || async move {
                self.store
                    .ensure_container(&self.container)
                    .await
                    .inspect_err(|e| {
                        warn!("Could not ensure container '{}': {}", self.container, e);
                    })
            },
            |e: &Error| matches!(e, Error::StoreUnavailable(_)),
        )
        .await;
        ensured?;

        info!("Container '{}' is ready", self.container);
        Ok(())
    }
}
