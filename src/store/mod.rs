//! Blob storage for compressed images
//!
//! A flat, name-keyed container of image bytes. Writes overwrite (last
//! writer wins) and there is no delete. The S3 client backs production; the
//! in-memory store is a drop-in substitute for tests and local runs.

pub mod memory;
pub mod s3;

pub use memory::MemoryBlobStore;
pub use s3::{S3BlobStore, S3Settings};

use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `name`, replacing any previous object.
    async fn put(&self, container: &str, name: &str, data: &[u8], content_type: &str)
        -> Result<()>;

    /// Fetch the bytes stored under `name`, or `Error::NotFound`.
    async fn get(&self, container: &str, name: &str) -> Result<Vec<u8>>;

    async fn container_exists(&self, container: &str) -> Result<bool>;

    /// Create the container unless it already exists.
    async fn ensure_container(&self, container: &str) -> Result<()>;

    /// Names of every object in the container, in the order the backend reports them.
    async fn list(&self, container: &str) -> Result<Vec<String>>;
}
