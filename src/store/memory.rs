use super::BlobStore;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One object held by [`MemoryBlobStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub name: String,
    pub container: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

type Containers = HashMap<String, BTreeMap<String, StoredObject>>;

/// In-process blob store. Listing is in lexicographic name order, like S3.
#[derive(Clone)]
pub struct MemoryBlobStore {
    containers: Arc<Mutex<Containers>>,
    put_count: Arc<Mutex<usize>>,
    get_count: Arc<Mutex<usize>>,
    unavailable: Arc<Mutex<bool>>,
    transient_failures: Arc<Mutex<usize>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            containers: Arc::new(Mutex::new(HashMap::new())),
            put_count: Arc::new(Mutex::new(0)),
            get_count: Arc::new(Mutex::new(0)),
            unavailable: Arc::new(Mutex::new(false)),
            transient_failures: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_container(self, container: &str) -> Self {
        self.containers()
            .entry(container.to_string())
            .or_default();
        self
    }

    pub fn with_object(self, container: &str, name: &str, bytes: Vec<u8>) -> Self {
        let content_type = crate::mime::content_type_for_name(name).to_string();
        self.containers()
            .entry(container.to_string())
            .or_default()
            .insert(
                name.to_string(),
                StoredObject {
                    name: name.to_string(),
                    container: container.to_string(),
                    bytes,
                    content_type,
                },
            );
        self
    }

    /// Make every operation fail with `Error::StoreUnavailable`.
    pub fn with_unavailable(self, unavailable: bool) -> Self {
        *lock(&self.unavailable) = unavailable;
        self
    }

    /// Fail the next `count` operations with `Error::StoreUnavailable`.
    pub fn with_transient_failures(self, count: usize) -> Self {
        *lock(&self.transient_failures) = count;
        self
    }

    pub fn get_put_count(&self) -> usize {
        *lock(&self.put_count)
    }

    pub fn get_get_count(&self) -> usize {
        *lock(&self.get_count)
    }

    pub fn get_object(&self, container: &str, name: &str) -> Option<StoredObject> {
        self.containers()
            .get(container)
            .and_then(|objects| objects.get(name))
            .cloned()
    }

    fn containers(&self) -> MutexGuard<'_, Containers> {
        lock(&self.containers)
    }

    fn check_available(&self) -> Result<()> {
        if *lock(&self.unavailable) {
            return Err(Error::StoreUnavailable(
                "memory store marked unavailable".to_string(),
            ));
        }

        let mut remaining = lock(&self.transient_failures);
        if *remaining > 0 {
            *remaining -= 1;
            return Err(Error::StoreUnavailable(
                "memory store temporarily unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing_container(container: &str) -> Error {
    Error::StoreUnavailable(format!("container '{}' does not exist", container))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        container: &str,
        name: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<()> {
        self.check_available()?;
        *lock(&self.put_count) += 1;

        let mut containers = self.containers();
        let objects = containers
            .get_mut(container)
            .ok_or_else(|| missing_container(container))?;
        objects.insert(
            name.to_string(),
            StoredObject {
                name: name.to_string(),
                container: container.to_string(),
                bytes: data.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, container: &str, name: &str) -> Result<Vec<u8>> {
        self.check_available()?;
        *lock(&self.get_count) += 1;

        let containers = self.containers();
        let objects = containers.get(container).ok_or_else(|| missing_container(container))?;
        objects
            .get(name)
            .map(|object| object.bytes.clone())
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    async fn container_exists(&self, container: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.containers().contains_key(container))
    }

    async fn ensure_container(&self, container: &str) -> Result<()> {
        self.check_available()?;
        self.containers()
            .entry(container.to_string())
            .or_default();
        Ok(())
    }

    async fn list(&self, container: &str) -> Result<Vec<String>> {
        self.check_available()?;
        self.containers()
            .get(container)
            .map(|objects| objects.keys().cloned().collect())
            .ok_or_else(|| missing_container(container))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CONTAINER: &str = "image-files";

    #[tokio::test]
    async fn test_put_then_get_round_trips_bytes() {
        let store = MemoryBlobStore::new().with_container(CONTAINER);

        store
            .put(CONTAINER, "cat.jpg", b"\xFF\xD8\xFFjpeg", "image/jpeg")
            .await
            .unwrap();
        let bytes = store.get(CONTAINER, "cat.jpg").await.unwrap();

        assert_eq!(bytes, b"\xFF\xD8\xFFjpeg".to_vec());
        assert_eq!(store.get_put_count(), 1);
        assert_eq!(store.get_get_count(), 1);

        let object = store.get_object(CONTAINER, "cat.jpg").unwrap();
        assert_eq!(object.content_type, "image/jpeg");
        assert_eq!(object.container, CONTAINER);
    }

    #[tokio::test]
    async fn test_put_overwrites_existing_object() {
        let store = MemoryBlobStore::new().with_object(CONTAINER, "cat.jpg", b"old".to_vec());

        store
            .put(CONTAINER, "cat.jpg", b"new", "image/jpeg")
            .await
            .unwrap();

        assert_eq!(store.get(CONTAINER, "cat.jpg").await.unwrap(), b"new".to_vec());
        assert_eq!(store.list(CONTAINER).await.unwrap(), vec!["cat.jpg"]);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryBlobStore::new().with_container(CONTAINER);

        let err = store.get(CONTAINER, "missing.jpg").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(name) if name == "missing.jpg"));

    }

    #[tokio::test]
    async fn test_get_from_missing_container_is_unavailable() {
        let store = MemoryBlobStore::new().with_container(CONTAINER);

        let err = store.get("other", "cat.jpg").await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_put_into_missing_container_fails() {
        let store = MemoryBlobStore::new();

        let err = store
            .put(CONTAINER, "cat.jpg", b"data", "image/jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_ensure_container_is_idempotent() {
        let store = MemoryBlobStore::new();
        assert!(!store.container_exists(CONTAINER).await.unwrap());

        store.ensure_container(CONTAINER).await.unwrap();
        store
            .put(CONTAINER, "cat.jpg", b"data", "image/jpeg")
            .await
            .unwrap();
        store.ensure_container(CONTAINER).await.unwrap();

        assert!(store.container_exists(CONTAINER).await.unwrap());
        assert_eq!(store.list(CONTAINER).await.unwrap(), vec!["cat.jpg"]);
    }

    #[tokio::test]
    async fn test_list_is_sorted_by_name() {
        let store = MemoryBlobStore::new()
            .with_object(CONTAINER, "b.png", vec![1])
            .with_object(CONTAINER, "a.jpg", vec![2])
            .with_object(CONTAINER, "c.gif", vec![3]);

        assert_eq!(
            store.list(CONTAINER).await.unwrap(),
            vec!["a.jpg", "b.png", "c.gif"]
        );
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_operation() {
        let store = MemoryBlobStore::new()
            .with_container(CONTAINER)
            .with_unavailable(true);

        assert!(matches!(
            store.get(CONTAINER, "cat.jpg").await,
            Err(Error::StoreUnavailable(_))
        ));
        assert!(matches!(
            store.put(CONTAINER, "cat.jpg", b"x", "image/jpeg").await,
            Err(Error::StoreUnavailable(_))
        ));
        assert!(matches!(
            store.list(CONTAINER).await,
            Err(Error::StoreUnavailable(_))
        ));
        assert!(matches!(
            store.ensure_container(CONTAINER).await,
            Err(Error::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_transient_failures_clear_up() {
        let store = MemoryBlobStore::new()
            .with_container(CONTAINER)
            .with_transient_failures(2);

        assert!(matches!(
            store.list(CONTAINER).await,
            Err(Error::StoreUnavailable(_))
        ));
        assert!(matches!(
            store.container_exists(CONTAINER).await,
            Err(Error::StoreUnavailable(_))
        ));
        assert!(store.list(CONTAINER).await.unwrap().is_empty());
    }
}
