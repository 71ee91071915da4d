use super::BlobStore;
use crate::{Error, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::{config::Region, Client as S3Client};
use tracing::{debug, info};

/// Region in which buckets are created without a location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for an S3-compatible backend.
#[derive(Debug, Clone, PartialEq)]
pub struct S3Settings {
    /// Custom endpoint for MinIO, DigitalOcean Spaces, etc.
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub force_path_style: bool,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: DEFAULT_REGION.to_string(),
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
        }
    }
}

/// Blob store backed by an S3 bucket per container.
pub struct S3BlobStore {
    client: S3Client,
    region: String,
}

impl S3BlobStore {
    /// Build a client from `settings`. Without static credentials the default
    /// AWS provider chain (environment, profile, instance metadata) is used.
    pub async fn new(settings: &S3Settings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            let credentials = aws_sdk_s3::config::Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "image-shrinker-static",
            );
            loader = loader.credentials_provider(credentials);
        }
        if let Some(endpoint) = &settings.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let shared_config = loader.load().await;
        let config = aws_sdk_s3::config::Builder::from(&shared_config)
            .force_path_style(settings.force_path_style)
            .build();

        info!(
            region = %settings.region,
            endpoint = settings.endpoint.as_deref().unwrap_or("default"),
            "Configured S3 blob store"
        );

        Self::from_client(S3Client::from_conf(config), &settings.region)
    }

    pub fn from_client(client: S3Client, region: &str) -> Self {
        Self {
            client,
            region: region.to_string(),
        }
    }
}

fn unavailable<E>(action: &str, target: &str, err: SdkError<E>) -> Error
where
    E: std::error::Error + 'static,
{
    Error::StoreUnavailable(format!(
        "Failed to {} '{}': {}",
        action,
        target,
        DisplayErrorContext(err)
    ))
}

fn is_http_not_found<E>(err: &SdkError<E>) -> bool {
    err.raw_response()
        .is_some_and(|response| response.status().as_u16() == 404)
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        container: &str,
        name: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<()> {
        self.client
            .put_object()
            .bucket(container)
            .key(name)
            .body(ByteStream::from(data.to_vec()))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| unavailable("upload", name, e))?;

        debug!(container, name, bytes = data.len(), "Uploaded object");
        Ok(())
    }

    async fn get(&self, container: &str, name: &str) -> Result<Vec<u8>> {
        let response = match self
            .client
            .get_object()
            .bucket(container)
            .key(name)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                return Err(Error::NotFound(name.to_string()));
            }
            Err(err) => return Err(unavailable("download", name, err)),
        };

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| Error::StoreUnavailable(format!("Failed to read body: {}", e)))?;

        Ok(bytes.into_bytes().to_vec())
    }

    async fn container_exists(&self, container: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(container).send().await {
            Ok(_) => Ok(true),
            Err(err)
                if is_http_not_found(&err)
                    || err.as_service_error().is_some_and(|e| e.is_not_found()) =>
            {
                Ok(false)
            }
            Err(err) => Err(unavailable("inspect container", container, err)),
        }
    }

    async fn ensure_container(&self, container: &str) -> Result<()> {
        if self.container_exists(container).await? {
            debug!(container, "Container already exists");
            return Ok(());
        }

        let mut request = self.client.create_bucket().bucket(container);
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                info!(container, "Created container");
                Ok(())
            }
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_bucket_already_owned_by_you()) =>
            {
                Ok(())
            }
            Err(err) => Err(unavailable("create container", container, err)),
        }
    }

    async fn list(&self, container: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(container)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| unavailable("list container", container, e))?;
            names.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );
        }

        Ok(names)
    }
}
