//! Error handling and custom error types
//!
//! Provides unified error handling across the service using thiserror. The
//! compressor only ever produces `Decode`, `Encode` and `Validation`; the
//! store produces `NotFound` and `StoreUnavailable`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Cannot decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Cannot encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Image '{0}' not found")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Blob store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
