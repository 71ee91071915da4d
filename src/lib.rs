//! Image upload service that shrinks images to a size budget
//!
//! Uploaded images are re-encoded at decreasing quality until they fit the
//! configured budget, stored in a flat blob container, and served back by
//! name.

pub mod app;
pub mod compress;
pub mod config;
pub mod error;
pub mod mime;
pub mod routes;
pub mod store;

pub use error::{Error, Result};
