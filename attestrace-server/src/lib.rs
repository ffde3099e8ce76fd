//! Attestrace Server Library - HTTP surface for attested conversation traces
//!
//! This library exposes the server components for use in integration tests.
//! The main binary uses these same components.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod store;

pub use config::{Config, ConfigError, StoreBackend};
pub use dispatch::Route;
pub use error::{ApiError, FailureResponse};
pub use openapi::ApiDoc;
pub use routes::{create_router, create_router_with_config};
pub use state::AppState;
pub use store::{BlobStore, FsBlobStore, HttpBlobStore, MemoryBlobStore, StoreError};
