//! # HTTP Retrieval Utilities
//!
//! Shared asynchronous API client used by the source adapters and the
//! alert sink, built on `reqwest` with retry middleware.

pub mod api_client;

pub use api_client::{ApiClient, ApiResponse};
