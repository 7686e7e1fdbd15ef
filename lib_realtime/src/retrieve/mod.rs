//! # Data Retrieval Module
//!
//! Request/response access to the dashboard REST API. The realtime core never
//! uses this; it exists for the display layer's startup snapshot
//! (`/api/environment`, `/api/devices`, `/api/alarms`).
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: `ApiClient`, a `reqwest` client behind `reqwest-middleware`
//!   that retries transient failures with exponential backoff and decodes
//!   JSON bodies.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// HTTP API client with retry middleware.
pub mod ky_http;

pub use ky_http::{ApiClient, ApiResponse};
