//! Oxide API client facade
//!
//! Typed operations on the Oxide control-plane API, shared by every
//! resource engine in the provider.
//!
//! # Features
//!
//! - [`OxideApi`]: one async method per remote operation
//! - [`HttpClient`]: reqwest implementation with Bearer token authentication
//! - [`is_not_found`]: the predicate Read and Delete use to stay idempotent
//! - `fake`: an in-memory [`FakeClient`] that records every call
//!
//! # Example
//!
//! ```ignore
//! use oxide_api::{HttpClient, OxideApi, ProjectCreate};
//!
//! let client = HttpClient::new("https://oxide.sys.example.com", token)?;
//! let project = client
//!     .project_create(&ProjectCreate {
//!         name: "myproject".to_string(),
//!         description: "a test project".to_string(),
//!     })
//!     .await?;
//! ```

pub mod client;
pub mod error;
#[cfg(feature = "fake")]
pub mod fake;
pub mod http;
pub mod types;

pub use client::OxideApi;
pub use error::{ApiError, ErrorBody, Result, is_not_found};
#[cfg(feature = "fake")]
pub use fake::FakeClient;
pub use http::HttpClient;
pub use types::*;
