//! Oxide provider
//!
//! Reconciliation engines for every managed Oxide entity, the provider
//! registry that binds them to a configured API client, and the stdio
//! protocol the host tool drives them through.
//!
//! # Resources
//!
//! - Projects, VPCs, subnets, routers, routes, internet gateways, firewall rules
//! - Instances, disks, images, snapshots, SSH keys, anti-affinity groups
//! - IP pools, subnet pools, floating IPs, external subnets and their silo links
//! - Silos, SAML identity providers, address lots, switch port settings
//!
//! # Data sources
//!
//! Read-only lookups of projects, silos, images, VPCs and their children,
//! disks, floating IPs, IP and subnet pools, plus listings of projects,
//! images, system IP pools and address lots.
//!
//! # Example
//!
//! ```ignore
//! use oxide_provider::OxideProvider;
//! use serde_json::json;
//!
//! let provider = OxideProvider::new()?;
//! let diags = provider
//!     .configure(&json!({"host": "https://oxide.sys.example.com", "token": token}))
//!     .await;
//! assert!(!diags.has_error());
//!
//! let project = provider.configured_driver("oxide_project", "create").await?;
//! let outcome = project
//!     .create(&json!({"name": "web", "description": "frontend"}))
//!     .await;
//! ```

pub mod data_sources;
pub mod error;
pub mod functions;
pub mod protocol;
pub mod provider;
pub mod resources;

pub use error::{ProviderError, Result};
pub use functions::FunctionDefinition;
pub use protocol::{Request, Response, serve};
pub use provider::{OxideProvider, TYPE_NAME};
