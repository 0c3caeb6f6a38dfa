//! ccalloc-client - the allocator's sole I/O seam with the external object store
//!
//! This crate provides:
//! - The [`ApiClient`] trait abstracting Node/ClusterCIDR reads, patches,
//!   finalizer mutation and best-effort event emission
//! - [`HttpApiClient`], a thin `reqwest`-based implementation
//! - [`MockApiClient`], an in-memory fixture for tests

pub mod api_client;
pub mod error;
pub mod mock;
pub mod traits;

pub use api_client::HttpApiClient;
pub use error::{ClientError, Result};
pub use mock::MockApiClient;
pub use traits::ApiClient;
