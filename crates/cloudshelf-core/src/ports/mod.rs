//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are interfaces that the domain core depends on, but whose
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IProviderAdapter`] - Vendor object-storage operations (Tencent COS, in-memory)
//! - [`IResourceIndex`] - Optional persisted index of remote listings

pub mod provider_adapter;
pub mod resource_index;

pub use provider_adapter::{
    BucketContext, IProviderAdapter, ListPage, ListRequest, ObjectBody, ProgressSink,
};
pub use resource_index::IResourceIndex;
