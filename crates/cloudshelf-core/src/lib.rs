//! CloudShelf Core - Provider-agnostic object storage
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Resource`, `ResourceTree`, `SyncPlan`, `BulkReport`, `SyncReport`
//! - **Bucket** - listing, selection, mutations, transfers and URL generation for one bucket
//! - **Port definitions** - Traits for adapters: `IProviderAdapter`, `IResourceIndex`
//! - **Memory adapter** - an in-process vendor used for dry runs and tests
//!
//! # Architecture
//!
//! The domain module contains pure data and invariants. Ports define the
//! trait interfaces that vendor and storage crates implement; the bucket
//! orchestrates vendor calls through those ports.

pub mod bucket;
pub mod config;
pub mod domain;
pub mod memory;
pub mod ports;
pub mod retry;
