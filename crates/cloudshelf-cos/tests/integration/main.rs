//! Integration tests for cloudshelf-cos
//!
//! Uses wiremock to simulate the COS XML API (path-style endpoint) and
//! verifies the adapter on its own and driven through a core `Bucket`.

mod common;

mod test_bucket;
mod test_listing;
mod test_objects;
