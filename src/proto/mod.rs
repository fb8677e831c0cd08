//! Protocol bindings for the upstream stats query service.
//!
//! Generated by tonic-build from `proto/stats.proto`. The generated code is
//! committed under `generated/` and regenerated out-of-band when the proto
//! changes; there is no build-time protoc dependency.

/// Upstream stats query protocol (`stats.v1`).
pub mod stats {
    #![allow(clippy::all)]
    #![allow(warnings)]
    include!("generated/stats.v1.rs");
}
