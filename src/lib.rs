//! One-shot collector bridging per-user traffic counters to InfluxDB.
//!
//! Each invocation runs a single collection cycle: poll every configured
//! stats service over gRPC (resetting the counters it reads), decode the
//! hierarchical counter names, aggregate per server, and commit the result
//! as one InfluxDB batch write.

pub mod collect;
pub mod config;
pub mod proto;
pub mod sink;
pub mod source;
pub mod stat;
