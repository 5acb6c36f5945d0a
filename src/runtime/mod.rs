//! Native Cluster Runtime Boundary
//!
//! Defines the narrow call interface between the client handle and the
//! underlying storage-cluster runtime. The handle drives the runtime through
//! these traits only; the wire protocol, authentication, and object I/O live
//! entirely on the other side of this boundary.
//!
//! Status convention: every context entry point returns a raw `i32` where
//! `0` or positive means success and a negative value means failure. The
//! magnitude is defined by the runtime and is opaque here beyond its sign.

pub mod emulated;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};

// =============================================================================
// Status Codes
// =============================================================================

/// Errno-style status codes reported by the emulated runtime.
///
/// A real runtime may report any negative value; these constants exist so
/// tests assert on meaning instead of magic numbers.
pub mod status {
    /// No such file, option, or pool
    pub const ENOENT: i32 = -2;
    /// Pool already exists
    pub const EEXIST: i32 = -17;
    /// Malformed option name or configuration line
    pub const EINVAL: i32 = -22;
    /// Context is already connected
    pub const EISCONN: i32 = -106;
    /// Context is not connected
    pub const ENOTCONN: i32 = -107;
    /// No configured monitor is reachable
    pub const ECONNREFUSED: i32 = -111;

    /// Check whether a native status signals failure
    pub fn is_error(status: i32) -> bool {
        status < 0
    }
}

// =============================================================================
// Value Result Types
// =============================================================================

/// Client library version triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub extra: u32,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.extra)
    }
}

/// Point-in-time snapshot of cluster-wide usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStat {
    /// Total raw capacity in bytes
    pub capacity_bytes: u64,
    /// Bytes currently in use
    pub used_bytes: u64,
    /// Bytes still available
    pub available_bytes: u64,
    /// Number of stored objects
    pub object_count: u64,
}

// =============================================================================
// Boundary Traits
// =============================================================================

/// The opaque per-connection native resource.
///
/// One context backs exactly one [`Rados`](crate::Rados) handle; it is never
/// shared or aliased. String values are returned through caller-provided
/// buffers, written NUL-terminated and truncated to `buf.len() - 1` bytes
/// when longer.
pub trait ClusterContext: Send {
    /// Read a configuration file into the context's configuration state
    fn conf_read_file(&mut self, path: &str) -> i32;

    /// Set a single configuration option
    fn conf_set(&mut self, option: &str, value: &str) -> i32;

    /// Read a configuration option's value into `buf`
    fn conf_get(&mut self, option: &str, buf: &mut [u8]) -> i32;

    /// Establish the connection to the cluster; may block on network I/O
    fn connect(&mut self) -> i32;

    /// Read the cluster's fsid into `buf`
    fn cluster_fsid(&mut self, buf: &mut [u8]) -> i32;

    /// Fill `out` with cluster-wide usage statistics
    fn cluster_stat(&mut self, out: &mut ClusterStat) -> i32;

    /// Create a pool with default placement and ownership
    fn pool_create(&mut self, name: &str) -> i32;

    /// Create a pool owned by `auid`
    fn pool_create_with_auid(&mut self, name: &str, auid: u64) -> i32;

    /// Create a pool owned by `auid` under CRUSH rule `crush_rule`
    fn pool_create_with_all(&mut self, name: &str, auid: u64, crush_rule: u64) -> i32;

    /// Release the native resource. Called exactly once, after which the
    /// context is dropped and never used again.
    fn shutdown(&mut self);
}

/// Process-wide runtime entry points
pub trait ClusterRuntime: Send + Sync {
    /// Allocate a new connection context authenticating as `principal`
    /// (empty string for the runtime's default identity). A negative status
    /// means no context was allocated.
    fn create(&self, principal: &str) -> Result<Box<dyn ClusterContext>, i32>;

    /// Version of the client library behind this runtime
    fn version(&self) -> Version;
}

// =============================================================================
// Process-Global Runtime
// =============================================================================

static GLOBAL_RUNTIME: OnceLock<Arc<dyn ClusterRuntime>> = OnceLock::new();

/// Install the process-global cluster runtime.
///
/// The runtime is loaded at most once per process and is immutable
/// thereafter; returns `false` if a runtime was already installed.
pub fn install(runtime: Arc<dyn ClusterRuntime>) -> bool {
    GLOBAL_RUNTIME.set(runtime).is_ok()
}

/// The installed process-global runtime, if any
pub fn global() -> Option<Arc<dyn ClusterRuntime>> {
    GLOBAL_RUNTIME.get().cloned()
}
