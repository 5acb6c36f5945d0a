//! RADOS Cluster Client Handle
//!
//! A client-side handle for connecting to and administering a distributed
//! object-storage (RADOS) cluster: build a connection, feed it configuration,
//! connect, query cluster identity and statistics, and create storage pools.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      Caller                              │
//! └───────────────────────┬──────────────────────────────────┘
//!                         │  create / conf_* / connect /
//!                         │  fsid / cluster_stat / pool_create*
//! ┌───────────────────────┴──────────────────────────────────┐
//! │          Rados handle (lifecycle state machine)          │
//! │   configuring ──connect──▶ connected ──close──▶ disposed │
//! └───────────────────────┬──────────────────────────────────┘
//!                         │  ClusterRuntime / ClusterContext
//! ┌───────────────────────┴──────────────────────────────────┐
//! │        Native cluster runtime (wire protocol, auth,      │
//! │        object I/O — outside this crate's scope)          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The handle owns its native connection context exclusively and releases it
//! exactly once, on [`Rados::close`] or on drop. Negative status codes from
//! the runtime are translated into the typed errors in [`error`].
//!
//! A single handle is not safe for concurrent use; use one handle per thread
//! or wrap the handle in a mutex.
//!
//! # Example
//!
//! ```
//! use rados_client::{EmulatedCluster, Rados};
//! use std::sync::Arc;
//!
//! # fn main() -> rados_client::Result<()> {
//! let runtime = Arc::new(EmulatedCluster::default());
//! let mut rados = Rados::create_with_runtime(runtime, Some("client.admin"))?;
//!
//! rados.conf_set("mon_host", "10.0.0.1")?;
//! rados.connect()?;
//!
//! rados.pool_create("rbd")?;
//! let stat = rados.cluster_stat()?;
//! assert!(stat.available_bytes <= stat.capacity_bytes);
//!
//! rados.close();
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`cluster`]: the [`Rados`] connection handle
//! - [`runtime`]: the native boundary traits and the emulated runtime
//! - [`error`]: error types and handling

pub mod cluster;
pub mod error;
pub mod runtime;

// Re-export commonly used types
pub use cluster::Rados;
pub use error::{Error, Result};
pub use runtime::{
    emulated::{EmulatedCluster, EmulatedClusterConfig, PoolRecord},
    ClusterContext, ClusterRuntime, ClusterStat, Version,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
