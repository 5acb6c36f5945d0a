//! Cluster Connection Handle
//!
//! The lifecycle state machine around one native connection context: which
//! operations are legal before vs. after `connect`, and the ownership
//! discipline that releases the context exactly once on every exit path.
//!
//! A handle moves through three phases:
//!
//! ```text
//! create ──▶ configuring ──connect()──▶ connected ──close()/drop──▶ disposed
//!                │                          │
//!                └── conf_read_file /       └── fsid / cluster_stat /
//!                    conf_set / conf_get        pool_create*
//! ```
//!
//! Configuration is only legal while unconnected; queries and pool
//! administration only while connected. Guard violations are rejected before
//! the native boundary is touched. A single handle must not be used from
//! multiple threads without external synchronization; every native-touching
//! operation takes `&mut self`, so shared use requires a mutex or one handle
//! per thread.

use crate::error::{Error, Result};
use crate::runtime::{self, status, ClusterContext, ClusterRuntime, ClusterStat, Version};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Buffer capacity for option values and the fsid; longer native values are
/// truncated to fit
const VALUE_BUF_LEN: usize = 256;

const MSG_DISPOSED: &str = "handle already disposed";
const MSG_CONFIGURE_WHILE_CONNECTED: &str = "cannot modify configuration while connected";
const MSG_QUERY_WHILE_UNCONNECTED: &str = "cannot query the cluster when not connected";
const MSG_POOL_WHILE_UNCONNECTED: &str = "cannot create a pool when not connected";

// =============================================================================
// Handle
// =============================================================================

/// A client handle onto one cluster connection.
///
/// Owns the native connection context exclusively for its entire life; the
/// context is released exactly once, either by [`close`](Rados::close) or on
/// drop.
pub struct Rados {
    runtime: Arc<dyn ClusterRuntime>,
    ctx: Option<Box<dyn ClusterContext>>,
    connected: bool,
}

impl Rados {
    /// Create a handle through the process-global runtime, authenticating as
    /// `principal` (the runtime's default identity when `None`).
    ///
    /// Fails with [`Error::Initialization`] when no runtime is installed or
    /// the native create reports failure.
    pub fn create(principal: Option<&str>) -> Result<Self> {
        let runtime = runtime::global().ok_or_else(|| {
            Error::Initialization("no cluster runtime installed for this process".to_string())
        })?;
        Self::create_with_runtime(runtime, principal)
    }

    /// Create a handle through an explicit runtime
    pub fn create_with_runtime(
        runtime: Arc<dyn ClusterRuntime>,
        principal: Option<&str>,
    ) -> Result<Self> {
        let principal = principal.unwrap_or("");
        let ctx = runtime.create(principal).map_err(|code| {
            Error::Initialization(format!(
                "native create failed for principal {principal:?}: status {code}"
            ))
        })?;
        debug!(principal, "created cluster handle");
        Ok(Self {
            runtime,
            ctx: Some(ctx),
            connected: false,
        })
    }

    /// Whether a `connect` call has succeeded on this handle
    pub fn connected(&self) -> bool {
        self.connected
    }

    // -------------------------------------------------------------------------
    // State guards
    // -------------------------------------------------------------------------

    fn ctx_mut(&mut self) -> Result<&mut Box<dyn ClusterContext>> {
        self.ctx
            .as_mut()
            .ok_or(Error::InvalidState(MSG_DISPOSED))
    }

    fn configuring_ctx(&mut self) -> Result<&mut Box<dyn ClusterContext>> {
        if self.ctx.is_none() {
            return Err(Error::InvalidState(MSG_DISPOSED));
        }
        if self.connected {
            return Err(Error::InvalidState(MSG_CONFIGURE_WHILE_CONNECTED));
        }
        self.ctx_mut()
    }

    fn connected_ctx(&mut self, msg: &'static str) -> Result<&mut Box<dyn ClusterContext>> {
        if self.ctx.is_none() {
            return Err(Error::InvalidState(MSG_DISPOSED));
        }
        if !self.connected {
            return Err(Error::InvalidState(msg));
        }
        self.ctx_mut()
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    /// Load cluster configuration from a file.
    ///
    /// Only legal before `connect`.
    pub fn conf_read_file(&mut self, path: &Path) -> Result<()> {
        let ctx = self.configuring_ctx()?;
        let path = path.display().to_string();
        let r = ctx.conf_read_file(&path);
        if status::is_error(r) {
            return Err(Error::Configuration {
                subject: path,
                code: r,
            });
        }
        debug!(path = %path, "loaded configuration file");
        Ok(())
    }

    /// Set a single configuration option.
    ///
    /// Only legal before `connect`. Option names and values are forwarded
    /// unvalidated; the native layer decides what is acceptable.
    pub fn conf_set(&mut self, option: &str, value: &str) -> Result<()> {
        let ctx = self.configuring_ctx()?;
        let r = ctx.conf_set(option, value);
        if status::is_error(r) {
            return Err(Error::Configuration {
                subject: option.to_string(),
                code: r,
            });
        }
        debug!(option, value, "set configuration option");
        Ok(())
    }

    /// Read back a configuration option's value.
    ///
    /// Gated on the unconnected state like the mutating calls, a deliberate
    /// conservative restriction rather than a technical necessity. Values
    /// longer than 255 bytes are truncated.
    pub fn conf_get(&mut self, option: &str) -> Result<String> {
        let ctx = self.configuring_ctx()?;
        let mut buf = [0u8; VALUE_BUF_LEN];
        let r = ctx.conf_get(option, &mut buf);
        if status::is_error(r) {
            return Err(Error::Configuration {
                subject: option.to_string(),
                code: r,
            });
        }
        Ok(cstr_to_string(&buf))
    }

    // -------------------------------------------------------------------------
    // Connection
    // -------------------------------------------------------------------------

    /// Establish the connection to the cluster.
    ///
    /// Blocks on whatever network I/O the native layer performs; no timeout
    /// is imposed here (configure one through `conf_set` beforehand if the
    /// native layer supports it). On failure the handle stays unconnected
    /// and remains usable for a corrected retry. Calling `connect` again
    /// after success is delegated to the native layer, not re-guarded here.
    pub fn connect(&mut self) -> Result<()> {
        let ctx = self.ctx_mut()?;
        let r = ctx.connect();
        if status::is_error(r) {
            warn!(code = r, "connection to the cluster failed");
            return Err(Error::Connection { code: r });
        }
        self.connected = true;
        info!("connected to the cluster");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Identity & statistics
    // -------------------------------------------------------------------------

    /// The cluster's fsid.
    ///
    /// Requires an established connection; a session-less fsid is not
    /// meaningful.
    pub fn fsid(&mut self) -> Result<String> {
        let ctx = self.connected_ctx(MSG_QUERY_WHILE_UNCONNECTED)?;
        let mut buf = [0u8; VALUE_BUF_LEN];
        let r = ctx.cluster_fsid(&mut buf);
        if status::is_error(r) {
            return Err(Error::Query {
                query: "fsid",
                code: r,
            });
        }
        Ok(cstr_to_string(&buf))
    }

    /// Cluster-wide usage statistics
    pub fn cluster_stat(&mut self) -> Result<ClusterStat> {
        let ctx = self.connected_ctx(MSG_QUERY_WHILE_UNCONNECTED)?;
        let mut stat = ClusterStat::default();
        let r = ctx.cluster_stat(&mut stat);
        if status::is_error(r) {
            return Err(Error::Query {
                query: "stat",
                code: r,
            });
        }
        Ok(stat)
    }

    /// Version of the client library behind this handle's runtime.
    ///
    /// Cannot fail and carries no state gate; it answers on a disposed
    /// handle too.
    pub fn version(&self) -> Version {
        self.runtime.version()
    }

    // -------------------------------------------------------------------------
    // Pool administration
    // -------------------------------------------------------------------------

    /// Create a pool with default placement and ownership
    pub fn pool_create(&mut self, name: &str) -> Result<()> {
        let ctx = self.connected_ctx(MSG_POOL_WHILE_UNCONNECTED)?;
        let r = ctx.pool_create(name);
        Self::check_pool_status(name, r)
    }

    /// Create a pool owned by `auid`
    pub fn pool_create_with_auid(&mut self, name: &str, auid: u64) -> Result<()> {
        let ctx = self.connected_ctx(MSG_POOL_WHILE_UNCONNECTED)?;
        let r = ctx.pool_create_with_auid(name, auid);
        Self::check_pool_status(name, r)
    }

    /// Create a pool owned by `auid` under CRUSH rule `crush_rule`
    pub fn pool_create_with_all(&mut self, name: &str, auid: u64, crush_rule: u64) -> Result<()> {
        let ctx = self.connected_ctx(MSG_POOL_WHILE_UNCONNECTED)?;
        let r = ctx.pool_create_with_all(name, auid, crush_rule);
        Self::check_pool_status(name, r)
    }

    fn check_pool_status(name: &str, r: i32) -> Result<()> {
        if status::is_error(r) {
            return Err(Error::PoolCreation {
                pool: name.to_string(),
                code: r,
            });
        }
        info!(pool = name, "pool created");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Disposal
    // -------------------------------------------------------------------------

    /// Release the native connection context.
    ///
    /// Idempotent; after the first call every other operation on this handle
    /// fails with [`Error::InvalidState`]. Handles that are never closed
    /// explicitly are released on drop.
    pub fn close(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            ctx.shutdown();
            debug!("released cluster handle");
        }
    }
}

impl Drop for Rados {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for Rados {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rados")
            .field("connected", &self.connected)
            .field("disposed", &self.ctx.is_none())
            .finish()
    }
}

/// Decode a NUL-terminated native buffer into an owned string
fn cstr_to_string(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::emulated::{EmulatedCluster, EmulatedClusterConfig};
    use assert_matches::assert_matches;
    use std::io::Write;

    fn handle(cluster: &EmulatedCluster) -> Rados {
        Rados::create_with_runtime(Arc::new(cluster.clone()), Some("client.admin")).unwrap()
    }

    fn connected_handle(cluster: &EmulatedCluster) -> Rados {
        let mut rados = handle(cluster);
        rados.conf_set("mon_host", "10.0.0.1").unwrap();
        rados.connect().unwrap();
        rados
    }

    #[test]
    fn test_create_failure_surfaces_initialization_error() {
        let cluster = EmulatedCluster::default();
        let err = Rados::create_with_runtime(Arc::new(cluster), Some("client admin")).unwrap_err();
        assert_matches!(err, Error::Initialization(_));
    }

    #[test]
    fn test_configuration_rejected_while_connected() {
        let cluster = EmulatedCluster::default();
        let mut rados = connected_handle(&cluster);
        let sets_before = cluster.calls("conf_set");
        let gets_before = cluster.calls("conf_get");
        let reads_before = cluster.calls("conf_read_file");

        assert_matches!(
            rados.conf_set("mon_host", "10.0.0.2").unwrap_err(),
            Error::InvalidState(MSG_CONFIGURE_WHILE_CONNECTED)
        );
        assert_matches!(
            rados.conf_get("mon_host").unwrap_err(),
            Error::InvalidState(MSG_CONFIGURE_WHILE_CONNECTED)
        );
        assert_matches!(
            rados.conf_read_file(Path::new("/etc/ceph/ceph.conf")).unwrap_err(),
            Error::InvalidState(MSG_CONFIGURE_WHILE_CONNECTED)
        );

        // The guard fired before the boundary: no native call went out.
        assert_eq!(cluster.calls("conf_set"), sets_before);
        assert_eq!(cluster.calls("conf_get"), gets_before);
        assert_eq!(cluster.calls("conf_read_file"), reads_before);
    }

    #[test]
    fn test_pool_create_requires_connection() {
        let cluster = EmulatedCluster::default();
        let mut rados = handle(&cluster);

        assert_matches!(
            rados.pool_create("x").unwrap_err(),
            Error::InvalidState(MSG_POOL_WHILE_UNCONNECTED)
        );
        assert_matches!(
            rados.pool_create_with_auid("x", 1).unwrap_err(),
            Error::InvalidState(MSG_POOL_WHILE_UNCONNECTED)
        );
        assert_matches!(
            rados.pool_create_with_all("x", 1, 2).unwrap_err(),
            Error::InvalidState(MSG_POOL_WHILE_UNCONNECTED)
        );

        assert_eq!(cluster.calls("pool_create"), 0);
        assert_eq!(cluster.calls("pool_create_with_auid"), 0);
        assert_eq!(cluster.calls("pool_create_with_all"), 0);
    }

    #[test]
    fn test_connect_failure_allows_retry() {
        let cluster = EmulatedCluster::default();
        let mut rados = handle(&cluster);

        rados.conf_set("mon_host", "192.0.2.99").unwrap();
        let err = rados.connect().unwrap_err();
        assert_matches!(err, Error::Connection { code: status::ECONNREFUSED });
        assert!(!rados.connected());

        // Still unconnected, so the configuration can be corrected.
        rados.conf_set("mon_host", "10.0.0.1").unwrap();
        rados.connect().unwrap();
        assert!(rados.connected());
    }

    #[test]
    fn test_conf_get_truncates_at_buffer_capacity() {
        let cluster = EmulatedCluster::default();
        let mut rados = handle(&cluster);

        for value_len in [256, 257] {
            let value = "v".repeat(value_len);
            rados.conf_set("long_option", &value).unwrap();
            let got = rados.conf_get("long_option").unwrap();
            assert_eq!(got.len(), VALUE_BUF_LEN - 1);
            assert_eq!(&got[..], &value[..VALUE_BUF_LEN - 1]);
        }

        // A value that fits comes back intact.
        rados.conf_set("short_option", "cephx").unwrap();
        assert_eq!(rados.conf_get("short_option").unwrap(), "cephx");
    }

    #[test]
    fn test_conf_get_unknown_option() {
        let cluster = EmulatedCluster::default();
        let mut rados = handle(&cluster);
        let err = rados.conf_get("no_such_option").unwrap_err();
        assert_matches!(
            err,
            Error::Configuration { code: status::ENOENT, .. }
        );
    }

    #[test]
    fn test_conf_read_file_applies_options() {
        let cluster = EmulatedCluster::default();
        let mut rados = handle(&cluster);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[global]").unwrap();
        writeln!(file, "mon_host = 10.0.0.1").unwrap();
        file.flush().unwrap();

        rados.conf_read_file(file.path()).unwrap();
        assert_eq!(rados.conf_get("mon_host").unwrap(), "10.0.0.1");
        rados.connect().unwrap();
    }

    #[test]
    fn test_conf_read_file_missing_path() {
        let cluster = EmulatedCluster::default();
        let mut rados = handle(&cluster);
        let err = rados
            .conf_read_file(Path::new("/nonexistent/ceph.conf"))
            .unwrap_err();
        assert_matches!(
            err,
            Error::Configuration { code: status::ENOENT, .. }
        );
    }

    #[test]
    fn test_fsid_requires_connection() {
        let cluster = EmulatedCluster::default();
        let mut rados = handle(&cluster);
        assert_matches!(
            rados.fsid().unwrap_err(),
            Error::InvalidState(MSG_QUERY_WHILE_UNCONNECTED)
        );

        let mut rados = connected_handle(&cluster);
        assert_eq!(
            rados.fsid().unwrap(),
            EmulatedClusterConfig::default().fsid
        );
    }

    #[test]
    fn test_cluster_stat_reflects_pools() {
        let cluster = EmulatedCluster::default();
        let mut rados = connected_handle(&cluster);

        let before = rados.cluster_stat().unwrap();
        assert_eq!(before.used_bytes, 0);
        assert_eq!(before.available_bytes, before.capacity_bytes);

        rados.pool_create("rbd").unwrap();
        let after = rados.cluster_stat().unwrap();
        assert!(after.used_bytes > 0);
        assert_eq!(
            after.available_bytes,
            after.capacity_bytes - after.used_bytes
        );
    }

    #[test]
    fn test_admin_scenario() {
        let cluster = EmulatedCluster::default();
        let mut rados =
            Rados::create_with_runtime(Arc::new(cluster.clone()), Some("client.admin")).unwrap();

        rados.conf_set("mon_host", "10.0.0.1").unwrap();
        rados.connect().unwrap();
        assert!(rados.connected());

        rados.pool_create("test-pool").unwrap();
        let err = rados.pool_create("test-pool").unwrap_err();
        assert_matches!(
            err,
            Error::PoolCreation { ref pool, code: status::EEXIST } if pool.as_str() == "test-pool"
        );
        assert_eq!(cluster.pool_names(), vec!["test-pool".to_string()]);
    }

    #[test]
    fn test_pool_variants_forward_placement() {
        let cluster = EmulatedCluster::default();
        let mut rados = connected_handle(&cluster);

        rados.pool_create_with_auid("owned", 42).unwrap();
        rados.pool_create_with_all("placed", 42, 7).unwrap();

        assert_eq!(cluster.pool("owned").unwrap().auid, 42);
        let placed = cluster.pool("placed").unwrap();
        assert_eq!(placed.auid, 42);
        assert_eq!(placed.crush_rule, 7);
    }

    #[test]
    fn test_version_regardless_of_state() {
        let cluster = EmulatedCluster::default();
        let expected = EmulatedClusterConfig::default().version;

        let mut rados = handle(&cluster);
        assert_eq!(rados.version(), expected);

        rados.conf_set("mon_host", "10.0.0.1").unwrap();
        rados.connect().unwrap();
        assert_eq!(rados.version(), expected);

        rados.close();
        assert_eq!(rados.version(), expected);
    }

    #[test]
    fn test_close_is_idempotent() {
        let cluster = EmulatedCluster::default();
        let mut rados = connected_handle(&cluster);

        rados.close();
        rados.close();
        assert_eq!(cluster.shutdown_count(), 1);

        assert_matches!(
            rados.conf_set("mon_host", "10.0.0.1").unwrap_err(),
            Error::InvalidState(MSG_DISPOSED)
        );
        assert_matches!(rados.connect().unwrap_err(), Error::InvalidState(MSG_DISPOSED));
        assert_matches!(
            rados.pool_create("x").unwrap_err(),
            Error::InvalidState(MSG_DISPOSED)
        );
        assert_matches!(rados.fsid().unwrap_err(), Error::InvalidState(MSG_DISPOSED));
        assert_matches!(
            rados.cluster_stat().unwrap_err(),
            Error::InvalidState(MSG_DISPOSED)
        );
    }

    #[test]
    fn test_drop_releases_exactly_once() {
        let cluster = EmulatedCluster::default();
        {
            let _rados = connected_handle(&cluster);
        }
        assert_eq!(cluster.shutdown_count(), 1);

        // An explicitly closed handle is not released a second time on drop.
        {
            let mut rados = handle(&cluster);
            rados.close();
        }
        assert_eq!(cluster.shutdown_count(), 2);
    }

    #[test]
    fn test_cstr_decoding() {
        assert_eq!(cstr_to_string(b"abc\0garbage"), "abc");
        assert_eq!(cstr_to_string(b"no-terminator"), "no-terminator");
        assert_eq!(cstr_to_string(b"\0"), "");
    }
}
