//! Emulated Cluster Runtime
//!
//! An in-process stand-in for a live cluster behind the
//! [`ClusterRuntime`] boundary. It keeps pools and per-entry-point call
//! counters in memory so tests can assert not only on handle behavior but on
//! exactly which native calls were (or were not) issued.

use super::{status, ClusterContext, ClusterRuntime, ClusterStat, Version};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use tracing::{debug, info};

/// Fixed per-pool metadata overhead reported by `cluster_stat`
const POOL_METADATA_BYTES: u64 = 4 * 1024 * 1024;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the emulated cluster
#[derive(Debug, Clone)]
pub struct EmulatedClusterConfig {
    /// The cluster's fsid
    pub fsid: String,
    /// Monitor addresses considered reachable; `connect` succeeds only when
    /// the context's `mon_host` option names one of these
    pub monitors: Vec<String>,
    /// Total raw capacity in bytes
    pub capacity_bytes: u64,
    /// Client library version the runtime reports
    pub version: Version,
}

impl Default for EmulatedClusterConfig {
    fn default() -> Self {
        Self {
            fsid: "a7f64266-0894-4f1e-a635-d0aeaca0e993".to_string(),
            monitors: vec!["10.0.0.1".to_string()],
            capacity_bytes: 4 * 1024 * 1024 * 1024 * 1024, // 4 TiB
            version: Version {
                major: 0,
                minor: 69,
                extra: 2,
            },
        }
    }
}

// =============================================================================
// Cluster State
// =============================================================================

/// A pool registered with the emulated cluster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolRecord {
    /// Owning auid
    pub auid: u64,
    /// CRUSH placement rule
    pub crush_rule: u64,
}

#[derive(Debug, Default)]
struct ClusterState {
    pools: BTreeMap<String, PoolRecord>,
    calls: BTreeMap<&'static str, u64>,
    shutdowns: u64,
}

struct Shared {
    config: EmulatedClusterConfig,
    state: Mutex<ClusterState>,
}

// =============================================================================
// Emulated Runtime
// =============================================================================

/// In-memory cluster runtime
#[derive(Clone)]
pub struct EmulatedCluster {
    shared: Arc<Shared>,
}

impl EmulatedCluster {
    /// Create an emulated cluster with the given configuration
    pub fn new(config: EmulatedClusterConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(ClusterState::default()),
            }),
        }
    }

    /// Names of all pools created so far, sorted
    pub fn pool_names(&self) -> Vec<String> {
        self.shared.state.lock().pools.keys().cloned().collect()
    }

    /// Look up a registered pool
    pub fn pool(&self, name: &str) -> Option<PoolRecord> {
        self.shared.state.lock().pools.get(name).cloned()
    }

    /// Number of times the named entry point was invoked
    pub fn calls(&self, entry_point: &str) -> u64 {
        self.shared
            .state
            .lock()
            .calls
            .get(entry_point)
            .copied()
            .unwrap_or(0)
    }

    /// Number of contexts released so far
    pub fn shutdown_count(&self) -> u64 {
        self.shared.state.lock().shutdowns
    }
}

impl Default for EmulatedCluster {
    fn default() -> Self {
        Self::new(EmulatedClusterConfig::default())
    }
}

impl ClusterRuntime for EmulatedCluster {
    fn create(&self, principal: &str) -> Result<Box<dyn ClusterContext>, i32> {
        // cephx identities never contain whitespace
        if principal.contains(char::is_whitespace) {
            return Err(status::EINVAL);
        }
        debug!(principal, "allocating emulated cluster context");
        Ok(Box::new(EmulatedContext {
            principal: principal.to_string(),
            conf: BTreeMap::new(),
            connected: false,
            shared: Arc::clone(&self.shared),
        }))
    }

    fn version(&self) -> Version {
        self.shared.config.version
    }
}

// =============================================================================
// Emulated Context
// =============================================================================

struct EmulatedContext {
    principal: String,
    conf: BTreeMap<String, String>,
    connected: bool,
    shared: Arc<Shared>,
}

impl EmulatedContext {
    fn record(&self, entry_point: &'static str) {
        *self
            .shared
            .state
            .lock()
            .calls
            .entry(entry_point)
            .or_insert(0) += 1;
    }

    fn create_pool(&mut self, name: &str, record: PoolRecord) -> i32 {
        if !self.connected {
            return status::ENOTCONN;
        }
        if name.is_empty() {
            return status::EINVAL;
        }
        let mut state = self.shared.state.lock();
        if state.pools.contains_key(name) {
            return status::EEXIST;
        }
        info!(pool = name, auid = record.auid, "created pool");
        state.pools.insert(name.to_string(), record);
        0
    }
}

/// Write `value` into `buf` NUL-terminated, truncating to `buf.len() - 1`
fn write_cstr(buf: &mut [u8], value: &str) {
    if buf.is_empty() {
        return;
    }
    let bytes = value.as_bytes();
    let len = bytes.len().min(buf.len() - 1);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf[len] = 0;
}

impl ClusterContext for EmulatedContext {
    fn conf_read_file(&mut self, path: &str) -> i32 {
        self.record("conf_read_file");
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return status::ENOENT,
        };
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                continue; // section headers carry no options of their own here
            }
            match line.split_once('=') {
                Some((option, value)) => {
                    self.conf
                        .insert(option.trim().to_string(), value.trim().to_string());
                }
                None => return status::EINVAL,
            }
        }
        debug!(path, "read configuration file");
        0
    }

    fn conf_set(&mut self, option: &str, value: &str) -> i32 {
        self.record("conf_set");
        if option.is_empty() {
            return status::EINVAL;
        }
        self.conf.insert(option.to_string(), value.to_string());
        0
    }

    fn conf_get(&mut self, option: &str, buf: &mut [u8]) -> i32 {
        self.record("conf_get");
        if option.is_empty() {
            return status::EINVAL;
        }
        match self.conf.get(option) {
            Some(value) => {
                write_cstr(buf, value);
                0
            }
            None => status::ENOENT,
        }
    }

    fn connect(&mut self) -> i32 {
        self.record("connect");
        if self.connected {
            return status::EISCONN;
        }
        let reachable = self
            .conf
            .get("mon_host")
            .map(|host| self.shared.config.monitors.iter().any(|m| m == host))
            .unwrap_or(false);
        if !reachable {
            return status::ECONNREFUSED;
        }
        info!(principal = %self.principal, "emulated cluster session established");
        self.connected = true;
        0
    }

    fn cluster_fsid(&mut self, buf: &mut [u8]) -> i32 {
        self.record("cluster_fsid");
        if !self.connected {
            return status::ENOTCONN;
        }
        let fsid = &self.shared.config.fsid;
        write_cstr(buf, fsid);
        fsid.len() as i32
    }

    fn cluster_stat(&mut self, out: &mut ClusterStat) -> i32 {
        self.record("cluster_stat");
        if !self.connected {
            return status::ENOTCONN;
        }
        let state = self.shared.state.lock();
        let capacity = self.shared.config.capacity_bytes;
        let used = POOL_METADATA_BYTES * state.pools.len() as u64;
        *out = ClusterStat {
            capacity_bytes: capacity,
            used_bytes: used,
            available_bytes: capacity.saturating_sub(used),
            object_count: 0,
        };
        0
    }

    fn pool_create(&mut self, name: &str) -> i32 {
        self.record("pool_create");
        self.create_pool(name, PoolRecord::default())
    }

    fn pool_create_with_auid(&mut self, name: &str, auid: u64) -> i32 {
        self.record("pool_create_with_auid");
        self.create_pool(name, PoolRecord { auid, crush_rule: 0 })
    }

    fn pool_create_with_all(&mut self, name: &str, auid: u64, crush_rule: u64) -> i32 {
        self.record("pool_create_with_all");
        self.create_pool(name, PoolRecord { auid, crush_rule })
    }

    fn shutdown(&mut self) {
        let mut state = self.shared.state.lock();
        state.shutdowns += 1;
        self.connected = false;
        debug!(principal = %self.principal, "emulated cluster context released");
    }
}
