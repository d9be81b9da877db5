//! Cluster-wide configuration surface (spec.md §6 "External interfaces").
//!
//! Grounded on the teacher's `pool::connection_pool::{PoolConfig,
//! PoolConfigBuilder}` pattern: a plain config struct with a `Default` impl,
//! a fluent builder that mutates an inner copy, and a `build()` that
//! validates before returning.

use crate::cluster::{Distance, ExponentialReconnectionPolicy, ReconnectionPolicy};
use crate::error::{DbError, Result};
use crate::execution::{DefaultRetryPolicy, LoadBalancingPolicy, RetryPolicy, RoundRobinPolicy};
use crate::protocol::{Compression, ProtocolVersion};
use std::sync::Arc;
use std::time::Duration;

/// Per-`Distance` connection-pool sizing plus the wire-level knobs that
/// govern it (spec.md §4.C).
#[derive(Clone)]
pub struct PoolingConfig {
    pub core_connections_per_host_local: usize,
    pub core_connections_per_host_remote: usize,
    pub max_connections_per_host_local: usize,
    pub max_connections_per_host_remote: usize,
    pub max_requests_per_connection: usize,
    pub heartbeat_interval: Duration,
    pub max_wait_queue_size: usize,
    pub grow_threshold: f64,
    pub trash_threshold: f64,
}

impl Default for PoolingConfig {
    fn default() -> Self {
        Self {
            core_connections_per_host_local: 1,
            core_connections_per_host_remote: 1,
            max_connections_per_host_local: 8,
            max_connections_per_host_remote: 2,
            max_requests_per_connection: 1024,
            heartbeat_interval: Duration::from_secs(30),
            max_wait_queue_size: 256,
            grow_threshold: 0.9,
            trash_threshold: 0.3,
        }
    }
}

impl PoolingConfig {
    pub fn sizing_for(&self, distance: Distance) -> Option<crate::pool::PoolSizing> {
        match distance {
            Distance::Local => Some(crate::pool::PoolSizing {
                core: self.core_connections_per_host_local,
                max: self.max_connections_per_host_local,
                max_requests_per_connection: self.max_requests_per_connection,
            }),
            Distance::Remote => Some(crate::pool::PoolSizing {
                core: self.core_connections_per_host_remote,
                max: self.max_connections_per_host_remote,
                max_requests_per_connection: self.max_requests_per_connection,
            }),
            Distance::Ignored => None,
        }
    }
}

/// Metadata-refresh debounce windows (spec.md §4.B "Metadata refresh").
#[derive(Clone)]
pub struct QueryConfig {
    pub refresh_node_interval: Duration,
    pub refresh_node_list_interval: Duration,
    pub refresh_schema_interval: Duration,
    pub default_timeout: Duration,
    pub max_retries: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            refresh_node_interval: Duration::from_secs(1),
            refresh_node_list_interval: Duration::from_secs(60),
            refresh_schema_interval: Duration::from_millis(500),
            default_timeout: Duration::from_secs(12),
            max_retries: 1,
        }
    }
}

#[derive(Clone)]
pub struct ClusterConfig {
    pub protocol_version: ProtocolVersion,
    pub compression: Compression,
    pub pooling: PoolingConfig,
    pub query: QueryConfig,
    pub reconnection_policy: Arc<dyn ReconnectionPolicy>,
    pub retry_policy: Arc<dyn RetryPolicy>,
    pub load_balancing_policy: Arc<dyn LoadBalancingPolicy>,
    pub new_node_delay: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            protocol_version: ProtocolVersion::MAX,
            compression: Compression::None,
            pooling: PoolingConfig::default(),
            query: QueryConfig::default(),
            reconnection_policy: Arc::new(ExponentialReconnectionPolicy::default()),
            retry_policy: Arc::new(DefaultRetryPolicy),
            load_balancing_policy: Arc::new(RoundRobinPolicy::default()),
            new_node_delay: Duration::from_secs(1),
        }
    }
}

impl ClusterConfig {
    pub fn builder() -> ClusterConfigBuilder {
        ClusterConfigBuilder { config: ClusterConfig::default() }
    }

    /// Rejects configurations that can never make progress.
    pub fn validate(&self) -> Result<()> {
        if self.pooling.max_connections_per_host_local == 0 {
            return Err(DbError::Configuration("max_connections_per_host_local must be >= 1".into()));
        }
        if self.pooling.core_connections_per_host_local > self.pooling.max_connections_per_host_local {
            return Err(DbError::Configuration("core connections exceed max connections (local)".into()));
        }
        if self.pooling.core_connections_per_host_remote > self.pooling.max_connections_per_host_remote {
            return Err(DbError::Configuration("core connections exceed max connections (remote)".into()));
        }
        if self.query.default_timeout.is_zero() {
            return Err(DbError::Configuration("default_timeout must be > 0".into()));
        }
        Ok(())
    }
}

pub struct ClusterConfigBuilder {
    config: ClusterConfig,
}

impl ClusterConfigBuilder {
    pub fn protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.config.protocol_version = version;
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.config.compression = compression;
        self
    }

    pub fn pooling(mut self, pooling: PoolingConfig) -> Self {
        self.config.pooling = pooling;
        self
    }

    pub fn query(mut self, query: QueryConfig) -> Self {
        self.config.query = query;
        self
    }

    pub fn reconnection_policy(mut self, policy: Arc<dyn ReconnectionPolicy>) -> Self {
        self.config.reconnection_policy = policy;
        self
    }

    pub fn retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.config.retry_policy = policy;
        self
    }

    pub fn load_balancing_policy(mut self, policy: Arc<dyn LoadBalancingPolicy>) -> Self {
        self.config.load_balancing_policy = policy;
        self
    }

    pub fn new_node_delay(mut self, delay: Duration) -> Self {
        self.config.new_node_delay = delay;
        self
    }

    pub fn build(self) -> Result<ClusterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
