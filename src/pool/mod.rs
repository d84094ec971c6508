//! Health-aware weighted connection pool
//!
//! This module provides:
//! - Priority tiers of endpoint clients, each with a weighted sampler
//! - `connection()` selection with cross-tier failover
//! - Periodic health probing and sampler reweighting
//! - Session cache invalidation for clients that turn unhealthy

pub mod session;
pub mod tier;

pub use session::{SessionCache, SessionToken};
pub use tier::{NodeStats, TierStats};

use crate::client::{ClientError, IdentityKey, NodeClient};
use crate::config::{ConfigError, PoolConfig};
use crate::lb::ClientStatus;
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use session::form_cache_key;
use std::sync::Arc;
use std::time::Duration;
use tier::{ClientEntry, Tier};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Error types for pool operations
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Every tier was exhausted; no client is currently selectable.
    #[error("no healthy endpoints available in any tier")]
    NoHealthyEndpoints,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Scale a weight vector so it sums to 1. Returns `None` when the total
/// mass is zero.
pub(crate) fn normalize_weights(weights: &[f64]) -> Option<Vec<f64>> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return None;
    }
    Some(weights.iter().map(|w| w / total).collect())
}

/// Health snapshot across all tiers
#[derive(Debug, Clone)]
pub struct PoolStatistics {
    pub tiers: Vec<TierStats>,
}

/// Client-side load-balancing connection pool over priority tiers.
///
/// Constructed once from static configuration and health-checked for the
/// lifetime of the process. Many callers may draw connections concurrently
/// while the rebalance task reweights tiers in the background.
pub struct Pool {
    /// Priority tiers, index 0 = highest priority
    tiers: Vec<Arc<Tier>>,

    /// Configured (unnormalized) weight vector per tier, index-aligned with
    /// the tier's client list
    tier_weights: Vec<Vec<f64>>,

    probe_timeout: Duration,
    rebalance_interval: Duration,

    /// Identity key sessions are established with; read-only
    key: IdentityKey,

    cache: Arc<SessionCache>,
}

impl Pool {
    /// Build a pool from configuration, an identity key and a connect
    /// function producing a client for each configured endpoint.
    ///
    /// Validates the configuration up front; an invalid weight vector or an
    /// empty node list is rejected before the pool becomes usable.
    pub fn new<F>(config: PoolConfig, key: IdentityKey, connect: F) -> Result<Self, PoolError>
    where
        F: Fn(&str) -> Result<Arc<dyn NodeClient>, ClientError>,
    {
        config.validate()?;

        let mut tiers = Vec::new();
        let mut tier_weights = Vec::new();

        for (index, params) in config.tiers().into_iter().enumerate() {
            let priority = params[0].priority;
            let mut entries = Vec::with_capacity(params.len());
            let mut weights = Vec::with_capacity(params.len());

            for param in params {
                let client = connect(&param.address)?;
                entries.push(ClientEntry {
                    client,
                    status: Arc::new(ClientStatus::new(
                        param.address.clone(),
                        config.error_threshold,
                    )),
                });
                weights.push(param.weight);
            }

            // Validation guarantees non-zero mass per tier.
            let normalized =
                normalize_weights(&weights).ok_or(ConfigError::ZeroWeightTier { priority })?;

            let rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
                None => StdRng::from_entropy(),
            };

            tiers.push(Arc::new(Tier::new(entries, normalized, rng)));
            tier_weights.push(weights);
        }

        info!(
            tiers = tiers.len(),
            nodes = config.nodes.len(),
            "pool constructed"
        );

        Ok(Self {
            tiers,
            tier_weights,
            probe_timeout: config.probe_timeout(),
            rebalance_interval: config.rebalance_interval(),
            key,
            cache: Arc::new(SessionCache::new()),
        })
    }

    /// Select a healthy client, trying tiers in priority order.
    ///
    /// Performs no network I/O; fails only when every tier is exhausted.
    pub async fn connection(&self) -> Result<Arc<dyn NodeClient>, PoolError> {
        for (index, tier) in self.tiers.iter().enumerate() {
            if let Some(client) = tier.connection().await {
                return Ok(client);
            }
            debug!(tier = index, "tier unavailable, falling back");
        }
        Err(PoolError::NoHealthyEndpoints)
    }

    /// Probe one tier's clients and reweight its sampler, invalidating
    /// cached sessions of clients that failed probing.
    ///
    /// `buffer` is scratch space reused across rounds to avoid reallocation.
    /// Tiers share no mutable state, so different tiers may be updated
    /// concurrently.
    pub async fn update_tier_health(&self, tier_index: usize, buffer: &mut Vec<f64>) {
        let (Some(tier), Some(weights)) = (
            self.tiers.get(tier_index),
            self.tier_weights.get(tier_index),
        ) else {
            warn!(tier = tier_index, "rebalance requested for unknown tier");
            return;
        };

        let failed = tier
            .update_health(self.probe_timeout, weights, buffer)
            .await;
        for address in failed {
            self.cache.delete_by_prefix(&address);
        }
    }

    /// Rebalance every tier once, concurrently.
    pub async fn update_nodes_health(&self) {
        let mut buffers: Vec<Vec<f64>> = self
            .tier_weights
            .iter()
            .map(|w| Vec::with_capacity(w.len()))
            .collect();
        self.rebalance_all(&mut buffers).await;
    }

    async fn rebalance_all(&self, buffers: &mut [Vec<f64>]) {
        let rounds = buffers
            .iter_mut()
            .enumerate()
            .map(|(index, buffer)| self.update_tier_health(index, buffer));
        join_all(rounds).await;
    }

    /// Start the periodic rebalance task.
    ///
    /// Returns the task handle; abort it to stop rebalancing when tearing
    /// the pool down.
    pub fn start_rebalance(self: &Arc<Self>) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        info!(
            interval_secs = pool.rebalance_interval.as_secs(),
            "rebalance task started"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pool.rebalance_interval);
            let mut buffers: Vec<Vec<f64>> = pool
                .tier_weights
                .iter()
                .map(|w| Vec::with_capacity(w.len()))
                .collect();
            loop {
                ticker.tick().await;
                pool.rebalance_all(&mut buffers).await;
            }
        })
    }

    /// Identity key this pool establishes sessions with.
    pub fn owner_key(&self) -> &IdentityKey {
        &self.key
    }

    /// Cached session state for an endpoint, if any.
    pub fn cached_session(&self, address: &str) -> Option<SessionToken> {
        self.cache.get(&form_cache_key(address, &self.key))
    }

    /// Cache session state established against an endpoint.
    pub fn store_session(&self, address: &str, token: SessionToken) {
        self.cache.put(form_cache_key(address, &self.key), token);
    }

    /// Health snapshot across all tiers.
    pub async fn statistics(&self) -> PoolStatistics {
        let mut tiers = Vec::with_capacity(self.tiers.len());
        for tier in &self.tiers {
            tiers.push(tier.stats().await);
        }
        PoolStatistics { tiers }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::MockNode;
    use super::*;
    use crate::config::NodeParam;
    use std::collections::HashMap;

    fn node(address: &str, weight: f64, priority: u32) -> NodeParam {
        NodeParam {
            address: address.to_string(),
            weight,
            priority,
        }
    }

    fn build_pool(
        nodes: Vec<NodeParam>,
        seed: u64,
    ) -> (Arc<Pool>, HashMap<String, Arc<MockNode>>) {
        let mut config = PoolConfig::new(nodes);
        config.seed = Some(seed);
        config.error_threshold = 1;

        let mut mocks = HashMap::new();
        for param in &config.nodes {
            mocks.insert(param.address.clone(), Arc::new(MockNode::new(&param.address)));
        }
        let by_address = mocks.clone();
        let pool = Pool::new(
            config,
            IdentityKey::new(vec![0xab]),
            move |address| Ok(by_address[address].clone() as Arc<dyn NodeClient>),
        )
        .expect("valid config");

        (Arc::new(pool), mocks)
    }

    #[test]
    fn test_normalize_weights() {
        assert_eq!(
            normalize_weights(&[1.0, 1.0, 2.0]),
            Some(vec![0.25, 0.25, 0.5])
        );
        assert_eq!(normalize_weights(&[0.0, 0.0]), None);
    }

    #[test]
    fn test_construction_rejects_invalid_config() {
        let config = PoolConfig::new(vec![]);
        let result = Pool::new(config, IdentityKey::new(vec![]), |_| {
            Ok(Arc::new(MockNode::new("unused")) as Arc<dyn NodeClient>)
        });
        assert!(matches!(
            result,
            Err(PoolError::Config(ConfigError::NoNodes))
        ));
    }

    #[test]
    fn test_construction_surfaces_connect_failure() {
        let config = PoolConfig::new(vec![node("grpc://node0:8080", 1.0, 0)]);
        let result = Pool::new(config, IdentityKey::new(vec![]), |address| {
            Err(ClientError::Dial {
                address: address.to_string(),
                reason: "refused".to_string(),
            })
        });
        assert!(matches!(result, Err(PoolError::Client(_))));
    }

    #[tokio::test]
    async fn test_fallback_to_lower_priority_tier() {
        let (pool, mocks) = build_pool(
            vec![
                node("grpc://primary:8080", 1.0, 0),
                node("grpc://backup:8080", 1.0, 1),
            ],
            0,
        );

        // Both tiers healthy: the primary tier always wins.
        let client = pool.connection().await.expect("healthy pool");
        assert_eq!(client.address(), "grpc://primary:8080");

        mocks["grpc://primary:8080"].set_failing(true);
        pool.update_nodes_health().await;

        let client = pool.connection().await.expect("backup tier");
        assert_eq!(client.address(), "grpc://backup:8080");
    }

    #[tokio::test]
    async fn test_no_healthy_endpoints() {
        let (pool, mocks) = build_pool(
            vec![
                node("grpc://primary:8080", 1.0, 0),
                node("grpc://backup:8080", 1.0, 1),
            ],
            0,
        );

        for mock in mocks.values() {
            mock.set_failing(true);
        }
        pool.update_nodes_health().await;

        let result = pool.connection().await;
        assert!(matches!(result, Err(PoolError::NoHealthyEndpoints)));
    }

    #[tokio::test]
    async fn test_failed_probe_invalidates_cached_session() {
        let (pool, mocks) = build_pool(vec![node("grpc://node0:8080", 1.0, 0)], 0);

        pool.store_session(
            "grpc://node0:8080",
            SessionToken::new(vec![1], vec![2], 100),
        );
        assert!(pool.cached_session("grpc://node0:8080").is_some());

        mocks["grpc://node0:8080"].set_failing(true);
        pool.update_nodes_health().await;

        assert!(pool.cached_session("grpc://node0:8080").is_none());
    }

    #[tokio::test]
    async fn test_statistics_reflect_probe_outcomes() {
        let (pool, mocks) = build_pool(
            vec![
                node("grpc://node0:8080", 1.0, 0),
                node("grpc://node1:8080", 1.0, 0),
            ],
            0,
        );

        mocks["grpc://node1:8080"].set_failing(true);
        pool.update_nodes_health().await;

        let stats = pool.statistics().await;
        assert_eq!(stats.tiers.len(), 1);
        let tier = &stats.tiers[0];
        assert!(!tier.empty);

        let by_address: HashMap<_, _> = tier
            .nodes
            .iter()
            .map(|n| (n.address.as_str(), n))
            .collect();
        assert!(by_address["grpc://node0:8080"].healthy);
        assert!(!by_address["grpc://node1:8080"].healthy);
        assert_eq!(by_address["grpc://node1:8080"].error_count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_connections_during_rebalance() {
        let (pool, mocks) = build_pool(
            vec![
                node("grpc://node0:8080", 0.7, 0),
                node("grpc://node1:8080", 0.3, 0),
            ],
            0,
        );

        let rebalancer = {
            let pool = Arc::clone(&pool);
            let flapping = mocks["grpc://node1:8080"].clone();
            tokio::spawn(async move {
                let mut buffer = Vec::new();
                for round in 0..50 {
                    flapping.set_failing(round % 2 == 0);
                    pool.update_tier_health(0, &mut buffer).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut drawers = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            drawers.push(tokio::spawn(async move {
                for _ in 0..500 {
                    let client = pool.connection().await.expect("tier never fully empty");
                    assert!(client.address().starts_with("grpc://node"));
                }
            }));
        }

        rebalancer.await.expect("rebalancer task");
        for drawer in drawers {
            drawer.await.expect("drawer task");
        }
    }
}
