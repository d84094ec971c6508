//! Example demonstrating pool construction, selection and rebalancing
//!
//! This example shows how to:
//! 1. Configure a tiered pool with weighted endpoints
//! 2. Plug in a client implementation behind the NodeClient trait
//! 3. Start the periodic rebalance task
//! 4. Draw connections and watch failover happen

use async_trait::async_trait;
use meshpool::client::{
    ClientError, NetworkMetadata, NodeClient, NodeMetadata, PrmEndpointInfo, PrmNetworkInfo,
};
use meshpool::{IdentityKey, NodeParam, Pool, PoolConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Stand-in for a real storage-protocol client.
struct DemoNode {
    address: String,
    down: AtomicBool,
}

#[async_trait]
impl NodeClient for DemoNode {
    fn address(&self) -> &str {
        &self.address
    }

    async fn endpoint_info(&self, _: PrmEndpointInfo) -> Result<NodeMetadata, ClientError> {
        if self.down.load(Ordering::Relaxed) {
            return Err(ClientError::Probe("simulated outage".to_string()));
        }
        let mut meta = NodeMetadata::new();
        meta.set_online();
        Ok(meta)
    }

    async fn network_info(&self, _: PrmNetworkInfo) -> Result<NetworkMetadata, ClientError> {
        Ok(NetworkMetadata::new(vec![0x02], 1))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let mut config = PoolConfig::new(vec![
        NodeParam {
            address: "grpc://node1.example.com:8080".to_string(),
            weight: 9.0,
            priority: 0,
        },
        NodeParam {
            address: "grpc://node2.example.com:8080".to_string(),
            weight: 1.0,
            priority: 0,
        },
        NodeParam {
            address: "grpc://backup.example.com:8080".to_string(),
            weight: 1.0,
            priority: 1,
        },
    ]);
    config.error_threshold = 3;
    config.probe_timeout_secs = 2;
    config.rebalance_interval_secs = 1;

    let nodes: HashMap<String, Arc<DemoNode>> = config
        .nodes
        .iter()
        .map(|param| {
            let node = Arc::new(DemoNode {
                address: param.address.clone(),
                down: AtomicBool::new(false),
            });
            (param.address.clone(), node)
        })
        .collect();

    let by_address = nodes.clone();
    let pool = Arc::new(Pool::new(
        config,
        IdentityKey::new(vec![0x02, 0xaa, 0xbb]),
        move |address| Ok(by_address[address].clone() as Arc<dyn NodeClient>),
    )?);

    let rebalance = pool.start_rebalance();

    for _ in 0..5 {
        let client = pool.connection().await?;
        info!(address = %client.address(), "selected client");
    }

    // Take the primary tier down and let the rebalance task notice.
    warn!("simulating primary tier outage");
    nodes["grpc://node1.example.com:8080"]
        .down
        .store(true, Ordering::Relaxed);
    nodes["grpc://node2.example.com:8080"]
        .down
        .store(true, Ordering::Relaxed);
    tokio::time::sleep(Duration::from_secs(2)).await;

    for _ in 0..3 {
        let client = pool.connection().await?;
        info!(address = %client.address(), "selected client after failover");
    }

    for (i, tier) in pool.statistics().await.tiers.iter().enumerate() {
        for node in &tier.nodes {
            info!(
                tier = i,
                address = %node.address,
                healthy = node.healthy,
                errors = node.error_count,
                "node status"
            );
        }
    }

    rebalance.abort();
    Ok(())
}
