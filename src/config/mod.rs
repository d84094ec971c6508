use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Configuration errors, fatal at pool construction
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("node list is empty")]
    NoNodes,

    #[error("invalid weight {weight} for node {address}: weights must be finite and non-negative")]
    InvalidWeight { address: String, weight: f64 },

    #[error("priority tier {priority} has zero total weight")]
    ZeroWeightTier { priority: u32 },

    #[error("probe timeout must be greater than zero")]
    ZeroProbeTimeout,

    #[error("rebalance interval must be greater than zero")]
    ZeroRebalanceInterval,
}

/// One endpoint entry: address, selection weight and failover priority
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeParam {
    /// Endpoint address (e.g. "grpc://node1.example.com:8080")
    pub address: String,

    /// Selection weight within the node's priority tier
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Failover priority; lower values are tried first (0 = highest)
    #[serde(default)]
    pub priority: u32,
}

fn default_weight() -> f64 {
    1.0
}

/// Pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Endpoints with their weights and priorities
    pub nodes: Vec<NodeParam>,

    /// Consecutive probe errors before a client is marked unhealthy
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,

    /// Health probe timeout in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Interval between rebalance rounds in seconds
    #[serde(default = "default_rebalance_interval")]
    pub rebalance_interval_secs: u64,

    /// Fixed random seed for deterministic selection; entropy-seeded if unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_error_threshold() -> u32 {
    100
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_rebalance_interval() -> u64 {
    15
}

impl PoolConfig {
    /// Configuration with default tuning for the given nodes.
    pub fn new(nodes: Vec<NodeParam>) -> Self {
        Self {
            nodes,
            error_threshold: default_error_threshold(),
            probe_timeout_secs: default_probe_timeout(),
            rebalance_interval_secs: default_rebalance_interval(),
            seed: None,
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn rebalance_interval(&self) -> Duration {
        Duration::from_secs(self.rebalance_interval_secs)
    }

    /// Nodes grouped by priority, ascending. Order within a tier follows the
    /// configuration order.
    pub fn tiers(&self) -> Vec<Vec<&NodeParam>> {
        let mut grouped: BTreeMap<u32, Vec<&NodeParam>> = BTreeMap::new();
        for node in &self.nodes {
            grouped.entry(node.priority).or_default().push(node);
        }
        grouped.into_values().collect()
    }

    /// Reject configurations the pool cannot operate on.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.nodes.is_empty() {
            return Err(ConfigError::NoNodes);
        }

        for node in &self.nodes {
            if !node.weight.is_finite() || node.weight < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    address: node.address.clone(),
                    weight: node.weight,
                });
            }
        }

        for tier in self.tiers() {
            let total: f64 = tier.iter().map(|n| n.weight).sum();
            if total <= 0.0 {
                return Err(ConfigError::ZeroWeightTier {
                    priority: tier[0].priority,
                });
            }
        }

        if self.probe_timeout_secs == 0 {
            return Err(ConfigError::ZeroProbeTimeout);
        }
        if self.rebalance_interval_secs == 0 {
            return Err(ConfigError::ZeroRebalanceInterval);
        }

        Ok(())
    }
}

/// Load configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<PoolConfig> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let config: PoolConfig =
        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

    Ok(config)
}

/// Load configuration from environment variables
///
/// Recognized variables:
/// - MESHPOOL_NODES: comma-separated `priority:weight:address` triples,
///   e.g. `0:9:grpc://node1:8080,0:1:grpc://node2:8080,1:1:grpc://node3:8080`
/// - MESHPOOL_ERROR_THRESHOLD (optional)
/// - MESHPOOL_PROBE_TIMEOUT (optional, seconds)
/// - MESHPOOL_REBALANCE_INTERVAL (optional, seconds)
/// - MESHPOOL_SEED (optional, fixed random seed)
pub fn load_from_env() -> Result<PoolConfig> {
    // Try to load .env file if it exists (don't fail if it doesn't)
    let _ = dotenvy::dotenv();

    let nodes_str =
        std::env::var("MESHPOOL_NODES").context("MESHPOOL_NODES environment variable not set")?;

    let nodes = nodes_str
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_node_triple)
        .collect::<Result<Vec<_>>>()?;

    if nodes.is_empty() {
        anyhow::bail!("MESHPOOL_NODES contains no valid endpoints");
    }

    let mut config = PoolConfig::new(nodes);

    if let Ok(threshold) = std::env::var("MESHPOOL_ERROR_THRESHOLD") {
        config.error_threshold = threshold
            .parse()
            .context("MESHPOOL_ERROR_THRESHOLD is not a valid integer")?;
    }

    if let Ok(timeout) = std::env::var("MESHPOOL_PROBE_TIMEOUT") {
        config.probe_timeout_secs = timeout
            .parse()
            .context("MESHPOOL_PROBE_TIMEOUT is not a valid integer")?;
    }

    if let Ok(interval) = std::env::var("MESHPOOL_REBALANCE_INTERVAL") {
        config.rebalance_interval_secs = interval
            .parse()
            .context("MESHPOOL_REBALANCE_INTERVAL is not a valid integer")?;
    }

    if let Ok(seed) = std::env::var("MESHPOOL_SEED") {
        config.seed = Some(seed.parse().context("MESHPOOL_SEED is not a valid integer")?);
    }

    Ok(config)
}

/// Parse one `priority:weight:address` node entry.
fn parse_node_triple(entry: &str) -> Result<NodeParam> {
    let mut parts = entry.splitn(3, ':');
    let (Some(priority), Some(weight), Some(address)) = (parts.next(), parts.next(), parts.next())
    else {
        anyhow::bail!("invalid node entry '{entry}', expected priority:weight:address");
    };

    Ok(NodeParam {
        address: address.to_string(),
        weight: weight
            .parse()
            .context(format!("invalid weight in node entry '{entry}'"))?,
        priority: priority
            .parse()
            .context(format!("invalid priority in node entry '{entry}'"))?,
    })
}

/// Load configuration from file or environment
///
/// Tries the YAML file when a path is given, otherwise falls back to
/// environment variables.
pub fn load_config(config_path: Option<&str>) -> Result<PoolConfig> {
    if let Some(path) = config_path {
        load_from_yaml(path)
    } else {
        load_from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_yaml() {
        let yaml = r#"
nodes:
  - address: grpc://node1.example.com:8080
    weight: 9
  - address: grpc://node2.example.com:8080
    weight: 1
  - address: grpc://backup.example.com:8080
    weight: 1
    priority: 1

error_threshold: 10
probe_timeout_secs: 2
rebalance_interval_secs: 5
seed: 42
"#;

        let config: PoolConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.nodes.len(), 3);
        assert_eq!(config.nodes[0].weight, 9.0);
        assert_eq!(config.nodes[2].priority, 1);
        assert_eq!(config.error_threshold, 10);
        assert_eq!(config.probe_timeout(), Duration::from_secs(2));
        assert_eq!(config.seed, Some(42));

        let tiers = config.tiers();
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0].len(), 2);
        assert_eq!(tiers[1][0].address, "grpc://backup.example.com:8080");
    }

    #[test]
    fn test_default_values() {
        let yaml = r#"
nodes:
  - address: grpc://node1.example.com:8080
"#;

        let config: PoolConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.nodes[0].weight, 1.0);
        assert_eq!(config.nodes[0].priority, 0);
        assert_eq!(config.error_threshold, 100);
        assert_eq!(config.probe_timeout(), Duration::from_secs(5));
        assert_eq!(config.rebalance_interval(), Duration::from_secs(15));
        assert_eq!(config.seed, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_empty_node_list() {
        let config = PoolConfig::new(vec![]);
        assert!(matches!(config.validate(), Err(ConfigError::NoNodes)));
    }

    #[test]
    fn test_validation_rejects_negative_weight() {
        let config = PoolConfig::new(vec![NodeParam {
            address: "grpc://node1:8080".to_string(),
            weight: -1.0,
            priority: 0,
        }]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_zero_weight_tier() {
        let config = PoolConfig::new(vec![
            NodeParam {
                address: "grpc://node1:8080".to_string(),
                weight: 1.0,
                priority: 0,
            },
            NodeParam {
                address: "grpc://node2:8080".to_string(),
                weight: 0.0,
                priority: 1,
            },
        ]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroWeightTier { priority: 1 })
        ));
    }

    #[test]
    fn test_parse_node_triple() {
        let node = parse_node_triple("1:2.5:grpc://node1:8080").unwrap();
        assert_eq!(node.priority, 1);
        assert_eq!(node.weight, 2.5);
        assert_eq!(node.address, "grpc://node1:8080");

        assert!(parse_node_triple("grpc://node1:8080").is_err());
    }
}
