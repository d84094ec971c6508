//! External client capability consumed by the pool
//!
//! The pool never talks to the network itself; it probes endpoints through
//! the narrow [`NodeClient`] trait and treats everything behind it as an
//! external collaborator. Implementations wrap the actual storage-protocol
//! client.

use async_trait::async_trait;
use thiserror::Error;

/// Error types surfaced by client probes
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("probe timed out")]
    ProbeTimeout,

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("failed to establish client for {address}: {reason}")]
    Dial { address: String, reason: String },
}

/// Parameters of an `endpoint_info` probe.
///
/// Empty today; kept as a struct so probe options can grow without breaking
/// the trait.
#[derive(Debug, Clone, Default)]
pub struct PrmEndpointInfo {}

/// Parameters of a `network_info` probe.
#[derive(Debug, Clone, Default)]
pub struct PrmNetworkInfo {}

/// Operational state reported by a storage node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NodeState {
    /// State not announced by the node
    #[default]
    Unknown,
    Online,
    Offline,
    Maintenance,
}

/// Node metadata returned by an endpoint probe.
///
/// Carries the node's announced state plus free-form string attributes.
/// Setting an attribute that already exists overwrites its value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeMetadata {
    state: NodeState,
    attributes: Vec<(String, String)>,
}

impl NodeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of the attribute with the given key, if set.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, overwriting any existing value for the key.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn set_online(&mut self) {
        self.state = NodeState::Online;
    }

    pub fn set_offline(&mut self) {
        self.state = NodeState::Offline;
    }

    pub fn set_maintenance(&mut self) {
        self.state = NodeState::Maintenance;
    }

    pub fn is_online(&self) -> bool {
        self.state == NodeState::Online
    }

    pub fn is_offline(&self) -> bool {
        self.state == NodeState::Offline
    }

    pub fn is_maintenance(&self) -> bool {
        self.state == NodeState::Maintenance
    }
}

/// Network metadata returned by a network probe: the responder's public key
/// and its current epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkMetadata {
    responder_key: Vec<u8>,
    epoch: u64,
}

impl NetworkMetadata {
    pub fn new(responder_key: Vec<u8>, epoch: u64) -> Self {
        Self {
            responder_key,
            epoch,
        }
    }

    /// Responder's public key in binary form. Must not be mutated.
    pub fn responder_key(&self) -> &[u8] {
        &self.responder_key
    }

    /// Local epoch of the responding node.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Identity key the pool authenticates sessions with.
///
/// Opaque to the pool; it only participates in session-cache keys. Read-only
/// after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityKey(Vec<u8>);

impl IdentityKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

/// Capability of one storage-node client, consumed by the pool exclusively
/// as a health/metadata probe surface.
///
/// Implementations must be cheap to call concurrently; the pool bounds every
/// probe with a deadline and treats timeouts as failures.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Endpoint address this client is connected to.
    fn address(&self) -> &str;

    /// Probe the node's own metadata.
    async fn endpoint_info(&self, prm: PrmEndpointInfo) -> Result<NodeMetadata, ClientError>;

    /// Probe network-level metadata from the node.
    async fn network_info(&self, prm: PrmNetworkInfo) -> Result<NetworkMetadata, ClientError>;
}
