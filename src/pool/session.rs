//! Session token cache
//!
//! Maps (endpoint address, owner key) to cached session state so repeated
//! selections of the same client can reuse an established session. The cache
//! has its own lock and is never held together with tier state.

use crate::client::IdentityKey;
use std::collections::HashMap;
use std::sync::RwLock;

/// Opaque session state established against one client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    /// Token identifier assigned by the node
    id: Vec<u8>,

    /// Public session key bound to the token
    session_key: Vec<u8>,

    /// Epoch after which the token is invalid
    expiration: u64,
}

impl SessionToken {
    pub fn new(id: Vec<u8>, session_key: Vec<u8>, expiration: u64) -> Self {
        Self {
            id,
            session_key,
            expiration,
        }
    }

    pub fn id(&self) -> &[u8] {
        &self.id
    }

    pub fn session_key(&self) -> &[u8] {
        &self.session_key
    }

    pub fn expiration(&self) -> u64 {
        self.expiration
    }
}

/// Cache key: endpoint address followed by the owner key in hex, so all
/// sessions of one endpoint share an address prefix.
pub(crate) fn form_cache_key(address: &str, key: &IdentityKey) -> String {
    format!("{}{}", address, key.to_hex())
}

/// Thread-safe session cache with address-prefix invalidation
#[derive(Debug, Default)]
pub struct SessionCache {
    tokens: RwLock<HashMap<String, SessionToken>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<SessionToken> {
        self.tokens
            .read()
            .ok()
            .and_then(|tokens| tokens.get(key).cloned())
    }

    pub fn put(&self, key: String, token: SessionToken) {
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.insert(key, token);
        }
    }

    /// Drop every session whose key starts with the given endpoint address.
    /// Called when a client turns unhealthy so a later reselection cannot
    /// reuse stale session state.
    pub fn delete_by_prefix(&self, prefix: &str) {
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.retain(|key, _| !key.starts_with(prefix));
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.read().map(|tokens| tokens.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
