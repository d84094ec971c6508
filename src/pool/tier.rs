//! One priority tier: an ordered client list plus the sampler that selects
//! among them.
//!
//! The {clients, weights, sampler} triple is guarded by a single
//! reader/writer lock and replaced as one unit - never partially updated.
//! Health probes run against a snapshot taken before the write lock, so slow
//! probes never block readers; only the final install is serialized.

use crate::client::{NodeClient, PrmEndpointInfo};
use crate::lb::{ClientStatus, Sampler};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// One client slot in a tier. The status record is owned by this entry;
/// probe tasks reach it through the snapshot's `Arc`.
#[derive(Clone)]
pub(crate) struct ClientEntry {
    pub(crate) client: Arc<dyn NodeClient>,
    pub(crate) status: Arc<ClientStatus>,
}

/// Health snapshot of one client, for diagnostics
#[derive(Debug, Clone)]
pub struct NodeStats {
    pub address: String,
    pub healthy: bool,
    pub error_count: u32,
}

/// Health snapshot of one tier, for diagnostics
#[derive(Debug, Clone)]
pub struct TierStats {
    /// True when the last rebalance found no healthy client
    pub empty: bool,

    /// Number of sampler installs so far
    pub generation: u64,

    pub nodes: Vec<NodeStats>,
}

/// State replaced as a single unit under the write lock.
///
/// `weights` always holds the most recently installed (normalized)
/// probability vector, index-aligned with `entries` and the sampler.
struct TierState {
    entries: Vec<ClientEntry>,
    weights: Vec<f64>,
    // The sampler's random source is sequential state; the inner mutex
    // serializes draws while the outer lock is held shared.
    sampler: Option<Mutex<Sampler<StdRng>>>,
    empty: bool,
    generation: u64,
}

pub(crate) struct Tier {
    state: RwLock<TierState>,
}

impl Tier {
    /// Build a tier with its initial sampler over the given normalized
    /// weight vector.
    pub(crate) fn new(entries: Vec<ClientEntry>, weights: Vec<f64>, rng: StdRng) -> Self {
        debug_assert_eq!(entries.len(), weights.len());
        let sampler = Sampler::new(&weights, rng);
        Self {
            state: RwLock::new(TierState {
                entries,
                weights,
                sampler: Some(Mutex::new(sampler)),
                empty: false,
                generation: 1,
            }),
        }
    }

    /// Select a healthy client from this tier, or `None` when the tier is
    /// currently unavailable.
    ///
    /// Draws one index from the sampler; if that client turned unhealthy
    /// since the last rebalance, scans forward cyclically over the remaining
    /// non-zero-weight indices (at most N attempts) to bridge the gap until
    /// the next probe round. Performs no network I/O.
    pub(crate) async fn connection(&self) -> Option<Arc<dyn NodeClient>> {
        let state = self.state.read().await;
        if state.empty || state.entries.is_empty() {
            return None;
        }
        let sampler = state.sampler.as_ref()?;

        let start = {
            let mut sampler = sampler.lock().unwrap_or_else(|e| e.into_inner());
            sampler.next()
        };

        let n = state.entries.len();
        for step in 0..n {
            let idx = (start + step) % n;
            if state.weights[idx] == 0.0 {
                continue;
            }
            let entry = &state.entries[idx];
            if entry.status.is_healthy() {
                return Some(Arc::clone(&entry.client));
            }
        }

        None
    }

    /// Probe every client and install a reweighted sampler.
    ///
    /// Probes run concurrently against a snapshot of the client list, each
    /// bounded by `probe_timeout`; a timeout or error counts as unhealthy
    /// for this round and zeroes the client's weight in `buffer`. The
    /// surviving mass is renormalized and, when the resulting vector differs
    /// from the installed one, a new sampler is built from the tier's
    /// existing random source and installed atomically. If no mass survives
    /// the tier is marked empty and the stale pair is retained.
    ///
    /// This is the only path that mutates the sampler. Returns the addresses
    /// that failed probing, so the caller can invalidate their sessions.
    pub(crate) async fn update_health(
        &self,
        probe_timeout: Duration,
        original_weights: &[f64],
        buffer: &mut Vec<f64>,
    ) -> Vec<String> {
        let snapshot: Vec<ClientEntry> = {
            let state = self.state.read().await;
            state.entries.clone()
        };
        debug_assert_eq!(snapshot.len(), original_weights.len());

        let outcomes = join_all(snapshot.iter().map(|entry| {
            let client = Arc::clone(&entry.client);
            async move {
                match tokio::time::timeout(
                    probe_timeout,
                    client.endpoint_info(PrmEndpointInfo::default()),
                )
                .await
                {
                    Ok(Ok(_)) => true,
                    Ok(Err(err)) => {
                        debug!(address = %client.address(), error = %err, "health probe failed");
                        false
                    }
                    Err(_) => {
                        debug!(address = %client.address(), "health probe timed out");
                        false
                    }
                }
            }
        }))
        .await;

        buffer.clear();
        buffer.resize(snapshot.len(), 0.0);

        let mut failed = Vec::new();
        for (idx, (entry, ok)) in snapshot.iter().zip(outcomes).enumerate() {
            let was_healthy = entry.status.is_healthy();
            if ok {
                buffer[idx] = original_weights[idx];
                entry.status.record_success();
                if !was_healthy {
                    info!(address = %entry.status.address(), "client restored to healthy");
                }
            } else {
                entry.status.record_failure();
                if was_healthy && entry.status.is_unhealthy() {
                    warn!(
                        address = %entry.status.address(),
                        errors = entry.status.error_count(),
                        "client marked unhealthy"
                    );
                }
                failed.push(entry.status.address().to_string());
            }
        }

        let total: f64 = buffer.iter().sum();
        if total <= 0.0 {
            let mut state = self.state.write().await;
            if !state.empty {
                warn!("tier has no healthy clients, marking empty");
                state.empty = true;
            }
            return failed;
        }

        let probabilities: Vec<f64> = buffer.iter().map(|w| w / total).collect();

        let mut state = self.state.write().await;
        if !state.empty && probabilities == state.weights {
            debug!("tier health unchanged, keeping current sampler");
            return failed;
        }

        // Carry the random source over so the draw stream stays sequential
        // across reweights.
        let rng = match state.sampler.take() {
            Some(sampler) => sampler
                .into_inner()
                .unwrap_or_else(|e| e.into_inner())
                .into_rng(),
            None => StdRng::from_entropy(),
        };
        state.sampler = Some(Mutex::new(Sampler::new(&probabilities, rng)));
        state.weights = probabilities;
        state.empty = false;
        state.generation += 1;
        info!(generation = state.generation, "installed reweighted sampler");

        failed
    }

    /// Health snapshot of this tier.
    pub(crate) async fn stats(&self) -> TierStats {
        let state = self.state.read().await;
        TierStats {
            empty: state.empty,
            generation: state.generation,
            nodes: state
                .entries
                .iter()
                .map(|entry| NodeStats {
                    address: entry.status.address().to_string(),
                    healthy: entry.status.is_healthy(),
                    error_count: entry.status.error_count(),
                })
                .collect(),
        }
    }

    /// Replace the installed sampler, keeping clients and weights.
    #[cfg(test)]
    pub(crate) async fn install_sampler(&self, sampler: Sampler<StdRng>) {
        let mut state = self.state.write().await;
        state.sampler = Some(Mutex::new(sampler));
    }
}
