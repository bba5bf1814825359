//! Server-selection strategy: topology modes, hash-slot routing, and
//! `MOVED`/`ASK` redirect handling (spec §4.E).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use resp_protocol::{MessageFlags, RedisKey};

use crate::endpoint::{ServerEndpoint, ServerRole};
use crate::error::RedisError;
use crate::hashslot::slot_for_key;

/// How the multiplexer's endpoint table is organized and routed
/// (spec §4.E "Topology modes").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Standalone,
    PrimaryReplica,
    Sentinel,
    Cluster,
}

/// Cluster slot -> endpoint address mapping, rebuilt from `CLUSTER NODES`
/// and patched incrementally by `MOVED` redirects.
#[derive(Default)]
struct SlotTable {
    owners: HashMap<u16, String>,
}

impl SlotTable {
    fn owner_of(&self, slot: u16) -> Option<&str> {
        self.owners.get(&slot).map(String::as_str)
    }

    fn set(&mut self, slot: u16, address: String) {
        self.owners.insert(slot, address);
    }

    fn rebuild_from_ranges(&mut self, ranges: &[(String, Vec<(u16, u16)>)]) {
        self.owners.clear();
        for (address, slots) in ranges {
            for &(lo, hi) in slots {
                for slot in lo..=hi {
                    self.owners.insert(slot, address.clone());
                }
            }
        }
    }
}

/// The selection strategy: owns the topology mode, the slot table (cluster
/// only), and the insertion-ordered endpoint table.
pub struct SelectionStrategy {
    topology: RwLock<Topology>,
    endpoints: RwLock<Vec<Arc<ServerEndpoint>>>,
    slots: RwLock<SlotTable>,
    connect_retry: u32,
}

/// Where to send a message: a concrete endpoint, optionally preceded by
/// `ASKING` on the same bridge (spec §4.E "On `-ASK`").
pub struct Selection {
    pub endpoint: Arc<ServerEndpoint>,
    pub asking: bool,
}

impl SelectionStrategy {
    pub fn new(topology: Topology, connect_retry: u32) -> Self {
        Self {
            topology: RwLock::new(topology),
            endpoints: RwLock::new(Vec::new()),
            slots: RwLock::new(SlotTable::default()),
            connect_retry,
        }
    }

    pub fn topology(&self) -> Topology {
        *self.topology.read().expect("topology lock poisoned")
    }

    pub fn set_topology(&self, t: Topology) {
        *self.topology.write().expect("topology lock poisoned") = t;
    }

    /// Publish a new endpoint table snapshot (copy-on-write per spec §5
    /// "Shared state": readers never lock, writers replace the whole Vec).
    pub fn publish_endpoints(&self, endpoints: Vec<Arc<ServerEndpoint>>) {
        *self.endpoints.write().expect("endpoints lock poisoned") = endpoints;
    }

    pub fn endpoints_snapshot(&self) -> Vec<Arc<ServerEndpoint>> {
        self.endpoints.read().expect("endpoints lock poisoned").clone()
    }

    pub fn rebuild_slot_table(&self, ranges: &[(String, Vec<(u16, u16)>)]) {
        self.slots.write().expect("slots lock poisoned").rebuild_from_ranges(ranges);
    }

    fn find_by_address(&self, address: &str) -> Option<Arc<ServerEndpoint>> {
        self.endpoints_snapshot().into_iter().find(|e| e.address() == address)
    }

    /// Look up `address` in the endpoint table, or build and insert a new
    /// endpoint for it via `make` if it isn't there yet (spec §4.E "On
    /// `-ASK`": the redirect target may be a node the client has never
    /// talked to). Atomic under the table's write lock so two concurrent
    /// redirects to the same new address don't race into two endpoints.
    pub fn resolve_or_insert(&self, address: &str, make: impl FnOnce() -> Arc<ServerEndpoint>) -> Arc<ServerEndpoint> {
        let mut endpoints = self.endpoints.write().expect("endpoints lock poisoned");
        if let Some(existing) = endpoints.iter().find(|e| e.address() == address) {
            return existing.clone();
        }
        let endpoint = make();
        endpoints.push(endpoint.clone());
        endpoint
    }

    /// Reject multi-key operations whose keys don't share a slot, before any
    /// network I/O (spec §4.E "Multi-key operations", §8 "Cluster safety").
    pub fn check_cross_slot(&self, keys: &[RedisKey]) -> Result<(), RedisError> {
        if self.topology() != Topology::Cluster || keys.len() < 2 {
            return Ok(());
        }
        let first = slot_for_key(&keys[0]);
        if keys.iter().any(|k| slot_for_key(k) != first) {
            return Err(RedisError::CrossSlot { detail: None });
        }
        Ok(())
    }

    /// Pick an endpoint for a command touching `key` (or no key, e.g.
    /// `PING`), honoring the flags that bias primary/replica selection.
    pub fn select(&self, key: Option<&RedisKey>, flags: MessageFlags) -> Result<Selection, RedisError> {
        match self.topology() {
            Topology::Standalone => self.select_single(flags),
            Topology::PrimaryReplica | Topology::Sentinel => self.select_primary_replica(flags),
            Topology::Cluster => self.select_cluster(key, flags),
        }
    }

    fn select_single(&self, flags: MessageFlags) -> Result<Selection, RedisError> {
        let endpoints = self.endpoints_snapshot();
        let endpoint = if flags.demand_replica || flags.prefer_replica {
            endpoints
                .iter()
                .find(|e| e.role() == ServerRole::Replica)
                .or_else(|| endpoints.first())
        } else {
            endpoints.first()
        };
        endpoint
            .cloned()
            .map(|endpoint| Selection { endpoint, asking: false })
            .ok_or(RedisError::ConnectionUnavailable { detail: None })
    }

    fn select_primary_replica(&self, flags: MessageFlags) -> Result<Selection, RedisError> {
        let endpoints = self.endpoints_snapshot();
        let primary = endpoints.iter().find(|e| e.role() == ServerRole::Primary);
        let replica = endpoints.iter().find(|e| e.role() == ServerRole::Replica);

        let chosen = if flags.demand_replica {
            replica
        } else if flags.demand_primary {
            primary
        } else if flags.prefer_replica {
            replica.or(primary)
        } else {
            primary.or(replica)
        };
        chosen
            .cloned()
            .map(|endpoint| Selection { endpoint, asking: false })
            .ok_or(RedisError::ConnectionUnavailable { detail: None })
    }

    fn select_cluster(&self, key: Option<&RedisKey>, _flags: MessageFlags) -> Result<Selection, RedisError> {
        let endpoints = self.endpoints_snapshot();
        let Some(key) = key else {
            return endpoints
                .first()
                .cloned()
                .map(|endpoint| Selection { endpoint, asking: false })
                .ok_or(RedisError::ConnectionUnavailable { detail: None });
        };
        let slot = slot_for_key(key);
        let owner_address = self.slots.read().expect("slots lock poisoned").owner_of(slot).map(str::to_owned);
        let endpoint = match owner_address {
            Some(addr) => self.find_by_address(&addr),
            None => None,
        }
        .or_else(|| endpoints.first().cloned());
        endpoint
            .map(|endpoint| Selection { endpoint, asking: false })
            .ok_or(RedisError::ConnectionUnavailable { detail: None })
    }

    /// Apply a `-MOVED slot host:port` redirect: update the slot table,
    /// creating the endpoint if it's new (the caller supplies the endpoint
    /// once it's been constructed, since that requires an async connect).
    pub fn apply_moved(&self, slot: u16, address: String) {
        self.slots.write().expect("slots lock poisoned").set(slot, address);
    }

    pub fn connect_retry_limit(&self) -> u32 {
        self.connect_retry
    }
}

/// Bounds redirect-following to `ConnectRetry` attempts per message, so a
/// buggy or flapping cluster can't loop forever (spec §4.E "monotonic
/// counter prevents loops").
pub struct RedirectBudget {
    remaining: u32,
}

impl RedirectBudget {
    pub fn new(limit: u32) -> Self {
        Self { remaining: limit }
    }

    pub fn take(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}
