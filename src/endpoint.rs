//! Server endpoint: one network address plus its two role bridges and
//! server metadata (spec §3 "Server endpoint").

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use resp_protocol::Protocol;

use crate::bridge::{Bridge, PushHandler};
use crate::config::Config;
use crate::error::BridgeRole;

/// What this endpoint is known (or believed) to be in the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerRole {
    Unknown,
    Primary,
    Replica,
    Sentinel,
    ClusterNode,
}

impl ServerRole {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ServerRole::Primary,
            2 => ServerRole::Replica,
            3 => ServerRole::Sentinel,
            4 => ServerRole::ClusterNode,
            _ => ServerRole::Unknown,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            ServerRole::Unknown => 0,
            ServerRole::Primary => 1,
            ServerRole::Replica => 2,
            ServerRole::Sentinel => 3,
            ServerRole::ClusterNode => 4,
        }
    }
}

/// Version-derived feature bits (spec §3 "features bitset derived from
/// version"). Only the features this client's dispatch logic consults are
/// modeled; this is deliberately not a full capability matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerFeatures {
    pub resp3: bool,
    pub cluster: bool,
}

impl ServerFeatures {
    pub fn from_version(major: u32) -> Self {
        Self {
            resp3: major >= 6,
            cluster: major >= 3,
        }
    }
}

/// A network address plus its two owned bridges and observed metadata.
/// Owned exclusively by the multiplexer — bridges never outlive their
/// endpoint (spec §3 "Ownership").
pub struct ServerEndpoint {
    pub host: String,
    pub port: u16,
    role: AtomicU8,
    pub version: std::sync::RwLock<Option<(u32, u32, u32)>>,
    pub protocol: std::sync::RwLock<Protocol>,
    pub features: std::sync::RwLock<ServerFeatures>,
    pub tiebreaker: std::sync::RwLock<Option<String>>,
    pub interactive: Arc<Bridge>,
    pub subscription: Arc<Bridge>,
}

impl ServerEndpoint {
    pub fn new(host: impl Into<String>, port: u16, cfg: &Config, push_handler: Option<PushHandler>) -> Arc<Self> {
        let host = host.into();
        let address = format!("{host}:{port}");
        let interactive = Bridge::new(BridgeRole::Interactive, address.clone(), cfg, None);
        let subscription = Bridge::new(BridgeRole::Subscription, address, cfg, push_handler);
        Arc::new(Self {
            host,
            port,
            role: AtomicU8::new(ServerRole::Unknown.to_u8()),
            version: std::sync::RwLock::new(None),
            protocol: std::sync::RwLock::new(Protocol::Resp2),
            features: std::sync::RwLock::new(ServerFeatures::default()),
            tiebreaker: std::sync::RwLock::new(None),
            interactive,
            subscription,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn role(&self) -> ServerRole {
        ServerRole::from_u8(self.role.load(Ordering::Relaxed))
    }

    pub fn set_role(&self, role: ServerRole) {
        self.role.store(role.to_u8(), Ordering::Relaxed);
    }

    pub fn set_version(&self, major: u32, minor: u32, patch: u32) {
        *self.version.write().expect("version lock poisoned") = Some((major, minor, patch));
        *self.features.write().expect("features lock poisoned") = ServerFeatures::from_version(major);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        crate::config::ConfigBuilder::new().endpoint("127.0.0.1", 6379).build().unwrap()
    }

    #[test]
    fn role_starts_unknown_and_is_settable() {
        let ep = ServerEndpoint::new("127.0.0.1", 6379, &cfg(), None);
        assert_eq!(ep.role(), ServerRole::Unknown);
        ep.set_role(ServerRole::Primary);
        assert_eq!(ep.role(), ServerRole::Primary);
    }

    #[test]
    fn version_six_implies_resp3_capable() {
        let ep = ServerEndpoint::new("127.0.0.1", 6379, &cfg(), None);
        ep.set_version(7, 0, 0);
        assert!(ep.features.read().unwrap().resp3);
        ep.set_version(4, 0, 0);
        assert!(!ep.features.read().unwrap().resp3);
        assert!(ep.features.read().unwrap().cluster);
    }

    #[test]
    fn address_formats_host_and_port() {
        let ep = ServerEndpoint::new("10.0.0.1", 7001, &cfg(), None);
        assert_eq!(ep.address(), "10.0.0.1:7001");
    }
}
