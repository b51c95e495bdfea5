use serde::{Deserialize, Serialize};

pub use rust_p2p_rcmgr_core::limit::{Limit, StaticLimit};

pub(crate) const MIB: u64 = 1 << 20;
pub(crate) const GIB: u64 = 1 << 30;

pub(crate) const SYSTEM_SCOPE_NAME: &str = "system";
pub(crate) const TRANSIENT_SCOPE_NAME: &str = "transient";

/// Limits for every level of the scope hierarchy.
///
/// Every connection and stream is accounted against its own scope, its peer
/// (or the transient scope while the peer is unknown) and the system scope.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceManagerConfig {
    pub system: StaticLimit,
    pub transient: StaticLimit,
    pub peer: StaticLimit,
    pub conn: StaticLimit,
    pub stream: StaticLimit,
}

impl Default for ResourceManagerConfig {
    fn default() -> Self {
        Self {
            system: StaticLimit {
                memory: GIB,
                streams_inbound: 4096,
                streams_outbound: 16384,
                conns_inbound: 256,
                conns_outbound: 1024,
                fd: 512,
            },
            transient: StaticLimit {
                memory: 128 * MIB,
                streams_inbound: 128,
                streams_outbound: 512,
                conns_inbound: 32,
                conns_outbound: 128,
                fd: 128,
            },
            peer: StaticLimit {
                memory: 64 * MIB,
                streams_inbound: 256,
                streams_outbound: 512,
                conns_inbound: 8,
                conns_outbound: 16,
                fd: 8,
            },
            conn: StaticLimit {
                memory: 32 * MIB,
                streams_inbound: 0,
                streams_outbound: 0,
                conns_inbound: 1,
                conns_outbound: 1,
                fd: 1,
            },
            stream: StaticLimit {
                memory: 16 * MIB,
                streams_inbound: 1,
                streams_outbound: 1,
                conns_inbound: 0,
                conns_outbound: 0,
                fd: 0,
            },
        }
    }
}

impl ResourceManagerConfig {
    /// No capacity at any level.
    pub fn empty() -> Self {
        Self {
            system: StaticLimit::default(),
            transient: StaticLimit::default(),
            peer: StaticLimit::default(),
            conn: StaticLimit::default(),
            stream: StaticLimit::default(),
        }
    }
    pub fn set_system_limit(mut self, limit: StaticLimit) -> Self {
        self.system = limit;
        self
    }
    pub fn set_transient_limit(mut self, limit: StaticLimit) -> Self {
        self.transient = limit;
        self
    }
    pub fn set_peer_limit(mut self, limit: StaticLimit) -> Self {
        self.peer = limit;
        self
    }
    pub fn set_conn_limit(mut self, limit: StaticLimit) -> Self {
        self.conn = limit;
        self
    }
    pub fn set_stream_limit(mut self, limit: StaticLimit) -> Self {
        self.stream = limit;
        self
    }
}
