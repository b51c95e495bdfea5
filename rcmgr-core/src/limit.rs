use serde::{Deserialize, Serialize};

/// Direction of a stream or connection, relative to the local host.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// The ceilings a scope enforces on each resource axis.
///
/// Implementations must answer deterministically for the whole lifetime of
/// the scope they are attached to. A ceiling of 0 disables the axis.
pub trait Limit: Send + Sync {
    fn memory_limit(&self) -> u64;
    fn stream_limit(&self, dir: Direction) -> usize;
    fn conn_limit(&self, dir: Direction) -> usize;
    fn fd_limit(&self) -> usize;
}

/// A fixed set of ceilings.
///
/// # Examples
///
/// ```rust
/// use rust_p2p_rcmgr_core::limit::{Direction, Limit, StaticLimit};
///
/// let limit = StaticLimit::default()
///     .set_memory(4096)
///     .set_streams(1, 1)
///     .set_fd(1);
/// assert_eq!(limit.memory_limit(), 4096);
/// assert_eq!(limit.stream_limit(Direction::Inbound), 1);
/// assert_eq!(limit.conn_limit(Direction::Outbound), 0);
/// ```
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticLimit {
    pub memory: u64,
    pub streams_inbound: usize,
    pub streams_outbound: usize,
    pub conns_inbound: usize,
    pub conns_outbound: usize,
    pub fd: usize,
}

impl StaticLimit {
    pub fn set_memory(mut self, memory: u64) -> Self {
        self.memory = memory;
        self
    }
    pub fn set_streams(mut self, inbound: usize, outbound: usize) -> Self {
        self.streams_inbound = inbound;
        self.streams_outbound = outbound;
        self
    }
    pub fn set_conns(mut self, inbound: usize, outbound: usize) -> Self {
        self.conns_inbound = inbound;
        self.conns_outbound = outbound;
        self
    }
    pub fn set_fd(mut self, fd: usize) -> Self {
        self.fd = fd;
        self
    }
}

impl Limit for StaticLimit {
    fn memory_limit(&self) -> u64 {
        self.memory
    }
    fn stream_limit(&self, dir: Direction) -> usize {
        match dir {
            Direction::Inbound => self.streams_inbound,
            Direction::Outbound => self.streams_outbound,
        }
    }
    fn conn_limit(&self, dir: Direction) -> usize {
        match dir {
            Direction::Inbound => self.conns_inbound,
            Direction::Outbound => self.conns_outbound,
        }
    }
    fn fd_limit(&self) -> usize {
        self.fd
    }
}

#[cfg(test)]
mod test {
    use super::{Direction, Limit, StaticLimit};

    #[test]
    fn test_default_grants_nothing() {
        let limit = StaticLimit::default();
        assert_eq!(limit.memory_limit(), 0);
        assert_eq!(limit.stream_limit(Direction::Inbound), 0);
        assert_eq!(limit.stream_limit(Direction::Outbound), 0);
        assert_eq!(limit.conn_limit(Direction::Inbound), 0);
        assert_eq!(limit.conn_limit(Direction::Outbound), 0);
        assert_eq!(limit.fd_limit(), 0);
    }

    #[test]
    fn test_partial_json() {
        let limit: StaticLimit =
            serde_json::from_str(r#"{"memory":4096,"conns_inbound":2}"#).unwrap();
        assert_eq!(limit, StaticLimit::default().set_memory(4096).set_conns(2, 0));
    }
}
