use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::limit::{Direction, Limit};

/// One of the six accounted resource axes.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum Resource {
    Memory,
    StreamsInbound,
    StreamsOutbound,
    ConnsInbound,
    ConnsOutbound,
    FileDescriptors,
}

impl Resource {
    pub fn stream(dir: Direction) -> Resource {
        match dir {
            Direction::Inbound => Resource::StreamsInbound,
            Direction::Outbound => Resource::StreamsOutbound,
        }
    }
    pub fn conn(dir: Direction) -> Resource {
        match dir {
            Direction::Inbound => Resource::ConnsInbound,
            Direction::Outbound => Resource::ConnsOutbound,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Memory => "memory",
            Resource::StreamsInbound => "inbound streams",
            Resource::StreamsOutbound => "outbound streams",
            Resource::ConnsInbound => "inbound conns",
            Resource::ConnsOutbound => "outbound conns",
            Resource::FileDescriptors => "file descriptors",
        };
        f.write_str(name)
    }
}

/// A single change requested against one axis.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Delta {
    Memory(u64),
    Stream(Direction),
    Conn(Direction),
    Fd(usize),
}

impl Delta {
    pub fn resource(&self) -> Resource {
        match *self {
            Delta::Memory(_) => Resource::Memory,
            Delta::Stream(dir) => Resource::stream(dir),
            Delta::Conn(dir) => Resource::conn(dir),
            Delta::Fd(_) => Resource::FileDescriptors,
        }
    }
    pub fn amount(&self) -> u64 {
        match *self {
            Delta::Memory(size) => size,
            Delta::Stream(_) | Delta::Conn(_) => 1,
            Delta::Fd(n) => n as u64,
        }
    }
}

/// Snapshot of the counters of a scope.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct ScopeStat {
    pub memory: u64,
    pub num_streams_inbound: usize,
    pub num_streams_outbound: usize,
    pub num_conns_inbound: usize,
    pub num_conns_outbound: usize,
    pub num_fd: usize,
}

impl ScopeStat {
    pub fn is_empty(&self) -> bool {
        *self == ScopeStat::default()
    }
    pub(crate) fn add(&mut self, delta: &Delta) {
        self.apply(delta, u64::saturating_add);
    }
    pub(crate) fn sub(&mut self, delta: &Delta) {
        self.apply(delta, u64::saturating_sub);
    }
    fn apply(&mut self, delta: &Delta, f: fn(u64, u64) -> u64) {
        let n = delta.amount();
        let count = |v: usize| f(v as u64, n) as usize;
        match delta.resource() {
            Resource::Memory => self.memory = f(self.memory, n),
            Resource::StreamsInbound => self.num_streams_inbound = count(self.num_streams_inbound),
            Resource::StreamsOutbound => {
                self.num_streams_outbound = count(self.num_streams_outbound)
            }
            Resource::ConnsInbound => self.num_conns_inbound = count(self.num_conns_inbound),
            Resource::ConnsOutbound => self.num_conns_outbound = count(self.num_conns_outbound),
            Resource::FileDescriptors => self.num_fd = count(self.num_fd),
        }
    }
}

/// Why a counter refused a delta.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct Exceeded {
    pub resource: Resource,
    pub current: u64,
    pub requested: u64,
    pub limit: u64,
}

/// The counters owned by a single scope, bounded by that scope's limit.
///
/// Callers serialize access; every `check_*` is side effect free and every
/// reservation either applies fully or leaves the counters untouched.
pub struct Resources {
    limit: Arc<dyn Limit>,
    memory: u64,
    nstreams_in: usize,
    nstreams_out: usize,
    nconns_in: usize,
    nconns_out: usize,
    nfd: usize,
}

impl Resources {
    pub fn new(limit: Arc<dyn Limit>) -> Resources {
        Self {
            limit,
            memory: 0,
            nstreams_in: 0,
            nstreams_out: 0,
            nconns_in: 0,
            nconns_out: 0,
            nfd: 0,
        }
    }
    pub fn limit(&self) -> &Arc<dyn Limit> {
        &self.limit
    }

    pub fn check_memory(&self, size: u64) -> Result<(), Exceeded> {
        let limit = self.limit.memory_limit();
        match self.memory.checked_add(size) {
            Some(v) if v <= limit => Ok(()),
            _ => Err(Exceeded {
                resource: Resource::Memory,
                current: self.memory,
                requested: size,
                limit,
            }),
        }
    }
    pub fn reserve_memory(&mut self, size: u64) -> Result<(), Exceeded> {
        self.check_memory(size)?;
        self.memory += size;
        Ok(())
    }
    pub fn release_memory(&mut self, size: u64) {
        self.memory = match self.memory.checked_sub(size) {
            Some(v) => v,
            None => underflow(Resource::Memory, self.memory, size),
        };
    }

    pub fn check_stream(&self, dir: Direction) -> Result<(), Exceeded> {
        let current = match dir {
            Direction::Inbound => self.nstreams_in,
            Direction::Outbound => self.nstreams_out,
        };
        check_count(
            Resource::stream(dir),
            current,
            1,
            self.limit.stream_limit(dir),
        )
    }
    pub fn add_stream(&mut self, dir: Direction) -> Result<(), Exceeded> {
        self.check_stream(dir)?;
        match dir {
            Direction::Inbound => self.nstreams_in += 1,
            Direction::Outbound => self.nstreams_out += 1,
        }
        Ok(())
    }
    pub fn remove_stream(&mut self, dir: Direction) {
        let counter = match dir {
            Direction::Inbound => &mut self.nstreams_in,
            Direction::Outbound => &mut self.nstreams_out,
        };
        release_count(Resource::stream(dir), counter, 1);
    }

    pub fn check_conn(&self, dir: Direction) -> Result<(), Exceeded> {
        let current = match dir {
            Direction::Inbound => self.nconns_in,
            Direction::Outbound => self.nconns_out,
        };
        check_count(Resource::conn(dir), current, 1, self.limit.conn_limit(dir))
    }
    pub fn add_conn(&mut self, dir: Direction) -> Result<(), Exceeded> {
        self.check_conn(dir)?;
        match dir {
            Direction::Inbound => self.nconns_in += 1,
            Direction::Outbound => self.nconns_out += 1,
        }
        Ok(())
    }
    pub fn remove_conn(&mut self, dir: Direction) {
        let counter = match dir {
            Direction::Inbound => &mut self.nconns_in,
            Direction::Outbound => &mut self.nconns_out,
        };
        release_count(Resource::conn(dir), counter, 1);
    }

    pub fn check_fd(&self, n: usize) -> Result<(), Exceeded> {
        check_count(
            Resource::FileDescriptors,
            self.nfd,
            n,
            self.limit.fd_limit(),
        )
    }
    pub fn add_fd(&mut self, n: usize) -> Result<(), Exceeded> {
        self.check_fd(n)?;
        self.nfd += n;
        Ok(())
    }
    pub fn remove_fd(&mut self, n: usize) {
        release_count(Resource::FileDescriptors, &mut self.nfd, n);
    }

    pub fn check(&self, delta: &Delta) -> Result<(), Exceeded> {
        match *delta {
            Delta::Memory(size) => self.check_memory(size),
            Delta::Stream(dir) => self.check_stream(dir),
            Delta::Conn(dir) => self.check_conn(dir),
            Delta::Fd(n) => self.check_fd(n),
        }
    }
    pub fn reserve(&mut self, delta: &Delta) -> Result<(), Exceeded> {
        match *delta {
            Delta::Memory(size) => self.reserve_memory(size),
            Delta::Stream(dir) => self.add_stream(dir),
            Delta::Conn(dir) => self.add_conn(dir),
            Delta::Fd(n) => self.add_fd(n),
        }
    }
    /// Apply a delta that was already checked under the same lock.
    pub fn commit(&mut self, delta: &Delta) {
        match *delta {
            Delta::Memory(size) => self.memory += size,
            Delta::Stream(Direction::Inbound) => self.nstreams_in += 1,
            Delta::Stream(Direction::Outbound) => self.nstreams_out += 1,
            Delta::Conn(Direction::Inbound) => self.nconns_in += 1,
            Delta::Conn(Direction::Outbound) => self.nconns_out += 1,
            Delta::Fd(n) => self.nfd += n,
        }
    }
    pub fn release(&mut self, delta: &Delta) {
        match *delta {
            Delta::Memory(size) => self.release_memory(size),
            Delta::Stream(dir) => self.remove_stream(dir),
            Delta::Conn(dir) => self.remove_conn(dir),
            Delta::Fd(n) => self.remove_fd(n),
        }
    }

    /// Subtract everything a child scope held, used when the child ends.
    pub fn release_stat(&mut self, stat: &ScopeStat) {
        self.release_memory(stat.memory);
        release_count(
            Resource::StreamsInbound,
            &mut self.nstreams_in,
            stat.num_streams_inbound,
        );
        release_count(
            Resource::StreamsOutbound,
            &mut self.nstreams_out,
            stat.num_streams_outbound,
        );
        release_count(
            Resource::ConnsInbound,
            &mut self.nconns_in,
            stat.num_conns_inbound,
        );
        release_count(
            Resource::ConnsOutbound,
            &mut self.nconns_out,
            stat.num_conns_outbound,
        );
        release_count(Resource::FileDescriptors, &mut self.nfd, stat.num_fd);
    }

    pub fn stat(&self) -> ScopeStat {
        ScopeStat {
            memory: self.memory,
            num_streams_inbound: self.nstreams_in,
            num_streams_outbound: self.nstreams_out,
            num_conns_inbound: self.nconns_in,
            num_conns_outbound: self.nconns_out,
            num_fd: self.nfd,
        }
    }
    pub fn reset(&mut self) {
        self.memory = 0;
        self.nstreams_in = 0;
        self.nstreams_out = 0;
        self.nconns_in = 0;
        self.nconns_out = 0;
        self.nfd = 0;
    }
}

fn check_count(resource: Resource, current: usize, n: usize, limit: usize) -> Result<(), Exceeded> {
    match current.checked_add(n) {
        Some(v) if v <= limit => Ok(()),
        _ => Err(Exceeded {
            resource,
            current: current as u64,
            requested: n as u64,
            limit: limit as u64,
        }),
    }
}

fn release_count(resource: Resource, counter: &mut usize, n: usize) {
    *counter = match counter.checked_sub(n) {
        Some(v) => v,
        None => underflow(resource, *counter as u64, n as u64) as usize,
    };
}

/// Releasing more than was reserved is a caller bug: the counter clamps to zero.
fn underflow(resource: Resource, current: u64, n: u64) -> u64 {
    log::error!("release underflow resource={resource},current={current},release={n}");
    debug_assert!(
        false,
        "released {n} {resource} with only {current} reserved"
    );
    0
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::{Delta, Resource, Resources, ScopeStat};
    use crate::limit::{Direction, StaticLimit};

    fn one_of_each() -> Resources {
        Resources::new(Arc::new(StaticLimit {
            memory: 4096,
            streams_inbound: 1,
            streams_outbound: 1,
            conns_inbound: 1,
            conns_outbound: 1,
            fd: 1,
        }))
    }

    #[test]
    fn test_memory() {
        let mut rc = one_of_each();
        assert_eq!(rc.stat(), ScopeStat::default());

        assert!(rc.check_memory(1024).is_ok());
        assert!(rc.check_memory(4096).is_ok());
        assert!(rc.check_memory(8192).is_err());

        rc.reserve_memory(1024).unwrap();
        assert_eq!(rc.stat().memory, 1024);
        rc.reserve_memory(1024).unwrap();
        assert_eq!(rc.stat().memory, 2048);

        let err = rc.reserve_memory(4096).unwrap_err();
        assert_eq!(err.resource, Resource::Memory);
        assert_eq!(err.current, 2048);
        assert_eq!(err.limit, 4096);
        assert_eq!(rc.stat().memory, 2048);

        rc.release_memory(1024);
        assert_eq!(rc.stat().memory, 1024);
        rc.reserve_memory(2048).unwrap();
        assert_eq!(rc.stat().memory, 3072);
        rc.release_memory(3072);
        assert!(rc.stat().is_empty());
    }

    #[test]
    fn test_memory_overflow_is_denied() {
        let mut rc = one_of_each();
        rc.reserve_memory(1).unwrap();
        assert!(rc.reserve_memory(u64::MAX).is_err());
        assert_eq!(rc.stat().memory, 1);
    }

    #[test]
    fn test_discrete_slots() {
        let mut rc = one_of_each();
        for dir in [Direction::Inbound, Direction::Outbound] {
            rc.add_stream(dir).unwrap();
            assert_eq!(
                rc.add_stream(dir).unwrap_err().resource,
                Resource::stream(dir)
            );
            rc.remove_stream(dir);
            assert!(rc.stat().is_empty());

            rc.add_conn(dir).unwrap();
            assert_eq!(rc.add_conn(dir).unwrap_err().resource, Resource::conn(dir));
            rc.remove_conn(dir);
            assert!(rc.stat().is_empty());
        }

        rc.add_fd(1).unwrap();
        assert!(rc.add_fd(1).is_err());
        assert_eq!(rc.stat().num_fd, 1);
        rc.remove_fd(1);
        assert!(rc.stat().is_empty());
    }

    #[test]
    fn test_fd_all_or_nothing() {
        let mut rc = Resources::new(Arc::new(StaticLimit::default().set_fd(3)));
        rc.add_fd(2).unwrap();
        let err = rc.add_fd(2).unwrap_err();
        assert_eq!(err.requested, 2);
        assert_eq!(rc.stat().num_fd, 2);
        rc.add_fd(1).unwrap();
        assert_eq!(rc.stat().num_fd, 3);
    }

    #[test]
    fn test_zero_limit_disables_axis() {
        let mut rc = Resources::new(Arc::new(StaticLimit::default().set_conns(1, 1)));
        assert!(rc.reserve(&Delta::Stream(Direction::Inbound)).is_err());
        assert!(rc.reserve(&Delta::Stream(Direction::Outbound)).is_err());
        assert!(rc.reserve(&Delta::Memory(1)).is_err());
        rc.reserve(&Delta::Conn(Direction::Inbound)).unwrap();
        assert_eq!(rc.stat().num_conns_inbound, 1);
    }

    #[test]
    fn test_release_stat() {
        let mut rc = one_of_each();
        rc.reserve(&Delta::Memory(100)).unwrap();
        rc.reserve(&Delta::Stream(Direction::Outbound)).unwrap();
        rc.reserve(&Delta::Fd(1)).unwrap();
        let stat = rc.stat();
        rc.release_stat(&stat);
        assert!(rc.stat().is_empty());
    }

    #[test]
    fn test_stat_tracks_deltas() {
        let mut stat = ScopeStat::default();
        stat.add(&Delta::Memory(512));
        stat.add(&Delta::Conn(Direction::Outbound));
        stat.add(&Delta::Fd(2));
        assert_eq!(
            stat,
            ScopeStat {
                memory: 512,
                num_conns_outbound: 1,
                num_fd: 2,
                ..Default::default()
            }
        );
        stat.sub(&Delta::Fd(3));
        stat.sub(&Delta::Memory(512));
        stat.sub(&Delta::Conn(Direction::Outbound));
        assert!(stat.is_empty());
    }
}
