//! # rustp2p-rcmgr - Resource Manager for Peer-to-Peer Hosts
//!
//! `rustp2p-rcmgr` bounds the memory, streams, connections and file
//! descriptors a host spends on its peers. Transports and multiplexers ask it
//! for a scope before accepting or dialing a connection and before opening a
//! stream; a denied request surfaces as an error, never as a crash.
//!
//! ## Scope Hierarchy
//!
//! ```text
//! system
//! ├── transient ── conn (peer not known yet)
//! └── peer:<id>
//!     ├── conn ── handshake transaction
//!     └── stream
//! ```
//!
//! Connection and stream scopes also name `system` as a direct parent. Their
//! usage is still counted only once there.
//!
//! ## Quick Start
//!
//! ```rust
//! use rustp2p_rcmgr::{Direction, ResourceManager, ResourceManagerConfig};
//!
//! # fn main() -> rustp2p_rcmgr::Result<()> {
//! let rcmgr = ResourceManager::<u32>::new(ResourceManagerConfig::default())?;
//!
//! let conn = rcmgr.open_connection(Some(&1), Direction::Outbound, true)?;
//! {
//!     let handshake = conn.begin_transaction()?;
//!     handshake.reserve_memory(4096)?;
//!     // handshake memory is released when the transaction drops
//! }
//! let stream = rcmgr.open_stream(&1, Direction::Outbound)?;
//! assert_eq!(rcmgr.stat().num_streams_outbound, 1);
//!
//! drop(stream);
//! drop(conn);
//! assert!(rcmgr.stat().is_empty());
//! assert_eq!(rcmgr.gc(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! [`ResourceManagerConfig`] carries one [`StaticLimit`] per level and can be
//! deserialized with serde. A ceiling of 0 disables an axis, which is how
//! connection scopes refuse streams and stream scopes refuse connections.

pub mod config;
pub mod manager;

pub use config::ResourceManagerConfig;
pub use manager::{ConnectionScope, ResourceManager, StreamScope};
pub use rust_p2p_rcmgr_core::error::{Error, Result};
pub use rust_p2p_rcmgr_core::limit::{Direction, Limit, StaticLimit};
pub use rust_p2p_rcmgr_core::resources::{Resource, ScopeStat};
pub use rust_p2p_rcmgr_core::scope::{ResourceScope, ResourceScopeSpan, ScopeBuilder};
