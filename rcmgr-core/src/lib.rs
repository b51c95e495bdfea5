//! # rcmgr-core - Scope DAG and Resource Counters
//!
//! `rcmgr-core` tracks and bounds memory, stream, connection and file
//! descriptor usage across a directed acyclic graph of accounting scopes
//! (system → transient → peer → connection → stream, or any other shape). It
//! is the engine behind the higher-level `rustp2p-rcmgr` resource manager.
//!
//! ## Features
//!
//! - **Atomic reservations**: a delta is checked against a scope and every
//!   ancestor, then applied to all of them or to none
//! - **Diamond-safe**: an ancestor reachable along several paths is counted once
//! - **Transactions**: short-lived child scopes whose teardown releases
//!   everything reserved through them and closes any nested transactions
//! - **Exact teardown**: ending a scope closes everything beneath it and
//!   releases only what those scopes reserved, so other branches of a
//!   diamond keep their counts
//! - **Deadlock free**: locks over a closure are always taken in scope id order
//!
//! ## Modules
//!
//! - [`limit`] - Ceilings per resource axis
//! - [`resources`] - The counters owned by one scope
//! - [`scope`] - Scopes, closures, transactions
//! - [`error`] - Error types
//!
//! ## Quick Start
//!
//! ```rust
//! use rust_p2p_rcmgr_core::limit::{Direction, StaticLimit};
//! use rust_p2p_rcmgr_core::scope::ResourceScope;
//!
//! # fn main() -> rust_p2p_rcmgr_core::error::Result<()> {
//! let system = ResourceScope::new_root(StaticLimit::default().set_memory(1 << 20).set_conns(4, 4));
//! let conn = ResourceScope::new(StaticLimit::default().set_memory(4096).set_conns(1, 1), &[system.clone()])?;
//! conn.add_conn(Direction::Outbound)?;
//!
//! // bound the memory a handshake may use
//! let handshake = conn.begin_transaction()?;
//! handshake.reserve_memory(2048)?;
//! assert_eq!(system.stat().memory, 2048);
//!
//! handshake.done();
//! assert_eq!(system.stat().memory, 0);
//! assert_eq!(system.stat().num_conns_outbound, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! Every operation is synchronous and never blocks on I/O. Reservations over
//! disjoint closures run in parallel; reservations sharing an ancestor are
//! serialized on that ancestor.

pub mod error;
pub mod limit;
pub mod resources;
pub mod scope;

pub use error::{Error, Result};
pub use limit::{Direction, Limit, StaticLimit};
pub use resources::{Delta, Resource, ScopeStat};
pub use scope::{ResourceScope, ResourceScopeSpan, ScopeBuilder};
