use thiserror::Error;

use crate::resources::Resource;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("resource limit exceeded in scope {scope}: {resource} is {current}, requested {requested}, limit is {limit}")]
    ResourceLimitExceeded {
        scope: String,
        resource: Resource,
        current: u64,
        requested: u64,
        limit: u64,
    },
    #[error("resource scope closed: {0}")]
    ScopeClosed(String),
    #[error("invalid parent graph: {0}")]
    InvalidParentGraph(String),
}

impl Error {
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Error::ResourceLimitExceeded { .. })
    }
    pub fn is_scope_closed(&self) -> bool {
        matches!(self, Error::ScopeClosed(_))
    }
}

pub type Result<T, E = Error> = ::std::result::Result<T, E>;
