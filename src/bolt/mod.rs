// Bolt Adapter
// Connection handling, pooling and value helpers on top of the boltr client

pub mod connection;
pub mod error;
pub mod params;
pub mod path;
pub mod pool;

#[cfg(test)]
pub mod testing;

pub use boltr::error::BoltError;
pub use boltr::types::{BoltDict, BoltNode, BoltPath, BoltRelationship, BoltUnboundRelationship, BoltValue};

pub use connection::{BoltAuth, BoltClient, BoltResult, BoltTarget, TxConfig, DEFAULT_PORT};
pub use error::BoltErrorExt;
pub use params::bolt_parameters;
pub use path::{ResolvedPath, ResolvedSegment};
pub use pool::{BoltConnectionManager, BoltPool};
