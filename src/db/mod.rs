// Database Module
// Backend-agnostic query layer: connection modules, record normalization
// and schema introspection for Neo4j and PostgreSQL

pub mod drivers;
pub mod pool;
pub mod query;
pub mod record;
pub mod registry;
pub mod traits;
pub mod types;

// ============================================================================
// Backend Contracts
// ============================================================================

pub use traits::{
    Authenticator, ConnectionModule, DatabaseError, DatabaseType, RecordNormalizer, SchemaManager,
};

// ============================================================================
// Configuration and Results
// ============================================================================

pub use query::{
    FieldInfo, QueryFailure, QueryOutcome, QueryRequest, QuerySuccess, RawRow, RawValue, ResultRows,
    ResultSchema,
};
pub use record::{Duration, Fields, Node, Path, PathSegment, Point, Record, Relationship, Value};
pub use types::{
    AccessMode, AuthConfig, AuthType, ColumnDef, ConnectionConfig, DatabaseSchema, PropertyDef,
    QueryParams, QueryStatus, TableDef,
};

// ============================================================================
// Backends
// ============================================================================

pub use drivers::{Neo4jConnectionModule, Neo4jSchemaManager, PostgresConnectionModule, PostgresSchemaManager};
pub use registry::{
    connection_name, create_connection_module, create_schema_manager, supported_types, ConnectionRegistry,
};
