// dashquery
// Query layer for dashboard backends: one interface over Neo4j (Bolt) and PostgreSQL

pub mod bolt;
pub mod db;

pub use db::{
    connection_name, create_connection_module, create_schema_manager, supported_types, AuthConfig,
    ConnectionConfig, ConnectionModule, DatabaseError, QueryOutcome, QueryParams, QueryRequest, QueryStatus,
    SchemaManager,
};
