// Database Drivers
// One module per backend: authentication, query execution, normalization and schema

pub mod neo4j;
pub mod postgres;

pub use neo4j::{Neo4jConnectionModule, Neo4jSchemaManager};
pub use postgres::{PostgresConnectionModule, PostgresSchemaManager};
