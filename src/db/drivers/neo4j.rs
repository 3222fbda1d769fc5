// Neo4j Driver
// Graph backend over the Bolt client: authentication, query execution,
// record normalization and schema introspection

pub mod auth;
pub mod connection;
pub mod records;
pub mod schema;

pub use auth::{Neo4jAuthenticator, Neo4jDriver};
pub use connection::Neo4jConnectionModule;
pub use records::Neo4jRecordNormalizer;
pub use schema::Neo4jSchemaManager;
