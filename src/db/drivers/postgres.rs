// PostgreSQL Driver
// Relational backend over a bb8 pool of tokio-postgres clients

pub mod auth;
pub mod connection;
pub mod params;
pub mod records;
pub mod schema;

pub use auth::{PostgresAuthenticator, PostgresPool};
pub use connection::PostgresConnectionModule;
pub use records::{PgValue, PostgresRecordNormalizer};
pub use schema::PostgresSchemaManager;
