// Connection Registry
// Maps backend tags to connection module and schema manager constructors

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::db::drivers::{Neo4jConnectionModule, Neo4jSchemaManager, PostgresConnectionModule, PostgresSchemaManager};
use crate::db::traits::{ConnectionModule, DatabaseError, DatabaseType, SchemaManager};
use crate::db::types::AuthConfig;

pub type ModuleConstructor = fn(Option<&AuthConfig>) -> Result<Arc<dyn ConnectionModule>, DatabaseError>;
pub type SchemaConstructor = fn() -> Arc<dyn SchemaManager>;

#[derive(Clone, Copy)]
struct Registration {
    module: ModuleConstructor,
    schema: SchemaConstructor,
}

/// Registry of the backends a caller can select by tag
pub struct ConnectionRegistry {
    backends: HashMap<DatabaseType, Registration>,
}

impl ConnectionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// Registry with every built-in backend
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            DatabaseType::Neo4j,
            |config| Ok(Arc::new(Neo4jConnectionModule::new(config)?)),
            || Arc::new(Neo4jSchemaManager::default()),
        );
        registry.register(
            DatabaseType::Postgresql,
            |config| Ok(Arc::new(PostgresConnectionModule::new(config)?)),
            || Arc::new(PostgresSchemaManager),
        );
        registry
    }

    pub fn register(&mut self, db_type: DatabaseType, module: ModuleConstructor, schema: SchemaConstructor) {
        self.backends.insert(db_type, Registration { module, schema });
        tracing::debug!(backend = %db_type, "Registered backend");
    }

    pub fn unregister(&mut self, db_type: DatabaseType) {
        if self.backends.remove(&db_type).is_some() {
            tracing::debug!(backend = %db_type, "Unregistered backend");
        }
    }

    pub fn has_type(&self, db_type: DatabaseType) -> bool {
        self.backends.contains_key(&db_type)
    }

    /// Registered types, in declaration order
    pub fn supported_types(&self) -> Vec<DatabaseType> {
        DatabaseType::ALL
            .into_iter()
            .filter(|db_type| self.has_type(*db_type))
            .collect()
    }

    fn lookup(&self, tag: &str) -> Result<Registration, DatabaseError> {
        DatabaseType::from_tag(tag)
            .and_then(|db_type| self.backends.get(&db_type).copied())
            .ok_or_else(|| DatabaseError::UnsupportedType(tag.to_string()))
    }

    /// Build the connection module for `tag`. Needs a running Tokio runtime.
    pub fn create_connection_module(
        &self,
        tag: &str,
        config: Option<&AuthConfig>,
    ) -> Result<Arc<dyn ConnectionModule>, DatabaseError> {
        (self.lookup(tag)?.module)(config)
    }

    pub fn create_schema_manager(&self, tag: &str) -> Result<Arc<dyn SchemaManager>, DatabaseError> {
        Ok((self.lookup(tag)?.schema)())
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn default_registry() -> &'static ConnectionRegistry {
    static REGISTRY: OnceLock<ConnectionRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ConnectionRegistry::with_defaults)
}

/// Connection module for a backend tag such as `"neo4j"` or `"postgresql"`.
pub fn create_connection_module(
    tag: &str,
    config: Option<&AuthConfig>,
) -> Result<Arc<dyn ConnectionModule>, DatabaseError> {
    default_registry().create_connection_module(tag, config)
}

pub fn create_schema_manager(tag: &str) -> Result<Arc<dyn SchemaManager>, DatabaseError> {
    default_registry().create_schema_manager(tag)
}

/// Human-readable backend name, `"Unknown"` for unrecognized tags.
pub fn connection_name(tag: &str) -> &'static str {
    DatabaseType::from_tag(tag)
        .map(|db_type| db_type.display_name())
        .unwrap_or("Unknown")
}

pub fn supported_types() -> Vec<&'static str> {
    default_registry()
        .supported_types()
        .into_iter()
        .map(|db_type| db_type.tag())
        .collect()
}
