// Neo4j Schema Manager
// Labels, relationship types and their property types, fetched in parallel

use indexmap::IndexMap;

use crate::bolt::{BoltDict, BoltValue};
use crate::db::query::RawResult;
use crate::db::traits::{Authenticator, DatabaseError, DatabaseType, SchemaManager};
use crate::db::types::{AccessMode, AuthConfig, ConnectionConfig, DatabaseSchema, PropertyDef};

use super::connection::Neo4jConnectionModule;

const LABELS_QUERY: &str = "CALL db.labels() YIELD label RETURN label";
const REL_TYPES_QUERY: &str = "CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType";
const NODE_PROPERTIES_QUERY: &str = r#"
    CALL db.schema.nodeTypeProperties()
    YIELD nodeType, propertyName, propertyTypes
    RETURN nodeType, propertyName, propertyTypes
"#;
const REL_PROPERTIES_QUERY: &str = r#"
    CALL db.schema.relTypeProperties()
    YIELD relType, propertyName, propertyTypes
    RETURN relType, propertyName, propertyTypes
"#;

#[derive(Debug, Clone, Default)]
pub struct Neo4jSchemaManager {
    /// Target database; the server default when `None`
    pub database: Option<String>,
}

impl Neo4jSchemaManager {
    pub fn new(database: Option<String>) -> Self {
        Self { database }
    }
}

/// Strip the leading namespace colon and backtick quoting from a type name.
fn clean_type_name(raw: &str) -> String {
    raw.strip_prefix(':').unwrap_or(raw).replace('`', "")
}

fn names(result: &RawResult<BoltValue>) -> Vec<String> {
    result
        .rows
        .iter()
        .filter_map(|row| row.first().and_then(BoltValue::as_str))
        .map(str::to_string)
        .collect()
}

/// Rows of `(owner, propertyName, propertyTypes)` grouped by owner.
fn properties(result: &RawResult<BoltValue>) -> IndexMap<String, Vec<PropertyDef>> {
    let mut grouped: IndexMap<String, Vec<PropertyDef>> = IndexMap::new();
    for row in &result.rows {
        let Some(owner) = row.first().and_then(BoltValue::as_str) else {
            continue;
        };
        let entry = grouped.entry(clean_type_name(owner)).or_default();
        // Types with no properties still get an (empty) entry
        let Some(name) = row.get(1).and_then(BoltValue::as_str) else {
            continue;
        };
        let property_type = match row.get(2) {
            Some(BoltValue::List(types)) => types.first().and_then(BoltValue::as_str),
            _ => None,
        }
        .unwrap_or("Unknown");
        entry.push(PropertyDef {
            name: name.to_string(),
            property_type: property_type.to_string(),
        });
    }
    grouped
}

#[async_trait::async_trait]
impl SchemaManager for Neo4jSchemaManager {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Neo4j
    }

    async fn fetch_schema(&self, config: &AuthConfig) -> Result<DatabaseSchema, DatabaseError> {
        let module = Neo4jConnectionModule::new(Some(config))?;
        let read = ConnectionConfig {
            access_mode: AccessMode::Read,
            database: self.database.clone(),
            ..ConnectionConfig::default()
        };

        let fetched = tokio::try_join!(
            module.execute(LABELS_QUERY, BoltDict::new(), &read),
            module.execute(REL_TYPES_QUERY, BoltDict::new(), &read),
            module.execute(NODE_PROPERTIES_QUERY, BoltDict::new(), &read),
            module.execute(REL_PROPERTIES_QUERY, BoltDict::new(), &read),
        );
        if let Ok(driver) = module.authenticator().driver().await {
            driver.close();
        }
        let (labels, rel_types, node_props, rel_props) = fetched?;

        let schema = DatabaseSchema::graph(
            names(&labels).iter().map(|l| clean_type_name(l)).collect(),
            names(&rel_types).iter().map(|t| clean_type_name(t)).collect(),
            properties(&node_props),
            properties(&rel_props),
        );
        tracing::debug!(
            labels = schema.labels.as_ref().map_or(0, Vec::len),
            relationship_types = schema.relationship_types.as_ref().map_or(0, Vec::len),
            "Fetched Neo4j schema"
        );
        Ok(schema)
    }
}
