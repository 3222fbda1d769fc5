// Shared Types
// Credentials, per-query execution policy, query status and schema snapshots

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::db::traits::{DatabaseError, DatabaseType};

/// How a driver authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthType {
    Native,
    SingleSignOn,
    Empty,
}

/// Credentials and location of a database
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthConfig {
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub auth_type: Option<AuthType>,
    pub uri: Option<String>,
}

impl AuthConfig {
    /// Username/password credentials for `uri`.
    pub fn native(uri: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            auth_type: Some(AuthType::Native),
            uri: Some(uri.into()),
        }
    }

    /// Validated URI. Only meaningful after [`check_config`] passed.
    pub fn uri(&self) -> &str {
        self.uri.as_deref().unwrap_or_default()
    }
}

/// Validate an auth config, failing on the first missing piece.
pub fn check_config(config: Option<&AuthConfig>) -> Result<&AuthConfig, DatabaseError> {
    let config = config.ok_or_else(|| DatabaseError::InvalidConfig("Connection config is required".to_string()))?;
    match config.auth_type {
        None => {
            return Err(DatabaseError::InvalidConfig(
                "Authentication type is required".to_string(),
            ))
        }
        Some(AuthType::Empty) => {
            return Err(DatabaseError::InvalidConfig(
                "Authentication type is Empty. Please provide a username and password".to_string(),
            ))
        }
        Some(_) => {}
    }
    if config.uri.is_none() {
        return Err(DatabaseError::InvalidConfig("URI is required".to_string()));
    }
    Ok(config)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessMode {
    #[default]
    Read,
    Write,
}

/// Per-query execution policy. Never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionConfig {
    pub access_mode: AccessMode,
    /// Statement timeout in milliseconds
    pub timeout: u64,
    /// Transaction timeout in milliseconds
    pub connection_timeout: u64,
    pub database: Option<String>,
    pub row_limit: usize,
    #[serde(alias = "parseToNeodashRecord")]
    pub parse_to_record: bool,
    pub use_node_props_as_fields: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            access_mode: AccessMode::Read,
            timeout: 30_000,
            connection_timeout: 30_000,
            database: None,
            row_limit: 5_000,
            parse_to_record: true,
            use_node_props_as_fields: false,
        }
    }
}

/// Query text plus its parameters.
///
/// Graph queries use named parameters. Relational queries use the keys
/// `"0"`, `"1"`, ... for the positional placeholders `$1`, `$2`, ...
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<IndexMap<String, serde_json::Value>>,
}

impl QueryParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params
            .get_or_insert_with(IndexMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn is_blank(&self) -> bool {
        self.query.trim().is_empty()
    }
}

/// Query status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryStatus {
    NoQuery,
    NoData,
    NoDrawableData,
    Waiting,
    Running,
    TimedOut,
    Complete,
    CompleteTruncated,
    Error,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStatus::NoQuery => "NO_QUERY",
            QueryStatus::NoData => "NO_DATA",
            QueryStatus::NoDrawableData => "NO_DRAWABLE_DATA",
            QueryStatus::Waiting => "WAITING",
            QueryStatus::Running => "RUNNING",
            QueryStatus::TimedOut => "TIMED_OUT",
            QueryStatus::Complete => "COMPLETE",
            QueryStatus::CompleteTruncated => "COMPLETE_TRUNCATED",
            QueryStatus::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, QueryStatus::Waiting | QueryStatus::Running)
    }
}

impl std::fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Schema snapshots
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    #[serde(rename = "type")]
    pub property_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

/// Point-in-time structural description of one database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSchema {
    #[serde(rename = "type")]
    pub database_type: DatabaseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_properties: Option<IndexMap<String, Vec<PropertyDef>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel_properties: Option<IndexMap<String, Vec<PropertyDef>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<Vec<TableDef>>,
}

impl DatabaseSchema {
    pub fn graph(
        labels: Vec<String>,
        relationship_types: Vec<String>,
        node_properties: IndexMap<String, Vec<PropertyDef>>,
        rel_properties: IndexMap<String, Vec<PropertyDef>>,
    ) -> Self {
        Self {
            database_type: DatabaseType::Neo4j,
            labels: Some(labels),
            relationship_types: Some(relationship_types),
            node_properties: Some(node_properties),
            rel_properties: Some(rel_properties),
            tables: None,
        }
    }

    pub fn relational(tables: Vec<TableDef>) -> Self {
        Self {
            database_type: DatabaseType::Postgresql,
            labels: None,
            relationship_types: None,
            node_properties: None,
            rel_properties: None,
            tables: Some(tables),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(result: Result<&AuthConfig, DatabaseError>) -> String {
        result.unwrap_err().to_string()
    }

    #[test]
    fn test_check_config_order() {
        assert_eq!(message(check_config(None)), "Connection config is required");

        let mut config = AuthConfig::default();
        assert_eq!(message(check_config(Some(&config))), "Authentication type is required");

        config.auth_type = Some(AuthType::Empty);
        assert_eq!(
            message(check_config(Some(&config))),
            "Authentication type is Empty. Please provide a username and password"
        );

        config.auth_type = Some(AuthType::Native);
        assert_eq!(message(check_config(Some(&config))), "URI is required");

        config.uri = Some("bolt://localhost:7687".to_string());
        assert!(check_config(Some(&config)).is_ok());
    }

    #[test]
    fn test_connection_config_defaults() {
        let config: ConnectionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ConnectionConfig::default());
        assert_eq!(config.access_mode, AccessMode::Read);
        assert_eq!(config.row_limit, 5000);
        assert!(config.parse_to_record);

        let config: ConnectionConfig =
            serde_json::from_str(r#"{"accessMode":"WRITE","rowLimit":1,"parseToNeodashRecord":false}"#).unwrap();
        assert_eq!(config.access_mode, AccessMode::Write);
        assert_eq!(config.row_limit, 1);
        assert!(!config.parse_to_record);
    }

    #[test]
    fn test_password_is_not_serialized() {
        let config = AuthConfig::native("bolt://localhost", "neo4j", "secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains(r#""authType":"NATIVE""#));
    }

    #[test]
    fn test_status_names() {
        assert_eq!(QueryStatus::CompleteTruncated.to_string(), "COMPLETE_TRUNCATED");
        assert_eq!(
            serde_json::to_string(&QueryStatus::NoQuery).unwrap(),
            r#""NO_QUERY""#
        );
        assert!(!QueryStatus::Running.is_terminal());
        assert!(QueryStatus::TimedOut.is_terminal());
    }

    #[test]
    fn test_empty_graph_schema_has_every_field() {
        let schema = DatabaseSchema::graph(vec![], vec![], IndexMap::new(), IndexMap::new());
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "neo4j",
                "labels": [],
                "relationshipTypes": [],
                "nodeProperties": {},
                "relProperties": {}
            })
        );
    }
}
