// PostgreSQL Schema Manager
// Base tables of the public schema with their columns, in declaration order

use indexmap::IndexMap;

use crate::db::traits::{Authenticator, DatabaseError, DatabaseType, SchemaManager};
use crate::db::types::{AuthConfig, ColumnDef, DatabaseSchema, TableDef};

use super::auth::PostgresAuthenticator;

const COLUMNS_QUERY: &str = r#"
    SELECT
        c.table_name::text,
        c.column_name::text,
        c.data_type::text,
        c.is_nullable::text
    FROM information_schema.columns c
    JOIN information_schema.tables t
        ON t.table_schema = c.table_schema
        AND t.table_name = c.table_name
    WHERE c.table_schema = 'public'
        AND t.table_type = 'BASE TABLE'
    ORDER BY c.table_name, c.ordinal_position
"#;

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresSchemaManager;

/// Group `(table, column, type, is_nullable)` rows by table, keeping row order.
fn group_columns<'a>(rows: impl IntoIterator<Item = (&'a str, &'a str, &'a str, &'a str)>) -> Vec<TableDef> {
    let mut tables: IndexMap<&str, Vec<ColumnDef>> = IndexMap::new();
    for (table, column, data_type, is_nullable) in rows {
        tables.entry(table).or_default().push(ColumnDef {
            name: column.to_string(),
            column_type: data_type.to_string(),
            nullable: is_nullable == "YES",
        });
    }
    tables
        .into_iter()
        .map(|(name, columns)| TableDef {
            name: name.to_string(),
            columns,
        })
        .collect()
}

#[async_trait::async_trait]
impl SchemaManager for PostgresSchemaManager {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgresql
    }

    async fn fetch_schema(&self, config: &AuthConfig) -> Result<DatabaseSchema, DatabaseError> {
        let auth = PostgresAuthenticator::new(Some(config))?;
        let fetched = async {
            let pool = auth.driver().await?;
            let client = pool.get().await?;
            let rows = client.query(COLUMNS_QUERY, &[]).await?;
            rows.iter()
                .map(|row| -> Result<_, DatabaseError> {
                    Ok((
                        row.try_get::<_, String>(0)?,
                        row.try_get::<_, String>(1)?,
                        row.try_get::<_, String>(2)?,
                        row.try_get::<_, String>(3)?,
                    ))
                })
                .collect::<Result<Vec<_>, DatabaseError>>()
        }
        .await;
        auth.close().await;

        let rows = fetched?;
        let tables = group_columns(
            rows.iter()
                .map(|(t, c, ty, n)| (t.as_str(), c.as_str(), ty.as_str(), n.as_str())),
        );
        tracing::debug!(tables = tables.len(), "Fetched PostgreSQL schema");
        Ok(DatabaseSchema::relational(tables))
    }
}
