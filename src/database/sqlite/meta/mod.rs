//! Schema introspection and dynamic DDL against the relational store.
//!
//! DDL statements cannot carry bound parameters, so table and column names
//! are validated before being spliced into statement text.


use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::{RecsError, Result};

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ColumnInfo {
    pub name: String,
    #[sqlx(rename = "type")]
    pub column_type: String,
    #[sqlx(rename = "notnull")]
    pub not_null: bool,
}

/// Metadata gateway bound to one connection pool. Each operation is a single
/// statement under the store's active isolation; callers own any
/// transactional wrapping and any retry policy.
#[derive(Debug, Clone)]
pub struct SchemaMeta {
    pool: SqlitePool,
}

impl SchemaMeta {
    #[inline]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // Pragma statements are not invalidated by schema changes made on other
    // pooled connections, so they must bypass the statement cache.
    #[inline]
    pub async fn columns_of(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        validate_identifier(table)?;

        let columns = sqlx::query_as::<_, ColumnInfo>(
            r#"SELECT name, type, "notnull" FROM pragma_table_info(?)"#,
        )
        .bind(table)
        .persistent(false)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RecsError::Store(format!("Failed to read columns of {table}: {e}")))?;

        Ok(columns)
    }

    #[inline]
    pub async fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        validate_identifier(table)?;
        validate_identifier(column)?;

        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?",
        )
        .bind(table)
        .bind(column)
        .persistent(false)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RecsError::Store(format!("Failed to check column {table}.{column}: {e}")))?;

        Ok(count == 1)
    }

    #[inline]
    pub async fn add_column(&self, table: &str, column: &str, column_type: &str) -> Result<()> {
        validate_identifier(table)?;
        validate_identifier(column)?;
        validate_type_name(column_type)?;

        debug!("Adding column {}.{} {}", table, column, column_type);

        sqlx::query(&format!(
            "ALTER TABLE {table} ADD COLUMN {column} {column_type}"
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| RecsError::Store(format!("Failed to add column {table}.{column}: {e}")))?;

        Ok(())
    }

    #[inline]
    pub async fn drop_column(&self, table: &str, column: &str) -> Result<()> {
        validate_identifier(table)?;
        validate_identifier(column)?;

        debug!("Dropping column {}.{}", table, column);

        sqlx::query(&format!("ALTER TABLE {table} DROP COLUMN {column}"))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                RecsError::Store(format!("Failed to drop column {table}.{column}: {e}"))
            })?;

        Ok(())
    }

    /// Adds the column unless it already exists. Returns whether it was
    /// added. Unlike an introspect-then-alter sequence, this cannot race
    /// schema changes made through other pooled connections.
    #[inline]
    pub async fn add_column_if_missing(
        &self,
        table: &str,
        column: &str,
        column_type: &str,
    ) -> Result<bool> {
        validate_identifier(table)?;
        validate_identifier(column)?;
        validate_type_name(column_type)?;

        let statement = format!("ALTER TABLE {table} ADD COLUMN {column} {column_type}");
        match sqlx::query(&statement).execute(&self.pool).await {
            Ok(_) => {
                debug!("Added column {}.{} {}", table, column, column_type);
                Ok(true)
            }
            Err(e) if is_duplicate_column(&e) => Ok(false),
            Err(e) => Err(RecsError::Store(format!(
                "Failed to add column {table}.{column}: {e}"
            ))),
        }
    }

    /// Drops the column if it exists. Returns whether it was dropped.
    #[inline]
    pub async fn drop_column_if_exists(&self, table: &str, column: &str) -> Result<bool> {
        validate_identifier(table)?;
        validate_identifier(column)?;

        let statement = format!("ALTER TABLE {table} DROP COLUMN {column}");
        match sqlx::query(&statement).execute(&self.pool).await {
            Ok(_) => {
                debug!("Dropped column {}.{}", table, column);
                Ok(true)
            }
            Err(e) if is_missing_column(&e) => Ok(false),
            Err(e) => Err(RecsError::Store(format!(
                "Failed to drop column {table}.{column}: {e}"
            ))),
        }
    }

    /// Runs a caller-supplied statement and returns the affected row count.
    #[inline]
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        let result = sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| RecsError::Store(format!("Failed to execute statement: {e}")))?;

        Ok(result.rows_affected())
    }
}

fn is_duplicate_column(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .is_some_and(|e| e.message().contains("duplicate column name"))
}

pub(crate) fn is_missing_column(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .is_some_and(|e| e.message().contains("no such column"))
}

pub(crate) fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.chars().next().is_some_and(|c| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(RecsError::Store(format!("Invalid identifier: {name:?}")))
    }
}

fn validate_type_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ');

    if valid {
        Ok(())
    } else {
        Err(RecsError::Store(format!("Invalid column type: {name:?}")))
    }
}
