use crate::config::DatabaseSection;
use crate::error::AppError;
use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{OptsBuilder, Pool};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::info;

/// One row of the status table: `(percent, inches, liters, YYYYmmddHHMMSS)`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRow {
    pub percent: f64,
    pub inches: f64,
    pub volume_liters: i64,
    pub recorded_at: String,
}

#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn insert(&self, row: &StatusRow) -> Result<(), AppError>;

    /// Releases connections on shutdown.
    async fn close(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Status table in a MySQL database.
pub struct MySqlStatusStore {
    pool: Pool,
    insert_sql: String,
}

impl MySqlStatusStore {
    pub fn new(
        section: &DatabaseSection,
        password: Option<String>,
    ) -> Result<Self, AppError> {
        let table = section.table();
        if !is_identifier(table) {
            return Err(AppError::Database(format!("invalid table name: {table:?}")));
        }
        let opts = OptsBuilder::default()
            .ip_or_hostname(section.host.clone())
            .tcp_port(section.port())
            .user(Some(section.user.clone()))
            .pass(password)
            .db_name(Some(section.database.clone()));
        info!(
            host = %section.host,
            database = %section.database,
            table,
            "Status database configured"
        );
        Ok(Self {
            pool: Pool::new(opts),
            insert_sql: insert_statement(table),
        })
    }

}

impl fmt::Debug for MySqlStatusStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlStatusStore")
            .field("insert_sql", &self.insert_sql)
            .finish()
    }
}

#[async_trait]
impl StatusStore for MySqlStatusStore {
    async fn insert(&self, row: &StatusRow) -> Result<(), AppError> {
        let mut conn = self
            .pool
            .get_conn()
            .await
            .map_err(|err| AppError::Database(err.to_string()))?;
        conn.exec_drop(
            self.insert_sql.as_str(),
            (
                row.percent,
                row.inches,
                row.volume_liters,
                row.recorded_at.clone(),
            ),
        )
        .await
        .map_err(|err| AppError::Database(err.to_string()))
    }

    async fn close(&self) -> Result<(), AppError> {
        self.pool
            .clone()
            .disconnect()
            .await
            .map_err(|err| AppError::Database(err.to_string()))
    }
}

fn insert_statement(table: &str) -> String {
    format!("INSERT INTO `{table}` VALUES (?, ?, ?, ?)")
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// In-memory status table; clones share rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryStatusStore {
    rows: Arc<Mutex<Vec<StatusRow>>>,
    fail: bool,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            rows: Arc::default(),
            fail: true,
        }
    }

    pub fn rows(&self) -> Vec<StatusRow> {
        match self.rows.lock() {
            Ok(rows) => rows.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn insert(&self, row: &StatusRow) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::Database("memory store rejects rows".to_string()));
        }
        let mut rows = self.rows.lock().map_err(|_| AppError::StateLock)?;
        rows.push(row.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_statement_quotes_table() {
        assert_eq!(
            insert_statement("Status"),
            "INSERT INTO `Status` VALUES (?, ?, ?, ?)"
        );
    }

    #[test]
    fn table_names_are_plain_identifiers() {
        assert!(is_identifier("Status_1p5K"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("Status; DROP TABLE x"));
        assert!(!is_identifier("a`b"));
    }

    #[test]
    fn store_rejects_bad_table_name() {
        let section = DatabaseSection {
            host: "localhost".to_string(),
            port: None,
            user: "monitor".to_string(),
            database: "squid".to_string(),
            table: Some("bad name".to_string()),
            password_file: None,
        };

        let result = MySqlStatusStore::new(&section, None);

        assert!(matches!(result, Err(AppError::Database(_))));
    }

    #[tokio::test]
    async fn memory_store_keeps_rows() -> Result<(), AppError> {
        let store = MemoryStatusStore::new();
        let row = StatusRow {
            percent: 45.3,
            inches: 13.38,
            volume_liters: 24,
            recorded_at: "20240301170509".to_string(),
        };

        store.insert(&row).await?;

        assert_eq!(store.rows(), vec![row]);
        Ok(())
    }
}
