/// SQLite-backed implementation of the DependencyStore trait
/// Stores task dependencies and workflow node positions with versioned migrations
use crate::config::StorageConfig;
use crate::errors::{StoreError, StoreResult};
use crate::store::{dedupe_dependencies, DependencyRecord, DependencyStore, PositionRecord};
use crate::task::ProjectId;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite-backed dependency store
pub struct SqliteDependencyStore {
    /// Connection pool to SQLite database
    pool: SqlitePool,

    /// Path to the SQLite database file
    db_path: PathBuf,
}

/// Database migration record
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i32,
    pub name: String,
    pub description: Option<String>,
    pub applied_at: i64,
}

impl SqliteDependencyStore {
    /// Open (creating if needed) the database at `db_path`
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    /// * `pool_size` - Maximum number of pooled connections
    pub async fn new<P: AsRef<Path>>(db_path: P, pool_size: u32) -> StoreResult<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::DatabaseError(format!("Failed to create directory: {}", e))
                })?;
            }
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size.max(1))
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(connect_options)
            .await
            .map_err(|e| {
                StoreError::DatabaseError(format!("Failed to create database pool: {}", e))
            })?;

        Ok(SqliteDependencyStore { pool, db_path })
    }

    /// Private in-memory database on a single long-lived connection
    pub async fn in_memory() -> StoreResult<Self> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| {
                StoreError::DatabaseError(format!("Failed to parse database url: {}", e))
            })?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await
            .map_err(|e| {
                StoreError::DatabaseError(format!("Failed to create database pool: {}", e))
            })?;

        Ok(SqliteDependencyStore {
            pool,
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Open the database described by the storage config, migrating when enabled
    pub async fn from_config(config: &StorageConfig) -> StoreResult<Self> {
        let store = Self::new(config.database_path(), config.pool_size).await?;
        if config.auto_migrate {
            store.initialize().await?;
        }
        Ok(store)
    }

    /// Create the schema and apply pending migrations
    pub async fn initialize(&self) -> StoreResult<()> {
        self.apply_migrations().await?;
        info!("Dependency store ready at {:?}", self.db_path);
        Ok(())
    }

    /// Apply all pending migrations
    async fn apply_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS migrations (
                version INTEGER PRIMARY KEY NOT NULL,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                applied_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            StoreError::MigrationError(format!("Failed to create migrations table: {}", e))
        })?;

        let max_version: i32 =
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM migrations")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    StoreError::MigrationError(format!(
                        "Failed to query migration version: {}",
                        e
                    ))
                })?;

        let migrations: Vec<(i32, &str, &str, Vec<&str>)> = vec![
            (
                1,
                "create_task_dependencies",
                "Create task dependency edges table",
                vec![
                    r#"CREATE TABLE IF NOT EXISTS task_dependencies (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        project_id TEXT NOT NULL,
                        source_task_id TEXT NOT NULL,
                        target_task_id TEXT NOT NULL,
                        condition TEXT,
                        created_at INTEGER NOT NULL,
                        UNIQUE(project_id, source_task_id, target_task_id)
                    )"#,
                    r#"CREATE INDEX IF NOT EXISTS idx_task_dependencies_project ON task_dependencies(project_id)"#,
                ],
            ),
            (
                2,
                "create_workflow_node_positions",
                "Create workflow node positions table",
                vec![
                    r#"CREATE TABLE IF NOT EXISTS workflow_node_positions (
                        project_id TEXT NOT NULL,
                        task_id TEXT NOT NULL,
                        position_x REAL NOT NULL,
                        position_y REAL NOT NULL,
                        updated_at INTEGER NOT NULL,
                        PRIMARY KEY (project_id, task_id)
                    )"#,
                ],
            ),
        ];

        for (version, name, desc, statements) in migrations {
            if version > max_version {
                for statement in statements {
                    sqlx::query(statement)
                        .execute(&self.pool)
                        .await
                        .map_err(|e| {
                            StoreError::MigrationError(format!(
                                "Failed to apply migration {}: {}",
                                name, e
                            ))
                        })?;
                }

                let now = Utc::now().timestamp();
                sqlx::query(
                    "INSERT INTO migrations (version, name, description, applied_at) VALUES (?, ?, ?, ?)",
                )
                .bind(version)
                .bind(name)
                .bind(Some(desc))
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    StoreError::MigrationError(format!("Failed to record migration {}: {}", name, e))
                })?;
                debug!("Applied migration {} ({})", version, name);
            }
        }

        Ok(())
    }

    /// Get migration history
    pub async fn migration_history(&self) -> StoreResult<Vec<Migration>> {
        let rows = sqlx::query(
            "SELECT version, name, description, applied_at FROM migrations ORDER BY version ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationError(format!("Failed to fetch migrations: {}", e)))?;

        Ok(rows
            .iter()
            .map(|row| Migration {
                version: row.get("version"),
                name: row.get("name"),
                description: row.get("description"),
                applied_at: row.get("applied_at"),
            })
            .collect())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Get connection pool for advanced operations
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl DependencyStore for SqliteDependencyStore {
    async fn list_dependencies(&self, project_id: &ProjectId) -> StoreResult<Vec<DependencyRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT source_task_id, target_task_id, condition
            FROM task_dependencies
            WHERE project_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(project_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to fetch dependencies: {}", e)))?;

        Ok(rows
            .iter()
            .map(|row| DependencyRecord {
                source_task_id: row.get::<String, _>("source_task_id").into(),
                target_task_id: row.get::<String, _>("target_task_id").into(),
                condition: row.get("condition"),
            })
            .collect())
    }

    async fn replace_dependencies(
        &self,
        project_id: &ProjectId,
        dependencies: &[DependencyRecord],
    ) -> StoreResult<()> {
        let records = dedupe_dependencies(dependencies);
        let now = Utc::now().timestamp();

        let mut tx = self.pool.begin().await.map_err(|e| {
            StoreError::DatabaseError(format!("Failed to start transaction: {}", e))
        })?;

        sqlx::query("DELETE FROM task_dependencies WHERE project_id = ?")
            .bind(project_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                StoreError::DatabaseError(format!("Failed to delete dependencies: {}", e))
            })?;

        for record in &records {
            sqlx::query(
                r#"
                INSERT INTO task_dependencies
                    (project_id, source_task_id, target_task_id, condition, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(project_id.as_str())
            .bind(record.source_task_id.as_str())
            .bind(record.target_task_id.as_str())
            .bind(record.condition.as_deref())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                StoreError::DatabaseError(format!("Failed to insert dependency: {}", e))
            })?;
        }

        tx.commit().await.map_err(|e| {
            StoreError::DatabaseError(format!("Failed to commit transaction: {}", e))
        })?;

        debug!(
            "Replaced dependencies for project {} ({} rows)",
            project_id,
            records.len()
        );
        Ok(())
    }

    async fn list_positions(&self, project_id: &ProjectId) -> StoreResult<Vec<PositionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT task_id, position_x, position_y
            FROM workflow_node_positions
            WHERE project_id = ?
            ORDER BY task_id ASC
            "#,
        )
        .bind(project_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::DatabaseError(format!("Failed to fetch positions: {}", e)))?;

        Ok(rows
            .iter()
            .map(|row| PositionRecord {
                project_id: project_id.clone(),
                task_id: row.get::<String, _>("task_id").into(),
                position_x: row.get("position_x"),
                position_y: row.get("position_y"),
            })
            .collect())
    }

    async fn upsert_positions(&self, positions: &[PositionRecord]) -> StoreResult<()> {
        if positions.is_empty() {
            return Ok(());
        }
        let now = Utc::now().timestamp();

        let mut tx = self.pool.begin().await.map_err(|e| {
            StoreError::DatabaseError(format!("Failed to start transaction: {}", e))
        })?;

        for record in positions {
            sqlx::query(
                r#"
                INSERT INTO workflow_node_positions
                    (project_id, task_id, position_x, position_y, updated_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (project_id, task_id) DO UPDATE SET
                    position_x = excluded.position_x,
                    position_y = excluded.position_y,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(record.project_id.as_str())
            .bind(record.task_id.as_str())
            .bind(record.position_x)
            .bind(record.position_y)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Failed to upsert position: {}", e)))?;
        }

        tx.commit().await.map_err(|e| {
            StoreError::DatabaseError(format!("Failed to commit transaction: {}", e))
        })?;
        Ok(())
    }
}
