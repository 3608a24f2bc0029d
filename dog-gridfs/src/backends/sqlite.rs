use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info};

use crate::{
    backend::ChunkBackend, FileId, GridConfig, GridError, GridResult, LogicalName, Namespace,
    StoredFile,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS gridfs_files (
        id TEXT PRIMARY KEY NOT NULL,
        namespace TEXT NOT NULL,
        filename TEXT NOT NULL,
        extension TEXT NOT NULL,
        length INTEGER NOT NULL,
        chunk_size INTEGER NOT NULL,
        chunk_count INTEGER NOT NULL,
        created_at TEXT NOT NULL
    )",
    // the commit point: one name per namespace
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_gridfs_files_name
        ON gridfs_files (namespace, filename)",
    "CREATE TABLE IF NOT EXISTS gridfs_chunks (
        file_id TEXT NOT NULL,
        n INTEGER NOT NULL,
        data BLOB NOT NULL,
        PRIMARY KEY (file_id, n)
    )",
];

#[derive(sqlx::FromRow)]
struct FileRow {
    id: String,
    namespace: String,
    filename: String,
    extension: String,
    length: i64,
    chunk_size: i64,
    chunk_count: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<FileRow> for StoredFile {
    type Error = GridError;

    fn try_from(row: FileRow) -> GridResult<Self> {
        let corrupt = |field: &str| {
            GridError::stream(format!("corrupt metadata for file {}: bad {}", row.id, field))
        };

        Ok(Self {
            namespace: Namespace::new(row.namespace.clone()).map_err(|_| corrupt("namespace"))?,
            logical_name: LogicalName::new(row.filename.clone())
                .map_err(|_| corrupt("filename"))?,
            length: u64::try_from(row.length).map_err(|_| corrupt("length"))?,
            chunk_size: u32::try_from(row.chunk_size).map_err(|_| corrupt("chunk_size"))?,
            chunk_count: u32::try_from(row.chunk_count).map_err(|_| corrupt("chunk_count"))?,
            extension: row.extension,
            created_at: row.created_at,
            id: FileId::from_string(row.id),
        })
    }
}

/// SQLite-backed chunk persistence
#[derive(Clone)]
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
}

impl SqliteBackend {
    /// Open the database named by `config.database_url` and create the schema
    pub async fn connect(config: &GridConfig) -> GridResult<Self> {
        let mut opts = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| GridError::config(format!("invalid database_url: {}", e)))?
            .create_if_missing(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let in_memory = config.is_in_memory();
        if !in_memory {
            opts = opts
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        let pool_opts = SqlitePoolOptions::new().acquire_timeout(config.acquire_timeout);
        let pool_opts = if in_memory {
            // An in-memory database disappears with its last connection, and
            // shared-cache connections would fight over table locks.
            pool_opts
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            pool_opts.max_connections(config.max_connections)
        };

        let pool = pool_opts
            .connect_with(opts)
            .await
            .map_err(|e| GridError::store_unavailable(format!("cannot open database: {}", e)))?;

        let backend = Self { pool };
        backend.migrate().await?;

        info!(in_memory, "SQLite chunk backend ready");
        Ok(backend)
    }

    /// Wrap an existing pool; call [`SqliteBackend::migrate`] before use
    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist yet
    pub async fn migrate(&self) -> GridResult<()> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Close the pool; later operations fail with `StoreUnavailable`
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Sequence numbers stored for a file, ascending
    pub async fn chunk_indices(&self, file_id: &FileId) -> GridResult<Vec<u32>> {
        let rows: Vec<i64> =
            sqlx::query_scalar("SELECT n FROM gridfs_chunks WHERE file_id = ? ORDER BY n")
                .bind(file_id.as_str())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|n| {
                u32::try_from(n)
                    .map_err(|_| GridError::stream(format!("bad chunk index {} for {}", n, file_id)))
            })
            .collect()
    }
}

#[async_trait]
impl ChunkBackend for SqliteBackend {
    async fn put_chunk(&self, file_id: &FileId, n: u32, data: Bytes) -> GridResult<()> {
        sqlx::query("INSERT INTO gridfs_chunks (file_id, n, data) VALUES (?, ?, ?)")
            .bind(file_id.as_str())
            .bind(n as i64)
            .bind(data.as_ref())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_chunk(&self, file_id: &FileId, n: u32) -> GridResult<Option<Bytes>> {
        let data: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT data FROM gridfs_chunks WHERE file_id = ? AND n = ?")
                .bind(file_id.as_str())
                .bind(n as i64)
                .fetch_optional(&self.pool)
                .await?;
        Ok(data.map(Bytes::from))
    }

    async fn discard_chunks(&self, file_id: &FileId) -> GridResult<u64> {
        let result = sqlx::query("DELETE FROM gridfs_chunks WHERE file_id = ?")
            .bind(file_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn commit_file(&self, file: &StoredFile) -> GridResult<()> {
        let result = sqlx::query(
            "INSERT INTO gridfs_files
                (id, namespace, filename, extension, length, chunk_size, chunk_count, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(file.id.as_str())
        .bind(file.namespace.as_str())
        .bind(file.logical_name.as_str())
        .bind(file.extension.as_str())
        .bind(file.length as i64)
        .bind(file.chunk_size as i64)
        .bind(file.chunk_count as i64)
        .bind(file.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(file_id = %file.id, name = %file.logical_name, "File record committed");
                Ok(())
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                GridError::name_collision(file.namespace.as_str(), file.logical_name.as_str()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_file(
        &self,
        namespace: &Namespace,
        name: &LogicalName,
    ) -> GridResult<Option<StoredFile>> {
        let row = sqlx::query_as::<_, FileRow>(
            "SELECT id, namespace, filename, extension, length, chunk_size, chunk_count, created_at
             FROM gridfs_files WHERE namespace = ? AND filename = ?",
        )
        .bind(namespace.as_str())
        .bind(name.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(StoredFile::try_from).transpose()
    }

    async fn health_check(&self) -> GridResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
