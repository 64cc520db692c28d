//! SQLite database module for catalog structure and partner progress
//!
//! ## Tables
//!
//! - `courses`, `chapters`, `chapter_tests`, `questions`, `question_options` -
//!   immutable course catalog (written only by catalog import)
//! - `chapter_progress` - per (partner, chapter) progress facts
//! - `test_attempts` - append-only scored submissions
//! - `certificates`, `certificate_sequences` - issued certificates and
//!   per-course number sequences
//!
//! ## Concurrency
//!
//! Connections come from an r2d2 pool. Each connection gets a busy timeout
//! so writers queue on SQLite's lock instead of failing immediately, and
//! the database runs in WAL mode so readers do not block writers.

pub mod schema;
pub mod diesel_schema;
pub mod models;
pub mod context;
pub mod catalog;
pub mod progress;
pub mod attempts;
pub mod certificates;

use std::path::Path;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use tracing::info;

use crate::error::LearningError;
use diesel_schema::{certificates as certificates_table, chapter_progress, courses, test_attempts};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type PooledConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Per-connection PRAGMAs applied when the pool hands out a connection
#[derive(Debug, Clone, Copy)]
struct ConnectionPragmas {
    busy_timeout_ms: u64,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionPragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON; PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Pool settings
#[derive(Debug, Clone, Copy)]
pub struct DbOptions {
    pub pool_size: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            pool_size: 8,
            busy_timeout_ms: 5000,
        }
    }
}

/// SQLite database for the learning engine
pub struct LearningDb {
    pool: DbPool,
}

impl LearningDb {
    /// Open or create the database file and initialize the schema
    pub fn open(db_path: &Path, options: DbOptions) -> Result<Self, LearningError> {
        info!("Opening SQLite database at {:?}", db_path);

        let manager = ConnectionManager::<SqliteConnection>::new(db_path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(options.pool_size)
            .connection_timeout(Duration::from_secs(30))
            .connection_customizer(Box::new(ConnectionPragmas {
                busy_timeout_ms: options.busy_timeout_ms,
            }))
            .build(manager)
            .map_err(|e| LearningError::Database(format!("Failed to build pool: {}", e)))?;

        let db = Self { pool };

        db.with_conn(|conn| {
            // Enable WAL mode for concurrent readers; persists in the file
            conn.batch_execute("PRAGMA journal_mode = WAL;")
                .map_err(|e| LearningError::Database(format!("Failed to set PRAGMA: {}", e)))?;
            schema::init_schema(conn)
        })?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<PooledConn, LearningError> {
        self.pool
            .get()
            .map_err(|e| LearningError::Database(format!("Failed to get connection: {}", e)))
    }

    /// Run a closure with a pooled connection
    ///
    /// The connection returns to the pool when the closure finishes, so
    /// callers must not re-enter `with_conn` from inside it.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, LearningError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, LearningError>,
    {
        let mut conn = self.conn()?;
        f(&mut conn)
    }

    /// Run a closure inside `BEGIN IMMEDIATE`
    ///
    /// Takes the database write lock up front, so read-check-write
    /// sequences in the closure are serialized against every other writer.
    pub fn with_write_txn<F, T>(&self, f: F) -> Result<T, LearningError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, LearningError>,
    {
        let mut conn = self.conn()?;
        conn.immediate_transaction(f)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, LearningError> {
        self.with_conn(|conn| {
            let course_count: i64 = courses::table
                .count()
                .get_result(conn)
                .map_err(|e| LearningError::Database(format!("Query failed: {}", e)))?;

            let progress_count: i64 = chapter_progress::table
                .count()
                .get_result(conn)
                .map_err(|e| LearningError::Database(format!("Query failed: {}", e)))?;

            let attempt_count: i64 = test_attempts::table
                .count()
                .get_result(conn)
                .map_err(|e| LearningError::Database(format!("Query failed: {}", e)))?;

            let certificate_count: i64 = certificates_table::table
                .count()
                .get_result(conn)
                .map_err(|e| LearningError::Database(format!("Query failed: {}", e)))?;

            Ok(DbStats {
                course_count: course_count as u64,
                progress_count: progress_count as u64,
                attempt_count: attempt_count as u64,
                certificate_count: certificate_count as u64,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub course_count: u64,
    pub progress_count: u64,
    pub attempt_count: u64,
    pub certificate_count: u64,
}

// Re-exports
pub use context::PartnerContext;
pub use models::{CertificateRow, ChapterProgressRow, TestAttemptRow};
