//! SQLite schema for the progression engine
//!
//! Catalog tables are written only by catalog import. Partner tables are
//! keyed by partner so contention stays per (partner, chapter/test/course).

use diesel::connection::SimpleConnection;
use diesel::SqliteConnection;
use tracing::debug;

use crate::error::LearningError;

/// Bump when the DDL changes
pub const SCHEMA_VERSION: i32 = 1;

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS courses (
    id TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chapters (
    id TEXT PRIMARY KEY NOT NULL,
    course_id TEXT NOT NULL REFERENCES courses(id),
    order_index INTEGER NOT NULL,
    title TEXT NOT NULL,
    content_ref TEXT,
    video_provider TEXT,
    video_reference TEXT,
    video_duration_seconds REAL,
    test_id TEXT,
    UNIQUE (course_id, order_index)
);

CREATE TABLE IF NOT EXISTS chapter_tests (
    id TEXT PRIMARY KEY NOT NULL,
    chapter_id TEXT NOT NULL UNIQUE REFERENCES chapters(id),
    passing_score_percent INTEGER NOT NULL CHECK (passing_score_percent BETWEEN 0 AND 100),
    max_attempts INTEGER NOT NULL CHECK (max_attempts >= 1)
);

CREATE TABLE IF NOT EXISTS questions (
    id TEXT PRIMARY KEY NOT NULL,
    test_id TEXT NOT NULL REFERENCES chapter_tests(id),
    position INTEGER NOT NULL,
    text TEXT NOT NULL,
    is_multiple INTEGER NOT NULL DEFAULT 0,
    UNIQUE (test_id, position)
);

CREATE TABLE IF NOT EXISTS question_options (
    question_id TEXT NOT NULL REFERENCES questions(id),
    position INTEGER NOT NULL,
    text TEXT NOT NULL,
    is_correct INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (question_id, position)
);

CREATE TABLE IF NOT EXISTS chapter_progress (
    partner_id TEXT NOT NULL,
    chapter_id TEXT NOT NULL REFERENCES chapters(id),
    course_id TEXT NOT NULL,
    status TEXT NOT NULL,
    status_rank INTEGER NOT NULL,
    video_progress_seconds REAL NOT NULL DEFAULT 0,
    video_watched INTEGER NOT NULL DEFAULT 0,
    test_passed INTEGER NOT NULL DEFAULT 0,
    started_at TEXT,
    completed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (partner_id, chapter_id)
);

CREATE INDEX IF NOT EXISTS idx_chapter_progress_course
    ON chapter_progress(partner_id, course_id);

CREATE TABLE IF NOT EXISTS test_attempts (
    id TEXT PRIMARY KEY NOT NULL,
    test_id TEXT NOT NULL REFERENCES chapter_tests(id),
    partner_id TEXT NOT NULL,
    attempt_seq INTEGER NOT NULL,
    answers_json TEXT NOT NULL,
    correct_count INTEGER NOT NULL,
    total_questions INTEGER NOT NULL,
    score_percent INTEGER NOT NULL,
    passed INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (partner_id, test_id, attempt_seq)
);

CREATE TABLE IF NOT EXISTS certificates (
    id TEXT PRIMARY KEY NOT NULL,
    partner_id TEXT NOT NULL,
    course_id TEXT NOT NULL REFERENCES courses(id),
    certificate_number TEXT NOT NULL UNIQUE,
    sequence INTEGER NOT NULL,
    issued_at TEXT NOT NULL,
    UNIQUE (partner_id, course_id)
);

CREATE TABLE IF NOT EXISTS certificate_sequences (
    course_id TEXT PRIMARY KEY NOT NULL,
    last_value INTEGER NOT NULL
);
"#;

/// Create all tables and indexes if they do not exist
pub fn init_schema(conn: &mut SqliteConnection) -> Result<(), LearningError> {
    conn.batch_execute(DDL)
        .map_err(|e| LearningError::Database(format!("Failed to initialize schema: {}", e)))?;
    conn.batch_execute(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))
        .map_err(|e| LearningError::Database(format!("Failed to set schema version: {}", e)))?;

    debug!(version = SCHEMA_VERSION, "Schema initialized");
    Ok(())
}
