//! Test attempt log using Diesel, scoped by partner
//!
//! Rows are append-only. `attempt_seq` is 1-based and unique per
//! (partner, test), which backs the attempt limit at the storage level.

use diesel::prelude::*;
use uuid::Uuid;

use super::context::PartnerContext;
use super::diesel_schema::test_attempts;
use super::models::{current_timestamp, NewTestAttempt, TestAttemptRow};
use crate::error::LearningError;

/// Scored submission ready to be appended
#[derive(Debug, Clone)]
pub struct AttemptRecord<'a> {
    pub test_id: &'a str,
    pub answers_json: &'a str,
    pub correct_count: u32,
    pub total_questions: u32,
    pub score_percent: u32,
    pub passed: bool,
}

// ============================================================================
// Read Operations
// ============================================================================

/// Number of attempts the partner has used on a test
pub fn count_attempts(
    conn: &mut SqliteConnection,
    ctx: &PartnerContext,
    test_id: &str,
) -> Result<i64, LearningError> {
    test_attempts::table
        .filter(test_attempts::partner_id.eq(&ctx.partner_id))
        .filter(test_attempts::test_id.eq(test_id))
        .count()
        .get_result(conn)
        .map_err(|e| LearningError::Database(format!("Count query failed: {}", e)))
}

/// All attempts on a test, oldest first
pub fn list_attempts(
    conn: &mut SqliteConnection,
    ctx: &PartnerContext,
    test_id: &str,
) -> Result<Vec<TestAttemptRow>, LearningError> {
    test_attempts::table
        .filter(test_attempts::partner_id.eq(&ctx.partner_id))
        .filter(test_attempts::test_id.eq(test_id))
        .order(test_attempts::attempt_seq.asc())
        .load(conn)
        .map_err(|e| LearningError::Database(format!("Query failed: {}", e)))
}

/// Latest passing attempt, if the partner passed
pub fn last_passed_attempt(
    conn: &mut SqliteConnection,
    ctx: &PartnerContext,
    test_id: &str,
) -> Result<Option<TestAttemptRow>, LearningError> {
    test_attempts::table
        .filter(test_attempts::partner_id.eq(&ctx.partner_id))
        .filter(test_attempts::test_id.eq(test_id))
        .filter(test_attempts::passed.eq(true))
        .order(test_attempts::attempt_seq.desc())
        .first(conn)
        .optional()
        .map_err(|e| LearningError::Database(format!("Query failed: {}", e)))
}

// ============================================================================
// Write Operations
// ============================================================================

/// Append an attempt with the given sequence number
///
/// Call inside a write transaction after checking the limit; the unique
/// index rejects a second row with the same sequence.
pub fn insert_attempt(
    conn: &mut SqliteConnection,
    ctx: &PartnerContext,
    attempt_seq: i32,
    record: &AttemptRecord<'_>,
) -> Result<TestAttemptRow, LearningError> {
    let id = Uuid::new_v4().to_string();
    let now = current_timestamp();

    diesel::insert_into(test_attempts::table)
        .values(&NewTestAttempt {
            id: &id,
            test_id: record.test_id,
            partner_id: &ctx.partner_id,
            attempt_seq,
            answers_json: record.answers_json,
            correct_count: record.correct_count as i32,
            total_questions: record.total_questions as i32,
            score_percent: record.score_percent as i32,
            passed: record.passed,
            created_at: &now,
        })
        .execute(conn)
        .map_err(|e| LearningError::Database(format!("Attempt insert failed: {}", e)))?;

    test_attempts::table
        .filter(test_attempts::id.eq(&id))
        .first(conn)
        .map_err(|e| LearningError::Database(format!("Failed to retrieve attempt: {}", e)))
}
