//! Chapter progress operations using Diesel, scoped by partner
//!
//! Every write here is monotonic at the SQL level:
//! - status only moves up (`status_rank` guard)
//! - `video_progress_seconds` merges with `MAX`
//! - `video_watched` and `test_passed` merge with `MAX` (sticky true)
//!
//! so concurrent or reordered writers converge on the same row.

use diesel::prelude::*;
use diesel::sql_types::{Bool, Double, Integer, Text};

use super::context::PartnerContext;
use super::diesel_schema::chapter_progress;
use super::models::{current_timestamp, ChapterProgressRow};
use crate::error::LearningError;
use crate::gating::ChapterStatus;

// ============================================================================
// Read Operations
// ============================================================================

/// Get progress for a partner+chapter pair
pub fn get_progress(
    conn: &mut SqliteConnection,
    ctx: &PartnerContext,
    chapter_id: &str,
) -> Result<Option<ChapterProgressRow>, LearningError> {
    chapter_progress::table
        .filter(chapter_progress::partner_id.eq(&ctx.partner_id))
        .filter(chapter_progress::chapter_id.eq(chapter_id))
        .first(conn)
        .optional()
        .map_err(|e| LearningError::Database(format!("Query failed: {}", e)))
}

/// Get all progress rows of a partner within a course
pub fn get_progress_for_course(
    conn: &mut SqliteConnection,
    ctx: &PartnerContext,
    course_id: &str,
) -> Result<Vec<ChapterProgressRow>, LearningError> {
    chapter_progress::table
        .filter(chapter_progress::partner_id.eq(&ctx.partner_id))
        .filter(chapter_progress::course_id.eq(course_id))
        .load(conn)
        .map_err(|e| LearningError::Database(format!("Query failed: {}", e)))
}

// ============================================================================
// Write Operations
// ============================================================================

/// Raise a chapter to at least `target`, creating the row if needed
///
/// Never lowers the status. When `target` is in_progress or higher,
/// `started_at` is stamped if still unset.
pub fn raise_status(
    conn: &mut SqliteConnection,
    ctx: &PartnerContext,
    chapter_id: &str,
    course_id: &str,
    target: ChapterStatus,
) -> Result<(), LearningError> {
    let now = current_timestamp();
    let started_at = (target >= ChapterStatus::InProgress).then(|| now.clone());

    diesel::sql_query(
        r#"
        INSERT INTO chapter_progress (
            partner_id, chapter_id, course_id, status, status_rank,
            video_progress_seconds, video_watched, test_passed,
            started_at, completed_at, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, 0, 0, 0, ?, NULL, ?, ?)
        ON CONFLICT(partner_id, chapter_id) DO UPDATE SET
            status = CASE WHEN chapter_progress.status_rank < excluded.status_rank
                          THEN excluded.status ELSE chapter_progress.status END,
            status_rank = MAX(chapter_progress.status_rank, excluded.status_rank),
            started_at = COALESCE(chapter_progress.started_at, excluded.started_at),
            updated_at = CASE WHEN chapter_progress.status_rank < excluded.status_rank
                              THEN excluded.updated_at ELSE chapter_progress.updated_at END
        "#,
    )
    .bind::<Text, _>(&ctx.partner_id)
    .bind::<Text, _>(chapter_id)
    .bind::<Text, _>(course_id)
    .bind::<Text, _>(target.as_str())
    .bind::<Integer, _>(target.rank())
    .bind::<diesel::sql_types::Nullable<Text>, _>(started_at.as_deref())
    .bind::<Text, _>(&now)
    .bind::<Text, _>(&now)
    .execute(conn)
    .map_err(|e| LearningError::Database(format!("Failed to raise status: {}", e)))?;

    Ok(())
}

/// Merge a playback report into the partner's chapter row
///
/// Creates the row at `initial` status if it does not exist yet.
pub fn merge_video_progress(
    conn: &mut SqliteConnection,
    ctx: &PartnerContext,
    chapter_id: &str,
    course_id: &str,
    initial: ChapterStatus,
    position_seconds: f64,
    watched: bool,
) -> Result<ChapterProgressRow, LearningError> {
    let now = current_timestamp();

    diesel::sql_query(
        r#"
        INSERT INTO chapter_progress (
            partner_id, chapter_id, course_id, status, status_rank,
            video_progress_seconds, video_watched, test_passed,
            started_at, completed_at, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, 0, NULL, NULL, ?, ?)
        ON CONFLICT(partner_id, chapter_id) DO UPDATE SET
            video_progress_seconds = MAX(chapter_progress.video_progress_seconds, excluded.video_progress_seconds),
            video_watched = MAX(chapter_progress.video_watched, excluded.video_watched),
            updated_at = excluded.updated_at
        "#,
    )
    .bind::<Text, _>(&ctx.partner_id)
    .bind::<Text, _>(chapter_id)
    .bind::<Text, _>(course_id)
    .bind::<Text, _>(initial.as_str())
    .bind::<Integer, _>(initial.rank())
    .bind::<Double, _>(position_seconds)
    .bind::<Bool, _>(watched)
    .bind::<Text, _>(&now)
    .bind::<Text, _>(&now)
    .execute(conn)
    .map_err(|e| LearningError::Database(format!("Failed to merge video progress: {}", e)))?;

    get_progress(conn, ctx, chapter_id)?
        .ok_or_else(|| LearningError::Internal("Failed to retrieve merged progress".into()))
}

/// Set the sticky `test_passed` flag, creating the row at `initial` if needed
pub fn mark_test_passed(
    conn: &mut SqliteConnection,
    ctx: &PartnerContext,
    chapter_id: &str,
    course_id: &str,
    initial: ChapterStatus,
) -> Result<(), LearningError> {
    let now = current_timestamp();

    diesel::sql_query(
        r#"
        INSERT INTO chapter_progress (
            partner_id, chapter_id, course_id, status, status_rank,
            video_progress_seconds, video_watched, test_passed,
            started_at, completed_at, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, 0, 0, 1, NULL, NULL, ?, ?)
        ON CONFLICT(partner_id, chapter_id) DO UPDATE SET
            test_passed = 1,
            updated_at = excluded.updated_at
        "#,
    )
    .bind::<Text, _>(&ctx.partner_id)
    .bind::<Text, _>(chapter_id)
    .bind::<Text, _>(course_id)
    .bind::<Text, _>(initial.as_str())
    .bind::<Integer, _>(initial.rank())
    .bind::<Text, _>(&now)
    .bind::<Text, _>(&now)
    .execute(conn)
    .map_err(|e| LearningError::Database(format!("Failed to mark test passed: {}", e)))?;

    Ok(())
}

/// Move a chapter to completed if it is not completed yet
///
/// Returns `true` only for the caller whose update performed the
/// transition; concurrent callers see `false`.
pub fn mark_completed(
    conn: &mut SqliteConnection,
    ctx: &PartnerContext,
    chapter_id: &str,
) -> Result<bool, LearningError> {
    let now = current_timestamp();
    let completed = ChapterStatus::Completed;

    let updated = diesel::sql_query(
        r#"
        UPDATE chapter_progress SET
            status = ?,
            status_rank = ?,
            started_at = COALESCE(started_at, ?),
            completed_at = ?,
            updated_at = ?
        WHERE partner_id = ? AND chapter_id = ? AND status_rank < ?
        "#,
    )
    .bind::<Text, _>(completed.as_str())
    .bind::<Integer, _>(completed.rank())
    .bind::<Text, _>(&now)
    .bind::<Text, _>(&now)
    .bind::<Text, _>(&now)
    .bind::<Text, _>(&ctx.partner_id)
    .bind::<Text, _>(chapter_id)
    .bind::<Integer, _>(completed.rank())
    .execute(conn)
    .map_err(|e| LearningError::Database(format!("Failed to complete chapter: {}", e)))?;

    Ok(updated == 1)
}

/// Materialize an unlocked chapter so it stays unlocked
///
/// No-op when the partner already has a row for the chapter.
pub fn ensure_available(
    conn: &mut SqliteConnection,
    ctx: &PartnerContext,
    chapter_id: &str,
    course_id: &str,
) -> Result<bool, LearningError> {
    let now = current_timestamp();
    let available = ChapterStatus::Available;

    let inserted = diesel::sql_query(
        r#"
        INSERT INTO chapter_progress (
            partner_id, chapter_id, course_id, status, status_rank,
            video_progress_seconds, video_watched, test_passed,
            started_at, completed_at, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, 0, 0, 0, NULL, NULL, ?, ?)
        ON CONFLICT(partner_id, chapter_id) DO NOTHING
        "#,
    )
    .bind::<Text, _>(&ctx.partner_id)
    .bind::<Text, _>(chapter_id)
    .bind::<Text, _>(course_id)
    .bind::<Text, _>(available.as_str())
    .bind::<Integer, _>(available.rank())
    .bind::<Text, _>(&now)
    .bind::<Text, _>(&now)
    .execute(conn)
    .map_err(|e| LearningError::Database(format!("Failed to unlock chapter: {}", e)))?;

    Ok(inserted == 1)
}
