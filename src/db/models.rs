//! Diesel row models
//!
//! Field order matches the column order in diesel_schema.rs.

use diesel::prelude::*;
use serde::Serialize;

use super::diesel_schema::*;
use crate::gating::ChapterStatus;

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps as TEXT)
// ============================================================================

/// Current UTC time in the format stored in every timestamp column
pub fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = courses)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CourseRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = courses)]
pub struct NewCourse<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub created_at: &'a str,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = chapters)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ChapterRow {
    pub id: String,
    pub course_id: String,
    pub order_index: i32,
    pub title: String,
    pub content_ref: Option<String>,
    pub video_provider: Option<String>,
    pub video_reference: Option<String>,
    pub video_duration_seconds: Option<f64>,
    pub test_id: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = chapters)]
pub struct NewChapter<'a> {
    pub id: &'a str,
    pub course_id: &'a str,
    pub order_index: i32,
    pub title: &'a str,
    pub content_ref: Option<&'a str>,
    pub video_provider: Option<&'a str>,
    pub video_reference: Option<&'a str>,
    pub video_duration_seconds: Option<f64>,
    pub test_id: Option<&'a str>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = chapter_tests)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ChapterTestRow {
    pub id: String,
    pub chapter_id: String,
    pub passing_score_percent: i32,
    pub max_attempts: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = chapter_tests)]
pub struct NewChapterTest<'a> {
    pub id: &'a str,
    pub chapter_id: &'a str,
    pub passing_score_percent: i32,
    pub max_attempts: i32,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = questions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct QuestionRow {
    pub id: String,
    pub test_id: String,
    pub position: i32,
    pub text: String,
    pub is_multiple: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = questions)]
pub struct NewQuestion<'a> {
    pub id: &'a str,
    pub test_id: &'a str,
    pub position: i32,
    pub text: &'a str,
    pub is_multiple: bool,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = question_options)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct QuestionOptionRow {
    pub question_id: String,
    pub position: i32,
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = question_options)]
pub struct NewQuestionOption<'a> {
    pub question_id: &'a str,
    pub position: i32,
    pub text: &'a str,
    pub is_correct: bool,
}

// ============================================================================
// Partner Progress
// ============================================================================

/// Chapter progress row - one per (partner, chapter), never deleted
#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = chapter_progress)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ChapterProgressRow {
    pub partner_id: String,
    pub chapter_id: String,
    pub course_id: String,
    pub status: String,
    pub status_rank: i32,
    pub video_progress_seconds: f64,
    pub video_watched: bool,
    pub test_passed: bool,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ChapterProgressRow {
    /// Stored status; the rank column is authoritative
    pub fn status(&self) -> ChapterStatus {
        ChapterStatus::from_rank(self.status_rank)
            .or_else(|| self.status.parse().ok())
            .unwrap_or(ChapterStatus::Locked)
    }
}

/// Append-only test attempt row
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = test_attempts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TestAttemptRow {
    pub id: String,
    pub test_id: String,
    pub partner_id: String,
    pub attempt_seq: i32,
    pub answers_json: String,
    pub correct_count: i32,
    pub total_questions: i32,
    pub score_percent: i32,
    pub passed: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = test_attempts)]
pub struct NewTestAttempt<'a> {
    pub id: &'a str,
    pub test_id: &'a str,
    pub partner_id: &'a str,
    pub attempt_seq: i32,
    pub answers_json: &'a str,
    pub correct_count: i32,
    pub total_questions: i32,
    pub score_percent: i32,
    pub passed: bool,
    pub created_at: &'a str,
}

// ============================================================================
// Certificates
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize)]
#[diesel(table_name = certificates)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CertificateRow {
    pub id: String,
    pub partner_id: String,
    pub course_id: String,
    pub certificate_number: String,
    pub sequence: i32,
    pub issued_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = certificates)]
pub struct NewCertificate<'a> {
    pub id: &'a str,
    pub partner_id: &'a str,
    pub course_id: &'a str,
    pub certificate_number: &'a str,
    pub sequence: i32,
    pub issued_at: &'a str,
}
