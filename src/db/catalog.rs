//! Course catalog queries using Diesel
//!
//! Read operations serve the catalog adapter. The only write is
//! `insert_course_tree`, used by catalog import.

use diesel::prelude::*;

use super::diesel_schema::{chapter_tests, chapters, courses, question_options, questions};
use super::models::{
    current_timestamp, ChapterRow, ChapterTestRow, CourseRow, NewChapter, NewChapterTest,
    NewCourse, NewQuestion, NewQuestionOption, QuestionOptionRow, QuestionRow,
};
use crate::catalog::CourseDefinition;
use crate::error::LearningError;

// ============================================================================
// Read Operations
// ============================================================================

/// Get course by ID
pub fn get_course(
    conn: &mut SqliteConnection,
    course_id: &str,
) -> Result<Option<CourseRow>, LearningError> {
    courses::table
        .filter(courses::id.eq(course_id))
        .first(conn)
        .optional()
        .map_err(|e| LearningError::Database(format!("Query failed: {}", e)))
}

/// Get all chapters of a course in `order_index` order
pub fn get_chapters_for_course(
    conn: &mut SqliteConnection,
    course_id: &str,
) -> Result<Vec<ChapterRow>, LearningError> {
    chapters::table
        .filter(chapters::course_id.eq(course_id))
        .order(chapters::order_index.asc())
        .load(conn)
        .map_err(|e| LearningError::Database(format!("Chapters query failed: {}", e)))
}

/// Get chapter by ID
pub fn get_chapter(
    conn: &mut SqliteConnection,
    chapter_id: &str,
) -> Result<Option<ChapterRow>, LearningError> {
    chapters::table
        .filter(chapters::id.eq(chapter_id))
        .first(conn)
        .optional()
        .map_err(|e| LearningError::Database(format!("Query failed: {}", e)))
}

/// Get test by ID
pub fn get_test(
    conn: &mut SqliteConnection,
    test_id: &str,
) -> Result<Option<ChapterTestRow>, LearningError> {
    chapter_tests::table
        .filter(chapter_tests::id.eq(test_id))
        .first(conn)
        .optional()
        .map_err(|e| LearningError::Database(format!("Query failed: {}", e)))
}

/// Get questions of a test in position order, with their options
pub fn get_questions_with_options(
    conn: &mut SqliteConnection,
    test_id: &str,
) -> Result<Vec<(QuestionRow, Vec<QuestionOptionRow>)>, LearningError> {
    let question_rows: Vec<QuestionRow> = questions::table
        .filter(questions::test_id.eq(test_id))
        .order(questions::position.asc())
        .load(conn)
        .map_err(|e| LearningError::Database(format!("Questions query failed: {}", e)))?;

    if question_rows.is_empty() {
        return Ok(vec![]);
    }

    let ids: Vec<&str> = question_rows.iter().map(|q| q.id.as_str()).collect();
    let option_rows: Vec<QuestionOptionRow> = question_options::table
        .filter(question_options::question_id.eq_any(ids))
        .order((question_options::question_id.asc(), question_options::position.asc()))
        .load(conn)
        .map_err(|e| LearningError::Database(format!("Options query failed: {}", e)))?;

    let mut result = Vec::with_capacity(question_rows.len());
    for question in question_rows {
        let options: Vec<QuestionOptionRow> = option_rows
            .iter()
            .filter(|o| o.question_id == question.id)
            .cloned()
            .collect();
        result.push((question, options));
    }

    Ok(result)
}

// ============================================================================
// Import
// ============================================================================

/// Insert a validated course tree in one transaction
///
/// Returns `false` without writing anything when the course already exists.
pub fn insert_course_tree(
    conn: &mut SqliteConnection,
    definition: &CourseDefinition,
) -> Result<bool, LearningError> {
    conn.immediate_transaction(|conn| {
        if get_course(conn, &definition.id)?.is_some() {
            return Ok(false);
        }

        let now = current_timestamp();
        diesel::insert_into(courses::table)
            .values(&NewCourse {
                id: &definition.id,
                title: &definition.title,
                description: definition.description.as_deref(),
                created_at: &now,
            })
            .execute(conn)
            .map_err(|e| LearningError::Database(format!("Course insert failed: {}", e)))?;

        for chapter in &definition.chapters {
            let (provider, reference, duration) = match &chapter.video {
                Some(video) => (
                    Some(video.source.provider()),
                    Some(video.source.reference()),
                    video.duration_seconds,
                ),
                None => (None, None, None),
            };

            diesel::insert_into(chapters::table)
                .values(&NewChapter {
                    id: &chapter.id,
                    course_id: &definition.id,
                    order_index: chapter.order_index,
                    title: &chapter.title,
                    content_ref: chapter.content_ref.as_deref(),
                    video_provider: provider,
                    video_reference: reference,
                    video_duration_seconds: duration,
                    test_id: chapter.test.as_ref().map(|t| t.id.as_str()),
                })
                .execute(conn)
                .map_err(|e| LearningError::Database(format!("Chapter insert failed: {}", e)))?;

            let Some(test) = &chapter.test else {
                continue;
            };

            diesel::insert_into(chapter_tests::table)
                .values(&NewChapterTest {
                    id: &test.id,
                    chapter_id: &chapter.id,
                    passing_score_percent: test.passing_score_percent as i32,
                    max_attempts: test.max_attempts as i32,
                })
                .execute(conn)
                .map_err(|e| LearningError::Database(format!("Test insert failed: {}", e)))?;

            for (q_pos, question) in test.questions.iter().enumerate() {
                diesel::insert_into(questions::table)
                    .values(&NewQuestion {
                        id: &question.id,
                        test_id: &test.id,
                        position: q_pos as i32,
                        text: &question.text,
                        is_multiple: question.is_multiple,
                    })
                    .execute(conn)
                    .map_err(|e| LearningError::Database(format!("Question insert failed: {}", e)))?;

                let options: Vec<NewQuestionOption<'_>> = question
                    .options
                    .iter()
                    .enumerate()
                    .map(|(o_pos, option)| NewQuestionOption {
                        question_id: &question.id,
                        position: o_pos as i32,
                        text: &option.text,
                        is_correct: option.is_correct,
                    })
                    .collect();

                diesel::insert_into(question_options::table)
                    .values(&options)
                    .execute(conn)
                    .map_err(|e| LearningError::Database(format!("Option insert failed: {}", e)))?;
            }
        }

        Ok(true)
    })
}
