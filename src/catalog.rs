//! Course catalog read adapter
//!
//! The catalog (courses, chapters, tests, questions) is authored outside
//! this engine and is immutable from its point of view. Services read it
//! through the [`CourseCatalog`] trait; [`SqliteCatalog`] serves it from
//! the local database and caches every structure after first load.
//!
//! Answer keys (`AnswerOption::is_correct`) are visible to the assessment
//! engine only and are never serialized.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::{self, LearningDb};
use crate::error::LearningError;
use crate::gating::GateInput;
use crate::video::VideoSource;

// ============================================================================
// Catalog Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct Course {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    /// Chapter ids in `order_index` order
    pub chapter_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChapterVideo {
    pub source: VideoSource,
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Chapter {
    pub id: String,
    pub course_id: String,
    pub order_index: i32,
    pub title: String,
    pub content_ref: Option<String>,
    pub video: Option<ChapterVideo>,
    pub test_id: Option<String>,
}

impl Chapter {
    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_test(&self) -> bool {
        self.test_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChapterTest {
    pub id: String,
    pub chapter_id: String,
    pub passing_score_percent: u32,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub is_multiple: bool,
    pub options: Vec<AnswerOption>,
}

impl Question {
    /// Indices of the correct options
    pub fn correct_indices(&self) -> HashSet<usize> {
        self.options
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_correct)
            .map(|(i, _)| i)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerOption {
    pub text: String,
    #[serde(skip_serializing)]
    pub is_correct: bool,
}

/// Chapters of a course reduced to what gating needs
pub fn gate_inputs(chapters: &[Chapter]) -> Vec<GateInput<'_>> {
    chapters
        .iter()
        .map(|c| GateInput {
            chapter_id: &c.id,
            order_index: c.order_index,
        })
        .collect()
}

// ============================================================================
// Read Contract
// ============================================================================

/// Read-only access to course structure
pub trait CourseCatalog: Send + Sync {
    fn course(&self, course_id: &str) -> Result<Option<Arc<Course>>, LearningError>;

    /// All chapters of a course in `order_index` order
    fn chapters_for_course(&self, course_id: &str) -> Result<Arc<Vec<Chapter>>, LearningError>;

    fn chapter(&self, chapter_id: &str) -> Result<Option<Arc<Chapter>>, LearningError>;

    fn test(&self, test_id: &str) -> Result<Option<Arc<ChapterTest>>, LearningError>;

    /// Questions of a test in order, including answer keys
    fn questions(&self, test_id: &str) -> Result<Arc<Vec<Question>>, LearningError>;

    fn require_chapter(&self, chapter_id: &str) -> Result<Arc<Chapter>, LearningError> {
        self.chapter(chapter_id)?
            .ok_or_else(|| LearningError::NotFound(format!("chapter {}", chapter_id)))
    }

    fn require_test(&self, test_id: &str) -> Result<Arc<ChapterTest>, LearningError> {
        self.test(test_id)?
            .ok_or_else(|| LearningError::NotFound(format!("test {}", test_id)))
    }

    /// The chapter's test, if it has one
    fn test_for_chapter(&self, chapter_id: &str) -> Result<Option<Arc<ChapterTest>>, LearningError> {
        match self.require_chapter(chapter_id)?.test_id.as_deref() {
            Some(test_id) => self.test(test_id),
            None => Ok(None),
        }
    }

    fn require_course(&self, course_id: &str) -> Result<Arc<Course>, LearningError> {
        self.course(course_id)?
            .ok_or_else(|| LearningError::NotFound(format!("course {}", course_id)))
    }
}

// ============================================================================
// SQLite-backed Catalog
// ============================================================================

/// Catalog served from the local database with an in-memory hot cache
///
/// Only hits are cached; a miss is looked up again next time in case the
/// course has been imported since.
pub struct SqliteCatalog {
    db: Arc<LearningDb>,
    courses: DashMap<String, Arc<Course>>,
    course_chapters: DashMap<String, Arc<Vec<Chapter>>>,
    chapters: DashMap<String, Arc<Chapter>>,
    tests: DashMap<String, Arc<ChapterTest>>,
    questions: DashMap<String, Arc<Vec<Question>>>,
}

impl SqliteCatalog {
    pub fn new(db: Arc<LearningDb>) -> Self {
        Self {
            db,
            courses: DashMap::new(),
            course_chapters: DashMap::new(),
            chapters: DashMap::new(),
            tests: DashMap::new(),
            questions: DashMap::new(),
        }
    }

    /// Validate and import a course authored elsewhere
    pub fn import_course(&self, definition: &CourseDefinition) -> Result<ImportOutcome, LearningError> {
        definition.validate()?;

        let inserted = self
            .db
            .with_conn(|conn| db::catalog::insert_course_tree(conn, definition))?;

        if inserted {
            info!(course_id = %definition.id, chapters = definition.chapters.len(), "Imported course");
            Ok(ImportOutcome::Imported)
        } else {
            debug!(course_id = %definition.id, "Course already present, skipped import");
            Ok(ImportOutcome::Skipped)
        }
    }

    /// Import every course in a catalog file
    pub fn import_file(&self, path: &std::path::Path) -> Result<CatalogImportResult, LearningError> {
        let content = std::fs::read_to_string(path)?;
        let file: CatalogFile = serde_json::from_str(&content)?;

        let mut result = CatalogImportResult::default();
        for course in &file.courses {
            match self.import_course(course) {
                Ok(ImportOutcome::Imported) => result.imported += 1,
                Ok(ImportOutcome::Skipped) => result.skipped += 1,
                Err(e) => result.errors.push(format!("{}: {}", course.id, e)),
            }
        }
        Ok(result)
    }
}

fn chapter_from_row(row: db::models::ChapterRow) -> Result<Chapter, LearningError> {
    let video = match (row.video_provider.as_deref(), row.video_reference.as_deref()) {
        (Some(provider), Some(reference)) => Some(ChapterVideo {
            source: VideoSource::from_parts(provider, reference)?,
            duration_seconds: row.video_duration_seconds,
        }),
        _ => None,
    };

    Ok(Chapter {
        id: row.id,
        course_id: row.course_id,
        order_index: row.order_index,
        title: row.title,
        content_ref: row.content_ref,
        video,
        test_id: row.test_id,
    })
}

impl CourseCatalog for SqliteCatalog {
    fn course(&self, course_id: &str) -> Result<Option<Arc<Course>>, LearningError> {
        if let Some(course) = self.courses.get(course_id) {
            return Ok(Some(course.clone()));
        }

        let Some(row) = self.db.with_conn(|conn| db::catalog::get_course(conn, course_id))? else {
            return Ok(None);
        };
        let chapters = self.chapters_for_course(course_id)?;

        let course = Arc::new(Course {
            id: row.id,
            title: row.title,
            description: row.description,
            chapter_ids: chapters.iter().map(|c| c.id.clone()).collect(),
        });
        self.courses.insert(course_id.to_string(), course.clone());
        Ok(Some(course))
    }

    fn chapters_for_course(&self, course_id: &str) -> Result<Arc<Vec<Chapter>>, LearningError> {
        if let Some(chapters) = self.course_chapters.get(course_id) {
            return Ok(chapters.clone());
        }

        let rows = self
            .db
            .with_conn(|conn| db::catalog::get_chapters_for_course(conn, course_id))?;
        if rows.is_empty() {
            return Ok(Arc::new(vec![]));
        }

        let chapters = rows
            .into_iter()
            .map(chapter_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let chapters = Arc::new(chapters);
        self.course_chapters.insert(course_id.to_string(), chapters.clone());
        Ok(chapters)
    }

    fn chapter(&self, chapter_id: &str) -> Result<Option<Arc<Chapter>>, LearningError> {
        if let Some(chapter) = self.chapters.get(chapter_id) {
            return Ok(Some(chapter.clone()));
        }

        let Some(row) = self.db.with_conn(|conn| db::catalog::get_chapter(conn, chapter_id))? else {
            return Ok(None);
        };
        let chapter = Arc::new(chapter_from_row(row)?);
        self.chapters.insert(chapter_id.to_string(), chapter.clone());
        Ok(Some(chapter))
    }

    fn test(&self, test_id: &str) -> Result<Option<Arc<ChapterTest>>, LearningError> {
        if let Some(test) = self.tests.get(test_id) {
            return Ok(Some(test.clone()));
        }

        let Some(row) = self.db.with_conn(|conn| db::catalog::get_test(conn, test_id))? else {
            return Ok(None);
        };
        let test = Arc::new(ChapterTest {
            id: row.id,
            chapter_id: row.chapter_id,
            passing_score_percent: row.passing_score_percent.clamp(0, 100) as u32,
            max_attempts: row.max_attempts.max(1) as u32,
        });
        self.tests.insert(test_id.to_string(), test.clone());
        Ok(Some(test))
    }

    fn questions(&self, test_id: &str) -> Result<Arc<Vec<Question>>, LearningError> {
        if let Some(questions) = self.questions.get(test_id) {
            return Ok(questions.clone());
        }

        let rows = self
            .db
            .with_conn(|conn| db::catalog::get_questions_with_options(conn, test_id))?;
        if rows.is_empty() {
            return Ok(Arc::new(vec![]));
        }

        let questions: Vec<Question> = rows
            .into_iter()
            .map(|(q, options)| Question {
                id: q.id,
                text: q.text,
                is_multiple: q.is_multiple,
                options: options
                    .into_iter()
                    .map(|o| AnswerOption {
                        text: o.text,
                        is_correct: o.is_correct,
                    })
                    .collect(),
            })
            .collect();
        let questions = Arc::new(questions);
        self.questions.insert(test_id.to_string(), questions.clone());
        Ok(questions)
    }
}

// ============================================================================
// Import Definitions
// ============================================================================

/// Catalog file: `{"courses": [...]}`
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub courses: Vec<CourseDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourseDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub chapters: Vec<ChapterDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChapterDefinition {
    pub id: String,
    pub title: String,
    pub order_index: i32,
    #[serde(default)]
    pub content_ref: Option<String>,
    #[serde(default)]
    pub video: Option<VideoDefinition>,
    #[serde(default)]
    pub test: Option<TestDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoDefinition {
    #[serde(flatten)]
    pub source: VideoSource,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestDefinition {
    pub id: String,
    pub passing_score_percent: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    pub questions: Vec<QuestionDefinition>,
}

fn default_max_attempts() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionDefinition {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub is_multiple: bool,
    pub options: Vec<OptionDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptionDefinition {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// Result of importing one course
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    Imported,
    Skipped,
}

/// Result of importing a catalog file
#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogImportResult {
    pub imported: u64,
    pub skipped: u64,
    pub errors: Vec<String>,
}

impl CourseDefinition {
    /// Structural checks the engine relies on
    pub fn validate(&self) -> Result<(), LearningError> {
        if self.id.is_empty() {
            return Err(LearningError::InvalidInput("course id is required".into()));
        }
        if self.title.is_empty() {
            return Err(LearningError::InvalidInput("course title is required".into()));
        }
        if self.chapters.is_empty() {
            return Err(LearningError::InvalidInput("course must have at least one chapter".into()));
        }

        let mut order_indexes = HashSet::new();
        let mut ids = HashSet::new();
        for (i, chapter) in self.chapters.iter().enumerate() {
            if !order_indexes.insert(chapter.order_index) {
                return Err(LearningError::InvalidInput(format!(
                    "chapters[{}]: duplicate order_index {}",
                    i, chapter.order_index
                )));
            }
            chapter
                .validate(&mut ids)
                .map_err(|e| LearningError::InvalidInput(format!("chapters[{}]: {}", i, e)))?;
        }
        Ok(())
    }
}

impl ChapterDefinition {
    fn validate(&self, ids: &mut HashSet<String>) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("chapter id is required".into());
        }
        if !ids.insert(format!("chapter:{}", self.id)) {
            return Err(format!("duplicate chapter id {}", self.id));
        }
        if self.title.is_empty() {
            return Err("chapter title is required".into());
        }

        if let Some(video) = &self.video {
            if video.source.reference().is_empty() {
                return Err("video reference is required".into());
            }
            if let Some(d) = video.duration_seconds {
                if !d.is_finite() || d <= 0.0 {
                    return Err(format!("video duration_seconds must be > 0, got {}", d));
                }
            }
        }

        if let Some(test) = &self.test {
            test.validate(ids)?;
        }
        Ok(())
    }
}

impl TestDefinition {
    fn validate(&self, ids: &mut HashSet<String>) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("test id is required".into());
        }
        if !ids.insert(format!("test:{}", self.id)) {
            return Err(format!("duplicate test id {}", self.id));
        }
        if self.passing_score_percent > 100 {
            return Err(format!(
                "passing_score_percent must be 0-100, got {}",
                self.passing_score_percent
            ));
        }
        if self.max_attempts < 1 {
            return Err("max_attempts must be at least 1".into());
        }
        if self.questions.is_empty() {
            return Err("test must have at least one question".into());
        }

        for (i, question) in self.questions.iter().enumerate() {
            if question.id.is_empty() {
                return Err(format!("questions[{}]: id is required", i));
            }
            if !ids.insert(format!("question:{}", question.id)) {
                return Err(format!("questions[{}]: duplicate id {}", i, question.id));
            }
            if question.options.is_empty() {
                return Err(format!("questions[{}]: at least one option is required", i));
            }
            let correct = question.options.iter().filter(|o| o.is_correct).count();
            if correct == 0 {
                return Err(format!("questions[{}]: no correct option", i));
            }
            if !question.is_multiple && correct != 1 {
                return Err(format!(
                    "questions[{}]: single-select question has {} correct options",
                    i, correct
                ));
            }
        }
        Ok(())
    }
}
