//! Error types for partner-academy

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LearningError {
    #[error("Chapter is locked: {chapter_id}")]
    ChapterLocked { chapter_id: String },

    #[error("Incomplete answers, missing questions: {missing:?}")]
    IncompleteAnswers { missing: Vec<String> },

    #[error("No attempts left for test {test_id} (max {max_attempts})")]
    AttemptsExhausted { test_id: String, max_attempts: u32 },

    #[error("Invalid progress report: {0}")]
    InvalidProgress(String),

    #[error("Certificate not yet earned for course {course_id}")]
    NotYetEarned { course_id: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<diesel::result::Error> for LearningError {
    fn from(e: diesel::result::Error) -> Self {
        LearningError::Database(e.to_string())
    }
}

impl LearningError {
    /// Stable machine-readable code used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            LearningError::ChapterLocked { .. } => "chapter_locked",
            LearningError::IncompleteAnswers { .. } => "incomplete_answers",
            LearningError::AttemptsExhausted { .. } => "attempts_exhausted",
            LearningError::InvalidProgress(_) => "invalid_progress",
            LearningError::NotYetEarned { .. } => "not_yet_earned",
            LearningError::NotFound(_) => "not_found",
            LearningError::InvalidInput(_) => "invalid_input",
            LearningError::Unauthorized(_) => "unauthorized",
            LearningError::Database(_) => "database",
            LearningError::Config(_) => "config",
            LearningError::Io(_) => "io",
            LearningError::Json(_) => "json",
            LearningError::Internal(_) => "internal",
        }
    }
}
