//! Assessment service - serves tests, scores submissions, bounds attempts
//!
//! A submission is checked in this order: chapter lock, unknown question
//! ids, missing answers, option index range, already passed, attempts
//! exhausted. The last two
//! checks, the attempt insert and the `test_passed` flag share one
//! IMMEDIATE transaction, so two concurrent submissions can never both
//! take the last attempt slot.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use ts_rs::TS;

use crate::catalog::{CourseCatalog, Question};
use crate::db::attempts::{self, AttemptRecord};
use crate::db::{progress, LearningDb, PartnerContext, TestAttemptRow};
use crate::error::LearningError;
use crate::gating::ChapterStatus;

use super::events::{EventBus, LearningEvent};
use super::progress_service::ProgressService;

/// Submitted answers: question id to selected option indices
pub type Answers = HashMap<String, BTreeSet<usize>>;

// ============================================================================
// Views
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct OptionView {
    pub index: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct QuestionView {
    pub id: String,
    pub text: String,
    pub is_multiple: bool,
    pub options: Vec<OptionView>,
}

impl From<&Question> for QuestionView {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            text: q.text.clone(),
            is_multiple: q.is_multiple,
            options: q
                .options
                .iter()
                .enumerate()
                .map(|(i, o)| OptionView {
                    index: i as u32,
                    text: o.text.clone(),
                })
                .collect(),
        }
    }
}

/// One recorded attempt
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct AttemptView {
    pub attempt_id: String,
    pub test_id: String,
    pub attempt_seq: u32,
    pub answers: BTreeMap<String, Vec<u32>>,
    pub correct_count: u32,
    pub total_questions: u32,
    pub score_percent: u32,
    pub passed: bool,
    pub created_at: String,
}

impl TryFrom<TestAttemptRow> for AttemptView {
    type Error = LearningError;

    fn try_from(row: TestAttemptRow) -> Result<Self, Self::Error> {
        let answers: BTreeMap<String, Vec<u32>> = serde_json::from_str(&row.answers_json)?;
        Ok(Self {
            attempt_id: row.id,
            test_id: row.test_id,
            attempt_seq: row.attempt_seq as u32,
            answers,
            correct_count: row.correct_count as u32,
            total_questions: row.total_questions as u32,
            score_percent: row.score_percent as u32,
            passed: row.passed,
            created_at: row.created_at,
        })
    }
}

/// Test content without answer keys, plus the partner's standing
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct TestView {
    pub test_id: String,
    pub chapter_id: String,
    pub passing_score_percent: u32,
    pub max_attempts: u32,
    pub attempts_used: u32,
    pub attempts_remaining: u32,
    pub questions: Vec<QuestionView>,
    pub last_passed: Option<AttemptView>,
}

/// Response body of a submission
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct SubmissionResult {
    pub attempt: AttemptView,
    pub score_percent: u32,
    pub passed: bool,
    pub attempts_used: u32,
    pub max_attempts: u32,
    /// Nothing was recorded; `attempt` is the earlier passing attempt
    pub already_passed: bool,
    pub chapter_completed: bool,
}

/// Outcome of [`AssessmentService::submit_answers`]
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// A new attempt was recorded
    Scored(SubmissionResult),
    /// The test was passed before; nothing was recorded
    AlreadyPassed(SubmissionResult),
}

impl SubmitOutcome {
    pub fn result(&self) -> &SubmissionResult {
        match self {
            SubmitOutcome::Scored(r) | SubmitOutcome::AlreadyPassed(r) => r,
        }
    }

    pub fn into_result(self) -> SubmissionResult {
        match self {
            SubmitOutcome::Scored(r) | SubmitOutcome::AlreadyPassed(r) => r,
        }
    }
}

// ============================================================================
// Scoring
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub correct_count: u32,
    pub total_questions: u32,
    pub score_percent: u32,
}

/// Score a complete submission
///
/// A question counts only when the selected set equals the correct set
/// exactly; there is no partial credit. The percentage rounds half up.
pub fn score_answers(questions: &[Question], answers: &Answers) -> Score {
    let total = questions.len() as u32;
    let correct = questions
        .iter()
        .filter(|q| {
            answers.get(&q.id).map_or(false, |selected| {
                selected.iter().copied().collect::<HashSet<usize>>() == q.correct_indices()
            })
        })
        .count() as u32;

    let score_percent = if total == 0 {
        0
    } else {
        (200 * correct + total) / (2 * total)
    };

    Score {
        correct_count: correct,
        total_questions: total,
        score_percent,
    }
}

enum Recorded {
    New(TestAttemptRow, u32),
    Previous(TestAttemptRow, u32),
}

// ============================================================================
// Service
// ============================================================================

/// Assessment service for business logic
pub struct AssessmentService {
    db: Arc<LearningDb>,
    catalog: Arc<dyn CourseCatalog>,
    events: Arc<EventBus>,
    progress: Arc<ProgressService>,
}

impl AssessmentService {
    /// Create a new assessment service
    pub fn new(
        db: Arc<LearningDb>,
        catalog: Arc<dyn CourseCatalog>,
        events: Arc<EventBus>,
        progress: Arc<ProgressService>,
    ) -> Self {
        Self {
            db,
            catalog,
            events,
            progress,
        }
    }

    /// Get the chapter's test without answer keys
    pub fn get_test(&self, ctx: &PartnerContext, chapter_id: &str) -> Result<TestView, LearningError> {
        let chapter = self.catalog.require_chapter(chapter_id)?;
        let test = self
            .catalog
            .test_for_chapter(chapter_id)?
            .ok_or_else(|| LearningError::NotFound(format!("test for chapter {}", chapter_id)))?;
        self.progress.ensure_accessible(ctx, &chapter)?;
        let questions = self.catalog.questions(&test.id)?;

        let (used, last_passed) = self.db.with_conn(|conn| {
            let used = attempts::count_attempts(conn, ctx, &test.id)?;
            let last_passed = attempts::last_passed_attempt(conn, ctx, &test.id)?;
            Ok((used as u32, last_passed))
        })?;

        Ok(TestView {
            test_id: test.id.clone(),
            chapter_id: chapter.id.clone(),
            passing_score_percent: test.passing_score_percent,
            max_attempts: test.max_attempts,
            attempts_used: used,
            attempts_remaining: test.max_attempts.saturating_sub(used),
            questions: questions.iter().map(QuestionView::from).collect(),
            last_passed: last_passed.map(AttemptView::try_from).transpose()?,
        })
    }

    /// The partner's attempts on a test, oldest first
    pub fn list_attempts(&self, ctx: &PartnerContext, test_id: &str) -> Result<Vec<AttemptView>, LearningError> {
        self.catalog.require_test(test_id)?;
        let rows = self
            .db
            .with_conn(|conn| attempts::list_attempts(conn, ctx, test_id))?;
        rows.into_iter().map(AttemptView::try_from).collect()
    }

    /// Score and record a submission
    pub fn submit_answers(
        &self,
        ctx: &PartnerContext,
        test_id: &str,
        answers: Answers,
    ) -> Result<SubmitOutcome, LearningError> {
        let test = self.catalog.require_test(test_id)?;
        let chapter = self.catalog.require_chapter(&test.chapter_id)?;
        let visible = self.progress.ensure_accessible(ctx, &chapter)?;
        let questions = self.catalog.questions(test_id)?;

        let known: HashSet<&str> = questions.iter().map(|q| q.id.as_str()).collect();
        let mut unknown: Vec<&str> = answers
            .keys()
            .map(String::as_str)
            .filter(|id| !known.contains(id))
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(LearningError::InvalidInput(format!(
                "unknown question ids: {}",
                unknown.join(", ")
            )));
        }

        let missing: Vec<String> = questions
            .iter()
            .filter(|q| !answers.contains_key(&q.id))
            .map(|q| q.id.clone())
            .collect();
        if !missing.is_empty() {
            debug!(partner = %ctx.partner_id, test = %test_id, missing = missing.len(), "Incomplete submission");
            return Err(LearningError::IncompleteAnswers { missing });
        }

        for question in questions.iter() {
            let selected = &answers[&question.id];
            if let Some(bad) = selected.iter().find(|i| **i >= question.options.len()) {
                return Err(LearningError::InvalidInput(format!(
                    "question {}: option index {} out of range",
                    question.id, bad
                )));
            }
        }

        let score = score_answers(&questions, &answers);
        let passed = score.score_percent >= test.passing_score_percent;
        let answers_json = serde_json::to_string(&answers)?;

        let recorded = self.db.with_write_txn(|conn| {
            let used = attempts::count_attempts(conn, ctx, test_id)? as u32;

            // test_passed and the passing attempt are written in one transaction
            if let Some(previous) = attempts::last_passed_attempt(conn, ctx, test_id)? {
                return Ok(Recorded::Previous(previous, used));
            }

            if used >= test.max_attempts {
                return Err(LearningError::AttemptsExhausted {
                    test_id: test_id.to_string(),
                    max_attempts: test.max_attempts,
                });
            }

            let row = attempts::insert_attempt(
                conn,
                ctx,
                (used + 1) as i32,
                &AttemptRecord {
                    test_id,
                    answers_json: &answers_json,
                    correct_count: score.correct_count,
                    total_questions: score.total_questions,
                    score_percent: score.score_percent,
                    passed,
                },
            )?;

            if passed {
                progress::mark_test_passed(
                    conn,
                    ctx,
                    &chapter.id,
                    &chapter.course_id,
                    visible.min(ChapterStatus::Available),
                )?;
            }

            Ok(Recorded::New(row, used + 1))
        });

        let recorded = match recorded {
            Err(e @ LearningError::AttemptsExhausted { .. }) => {
                warn!(partner = %ctx.partner_id, test = %test_id, "Submission rejected, no attempts left");
                return Err(e);
            }
            other => other?,
        };

        match recorded {
            Recorded::Previous(row, used) => {
                debug!(partner = %ctx.partner_id, test = %test_id, "Test already passed, submission ignored");
                let attempt = AttemptView::try_from(row)?;
                Ok(SubmitOutcome::AlreadyPassed(SubmissionResult {
                    score_percent: attempt.score_percent,
                    passed: true,
                    attempt,
                    attempts_used: used,
                    max_attempts: test.max_attempts,
                    already_passed: true,
                    chapter_completed: self.progress.visible_status(ctx, &chapter)?
                        == ChapterStatus::Completed,
                }))
            }
            Recorded::New(row, used) => {
                let attempt = AttemptView::try_from(row)?;
                info!(
                    partner = %ctx.partner_id,
                    test = %test_id,
                    attempt = attempt.attempt_seq,
                    score = score.score_percent,
                    passed,
                    "Recorded test attempt"
                );
                self.events.emit(LearningEvent::TestSubmitted {
                    partner_id: ctx.partner_id.clone(),
                    test_id: test_id.to_string(),
                    attempt_seq: attempt.attempt_seq,
                    score_percent: score.score_percent,
                    passed,
                });
                if !passed && used >= test.max_attempts {
                    self.events.emit(LearningEvent::AttemptsExhausted {
                        partner_id: ctx.partner_id.clone(),
                        test_id: test_id.to_string(),
                    });
                }

                let chapter_completed = if passed {
                    self.progress.evaluate_completion(ctx, &chapter.id)?.completed
                } else {
                    false
                };

                Ok(SubmitOutcome::Scored(SubmissionResult {
                    attempt,
                    score_percent: score.score_percent,
                    passed,
                    attempts_used: used,
                    max_attempts: test.max_attempts,
                    already_passed: false,
                    chapter_completed,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AnswerOption;

    fn question(id: &str, correct: &[bool]) -> Question {
        Question {
            id: id.into(),
            text: format!("{}?", id),
            is_multiple: correct.iter().filter(|c| **c).count() > 1,
            options: correct
                .iter()
                .enumerate()
                .map(|(i, c)| AnswerOption {
                    text: format!("option {}", i),
                    is_correct: *c,
                })
                .collect(),
        }
    }

    fn answers(entries: &[(&str, &[usize])]) -> Answers {
        entries
            .iter()
            .map(|(id, sel)| (id.to_string(), sel.iter().copied().collect()))
            .collect()
    }

    #[test]
    fn test_exact_set_match() {
        let questions = vec![question("q1", &[true, false]), question("q2", &[true, true, false])];

        let all = score_answers(&questions, &answers(&[("q1", &[0]), ("q2", &[0, 1])]));
        assert_eq!(all.correct_count, 2);
        assert_eq!(all.score_percent, 100);

        // Subset of the correct options earns nothing
        let partial = score_answers(&questions, &answers(&[("q1", &[0]), ("q2", &[0])]));
        assert_eq!(partial.correct_count, 1);
        assert_eq!(partial.score_percent, 50);

        // Superset earns nothing either
        let extra = score_answers(&questions, &answers(&[("q1", &[0, 1]), ("q2", &[0, 1, 2])]));
        assert_eq!(extra.correct_count, 0);
        assert_eq!(extra.score_percent, 0);
    }

    #[test]
    fn test_rounds_half_up() {
        let eight: Vec<Question> = (0..8).map(|i| question(&format!("q{}", i), &[true, false])).collect();
        let mut submitted = Answers::new();
        for (i, q) in eight.iter().enumerate() {
            let pick = if i == 0 { 0 } else { 1 };
            submitted.insert(q.id.clone(), BTreeSet::from([pick]));
        }
        // 1/8 = 12.5%
        assert_eq!(score_answers(&eight, &submitted).score_percent, 13);

        let three: Vec<Question> = (0..3).map(|i| question(&format!("q{}", i), &[true, false])).collect();
        let two_of_three = answers(&[("q0", &[0]), ("q1", &[0]), ("q2", &[1])]);
        assert_eq!(score_answers(&three, &two_of_three).score_percent, 67);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let questions = vec![question("q1", &[false, true]), question("q2", &[true, false, true])];
        let submitted = answers(&[("q1", &[1]), ("q2", &[2, 0])]);
        let first = score_answers(&questions, &submitted);
        for _ in 0..10 {
            assert_eq!(score_answers(&questions, &submitted), first);
        }
    }

    #[test]
    fn test_question_view_hides_answer_key() {
        let view = QuestionView::from(&question("q1", &[true, false]));
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("correct"));
        assert_eq!(view.options[1].index, 1);
    }
}
