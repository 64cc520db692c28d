//! Progress service - the progression tracker
//!
//! Single writer of chapter status. Video and assessment services write
//! their own sub-fields and then call [`ProgressService::evaluate_completion`].
//! After a chapter completes this service materializes the next chapter's
//! unlock and asks the certificate service to check the course.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use ts_rs::TS;

use crate::catalog::{gate_inputs, Chapter, CourseCatalog};
use crate::db::{progress, ChapterProgressRow, LearningDb, PartnerContext};
use crate::error::LearningError;
use crate::gating::{self, ChapterStatus};
use crate::video::VideoSource;

use super::certificate_service::{CertificateService, CertificateView};
use super::events::{EventBus, LearningEvent};

// ============================================================================
// Views
// ============================================================================

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct ChapterVideoView {
    pub source: VideoSource,
    pub duration_seconds: Option<f64>,
}

/// Chapter as seen by one partner
///
/// Content and video are withheld while the chapter is locked.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct ChapterView {
    pub id: String,
    pub course_id: String,
    pub order_index: i32,
    pub title: String,
    pub status: ChapterStatus,
    pub content_ref: Option<String>,
    pub video: Option<ChapterVideoView>,
    pub has_video: bool,
    pub has_test: bool,
    pub test_id: Option<String>,
    pub video_watched: bool,
    pub video_progress_seconds: f64,
    pub test_passed: bool,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl ChapterView {
    fn build(chapter: &Chapter, status: ChapterStatus, row: Option<&ChapterProgressRow>) -> Self {
        let accessible = status.is_accessible();
        Self {
            id: chapter.id.clone(),
            course_id: chapter.course_id.clone(),
            order_index: chapter.order_index,
            title: chapter.title.clone(),
            status,
            content_ref: chapter.content_ref.clone().filter(|_| accessible),
            video: chapter.video.as_ref().filter(|_| accessible).map(|v| ChapterVideoView {
                source: v.source.clone(),
                duration_seconds: v.duration_seconds,
            }),
            has_video: chapter.has_video(),
            has_test: chapter.has_test(),
            test_id: chapter.test_id.clone(),
            video_watched: row.map_or(false, |r| r.video_watched),
            video_progress_seconds: row.map_or(0.0, |r| r.video_progress_seconds),
            test_passed: row.map_or(false, |r| r.test_passed),
            started_at: row.and_then(|r| r.started_at.clone()),
            completed_at: row.and_then(|r| r.completed_at.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct ChapterSummary {
    pub id: String,
    pub title: String,
    pub order_index: i32,
    pub status: ChapterStatus,
    pub has_video: bool,
    pub has_test: bool,
}

/// Course with every chapter's visible status for one partner
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct CourseOverview {
    pub course_id: String,
    pub title: String,
    pub description: Option<String>,
    pub chapters: Vec<ChapterSummary>,
    pub completed_chapters: u32,
    pub total_chapters: u32,
    pub percent_complete: u32,
    pub certificate: Option<CertificateView>,
}

/// Outcome of a completion check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionCheck {
    pub completed: bool,
    /// This call performed the transition
    pub newly_completed: bool,
}

// ============================================================================
// Service
// ============================================================================

/// Progress service for business logic
pub struct ProgressService {
    db: Arc<LearningDb>,
    catalog: Arc<dyn CourseCatalog>,
    events: Arc<EventBus>,
    certificates: Arc<CertificateService>,
}

impl ProgressService {
    /// Create a new progress service
    pub fn new(
        db: Arc<LearningDb>,
        catalog: Arc<dyn CourseCatalog>,
        events: Arc<EventBus>,
        certificates: Arc<CertificateService>,
    ) -> Self {
        Self {
            db,
            catalog,
            events,
            certificates,
        }
    }

    // =========================================================================
    // Gating
    // =========================================================================

    fn progress_rows(
        &self,
        ctx: &PartnerContext,
        course_id: &str,
    ) -> Result<HashMap<String, ChapterProgressRow>, LearningError> {
        let rows = self
            .db
            .with_conn(|conn| progress::get_progress_for_course(conn, ctx, course_id))?;
        Ok(rows.into_iter().map(|r| (r.chapter_id.clone(), r)).collect())
    }

    fn visible_map(
        chapters: &[Chapter],
        rows: &HashMap<String, ChapterProgressRow>,
    ) -> HashMap<String, ChapterStatus> {
        let stored: HashMap<String, ChapterStatus> = rows
            .iter()
            .map(|(id, row)| (id.clone(), row.status()))
            .collect();
        gating::visible_status_map(&gate_inputs(chapters), &stored)
    }

    /// Visible status of a chapter for this partner
    pub fn visible_status(&self, ctx: &PartnerContext, chapter: &Chapter) -> Result<ChapterStatus, LearningError> {
        let chapters = self.catalog.chapters_for_course(&chapter.course_id)?;
        let rows = self.progress_rows(ctx, &chapter.course_id)?;
        let visible = Self::visible_map(&chapters, &rows);
        Ok(visible.get(&chapter.id).copied().unwrap_or(ChapterStatus::Locked))
    }

    /// Visible status, failing with `ChapterLocked` when locked
    pub fn ensure_accessible(&self, ctx: &PartnerContext, chapter: &Chapter) -> Result<ChapterStatus, LearningError> {
        let status = self.visible_status(ctx, chapter)?;
        if !status.is_accessible() {
            debug!(partner = %ctx.partner_id, chapter = %chapter.id, "Rejected action on locked chapter");
            return Err(LearningError::ChapterLocked {
                chapter_id: chapter.id.clone(),
            });
        }
        Ok(status)
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Get chapter content with the partner's visible status
    pub fn get_chapter(&self, ctx: &PartnerContext, chapter_id: &str) -> Result<ChapterView, LearningError> {
        let chapter = self.catalog.require_chapter(chapter_id)?;
        let chapters = self.catalog.chapters_for_course(&chapter.course_id)?;
        let rows = self.progress_rows(ctx, &chapter.course_id)?;
        let visible = Self::visible_map(&chapters, &rows);

        let status = visible.get(chapter_id).copied().unwrap_or(ChapterStatus::Locked);
        Ok(ChapterView::build(&chapter, status, rows.get(chapter_id)))
    }

    /// Course overview with every chapter's visible status
    pub fn course_overview(&self, ctx: &PartnerContext, course_id: &str) -> Result<CourseOverview, LearningError> {
        let course = self.catalog.require_course(course_id)?;
        let chapters = self.catalog.chapters_for_course(course_id)?;
        let rows = self.progress_rows(ctx, course_id)?;
        let visible = Self::visible_map(&chapters, &rows);

        let summaries: Vec<ChapterSummary> = chapters
            .iter()
            .map(|c| ChapterSummary {
                id: c.id.clone(),
                title: c.title.clone(),
                order_index: c.order_index,
                status: visible.get(&c.id).copied().unwrap_or(ChapterStatus::Locked),
                has_video: c.has_video(),
                has_test: c.has_test(),
            })
            .collect();

        let total = summaries.len() as u32;
        let completed = summaries
            .iter()
            .filter(|s| s.status == ChapterStatus::Completed)
            .count() as u32;
        let percent_complete = if total == 0 { 0 } else { completed * 100 / total };

        Ok(CourseOverview {
            course_id: course.id.clone(),
            title: course.title.clone(),
            description: course.description.clone(),
            chapters: summaries,
            completed_chapters: completed,
            total_chapters: total,
            percent_complete,
            certificate: self.certificates.find(ctx, course_id)?,
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Move a chapter to in_progress
    ///
    /// No-op for chapters already in progress or completed. Chapters with
    /// no requirements complete right away.
    pub fn start_chapter(&self, ctx: &PartnerContext, chapter_id: &str) -> Result<ChapterView, LearningError> {
        let chapter = self.catalog.require_chapter(chapter_id)?;
        let before = self.ensure_accessible(ctx, &chapter)?;

        self.db.with_conn(|conn| {
            progress::raise_status(conn, ctx, &chapter.id, &chapter.course_id, ChapterStatus::InProgress)
        })?;

        if before < ChapterStatus::InProgress {
            info!(partner = %ctx.partner_id, chapter = %chapter.id, "Chapter started");
            self.events.emit(LearningEvent::ChapterStarted {
                partner_id: ctx.partner_id.clone(),
                chapter_id: chapter.id.clone(),
            });
        }

        self.evaluate_completion(ctx, chapter_id)?;
        self.get_chapter(ctx, chapter_id)
    }

    /// Explicit completion request
    ///
    /// Completes the chapter if its requirements are met; otherwise the
    /// view comes back unchanged.
    pub fn complete_chapter(&self, ctx: &PartnerContext, chapter_id: &str) -> Result<ChapterView, LearningError> {
        let chapter = self.catalog.require_chapter(chapter_id)?;
        self.ensure_accessible(ctx, &chapter)?;

        // Gating may show a chapter as available before it has a row
        self.db.with_conn(|conn| {
            progress::raise_status(conn, ctx, &chapter.id, &chapter.course_id, ChapterStatus::Available)
        })?;

        self.evaluate_completion(ctx, chapter_id)?;
        self.get_chapter(ctx, chapter_id)
    }

    /// Complete the chapter if every requirement is met
    ///
    /// Requirements: (no video or video watched) and (no test or test
    /// passed). Only the caller that performs the transition emits the
    /// event, unlocks the next chapter and checks the certificate.
    pub fn evaluate_completion(&self, ctx: &PartnerContext, chapter_id: &str) -> Result<CompletionCheck, LearningError> {
        let chapter = self.catalog.require_chapter(chapter_id)?;

        let row = self
            .db
            .with_conn(|conn| progress::get_progress(conn, ctx, chapter_id))?;
        let Some(row) = row else {
            return Ok(CompletionCheck {
                completed: false,
                newly_completed: false,
            });
        };

        if row.status() == ChapterStatus::Completed {
            return Ok(CompletionCheck {
                completed: true,
                newly_completed: false,
            });
        }

        let video_ok = !chapter.has_video() || row.video_watched;
        let test_ok = !chapter.has_test() || row.test_passed;
        if !(video_ok && test_ok) {
            debug!(
                partner = %ctx.partner_id,
                chapter = %chapter_id,
                video_ok,
                test_ok,
                "Chapter requirements not met"
            );
            return Ok(CompletionCheck {
                completed: false,
                newly_completed: false,
            });
        }

        let transitioned = self
            .db
            .with_conn(|conn| progress::mark_completed(conn, ctx, chapter_id))?;

        if transitioned {
            info!(partner = %ctx.partner_id, chapter = %chapter_id, "Chapter completed");
            self.events.emit(LearningEvent::ChapterCompleted {
                partner_id: ctx.partner_id.clone(),
                chapter_id: chapter.id.clone(),
                course_id: chapter.course_id.clone(),
            });

            self.unlock_next(ctx, &chapter)?;
            self.certificates.check_and_issue(ctx, &chapter.course_id)?;
        }

        Ok(CompletionCheck {
            completed: true,
            newly_completed: transitioned,
        })
    }

    /// Record the next chapter as available once gating opens it
    fn unlock_next(&self, ctx: &PartnerContext, chapter: &Chapter) -> Result<(), LearningError> {
        let chapters = self.catalog.chapters_for_course(&chapter.course_id)?;
        let inputs = gate_inputs(&chapters);
        let Some(next) = gating::next_chapter(&inputs, &chapter.id) else {
            return Ok(());
        };

        let rows = self.progress_rows(ctx, &chapter.course_id)?;
        let visible = Self::visible_map(&chapters, &rows);
        if visible.get(next.chapter_id) != Some(&ChapterStatus::Available) {
            return Ok(());
        }

        let unlocked = self.db.with_conn(|conn| {
            progress::ensure_available(conn, ctx, next.chapter_id, &chapter.course_id)
        })?;

        if unlocked {
            info!(partner = %ctx.partner_id, chapter = %next.chapter_id, "Chapter unlocked");
            self.events.emit(LearningEvent::ChapterUnlocked {
                partner_id: ctx.partner_id.clone(),
                chapter_id: next.chapter_id.to_string(),
            });
        }
        Ok(())
    }
}
