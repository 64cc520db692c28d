//! Video service - ingests playback reports
//!
//! Reports may arrive late, twice or out of order. The stored position
//! only grows and `video_watched` only turns on, so any ordering of the
//! same reports ends in the same row.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use ts_rs::TS;

use crate::catalog::CourseCatalog;
use crate::db::{progress, LearningDb, PartnerContext};
use crate::error::LearningError;
use crate::gating::ChapterStatus;
use crate::video::PlaybackReport;

use super::events::{EventBus, LearningEvent};
use super::progress_service::ProgressService;

/// Video state after a report was merged
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct VideoProgressView {
    pub chapter_id: String,
    pub video_progress_seconds: f64,
    pub video_watched: bool,
    pub status: ChapterStatus,
    pub chapter_completed: bool,
}

/// Video service for business logic
pub struct VideoService {
    db: Arc<LearningDb>,
    catalog: Arc<dyn CourseCatalog>,
    events: Arc<EventBus>,
    progress: Arc<ProgressService>,
    watch_threshold: f64,
}

impl VideoService {
    /// Create a new video service
    pub fn new(
        db: Arc<LearningDb>,
        catalog: Arc<dyn CourseCatalog>,
        events: Arc<EventBus>,
        progress: Arc<ProgressService>,
        watch_threshold: f64,
    ) -> Self {
        Self {
            db,
            catalog,
            events,
            progress,
            watch_threshold,
        }
    }

    /// Merge a playback report and re-check chapter completion
    ///
    /// Malformed reports fail with `InvalidProgress` before anything is
    /// read or written.
    pub fn report_progress(
        &self,
        ctx: &PartnerContext,
        chapter_id: &str,
        position_seconds: f64,
        duration_seconds: f64,
        ended: bool,
    ) -> Result<VideoProgressView, LearningError> {
        let report = match PlaybackReport::new(position_seconds, duration_seconds, ended) {
            Ok(report) => report,
            Err(e) => {
                warn!(partner = %ctx.partner_id, chapter = %chapter_id, error = %e, "Dropped playback report");
                return Err(e);
            }
        };

        let chapter = self.catalog.require_chapter(chapter_id)?;
        let Some(video) = chapter.video.as_ref() else {
            warn!(partner = %ctx.partner_id, chapter = %chapter_id, "Playback report for chapter without video");
            return Err(LearningError::InvalidProgress(format!(
                "chapter {} has no video",
                chapter_id
            )));
        };

        let visible = self.progress.ensure_accessible(ctx, &chapter)?;
        let watched = report.is_watched(video.duration_seconds, self.watch_threshold);

        let (was_watched, row) = self.db.with_conn(|conn| {
            let before = progress::get_progress(conn, ctx, chapter_id)?;
            let row = progress::merge_video_progress(
                conn,
                ctx,
                &chapter.id,
                &chapter.course_id,
                visible.min(ChapterStatus::Available),
                report.position_seconds,
                watched,
            )?;
            Ok((before.map_or(false, |r| r.video_watched), row))
        })?;

        if row.video_watched && !was_watched {
            info!(partner = %ctx.partner_id, chapter = %chapter_id, "Video watched");
            self.events.emit(LearningEvent::VideoWatched {
                partner_id: ctx.partner_id.clone(),
                chapter_id: chapter.id.clone(),
            });
        }

        let completion = self.progress.evaluate_completion(ctx, chapter_id)?;
        let status = if completion.completed {
            ChapterStatus::Completed
        } else {
            row.status().max(visible)
        };

        Ok(VideoProgressView {
            chapter_id: chapter.id.clone(),
            video_progress_seconds: row.video_progress_seconds,
            video_watched: row.video_watched,
            status,
            chapter_completed: completion.completed,
        })
    }
}
