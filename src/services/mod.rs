//! Service layer for partner-academy
//!
//! Services hold the progression rules between HTTP handlers and the
//! repositories. Each one wraps database operations with:
//! - Gating checks against the partner's visible chapter status
//! - Cross-entity orchestration (progress -> unlock -> certificate)
//! - Event emission for audit/notifications
//! - Transaction boundaries
//!
//! ## Architecture
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! VideoService / AssessmentService
//!     ↓
//! ProgressService (single writer of chapter status)
//!     ↓
//! CertificateService
//!     ↓
//! Repository Layer (db/*.rs)
//! ```

pub mod response;
pub mod events;
pub mod certificate_service;
pub mod progress_service;
pub mod video_service;
pub mod assessment_service;

// Re-exports
pub use response::*;
pub use events::{EventBus, EventListener, LearningEvent};
pub use certificate_service::{CertificateService, CertificateView, VerifiedCertificate};
pub use progress_service::{ChapterView, CompletionCheck, CourseOverview, ProgressService};
pub use video_service::{VideoProgressView, VideoService};
pub use assessment_service::{
    AssessmentService, Answers, AttemptView, SubmissionResult, SubmitOutcome, TestView,
};

use std::sync::Arc;

use crate::catalog::CourseCatalog;
use crate::config::Config;
use crate::db::LearningDb;

/// Tunables the services need from the configuration
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub watch_threshold: f64,
    pub certificate_prefix: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            watch_threshold: 0.8,
            certificate_prefix: "CERT".to_string(),
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            watch_threshold: config.watch_threshold,
            certificate_prefix: config.certificate_prefix.clone(),
        }
    }
}

/// Service container for dependency injection
///
/// Holds all services with shared database and catalog.
/// Pass this to HttpServer for handler access.
pub struct Services {
    pub db: Arc<LearningDb>,
    pub catalog: Arc<dyn CourseCatalog>,
    pub progress: Arc<ProgressService>,
    pub video: Arc<VideoService>,
    pub assessment: Arc<AssessmentService>,
    pub certificates: Arc<CertificateService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services with a fresh event bus
    pub fn new(db: Arc<LearningDb>, catalog: Arc<dyn CourseCatalog>, settings: EngineSettings) -> Self {
        Self::with_events(db, catalog, settings, Arc::new(EventBus::new()))
    }

    /// Create all services publishing on the given event bus
    pub fn with_events(
        db: Arc<LearningDb>,
        catalog: Arc<dyn CourseCatalog>,
        settings: EngineSettings,
        events: Arc<EventBus>,
    ) -> Self {
        let certificates = Arc::new(CertificateService::new(
            db.clone(),
            catalog.clone(),
            events.clone(),
            settings.certificate_prefix,
        ));
        let progress = Arc::new(ProgressService::new(
            db.clone(),
            catalog.clone(),
            events.clone(),
            certificates.clone(),
        ));
        let video = Arc::new(VideoService::new(
            db.clone(),
            catalog.clone(),
            events.clone(),
            progress.clone(),
            settings.watch_threshold,
        ));
        let assessment = Arc::new(AssessmentService::new(
            db.clone(),
            catalog.clone(),
            events.clone(),
            progress.clone(),
        ));

        Self {
            db,
            catalog,
            progress,
            video,
            assessment,
            certificates,
            events,
        }
    }
}
