//! Certificate service - issues course certificates exactly once
//!
//! Issuance runs in a write transaction: the existing-row check, the
//! sequence bump and the insert are one unit, and the unique index on
//! (partner_id, course_id) backs it. Concurrent triggers for the same
//! partner and course all get the same certificate back.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use ts_rs::TS;

use crate::catalog::CourseCatalog;
use crate::db::models::current_timestamp;
use crate::db::{certificates, progress, CertificateRow, LearningDb, PartnerContext};
use crate::error::LearningError;
use crate::gating::ChapterStatus;

use super::events::{EventBus, LearningEvent};

/// Certificate as shown to its holder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct CertificateView {
    pub certificate_number: String,
    pub course_id: String,
    pub issued_at: String,
}

impl From<CertificateRow> for CertificateView {
    fn from(row: CertificateRow) -> Self {
        Self {
            certificate_number: row.certificate_number,
            course_id: row.course_id,
            issued_at: row.issued_at,
        }
    }
}

/// Public verification record
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct VerifiedCertificate {
    pub certificate_number: String,
    pub partner_id: String,
    pub course_id: String,
    pub issued_at: String,
}

/// Certificate service for business logic
pub struct CertificateService {
    db: Arc<LearningDb>,
    catalog: Arc<dyn CourseCatalog>,
    events: Arc<EventBus>,
    prefix: String,
}

impl CertificateService {
    /// Create a new certificate service
    pub fn new(
        db: Arc<LearningDb>,
        catalog: Arc<dyn CourseCatalog>,
        events: Arc<EventBus>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            db,
            catalog,
            events,
            prefix: prefix.into(),
        }
    }

    /// Issue the course certificate if every chapter is completed
    ///
    /// Returns `Ok(None)` while the course is incomplete. Repeated calls
    /// return the stored certificate unchanged.
    pub fn check_and_issue(
        &self,
        ctx: &PartnerContext,
        course_id: &str,
    ) -> Result<Option<CertificateView>, LearningError> {
        let course = self.catalog.require_course(course_id)?;
        if course.chapter_ids.is_empty() {
            return Ok(None);
        }

        let rows = self
            .db
            .with_conn(|conn| progress::get_progress_for_course(conn, ctx, course_id))?;
        let completed: HashSet<&str> = rows
            .iter()
            .filter(|r| r.status() == ChapterStatus::Completed)
            .map(|r| r.chapter_id.as_str())
            .collect();

        if !course.chapter_ids.iter().all(|id| completed.contains(id.as_str())) {
            debug!(
                partner = %ctx.partner_id,
                course = %course_id,
                completed = completed.len(),
                total = course.chapter_ids.len(),
                "Course not complete yet"
            );
            return Ok(None);
        }

        let fingerprint = partner_fingerprint(course_id, &ctx.partner_id);
        let (row, issued_now) = self.db.with_write_txn(|conn| {
            if let Some(existing) = certificates::get_certificate(conn, ctx, course_id)? {
                return Ok((existing, false));
            }

            let sequence = certificates::next_sequence(conn, course_id)?;
            let number = format_certificate_number(&self.prefix, course_id, sequence, &fingerprint);
            let issued_at = current_timestamp();

            match certificates::insert_certificate(conn, ctx, course_id, &number, sequence, &issued_at)? {
                Some(row) => Ok((row, true)),
                None => Err(LearningError::Internal(format!(
                    "certificate number {} already assigned",
                    number
                ))),
            }
        })?;

        if issued_now {
            info!(
                partner = %ctx.partner_id,
                course = %course_id,
                number = %row.certificate_number,
                "Issued certificate"
            );
            self.events.emit(LearningEvent::CertificateIssued {
                partner_id: ctx.partner_id.clone(),
                course_id: course_id.to_string(),
                certificate_number: row.certificate_number.clone(),
            });
        }

        Ok(Some(row.into()))
    }

    /// Get the partner's certificate, issuing it first if it is due
    pub fn get_certificate(
        &self,
        ctx: &PartnerContext,
        course_id: &str,
    ) -> Result<CertificateView, LearningError> {
        self.check_and_issue(ctx, course_id)?
            .ok_or_else(|| LearningError::NotYetEarned {
                course_id: course_id.to_string(),
            })
    }

    /// Stored certificate without attempting issuance
    pub fn find(
        &self,
        ctx: &PartnerContext,
        course_id: &str,
    ) -> Result<Option<CertificateView>, LearningError> {
        let row = self
            .db
            .with_conn(|conn| certificates::get_certificate(conn, ctx, course_id))?;
        Ok(row.map(CertificateView::from))
    }

    /// Public lookup by certificate number
    pub fn verify(&self, certificate_number: &str) -> Result<Option<VerifiedCertificate>, LearningError> {
        let row = self
            .db
            .with_conn(|conn| certificates::get_by_number(conn, certificate_number))?;
        Ok(row.map(|r| VerifiedCertificate {
            certificate_number: r.certificate_number,
            partner_id: r.partner_id,
            course_id: r.course_id,
            issued_at: r.issued_at,
        }))
    }
}

/// First 8 hex digits of SHA-256 over `course_id:partner_id`
fn partner_fingerprint(course_id: &str, partner_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(course_id.as_bytes());
    hasher.update(b":");
    hasher.update(partner_id.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..4])
}

/// `{prefix}-{course_id}-{sequence:06}-{fingerprint}`
///
/// The sequence never repeats within a course, but a course id containing
/// `-` can still format to another course's number. The
/// UNIQUE constraint on `certificate_number` rejects such a collision, which
/// surfaces as `Internal`.
fn format_certificate_number(prefix: &str, course_id: &str, sequence: i32, fingerprint: &str) -> String {
    format!("{}-{}-{:06}-{}", prefix, course_id, sequence, fingerprint)
}
