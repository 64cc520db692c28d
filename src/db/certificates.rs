//! Certificate storage using Diesel
//!
//! One row per (partner, course), enforced by a unique index. Numbers come
//! from a per-course sequence that only ever increments.

use diesel::prelude::*;
use diesel::sql_types::{Integer, Text};
use uuid::Uuid;

use super::context::PartnerContext;
use super::diesel_schema::certificates;
use super::models::{CertificateRow, NewCertificate};
use crate::error::LearningError;

#[derive(QueryableByName)]
struct SequenceValue {
    #[diesel(sql_type = Integer)]
    last_value: i32,
}

/// Get the partner's certificate for a course
pub fn get_certificate(
    conn: &mut SqliteConnection,
    ctx: &PartnerContext,
    course_id: &str,
) -> Result<Option<CertificateRow>, LearningError> {
    certificates::table
        .filter(certificates::partner_id.eq(&ctx.partner_id))
        .filter(certificates::course_id.eq(course_id))
        .first(conn)
        .optional()
        .map_err(|e| LearningError::Database(format!("Query failed: {}", e)))
}

/// Look up a certificate by its public number
pub fn get_by_number(
    conn: &mut SqliteConnection,
    certificate_number: &str,
) -> Result<Option<CertificateRow>, LearningError> {
    certificates::table
        .filter(certificates::certificate_number.eq(certificate_number))
        .first(conn)
        .optional()
        .map_err(|e| LearningError::Database(format!("Query failed: {}", e)))
}

/// Claim the next sequence value for a course
///
/// Must run inside a write transaction together with the certificate
/// insert, otherwise a rollback could not return the value.
pub fn next_sequence(conn: &mut SqliteConnection, course_id: &str) -> Result<i32, LearningError> {
    diesel::sql_query(
        r#"
        INSERT INTO certificate_sequences (course_id, last_value) VALUES (?, 1)
        ON CONFLICT(course_id) DO UPDATE SET last_value = last_value + 1
        "#,
    )
    .bind::<Text, _>(course_id)
    .execute(conn)
    .map_err(|e| LearningError::Database(format!("Failed to advance sequence: {}", e)))?;

    let value: SequenceValue = diesel::sql_query(
        "SELECT last_value FROM certificate_sequences WHERE course_id = ?",
    )
    .bind::<Text, _>(course_id)
    .get_result(conn)
    .map_err(|e| LearningError::Database(format!("Failed to read sequence: {}", e)))?;

    Ok(value.last_value)
}

/// Insert a certificate; `Ok(None)` when the partner already holds one
pub fn insert_certificate(
    conn: &mut SqliteConnection,
    ctx: &PartnerContext,
    course_id: &str,
    certificate_number: &str,
    sequence: i32,
    issued_at: &str,
) -> Result<Option<CertificateRow>, LearningError> {
    let id = Uuid::new_v4().to_string();

    let inserted = diesel::insert_or_ignore_into(certificates::table)
        .values(&NewCertificate {
            id: &id,
            partner_id: &ctx.partner_id,
            course_id,
            certificate_number,
            sequence,
            issued_at,
        })
        .execute(conn)
        .map_err(|e| LearningError::Database(format!("Certificate insert failed: {}", e)))?;

    if inserted == 0 {
        return Ok(None);
    }

    get_certificate(conn, ctx, course_id)
}

