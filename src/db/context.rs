//! Partner context for per-partner database operations
//!
//! Every progress, attempt and certificate operation is scoped by the
//! authenticated partner handed over by the identity collaborator. The
//! engine never keeps "current partner" state of its own.

use crate::error::LearningError;

/// Authenticated partner attached to a request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartnerContext {
    /// Partner identifier for scoping database operations
    pub partner_id: String,
}

impl PartnerContext {
    /// Create a partner context, rejecting blank identifiers
    pub fn new(partner_id: impl Into<String>) -> Result<Self, LearningError> {
        let partner_id = partner_id.into();
        let trimmed = partner_id.trim();
        if trimmed.is_empty() {
            return Err(LearningError::Unauthorized("partner id is required".into()));
        }
        if trimmed.len() > 255 {
            return Err(LearningError::Unauthorized("partner id must be <= 255 characters".into()));
        }
        Ok(Self {
            partner_id: trimmed.to_string(),
        })
    }

    /// Get the partner_id as a string reference
    pub fn partner_id(&self) -> &str {
        &self.partner_id
    }
}

impl std::fmt::Display for PartnerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PartnerContext({})", self.partner_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_partner_id() {
        let ctx = PartnerContext::new("  partner-7 ").unwrap();
        assert_eq!(ctx.partner_id(), "partner-7");
    }

    #[test]
    fn test_rejects_blank() {
        assert!(matches!(PartnerContext::new("   "), Err(LearningError::Unauthorized(_))));
        assert!(PartnerContext::new("x".repeat(300)).is_err());
    }
}
