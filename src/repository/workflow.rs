//! Approval workflow for locator changes.

use chrono::Utc;
use tracing::info;

use crate::repository::types::{ApprovalStatus, LocatorVersion};

/// Rules controlling automatic approval of new locator versions.
#[derive(Debug, Clone)]
pub struct AutoApprovalRules {
    /// Versions at or above this confidence are approved without review.
    pub confidence_threshold: f64,
    /// Creators whose versions are approved without review.
    pub trusted_creators: Vec<String>,
}

impl Default for AutoApprovalRules {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.9,
            trusted_creators: vec!["system".to_string(), "admin".to_string()],
        }
    }
}

/// Decides whether a new locator version is auto-approved or queued for
/// manual review, and records approve/reject actions.
///
/// This layer only stamps approval fields; activation (flipping lifecycle
/// status, demoting the previous active version) belongs to the repository.
#[derive(Debug, Default)]
pub struct ApprovalWorkflow {
    rules: AutoApprovalRules,
}

impl ApprovalWorkflow {
    pub fn new(rules: AutoApprovalRules) -> Self {
        Self { rules }
    }

    /// Evaluate a freshly created version. Auto-approval stamps the
    /// version's approval fields in place and returns `AutoApproved`;
    /// otherwise the version stays `Pending`.
    pub fn submit_for_approval(
        &self,
        element_name: &str,
        version: &mut LocatorVersion,
    ) -> ApprovalStatus {
        if self.should_auto_approve(version) {
            version.approval_status = ApprovalStatus::AutoApproved;
            version.approved_by = Some("system".to_string());
            version.approved_at = Some(Utc::now());
            info!(
                element = element_name,
                version = version.version,
                "auto-approved locator version"
            );
            return ApprovalStatus::AutoApproved;
        }

        version.approval_status = ApprovalStatus::Pending;
        info!(
            element = element_name,
            version = version.version,
            "locator version submitted for manual approval"
        );
        ApprovalStatus::Pending
    }

    /// Record an approval decision. Recording-only at this layer.
    pub fn approve_version(&self, element_name: &str, version: u32, approver: &str) -> bool {
        info!(
            element = element_name,
            version, approver, "locator version approved"
        );
        true
    }

    /// Record a rejection decision. Recording-only at this layer.
    pub fn reject_version(
        &self,
        element_name: &str,
        version: u32,
        approver: &str,
        reason: &str,
    ) -> bool {
        info!(
            element = element_name,
            version, approver, reason, "locator version rejected"
        );
        true
    }

    fn should_auto_approve(&self, version: &LocatorVersion) -> bool {
        if version.confidence_score >= self.rules.confidence_threshold {
            return true;
        }
        self.rules
            .trusted_creators
            .iter()
            .any(|creator| creator == &version.created_by)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::types::NewLocator;

    fn workflow() -> ApprovalWorkflow {
        ApprovalWorkflow::default()
    }

    #[test]
    fn test_high_confidence_auto_approves() {
        let mut version =
            LocatorVersion::draft(1, NewLocator::new("#btn").created_by("dev").confidence(0.95));
        let status = workflow().submit_for_approval("btn", &mut version);

        assert_eq!(status, ApprovalStatus::AutoApproved);
        assert_eq!(version.approval_status, ApprovalStatus::AutoApproved);
        assert_eq!(version.approved_by.as_deref(), Some("system"));
        assert!(version.approved_at.is_some());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut version =
            LocatorVersion::draft(1, NewLocator::new("#btn").created_by("dev").confidence(0.9));
        assert_eq!(
            workflow().submit_for_approval("btn", &mut version),
            ApprovalStatus::AutoApproved
        );
    }

    #[test]
    fn test_trusted_creator_auto_approves() {
        for creator in ["system", "admin"] {
            let mut version =
                LocatorVersion::draft(1, NewLocator::new("#btn").created_by(creator));
            assert_eq!(
                workflow().submit_for_approval("btn", &mut version),
                ApprovalStatus::AutoApproved,
                "creator {creator} should be trusted"
            );
        }
    }

    #[test]
    fn test_untrusted_low_confidence_stays_pending() {
        let mut version =
            LocatorVersion::draft(1, NewLocator::new("#btn").created_by("dev").confidence(0.6));
        let status = workflow().submit_for_approval("btn", &mut version);

        assert_eq!(status, ApprovalStatus::Pending);
        assert_eq!(version.approval_status, ApprovalStatus::Pending);
        assert!(version.approved_by.is_none());
        assert!(version.approved_at.is_none());
    }

    #[test]
    fn test_custom_rules() {
        let workflow = ApprovalWorkflow::new(AutoApprovalRules {
            confidence_threshold: 0.5,
            trusted_creators: vec!["ci-bot".to_string()],
        });

        let mut low = LocatorVersion::draft(1, NewLocator::new("#a").created_by("system"));
        assert_eq!(
            workflow.submit_for_approval("a", &mut low),
            ApprovalStatus::Pending,
            "default trusted creators do not apply to custom rules"
        );

        let mut bot = LocatorVersion::draft(1, NewLocator::new("#a").created_by("ci-bot"));
        assert_eq!(
            workflow.submit_for_approval("a", &mut bot),
            ApprovalStatus::AutoApproved
        );
    }
}
