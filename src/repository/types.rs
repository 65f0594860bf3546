//! Data model for versioned element locators.
//!
//! Serde field names match the persisted JSON layout one-for-one, so a store
//! written by any prior build round-trips exactly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle status of a locator version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStatus {
    Active,
    Pending,
    Deprecated,
    Rejected,
    Draft,
}

/// Approval workflow status of a locator version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    AutoApproved,
}

/// One historical or candidate locator for an element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorVersion {
    /// 1-based, contiguous per element.
    pub version: u32,
    /// Primary CSS selector.
    pub css_selector: String,
    #[serde(default)]
    pub xpath_selector: Option<String>,
    #[serde(default)]
    pub alternatives: Vec<String>,
    /// Confidence in [0, 1] reported by whatever generated the locator.
    #[serde(default)]
    pub confidence_score: f64,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub status: LocatorStatus,
    pub approval_status: ApprovalStatus,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub usage_count: u64,
    /// Running success rate in [0, 1] over `usage_count` observations.
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ai_reasoning: Option<String>,
    #[serde(default)]
    pub validation_results: Map<String, Value>,
}

impl LocatorVersion {
    /// Build a DRAFT/PENDING version from caller-supplied locator data.
    pub fn draft(version: u32, locator: NewLocator) -> Self {
        Self {
            version,
            css_selector: locator.css_selector,
            xpath_selector: locator.xpath_selector,
            alternatives: locator.alternatives,
            confidence_score: locator.confidence_score,
            created_at: Utc::now(),
            created_by: locator.created_by,
            status: LocatorStatus::Draft,
            approval_status: ApprovalStatus::Pending,
            approved_by: None,
            approved_at: None,
            usage_count: 0,
            success_rate: 0.0,
            last_used: None,
            ai_reasoning: locator.ai_reasoning,
            validation_results: Map::new(),
        }
    }
}

/// All versions of one named UI element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementRecord {
    pub element_name: String,
    /// Index = version - 1.
    pub versions: Vec<LocatorVersion>,
    /// 1-based index of the active version; 0 means none is active.
    pub active_version: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub page_context: Option<Map<String, Value>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ElementRecord {
    pub fn new(element_name: impl Into<String>, versions: Vec<LocatorVersion>, active: u32) -> Self {
        let now = Utc::now();
        Self {
            element_name: element_name.into(),
            versions,
            active_version: active,
            description: None,
            tags: Vec::new(),
            page_context: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The currently active version, if any.
    pub fn get_active_version(&self) -> Option<&LocatorVersion> {
        if self.active_version >= 1 {
            self.versions.get(self.active_version as usize - 1)
        } else {
            None
        }
    }

    pub fn get_active_version_mut(&mut self) -> Option<&mut LocatorVersion> {
        if self.active_version >= 1 {
            self.versions.get_mut(self.active_version as usize - 1)
        } else {
            None
        }
    }

    /// The most recent version (may not be active).
    pub fn get_latest_version(&self) -> Option<&LocatorVersion> {
        self.versions.last()
    }
}

/// Caller-supplied data for a new locator version. Everything except the
/// primary selector has a default.
#[derive(Debug, Clone)]
pub struct NewLocator {
    pub css_selector: String,
    pub xpath_selector: Option<String>,
    pub alternatives: Vec<String>,
    pub created_by: String,
    pub ai_reasoning: Option<String>,
    pub confidence_score: f64,
}

impl NewLocator {
    pub fn new(css_selector: impl Into<String>) -> Self {
        Self {
            css_selector: css_selector.into(),
            xpath_selector: None,
            alternatives: Vec::new(),
            created_by: "system".to_string(),
            ai_reasoning: None,
            confidence_score: 0.0,
        }
    }

    pub fn xpath(mut self, selector: impl Into<String>) -> Self {
        self.xpath_selector = Some(selector.into());
        self
    }

    pub fn alternatives(mut self, alternatives: Vec<String>) -> Self {
        self.alternatives = alternatives;
        self
    }

    pub fn created_by(mut self, creator: impl Into<String>) -> Self {
        self.created_by = creator.into();
        self
    }

    pub fn reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.ai_reasoning = Some(reasoning.into());
        self
    }

    pub fn confidence(mut self, score: f64) -> Self {
        self.confidence_score = score;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_draft_version_defaults() {
        let version = LocatorVersion::draft(1, NewLocator::new("#login-btn"));
        assert_eq!(version.version, 1);
        assert_eq!(version.css_selector, "#login-btn");
        assert_eq!(version.status, LocatorStatus::Draft);
        assert_eq!(version.approval_status, ApprovalStatus::Pending);
        assert_eq!(version.created_by, "system");
        assert_eq!(version.usage_count, 0);
    }

    #[test]
    fn test_active_version_lookup() {
        let v1 = LocatorVersion::draft(1, NewLocator::new("#a"));
        let v2 = LocatorVersion::draft(2, NewLocator::new("#b"));
        let mut record = ElementRecord::new("elem", vec![v1, v2], 2);

        assert_eq!(record.get_active_version().unwrap().css_selector, "#b");
        assert_eq!(record.get_latest_version().unwrap().version, 2);

        record.active_version = 0;
        assert!(record.get_active_version().is_none());

        // Out-of-range index behaves like no active version.
        record.active_version = 9;
        assert!(record.get_active_version().is_none());
    }

    #[test]
    fn test_status_wire_values() {
        assert_eq!(
            serde_json::to_value(LocatorStatus::Active).unwrap(),
            serde_json::json!("active")
        );
        assert_eq!(
            serde_json::to_value(ApprovalStatus::AutoApproved).unwrap(),
            serde_json::json!("auto_approved")
        );
    }

    #[test]
    fn test_record_round_trip() {
        let mut version = LocatorVersion::draft(
            1,
            NewLocator::new("#submit")
                .xpath("//button[@id='submit']")
                .alternatives(vec!["button.submit".to_string()])
                .created_by("admin")
                .reasoning("unique id on the page")
                .confidence(0.95),
        );
        version.status = LocatorStatus::Active;
        version.approval_status = ApprovalStatus::AutoApproved;
        let record = ElementRecord::new("submit_btn", vec![version], 1);

        let json = serde_json::to_string(&record).unwrap();
        let restored: ElementRecord = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.element_name, "submit_btn");
        assert_eq!(restored.active_version, 1);
        let v = restored.get_active_version().unwrap();
        assert_eq!(v.css_selector, "#submit");
        assert_eq!(v.xpath_selector.as_deref(), Some("//button[@id='submit']"));
        assert_eq!(v.confidence_score, 0.95);
        assert_eq!(v.approval_status, ApprovalStatus::AutoApproved);
    }
}
