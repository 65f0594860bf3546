//! Versioned element-locator repository.
//!
//! The repository owns the authoritative `name -> ElementRecord` map and
//! coordinates the snapshot cache, the approval workflow, and JSON file
//! persistence. All mutating operations serialize through one async mutex;
//! cache mutation happens inside the same critical section, so a concurrent
//! writer can never leave a stale snapshot visible.
//!
//! Persistence failures are logged and swallowed here: callers must not rely
//! on strong durability (a failed save is silent by contract).

pub mod cache;
pub mod types;
pub mod workflow;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::RepositoryConfig;
use crate::repository::cache::{CacheStats, LocatorCache};
use crate::repository::types::{
    ApprovalStatus, ElementRecord, LocatorStatus, LocatorVersion, NewLocator,
};
use crate::repository::workflow::ApprovalWorkflow;

/// Failures surfaced by repository mutations.
///
/// The "already exists" / "does not exist" phrasings are load-bearing:
/// downstream consumers match on these substrings.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Element '{0}' already exists")]
    AlreadyExists(String),

    #[error("Element '{0}' does not exist")]
    DoesNotExist(String),
}

/// Repository-wide statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RepositoryStats {
    pub total_elements: usize,
    pub total_versions: usize,
    pub pending_approvals: usize,
    pub cache_stats: CacheStats,
    pub storage_path: String,
}

struct RepoInner {
    /// BTreeMap keeps scan order deterministic and stable across reloads.
    elements: BTreeMap<String, ElementRecord>,
    initialized: bool,
}

/// Authoritative store of versioned element locators.
///
/// Shared via `Arc`; one instance per process, constructed by the bootstrap
/// and injected into whatever needs it (tool bodies, server facade).
pub struct ElementRepository {
    storage_path: PathBuf,
    cache: LocatorCache,
    workflow: ApprovalWorkflow,
    inner: Arc<Mutex<RepoInner>>,
}

impl ElementRepository {
    pub fn new(config: RepositoryConfig) -> Self {
        Self {
            storage_path: config.storage_path,
            cache: LocatorCache::new(config.cache),
            workflow: ApprovalWorkflow::default(),
            inner: Arc::new(Mutex::new(RepoInner {
                elements: BTreeMap::new(),
                initialized: false,
            })),
        }
    }

    /// Load the authoritative map from the storage file, if it exists.
    /// Calling twice is a no-op: the loaded map is never overwritten.
    pub async fn initialize(&self) {
        let mut inner = self.inner.lock().await;
        if inner.initialized {
            warn!("repository already initialized, ignoring second initialize()");
            return;
        }

        match tokio::fs::read(&self.storage_path).await {
            Ok(bytes) => match serde_json::from_slice::<BTreeMap<String, ElementRecord>>(&bytes) {
                Ok(elements) => inner.elements = elements,
                Err(e) => error!(path = %self.storage_path.display(), "failed to parse storage: {e}"),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no existing storage found, starting with empty repository");
            }
            Err(e) => error!(path = %self.storage_path.display(), "failed to read storage: {e}"),
        }

        inner.initialized = true;
        info!(
            elements = inner.elements.len(),
            "element repository initialized"
        );
    }

    /// Cache-first lookup.
    ///
    /// Unless `include_inactive` is set, a record without a confirmed-active
    /// version is treated as absent on the authoritative path. Cache hits
    /// return whatever snapshot a writer last published.
    pub async fn get_element(
        &self,
        element_name: &str,
        include_inactive: bool,
    ) -> Option<ElementRecord> {
        let start = Instant::now();

        if let Some(cached) = self.cache.get(element_name) {
            debug!(
                element = element_name,
                elapsed_us = start.elapsed().as_micros() as u64,
                "cache hit"
            );
            return Some(cached);
        }

        let inner = self.inner.lock().await;
        let record = inner.elements.get(element_name)?;

        if !include_inactive
            && !record
                .get_active_version()
                .is_some_and(|v| v.status == LocatorStatus::Active)
        {
            return None;
        }

        self.cache.put(element_name, record.clone());
        debug!(
            element = element_name,
            elapsed_us = start.elapsed().as_micros() as u64,
            "retrieved from authoritative map"
        );
        Some(record.clone())
    }

    /// Create a new element with version 1.
    ///
    /// The initial version starts as DRAFT; when the workflow auto-approves
    /// it, it becomes the ACTIVE version immediately, otherwise the element
    /// has no active version until someone approves it.
    pub async fn create_element(
        &self,
        element_name: &str,
        locator: NewLocator,
    ) -> Result<ElementRecord, RepositoryError> {
        let mut inner = self.inner.lock().await;
        if inner.elements.contains_key(element_name) {
            return Err(RepositoryError::AlreadyExists(element_name.to_string()));
        }

        let mut version = LocatorVersion::draft(1, locator);
        let approval = self.workflow.submit_for_approval(element_name, &mut version);
        if approval == ApprovalStatus::AutoApproved {
            version.status = LocatorStatus::Active;
        }

        let active = if version.status == LocatorStatus::Active {
            1
        } else {
            0
        };
        let record = ElementRecord::new(element_name, vec![version], active);

        inner
            .elements
            .insert(element_name.to_string(), record.clone());
        self.cache.put(element_name, record.clone());
        self.persist(&inner.elements).await;

        info!(
            element = element_name,
            active = record.active_version > 0,
            "created element"
        );
        Ok(record)
    }

    /// Append a new version to an existing element.
    ///
    /// The version number is assigned under the lock, so concurrent calls
    /// against the same element never collide. Auto-approved versions are
    /// activated immediately (demoting the previous active version).
    pub async fn add_version(
        &self,
        element_name: &str,
        locator: NewLocator,
    ) -> Result<LocatorVersion, RepositoryError> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .elements
            .get_mut(element_name)
            .ok_or_else(|| RepositoryError::DoesNotExist(element_name.to_string()))?;

        let next_version = record.versions.len() as u32 + 1;
        let mut version = LocatorVersion::draft(next_version, locator);
        let approval = self.workflow.submit_for_approval(element_name, &mut version);

        record.versions.push(version);
        if approval == ApprovalStatus::AutoApproved {
            activate_version(record, next_version);
        }
        record.updated_at = chrono::Utc::now();
        let added = record.versions[next_version as usize - 1].clone();

        // Force the next read through the authoritative map.
        self.cache.invalidate(element_name);
        self.persist(&inner.elements).await;

        info!(
            element = element_name,
            version = next_version,
            "added locator version"
        );
        Ok(added)
    }

    /// Approve a pending version and activate it.
    ///
    /// Returns false when the element is unknown, the version number is out
    /// of range, or the version is not awaiting approval.
    pub async fn approve_version(
        &self,
        element_name: &str,
        version_number: u32,
        approver: &str,
    ) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(record) = inner.elements.get_mut(element_name) else {
            return false;
        };
        if version_number == 0 || version_number as usize > record.versions.len() {
            return false;
        }

        let version = &mut record.versions[version_number as usize - 1];
        if version.approval_status != ApprovalStatus::Pending {
            return false;
        }

        version.approval_status = ApprovalStatus::Approved;
        version.approved_by = Some(approver.to_string());
        version.approved_at = Some(chrono::Utc::now());
        self.workflow
            .approve_version(element_name, version_number, approver);

        activate_version(record, version_number);

        self.cache.invalidate(element_name);
        self.persist(&inner.elements).await;

        info!(
            element = element_name,
            version = version_number,
            approver, "approved and activated version"
        );
        true
    }

    /// Reject a pending version. The version keeps its slot (numbering stays
    /// contiguous) but is never eligible for activation.
    pub async fn reject_version(
        &self,
        element_name: &str,
        version_number: u32,
        approver: &str,
        reason: &str,
    ) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(record) = inner.elements.get_mut(element_name) else {
            return false;
        };
        if version_number == 0 || version_number as usize > record.versions.len() {
            return false;
        }

        let version = &mut record.versions[version_number as usize - 1];
        if version.approval_status != ApprovalStatus::Pending {
            return false;
        }

        version.approval_status = ApprovalStatus::Rejected;
        version.status = LocatorStatus::Rejected;
        version.approved_by = Some(approver.to_string());
        version.approved_at = Some(chrono::Utc::now());
        record.updated_at = chrono::Utc::now();
        self.workflow
            .reject_version(element_name, version_number, approver, reason);

        self.cache.invalidate(element_name);
        self.persist(&inner.elements).await;
        true
    }

    /// Record one usage observation against the active version.
    ///
    /// Unknown elements and elements without an active version are ignored.
    /// The durable write is fire-and-forget: the caller is not blocked on
    /// persistence completing.
    pub async fn update_usage_stats(&self, element_name: &str, success: bool) {
        let mut inner = self.inner.lock().await;
        let Some(record) = inner.elements.get_mut(element_name) else {
            return;
        };
        let Some(active) = record.get_active_version_mut() else {
            return;
        };

        active.usage_count += 1;
        active.last_used = Some(chrono::Utc::now());
        if active.usage_count == 1 {
            active.success_rate = if success { 1.0 } else { 0.0 };
        } else {
            let mut successes = active.success_rate * (active.usage_count - 1) as f64;
            if success {
                successes += 1.0;
            }
            active.success_rate = successes / active.usage_count as f64;
        }

        self.cache.invalidate(element_name);
        drop(inner);

        // Detached save. It serializes whatever the map holds when it gets
        // the lock, and writes while still holding it, so a slow save can
        // never land a stale snapshot over a later mutation's persist.
        let path = self.storage_path.clone();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let inner = inner.lock().await;
            save_to_disk(&path, &inner.elements).await;
        });
    }

    /// Case-insensitive substring search over element names and the active
    /// version's selectors. A name match short-circuits the selector checks
    /// for that element. Scanning stops once `limit` results are collected.
    pub async fn search_elements(&self, query: &str, limit: usize) -> Vec<ElementRecord> {
        let needle = query.to_lowercase();
        let inner = self.inner.lock().await;
        let mut results = Vec::new();

        for (element_name, record) in &inner.elements {
            if results.len() >= limit {
                break;
            }

            if element_name.to_lowercase().contains(&needle) {
                results.push(record.clone());
                continue;
            }

            let Some(active) = record.get_active_version() else {
                continue;
            };
            let selector_match = active.css_selector.to_lowercase().contains(&needle)
                || active
                    .xpath_selector
                    .as_ref()
                    .is_some_and(|s| s.to_lowercase().contains(&needle))
                || active
                    .alternatives
                    .iter()
                    .any(|alt| alt.to_lowercase().contains(&needle));
            if selector_match {
                results.push(record.clone());
            }
        }

        results
    }

    /// All versions across all elements whose approval status is PENDING,
    /// in element-name order then version order.
    pub async fn get_pending_approvals(&self) -> Vec<(String, LocatorVersion)> {
        let inner = self.inner.lock().await;
        let mut pending = Vec::new();
        for (element_name, record) in &inner.elements {
            for version in &record.versions {
                if version.approval_status == ApprovalStatus::Pending {
                    pending.push((element_name.clone(), version.clone()));
                }
            }
        }
        pending
    }

    pub async fn get_stats(&self) -> RepositoryStats {
        let inner = self.inner.lock().await;
        let total_versions = inner.elements.values().map(|r| r.versions.len()).sum();
        let pending_approvals = inner
            .elements
            .values()
            .flat_map(|r| &r.versions)
            .filter(|v| v.approval_status == ApprovalStatus::Pending)
            .count();

        RepositoryStats {
            total_elements: inner.elements.len(),
            total_versions,
            pending_approvals,
            cache_stats: self.cache.get_stats(),
            storage_path: self.storage_path.display().to_string(),
        }
    }

    /// Flush persistence and drop all cached snapshots. Safe to call during
    /// shutdown even when nothing changed since the last persist.
    pub async fn cleanup(&self) {
        let inner = self.inner.lock().await;
        self.persist(&inner.elements).await;
        self.cache.clear();
        info!("element repository cleaned up");
    }

    /// Cache statistics, exposed for the stats tool and benchmarks.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.get_stats()
    }

    /// Durable write of the full map. Failures are logged, never propagated.
    async fn persist(&self, elements: &BTreeMap<String, ElementRecord>) {
        save_to_disk(&self.storage_path, elements).await;
    }
}

/// Serialize and atomically replace the storage file. Callers hold the
/// repository lock, which orders every write against every mutation.
async fn save_to_disk(path: &Path, elements: &BTreeMap<String, ElementRecord>) {
    match serde_json::to_vec_pretty(elements) {
        Ok(bytes) => {
            if let Err(e) = write_atomic(path, &bytes).await {
                error!(path = %path.display(), "failed to save storage: {e}");
            }
        }
        Err(e) => error!("failed to serialize storage: {e}"),
    }
}

/// Activate `version_number` on `record`, demoting the previous active
/// version to DEPRECATED. Callers hold the repository lock.
fn activate_version(record: &mut ElementRecord, version_number: u32) {
    if let Some(current) = record.get_active_version_mut() {
        current.status = LocatorStatus::Deprecated;
    }
    let target = &mut record.versions[version_number as usize - 1];
    target.status = LocatorStatus::Active;
    record.active_version = version_number;
    record.updated_at = chrono::Utc::now();
}

/// Write to a sibling temp file, then rename into place, so a crash
/// mid-write cannot leave a truncated store behind.
async fn write_atomic(path: &std::path::Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}
