//! Thread-safe aggregate of what an import attempt did.
//!
//! Every persistence worker writes here concurrently. Counters are locked per
//! entity category so unrelated categories never contend, and the abort flag
//! is a one-way latch.

use super::record::kind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Entity categories counted separately in the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityCategory {
    Users,
    Versions,
    Components,
    RoleMembers,
    Issues,
    Comments,
    Worklogs,
    ChangeGroups,
    ChangeItems,
    IssueLinks,
    NodeAssociations,
    UserAssociations,
    Labels,
    EntityProperties,
    Attachments,
    CustomFieldValues,
}

impl EntityCategory {
    pub const ALL: [Self; 16] = [
        Self::Users,
        Self::Versions,
        Self::Components,
        Self::RoleMembers,
        Self::Issues,
        Self::Comments,
        Self::Worklogs,
        Self::ChangeGroups,
        Self::ChangeItems,
        Self::IssueLinks,
        Self::NodeAssociations,
        Self::UserAssociations,
        Self::Labels,
        Self::EntityProperties,
        Self::Attachments,
        Self::CustomFieldValues,
    ];

    /// Category counting records of an export kind. Kinds not listed are
    /// custom field value kinds supplied by parsers.
    #[must_use]
    pub fn for_kind(entity_kind: &str) -> Self {
        match entity_kind {
            kind::USER => Self::Users,
            kind::VERSION => Self::Versions,
            kind::COMPONENT => Self::Components,
            kind::PROJECT_ROLE_ACTOR => Self::RoleMembers,
            kind::ISSUE => Self::Issues,
            kind::COMMENT => Self::Comments,
            kind::WORKLOG => Self::Worklogs,
            kind::CHANGE_GROUP => Self::ChangeGroups,
            kind::CHANGE_ITEM => Self::ChangeItems,
            kind::ISSUE_LINK => Self::IssueLinks,
            kind::NODE_ASSOCIATION => Self::NodeAssociations,
            kind::USER_ASSOCIATION => Self::UserAssociations,
            kind::LABEL => Self::Labels,
            kind::ENTITY_PROPERTY => Self::EntityProperties,
            kind::FILE_ATTACHMENT => Self::Attachments,
            _ => Self::CustomFieldValues,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Created/skipped/failed tally for one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Users and groups added to one project role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RoleMemberCounts {
    pub users: usize,
    pub groups: usize,
}

/// The destination project the attempt wrote into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportedProject {
    pub id: String,
    pub key: String,
    pub created: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct ImportResults {
    counts: [Mutex<EntityCounts>; EntityCategory::ALL.len()],
    errors: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
    role_members: Mutex<BTreeMap<String, RoleMemberCounts>>,
    project: Mutex<Option<ImportedProject>>,
    aborted: AtomicBool,
    cancelled: AtomicBool,
    error_limit: usize,
    started_at: DateTime<Utc>,
    finished_at: Mutex<Option<DateTime<Utc>>>,
}

impl ImportResults {
    /// `error_limit` is the soft-error count at which the import aborts.
    #[must_use]
    pub fn new(error_limit: usize) -> Self {
        Self {
            counts: std::array::from_fn(|_| Mutex::new(EntityCounts::default())),
            errors: Mutex::new(Vec::new()),
            warnings: Mutex::new(Vec::new()),
            role_members: Mutex::new(BTreeMap::new()),
            project: Mutex::new(None),
            aborted: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            error_limit: error_limit.max(1),
            started_at: Utc::now(),
            finished_at: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn error_limit(&self) -> usize {
        self.error_limit
    }

    /// Record a soft error; trips the abort latch once the limit is reached.
    pub fn add_error(&self, message: impl Into<String>) {
        let message = message.into();
        let total = {
            let mut errors = lock(&self.errors);
            errors.push(message.clone());
            errors.len()
        };
        tracing::warn!(errors = total, limit = self.error_limit, "{message}");
        if total >= self.error_limit && !self.aborted.swap(true, Ordering::SeqCst) {
            tracing::error!(
                errors = total,
                limit = self.error_limit,
                "Error limit reached, aborting project import"
            );
        }
    }

    pub fn add_warning(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        lock(&self.warnings).push(message);
    }

    /// Stop the attempt without an error (caller-initiated cancel).
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if !self.aborted.swap(true, Ordering::SeqCst) {
            tracing::info!("Project import cancelled by caller");
        }
    }

    /// True if the abort came from [`ImportResults::cancel`].
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// True once the attempt must stop submitting new work.
    #[must_use]
    pub fn abort_import(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn increment_created(&self, category: EntityCategory) {
        lock(&self.counts[category.index()]).created += 1;
    }

    pub fn increment_skipped(&self, category: EntityCategory) {
        lock(&self.counts[category.index()]).skipped += 1;
    }

    /// Count a failed entity and record its error.
    pub fn record_failure(&self, category: EntityCategory, message: impl Into<String>) {
        lock(&self.counts[category.index()]).failed += 1;
        self.add_error(message);
    }

    pub fn increment_role_user(&self, role_name: &str) {
        lock(&self.role_members)
            .entry(role_name.to_string())
            .or_default()
            .users += 1;
        self.increment_created(EntityCategory::RoleMembers);
    }

    pub fn increment_role_group(&self, role_name: &str) {
        lock(&self.role_members)
            .entry(role_name.to_string())
            .or_default()
            .groups += 1;
        self.increment_created(EntityCategory::RoleMembers);
    }

    pub fn set_imported_project(&self, project: ImportedProject) {
        *lock(&self.project) = Some(project);
    }

    #[must_use]
    pub fn imported_project(&self) -> Option<ImportedProject> {
        lock(&self.project).clone()
    }

    pub(crate) fn mark_finished(&self) {
        *lock(&self.finished_at) = Some(Utc::now());
    }

    #[must_use]
    pub fn counts(&self, category: EntityCategory) -> EntityCounts {
        *lock(&self.counts[category.index()])
    }

    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        lock(&self.errors).clone()
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        lock(&self.errors).len()
    }

    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        lock(&self.warnings).clone()
    }

    #[must_use]
    pub fn role_members(&self, role_name: &str) -> RoleMemberCounts {
        lock(&self.role_members)
            .get(role_name)
            .copied()
            .unwrap_or_default()
    }

    /// Point-in-time copy suitable for serialization.
    #[must_use]
    pub fn summary(&self) -> ImportSummary {
        let counts = EntityCategory::ALL
            .iter()
            .map(|category| (*category, self.counts(*category)))
            .filter(|(_, counts)| *counts != EntityCounts::default())
            .collect();
        ImportSummary {
            project: self.imported_project(),
            counts,
            role_members: lock(&self.role_members).clone(),
            errors: self.errors(),
            warnings: self.warnings(),
            aborted: self.abort_import(),
            started_at: self.started_at,
            finished_at: *lock(&self.finished_at),
        }
    }
}

/// Serializable snapshot of [`ImportResults`].
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub project: Option<ImportedProject>,
    pub counts: BTreeMap<EntityCategory, EntityCounts>,
    pub role_members: BTreeMap<String, RoleMemberCounts>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub aborted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}
