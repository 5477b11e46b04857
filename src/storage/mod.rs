//! Destination store boundary.
//!
//! The pipeline talks to the destination system only through
//! [`DestinationStore`]. [`SqliteDestination`] is a `SQLite`-backed
//! implementation with:
//! - Per-write indexing, notifications and permission checks governed by the
//!   current [`WritePolicy`]
//! - A reindex log recording every bulk reindex request
//!
//! # Submodules
//!
//! - [`policy`] - Write policy and its scoped guard
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - `SQLite` destination implementation

pub mod policy;
pub mod schema;
pub mod sqlite;

pub use policy::{WritePolicy, WritePolicyGuard};
pub use sqlite::SqliteDestination;

use crate::error::StoreError;
use crate::model::{ExternalProject, RoleActorType};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A project as it exists in the destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationProject {
    pub id: String,
    pub key: String,
    pub name: String,
    pub lead: Option<String>,
    pub description: Option<String>,
    pub counter: i64,
}

/// Editable project details.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectDetails {
    pub key: String,
    pub name: String,
    pub lead: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub assignee_type: Option<String>,
    pub email_sender: Option<String>,
}

impl ProjectDetails {
    /// Details from the export, with the lead already resolved.
    #[must_use]
    pub fn from_external(project: &ExternalProject, lead: Option<String>) -> Self {
        Self {
            key: project.key.clone(),
            name: project.name.clone(),
            lead,
            description: project.description.clone(),
            url: project.url.clone(),
            assignee_type: project.assignee_type.clone(),
            email_sender: project.email_sender.clone(),
        }
    }
}

/// Id and name of a destination entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedEntity {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVersion {
    pub project_id: String,
    pub name: String,
    pub description: Option<String>,
    pub sequence: i64,
    pub released: bool,
    pub archived: bool,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComponent {
    pub project_id: String,
    pub name: String,
    pub description: Option<String>,
    pub lead: Option<String>,
    pub assignee_type: Option<String>,
}

/// Issue with every reference already translated to destination ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewIssue {
    pub project_id: String,
    pub key: String,
    pub issue_type_id: String,
    pub status_id: Option<String>,
    pub priority_id: Option<String>,
    pub resolution_id: Option<String>,
    pub security_level_id: Option<String>,
    pub reporter: Option<String>,
    pub assignee: Option<String>,
    pub creator: Option<String>,
    pub summary: String,
    pub description: Option<String>,
    pub environment: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub due_date: Option<String>,
    pub resolution_date: Option<String>,
    pub votes: Option<i64>,
    pub watches: Option<i64>,
    pub original_estimate: Option<i64>,
    pub remaining_estimate: Option<i64>,
    pub time_spent: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub key: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoleMember {
    pub project_id: String,
    pub role_id: String,
    pub actor_type: RoleActorType,
    pub actor: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentMetadata {
    pub issue_id: String,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    pub author: Option<String>,
    pub created: Option<String>,
}

/// Reference data kinds matched by name during auto-mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Priority,
    Resolution,
    Status,
    IssueType,
    ProjectRole,
    IssueLinkType,
    IssueSecurityLevel,
}

impl ReferenceKind {
    pub const ALL: [Self; 7] = [
        Self::Priority,
        Self::Resolution,
        Self::Status,
        Self::IssueType,
        Self::ProjectRole,
        Self::IssueLinkType,
        Self::IssueSecurityLevel,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Priority => "priority",
            Self::Resolution => "resolution",
            Self::Status => "status",
            Self::IssueType => "issue_type",
            Self::ProjectRole => "project_role",
            Self::IssueLinkType => "issue_link_type",
            Self::IssueSecurityLevel => "issue_security_level",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A destination reference value; `project_id` is set when it is scoped to
/// one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceValue {
    pub id: String,
    pub name: String,
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationCustomField {
    pub id: String,
    pub name: String,
    pub type_key: String,
    /// Projects the field is configured for; `None` means global.
    pub project_ids: Option<Vec<String>>,
    /// Issue types the field applies to; `None` means all.
    pub issue_type_ids: Option<Vec<String>>,
}

impl DestinationCustomField {
    #[must_use]
    pub fn applies_to_project(&self, project_id: Option<&str>) -> bool {
        match (&self.project_ids, project_id) {
            (None, _) => true,
            (Some(ids), Some(project_id)) => ids.iter().any(|id| id == project_id),
            (Some(_), None) => false,
        }
    }

    #[must_use]
    pub fn applies_to_issue_type(&self, issue_type_id: &str) -> bool {
        self.issue_type_ids
            .as_ref()
            .is_none_or(|ids| ids.iter().any(|id| id == issue_type_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationOption {
    pub id: String,
    pub field_id: String,
    pub parent_id: Option<String>,
    pub value: String,
}

/// Operations the pipeline needs from the destination system.
///
/// Every create is individually atomic; nothing spans records. Failures are
/// [`StoreError`]s, and only failures concerning the target project itself
/// are treated as fatal by callers.
pub trait DestinationStore: Send + Sync {
    fn write_policy(&self) -> WritePolicy;
    fn set_write_policy(&self, policy: WritePolicy);

    fn find_project_by_key(&self, key: &str) -> StoreResult<Option<DestinationProject>>;
    fn create_project(&self, details: &ProjectDetails) -> StoreResult<DestinationProject>;
    fn update_project_details(
        &self,
        project_id: &str,
        details: &ProjectDetails,
    ) -> StoreResult<DestinationProject>;
    fn set_project_issue_counter(&self, project_id: &str, counter: i64) -> StoreResult<()>;

    fn versions(&self, project_id: &str) -> StoreResult<Vec<NamedEntity>>;
    fn create_version(&self, version: &NewVersion) -> StoreResult<String>;
    fn components(&self, project_id: &str) -> StoreResult<Vec<NamedEntity>>;
    fn create_component(&self, component: &NewComponent) -> StoreResult<String>;

    fn find_issue_id_by_key(&self, key: &str) -> StoreResult<Option<String>>;
    fn create_issue_preserving_key(&self, issue: &NewIssue) -> StoreResult<String>;
    /// Create any issue-dependent entity from already-translated fields.
    fn create_entity(&self, kind: &str, fields: &BTreeMap<String, String>) -> StoreResult<String>;

    fn user_exists(&self, key: &str) -> StoreResult<bool>;
    fn create_user(&self, user: &NewUser) -> StoreResult<()>;
    fn group_exists(&self, name: &str) -> StoreResult<bool>;

    fn remove_role_memberships(&self, project_id: &str) -> StoreResult<()>;
    fn create_role_membership(&self, member: &NewRoleMember) -> StoreResult<()>;

    fn create_attachment(&self, source: &Path, metadata: &AttachmentMetadata)
    -> StoreResult<String>;

    /// Rebuild search indexes for the given issues.
    fn reindex(&self, issue_ids: &[String]) -> StoreResult<()>;

    fn reference_values(&self, kind: ReferenceKind) -> StoreResult<Vec<ReferenceValue>>;
    /// Status ids valid in the workflow of the issue type; `None` when the
    /// issue type has no workflow restriction.
    fn workflow_statuses(&self, issue_type_id: &str) -> StoreResult<Option<Vec<String>>>;
    fn custom_fields(&self) -> StoreResult<Vec<DestinationCustomField>>;
    fn custom_field_options(&self, field_id: &str) -> StoreResult<Vec<DestinationOption>>;
}
