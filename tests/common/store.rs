#![allow(dead_code)]

use project_import::{CancelHandle, StoreError};
use project_import::storage::{
    AttachmentMetadata, DestinationCustomField, DestinationOption, DestinationProject,
    DestinationStore, NamedEntity, NewComponent, NewIssue, NewRoleMember, NewUser, NewVersion,
    ProjectDetails, ReferenceKind, ReferenceValue, SqliteDestination, StoreResult, WritePolicy,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicUsize, Ordering};

/// SQLite destination that fails on demand.
#[derive(Debug)]
pub struct FlakyStore {
    pub inner: Arc<SqliteDestination>,
    /// Issue creations that succeed before every later one fails.
    pub issue_successes: usize,
    /// Report the project as gone when its details are updated.
    pub project_vanishes: bool,
    /// Cancel the import once this many issues were created.
    pub cancel_after_issues: Option<usize>,
    cancel: OnceLock<CancelHandle>,
    issue_attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<SqliteDestination>) -> Self {
        Self {
            inner,
            issue_successes: usize::MAX,
            project_vanishes: false,
            cancel_after_issues: None,
            cancel: OnceLock::new(),
            issue_attempts: AtomicUsize::new(0),
        }
    }

    pub fn failing_issues_after(mut self, successes: usize) -> Self {
        self.issue_successes = successes;
        self
    }

    pub fn with_vanishing_project(mut self) -> Self {
        self.project_vanishes = true;
        self
    }

    pub fn cancelling_after_issues(mut self, created: usize) -> Self {
        self.cancel_after_issues = Some(created);
        self
    }

    pub fn cancel_with(&self, handle: CancelHandle) {
        let _ = self.cancel.set(handle);
    }

    pub fn issue_attempts(&self) -> usize {
        self.issue_attempts.load(Ordering::SeqCst)
    }
}

impl DestinationStore for FlakyStore {
    fn write_policy(&self) -> WritePolicy {
        self.inner.write_policy()
    }

    fn set_write_policy(&self, policy: WritePolicy) {
        self.inner.set_write_policy(policy);
    }

    fn find_project_by_key(&self, key: &str) -> StoreResult<Option<DestinationProject>> {
        self.inner.find_project_by_key(key)
    }

    fn create_project(&self, details: &ProjectDetails) -> StoreResult<DestinationProject> {
        self.inner.create_project(details)
    }

    fn update_project_details(
        &self,
        project_id: &str,
        details: &ProjectDetails,
    ) -> StoreResult<DestinationProject> {
        if self.project_vanishes {
            return Err(StoreError::NotFound {
                entity: "project",
                key: project_id.to_string(),
            });
        }
        self.inner.update_project_details(project_id, details)
    }

    fn set_project_issue_counter(&self, project_id: &str, counter: i64) -> StoreResult<()> {
        self.inner.set_project_issue_counter(project_id, counter)
    }

    fn versions(&self, project_id: &str) -> StoreResult<Vec<NamedEntity>> {
        self.inner.versions(project_id)
    }

    fn create_version(&self, version: &NewVersion) -> StoreResult<String> {
        self.inner.create_version(version)
    }

    fn components(&self, project_id: &str) -> StoreResult<Vec<NamedEntity>> {
        self.inner.components(project_id)
    }

    fn create_component(&self, component: &NewComponent) -> StoreResult<String> {
        self.inner.create_component(component)
    }

    fn find_issue_id_by_key(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.find_issue_id_by_key(key)
    }

    fn create_issue_preserving_key(&self, issue: &NewIssue) -> StoreResult<String> {
        let attempt = self.issue_attempts.fetch_add(1, Ordering::SeqCst);
        if attempt >= self.issue_successes {
            return Err(StoreError::Permanent(format!("rejected {}", issue.key)));
        }
        let created = self.inner.create_issue_preserving_key(issue)?;
        if self.cancel_after_issues == Some(attempt + 1) {
            if let Some(handle) = self.cancel.get() {
                handle.cancel();
            }
        }
        Ok(created)
    }

    fn create_entity(&self, kind: &str, fields: &BTreeMap<String, String>) -> StoreResult<String> {
        self.inner.create_entity(kind, fields)
    }

    fn user_exists(&self, key: &str) -> StoreResult<bool> {
        self.inner.user_exists(key)
    }

    fn create_user(&self, user: &NewUser) -> StoreResult<()> {
        self.inner.create_user(user)
    }

    fn group_exists(&self, name: &str) -> StoreResult<bool> {
        self.inner.group_exists(name)
    }

    fn remove_role_memberships(&self, project_id: &str) -> StoreResult<()> {
        self.inner.remove_role_memberships(project_id)
    }

    fn create_role_membership(&self, member: &NewRoleMember) -> StoreResult<()> {
        self.inner.create_role_membership(member)
    }

    fn create_attachment(
        &self,
        source: &Path,
        metadata: &AttachmentMetadata,
    ) -> StoreResult<String> {
        self.inner.create_attachment(source, metadata)
    }

    fn reindex(&self, issue_ids: &[String]) -> StoreResult<()> {
        self.inner.reindex(issue_ids)
    }

    fn reference_values(&self, kind: ReferenceKind) -> StoreResult<Vec<ReferenceValue>> {
        self.inner.reference_values(kind)
    }

    fn workflow_statuses(&self, issue_type_id: &str) -> StoreResult<Option<Vec<String>>> {
        self.inner.workflow_statuses(issue_type_id)
    }

    fn custom_fields(&self) -> StoreResult<Vec<DestinationCustomField>> {
        self.inner.custom_fields()
    }

    fn custom_field_options(&self, field_id: &str) -> StoreResult<Vec<DestinationOption>> {
        self.inner.custom_field_options(field_id)
    }
}
