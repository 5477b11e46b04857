//! `SQLite` destination implementation.

use super::schema::apply_schema;
use super::{
    AttachmentMetadata, DestinationCustomField, DestinationOption, DestinationProject,
    DestinationStore, NamedEntity, NewComponent, NewIssue, NewRoleMember, NewUser, NewVersion,
    ProjectDetails, ReferenceKind, ReferenceValue, StoreResult, WritePolicy,
};
use crate::error::StoreError;
use crate::model::RoleActorType;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// SQLite-backed destination store.
///
/// One connection behind a mutex; every create is its own statement, so
/// each is atomic on its own.
#[derive(Debug)]
pub struct SqliteDestination {
    conn: Mutex<Connection>,
    policy: Mutex<WritePolicy>,
    permission_checks: AtomicUsize,
}

fn parse_id(entity: &'static str, id: &str) -> StoreResult<i64> {
    id.parse().map_err(|_| StoreError::NotFound {
        entity,
        key: id.to_string(),
    })
}

fn encode_list(list: Option<&Vec<String>>) -> StoreResult<Option<String>> {
    Ok(list.map(serde_json::to_string).transpose()?)
}

fn decode_list(raw: Option<String>) -> StoreResult<Option<Vec<String>>> {
    Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
}

impl SqliteDestination {
    /// Open (or create) a destination database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema application fails.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        apply_schema(&conn)?;
        Ok(Self::with_connection(conn))
    }

    /// Open an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self::with_connection(conn))
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            policy: Mutex::new(WritePolicy::NORMAL),
            permission_checks: AtomicUsize::new(0),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Side effects of one write under the current policy.
    fn after_write(&self, conn: &Connection, kind: &str, id: &str) -> StoreResult<()> {
        let policy = self.write_policy();
        let now = Utc::now().to_rfc3339();
        if policy.check_permissions {
            self.permission_checks.fetch_add(1, Ordering::Relaxed);
        }
        if policy.index_on_write {
            conn.execute(
                "INSERT INTO index_queue (entity_kind, entity_id, queued_at) VALUES (?, ?, ?)",
                params![kind, id, now],
            )?;
        }
        if policy.send_notifications {
            conn.execute(
                "INSERT INTO notifications (entity_kind, entity_id, created_at) VALUES (?, ?, ?)",
                params![kind, id, now],
            )?;
        }
        Ok(())
    }

    fn project_by_id(conn: &Connection, id: i64) -> StoreResult<DestinationProject> {
        conn.query_row(
            "SELECT id, key, name, lead, description, counter FROM projects WHERE id = ?",
            [id],
            row_to_project,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound {
            entity: "project",
            key: id.to_string(),
        })
    }

    fn named_entities(&self, table: &str, project_id: &str) -> StoreResult<Vec<NamedEntity>> {
        let project_id = parse_id("project", project_id)?;
        let conn = self.conn();
        let sql = format!("SELECT id, name FROM {table} WHERE project_id = ? ORDER BY id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([project_id], |row| {
                Ok(NamedEntity {
                    id: row.get::<_, i64>(0)?.to_string(),
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // Seeding, used by callers preparing a destination and by tests.

    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn add_user(&self, key: &str, full_name: Option<&str>) -> StoreResult<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO users (key, full_name) VALUES (?, ?)",
            params![key, full_name],
        )?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn add_group(&self, name: &str) -> StoreResult<()> {
        self.conn()
            .execute("INSERT OR IGNORE INTO user_groups (name) VALUES (?)", [name])?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn add_reference_value(
        &self,
        kind: ReferenceKind,
        id: &str,
        name: &str,
        project_id: Option<&str>,
    ) -> StoreResult<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO reference_values (kind, id, name, project_id) VALUES (?, ?, ?, ?)",
            params![kind.as_str(), id, name, project_id],
        )?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn add_workflow_status(&self, issue_type_id: &str, status_id: &str) -> StoreResult<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO workflow_statuses (issue_type_id, status_id) VALUES (?, ?)",
            params![issue_type_id, status_id],
        )?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn add_custom_field(&self, field: &DestinationCustomField) -> StoreResult<()> {
        let project_ids = encode_list(field.project_ids.as_ref())?;
        let issue_type_ids = encode_list(field.issue_type_ids.as_ref())?;
        self.conn().execute(
            "INSERT OR REPLACE INTO custom_fields (id, name, type_key, project_ids, issue_type_ids)
             VALUES (?, ?, ?, ?, ?)",
            params![field.id, field.name, field.type_key, project_ids, issue_type_ids],
        )?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn add_custom_field_option(&self, option: &DestinationOption) -> StoreResult<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO custom_field_options (id, field_id, parent_id, value)
             VALUES (?, ?, ?, ?)",
            params![option.id, option.field_id, option.parent_id, option.value],
        )?;
        Ok(())
    }

    // Inspection.

    /// Entities of one kind with their stored fields, in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or stored fields are corrupt.
    pub fn entities(&self, kind: &str) -> StoreResult<Vec<(String, BTreeMap<String, String>)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, fields FROM entities WHERE kind = ? ORDER BY id")?;
        let rows = stmt
            .query_map([kind], |row| {
                Ok((row.get::<_, i64>(0)?.to_string(), row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, fields)| Ok((id, serde_json::from_str(&fields)?)))
            .collect()
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn issue_keys(&self, project_id: &str) -> StoreResult<Vec<String>> {
        let project_id = parse_id("project", project_id)?;
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key FROM issues WHERE project_id = ? ORDER BY id")?;
        let keys = stmt
            .query_map([project_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    /// Role members of a project as `(role id, actor type, actor)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn role_members(&self, project_id: &str) -> StoreResult<Vec<(String, String, String)>> {
        let project_id = parse_id("project", project_id)?;
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT role_id, actor_type, actor FROM role_members WHERE project_id = ? ORDER BY id",
        )?;
        let members = stmt
            .query_map([project_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(members)
    }

    /// Issue ids passed to [`DestinationStore::reindex`], in request order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn reindexed_issue_ids(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT issue_id FROM reindex_log ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn attachment_count(&self) -> StoreResult<usize> {
        self.count("SELECT COUNT(*) FROM attachments")
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn index_queue_len(&self) -> StoreResult<usize> {
        self.count("SELECT COUNT(*) FROM index_queue")
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn notification_count(&self) -> StoreResult<usize> {
        self.count("SELECT COUNT(*) FROM notifications")
    }

    #[must_use]
    pub fn permission_check_count(&self) -> usize {
        self.permission_checks.load(Ordering::Relaxed)
    }

    fn count(&self, sql: &str) -> StoreResult<usize> {
        let count: i64 = self.conn().query_row(sql, [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<DestinationProject> {
    Ok(DestinationProject {
        id: row.get::<_, i64>(0)?.to_string(),
        key: row.get(1)?,
        name: row.get(2)?,
        lead: row.get(3)?,
        description: row.get(4)?,
        counter: row.get(5)?,
    })
}

impl DestinationStore for SqliteDestination {
    fn write_policy(&self) -> WritePolicy {
        *self.policy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_write_policy(&self, policy: WritePolicy) {
        *self.policy.lock().unwrap_or_else(PoisonError::into_inner) = policy;
    }

    fn find_project_by_key(&self, key: &str) -> StoreResult<Option<DestinationProject>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, key, name, lead, description, counter FROM projects WHERE key = ?",
                [key],
                row_to_project,
            )
            .optional()?)
    }

    fn create_project(&self, details: &ProjectDetails) -> StoreResult<DestinationProject> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO projects (key, name, lead, description, url, assignee_type, email_sender)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                details.key,
                details.name,
                details.lead,
                details.description,
                details.url,
                details.assignee_type,
                details.email_sender,
            ],
        )?;
        let id = conn.last_insert_rowid();
        self.after_write(&conn, "project", &id.to_string())?;
        Self::project_by_id(&conn, id)
    }

    fn update_project_details(
        &self,
        project_id: &str,
        details: &ProjectDetails,
    ) -> StoreResult<DestinationProject> {
        let id = parse_id("project", project_id)?;
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE projects SET name = ?, lead = ?, description = ?, url = ?,
                 assignee_type = ?, email_sender = ?
             WHERE id = ?",
            params![
                details.name,
                details.lead,
                details.description,
                details.url,
                details.assignee_type,
                details.email_sender,
                id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "project",
                key: project_id.to_string(),
            });
        }
        self.after_write(&conn, "project", project_id)?;
        Self::project_by_id(&conn, id)
    }

    fn set_project_issue_counter(&self, project_id: &str, counter: i64) -> StoreResult<()> {
        let id = parse_id("project", project_id)?;
        let changed = self
            .conn()
            .execute("UPDATE projects SET counter = ? WHERE id = ?", params![counter, id])?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "project",
                key: project_id.to_string(),
            });
        }
        Ok(())
    }

    fn versions(&self, project_id: &str) -> StoreResult<Vec<NamedEntity>> {
        self.named_entities("versions", project_id)
    }

    fn create_version(&self, version: &NewVersion) -> StoreResult<String> {
        let project_id = parse_id("project", &version.project_id)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO versions (project_id, name, description, sequence, released, archived, release_date)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                project_id,
                version.name,
                version.description,
                version.sequence,
                version.released,
                version.archived,
                version.release_date,
            ],
        )?;
        let id = conn.last_insert_rowid().to_string();
        self.after_write(&conn, "version", &id)?;
        Ok(id)
    }

    fn components(&self, project_id: &str) -> StoreResult<Vec<NamedEntity>> {
        self.named_entities("components", project_id)
    }

    fn create_component(&self, component: &NewComponent) -> StoreResult<String> {
        let project_id = parse_id("project", &component.project_id)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO components (project_id, name, description, lead, assignee_type)
             VALUES (?, ?, ?, ?, ?)",
            params![
                project_id,
                component.name,
                component.description,
                component.lead,
                component.assignee_type,
            ],
        )?;
        let id = conn.last_insert_rowid().to_string();
        self.after_write(&conn, "component", &id)?;
        Ok(id)
    }

    fn find_issue_id_by_key(&self, key: &str) -> StoreResult<Option<String>> {
        let id: Option<i64> = self
            .conn()
            .query_row("SELECT id FROM issues WHERE key = ?", [key], |row| row.get(0))
            .optional()?;
        Ok(id.map(|id| id.to_string()))
    }

    fn create_issue_preserving_key(&self, issue: &NewIssue) -> StoreResult<String> {
        let project_id = parse_id("project", &issue.project_id)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO issues (
                project_id, key, issue_type_id, status_id, priority_id, resolution_id,
                security_level_id, reporter, assignee, creator, summary, description,
                environment, created, updated, due_date, resolution_date, votes, watches,
                original_estimate, remaining_estimate, time_spent
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                project_id,
                issue.key,
                issue.issue_type_id,
                issue.status_id,
                issue.priority_id,
                issue.resolution_id,
                issue.security_level_id,
                issue.reporter,
                issue.assignee,
                issue.creator,
                issue.summary,
                issue.description,
                issue.environment,
                issue.created,
                issue.updated,
                issue.due_date,
                issue.resolution_date,
                issue.votes,
                issue.watches,
                issue.original_estimate,
                issue.remaining_estimate,
                issue.time_spent,
            ],
        )?;
        let id = conn.last_insert_rowid().to_string();
        self.after_write(&conn, "issue", &id)?;
        Ok(id)
    }

    fn create_entity(&self, kind: &str, fields: &BTreeMap<String, String>) -> StoreResult<String> {
        let encoded = serde_json::to_string(fields)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO entities (kind, fields) VALUES (?, ?)",
            params![kind, encoded],
        )?;
        let id = conn.last_insert_rowid().to_string();
        self.after_write(&conn, kind, &id)?;
        Ok(id)
    }

    fn user_exists(&self, key: &str) -> StoreResult<bool> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT 1 FROM users WHERE key = ?")?;
        Ok(stmt.exists([key])?)
    }

    fn create_user(&self, user: &NewUser) -> StoreResult<()> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO users (key, full_name, email) VALUES (?, ?, ?)",
            params![user.key, user.full_name, user.email],
        )?;
        if inserted == 0 {
            return Err(StoreError::Permanent(format!(
                "user '{}' already exists",
                user.key
            )));
        }
        self.after_write(&conn, "user", &user.key)?;
        Ok(())
    }

    fn group_exists(&self, name: &str) -> StoreResult<bool> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT 1 FROM user_groups WHERE name = ?")?;
        Ok(stmt.exists([name])?)
    }

    fn remove_role_memberships(&self, project_id: &str) -> StoreResult<()> {
        let id = parse_id("project", project_id)?;
        self.conn()
            .execute("DELETE FROM role_members WHERE project_id = ?", [id])?;
        Ok(())
    }

    fn create_role_membership(&self, member: &NewRoleMember) -> StoreResult<()> {
        if member.actor_type == RoleActorType::Unknown {
            return Err(StoreError::Permanent(format!(
                "unknown role actor type for '{}'",
                member.actor
            )));
        }
        let project_id = parse_id("project", &member.project_id)?;
        self.conn().execute(
            "INSERT OR IGNORE INTO role_members (project_id, role_id, actor_type, actor)
             VALUES (?, ?, ?, ?)",
            params![
                project_id,
                member.role_id,
                member.actor_type.as_str(),
                member.actor
            ],
        )?;
        Ok(())
    }

    fn create_attachment(
        &self,
        source: &Path,
        metadata: &AttachmentMetadata,
    ) -> StoreResult<String> {
        if !source.is_file() {
            return Err(StoreError::NotFound {
                entity: "attachment file",
                key: source.display().to_string(),
            });
        }
        let issue_id = parse_id("issue", &metadata.issue_id)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO attachments (issue_id, file_name, mime_type, file_size, author, created, source_path)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                issue_id,
                metadata.file_name,
                metadata.mime_type,
                metadata.file_size,
                metadata.author,
                metadata.created,
                source.to_string_lossy(),
            ],
        )?;
        let id = conn.last_insert_rowid().to_string();
        self.after_write(&conn, "attachment", &id)?;
        Ok(id)
    }

    fn reindex(&self, issue_ids: &[String]) -> StoreResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        for issue_id in issue_ids {
            tx.execute(
                "INSERT INTO reindex_log (issue_id, requested_at) VALUES (?, ?)",
                params![issue_id, now],
            )?;
        }
        tx.commit()?;
        tracing::debug!(issues = issue_ids.len(), "Reindex requested");
        Ok(())
    }

    fn reference_values(&self, kind: ReferenceKind) -> StoreResult<Vec<ReferenceValue>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, project_id FROM reference_values WHERE kind = ? ORDER BY id",
        )?;
        let values = stmt
            .query_map([kind.as_str()], |row| {
                Ok(ReferenceValue {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    project_id: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(values)
    }

    fn workflow_statuses(&self, issue_type_id: &str) -> StoreResult<Option<Vec<String>>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT status_id FROM workflow_statuses WHERE issue_type_id = ? ORDER BY status_id",
        )?;
        let statuses = stmt
            .query_map([issue_type_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(if statuses.is_empty() {
            None
        } else {
            Some(statuses)
        })
    }

    fn custom_fields(&self) -> StoreResult<Vec<DestinationCustomField>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, type_key, project_ids, issue_type_ids FROM custom_fields ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, name, type_key, project_ids, issue_type_ids)| {
                Ok(DestinationCustomField {
                    id,
                    name,
                    type_key,
                    project_ids: decode_list(project_ids)?,
                    issue_type_ids: decode_list(issue_type_ids)?,
                })
            })
            .collect()
    }

    fn custom_field_options(&self, field_id: &str) -> StoreResult<Vec<DestinationOption>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, field_id, parent_id, value FROM custom_field_options
             WHERE field_id = ? ORDER BY id",
        )?;
        let options = stmt
            .query_map([field_id], |row| {
                Ok(DestinationOption {
                    id: row.get(0)?,
                    field_id: row.get(1)?,
                    parent_id: row.get(2)?,
                    value: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(store: &SqliteDestination) -> DestinationProject {
        store
            .create_project(&ProjectDetails {
                key: "TST".to_string(),
                name: "Test".to_string(),
                ..ProjectDetails::default()
            })
            .unwrap()
    }

    #[test]
    fn project_round_trip_and_counter() {
        let store = SqliteDestination::open_memory().unwrap();
        let created = project(&store);
        store.set_project_issue_counter(&created.id, 42).unwrap();
        let found = store.find_project_by_key("TST").unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.counter, 42);
        assert!(store.find_project_by_key("NOPE").unwrap().is_none());
    }

    #[test]
    fn update_missing_project_is_not_found() {
        let store = SqliteDestination::open_memory().unwrap();
        let err = store
            .update_project_details("999", &ProjectDetails::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "project", .. }));
    }

    #[test]
    fn bulk_policy_suppresses_side_effects() {
        let store = SqliteDestination::open_memory().unwrap();
        let created = project(&store);
        assert_eq!(store.index_queue_len().unwrap(), 1);
        assert_eq!(store.notification_count().unwrap(), 1);
        assert_eq!(store.permission_check_count(), 1);

        store.set_write_policy(WritePolicy::BULK_IMPORT);
        let issue = NewIssue {
            project_id: created.id,
            key: "TST-1".to_string(),
            issue_type_id: "1".to_string(),
            summary: "first".to_string(),
            ..NewIssue::default()
        };
        store.create_issue_preserving_key(&issue).unwrap();
        assert_eq!(store.index_queue_len().unwrap(), 1);
        assert_eq!(store.notification_count().unwrap(), 1);
        assert_eq!(store.permission_check_count(), 1);
    }

    #[test]
    fn duplicate_issue_key_rejected() {
        let store = SqliteDestination::open_memory().unwrap();
        let created = project(&store);
        let issue = NewIssue {
            project_id: created.id,
            key: "TST-1".to_string(),
            issue_type_id: "1".to_string(),
            ..NewIssue::default()
        };
        let id = store.create_issue_preserving_key(&issue).unwrap();
        assert!(store.create_issue_preserving_key(&issue).is_err());
        assert_eq!(store.find_issue_id_by_key("TST-1").unwrap(), Some(id));
    }

    #[test]
    fn entities_keep_fields() {
        let store = SqliteDestination::open_memory().unwrap();
        let mut fields = BTreeMap::new();
        fields.insert("body".to_string(), "hello".to_string());
        store.create_entity("Comment", &fields).unwrap();
        let stored = store.entities("Comment").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].1["body"], "hello");
    }

    #[test]
    fn workflow_without_rows_is_unrestricted() {
        let store = SqliteDestination::open_memory().unwrap();
        assert_eq!(store.workflow_statuses("1").unwrap(), None);
        store.add_workflow_status("1", "3").unwrap();
        assert_eq!(
            store.workflow_statuses("1").unwrap(),
            Some(vec!["3".to_string()])
        );
    }

    #[test]
    fn custom_field_scopes_round_trip() {
        let store = SqliteDestination::open_memory().unwrap();
        store
            .add_custom_field(&DestinationCustomField {
                id: "20".to_string(),
                name: "Colour".to_string(),
                type_key: "com.example:select".to_string(),
                project_ids: None,
                issue_type_ids: Some(vec!["1".to_string()]),
            })
            .unwrap();
        let fields = store.custom_fields().unwrap();
        assert_eq!(fields.len(), 1);
        assert!(fields[0].applies_to_issue_type("1"));
        assert!(!fields[0].applies_to_issue_type("2"));
        assert!(fields[0].applies_to_project(None));
    }
}
