//! Per-record persistence: translate old ids through the identity maps and
//! hand the result to the destination store.
//!
//! Every function here runs inside an executor task. Failures are returned,
//! never raised; the caller turns them into soft errors.

use super::context::PersistContext;
use crate::automap::validate::attachment_source;
use crate::customfield::CustomFieldValueParser;
use crate::error::{ImportError, StoreError};
use crate::mapper::IdentityMap;
use crate::model::{ExportRecord, ExternalAttachment, ExternalIssue, RecordError, kind};
use crate::storage::{AttachmentMetadata, NewIssue};
use std::collections::BTreeMap;
use thiserror::Error;

/// What happened to one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Created(String),
    /// Not written; the optional message becomes a warning.
    Skipped(Option<String>),
}

/// Why one record could not be written.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("{category} '{old_id}' has no destination mapping")]
    Unmapped {
        category: &'static str,
        old_id: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mapping(#[from] ImportError),
}

pub type PersistResult = std::result::Result<PersistOutcome, PersistError>;

fn mapped(map: &IdentityMap, old_id: &str) -> Result<String, PersistError> {
    map.get_mapped_id(old_id)
        .ok_or_else(|| PersistError::Unmapped {
            category: map.category(),
            old_id: old_id.to_string(),
        })
}

fn mapped_opt(map: &IdentityMap, old_id: Option<&String>) -> Result<Option<String>, PersistError> {
    old_id.map(|id| mapped(map, id)).transpose()
}

/// Replace a field holding an old id with the mapped id.
fn remap_field(
    map: &IdentityMap,
    fields: &mut BTreeMap<String, String>,
    name: &str,
) -> Result<(), PersistError> {
    if let Some(old_id) = fields.get(name).filter(|value| !value.is_empty()) {
        let new_id = mapped(map, old_id)?;
        fields.insert(name.to_string(), new_id);
    }
    Ok(())
}

impl PersistContext {
    /// Mapped user key, or the old key when the user was never mapped
    /// (optional references are kept as they are).
    fn user_key(&self, key: &str) -> String {
        self.mapper
            .users
            .get_mapped_id(key)
            .unwrap_or_else(|| key.to_string())
    }

    fn remap_user(&self, fields: &mut BTreeMap<String, String>, name: &str) {
        if let Some(key) = fields.get(name).filter(|value| !value.is_empty()) {
            let mapped = self.user_key(key);
            fields.insert(name.to_string(), mapped);
        }
    }

    /// Destination id of a linked issue, which may live in another project.
    fn linked_issue(&self, old_id: &str) -> Result<Option<String>, PersistError> {
        if let Some(new_id) = self.mapper.issues.get_mapped_id(old_id) {
            return Ok(Some(new_id));
        }
        if self.backup.contains_issue(old_id) {
            return Ok(None);
        }
        match self.system.issue_key(old_id) {
            Some(key) => Ok(self.store.find_issue_id_by_key(key)?),
            None => Ok(None),
        }
    }
}

/// Old id of the already-present record that `record` belongs to.
///
/// A link belongs to an existing issue only when every end inside the
/// project was already present.
fn pre_existing_owner<'r>(ctx: &PersistContext, record: &'r ExportRecord) -> Option<&'r str> {
    let owner = move |parent: &'static str, field: &str| {
        record
            .get(field)
            .filter(|old_id| ctx.is_pre_existing(parent, old_id))
    };
    match record.kind.as_str() {
        kind::COMMENT | kind::WORKLOG | kind::CHANGE_GROUP | kind::LABEL => {
            owner(kind::ISSUE, "issue")
        }
        kind::NODE_ASSOCIATION => owner(kind::ISSUE, "sourcenodeid"),
        kind::USER_ASSOCIATION => owner(kind::ISSUE, "sinknodeid"),
        kind::CHANGE_ITEM => owner(kind::CHANGE_GROUP, "group"),
        kind::ISSUE_LINK => {
            let ends: Vec<&str> = ["source", "destination"]
                .into_iter()
                .filter_map(|end| record.get(end))
                .filter(|old_id| ctx.backup.contains_issue(old_id))
                .collect();
            let all_present =
                !ends.is_empty() && ends.iter().all(|old_id| ctx.is_pre_existing(kind::ISSUE, old_id));
            all_present.then(|| ends[0])
        }
        kind::ENTITY_PROPERTY => match record.get("entityname") {
            Some(kind::ISSUE_PROPERTY) => owner(kind::ISSUE, "entityid"),
            Some(kind::COMMENT_PROPERTY) => owner(kind::COMMENT, "entityid"),
            Some(kind::CHANGE_HISTORY_PROPERTY) => owner(kind::CHANGE_GROUP, "entityid"),
            _ => None,
        },
        _ => None,
    }
}

/// Create one issue, keeping its key. An issue whose key already exists is
/// mapped to the existing one and skipped.
pub fn persist_issue(ctx: &PersistContext, record: &ExportRecord) -> PersistResult {
    let issue = ExternalIssue::from_record(record)?;
    if let Some(existing) = ctx.store.find_issue_id_by_key(&issue.key)? {
        ctx.mapper.issues.map_value(&issue.id, &existing)?;
        ctx.mark_pre_existing(kind::ISSUE, &issue.id);
        tracing::debug!(key = %issue.key, "Issue already exists, skipping");
        return Ok(PersistOutcome::Skipped(None));
    }

    let mapper = &ctx.mapper;
    let new_issue = NewIssue {
        project_id: ctx.destination.id.clone(),
        key: issue.key.clone(),
        issue_type_id: mapped(&mapper.issue_types, &issue.issue_type)?,
        status_id: mapped_opt(&mapper.statuses, issue.status.as_ref())?,
        priority_id: mapped_opt(&mapper.priorities, issue.priority.as_ref())?,
        resolution_id: mapped_opt(&mapper.resolutions, issue.resolution.as_ref())?,
        security_level_id: mapped_opt(&mapper.issue_security_levels, issue.security_level.as_ref())?,
        reporter: issue.reporter.as_deref().map(|key| ctx.user_key(key)),
        assignee: issue.assignee.as_deref().map(|key| ctx.user_key(key)),
        creator: issue.creator.as_deref().map(|key| ctx.user_key(key)),
        summary: issue.summary.clone(),
        description: issue.description.clone(),
        environment: issue.environment.clone(),
        created: issue.created.clone(),
        updated: issue.updated.clone(),
        due_date: issue.due_date.clone(),
        resolution_date: issue.resolution_date.clone(),
        votes: issue.votes,
        watches: issue.watches,
        original_estimate: issue.original_estimate,
        remaining_estimate: issue.remaining_estimate,
        time_spent: issue.time_spent,
    };

    let new_id = ctx.store.create_issue_preserving_key(&new_issue)?;
    mapper.issues.map_value(&issue.id, &new_id)?;
    ctx.record_created_issue(new_id.clone(), issue.key_number());
    Ok(PersistOutcome::Created(new_id))
}

/// Create a first- or second-degree issue entity. Entities of issues that
/// an earlier run already imported are skipped.
pub fn persist_related(ctx: &PersistContext, record: &ExportRecord) -> PersistResult {
    if let Some(owner) = pre_existing_owner(ctx, record) {
        tracing::trace!(kind = %record.kind, owner, "Owner already imported, skipping");
        if let Some(old_id) = record.get("id") {
            match record.kind.as_str() {
                kind::COMMENT => ctx.mark_pre_existing(kind::COMMENT, old_id),
                kind::CHANGE_GROUP => ctx.mark_pre_existing(kind::CHANGE_GROUP, old_id),
                _ => {}
            }
        }
        return Ok(PersistOutcome::Skipped(None));
    }

    let mapper = &ctx.mapper;
    let old_id = record.get("id").map(str::to_string);
    let mut fields = record.fields.clone();
    fields.remove("id");

    match record.kind.as_str() {
        kind::COMMENT | kind::WORKLOG => {
            remap_field(&mapper.issues, &mut fields, "issue")?;
            ctx.remap_user(&mut fields, "author");
            ctx.remap_user(&mut fields, "updateauthor");
            remap_field(&mapper.groups, &mut fields, "grouplevel")?;
            remap_field(&mapper.project_roles, &mut fields, "rolelevel")?;
        }
        kind::CHANGE_GROUP => {
            remap_field(&mapper.issues, &mut fields, "issue")?;
            ctx.remap_user(&mut fields, "author");
        }
        kind::LABEL => remap_field(&mapper.issues, &mut fields, "issue")?,
        kind::ISSUE_LINK => {
            for end in ["source", "destination"] {
                let old_issue = record.require(end)?;
                match ctx.linked_issue(old_issue)? {
                    Some(new_issue) => {
                        fields.insert(end.to_string(), new_issue);
                    }
                    None => {
                        return Ok(PersistOutcome::Skipped(Some(format!(
                            "Issue link {} skipped: linked issue {old_issue} does not exist in the destination.",
                            old_id.as_deref().unwrap_or("?")
                        ))));
                    }
                }
            }
            remap_field(&mapper.issue_link_types, &mut fields, "linktype")?;
        }
        kind::NODE_ASSOCIATION => {
            remap_field(&mapper.issues, &mut fields, "sourcenodeid")?;
            match record.get("sinknodeentity") {
                Some("Version") => remap_field(&mapper.versions, &mut fields, "sinknodeid")?,
                Some("Component") => remap_field(&mapper.components, &mut fields, "sinknodeid")?,
                _ => {}
            }
        }
        kind::USER_ASSOCIATION => {
            remap_field(&mapper.issues, &mut fields, "sinknodeid")?;
            ctx.remap_user(&mut fields, "sourcename");
        }
        kind::CHANGE_ITEM => {
            let group = record.require("group")?;
            let Some(new_group) = mapper.change_groups.get_mapped_id(group) else {
                return Ok(PersistOutcome::Skipped(Some(format!(
                    "Change item {} skipped: change group {group} was not imported.",
                    old_id.as_deref().unwrap_or("?")
                ))));
            };
            fields.insert("group".to_string(), new_group);
        }
        kind::ENTITY_PROPERTY => {
            let parent_map = match record.require("entityname")? {
                kind::ISSUE_PROPERTY => &mapper.issues,
                kind::COMMENT_PROPERTY => &mapper.comments,
                kind::CHANGE_HISTORY_PROPERTY => &mapper.change_groups,
                other => {
                    return Ok(PersistOutcome::Skipped(Some(format!(
                        "Entity property {} skipped: unsupported entity '{other}'.",
                        old_id.as_deref().unwrap_or("?")
                    ))));
                }
            };
            let parent = record.require("entityid")?;
            let Some(new_parent) = parent_map.get_mapped_id(parent) else {
                return Ok(PersistOutcome::Skipped(Some(format!(
                    "Entity property {} skipped: {} {parent} was not imported.",
                    old_id.as_deref().unwrap_or("?"),
                    parent_map.category()
                ))));
            };
            fields.insert("entityid".to_string(), new_parent);
        }
        other => {
            return Ok(PersistOutcome::Skipped(Some(format!(
                "Unexpected {other} record in an issue-related segment."
            ))));
        }
    }

    let new_id = ctx.store.create_entity(&record.kind, &fields)?;
    if let Some(old_id) = &old_id {
        match record.kind.as_str() {
            kind::COMMENT => mapper.comments.map_value(old_id, &new_id)?,
            kind::CHANGE_GROUP => mapper.change_groups.map_value(old_id, &new_id)?,
            _ => {}
        }
    }
    Ok(PersistOutcome::Created(new_id))
}

/// Copy one attachment file into the destination. Attachments whose source
/// file is missing are skipped; validation already warned about them.
pub fn persist_attachment(ctx: &PersistContext, record: &ExportRecord) -> PersistResult {
    let attachment = ExternalAttachment::from_record(record)?;
    if ctx.is_pre_existing(kind::ISSUE, &attachment.issue_id) {
        return Ok(PersistOutcome::Skipped(None));
    }
    let Some(root) = &ctx.attachment_root else {
        return Ok(PersistOutcome::Skipped(None));
    };
    let issue_key = ctx.mapper.issues.get_display_name(&attachment.issue_id);
    let source = attachment_source(root, ctx.backup.key(), &issue_key, &attachment.id);
    if !source.is_file() {
        return Ok(PersistOutcome::Skipped(None));
    }

    let metadata = AttachmentMetadata {
        issue_id: mapped(&ctx.mapper.issues, &attachment.issue_id)?,
        file_name: attachment.file_name,
        mime_type: attachment.mime_type,
        file_size: attachment.file_size,
        author: attachment.author.as_deref().map(|key| ctx.user_key(key)),
        created: attachment.created,
    };
    let new_id = ctx.store.create_attachment(&source, &metadata)?;
    Ok(PersistOutcome::Created(new_id))
}

/// Create one custom field value, translating option ids for option-backed
/// fields.
pub fn persist_custom_field_value(
    ctx: &PersistContext,
    parser: &dyn CustomFieldValueParser,
    record: &ExportRecord,
) -> PersistResult {
    let mut value = parser.parse(record)?;
    if ctx.is_pre_existing(kind::ISSUE, &value.issue_id) {
        return Ok(PersistOutcome::Skipped(None));
    }
    let mapper = &ctx.mapper;
    let issue_id = mapped(&mapper.issues, &value.issue_id)?;
    let field_id = mapped(mapper.custom_fields.identity(), &value.custom_field_id)?;

    if mapper.custom_fields.is_option_backed(&value.custom_field_id) {
        let options = mapper.custom_field_options.identity();
        value.string_value = mapped_opt(options, value.string_value.as_ref())?;
        value.parent_key = mapped_opt(options, value.parent_key.as_ref())?;
    }

    let fields = parser.entity_representation(&value, &issue_id, &field_id);
    let new_id = ctx.store.create_entity(parser.entity_kind(), &fields)?;
    Ok(PersistOutcome::Created(new_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customfield::{CustomFieldParserRegistry, DefaultCustomFieldValueParser};
    use crate::mapper::ImportMapper;
    use crate::model::{
        BackupProject, BackupSystemInformation, ExternalCustomField, ExternalProject,
        ImportResults,
    };
    use crate::storage::{DestinationStore, ProjectDetails, SqliteDestination};
    use std::sync::Arc;

    fn context(store: Arc<SqliteDestination>) -> PersistContext {
        let destination = store
            .create_project(&ProjectDetails {
                key: "TST".to_string(),
                name: "Test".to_string(),
                ..ProjectDetails::default()
            })
            .unwrap();
        let mut backup = BackupProject::new(ExternalProject {
            id: "10".to_string(),
            key: "TST".to_string(),
            name: "Test".to_string(),
            ..ExternalProject::default()
        });
        backup.issue_ids.insert("100".to_string());
        let mapper = ImportMapper::new();
        mapper.issue_types.map_value("1", "7").unwrap();
        PersistContext::new(
            store,
            Arc::new(mapper),
            Arc::new(ImportResults::new(10)),
            Arc::new(CustomFieldParserRegistry::with_defaults()),
            Arc::new(backup),
            Arc::new(BackupSystemInformation::default()),
            destination,
            None,
        )
    }

    /// Fresh attempt against the same destination project.
    fn context_for(previous: &PersistContext) -> PersistContext {
        let mapper = ImportMapper::new();
        mapper.issue_types.map_value("1", "7").unwrap();
        PersistContext::new(
            Arc::clone(&previous.store),
            Arc::new(mapper),
            Arc::new(ImportResults::new(10)),
            Arc::clone(&previous.parsers),
            Arc::clone(&previous.backup),
            Arc::clone(&previous.system),
            previous.destination.clone(),
            None,
        )
    }

    fn issue(id: &str, key: &str) -> ExportRecord {
        ExportRecord::new(kind::ISSUE)
            .with("id", id)
            .with("key", key)
            .with("project", "10")
            .with("type", "1")
            .with("summary", "Something broke")
            .with("reporter", "fred")
    }

    #[test]
    fn issue_created_with_key_and_counted() {
        let store = Arc::new(SqliteDestination::open_memory().unwrap());
        let ctx = context(Arc::clone(&store));
        let outcome = persist_issue(&ctx, &issue("100", "TST-12")).unwrap();
        let PersistOutcome::Created(new_id) = outcome else {
            panic!("expected a created issue");
        };
        assert_eq!(ctx.mapper.issues.get_mapped_id("100"), Some(new_id.clone()));
        assert_eq!(ctx.largest_issue_number(), 12);
        assert_eq!(ctx.created_issue_ids(), vec![new_id]);
        assert_eq!(store.issue_keys(&ctx.destination.id).unwrap(), vec!["TST-12"]);
    }

    #[test]
    fn existing_issue_key_is_skipped_and_mapped() {
        let store = Arc::new(SqliteDestination::open_memory().unwrap());
        let ctx = context(Arc::clone(&store));
        let PersistOutcome::Created(first) = persist_issue(&ctx, &issue("100", "TST-1")).unwrap()
        else {
            panic!("expected a created issue");
        };
        let again = persist_issue(&ctx, &issue("101", "TST-1")).unwrap();
        assert_eq!(again, PersistOutcome::Skipped(None));
        assert_eq!(ctx.mapper.issues.get_mapped_id("101"), Some(first));
    }

    #[test]
    fn records_of_existing_issue_are_skipped_on_rerun() {
        let store = Arc::new(SqliteDestination::open_memory().unwrap());
        let ctx = context(Arc::clone(&store));
        persist_issue(&ctx, &issue("100", "TST-1")).unwrap();

        let rerun = context_for(&ctx);
        assert_eq!(
            persist_issue(&rerun, &issue("100", "TST-1")).unwrap(),
            PersistOutcome::Skipped(None)
        );
        let comment = ExportRecord::new(kind::COMMENT)
            .with("id", "300")
            .with("issue", "100")
            .with("body", "Again");
        let property = ExportRecord::new(kind::ENTITY_PROPERTY)
            .with("id", "700")
            .with("entityname", kind::COMMENT_PROPERTY)
            .with("entityid", "300");
        let value = ExportRecord::new(kind::CUSTOM_FIELD_VALUE)
            .with("id", "900")
            .with("issue", "100")
            .with("customfield", "20");
        assert_eq!(persist_related(&rerun, &comment).unwrap(), PersistOutcome::Skipped(None));
        assert_eq!(persist_related(&rerun, &property).unwrap(), PersistOutcome::Skipped(None));
        assert_eq!(
            persist_custom_field_value(&rerun, &DefaultCustomFieldValueParser, &value).unwrap(),
            PersistOutcome::Skipped(None)
        );
        assert!(store.entities(kind::COMMENT).unwrap().is_empty());
        assert!(store.entities(kind::CUSTOM_FIELD_VALUE).unwrap().is_empty());
    }

    #[test]
    fn unmapped_issue_type_fails() {
        let store = Arc::new(SqliteDestination::open_memory().unwrap());
        let ctx = context(store);
        let record = issue("100", "TST-1").with("type", "99");
        let err = persist_issue(&ctx, &record).unwrap_err();
        assert!(matches!(
            err,
            PersistError::Unmapped {
                category: "issue type",
                ..
            }
        ));
    }

    #[test]
    fn comment_remaps_issue_and_remembers_id() {
        let store = Arc::new(SqliteDestination::open_memory().unwrap());
        let ctx = context(Arc::clone(&store));
        ctx.mapper.issues.map_value("100", "5").unwrap();
        let record = ExportRecord::new(kind::COMMENT)
            .with("id", "300")
            .with("issue", "100")
            .with("author", "fred")
            .with("body", "Looks good");
        let PersistOutcome::Created(new_id) = persist_related(&ctx, &record).unwrap() else {
            panic!("expected a created comment");
        };
        assert_eq!(ctx.mapper.comments.get_mapped_id("300"), Some(new_id));
        let comments = store.entities(kind::COMMENT).unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].1["issue"], "5");
        assert!(!comments[0].1.contains_key("id"));
    }

    #[test]
    fn change_item_without_group_is_skipped_with_warning() {
        let store = Arc::new(SqliteDestination::open_memory().unwrap());
        let ctx = context(store);
        let record = ExportRecord::new(kind::CHANGE_ITEM)
            .with("id", "9")
            .with("group", "404");
        let outcome = persist_related(&ctx, &record).unwrap();
        assert!(matches!(outcome, PersistOutcome::Skipped(Some(_))));
    }

    #[test]
    fn link_to_unknown_issue_is_skipped() {
        let store = Arc::new(SqliteDestination::open_memory().unwrap());
        let ctx = context(store);
        ctx.mapper.issues.map_value("100", "5").unwrap();
        let record = ExportRecord::new(kind::ISSUE_LINK)
            .with("id", "1")
            .with("source", "100")
            .with("destination", "555")
            .with("linktype", "3");
        let outcome = persist_related(&ctx, &record).unwrap();
        assert!(matches!(outcome, PersistOutcome::Skipped(Some(_))));
    }

    #[test]
    fn option_backed_value_uses_mapped_option() {
        let store = Arc::new(SqliteDestination::open_memory().unwrap());
        let ctx = context(Arc::clone(&store));
        ctx.mapper.issues.map_value("100", "5").unwrap();
        ctx.mapper.custom_fields.register_field(ExternalCustomField {
            id: "20".to_string(),
            name: "Colour".to_string(),
            type_key: "plugin:select".to_string(),
        });
        ctx.mapper
            .custom_fields
            .identity()
            .map_value("20", "40")
            .unwrap();
        ctx.mapper
            .custom_field_options
            .identity()
            .map_value("5", "9")
            .unwrap();

        let record = ExportRecord::new(kind::CUSTOM_FIELD_VALUE)
            .with("id", "1")
            .with("issue", "100")
            .with("customfield", "20")
            .with("stringvalue", "5");
        let outcome =
            persist_custom_field_value(&ctx, &DefaultCustomFieldValueParser, &record).unwrap();
        assert!(matches!(outcome, PersistOutcome::Created(_)));
        let values = store.entities(kind::CUSTOM_FIELD_VALUE).unwrap();
        assert_eq!(values[0].1["stringvalue"], "9");
        assert_eq!(values[0].1["customfield"], "40");
        assert_eq!(values[0].1["issue"], "5");
    }
}
