//! Validation: turn unresolved mappings into per-category messages.

use super::MappingContext;
use super::matcher::{WorkflowCache, field_accepts, issue_types_by_status};
use crate::backup::{ImportEntityHandler, read_export};
use crate::error::{ImportError, Result};
use crate::mapper::{IdentityMap, ImportMapper};
use crate::model::{
    ExportRecord, ExternalAttachment, MappingCategory, MappingResult, MessageSet, RoleActorType,
    kind,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const PHASE: &str = "validation";

/// Validate every category against the destination.
///
/// # Errors
///
/// Returns an error only if a destination lookup fails; unresolved
/// mappings are reported in the returned [`MappingResult`].
pub fn validate(
    ctx: &MappingContext<'_>,
    mapper: &ImportMapper,
    attachments: &[ExternalAttachment],
) -> Result<MappingResult> {
    let mut result = MappingResult::new();
    result.set(MappingCategory::Project, validate_project(ctx));
    for (category, map, label) in [
        (MappingCategory::IssueType, &mapper.issue_types, "issue type"),
        (MappingCategory::Priority, &mapper.priorities, "priority"),
        (MappingCategory::Resolution, &mapper.resolutions, "resolution"),
        (MappingCategory::IssueLinkType, &mapper.issue_link_types, "issue link type"),
        (
            MappingCategory::IssueSecurityLevel,
            &mapper.issue_security_levels,
            "issue security level",
        ),
        (MappingCategory::Group, &mapper.groups, "group"),
    ] {
        result.set(category, validate_required(map, label));
    }
    result.set(MappingCategory::Status, validate_statuses(ctx, mapper)?);
    result.set(MappingCategory::CustomField, validate_custom_fields(ctx, mapper)?);
    result.set(MappingCategory::CustomFieldOption, validate_options(mapper));
    result.set(MappingCategory::ProjectRole, validate_project_roles(mapper));
    result.set(MappingCategory::ProjectRoleActor, validate_role_actors(ctx, mapper)?);
    result.set(MappingCategory::User, validate_users(mapper));
    if let Some(root) = &ctx.options.attachment_path {
        result.set(
            MappingCategory::FileAttachment,
            validate_attachments(root, ctx.project.key(), mapper, attachments),
        );
    }

    tracing::info!(
        project = ctx.project.key(),
        errors = result.error_count(),
        warnings = result.warning_count(),
        can_import = result.can_import(),
        "Validated mappings"
    );
    Ok(result)
}

fn describe(map: &IdentityMap, old_id: &str) -> String {
    match map.old_name(old_id) {
        Some(name) => format!("'{name}' (id {old_id})"),
        None => format!("with id {old_id}"),
    }
}

fn validate_project(ctx: &MappingContext<'_>) -> MessageSet {
    let mut messages = MessageSet::new();
    if ctx.destination.is_some() && !ctx.options.overwrite_project_details {
        messages.add_warning(format!(
            "Project '{}' already exists; its details will not be changed.",
            ctx.project.key()
        ));
    }
    messages
}

fn validate_required(map: &IdentityMap, label: &str) -> MessageSet {
    let mut messages = MessageSet::new();
    for old_id in map.unmapped_required() {
        messages.add_error(format!(
            "The {label} {} is used by the import but does not exist in the destination.",
            describe(map, &old_id)
        ));
    }
    messages
}

fn validate_statuses(ctx: &MappingContext<'_>, mapper: &ImportMapper) -> Result<MessageSet> {
    let statuses = &mapper.statuses;
    let mut messages = validate_required(statuses, "status");
    let mut workflows = WorkflowCache::new(ctx);

    for (old_status, issue_types) in issue_types_by_status(mapper) {
        let Some(new_status) = statuses.get_mapped_id(&old_status) else {
            continue;
        };
        for old_type in issue_types {
            let Some(new_type) = mapper.issue_types.get_mapped_id(&old_type) else {
                continue;
            };
            if !workflows.allows(&new_type, &new_status)? {
                messages.add_error(format!(
                    "The status {} is not valid for the workflow of issue type {}.",
                    describe(statuses, &old_status),
                    describe(&mapper.issue_types, &old_type)
                ));
            }
        }
    }
    Ok(messages)
}

fn validate_custom_fields(ctx: &MappingContext<'_>, mapper: &ImportMapper) -> Result<MessageSet> {
    let fields = &mapper.custom_fields;
    let mut messages = MessageSet::new();
    let destination: HashMap<_, _> = ctx
        .store
        .custom_fields()
        .map_err(|e| ImportError::store(PHASE, e))?
        .into_iter()
        .map(|field| (field.id.clone(), field))
        .collect();

    for field_id in fields.fields_in_use() {
        let name = describe(fields.identity(), &field_id);
        let Some(field) = fields.field(&field_id) else {
            messages.add_error(format!(
                "The custom field {name} has values but no definition in the export."
            ));
            continue;
        };
        match fields.get_mapped_id(&field_id) {
            None => messages.add_error(format!(
                "The custom field {name} of type '{}' does not exist in the destination or is not valid for every issue type it is used with.",
                field.type_key
            )),
            Some(new_id) => match destination.get(&new_id) {
                Some(target) if field_accepts(ctx, mapper, &field_id, target) => {}
                Some(target) => messages.add_error(format!(
                    "The custom field {name} is mapped to '{}' which has a different type or does not apply to this project and its issue types.",
                    target.name
                )),
                None => messages.add_error(format!(
                    "The custom field {name} is mapped to destination field {new_id} which does not exist."
                )),
            },
        }
    }
    Ok(messages)
}

fn validate_options(mapper: &ImportMapper) -> MessageSet {
    let options = &mapper.custom_field_options;
    let mut messages = MessageSet::new();
    for option_id in options.identity().unmapped_required() {
        let field = options
            .option(&option_id)
            .map(|info| describe(mapper.custom_fields.identity(), &info.field_id))
            .unwrap_or_else(|| "unknown".to_string());
        messages.add_error(format!(
            "The option {} of custom field {field} does not exist in the destination.",
            describe(options.identity(), &option_id)
        ));
    }
    messages
}

fn validate_project_roles(mapper: &ImportMapper) -> MessageSet {
    let roles = &mapper.project_roles;
    let mut messages = validate_required(roles, "project role");
    for old_id in roles.registered_old_ids() {
        if !roles.is_required(&old_id) && roles.get_mapped_id(&old_id).is_none() {
            messages.add_warning(format!(
                "The project role {} does not exist; its members will not be imported.",
                describe(roles, &old_id)
            ));
        }
    }
    messages
}

fn validate_role_actors(ctx: &MappingContext<'_>, mapper: &ImportMapper) -> Result<MessageSet> {
    let mut messages = MessageSet::new();
    let auto_created: Vec<String> = mapper
        .users
        .users_to_auto_create()
        .into_iter()
        .map(|user| user.key)
        .collect();

    for actor in mapper.project_role_actors.actors() {
        let role = describe(&mapper.project_roles, &actor.role_id);
        let exists = match actor.actor_type {
            RoleActorType::User => {
                auto_created.contains(&actor.actor)
                    || ctx
                        .store
                        .user_exists(&actor.actor)
                        .map_err(|e| ImportError::store(PHASE, e))?
            }
            RoleActorType::Group => ctx
                .store
                .group_exists(&actor.actor)
                .map_err(|e| ImportError::store(PHASE, e))?,
            RoleActorType::Unknown => false,
        };
        if !exists {
            messages.add_warning(format!(
                "The {} '{}' of project role {role} does not exist and will not be added.",
                actor.actor_type.as_str(),
                actor.actor
            ));
        }
    }
    Ok(messages)
}

fn validate_users(mapper: &ImportMapper) -> MessageSet {
    let users = &mapper.users;
    let mut messages = MessageSet::new();
    for user in users.users_to_auto_create() {
        messages.add_warning(format!(
            "The user '{}' does not exist and will be created.",
            user.key
        ));
    }
    for key in users.unknown_users() {
        if users.is_mandatory(&key) {
            messages.add_error(format!(
                "The user '{key}' is required by the import but does not exist and has no details to create it from."
            ));
        } else {
            messages.add_warning(format!(
                "The user '{key}' does not exist; references to it will be kept as-is."
            ));
        }
    }
    messages
}

/// Source file of an attachment inside the attachment tree.
#[must_use]
pub fn attachment_source(root: &Path, project_key: &str, issue_key: &str, attachment_id: &str) -> PathBuf {
    root.join(project_key).join(issue_key).join(attachment_id)
}

fn validate_attachments(
    root: &Path,
    project_key: &str,
    mapper: &ImportMapper,
    attachments: &[ExternalAttachment],
) -> MessageSet {
    let mut messages = MessageSet::new();
    if !root.is_dir() {
        messages.add_error(format!(
            "The attachment directory '{}' does not exist.",
            root.display()
        ));
        return messages;
    }
    for attachment in attachments {
        let issue_key = mapper.issues.get_display_name(&attachment.issue_id);
        let source = attachment_source(root, project_key, &issue_key, &attachment.id);
        if !source.is_file() {
            messages.add_warning(format!(
                "The attachment '{}' of issue {issue_key} was not found at '{}' and will be skipped.",
                attachment.file_name,
                source.display()
            ));
        }
    }
    messages
}

#[derive(Default)]
struct AttachmentCollector {
    attachments: Vec<ExternalAttachment>,
}

impl ImportEntityHandler for AttachmentCollector {
    fn handles(&self, entity_kind: &str) -> bool {
        entity_kind == kind::FILE_ATTACHMENT
    }

    fn handle_entity(&mut self, record: &ExportRecord) -> Result<()> {
        if let Ok(attachment) = ExternalAttachment::from_record(record) {
            self.attachments.push(attachment);
        }
        Ok(())
    }
}

/// Attachment metadata from the attachments staging segment.
///
/// # Errors
///
/// Returns an error if the segment cannot be read.
pub fn read_attachments(segment: &Path) -> Result<Vec<ExternalAttachment>> {
    let mut collector = AttachmentCollector::default();
    read_export(segment, &mut collector)?;
    Ok(collector.attachments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExternalUser;

    #[test]
    fn unmapped_required_values_are_errors() {
        let map = IdentityMap::new("priority");
        map.register_old_value("1", Some("Blocker"));
        map.register_old_value("2", Some("Trivial"));
        map.flag_required("1");
        let messages = validate_required(&map, "priority");
        assert_eq!(messages.errors.len(), 1);
        assert!(messages.errors[0].contains("'Blocker' (id 1)"));

        map.map_value("1", "10").unwrap();
        assert!(!validate_required(&map, "priority").has_errors());
    }

    #[test]
    fn user_severity_depends_on_details_and_usage() {
        let mapper = ImportMapper::new();
        mapper.users.register_user(ExternalUser {
            key: "fred".to_string(),
            full_name: Some("Fred".to_string()),
            email: None,
        });
        mapper.users.flag_mandatory("fred");
        mapper.users.flag_mandatory("ghost");
        mapper.users.flag_optional("watcher");
        mapper.users.flag_optional("admin");
        mapper.users.map_value("admin", "admin").unwrap();

        let messages = validate_users(&mapper);
        assert_eq!(messages.errors.len(), 1);
        assert!(messages.errors[0].contains("'ghost'"));
        assert_eq!(messages.warnings.len(), 2);
    }

    #[test]
    fn missing_attachment_files_are_warnings() {
        let tmp = tempfile::tempdir().unwrap();
        let mapper = ImportMapper::new();
        mapper.issues.register_old_value("100", Some("TST-1"));
        let present = attachment_source(tmp.path(), "TST", "TST-1", "7");
        std::fs::create_dir_all(present.parent().unwrap()).unwrap();
        std::fs::write(&present, b"data").unwrap();

        let attachment = |id: &str| ExternalAttachment {
            id: id.to_string(),
            issue_id: "100".to_string(),
            file_name: format!("{id}.txt"),
            mime_type: None,
            file_size: None,
            author: None,
            created: None,
        };
        let messages =
            validate_attachments(tmp.path(), "TST", &mapper, &[attachment("7"), attachment("8")]);
        assert!(!messages.has_errors());
        assert_eq!(messages.warnings.len(), 1);
        assert!(messages.warnings[0].contains("8.txt"));
    }
}
