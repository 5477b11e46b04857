//! Mapper-population consumers: seed identity maps during the partition pass.
//!
//! Nothing here writes to disk. Reference data is registered for every record
//! in the export; "required" flags are only raised by records that belong to
//! the imported project.

use crate::backup::ImportEntityHandler;
use crate::customfield::CustomFieldParserRegistry;
use crate::error::Result;
use crate::mapper::{IdentityMap, ImportMapper, OptionInfo};
use crate::model::{
    BackupProject, ExportRecord, ExternalCustomField, ExternalIssue, ExternalUser, RecordError,
    kind,
};
use std::collections::{BTreeSet, HashMap};

const REFERENCE_KINDS: &[&str] = &[
    kind::PRIORITY,
    kind::RESOLUTION,
    kind::STATUS,
    kind::ISSUE_TYPE,
    kind::PROJECT_ROLE,
    kind::ISSUE_LINK_TYPE,
    kind::ISSUE_SECURITY_LEVEL,
    kind::GROUP,
    kind::USER,
    kind::CUSTOM_FIELD,
    kind::CUSTOM_FIELD_OPTION,
];

/// Registers (old id, old name) pairs for system-wide reference data.
#[derive(Debug)]
pub struct ReferenceDataMapperHandler<'a> {
    mapper: &'a ImportMapper,
    warnings: Vec<String>,
}

impl<'a> ReferenceDataMapperHandler<'a> {
    #[must_use]
    pub const fn new(mapper: &'a ImportMapper) -> Self {
        Self {
            mapper,
            warnings: Vec::new(),
        }
    }

    fn map_for_kind(&self, kind: &str) -> Option<&'a IdentityMap> {
        let mapper = self.mapper;
        Some(match kind {
            kind::PRIORITY => &mapper.priorities,
            kind::RESOLUTION => &mapper.resolutions,
            kind::STATUS => &mapper.statuses,
            kind::ISSUE_TYPE => &mapper.issue_types,
            kind::PROJECT_ROLE => &mapper.project_roles,
            kind::ISSUE_LINK_TYPE => &mapper.issue_link_types,
            kind::ISSUE_SECURITY_LEVEL => &mapper.issue_security_levels,
            _ => return None,
        })
    }

    fn register(&self, record: &ExportRecord) -> Result<(), RecordError> {
        match record.kind.as_str() {
            kind::USER => self.mapper.users.register_user(ExternalUser::from_record(record)?),
            kind::GROUP => {
                let name = record.require("name")?;
                self.mapper.groups.register_old_value(name, Some(name));
            }
            kind::CUSTOM_FIELD => self
                .mapper
                .custom_fields
                .register_field(ExternalCustomField::from_record(record)?),
            kind::CUSTOM_FIELD_OPTION => {
                let id = record.require("id")?;
                self.mapper.custom_field_options.register_option(
                    id,
                    OptionInfo {
                        field_id: record.require("customfield")?.to_string(),
                        parent_id: record.owned("parentoption"),
                        value: record.require("value")?.to_string(),
                    },
                );
            }
            other => {
                if let Some(map) = self.map_for_kind(other) {
                    map.register_old_value(record.require("id")?, record.get("name"));
                }
            }
        }
        Ok(())
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}

impl ImportEntityHandler for ReferenceDataMapperHandler<'_> {
    fn handles(&self, entity_kind: &str) -> bool {
        REFERENCE_KINDS.contains(&entity_kind)
    }

    fn handle_entity(&mut self, record: &ExportRecord) -> Result<()> {
        if let Err(err) = self.register(record) {
            self.warnings
                .push(format!("Ignoring incomplete reference data: {err}"));
        }
        Ok(())
    }
}

/// Flags the reference data used by the project's issues and custom field
/// values.
#[derive(Debug)]
pub struct IssueMapperHandler<'a> {
    project: &'a BackupProject,
    mapper: &'a ImportMapper,
    parsers: &'a CustomFieldParserRegistry,
    issue_types: HashMap<String, String>,
    field_values: Vec<(String, String)>,
    option_values: Vec<(String, String)>,
    warnings: Vec<String>,
}

impl<'a> IssueMapperHandler<'a> {
    #[must_use]
    pub fn new(
        project: &'a BackupProject,
        mapper: &'a ImportMapper,
        parsers: &'a CustomFieldParserRegistry,
    ) -> Self {
        Self {
            project,
            mapper,
            parsers,
            issue_types: HashMap::new(),
            field_values: Vec::new(),
            option_values: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn flag_issue(&mut self, issue: ExternalIssue) {
        let mapper = self.mapper;
        mapper.issues.register_old_value(&issue.id, Some(&issue.key));
        mapper.issue_types.flag_required(&issue.issue_type);
        if let Some(status) = &issue.status {
            mapper.statuses.flag_required(status);
            mapper.flag_status_for_issue_type(&issue.issue_type, status);
        }
        if let Some(priority) = &issue.priority {
            mapper.priorities.flag_required(priority);
        }
        if let Some(resolution) = &issue.resolution {
            mapper.resolutions.flag_required(resolution);
        }
        if let Some(security) = &issue.security_level {
            mapper.issue_security_levels.flag_required(security);
        }
        for user in [&issue.reporter, &issue.assignee].into_iter().flatten() {
            mapper.users.flag_mandatory(user);
        }
        if let Some(creator) = &issue.creator {
            mapper.users.flag_optional(creator);
        }
        self.issue_types.insert(issue.id, issue.issue_type);
    }

    fn flag_custom_field_value(&mut self, record: &ExportRecord) -> Result<(), RecordError> {
        let Some(parser) = self.parsers.get(&record.kind) else {
            return Ok(());
        };
        let value = parser.parse(record)?;
        if !self.project.contains_issue(&value.issue_id) {
            return Ok(());
        }
        self.field_values
            .push((value.custom_field_id.clone(), value.issue_id.clone()));
        for option in [value.string_value, value.parent_key].into_iter().flatten() {
            self.option_values
                .push((value.custom_field_id.clone(), option));
        }
        Ok(())
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}

impl ImportEntityHandler for IssueMapperHandler<'_> {
    fn handles(&self, entity_kind: &str) -> bool {
        entity_kind == kind::ISSUE || self.parsers.handles(entity_kind)
    }

    fn handle_entity(&mut self, record: &ExportRecord) -> Result<()> {
        if record.is(kind::ISSUE) {
            if record.get("project") == Some(self.project.id()) {
                match ExternalIssue::from_record(record) {
                    Ok(issue) => self.flag_issue(issue),
                    Err(err) => self.warnings.push(format!("Ignoring issue: {err}")),
                }
            }
        } else if let Err(err) = self.flag_custom_field_value(record) {
            self.warnings
                .push(format!("Ignoring custom field value: {err}"));
        }
        Ok(())
    }

    /// Values may precede their issue and option definitions can appear
    /// anywhere in the export, so both are resolved once everything is known.
    fn end_document(&mut self) -> Result<()> {
        for (field_id, issue_id) in self.field_values.drain(..) {
            let issue_type = self.issue_types.get(&issue_id).map(String::as_str);
            self.mapper
                .custom_fields
                .flag_value_in_use(&field_id, issue_type);
        }

        let options = &self.mapper.custom_field_options;
        let flagged: BTreeSet<_> = self
            .option_values
            .drain(..)
            .filter(|(field_id, _)| self.mapper.custom_fields.is_option_backed(field_id))
            .map(|(_, option_id)| option_id)
            .collect();
        for option_id in flagged {
            options.identity().flag_required(&option_id);
        }
        Ok(())
    }
}

/// Flags users, groups, roles and link types referenced by the project's
/// issue-related records.
#[derive(Debug)]
pub struct RelatedReferenceMapperHandler<'a> {
    project: &'a BackupProject,
    mapper: &'a ImportMapper,
}

impl<'a> RelatedReferenceMapperHandler<'a> {
    #[must_use]
    pub const fn new(project: &'a BackupProject, mapper: &'a ImportMapper) -> Self {
        Self { project, mapper }
    }

    fn in_project(&self, record: &ExportRecord, field: &'static str) -> Result<bool, RecordError> {
        Ok(self.project.contains_issue(record.require(field)?))
    }

    fn flag_optional_user(&self, record: &ExportRecord, field: &str) {
        if let Some(user) = record.get(field) {
            self.mapper.users.flag_optional(user);
        }
    }

    fn flag_visibility(&self, record: &ExportRecord) {
        if let Some(group) = record.get("grouplevel") {
            self.mapper.groups.flag_required(group);
        }
        if let Some(role) = record.get("rolelevel") {
            self.mapper.project_roles.flag_required(role);
        }
    }

    fn flag(&self, record: &ExportRecord) -> Result<(), RecordError> {
        match record.kind.as_str() {
            kind::COMMENT | kind::WORKLOG => {
                if self.in_project(record, "issue")? {
                    self.flag_optional_user(record, "author");
                    self.flag_optional_user(record, "updateauthor");
                    self.flag_visibility(record);
                }
            }
            kind::CHANGE_GROUP | kind::FILE_ATTACHMENT => {
                if self.in_project(record, "issue")? {
                    self.flag_optional_user(record, "author");
                }
            }
            kind::ISSUE_LINK => {
                if self.in_project(record, "source")? || self.in_project(record, "destination")? {
                    self.mapper
                        .issue_link_types
                        .flag_required(record.require("linktype")?);
                }
            }
            kind::USER_ASSOCIATION => {
                if record.get("sinknodeentity") == Some(kind::ISSUE)
                    && self.in_project(record, "sinknodeid")?
                {
                    self.mapper.users.flag_optional(record.require("sourcename")?);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl ImportEntityHandler for RelatedReferenceMapperHandler<'_> {
    fn handles(&self, entity_kind: &str) -> bool {
        matches!(
            entity_kind,
            kind::COMMENT
                | kind::WORKLOG
                | kind::CHANGE_GROUP
                | kind::FILE_ATTACHMENT
                | kind::ISSUE_LINK
                | kind::USER_ASSOCIATION
        )
    }

    fn handle_entity(&mut self, record: &ExportRecord) -> Result<()> {
        // Routing consumers report incomplete records of these kinds.
        if let Err(err) = self.flag(record) {
            tracing::debug!(%err, "Reference flagging skipped a record");
        }
        Ok(())
    }
}
