//! Overview pass: a cheap first read that summarizes every project.

use super::reader::{ImportEntityHandler, read_export};
use crate::error::Result;
use crate::model::{
    BackupOverview, BackupProject, BackupSystemInformation, ExportRecord, ExternalComponent,
    ExternalCustomField, ExternalCustomFieldConfiguration, ExternalProject,
    ExternalProjectRoleActor, ExternalVersion, RecordError, kind,
};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const OVERVIEW_KINDS: &[&str] = &[
    kind::PROJECT,
    kind::VERSION,
    kind::COMPONENT,
    kind::CUSTOM_FIELD,
    kind::CUSTOM_FIELD_CONTEXT,
    kind::ISSUE,
    kind::PROJECT_ROLE_ACTOR,
    kind::BACKUP_INFO,
];

/// Where a custom field applies: optional project and issue type scope.
#[derive(Debug, Clone)]
struct FieldContext {
    project_id: Option<String>,
    issue_type_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct BackupOverviewHandler {
    projects: Vec<BackupProject>,
    project_index: HashMap<String, usize>,
    versions: Vec<ExternalVersion>,
    components: Vec<ExternalComponent>,
    role_actors: Vec<ExternalProjectRoleActor>,
    custom_fields: BTreeMap<String, ExternalCustomField>,
    contexts: HashMap<String, Vec<FieldContext>>,
    issues: Vec<(String, String, String)>,
    system: BackupSystemInformation,
    skipped: usize,
}

impl BackupOverviewHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, record: &ExportRecord) -> Result<(), RecordError> {
        match record.kind.as_str() {
            kind::PROJECT => {
                let project = ExternalProject::from_record(record)?;
                self.project_index
                    .insert(project.id.clone(), self.projects.len());
                self.projects.push(BackupProject::new(project));
            }
            kind::VERSION => self.versions.push(ExternalVersion::from_record(record)?),
            kind::COMPONENT => self.components.push(ExternalComponent::from_record(record)?),
            kind::PROJECT_ROLE_ACTOR => self
                .role_actors
                .push(ExternalProjectRoleActor::from_record(record)?),
            kind::CUSTOM_FIELD => {
                let field = ExternalCustomField::from_record(record)?;
                self.custom_fields.insert(field.id.clone(), field);
            }
            kind::CUSTOM_FIELD_CONTEXT => {
                let field_id = record.require("customfield")?.to_string();
                self.contexts.entry(field_id).or_default().push(FieldContext {
                    project_id: record.owned("project"),
                    issue_type_id: record.owned("issuetype"),
                });
            }
            kind::ISSUE => {
                let id = record.require("id")?.to_string();
                let key = record.require("key")?.to_string();
                let project_id = record.require("project")?.to_string();
                self.issues.push((id, key, project_id));
            }
            kind::BACKUP_INFO => {
                self.system.build_number = record.owned("buildnumber");
                self.system.edition = record.owned("edition");
            }
            _ => {}
        }
        Ok(())
    }

    /// Assemble the overview once the pass has finished.
    #[must_use]
    pub fn into_overview(mut self, entity_count: usize) -> BackupOverview {
        for version in std::mem::take(&mut self.versions) {
            if let Some(&index) = self.project_index.get(&version.project_id) {
                self.projects[index].versions.push(version);
            }
        }
        for component in std::mem::take(&mut self.components) {
            if let Some(&index) = self.project_index.get(&component.project_id) {
                self.projects[index].components.push(component);
            }
        }
        for actor in std::mem::take(&mut self.role_actors) {
            if let Some(&index) = self.project_index.get(&actor.project_id) {
                self.projects[index].role_actors.push(actor);
            }
        }
        for (id, key, project_id) in std::mem::take(&mut self.issues) {
            if let Some(&index) = self.project_index.get(&project_id) {
                self.projects[index].issue_ids.insert(id.clone());
            }
            self.system.issue_keys.insert(id, key);
        }
        for project in &mut self.projects {
            project.custom_fields = field_configurations(
                project.id(),
                &self.custom_fields,
                &self.contexts,
            );
        }
        if self.skipped > 0 {
            tracing::warn!(skipped = self.skipped, "Overview skipped incomplete records");
        }
        self.system.entity_count = entity_count;
        BackupOverview {
            projects: self.projects,
            system: self.system,
        }
    }
}

/// Custom fields configured for a project, with their issue type scope.
fn field_configurations(
    project_id: &str,
    fields: &BTreeMap<String, ExternalCustomField>,
    contexts: &HashMap<String, Vec<FieldContext>>,
) -> Vec<ExternalCustomFieldConfiguration> {
    let mut configurations = Vec::new();
    for (field_id, field) in fields {
        let Some(field_contexts) = contexts.get(field_id) else {
            continue;
        };
        let applicable: Vec<_> = field_contexts
            .iter()
            .filter(|context| {
                context
                    .project_id
                    .as_deref()
                    .is_none_or(|scope| scope == project_id)
            })
            .collect();
        if applicable.is_empty() {
            continue;
        }
        let issue_type_ids = if applicable.iter().any(|c| c.issue_type_id.is_none()) {
            None
        } else {
            let mut ids: Vec<String> = applicable
                .iter()
                .filter_map(|context| context.issue_type_id.clone())
                .collect();
            ids.sort();
            ids.dedup();
            Some(ids)
        };
        configurations.push(ExternalCustomFieldConfiguration {
            custom_field: field.clone(),
            issue_type_ids,
        });
    }
    configurations
}

impl ImportEntityHandler for BackupOverviewHandler {
    fn handles(&self, kind: &str) -> bool {
        OVERVIEW_KINDS.contains(&kind)
    }

    fn handle_entity(&mut self, record: &ExportRecord) -> Result<()> {
        if let Err(err) = self.add(record) {
            tracing::debug!(error = %err, "Skipping record in overview");
            self.skipped += 1;
        }
        Ok(())
    }
}

/// Read the export once and summarize every project it contains.
///
/// # Errors
///
/// Returns an error if the export cannot be read or is malformed.
pub fn read_backup_overview(path: &Path) -> Result<BackupOverview> {
    let mut handler = BackupOverviewHandler::new();
    let entity_count = read_export(path, &mut handler)?;
    let overview = handler.into_overview(entity_count);
    tracing::info!(
        projects = overview.projects.len(),
        records = entity_count,
        "Read backup overview"
    );
    Ok(overview)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::reader::read_records;
    use std::io::Cursor;

    fn line(record: &ExportRecord) -> String {
        serde_json::to_string(record).unwrap()
    }

    #[test]
    fn overview_groups_by_project() {
        let records = [
            ExportRecord::new(kind::BACKUP_INFO).with("buildnumber", "812"),
            ExportRecord::new(kind::PROJECT).with("id", "1").with("key", "TST"),
            ExportRecord::new(kind::PROJECT).with("id", "2").with("key", "OTH"),
            ExportRecord::new(kind::VERSION)
                .with("id", "11")
                .with("project", "1")
                .with("name", "1.0"),
            ExportRecord::new(kind::ISSUE)
                .with("id", "100")
                .with("key", "TST-1")
                .with("project", "1"),
            ExportRecord::new(kind::ISSUE)
                .with("id", "200")
                .with("key", "OTH-1")
                .with("project", "2"),
            ExportRecord::new(kind::CUSTOM_FIELD)
                .with("id", "10")
                .with("name", "Colour")
                .with("type", "com.example:select"),
            ExportRecord::new(kind::CUSTOM_FIELD_CONTEXT)
                .with("customfield", "10")
                .with("project", "1")
                .with("issuetype", "3"),
            ExportRecord::new(kind::PROJECT).with("id", "3"),
        ];
        let input: String = records.iter().map(|r| line(r) + "\n").collect();
        let mut handler = BackupOverviewHandler::new();
        let count = read_records(Cursor::new(input), &mut handler).unwrap();
        let overview = handler.into_overview(count);

        assert_eq!(overview.project_keys(), vec!["TST", "OTH"]);
        let tst = overview.project("TST").unwrap();
        assert_eq!(tst.versions.len(), 1);
        assert!(tst.contains_issue("100"));
        assert!(!tst.contains_issue("200"));
        assert_eq!(tst.custom_fields.len(), 1);
        assert_eq!(
            tst.custom_fields[0].issue_type_ids,
            Some(vec!["3".to_string()])
        );
        assert!(overview.project("OTH").unwrap().custom_fields.is_empty());
        assert_eq!(overview.system.issue_key("200"), Some("OTH-1"));
        assert_eq!(overview.system.entity_count, 9);
        assert_eq!(overview.system.build_number.as_deref(), Some("812"));
    }
}
