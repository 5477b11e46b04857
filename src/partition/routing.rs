//! Routing consumers: copy this project's records into staging segments.

use super::staging::{SegmentWriter, StagingFiles, StagingSegment};
use crate::backup::ImportEntityHandler;
use crate::customfield::CustomFieldParserRegistry;
use crate::error::Result;
use crate::model::{BackupProject, ExportRecord, RecordError, kind};
use std::collections::HashSet;

/// First-degree entities hanging off an issue.
pub const ISSUE_RELATED_KINDS: &[&str] = &[
    kind::COMMENT,
    kind::WORKLOG,
    kind::CHANGE_GROUP,
    kind::ISSUE_LINK,
    kind::NODE_ASSOCIATION,
    kind::USER_ASSOCIATION,
    kind::LABEL,
    kind::CHANGE_ITEM,
    kind::ENTITY_PROPERTY,
];

fn skip_warning(err: &RecordError) -> String {
    format!("Skipping incomplete record during partitioning: {err}")
}

/// Routes the project's issues.
#[derive(Debug)]
pub struct IssuePartitionHandler<'a> {
    project: &'a BackupProject,
    writer: SegmentWriter,
    warnings: Vec<String>,
}

impl<'a> IssuePartitionHandler<'a> {
    /// # Errors
    ///
    /// Returns an error if the segment cannot be created.
    pub fn new(project: &'a BackupProject, staging: &StagingFiles) -> Result<Self> {
        Ok(Self {
            project,
            writer: staging.writer(StagingSegment::Issues)?,
            warnings: Vec::new(),
        })
    }

    fn route(&mut self, record: &ExportRecord) -> Result<Result<(), RecordError>> {
        let project_id = match record.require("project") {
            Ok(id) => id,
            Err(err) => return Ok(Err(err)),
        };
        if project_id == self.project.id() {
            self.writer.write(record)?;
        }
        Ok(Ok(()))
    }

    #[must_use]
    pub const fn count(&self) -> usize {
        self.writer.count()
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}

impl ImportEntityHandler for IssuePartitionHandler<'_> {
    fn handles(&self, entity_kind: &str) -> bool {
        entity_kind == kind::ISSUE
    }

    fn handle_entity(&mut self, record: &ExportRecord) -> Result<()> {
        if let Err(err) = self.route(record)? {
            self.warnings.push(skip_warning(&err));
        }
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        self.writer.finish()?;
        Ok(())
    }
}

/// Routes custom field values of the project's issues, for every kind a
/// registered parser reads.
#[derive(Debug)]
pub struct CustomFieldValuePartitionHandler<'a> {
    project: &'a BackupProject,
    parsers: &'a CustomFieldParserRegistry,
    writer: SegmentWriter,
    warnings: Vec<String>,
}

impl<'a> CustomFieldValuePartitionHandler<'a> {
    /// # Errors
    ///
    /// Returns an error if the segment cannot be created.
    pub fn new(
        project: &'a BackupProject,
        parsers: &'a CustomFieldParserRegistry,
        staging: &StagingFiles,
    ) -> Result<Self> {
        Ok(Self {
            project,
            parsers,
            writer: staging.writer(StagingSegment::CustomFieldValues)?,
            warnings: Vec::new(),
        })
    }

    #[must_use]
    pub const fn count(&self) -> usize {
        self.writer.count()
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}

impl ImportEntityHandler for CustomFieldValuePartitionHandler<'_> {
    fn handles(&self, entity_kind: &str) -> bool {
        self.parsers.handles(entity_kind)
    }

    fn handle_entity(&mut self, record: &ExportRecord) -> Result<()> {
        let Some(parser) = self.parsers.get(&record.kind) else {
            return Ok(());
        };
        match parser.parse(record) {
            Ok(value) if self.project.contains_issue(&value.issue_id) => {
                self.writer.write(record)?;
            }
            Ok(_) => {}
            Err(err) => self.warnings.push(skip_warning(&err)),
        }
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        self.writer.finish()?;
        Ok(())
    }
}

/// Routes first-degree issue entities, and second-degree entities whose
/// parent was routed earlier in the same pass.
#[derive(Debug)]
pub struct IssueRelatedPartitionHandler<'a> {
    project: &'a BackupProject,
    first_degree: SegmentWriter,
    second_degree: SegmentWriter,
    change_groups: HashSet<String>,
    comments: HashSet<String>,
    warnings: Vec<String>,
}

enum Route {
    FirstDegree,
    SecondDegree,
    Skip,
}

impl<'a> IssueRelatedPartitionHandler<'a> {
    /// # Errors
    ///
    /// Returns an error if a segment cannot be created.
    pub fn new(project: &'a BackupProject, staging: &StagingFiles) -> Result<Self> {
        Ok(Self {
            project,
            first_degree: staging.writer(StagingSegment::IssueRelated)?,
            second_degree: staging.writer(StagingSegment::SecondDegree)?,
            change_groups: HashSet::new(),
            comments: HashSet::new(),
            warnings: Vec::new(),
        })
    }

    fn in_project(&self, record: &ExportRecord, field: &'static str) -> Result<bool, RecordError> {
        Ok(self.project.contains_issue(record.require(field)?))
    }

    fn route(&mut self, record: &ExportRecord) -> Result<Route, RecordError> {
        let first_if = |routed: bool| if routed { Route::FirstDegree } else { Route::Skip };
        let route = match record.kind.as_str() {
            kind::COMMENT => {
                let routed = self.in_project(record, "issue")?;
                if routed {
                    self.comments.insert(record.require("id")?.to_string());
                }
                first_if(routed)
            }
            kind::CHANGE_GROUP => {
                let routed = self.in_project(record, "issue")?;
                if routed {
                    self.change_groups.insert(record.require("id")?.to_string());
                }
                first_if(routed)
            }
            kind::WORKLOG | kind::LABEL => first_if(self.in_project(record, "issue")?),
            kind::ISSUE_LINK => first_if(
                self.in_project(record, "source")? || self.in_project(record, "destination")?,
            ),
            kind::NODE_ASSOCIATION => first_if(
                record.get("sourcenodeentity") == Some(kind::ISSUE)
                    && self.in_project(record, "sourcenodeid")?,
            ),
            kind::USER_ASSOCIATION => first_if(
                record.get("sinknodeentity") == Some(kind::ISSUE)
                    && self.in_project(record, "sinknodeid")?,
            ),
            kind::CHANGE_ITEM => {
                if self.change_groups.contains(record.require("group")?) {
                    Route::SecondDegree
                } else {
                    Route::Skip
                }
            }
            kind::ENTITY_PROPERTY => {
                let entity_id = record.require("entityid")?;
                match record.require("entityname")? {
                    kind::ISSUE_PROPERTY => first_if(self.project.contains_issue(entity_id)),
                    kind::COMMENT_PROPERTY if self.comments.contains(entity_id) => {
                        Route::SecondDegree
                    }
                    kind::CHANGE_HISTORY_PROPERTY if self.change_groups.contains(entity_id) => {
                        Route::SecondDegree
                    }
                    _ => Route::Skip,
                }
            }
            _ => Route::Skip,
        };
        Ok(route)
    }

    #[must_use]
    pub const fn first_degree_count(&self) -> usize {
        self.first_degree.count()
    }

    #[must_use]
    pub const fn second_degree_count(&self) -> usize {
        self.second_degree.count()
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}

impl ImportEntityHandler for IssueRelatedPartitionHandler<'_> {
    fn handles(&self, entity_kind: &str) -> bool {
        ISSUE_RELATED_KINDS.contains(&entity_kind)
    }

    fn handle_entity(&mut self, record: &ExportRecord) -> Result<()> {
        match self.route(record) {
            Ok(Route::FirstDegree) => self.first_degree.write(record)?,
            Ok(Route::SecondDegree) => self.second_degree.write(record)?,
            Ok(Route::Skip) => {}
            Err(err) => self.warnings.push(skip_warning(&err)),
        }
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        self.first_degree.finish()?;
        self.second_degree.finish()?;
        Ok(())
    }
}

/// Routes attachment metadata of the project's issues.
#[derive(Debug)]
pub struct FileAttachmentPartitionHandler<'a> {
    project: &'a BackupProject,
    writer: SegmentWriter,
    warnings: Vec<String>,
}

impl<'a> FileAttachmentPartitionHandler<'a> {
    /// # Errors
    ///
    /// Returns an error if the segment cannot be created.
    pub fn new(project: &'a BackupProject, staging: &StagingFiles) -> Result<Self> {
        Ok(Self {
            project,
            writer: staging.writer(StagingSegment::Attachments)?,
            warnings: Vec::new(),
        })
    }

    #[must_use]
    pub const fn count(&self) -> usize {
        self.writer.count()
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}

impl ImportEntityHandler for FileAttachmentPartitionHandler<'_> {
    fn handles(&self, entity_kind: &str) -> bool {
        entity_kind == kind::FILE_ATTACHMENT
    }

    fn handle_entity(&mut self, record: &ExportRecord) -> Result<()> {
        match record.require("issue") {
            Ok(issue_id) if self.project.contains_issue(issue_id) => self.writer.write(record)?,
            Ok(_) => {}
            Err(err) => self.warnings.push(skip_warning(&err)),
        }
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        self.writer.finish()?;
        Ok(())
    }
}
