//! Reader callback that turns staged records into executor tasks.

use super::context::PersistContext;
use super::entity::{self, PersistOutcome, PersistResult};
use super::executor::BoundedExecutor;
use crate::backup::ImportEntityHandler;
use crate::error::Result;
use crate::model::{ExportRecord, kind};
use crate::partition::{ISSUE_RELATED_KINDS, StagingSegment};
use crate::progress::{EntityCountProgress, TaskProgressInterval};
use std::fmt;
use std::sync::Arc;

/// Persistence phases after the project shell, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistPhase {
    Issues,
    IssueRelated,
    SecondDegree,
    Attachments,
    CustomFieldValues,
}

impl PersistPhase {
    pub const ALL: [Self; 5] = [
        Self::Issues,
        Self::IssueRelated,
        Self::SecondDegree,
        Self::Attachments,
        Self::CustomFieldValues,
    ];

    #[must_use]
    pub const fn segment(self) -> StagingSegment {
        match self {
            Self::Issues => StagingSegment::Issues,
            Self::IssueRelated => StagingSegment::IssueRelated,
            Self::SecondDegree => StagingSegment::SecondDegree,
            Self::Attachments => StagingSegment::Attachments,
            Self::CustomFieldValues => StagingSegment::CustomFieldValues,
        }
    }

    /// Name of the phase's worker pool.
    #[must_use]
    pub const fn executor_name(self) -> &'static str {
        match self {
            Self::Issues => "CreateIssues",
            Self::IssueRelated => "CreateIssueRelatedData",
            Self::SecondDegree => "IssueSecondDegreeEntities",
            Self::Attachments => "CreateAttachments",
            Self::CustomFieldValues => "CreateCustomFieldValues",
        }
    }

    #[must_use]
    pub const fn interval(self) -> TaskProgressInterval {
        match self {
            Self::Issues => TaskProgressInterval::ISSUES,
            Self::IssueRelated => TaskProgressInterval::ISSUE_RELATED,
            Self::SecondDegree => TaskProgressInterval::SECOND_DEGREE,
            Self::Attachments => TaskProgressInterval::ATTACHMENTS,
            Self::CustomFieldValues => TaskProgressInterval::CUSTOM_FIELD_VALUES,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Issues => "Importing issues",
            Self::IssueRelated => "Importing issue related data",
            Self::SecondDegree => "Importing change items and properties",
            Self::Attachments => "Importing attachments",
            Self::CustomFieldValues => "Importing custom field values",
        }
    }
}

impl fmt::Display for PersistPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.executor_name())
    }
}

/// Persist one staged record of the given phase.
pub fn persist(ctx: &PersistContext, phase: PersistPhase, record: &ExportRecord) -> PersistResult {
    match phase {
        PersistPhase::Issues => entity::persist_issue(ctx, record),
        PersistPhase::IssueRelated | PersistPhase::SecondDegree => {
            entity::persist_related(ctx, record)
        }
        PersistPhase::Attachments => entity::persist_attachment(ctx, record),
        PersistPhase::CustomFieldValues => match ctx.parsers.get(&record.kind) {
            Some(parser) => entity::persist_custom_field_value(ctx, parser.as_ref(), record),
            None => Ok(PersistOutcome::Skipped(Some(format!(
                "No parser registered for custom field value kind '{}'.",
                record.kind
            )))),
        },
    }
}

/// Submits every record of one segment to the phase's executor.
pub struct PersisterHandler<'a> {
    ctx: Arc<PersistContext>,
    executor: &'a BoundedExecutor,
    phase: PersistPhase,
    progress: Arc<EntityCountProgress>,
    submitted: usize,
}

impl<'a> PersisterHandler<'a> {
    #[must_use]
    pub fn new(
        ctx: Arc<PersistContext>,
        executor: &'a BoundedExecutor,
        phase: PersistPhase,
        progress: Arc<EntityCountProgress>,
    ) -> Self {
        Self {
            ctx,
            executor,
            phase,
            progress,
            submitted: 0,
        }
    }

    #[must_use]
    pub const fn submitted(&self) -> usize {
        self.submitted
    }
}

impl ImportEntityHandler for PersisterHandler<'_> {
    fn handles(&self, entity_kind: &str) -> bool {
        match self.phase {
            PersistPhase::Issues => entity_kind == kind::ISSUE,
            PersistPhase::IssueRelated | PersistPhase::SecondDegree => {
                ISSUE_RELATED_KINDS.contains(&entity_kind)
            }
            PersistPhase::Attachments => entity_kind == kind::FILE_ATTACHMENT,
            PersistPhase::CustomFieldValues => self.ctx.parsers.handles(entity_kind),
        }
    }

    fn handle_entity(&mut self, record: &ExportRecord) -> Result<()> {
        let ctx = Arc::clone(&self.ctx);
        let progress = Arc::clone(&self.progress);
        let phase = self.phase;
        let record = record.clone();
        let accepted = self.executor.submit(move || {
            let outcome = persist(&ctx, phase, &record);
            ctx.record_outcome(&record, outcome);
            progress.processed_entity();
        });
        if accepted {
            self.submitted += 1;
        }
        Ok(())
    }

    fn wants_more(&self) -> bool {
        !self.ctx.results.abort_import()
    }
}
