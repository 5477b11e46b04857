//! Streaming partition engine.
//!
//! One forward pass over the export splits the selected project's records
//! into per-category staging segments while the mapper-population consumers
//! seed the identity maps. Routing and population consumers share a single
//! [`ChainedHandler`], so the pass costs the same no matter how many are
//! registered.

pub mod population;
pub mod routing;
pub mod staging;

pub use population::{IssueMapperHandler, ReferenceDataMapperHandler, RelatedReferenceMapperHandler};
pub use routing::{
    CustomFieldValuePartitionHandler, FileAttachmentPartitionHandler, IssuePartitionHandler,
    IssueRelatedPartitionHandler, ISSUE_RELATED_KINDS,
};
pub use staging::{SegmentWriter, StagingFiles, StagingSegment};

use crate::backup::{ChainedHandler, read_export};
use crate::customfield::CustomFieldParserRegistry;
use crate::error::Result;
use crate::mapper::ImportMapper;
use crate::model::{BackupProject, ImportResults};
use crate::progress::EntityCountProgress;
use serde::Serialize;
use std::path::Path;

/// Records written to each staging segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PartitionCounts {
    pub issues: usize,
    pub custom_field_values: usize,
    pub issue_related: usize,
    pub second_degree: usize,
    pub attachments: usize,
}

impl PartitionCounts {
    #[must_use]
    pub const fn get(&self, segment: StagingSegment) -> usize {
        match segment {
            StagingSegment::Issues => self.issues,
            StagingSegment::CustomFieldValues => self.custom_field_values,
            StagingSegment::IssueRelated => self.issue_related,
            StagingSegment::SecondDegree => self.second_degree,
            StagingSegment::Attachments => self.attachments,
        }
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.issues
            + self.custom_field_values
            + self.issue_related
            + self.second_degree
            + self.attachments
    }
}

/// Everything the partition pass reads besides the export itself.
#[derive(Debug, Clone, Copy)]
pub struct PartitionContext<'a> {
    pub project: &'a BackupProject,
    pub mapper: &'a ImportMapper,
    pub parsers: &'a CustomFieldParserRegistry,
    pub results: &'a ImportResults,
    pub progress: Option<&'a EntityCountProgress>,
}

/// Split `export` into the staging segments of `staging`.
///
/// Records with a missing field become warnings in `results` and are
/// skipped.
///
/// # Errors
///
/// Returns an error if the export is malformed or a segment cannot be
/// written. Nothing has been persisted at that point.
pub fn partition(
    export: &Path,
    staging: &StagingFiles,
    ctx: PartitionContext<'_>,
) -> Result<PartitionCounts> {
    let span = tracing::info_span!("partition", project = ctx.project.key());
    let _guard = span.enter();

    let mut issues = IssuePartitionHandler::new(ctx.project, staging)?;
    let mut values = CustomFieldValuePartitionHandler::new(ctx.project, ctx.parsers, staging)?;
    let mut related = IssueRelatedPartitionHandler::new(ctx.project, staging)?;
    let mut attachments = FileAttachmentPartitionHandler::new(ctx.project, staging)?;
    let mut reference = ReferenceDataMapperHandler::new(ctx.mapper);
    let mut issue_refs = IssueMapperHandler::new(ctx.project, ctx.mapper, ctx.parsers);
    let mut related_refs = RelatedReferenceMapperHandler::new(ctx.project, ctx.mapper);

    let records = {
        let mut chain = ChainedHandler::new();
        if let Some(progress) = ctx.progress {
            chain = chain.with_progress(progress);
        }
        chain.register(&mut issues);
        chain.register(&mut values);
        chain.register(&mut related);
        chain.register(&mut attachments);
        chain.register(&mut reference);
        chain.register(&mut issue_refs);
        chain.register(&mut related_refs);
        read_export(export, &mut chain)?
    };

    let warnings = [
        issues.take_warnings(),
        values.take_warnings(),
        related.take_warnings(),
        attachments.take_warnings(),
        reference.take_warnings(),
        issue_refs.take_warnings(),
    ];
    for warning in warnings.into_iter().flatten() {
        ctx.results.add_warning(warning);
    }

    let counts = PartitionCounts {
        issues: issues.count(),
        custom_field_values: values.count(),
        issue_related: related.first_degree_count(),
        second_degree: related.second_degree_count(),
        attachments: attachments.count(),
    };
    if let Some(progress) = ctx.progress {
        progress.finish();
    }
    tracing::info!(
        records,
        issues = counts.issues,
        custom_field_values = counts.custom_field_values,
        issue_related = counts.issue_related,
        second_degree = counts.second_degree,
        attachments = counts.attachments,
        "Partitioned export"
    );
    Ok(counts)
}
