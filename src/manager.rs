//! Pipeline orchestrator.
//!
//! An attempt runs in three caller-visible steps so the surrounding
//! workflow can show mapping problems before anything is written:
//!
//! 1. [`ProjectImportManager::prepare`] partitions the export and seeds the
//!    identity maps.
//! 2. [`ProjectImportManager::map_and_validate`] auto-maps and validates; it
//!    may be repeated after the destination has been fixed up.
//! 3. [`ProjectImportManager::import`] persists, phase by phase, and always
//!    finalizes.
//!
//! [`ProjectImportManager::run`] chains all three.

use crate::automap::{MappingContext, auto_map, read_attachments, validate};
use crate::backup::read_backup_overview;
use crate::config::{ImportSettings, ProjectImportOptions};
use crate::customfield::CustomFieldParserRegistry;
use crate::error::{BlockingCategories, ImportError, Result};
use crate::mapper::ImportMapper;
use crate::model::{
    BackupOverview, BackupProject, BackupSystemInformation, EntityCategory, ImportResults,
    ImportState, MappingResult,
};
use crate::partition::{PartitionContext, PartitionCounts, StagingFiles, StagingSegment, partition};
use crate::persist::{
    PersistContext, PersistPhase, create_missing_users, import_project_shell, run_phase,
};
use crate::progress::{EntityCountProgress, NoopProgress, ProgressSink, TaskProgressInterval};
use crate::storage::{DestinationStore, WritePolicy, WritePolicyGuard};
use std::path::Path;
use std::sync::Arc;

const fn phase_state(phase: PersistPhase) -> ImportState {
    match phase {
        PersistPhase::Issues => ImportState::PersistingIssues,
        PersistPhase::IssueRelated => ImportState::PersistingRelated,
        PersistPhase::SecondDegree => ImportState::PersistingSecondDegree,
        PersistPhase::Attachments => ImportState::PersistingAttachments,
        PersistPhase::CustomFieldValues => ImportState::PersistingCustomFields,
    }
}

/// One import attempt: the selected project, its staging segments and
/// everything learned about it so far.
///
/// Dropping the attempt removes its staging directory.
#[derive(Debug)]
pub struct ProjectImportData {
    options: ProjectImportOptions,
    project: Arc<BackupProject>,
    system: Arc<BackupSystemInformation>,
    mapper: Arc<ImportMapper>,
    staging: StagingFiles,
    counts: PartitionCounts,
    results: Arc<ImportResults>,
    mapping: Option<MappingResult>,
    state: ImportState,
}

impl ProjectImportData {
    #[must_use]
    pub const fn options(&self) -> &ProjectImportOptions {
        &self.options
    }

    #[must_use]
    pub fn project(&self) -> &BackupProject {
        &self.project
    }

    #[must_use]
    pub fn mapper(&self) -> &ImportMapper {
        &self.mapper
    }

    #[must_use]
    pub const fn counts(&self) -> PartitionCounts {
        self.counts
    }

    /// Latest validation verdict, if any round ran.
    #[must_use]
    pub const fn mapping_result(&self) -> Option<&MappingResult> {
        self.mapping.as_ref()
    }

    #[must_use]
    pub fn results(&self) -> Arc<ImportResults> {
        Arc::clone(&self.results)
    }

    #[must_use]
    pub const fn state(&self) -> ImportState {
        self.state
    }

    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        self.staging.dir()
    }

    /// Handle for stopping this attempt from another thread while
    /// [`ProjectImportManager::import`] holds the attempt.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            results: Arc::clone(&self.results),
        }
    }
}

/// Cloneable, thread-safe way to cancel a running import.
///
/// Cancelling stops new tasks from being submitted and drops queued ones;
/// tasks already running finish. Finalization still runs and the attempt
/// ends in [`ImportState::Aborted`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    results: Arc<ImportResults>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.results.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.results.was_cancelled()
    }
}

/// Drives import attempts against one destination store.
pub struct ProjectImportManager {
    store: Arc<dyn DestinationStore>,
    settings: ImportSettings,
    progress: Arc<dyn ProgressSink>,
    parsers: Arc<CustomFieldParserRegistry>,
}

impl ProjectImportManager {
    #[must_use]
    pub fn new(store: Arc<dyn DestinationStore>, settings: ImportSettings) -> Self {
        Self {
            store,
            settings,
            progress: Arc::new(NoopProgress),
            parsers: Arc::new(CustomFieldParserRegistry::with_defaults()),
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn with_parsers(mut self, parsers: CustomFieldParserRegistry) -> Self {
        self.parsers = Arc::new(parsers);
        self
    }

    #[must_use]
    pub const fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    /// Summarize the export: which projects it holds and their reference
    /// data.
    ///
    /// # Errors
    ///
    /// Returns an error if the export cannot be read or is malformed.
    pub fn read_overview(&self, backup_path: &Path) -> Result<BackupOverview> {
        read_backup_overview(backup_path)
    }

    /// Partition the export for the project named in `options`.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::ProjectNotInBackup`] if the export has no such
    /// project, or the partition error. Nothing is written to the
    /// destination in either case.
    pub fn prepare(
        &self,
        options: ProjectImportOptions,
        overview: &BackupOverview,
    ) -> Result<ProjectImportData> {
        let project = overview
            .project(&options.project_key)
            .cloned()
            .ok_or_else(|| ImportError::ProjectNotInBackup {
                key: options.project_key.clone(),
            })?;

        let mut state = ImportState::Created;
        state.transition(ImportState::Partitioning)?;

        let mapper = ImportMapper::for_backup_project(&project);
        let results = ImportResults::new(self.settings.abort_threshold);
        let staging = StagingFiles::create(self.settings.staging_dir.as_deref())?;
        let progress = EntityCountProgress::new(
            Arc::clone(&self.progress),
            TaskProgressInterval::new(0, 100),
            overview.system.entity_count,
            self.settings.progress_step,
            "Reading export",
        );
        let counts = partition(
            &options.backup_path,
            &staging,
            PartitionContext {
                project: &project,
                mapper: &mapper,
                parsers: &self.parsers,
                results: &results,
                progress: Some(&progress),
            },
        )
        .inspect_err(|err| tracing::error!(error = %err, "Partitioning failed"))?;
        state.transition(ImportState::Mapping)?;

        Ok(ProjectImportData {
            options,
            project: Arc::new(project),
            system: Arc::new(overview.system.clone()),
            mapper: Arc::new(mapper),
            staging,
            counts,
            results: Arc::new(results),
            mapping: None,
            state,
        })
    }

    /// Auto-map against the destination and validate the outcome.
    ///
    /// A new round replaces the previous verdict; earlier mappings are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if a destination lookup fails or the attempt has
    /// already moved past validation.
    pub fn map_and_validate<'d>(
        &self,
        data: &'d mut ProjectImportData,
    ) -> Result<&'d MappingResult> {
        if data.state != ImportState::Mapping {
            data.state.transition(ImportState::Mapping)?;
        }
        let span = tracing::info_span!("map_and_validate", project = %data.project.key());
        let _enter = span.enter();

        let ctx = MappingContext::new(self.store.as_ref(), &data.project, &data.options)?;
        auto_map(&ctx, &data.mapper)?;
        data.state.transition(ImportState::Validating)?;

        let attachments = if data.options.attachment_path.is_some() {
            read_attachments(&data.staging.path(StagingSegment::Attachments))?
        } else {
            Vec::new()
        };
        let result = validate(&ctx, &data.mapper, &attachments)?;
        Ok(data.mapping.insert(result))
    }

    /// Persist a validated attempt.
    ///
    /// Finalization (counter, reindex, write policy) runs however the
    /// persistence phases end. A soft abort returns `Ok` with the abort flag
    /// set on the results.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::NotValidated`] or
    /// [`ImportError::ValidationFailed`] without writing anything, or the
    /// fatal error that stopped persistence.
    pub fn import(&self, data: &mut ProjectImportData) -> Result<Arc<ImportResults>> {
        let Some(mapping) = &data.mapping else {
            return Err(ImportError::NotValidated);
        };
        if data.state != ImportState::Validating {
            return Err(ImportError::NotValidated);
        }
        if !mapping.can_import() {
            let blocking = mapping
                .blocking_categories()
                .iter()
                .map(ToString::to_string)
                .collect();
            data.state.transition(ImportState::Aborted)?;
            return Err(ImportError::ValidationFailed(BlockingCategories(blocking)));
        }

        let span = tracing::info_span!("import", project = %data.project.key());
        let _enter = span.enter();
        data.state.transition(ImportState::PersistingProject)?;

        let guard = WritePolicyGuard::acquire(self.store.as_ref(), WritePolicy::BULK_IMPORT);
        let mut ctx = None;
        let outcome = self.persist(data, &mut ctx);

        data.state.transition(ImportState::Finalizing)?;
        self.finalize(ctx.as_deref(), &data.results);
        drop(guard);
        data.results.mark_finished();

        let aborted = outcome.is_err() || data.results.abort_import();
        data.state.transition(if aborted {
            ImportState::Aborted
        } else {
            ImportState::Completed
        })?;
        tracing::info!(
            state = %data.state,
            issues = data.results.counts(EntityCategory::Issues).created,
            errors = data.results.error_count(),
            warnings = data.results.warnings().len(),
            "Project import finished"
        );
        outcome.map(|()| Arc::clone(&data.results))
    }

    /// Overview, prepare, validate and import in one call.
    ///
    /// # Errors
    ///
    /// Returns the first error of any step.
    pub fn run(&self, options: ProjectImportOptions) -> Result<Arc<ImportResults>> {
        let overview = self.read_overview(&options.backup_path)?;
        let mut data = self.prepare(options, &overview)?;
        self.map_and_validate(&mut data)?;
        self.import(&mut data)
    }

    fn persist(
        &self,
        data: &mut ProjectImportData,
        slot: &mut Option<Arc<PersistContext>>,
    ) -> Result<()> {
        let project = TaskProgressInterval::PROJECT;
        self.progress.report(project.start, "Importing project");
        if create_missing_users(&self.store, &data.mapper, &data.results, &self.settings)? {
            return Ok(());
        }
        let (destination, _) = import_project_shell(
            &self.store,
            &data.mapper,
            &data.results,
            &data.project,
            &data.options,
            &self.settings,
        )?;
        self.progress.report(project.end, "Imported project");

        let ctx = Arc::new(PersistContext::new(
            Arc::clone(&self.store),
            Arc::clone(&data.mapper),
            Arc::clone(&data.results),
            Arc::clone(&self.parsers),
            Arc::clone(&data.project),
            Arc::clone(&data.system),
            destination,
            data.options.attachment_path.clone(),
        ));
        *slot = Some(Arc::clone(&ctx));

        for phase in PersistPhase::ALL {
            if data.results.abort_import() {
                tracing::warn!(phase = %phase, "Import aborted, skipping remaining phases");
                break;
            }
            data.state.transition(phase_state(phase))?;
            if phase == PersistPhase::Attachments && ctx.attachment_root.is_none() {
                tracing::debug!("No attachment directory, skipping attachments");
                continue;
            }
            let segment = phase.segment();
            run_phase(
                &ctx,
                &self.settings,
                phase,
                &data.staging.path(segment),
                data.counts.get(segment),
                Arc::clone(&self.progress),
            )?;
        }
        Ok(())
    }

    /// Counter and reindex. Never fails; problems become soft errors.
    fn finalize(&self, ctx: Option<&PersistContext>, results: &ImportResults) {
        let reindex = TaskProgressInterval::REINDEX;
        let Some(ctx) = ctx else {
            self.progress.report(reindex.end, "Nothing to reindex");
            return;
        };

        let largest = ctx.largest_issue_number();
        if largest > 0 {
            if let Err(err) = self
                .store
                .set_project_issue_counter(&ctx.destination.id, largest)
            {
                results.add_error(format!("Could not update the project issue counter: {err}"));
            }
        }

        let issue_ids = ctx.created_issue_ids();
        self.progress.report(reindex.start, "Reindexing issues");
        if !issue_ids.is_empty() {
            match self.store.reindex(&issue_ids) {
                Ok(()) => tracing::info!(issues = issue_ids.len(), "Reindexed imported issues"),
                Err(err) => results.add_error(format!("Could not reindex imported issues: {err}")),
            }
        }
        self.progress.report(reindex.end, "Reindexed issues");
    }
}

impl std::fmt::Debug for ProjectImportManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectImportManager")
            .field("settings", &self.settings)
            .field("parsers", &self.parsers.kinds())
            .finish_non_exhaustive()
    }
}
